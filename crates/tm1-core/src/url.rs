//! OData URL assembly.

/// Escapes a value embedded in a quoted OData key segment such as `Cubes('...')`.
pub fn escape_url_argument(arg: &str) -> String {
    arg.replace('%', "%25")
        .replace('\'', "''")
        .replace('#', "%23")
        .replace('?', "%3F")
        .replace('&', "%26")
}

/// Substitutes each `{}` in `template`, in order, with an escaped argument.
///
/// Surplus placeholders are left untouched.
pub fn format_url(template: &str, args: &[&str]) -> String {
    let mut out =
        String::with_capacity(template.len() + args.iter().map(|a| a.len()).sum::<usize>());
    let mut args = args.iter();
    let mut rest = template;
    while let Some(position) = rest.find("{}") {
        out.push_str(&rest[..position]);
        match args.next() {
            Some(arg) => out.push_str(&escape_url_argument(arg)),
            None => out.push_str("{}"),
        }
        rest = &rest[position + 2..];
    }
    out.push_str(rest);
    out
}

/// Appends `name=value` query parameters for every present value.
pub fn add_url_parameters(url: &str, parameters: &[(&str, Option<&str>)]) -> String {
    let mut out = url.to_string();
    for (name, value) in parameters {
        let Some(value) = value else {
            continue;
        };
        out.push(if out.contains('?') { '&' } else { '?' });
        out.push_str(name);
        out.push('=');
        out.push_str(value);
    }
    out
}
