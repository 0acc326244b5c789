//! The `tm1` binary.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tm1_cli::cli::cli()
}
