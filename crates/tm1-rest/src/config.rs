//! Connection settings from a JSON file or `TM1_*` variables.

use std::{env, fmt::Debug, fs::File, io::BufReader, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{RestError, RestResult};

fn default_true() -> bool {
    true
}

fn default_session_context() -> String {
    "tm1-rs".to_string()
}

/// Connection settings for one TM1 server.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Host name or IP address.
    pub address: String,
    /// HTTP port of the REST API.
    pub port: u16,
    /// Use HTTPS.
    #[serde(default = "default_true")]
    pub ssl: bool,
    /// Login name.
    pub user: String,
    /// Login password; never printed by `Debug`.
    #[serde(default)]
    pub password: String,
    /// CAM namespace; switches authentication from basic to `CAMNamespace`.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Verify the server certificate.
    #[serde(default = "default_true")]
    pub verify: bool,
    /// Request timeout; none waits indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Sent as `TM1-SessionContext` and shown in the server's thread monitor.
    #[serde(default = "default_session_context")]
    pub session_context: String,
    /// The server runs with sandboxes switched off.
    #[serde(default)]
    pub sandboxing_disabled: bool,
}

impl Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("ssl", &self.ssl)
            .field("user", &self.user)
            .field("password", &"***")
            .field("namespace", &self.namespace)
            .field("verify", &self.verify)
            .field("timeout_secs", &self.timeout_secs)
            .field("session_context", &self.session_context)
            .field("sandboxing_disabled", &self.sandboxing_disabled)
            .finish()
    }
}

impl ConnectionConfig {
    /// Settings with HTTPS, certificate verification and no password.
    pub fn new(address: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            ssl: true,
            user: user.into(),
            password: String::new(),
            namespace: None,
            verify: true,
            timeout_secs: None,
            session_context: default_session_context(),
            sandboxing_disabled: false,
        }
    }

    /// Sets the login password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Authenticates against a CAM namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Switches between HTTPS and HTTP.
    #[must_use]
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Sets the request timeout in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// `http(s)://address:port`
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.address, self.port)
    }

    /// Reads a JSON file holding one configuration object.
    pub fn from_json_file(path: impl AsRef<Path>) -> RestResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Reads `TM1_ADDRESS`, `TM1_PORT`, `TM1_USER` and the optional
    /// `TM1_PASSWORD`, `TM1_SSL`, `TM1_NAMESPACE`, `TM1_VERIFY`, `TM1_TIMEOUT`,
    /// `TM1_SESSION_CONTEXT` and `TM1_SANDBOXING_DISABLED` variables.
    pub fn from_env() -> RestResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> RestResult<Self> {
        let required = |name: &'static str| lookup(name).ok_or(RestError::MissingConfig(name));
        let mut config = Self::new(
            required("TM1_ADDRESS")?,
            parse_var("TM1_PORT", &required("TM1_PORT")?)?,
            required("TM1_USER")?,
        );
        if let Some(password) = lookup("TM1_PASSWORD") {
            config.password = password;
        }
        config.namespace = lookup("TM1_NAMESPACE").filter(|ns| !ns.is_empty());
        if let Some(ssl) = lookup("TM1_SSL") {
            config.ssl = parse_bool("TM1_SSL", &ssl)?;
        }
        if let Some(verify) = lookup("TM1_VERIFY") {
            config.verify = parse_bool("TM1_VERIFY", &verify)?;
        }
        if let Some(timeout) = lookup("TM1_TIMEOUT") {
            config.timeout_secs = Some(parse_var("TM1_TIMEOUT", &timeout)?);
        }
        if let Some(context) = lookup("TM1_SESSION_CONTEXT") {
            config.session_context = context;
        }
        if let Some(disabled) = lookup("TM1_SANDBOXING_DISABLED") {
            config.sandboxing_disabled = parse_bool("TM1_SANDBOXING_DISABLED", &disabled)?;
        }
        Ok(config)
    }
}

fn parse_var<T: FromStr>(name: &'static str, value: &str) -> RestResult<T> {
    value.trim().parse().map_err(|_| RestError::InvalidConfig {
        name,
        value: value.to_string(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> RestResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "t" => Ok(true),
        "0" | "false" | "no" | "f" => Ok(false),
        _ => Err(RestError::InvalidConfig {
            name,
            value: value.to_string(),
        }),
    }
}
