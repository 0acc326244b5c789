//! Transport layer for the TM1 REST API.
//!
//! Everything above this crate talks to the server through the [`Transport`]
//! capability set: GET, POST, PATCH and DELETE on server-relative URLs with
//! JSON bodies. [`http::HttpTransport`] is the production implementation and
//! [`mock::MockTransport`] replays scripted answers in tests.

pub mod config;
pub mod http;
pub mod mock;
pub mod session;

use std::fmt::Display;

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use thiserror::Error;

pub use config::ConnectionConfig;
pub use http::HttpTransport;
pub use session::SessionRegistry;

/// Convenience alias for results returned by the transport.
pub type RestResult<T> = Result<T, RestError>;

/// Errors raised while talking to the server.
#[derive(Error, Debug)]
pub enum RestError {
    /// Wrapper around reqwest errors (connection, TLS, timeout).
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    /// Request or response body was not the JSON we expected.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Reading a configuration file failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The server answered with a non-success status.
    #[error("{method} {url} failed with status {status}: {message}")]
    Status {
        /// Verb of the failed request.
        method: Method,
        /// Server-relative URL of the failed request.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, usually the server's error message.
        message: String,
    },
    /// A configured value cannot be sent as an HTTP header.
    #[error("{0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    /// A required configuration value was not supplied.
    #[error("missing configuration value: {0}")]
    MissingConfig(&'static str),
    /// A configuration value could not be parsed.
    #[error("invalid value for {name}: {value}")]
    InvalidConfig {
        /// Name of the setting.
        name: &'static str,
        /// Value as supplied.
        value: String,
    },
    /// A mock transport received a request nobody scripted.
    #[error("no scripted response for {method} {url}")]
    Unscripted {
        /// Verb of the request.
        method: Method,
        /// Server-relative URL of the request.
        url: String,
    },
}

impl RestError {
    /// HTTP status carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// `true` for a 404 answer.
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

/// HTTP verbs used against the REST API.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Upper-case verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Successful answer: status code plus the raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    body: String,
}

impl Response {
    /// Answer with `status` and a raw `body`.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 200 answer with a JSON body.
    pub fn json_body(value: &Value) -> Self {
        Self::new(200, value.to_string())
    }

    /// 204 answer without a body.
    pub fn no_content() -> Self {
        Self::new(204, "")
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Body as received.
    pub fn text(&self) -> &str {
        &self.body
    }

    /// `true` for a blank body.
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }

    /// Deserializes the body.
    pub fn json<T: DeserializeOwned>(&self) -> RestResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// `{"value": [...]}` envelope of OData collections.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ODataCollection<T> {
    /// Members of the collection.
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

/// The capability set consumed by every service.
///
/// URLs are server-relative (`/api/v1/...`). Implementations return
/// [`RestError::Status`] for any non-2xx answer and never retry.
pub trait Transport: Send + Sync {
    /// Reads `url`.
    fn get(&self, url: &str) -> RestResult<Response>;

    /// Posts an optional JSON `body` to `url`.
    fn post(&self, url: &str, body: Option<&Value>) -> RestResult<Response>;

    /// Patches `url` with a JSON `body`.
    fn patch(&self, url: &str, body: &Value) -> RestResult<Response>;

    /// Deletes `url`.
    fn delete(&self, url: &str) -> RestResult<Response>;

    /// Whether the server runs with sandboxes switched off.
    fn sandboxing_disabled(&self) -> bool {
        false
    }

    /// GETs `url` and maps a 404 to `false`.
    fn exists(&self, url: &str) -> RestResult<bool> {
        match self.get(url) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Re-exports for the most common types.
pub mod prelude {
    pub use crate::{
        config::ConnectionConfig, http::HttpTransport, session::SessionRegistry, Method,
        ODataCollection, Response, RestError, RestResult, Transport,
    };
}
