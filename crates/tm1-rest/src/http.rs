//! HTTP implementation of [`Transport`](crate::Transport).

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{
    blocking::{Client, RequestBuilder},
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use serde_json::Value;
use tracing::debug;

use crate::{ConnectionConfig, Method, Response, RestError, RestResult, Transport};

const API_CONTENT_TYPE: &str = "application/json; odata.streaming=true; charset=utf-8";
const API_ACCEPT: &str = "application/json;odata.metadata=none,text/plain";

/// Blocking reqwest-backed transport bound to one server.
///
/// Cheap to clone; clones share the connection pool and the session cookie.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    sandboxing_disabled: bool,
}

impl HttpTransport {
    /// Builds the client for `config`. No request is sent until the first call.
    pub fn connect(config: &ConnectionConfig) -> RestResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(API_CONTENT_TYPE));
        headers.insert(ACCEPT, HeaderValue::from_static(API_ACCEPT));
        headers.insert(
            "TM1-SessionContext",
            HeaderValue::from_str(&config.session_context)?,
        );
        let mut authorization = HeaderValue::from_str(&authorization_header(config))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);

        let mut builder = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .danger_accept_invalid_certs(!config.verify);
        if let Some(timeout) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url(),
            sandboxing_disabled: config.sandboxing_disabled,
        })
    }

    /// `http(s)://address:port`, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send(&self, method: Method, url: &str, body: Option<&Value>) -> RestResult<Response> {
        let full_url = format!("{}{}", self.base_url, url);
        debug!(%method, url, "sending request");
        let mut request: RequestBuilder = match method {
            Method::Get => self.client.get(&full_url),
            Method::Post => self.client.post(&full_url),
            Method::Patch => self.client.patch(&full_url),
            Method::Delete => self.client.delete(&full_url),
        };
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }
        let response = request.send()?;
        let status = response.status().as_u16();
        let text = response.text()?;
        if !(200..300).contains(&status) {
            debug!(%method, url, status, "request failed");
            return Err(RestError::Status {
                method,
                url: url.to_string(),
                status,
                message: text,
            });
        }
        Ok(Response::new(status, text))
    }
}

/// `Basic` for native security, `CAMNamespace` when a namespace is configured.
pub(crate) fn authorization_header(config: &ConnectionConfig) -> String {
    match &config.namespace {
        Some(namespace) => format!(
            "CAMNamespace {}",
            STANDARD.encode(format!("{}:{}:{}", config.user, config.password, namespace))
        ),
        None => format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", config.user, config.password))
        ),
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> RestResult<Response> {
        self.send(Method::Get, url, None)
    }

    fn post(&self, url: &str, body: Option<&Value>) -> RestResult<Response> {
        self.send(Method::Post, url, body)
    }

    fn patch(&self, url: &str, body: &Value) -> RestResult<Response> {
        self.send(Method::Patch, url, Some(body))
    }

    fn delete(&self, url: &str) -> RestResult<Response> {
        self.send(Method::Delete, url, None)
    }

    fn sandboxing_disabled(&self) -> bool {
        self.sandboxing_disabled
    }
}
