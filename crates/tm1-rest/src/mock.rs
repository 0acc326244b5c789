//! Scripted in-memory transport for tests.

use parking_lot::Mutex;
use serde_json::Value;

use crate::{Method, Response, RestError, RestResult, Transport};

/// A request observed by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Verb of the request.
    pub method: Method,
    /// Server-relative URL as requested.
    pub url: String,
    /// JSON body, when one was sent.
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
enum Outcome {
    Reply(Response),
    Fail { status: u16, message: String },
}

#[derive(Debug)]
struct Rule {
    method: Method,
    fragment: String,
    body_fragment: Option<String>,
    outcome: Outcome,
    once: bool,
}

impl Rule {
    fn matches(&self, method: Method, url: &str, body: Option<&str>) -> bool {
        self.method == method
            && url.contains(&self.fragment)
            && self
                .body_fragment
                .as_deref()
                .is_none_or(|needle| body.is_some_and(|body| body.contains(needle)))
    }
}

/// Transport answering from a list of rules.
///
/// A rule matches when the method agrees and the URL contains its fragment
/// (and, for [`MockTransport::on_body`], the serialized body contains the body
/// fragment). Rules are tried in the order they were added; `*_once` rules are consumed
/// by their first match. Unmatched requests fail with [`RestError::Unscripted`].
#[derive(Debug, Default)]
pub struct MockTransport {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Call>>,
    sandboxing_disabled: bool,
}

impl MockTransport {
    /// Transport without rules; every request fails as unscripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports sandboxes as switched off on the server.
    #[must_use]
    pub fn with_sandboxing_disabled(mut self, disabled: bool) -> Self {
        self.sandboxing_disabled = disabled;
        self
    }

    fn push(&self, method: Method, fragment: &str, outcome: Outcome, once: bool) -> &Self {
        self.rules.lock().push(Rule {
            method,
            fragment: fragment.to_string(),
            body_fragment: None,
            outcome,
            once,
        });
        self
    }

    /// Always answer matching requests whose JSON body contains `body_fragment`.
    pub fn on_body(
        &self,
        method: Method,
        fragment: &str,
        body_fragment: &str,
        body: Value,
    ) -> &Self {
        self.rules.lock().push(Rule {
            method,
            fragment: fragment.to_string(),
            body_fragment: Some(body_fragment.to_string()),
            outcome: Outcome::Reply(Response::json_body(&body)),
            once: false,
        });
        self
    }

    /// Always answer matching requests with `body` as JSON.
    pub fn on(&self, method: Method, fragment: &str, body: Value) -> &Self {
        self.push(
            method,
            fragment,
            Outcome::Reply(Response::json_body(&body)),
            false,
        )
    }

    /// Answer the next matching request with `body` as JSON.
    pub fn on_once(&self, method: Method, fragment: &str, body: Value) -> &Self {
        self.push(
            method,
            fragment,
            Outcome::Reply(Response::json_body(&body)),
            true,
        )
    }

    /// Always answer matching requests with a plain-text body.
    pub fn on_text(&self, method: Method, fragment: &str, body: &str) -> &Self {
        self.push(
            method,
            fragment,
            Outcome::Reply(Response::new(200, body)),
            false,
        )
    }

    /// Always answer matching requests with 204 No Content.
    pub fn on_empty(&self, method: Method, fragment: &str) -> &Self {
        self.push(
            method,
            fragment,
            Outcome::Reply(Response::no_content()),
            false,
        )
    }

    /// Always fail matching requests with `status`.
    pub fn fail(&self, method: Method, fragment: &str, status: u16) -> &Self {
        let outcome = Outcome::Fail {
            status,
            message: format!("scripted failure {status}"),
        };
        self.push(method, fragment, outcome, false)
    }

    /// Fail the next matching request with `status`.
    pub fn fail_once(&self, method: Method, fragment: &str, status: u16) -> &Self {
        let outcome = Outcome::Fail {
            status,
            message: format!("scripted failure {status}"),
        };
        self.push(method, fragment, outcome, true)
    }

    /// Every request seen so far, in arrival order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Requests with `method` whose URL contains `fragment`.
    pub fn calls_matching(&self, method: Method, fragment: &str) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.method == method && call.url.contains(fragment))
            .cloned()
            .collect()
    }

    fn answer(&self, method: Method, url: &str, body: Option<&Value>) -> RestResult<Response> {
        self.calls.lock().push(Call {
            method,
            url: url.to_string(),
            body: body.cloned(),
        });
        let outcome = {
            let text = body.map(Value::to_string);
            let mut rules = self.rules.lock();
            let position = rules
                .iter()
                .position(|rule| rule.matches(method, url, text.as_deref()));
            match position {
                Some(position) if rules[position].once => rules.remove(position).outcome,
                Some(position) => rules[position].outcome.clone(),
                None => {
                    return Err(RestError::Unscripted {
                        method,
                        url: url.to_string(),
                    })
                }
            }
        };
        match outcome {
            Outcome::Reply(response) => Ok(response),
            Outcome::Fail { status, message } => Err(RestError::Status {
                method,
                url: url.to_string(),
                status,
                message,
            }),
        }
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str) -> RestResult<Response> {
        self.answer(Method::Get, url, None)
    }

    fn post(&self, url: &str, body: Option<&Value>) -> RestResult<Response> {
        self.answer(Method::Post, url, body)
    }

    fn patch(&self, url: &str, body: &Value) -> RestResult<Response> {
        self.answer(Method::Patch, url, Some(body))
    }

    fn delete(&self, url: &str) -> RestResult<Response> {
        self.answer(Method::Delete, url, None)
    }

    fn sandboxing_disabled(&self) -> bool {
        self.sandboxing_disabled
    }
}
