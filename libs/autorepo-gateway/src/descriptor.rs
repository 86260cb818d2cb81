use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP verb of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    #[must_use]
    pub fn as_method(self) -> http::Method {
        match self {
            Self::Get => http::Method::GET,
            Self::Post => http::Method::POST,
            Self::Put => http::Method::PUT,
            Self::Patch => http::Method::PATCH,
            Self::Delete => http::Method::DELETE,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of one outbound call.
///
/// Built per invocation and consumed by [`CallGateway::call`]. The only field
/// that changes between attempts is `retries_remaining`, which the gateway
/// decrements when it resubmits after a transport timeout.
///
/// [`CallGateway::call`]: crate::CallGateway::call
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescriptor {
    path: String,
    verb: Verb,
    body: Option<Value>,
    retries_remaining: u32,
}

impl CallDescriptor {
    #[must_use]
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            verb,
            body: None,
            retries_remaining: 0,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Verb::Get, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Verb::Post, path).with_body(body)
    }

    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Verb::Put, path).with_body(body)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Verb::Patch, path).with_body(body)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Verb::Delete, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Number of resubmissions allowed after transport timeouts.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries_remaining = retries;
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn verb(&self) -> Verb {
        self.verb
    }

    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn retries_remaining(&self) -> u32 {
        self.retries_remaining
    }

    /// Identical descriptor with one retry unit consumed.
    ///
    /// Returns `None` once the budget is exhausted.
    #[must_use]
    pub(crate) fn resubmission(&self) -> Option<Self> {
        let retries_remaining = self.retries_remaining.checked_sub(1)?;
        Some(Self {
            retries_remaining,
            ..self.clone()
        })
    }
}
