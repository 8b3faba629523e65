use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// HTTP method of a [`crate::LogicalRequest`].
///
/// Only the two methods spoken by the supported REST APIs exist, so every
/// `match` at the transport boundary is exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Fetch a resource, all parameters live in the query string
    #[default]
    Get,
    /// Submit a body (usually JSON) to an endpoint
    Post,
}

impl Method {
    /// The canonical, upper-case name of the method
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
        }
    }
}
