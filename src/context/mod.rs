//! Per-request context handed to middleware and route handlers.

use std::collections::HashMap;

use crate::Request;

/// Named captures from a matched route pattern, e.g. `timestamp` in
/// `/__debug__/data/:timestamp`.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Returns the value captured for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Returns the number of captured parameters.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Per-request context: the request plus whatever routing extracted from it.
#[derive(Debug)]
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    /// Creates a context without path parameters.
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    /// Creates a context carrying the parameters captured by the router.
    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self { request, params }
    }

    /// Returns the request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the captured path parameters.
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Gives the request back, dropping any route captures.
    pub fn into_request(self) -> Request {
        self.request
    }
}
