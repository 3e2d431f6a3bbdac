//! Test doubles for the bridge's collaborators.
//!
//! [`RecordingHttp`] answers network requests from a script of canned
//! responses; [`RecordingBackend`] stands in for a sandbox so facades can be
//! exercised without booting an engine.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::{BackendKind, SandboxBackend};
use crate::error::{Result, SandboxError};
use crate::http::{HttpClient, HttpRequest, HttpResponse};

/// [`HttpClient`] that records every request. Canned responses are served
/// in order; once they run out every request gets `200` with an empty body.
#[derive(Default)]
pub struct RecordingHttp {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: HttpResponse) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HttpClient for RecordingHttp {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());
        Ok(next.unwrap_or_else(|| HttpResponse {
            status: 200,
            headers: BTreeMap::new(),
            body: String::new(),
        }))
    }
}

/// [`SandboxBackend`] with a fixed method set and canned results.
pub struct RecordingBackend {
    runner_id: String,
    methods: Vec<String>,
    properties: HashMap<String, Value>,
    responses: HashMap<String, Value>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl RecordingBackend {
    pub fn new(runner_id: impl Into<String>) -> Self {
        Self {
            runner_id: runner_id.into(),
            methods: Vec::new(),
            properties: HashMap::new(),
            responses: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Declare a method that answers `undefined`.
    pub fn with_method(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.methods.contains(&name) {
            self.methods.push(name);
        }
        self
    }

    pub fn with_response(self, method: impl Into<String>, value: Value) -> Self {
        let method = method.into();
        let mut backend = self.with_method(method.clone());
        backend.responses.insert(method, value);
        backend
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Every invocation seen so far, in order.
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls().iter().filter(|(m, _)| m == method).count()
    }
}

#[async_trait]
impl SandboxBackend for RecordingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::InProcess
    }

    fn runner_id(&self) -> &str {
        &self.runner_id
    }

    async fn method_names(&self) -> Result<Vec<String>> {
        let mut names = self.methods.clone();
        names.sort();
        Ok(names)
    }

    async fn has_method(&self, method: &str) -> Result<bool> {
        Ok(self.methods.iter().any(|m| m == method))
    }

    async fn read_property(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.properties.get(name).cloned().filter(|v| !v.is_null()))
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Option<Value>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((method.to_string(), args));
        }
        if !self.methods.iter().any(|m| m == method) {
            return Err(SandboxError::MethodNotFound {
                method: method.to_string(),
            });
        }
        Ok(self.responses.get(method).cloned().filter(|v| !v.is_null()))
    }

    async fn shutdown(&self) {}
}
