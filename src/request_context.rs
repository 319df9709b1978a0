//! Replayable capture of an outbound request.
//!
//! Everything needed to re-issue the call verbatim lives here; only the
//! bearer header differs between the first attempt and a post-refresh replay.

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

/// Hook invoked around dispatch; `complete_send` always runs, success or not.
pub type LifecycleHook = Arc<dyn Fn() + Send + Sync>;

/// How the payload is carried on the wire.
#[derive(Clone, Debug)]
pub enum MethodKind {
    /// GET with the payload serialized as query parameters.
    Get,
    /// Multipart form upload built from the payload fields plus file parts.
    Form,
    /// GET whose response body is consumed as raw bytes.
    Download,
    /// Any other verb with a JSON body.
    Send(Method),
}

#[derive(Clone, Debug)]
pub struct FilePart {
    pub field: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct RequestContext {
    pub target: String,
    pub method: MethodKind,
    pub payload: Option<Value>,
    pub headers: HeaderMap,
    pub files: Vec<FilePart>,
    pub before_send: Option<LifecycleHook>,
    pub complete_send: Option<LifecycleHook>,
}

impl RequestContext {
    pub fn new(method: MethodKind, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method,
            payload: None,
            headers: HeaderMap::new(),
            files: Vec::new(),
            before_send: None,
            complete_send: None,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(MethodKind::Get, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(MethodKind::Send(Method::POST), target)
    }

    pub fn put(target: impl Into<String>) -> Self {
        Self::new(MethodKind::Send(Method::PUT), target)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(MethodKind::Send(Method::DELETE), target)
    }

    pub fn form(target: impl Into<String>) -> Self {
        Self::new(MethodKind::Form, target)
    }

    pub fn download(target: impl Into<String>) -> Self {
        Self::new(MethodKind::Download, target)
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn file(mut self, field: impl Into<String>, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.files.push(FilePart {
            field: field.into(),
            filename: filename.into(),
            bytes,
        });
        self
    }

    pub fn before_send(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.before_send = Some(Arc::new(hook));
        self
    }

    pub fn complete_send(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.complete_send = Some(Arc::new(hook));
        self
    }
}
