//! Mechanical request construction and execution.
//!
//! Translates a [`RequestContext`] into a reqwest call and materializes the
//! response so replay and download semantics are uniform. Classification of
//! failures into "no response" vs. "error status" happens here; everything
//! credential-related lives in the client.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::Error;
use crate::request_context::{MethodKind, RequestContext};

/// Fully-read response. The body is buffered so a download and a JSON call
/// go through the same path.
#[derive(Clone, Debug)]
pub struct PipelineResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl PipelineResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub(crate) async fn dispatch(
    http: &Client,
    base_url: &str,
    ctx: &RequestContext,
    bearer: Option<&str>,
) -> Result<PipelineResponse, Error> {
    let builder = build_request(http, base_url, ctx, bearer)?;
    let resp = builder.send().await?;
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.bytes().await?;
    if status.is_success() {
        Ok(PipelineResponse {
            status,
            headers,
            body,
        })
    } else {
        Err(Error::Status(
            status,
            String::from_utf8_lossy(&body).into_owned(),
        ))
    }
}

fn build_request(
    http: &Client,
    base_url: &str,
    ctx: &RequestContext,
    bearer: Option<&str>,
) -> Result<RequestBuilder, Error> {
    let url = resolve_target(base_url, &ctx.target);
    let mut builder = match &ctx.method {
        MethodKind::Get | MethodKind::Download => {
            let mut builder = http.get(&url);
            if let Some(payload) = &ctx.payload {
                builder = builder.query(payload);
            }
            builder
        }
        MethodKind::Form => http.post(&url).multipart(multipart_form(ctx)?),
        MethodKind::Send(method) => {
            let mut builder = http.request(method.clone(), &url);
            if let Some(payload) = &ctx.payload {
                builder = builder.json(payload);
            }
            builder
        }
    };
    if !ctx.headers.is_empty() {
        builder = builder.headers(ctx.headers.clone());
    }
    if let Some(token) = bearer {
        builder = builder.bearer_auth(token);
    }
    Ok(builder)
}

fn multipart_form(ctx: &RequestContext) -> Result<Form, Error> {
    let mut form = Form::new();
    match &ctx.payload {
        Some(Value::Object(fields)) => {
            for (name, value) in fields {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                form = form.text(name.clone(), text);
            }
        }
        Some(_) => {
            return Err(Error::Config(
                "Form payload must be a JSON object".to_string(),
            ));
        }
        None => {}
    }
    for part in &ctx.files {
        form = form.part(
            part.field.clone(),
            Part::bytes(part.bytes.clone()).file_name(part.filename.clone()),
        );
    }
    Ok(form)
}

fn resolve_target(base_url: &str, target: &str) -> String {
    if target.starts_with("http") {
        target.to_string()
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), target)
    }
}
