// src/collab/exchange.rs

//! Network collaborator contract: one request, one response, decoded as
//! JSON into the task output.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::task::{Finisher, Operation, TaskContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("transport failed: {0}")]
    Transport(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Output of an [`Exchange`].
pub type Fetched<T> = Result<T, ExchangeError>;

/// Completion callback handed to [`Transport::send`].
pub type Responder = Box<dyn FnOnce(Result<Response, ExchangeError>) + Send>;

/// Performs a single request. `respond` may be called from any thread,
/// exactly once.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: Request, respond: Responder);
}

/// Deferred operation that sends one request and finishes with the decoded
/// body, or the reason it could not be produced.
pub struct Exchange<T> {
    transport: Arc<dyn Transport>,
    request: Request,
    _output: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned + Send + Sync + 'static> Exchange<T> {
    pub fn new(transport: Arc<dyn Transport>, request: Request) -> Self {
        Self {
            transport,
            request,
            _output: PhantomData,
        }
    }

    pub fn get(transport: Arc<dyn Transport>, path: impl Into<String>) -> Self {
        Self::new(
            transport,
            Request {
                method: Method::Get,
                path: path.into(),
                body: None,
            },
        )
    }

    pub fn post(transport: Arc<dyn Transport>, path: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(
            transport,
            Request {
                method: Method::Post,
                path: path.into(),
                body: Some(body),
            },
        )
    }

    pub fn request(&self) -> &Request {
        &self.request
    }
}

/// Decode a response body. An empty body decodes like JSON `null`.
pub fn decode<T: DeserializeOwned>(response: &Response) -> Fetched<T> {
    if !response.is_success() {
        return Err(ExchangeError::Status(response.status));
    }
    let body: &[u8] = if response.body.is_empty() {
        b"null"
    } else {
        &response.body
    };
    serde_json::from_slice(body).map_err(|err| ExchangeError::Decode(err.to_string()))
}

impl<T: DeserializeOwned + Send + Sync + 'static> Operation for Exchange<T> {
    type Output = Fetched<T>;

    fn execute(&self, finisher: Finisher<Self::Output>, cx: &TaskContext) {
        let label = cx.label().to_string();
        debug!(task = %label, method = %self.request.method, path = %self.request.path, "sending request");

        self.transport.send(
            self.request.clone(),
            Box::new(move |result| {
                let fetched = result.and_then(|response| decode::<T>(&response));
                if let Err(err) = &fetched {
                    warn!(task = %label, error = %err, "exchange failed");
                }
                finisher.finish(fetched);
            }),
        );
    }

    fn label(&self) -> Option<String> {
        Some(format!("{} {}", self.request.method, self.request.path))
    }
}
