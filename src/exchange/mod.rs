//! The request/response exchange and its asynchronous execution bridge.
//!
//! An [`Exchange`] pairs exactly one request with exactly one response. It
//! is created per incoming native request, owned exclusively by the
//! servicing invocation, and either finalized synchronously or *moved* into
//! an async continuation — Rust ownership makes "never shared across
//! requests" and "at most one continuation" structural rather than checked.

mod request;
mod response;

pub use request::{attrs, BodyTarget, DecodedBody, ExchangeRequest};
pub use response::{ExchangeResponse, ResponseBody, ResponseWriter};

use crate::error::{HttpError, ServerError};
use may::sync::mpsc;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Finalization pipeline supplied by the handler: encodes the response
/// draft onto the native response and notifies request observers. Must not
/// panic; internal failures are mapped to a best-effort error response.
pub(crate) trait Finalize: Send + Sync {
    fn finalize(
        &self,
        request: &mut ExchangeRequest,
        response: &mut ExchangeResponse,
        error: Option<&HttpError>,
    );
}

pub struct Exchange {
    request: ExchangeRequest,
    response: ExchangeResponse,
    finalizer: Arc<dyn Finalize>,
}

impl Exchange {
    pub(crate) fn new(
        request: ExchangeRequest,
        response: ExchangeResponse,
        finalizer: Arc<dyn Finalize>,
    ) -> Self {
        Self {
            request,
            response,
            finalizer,
        }
    }

    pub fn request(&self) -> &ExchangeRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut ExchangeRequest {
        &mut self.request
    }

    pub fn response(&self) -> &ExchangeResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ExchangeResponse {
        &mut self.response
    }

    /// Both halves at once, for binders that read the request while the
    /// response draft is being built.
    pub fn parts_mut(&mut self) -> (&mut ExchangeRequest, &mut ExchangeResponse) {
        (&mut self.request, &mut self.response)
    }

    /// Run the finalization pipeline now (synchronous path).
    pub(crate) fn finalize_now(mut self, error: Option<&HttpError>) -> u16 {
        let finalizer = Arc::clone(&self.finalizer);
        finalizer.finalize(&mut self.request, &mut self.response, error);
        self.response.status()
    }

    /// Bridge to the engine's asynchronous continuation facility.
    ///
    /// Consumes the exchange and runs `continuation` off the servicing
    /// thread on a coroutine; the engine keeps the connection open until
    /// [`AsyncExchange::complete`] signals the returned gate. Registering a
    /// second continuation is impossible: the exchange has moved.
    pub fn execute_async(
        self,
        continuation: impl FnOnce(AsyncExchange) + Send + 'static,
    ) -> Result<CompletionGate, HttpError> {
        if !self.request.async_supported() {
            return Err(ServerError::Engine(
                "engine does not support async continuations".to_string(),
            )
            .into());
        }
        let (tx, rx) = mpsc::channel();
        let async_exchange = AsyncExchange {
            exchange: Some(self),
            gate: Some(tx),
        };
        may::go!(move || {
            // The guard inside AsyncExchange finalizes with a 500 and
            // releases the gate if the continuation panics before
            // completing, so the connection is never left open.
            if let Err(panic) = catch_unwind(AssertUnwindSafe(move || continuation(async_exchange)))
            {
                error!(panic = ?panic, "async continuation panicked");
            }
        });
        Ok(CompletionGate { rx })
    }
}

/// Ownership of an exchange inside an async continuation.
///
/// `complete()` is the single designated ownership-release point: it runs
/// the same finalization pipeline as the synchronous path, then signals the
/// gate the engine is blocked on. Dropping without completing finalizes
/// with a 500 and still releases the gate.
pub struct AsyncExchange {
    exchange: Option<Exchange>,
    gate: Option<mpsc::Sender<u16>>,
}

impl AsyncExchange {
    pub fn request(&self) -> &ExchangeRequest {
        &self.exchange.as_ref().expect("exchange present until complete").request
    }

    pub fn request_mut(&mut self) -> &mut ExchangeRequest {
        &mut self.exchange.as_mut().expect("exchange present until complete").request
    }

    pub fn response(&self) -> &ExchangeResponse {
        &self.exchange.as_ref().expect("exchange present until complete").response
    }

    pub fn response_mut(&mut self) -> &mut ExchangeResponse {
        &mut self.exchange.as_mut().expect("exchange present until complete").response
    }

    /// Finalize the response and signal the engine that the interaction is
    /// over. Consumes the handle; a second completion cannot be expressed.
    pub fn complete(mut self) {
        let exchange = self.exchange.take().expect("exchange present until complete");
        let status = exchange.finalize_now(None);
        debug!(status, "async continuation completed");
        if let Some(gate) = self.gate.take() {
            let _ = gate.send(status);
        }
    }

    /// Finalize with an error through the same pipeline, for continuations
    /// that fail without panicking.
    pub fn complete_with_error(mut self, error: HttpError) {
        let exchange = self.exchange.take().expect("exchange present until complete");
        let status = exchange.finalize_now(Some(&error));
        error!(status, error = %error, "async continuation completed with error");
        if let Some(gate) = self.gate.take() {
            let _ = gate.send(status);
        }
    }
}

impl Drop for AsyncExchange {
    fn drop(&mut self) {
        if let Some(exchange) = self.exchange.take() {
            let status = exchange.finalize_now(Some(&HttpError::Server(ServerError::Engine(
                "async continuation aborted before completion".to_string(),
            ))));
            error!(status, "async continuation dropped without completing");
            if let Some(gate) = self.gate.take() {
                let _ = gate.send(status);
            }
        }
    }
}

/// Engine-side handle for an outstanding continuation. The engine blocks
/// on [`CompletionGate::wait`] before releasing the native connection.
pub struct CompletionGate {
    rx: mpsc::Receiver<u16>,
}

impl CompletionGate {
    /// Block until the continuation completes. Returns the final status, or
    /// `None` if the continuation vanished without signalling (the drop
    /// guard makes that unreachable in practice).
    pub fn wait(self) -> Option<u16> {
        self.rx.recv().ok()
    }
}
