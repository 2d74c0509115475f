//! The per-request entry point shared by every engine.
//!
//! An [`HttpHandler`] is constructed once, started once, and then services
//! native request/response pairs concurrently with no shared mutable state
//! beyond its read-only registries. Each `service` call builds an
//! [`Exchange`], hands it to the external application dispatch entry point,
//! and guarantees a terminal native response on every path that does not
//! suspend into an async continuation.

use crate::binding::BinderRegistry;
use crate::codec::{media, CodecRegistry};
use crate::encoders::{
    EncodeAction, FileEncoder, FileKind, ResponseEncoder, StreamFileEncoder, SystemFileEncoder,
};
use crate::error::{HttpError, LifecycleError};
use crate::exchange::{
    CompletionGate, Exchange, ExchangeRequest, ExchangeResponse, Finalize, ResponseBody,
};
use crate::server::config::{MultipartLimits, ServerConfig};
use crate::server::raw::{RawRequest, RawResponse, RequestHead};
use serde_json::json;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, error, info, warn};

/// Outcome of one application dispatch.
pub enum Dispatched {
    /// The response draft is ready; the handler finalizes it.
    Completed(Box<Exchange>),
    /// An async continuation was registered via
    /// [`Exchange::execute_async`]; the engine awaits the gate.
    Suspended(CompletionGate),
    /// Dispatch failed; the handler maps the error to a terminal response.
    Failed(Box<Exchange>, HttpError),
}

/// The external application dispatch entry point: router, controller
/// invocation and filters live behind this seam.
pub trait RequestDispatcher: Send + Sync {
    fn dispatch(&self, exchange: Exchange) -> Dispatched;
}

/// Observes each request exactly once, after its final status is known.
/// The one canonical run-once-per-request mechanism.
pub trait RequestObserver: Send + Sync {
    fn on_complete(&self, head: &RequestHead, status: u16, error: Option<&HttpError>);
}

/// Outcome of one `service` call, as the engine adapter sees it.
pub enum ServiceOutcome {
    /// The native response was finalized synchronously.
    Completed,
    /// A continuation is outstanding; the engine must wait on the gate
    /// before releasing the native connection.
    Suspended(CompletionGate),
}

const STATE_CREATED: u8 = 0;
const STATE_STARTED: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Read-mostly per-server state shared with exchanges: codec, binder and
/// encoder registries plus observers. Built once at start, immutable after.
pub(crate) struct HandlerCore {
    pub(crate) codecs: Arc<CodecRegistry>,
    encoders: HashMap<FileKind, Arc<dyn ResponseEncoder>>,
    observers: Vec<Arc<dyn RequestObserver>>,
    multipart_limits: MultipartLimits,
}

impl HandlerCore {
    fn emit(
        &self,
        response: &mut ExchangeResponse,
        request: &ExchangeRequest,
        body: ResponseBody,
    ) -> Result<(), HttpError> {
        let action = match body {
            ResponseBody::Empty => EncodeAction::Bytes(Vec::new()),
            ResponseBody::Text(text) => {
                if response.content_type().is_none() {
                    response.set_content_type(media::TEXT_PLAIN)?;
                }
                EncodeAction::Bytes(text.into_bytes())
            }
            ResponseBody::Bytes(bytes) => {
                if response.content_type().is_none() {
                    response.set_content_type(media::APPLICATION_OCTET_STREAM)?;
                }
                EncodeAction::Bytes(bytes)
            }
            ResponseBody::Json(value) => {
                let content_type = response
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| media::APPLICATION_JSON.to_string());
                let codec = self.codecs.require(&content_type)?;
                let bytes = codec.encode(&value)?;
                response.set_content_type(content_type)?;
                EncodeAction::Bytes(bytes)
            }
            ResponseBody::File(file) => {
                let kind = file.kind();
                let encoder = self.encoders.get(&kind).ok_or_else(|| HttpError::Codec {
                    media_type: String::new(),
                    message: format!("no encoder registered for {kind:?}"),
                })?;
                encoder.encode(request, response, file)?
            }
            ResponseBody::Stream(chunks) => EncodeAction::Stream(chunks),
        };

        match action {
            EncodeAction::NotModified => {
                let (mut raw, _) = match response.take_for_flush() {
                    Some(parts) => parts,
                    None => return Ok(()),
                };
                raw.send(response.build_head(), Vec::new())
            }
            EncodeAction::Bytes(bytes) => {
                response.set_content_length(bytes.len() as u64)?;
                let (mut raw, _) = match response.take_for_flush() {
                    Some(parts) => parts,
                    None => return Ok(()),
                };
                raw.send(response.build_head(), bytes)
            }
            EncodeAction::File(path) => {
                let (mut raw, _) = match response.take_for_flush() {
                    Some(parts) => parts,
                    None => return Ok(()),
                };
                raw.send_file(response.build_head(), &path)
            }
            EncodeAction::Stream(chunks) => {
                let (mut raw, _) = match response.take_for_flush() {
                    Some(parts) => parts,
                    None => return Ok(()),
                };
                raw.send_stream(response.build_head(), chunks)
            }
        }
    }

    fn notify(&self, head: &RequestHead, status: u16, error: Option<&HttpError>) {
        for observer in &self.observers {
            observer.on_complete(head, status, error);
        }
    }
}

impl Finalize for HandlerCore {
    fn finalize(
        &self,
        request: &mut ExchangeRequest,
        response: &mut ExchangeResponse,
        error: Option<&HttpError>,
    ) {
        if response.is_flushed() {
            return;
        }
        if let Some(error) = error {
            let status = error.status();
            let _ = response.set_status(status);
            let _ = response.set_content_type(media::APPLICATION_JSON);
            let _ = response.set_body(ResponseBody::Json(json!({ "error": error.to_string() })));
        }
        let body = response.take_body();
        let result = self.emit(response, request, body);
        if let Err(emit_error) = result {
            // Best effort: the first encode attempt failed before the head
            // was flushed, so a bare error response can still go out.
            warn!(error = %emit_error, "response encoding failed; sending error response");
            let status = emit_error.status();
            let _ = response.set_status(status);
            let _ = response.set_content_type(media::APPLICATION_JSON);
            let fallback = json!({ "error": emit_error.to_string() });
            let emit = self.emit(
                response,
                request,
                ResponseBody::Bytes(fallback.to_string().into_bytes()),
            );
            if let Err(second) = emit {
                error!(error = %second, "failed to send error response");
            }
        }
        self.notify(request.head(), response.status(), error);
    }
}

/// Lifecycle: `created → started → (servicing*) → closed`.
pub struct HttpHandler {
    state: AtomicU8,
    dispatcher: Arc<dyn RequestDispatcher>,
    core: OnceLock<Arc<HandlerCore>>,
    codecs: Arc<CodecRegistry>,
    binders: Arc<BinderRegistry>,
    observers: Vec<Arc<dyn RequestObserver>>,
    /// Interior-mutable so engine adapters can reconcile the server
    /// configuration into a shared handler before start.
    multipart_limits: Mutex<MultipartLimits>,
    async_file_serving: AtomicBool,
}

impl HttpHandler {
    pub fn new(dispatcher: Arc<dyn RequestDispatcher>) -> Self {
        Self {
            state: AtomicU8::new(STATE_CREATED),
            dispatcher,
            core: OnceLock::new(),
            codecs: Arc::new(CodecRegistry::with_defaults()),
            binders: Arc::new(BinderRegistry::new()),
            observers: Vec::new(),
            multipart_limits: Mutex::new(MultipartLimits::default()),
            async_file_serving: AtomicBool::new(false),
        }
    }

    /// Replace the codec registry before start.
    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Arc::new(codecs);
        self
    }

    /// Replace the binder registry before start.
    pub fn with_binders(mut self, binders: BinderRegistry) -> Self {
        self.binders = Arc::new(binders);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replaced by the engine adapter's server configuration when the
    /// handler is wired through one.
    pub fn with_multipart_limits(self, limits: MultipartLimits) -> Self {
        *self.multipart_limits.lock().expect("multipart limits poisoned") = limits;
        self
    }

    /// Replaced by the engine adapter's server configuration when the
    /// handler is wired through one.
    pub fn with_async_file_serving(self, enabled: bool) -> Self {
        self.async_file_serving.store(enabled, Ordering::SeqCst);
        self
    }

    /// Reconcile the engine-neutral server configuration into the handler.
    /// Engine adapters call this at configure time; the values are frozen
    /// into the per-server state when the handler starts, so applying
    /// configuration afterwards has no effect and is logged.
    pub fn apply_server_config(&self, config: &ServerConfig) {
        if self.state.load(Ordering::SeqCst) != STATE_CREATED {
            warn!("server configuration applied after handler start is ignored");
            return;
        }
        *self.multipart_limits.lock().expect("multipart limits poisoned") =
            config.multipart.clone();
        self.async_file_serving
            .store(config.async_file_serving, Ordering::SeqCst);
    }

    /// The binder registry, for the external dispatch layer.
    pub fn binders(&self) -> Arc<BinderRegistry> {
        self.binders.clone()
    }

    /// Start the handler: resolve registries and warm the per-server state.
    /// Safe to call repeatedly; a no-op once started.
    pub fn start(&self) {
        if self
            .state
            .compare_exchange(STATE_CREATED, STATE_STARTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let core = self.build_core();
        let _ = self.core.set(core);
        info!(
            codecs = self.codecs.len(),
            observers = self.observers.len(),
            "http handler started"
        );
    }

    fn build_core(&self) -> Arc<HandlerCore> {
        let mut encoders: HashMap<FileKind, Arc<dyn ResponseEncoder>> = HashMap::new();
        encoders.insert(FileKind::Disk, Arc::new(FileEncoder));
        encoders.insert(FileKind::Streamed, Arc::new(StreamFileEncoder));
        encoders.insert(
            FileKind::System,
            Arc::new(SystemFileEncoder::new(
                self.async_file_serving.load(Ordering::SeqCst),
            )),
        );
        Arc::new(HandlerCore {
            codecs: self.codecs.clone(),
            encoders,
            observers: self.observers.clone(),
            multipart_limits: self
                .multipart_limits
                .lock()
                .expect("multipart limits poisoned")
                .clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_STARTED
    }

    /// Service one native request/response pair. Independent of every other
    /// call; safe under concurrent invocation from multiple threads.
    pub fn service(
        &self,
        raw_request: Box<dyn RawRequest>,
        raw_response: Box<dyn RawResponse>,
    ) -> Result<ServiceOutcome, HttpError> {
        match self.state.load(Ordering::SeqCst) {
            STATE_CLOSED => return Err(LifecycleError::AlreadyClosed.into()),
            STATE_CREATED => self.start(),
            _ => {}
        }
        let core = self
            .core
            .get()
            .cloned()
            .unwrap_or_else(|| self.build_core());

        let head = raw_request.head().clone();
        debug!(method = %head.method, path = head.path(), "servicing request");

        let request = ExchangeRequest::new(
            raw_request,
            core.codecs.clone(),
            core.multipart_limits.clone(),
        );
        let response = ExchangeResponse::new(raw_response);
        let exchange = Exchange::new(request, response, core.clone());

        let dispatcher = self.dispatcher.clone();
        match catch_unwind(AssertUnwindSafe(move || dispatcher.dispatch(exchange))) {
            Ok(Dispatched::Completed(exchange)) => {
                let status = exchange.finalize_now(None);
                debug!(status, "request completed synchronously");
                Ok(ServiceOutcome::Completed)
            }
            Ok(Dispatched::Failed(exchange, dispatch_error)) => {
                let status = exchange.finalize_now(Some(&dispatch_error));
                warn!(status, error = %dispatch_error, "dispatch failed");
                Ok(ServiceOutcome::Completed)
            }
            Ok(Dispatched::Suspended(gate)) => {
                debug!("request suspended into async continuation");
                Ok(ServiceOutcome::Suspended(gate))
            }
            Err(panic) => {
                // The exchange was dropped during unwind; its drop guard
                // already emitted a terminal 500.
                error!(panic = ?panic, "dispatch panicked");
                let panic_error = HttpError::Server(crate::error::ServerError::Engine(
                    "application dispatch panicked".to_string(),
                ));
                core.notify(&head, 500, Some(&panic_error));
                Ok(ServiceOutcome::Completed)
            }
        }
    }

    /// Release the handler. Terminal: later `service` calls fail fast.
    pub fn close(&self) {
        let previous = self.state.swap(STATE_CLOSED, Ordering::SeqCst);
        if previous != STATE_CLOSED {
            info!("http handler closed");
        }
    }
}
