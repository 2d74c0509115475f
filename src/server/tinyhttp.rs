//! Engine adapter for `tiny_http`, the blocking pull engine.
//!
//! Requests are pulled off a shared accept queue by a pool of worker
//! threads. The native request object is owned: body bytes are read from
//! it on demand, and responding consumes it, which is this engine's
//! completion style. Streamed bodies map onto `tiny_http`'s reader-backed
//! responses, so this engine streams chunks natively.

use crate::error::{HttpError, ServerError};
use crate::handler::{HttpHandler, ServiceOutcome};
use crate::headers::Headers;
use crate::server::adapter::EngineServer;
use crate::server::config::ServerConfig;
use crate::server::raw::{
    read_limited, ChunkReceiver, RawRequest, RawResponse, RequestHead, ResponseHead,
};
use crate::server::statics::StaticResolver;
use http::Method;
use std::io::{self, Cursor, Read};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Header names the engine computes itself from the body it is given.
const ENGINE_OWNED_HEADERS: [&str; 2] = ["content-length", "transfer-encoding"];

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

struct TinyRawRequest {
    head: RequestHead,
    native: Arc<Mutex<Option<tiny_http::Request>>>,
    max_body_size: Option<usize>,
}

impl RawRequest for TinyRawRequest {
    fn head(&self) -> &RequestHead {
        &self.head
    }

    fn read_body(&mut self) -> Result<Vec<u8>, HttpError> {
        let mut guard = self.native.lock().expect("native request poisoned");
        match guard.as_mut() {
            Some(request) => read_limited(request.as_reader(), self.max_body_size),
            None => Ok(Vec::new()),
        }
    }
}

struct TinyRawResponse {
    native: Arc<Mutex<Option<tiny_http::Request>>>,
}

impl TinyRawResponse {
    fn take_native(&self) -> Result<tiny_http::Request, HttpError> {
        self.native
            .lock()
            .expect("native request poisoned")
            .take()
            .ok_or_else(|| {
                HttpError::ResponseWrite(io::Error::new(
                    io::ErrorKind::Other,
                    "native request already responded",
                ))
            })
    }

    fn native_headers(head: &ResponseHead) -> Vec<tiny_http::Header> {
        head.headers
            .iter()
            .filter(|(name, _)| {
                !ENGINE_OWNED_HEADERS
                    .iter()
                    .any(|owned| name.eq_ignore_ascii_case(owned))
            })
            .filter_map(|(name, value)| {
                tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
            })
            .collect()
    }
}

impl RawResponse for TinyRawResponse {
    fn send(&mut self, head: ResponseHead, body: Vec<u8>) -> Result<(), HttpError> {
        let native = self.take_native()?;
        let length = body.len();
        let response = tiny_http::Response::new(
            tiny_http::StatusCode(head.status),
            Self::native_headers(&head),
            Cursor::new(body),
            Some(length),
            None,
        );
        native.respond(response).map_err(HttpError::ResponseWrite)
    }

    fn send_stream(&mut self, head: ResponseHead, chunks: ChunkReceiver) -> Result<(), HttpError> {
        let native = self.take_native()?;
        let response = tiny_http::Response::new(
            tiny_http::StatusCode(head.status),
            Self::native_headers(&head),
            ChunkRead::new(chunks),
            None,
            None,
        );
        native.respond(response).map_err(HttpError::ResponseWrite)
    }
}

/// Adapts the chunk channel into the `Read` the engine consumes, so chunks
/// are written to the socket as they arrive.
struct ChunkRead {
    chunks: ChunkReceiver,
    pending: Vec<u8>,
    offset: usize,
    done: bool,
}

impl ChunkRead {
    fn new(chunks: ChunkReceiver) -> Self {
        Self {
            chunks,
            pending: Vec::new(),
            offset: 0,
            done: false,
        }
    }
}

impl Read for ChunkRead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.offset < self.pending.len() {
                let n = (self.pending.len() - self.offset).min(buf.len());
                buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
                self.offset += n;
                return Ok(n);
            }
            if self.done {
                return Ok(0);
            }
            match self.chunks.recv() {
                Ok(Ok(chunk)) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                Ok(Err(e)) => {
                    self.done = true;
                    return Err(e);
                }
                Err(_) => {
                    self.done = true;
                    return Ok(0);
                }
            }
        }
    }
}

fn service_one(
    handler: &HttpHandler,
    statics: &StaticResolver,
    config: &ServerConfig,
    request: tiny_http::Request,
) {
    let method: Method = request.method().as_str().parse().unwrap_or(Method::GET);
    let uri = request.url().to_string();
    let headers: Headers = request
        .headers()
        .iter()
        .map(|h| (h.field.to_string(), h.value.to_string()))
        .collect();
    let remote_addr = request.remote_addr().copied();
    let head = RequestHead::new(method, uri, headers, remote_addr);

    let Some(path) = config.strip_context(head.path()).map(str::to_string) else {
        respond_error(request, 404, "Not Found");
        return;
    };
    if head.method == Method::GET || head.method == Method::HEAD {
        if let Some((bytes, content_type)) = statics.resolve(&path) {
            let response = tiny_http::Response::from_data(bytes).with_header(
                tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
                    .expect("static content type header"),
            );
            if let Err(e) = request.respond(response) {
                warn!(error = %e, "failed to write static response");
            }
            return;
        }
    }

    let query = head.query().to_string();
    let uri = if query.is_empty() {
        path
    } else {
        format!("{path}?{query}")
    };
    let head = RequestHead::new(head.method, uri, head.headers, remote_addr);

    let native = Arc::new(Mutex::new(Some(request)));
    let raw_request = Box::new(TinyRawRequest {
        head,
        native: native.clone(),
        max_body_size: config.max_body_size,
    });
    let raw_response = Box::new(TinyRawResponse {
        native: native.clone(),
    });

    match handler.service(raw_request, raw_response) {
        Ok(ServiceOutcome::Completed) => {}
        Ok(ServiceOutcome::Suspended(gate)) => {
            // Hold the worker until the continuation releases the request.
            gate.wait();
        }
        Err(e) => {
            if let Some(native) = native.lock().expect("native request poisoned").take() {
                respond_error(native, e.status(), &e.to_string());
            }
        }
    }
}

fn respond_error(request: tiny_http::Request, status: u16, message: &str) {
    let body = serde_json::json!({ "error": message }).to_string();
    let response = tiny_http::Response::from_string(body)
        .with_status_code(tiny_http::StatusCode(status))
        .with_header(
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                .expect("error content type header"),
        );
    if let Err(e) = request.respond(response) {
        warn!(error = %e, "failed to write error response");
    }
}

/// The `tiny_http` engine server.
pub struct TinyHttpServer {
    config: Arc<ServerConfig>,
    handler: Arc<HttpHandler>,
    statics: Arc<StaticResolver>,
    server: Option<Arc<tiny_http::Server>>,
    workers: Vec<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    bound: Option<SocketAddr>,
}

impl TinyHttpServer {
    /// Translate the engine-neutral configuration into a constructed, not
    /// yet started server.
    pub fn configure(config: ServerConfig, handler: Arc<HttpHandler>) -> Result<Self, ServerError> {
        if config.validate_ssl()? {
            return Err(ServerError::Tls(
                "the tiny_http engine build does not terminate TLS; front it with a terminating proxy"
                    .to_string(),
            ));
        }
        let statics = Arc::new(StaticResolver::from_config(&config)?);
        handler.apply_server_config(&config);
        Ok(Self {
            config: Arc::new(config),
            handler,
            statics,
            server: None,
            workers: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            bound: None,
        })
    }

    fn worker_count(&self) -> usize {
        self.config
            .engine_options
            .get("worker_threads")
            .and_then(|v| v.parse().ok())
            .or(self.config.worker_threads)
            .unwrap_or_else(default_workers)
    }
}

impl EngineServer for TinyHttpServer {
    fn start_server(&mut self) -> Result<(), ServerError> {
        if self.is_running() {
            return Ok(());
        }
        self.handler.start();
        let addr = format!("{}:{}", self.config.host, self.config.configured_port());
        let server = tiny_http::Server::http(addr.as_str())
            .map_err(|e| ServerError::Engine(format!("failed to bind {addr}: {e}")))?;
        // The engine reports its real bound address, so port 0 needs no
        // pre-reservation here.
        let bound = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| ServerError::Engine("engine bound to a non-IP address".to_string()))?;
        let server = Arc::new(server);
        self.running.store(true, Ordering::SeqCst);
        for worker in 0..self.worker_count() {
            let server = server.clone();
            let handler = self.handler.clone();
            let statics = self.statics.clone();
            let config = self.config.clone();
            let running = self.running.clone();
            let handle = std::thread::Builder::new()
                .name(format!("tiny-http-worker-{worker}"))
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        match server.recv_timeout(Duration::from_millis(100)) {
                            Ok(Some(request)) => {
                                debug!(worker, "request pulled from accept queue");
                                service_one(&handler, &statics, &config, request);
                            }
                            Ok(None) => {}
                            Err(e) => {
                                if running.load(Ordering::SeqCst) {
                                    error!(error = %e, "accept queue receive failed");
                                }
                                break;
                            }
                        }
                    }
                })
                .map_err(ServerError::Io)?;
            self.workers.push(handle);
        }
        self.server = Some(server);
        self.bound = Some(bound);
        info!(addr = %bound, workers = self.worker_count(), "tiny_http engine started");
        Ok(())
    }

    fn stop_server(&mut self) -> Result<(), ServerError> {
        if self.server.is_none() {
            return Ok(());
        }
        self.running.store(false, Ordering::SeqCst);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        self.server = None;
        self.bound = None;
        info!("tiny_http engine stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        match self.bound {
            Some(addr) => {
                self.running.load(Ordering::SeqCst) && TcpStream::connect(addr).is_ok()
            }
            None => false,
        }
    }

    fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound
    }

    fn host(&self) -> String {
        self.config.host.clone()
    }

    fn scheme(&self) -> &str {
        self.config.scheme()
    }

    fn port(&self) -> u16 {
        self.bound
            .map(|a| a.port())
            .unwrap_or_else(|| self.config.configured_port())
    }
}
