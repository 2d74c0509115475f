//! Engine adapter for `hyper`, the async task engine.
//!
//! Connections are served as futures on an owned tokio runtime; the
//! blocking handler runs on the runtime's blocking pool and hands its
//! finalized response back through a oneshot channel. The engine keeps the
//! connection open for async continuations simply by not resolving the
//! service future until the completion gate releases.

use crate::error::{HttpError, ServerError};
use crate::handler::{HttpHandler, ServiceOutcome};
use crate::headers::Headers;
use crate::server::adapter::EngineServer;
use crate::server::config::ServerConfig;
use crate::server::raw::{ChunkReceiver, RawRequest, RawResponse, RequestHead, ResponseHead};
use crate::server::statics::StaticResolver;
use bytes::Bytes;
use http::Method;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

const ENGINE_OWNED_HEADERS: [&str; 2] = ["content-length", "transfer-encoding"];

struct HyperRawRequest {
    head: RequestHead,
    /// Collected by the async layer before dispatch; this engine's body
    /// already lives in its own buffers by the time the handler runs.
    body: Option<Vec<u8>>,
}

impl RawRequest for HyperRawRequest {
    fn head(&self) -> &RequestHead {
        &self.head
    }

    fn read_body(&mut self) -> Result<Vec<u8>, HttpError> {
        Ok(self.body.take().unwrap_or_default())
    }
}

struct HyperRawResponse {
    reply: Option<oneshot::Sender<(ResponseHead, Vec<u8>)>>,
}

impl RawResponse for HyperRawResponse {
    fn send(&mut self, head: ResponseHead, body: Vec<u8>) -> Result<(), HttpError> {
        match self.reply.take() {
            Some(reply) => {
                let _ = reply.send((head, body));
                Ok(())
            }
            None => Err(HttpError::ResponseWrite(std::io::Error::new(
                std::io::ErrorKind::Other,
                "response already sent",
            ))),
        }
    }

    fn send_stream(&mut self, head: ResponseHead, chunks: ChunkReceiver) -> Result<(), HttpError> {
        // Aggregate: this adapter serves complete bodies.
        let mut body = Vec::new();
        for chunk in chunks.iter() {
            match chunk {
                Ok(bytes) => body.extend_from_slice(&bytes),
                Err(e) => {
                    warn!(error = %e, "response stream errored mid-body");
                    break;
                }
            }
        }
        self.send(head, body)
    }
}

struct HyperContext {
    handler: Arc<HttpHandler>,
    statics: Arc<StaticResolver>,
    config: Arc<ServerConfig>,
}

fn error_response(status: u16, message: &str) -> hyper::Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message }).to_string();
    let mut response = hyper::Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() =
        hyper::StatusCode::from_u16(status).unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn into_native(head: ResponseHead, body: Vec<u8>) -> hyper::Response<Full<Bytes>> {
    let mut response = hyper::Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() =
        hyper::StatusCode::from_u16(head.status).unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);
    for (name, value) in head.headers.iter() {
        if ENGINE_OWNED_HEADERS
            .iter()
            .any(|owned| name.eq_ignore_ascii_case(owned))
        {
            continue;
        }
        let Ok(header_name) = hyper::header::HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        let Ok(header_value) = hyper::header::HeaderValue::from_str(value) else {
            continue;
        };
        response.headers_mut().append(header_name, header_value);
    }
    response
}

async fn handle(
    context: Arc<HyperContext>,
    remote_addr: SocketAddr,
    request: hyper::Request<hyper::body::Incoming>,
) -> Result<hyper::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = request.into_parts();
    let method: Method = parts.method;
    let uri = parts.uri.to_string();
    let headers: Headers = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).to_string(),
            )
        })
        .collect();
    let head = RequestHead::new(method, uri, headers, Some(remote_addr));

    let Some(path) = context.config.strip_context(head.path()).map(str::to_string) else {
        return Ok(error_response(404, "Not Found"));
    };
    if head.method == Method::GET || head.method == Method::HEAD {
        if let Some((bytes, content_type)) = context.statics.resolve(&path) {
            let mut response = hyper::Response::new(Full::new(Bytes::from(bytes)));
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static(content_type),
            );
            return Ok(response);
        }
    }

    let collected = match body.collect().await {
        Ok(collected) => collected.to_bytes().to_vec(),
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return Ok(error_response(400, "error reading request body"));
        }
    };
    if let Some(limit) = context.config.max_body_size {
        if collected.len() > limit {
            let e = HttpError::BodyTooLarge { limit };
            return Ok(error_response(e.status(), &e.to_string()));
        }
    }

    let query = head.query().to_string();
    let uri = if query.is_empty() {
        path
    } else {
        format!("{path}?{query}")
    };
    let head = RequestHead::new(head.method, uri, head.headers, Some(remote_addr));

    let (reply_tx, reply_rx) = oneshot::channel();
    let handler = context.handler.clone();
    let body = if collected.is_empty() {
        None
    } else {
        Some(collected)
    };
    tokio::task::spawn_blocking(move || {
        let raw_request = Box::new(HyperRawRequest { head, body });
        let raw_response = Box::new(HyperRawResponse {
            reply: Some(reply_tx),
        });
        match handler.service(raw_request, raw_response) {
            Ok(ServiceOutcome::Completed) => {}
            Ok(ServiceOutcome::Suspended(gate)) => {
                // Keep the blocking slot until the continuation signals;
                // the service future below stays pending meanwhile.
                gate.wait();
            }
            Err(e) => {
                // The reply sender went down with the raw response; the
                // await side maps the closed channel to an error status.
                error!(error = %e, "service call failed");
            }
        }
    });

    match reply_rx.await {
        Ok((response_head, body)) => Ok(into_native(response_head, body)),
        Err(_) => Ok(error_response(500, "no response produced")),
    }
}

/// The `hyper` engine server.
pub struct HyperServer {
    config: Arc<ServerConfig>,
    handler: Arc<HttpHandler>,
    statics: Arc<StaticResolver>,
    runtime: Option<tokio::runtime::Runtime>,
    shutdown: Option<watch::Sender<bool>>,
    bound: Option<SocketAddr>,
}

impl HyperServer {
    /// Translate the engine-neutral configuration into a constructed, not
    /// yet started server.
    pub fn configure(config: ServerConfig, handler: Arc<HttpHandler>) -> Result<Self, ServerError> {
        if config.validate_ssl()? {
            return Err(ServerError::Tls(
                "the hyper engine build does not terminate TLS; front it with a terminating proxy"
                    .to_string(),
            ));
        }
        let statics = Arc::new(StaticResolver::from_config(&config)?);
        handler.apply_server_config(&config);
        Ok(Self {
            config: Arc::new(config),
            handler,
            statics,
            runtime: None,
            shutdown: None,
            bound: None,
        })
    }

    fn worker_threads(&self) -> Option<usize> {
        self.config
            .engine_options
            .get("worker_threads")
            .and_then(|v| v.parse().ok())
            .or(self.config.worker_threads)
    }
}

impl EngineServer for HyperServer {
    fn start_server(&mut self) -> Result<(), ServerError> {
        if self.is_running() {
            return Ok(());
        }
        self.handler.start();
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all();
        if let Some(workers) = self.worker_threads() {
            builder.worker_threads(workers);
        }
        let runtime = builder.build().map_err(ServerError::Io)?;

        let addr = format!("{}:{}", self.config.host, self.config.configured_port());
        let listener = runtime
            .block_on(TcpListener::bind(addr.as_str()))
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let bound = listener.local_addr().map_err(ServerError::Io)?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let context = Arc::new(HyperContext {
            handler: self.handler.clone(),
            statics: self.statics.clone(),
            config: self.config.clone(),
        });
        runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    accepted = listener.accept() => {
                        let (stream, peer) = match accepted {
                            Ok(pair) => pair,
                            Err(e) => {
                                warn!(error = %e, "accept failed");
                                continue;
                            }
                        };
                        let context = context.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| handle(context.clone(), peer, req));
                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                }
            }
        });

        self.runtime = Some(runtime);
        self.shutdown = Some(shutdown_tx);
        self.bound = Some(bound);
        info!(addr = %bound, "hyper engine started");
        Ok(())
    }

    fn stop_server(&mut self) -> Result<(), ServerError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_millis(500));
            info!("hyper engine stopped");
        }
        self.bound = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        match self.bound {
            Some(addr) => self.runtime.is_some() && TcpStream::connect(addr).is_ok(),
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
