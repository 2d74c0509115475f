//! Engine adapter for `may_minihttp`, the coroutine callback engine.
//!
//! Each request arrives as a synchronous `HttpService::call` on a `may`
//! coroutine. The native response object cannot leave the call scope, so
//! the adapter collects the finalized head and body in a slot and applies
//! them after the handler (and any async continuation) is done — blocking
//! the coroutine on the completion gate is exactly this engine's way of
//! keeping the connection open.

use crate::error::{HttpError, ServerError};
use crate::handler::{HttpHandler, ServiceOutcome};
use crate::headers::Headers;
use crate::server::adapter::{reserve_port, EngineServer};
use crate::server::config::{RuntimeConfig, ServerConfig};
use crate::server::raw::{
    read_limited, ChunkReceiver, RawRequest, RawResponse, RequestHead, ResponseHead,
};
use crate::server::statics::StaticResolver;
use http::Method;
use may::coroutine::JoinHandle;
use may_minihttp::{HttpServer, HttpService, Request, Response};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

struct MiniRawRequest {
    head: RequestHead,
    /// Drained from the engine's connection buffer before dispatch; handed
    /// over on the first (and only) body read.
    body: Option<Vec<u8>>,
}

impl RawRequest for MiniRawRequest {
    fn head(&self) -> &RequestHead {
        &self.head
    }

    fn read_body(&mut self) -> Result<Vec<u8>, HttpError> {
        Ok(self.body.take().unwrap_or_default())
    }
}

/// The finalized native output, captured for application after `call`
/// regains control.
struct Outgoing {
    head: ResponseHead,
    body: Vec<u8>,
}

struct MiniRawResponse {
    slot: Arc<Mutex<Option<Outgoing>>>,
}

impl RawResponse for MiniRawResponse {
    fn send(&mut self, head: ResponseHead, body: Vec<u8>) -> Result<(), HttpError> {
        *self.slot.lock().expect("response slot poisoned") = Some(Outgoing { head, body });
        Ok(())
    }

    fn send_stream(&mut self, head: ResponseHead, chunks: ChunkReceiver) -> Result<(), HttpError> {
        // This engine writes one body_vec per response; aggregate.
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

#[derive(Clone)]
struct MiniService {
    handler: Arc<HttpHandler>,
    statics: Arc<StaticResolver>,
    config: Arc<ServerConfig>,
}

/// Header names the engine computes itself from the body it is given.
const ENGINE_OWNED_HEADERS: [&str; 2] = ["content-length", "transfer-encoding"];

impl MiniService {
    fn apply(res: &mut Response, outgoing: Outgoing) {
        res.status_code(outgoing.head.status as usize, reason_str(&outgoing.head));
        for (name, value) in outgoing.head.headers.iter() {
            if ENGINE_OWNED_HEADERS
                .iter()
                .any(|owned| name.eq_ignore_ascii_case(owned))
            {
                continue;
            }
            let line = format!("{name}: {value}").into_boxed_str();
            res.header(Box::leak(line));
        }
        res.body_vec(outgoing.body);
    }

    fn apply_error(res: &mut Response, status: u16, message: &str) {
        res.status_code(status as usize, status_reason(status));
        res.header("Content-Type: application/json");
        res.body_vec(serde_json::json!({ "error": message }).to_string().into_bytes());
    }
}

fn reason_str(head: &ResponseHead) -> &'static str {
    match &head.reason {
        Some(reason) => Box::leak(reason.clone().into_boxed_str()),
        None => status_reason(head.status),
    }
}

impl HttpService for MiniService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let method: Method = req.method().parse().unwrap_or(Method::GET);
        let uri = req.path().to_string();
        let headers: Headers = req
            .headers()
            .iter()
            .map(|h| {
                (
                    h.name.to_string(),
                    String::from_utf8_lossy(h.value).to_string(),
                )
            })
            .collect();
        let head = RequestHead::new(method, uri, headers, None);

        let Some(path) = self.config.strip_context(head.path()).map(str::to_string) else {
            MiniService::apply_error(res, 404, "Not Found");
            return Ok(());
        };

        if head.method == Method::GET || head.method == Method::HEAD {
            if let Some((bytes, content_type)) = self.statics.resolve(&path) {
                res.status_code(200, "OK");
                let line = format!("Content-Type: {content_type}").into_boxed_str();
                res.header(Box::leak(line));
                res.body_vec(bytes);
                return Ok(());
            }
        }

        // Drain the body while the native buffers are still in scope.
        let body = if head.content_length().unwrap_or(0) > 0 {
            let mut reader = req.body();
            match read_limited(&mut reader, self.config.max_body_size) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    MiniService::apply_error(res, e.status(), &e.to_string());
                    return Ok(());
                }
            }
        } else {
            None
        };

        let query = head.query().to_string();
        let head = RequestHead::new(head.method, rewrite_uri(&path, &query), head.headers, None);
        let slot = Arc::new(Mutex::new(None));
        let raw_request = Box::new(MiniRawRequest { head, body });
        let raw_response = Box::new(MiniRawResponse { slot: slot.clone() });

        match self.handler.service(raw_request, raw_response) {
            Ok(ServiceOutcome::Completed) => {}
            Ok(ServiceOutcome::Suspended(gate)) => {
                // The connection stays open until the continuation signals.
                gate.wait();
            }
            Err(e) => {
                MiniService::apply_error(res, e.status(), &e.to_string());
                return Ok(());
            }
        }

        match slot.lock().expect("response slot poisoned").take() {
            Some(outgoing) => MiniService::apply(res, outgoing),
            None => {
                error!("request finished without a native response");
                MiniService::apply_error(res, 500, "no response produced");
            }
        }
        Ok(())
    }
}

fn rewrite_uri(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

/// The `may_minihttp` engine server.
pub struct MiniHttpServer {
    config: Arc<ServerConfig>,
    handler: Arc<HttpHandler>,
    statics: Arc<StaticResolver>,
    bound: Option<SocketAddr>,
    join: Option<JoinHandle<()>>,
}

impl MiniHttpServer {
    /// Translate the engine-neutral configuration into a constructed, not
    /// yet started server.
    pub fn configure(config: ServerConfig, handler: Arc<HttpHandler>) -> Result<Self, ServerError> {
        if config.validate_ssl()? {
            return Err(ServerError::Tls(
                "the may_minihttp engine does not terminate TLS; front it with a terminating proxy"
                    .to_string(),
            ));
        }
        let statics = Arc::new(StaticResolver::from_config(&config)?);
        handler.apply_server_config(&config);
        let stack_size = config
            .engine_options
            .get("stack_size")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| RuntimeConfig::from_env().stack_size);
        may::config().set_stack_size(stack_size);
        Ok(Self {
            config: Arc::new(config),
            handler,
            statics,
            bound: None,
            join: None,
        })
    }
}

impl EngineServer for MiniHttpServer {
    fn start_server(&mut self) -> Result<(), ServerError> {
        if self.is_running() {
            return Ok(());
        }
        self.handler.start();
        let port = reserve_port(&self.config.host, self.config.configured_port())?;
        let addr = format!("{}:{}", self.config.host, port);
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| ServerError::Engine(format!("cannot resolve {addr}")))?;
        let service = MiniService {
            handler: self.handler.clone(),
            statics: self.statics.clone(),
            config: self.config.clone(),
        };
        let join = HttpServer(service).start(socket_addr).map_err(|source| {
            ServerError::Bind {
                addr: addr.clone(),
                source,
            }
        })?;
        // Wait until the engine accepts connections before reporting bound.
        for _ in 0..50 {
            if TcpStream::connect(socket_addr).is_ok() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.bound = Some(socket_addr);
        self.join = Some(join);
        info!(addr = %socket_addr, "may_minihttp engine started");
        Ok(())
    }

    fn stop_server(&mut self) -> Result<(), ServerError> {
        if let Some(join) = self.join.take() {
            // SAFETY: cancellation of the accept coroutine is the engine's
            // documented shutdown path; the handle is owned and valid.
            unsafe {
                join.coroutine().cancel();
            }
            let _ = join.join();
            info!("may_minihttp engine stopped");
        }
        self.bound = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        match self.bound {
            Some(addr) => TcpStream::connect(addr).is_ok(),
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
