//! # Portico
//!
//! **Portico** is an adapter layer that lets an application HTTP framework
//! run unmodified atop multiple embedded Rust server engines. The engines
//! already know how to serve HTTP; what Portico adds is one consistent
//! request/response/body/cookie/multipart/async-execution model,
//! translated to and from three structurally different native APIs:
//!
//! - **`may_minihttp`** — coroutine callback engine: one synchronous
//!   `call` per request on a `may` coroutine
//! - **`tiny_http`** — blocking pull engine: worker threads draining a
//!   shared accept queue, responses consume the request
//! - **`hyper`** — async task engine: service futures on an owned tokio
//!   runtime, blocking work bridged onto the blocking pool
//!
//! ## Architecture
//!
//! The library is organized leaf-first:
//!
//! - **[`buffer`]** - cursor-based byte buffer backing all body handling
//! - **[`headers`]** - ordered, case-insensitive, multi-valued header map
//! - **[`cookies`]** - cookie model and per-request cookie collection
//! - **[`multipart`]** - completed multipart uploads
//! - **[`body`]** - buffering-versus-deferral decisions for request bodies
//! - **[`codec`]** - body codecs keyed by media type
//! - **[`exchange`]** - request/response wrappers and the async bridge
//! - **[`binding`]** - typed argument binding with total binder resolution
//! - **[`encoders`]** - file response encoders with conditional-request
//!   handling
//! - **[`handler`]** - the per-request entry point shared by every engine
//! - **[`server`]** - configuration, the engine adapter contract, and the
//!   three engine implementations
//! - **[`error`]** - the error taxonomy
//!
//! ## Request flow
//!
//! A native request reaches its engine adapter, which serves static
//! resources directly or wraps the native objects behind the
//! [`server::raw`] traits and calls [`handler::HttpHandler::service`].
//! The handler builds an [`exchange::Exchange`] and hands it to the
//! application's [`handler::RequestDispatcher`]. Application code pulls
//! typed arguments through the [`binding::BinderRegistry`], which decides
//! per argument whether to read headers, parameters, cookies, multipart
//! parts or the buffered body. The dispatcher either returns the exchange
//! with a response draft (the handler finalizes it onto the native
//! response, routing file-like bodies through [`encoders`]) or suspends
//! into an async continuation, in which case the engine waits on a
//! completion gate until [`exchange::AsyncExchange::complete`] fires.
//!
//! ## Concurrency model
//!
//! The handler's registries are built once at start and shared read-only;
//! `service` is safe under concurrent invocation with no cross-request
//! state. Per-request state is owned by the servicing call and *moves*
//! into a continuation on suspension, so the single-owner rule is enforced
//! by the compiler rather than by convention.
//!
//! ## Quick start
//!
//! ```no_run
//! use portico::exchange::ResponseBody;
//! use portico::handler::{Dispatched, HttpHandler, RequestDispatcher};
//! use portico::server::{EngineServer, ServerConfig, TinyHttpServer};
//! use std::sync::Arc;
//!
//! struct Hello;
//!
//! impl RequestDispatcher for Hello {
//!     fn dispatch(&self, mut exchange: portico::exchange::Exchange) -> Dispatched {
//!         let _ = exchange
//!             .response_mut()
//!             .set_body(ResponseBody::Text("Hello".to_string()));
//!         Dispatched::Completed(Box::new(exchange))
//!     }
//! }
//!
//! let handler = Arc::new(HttpHandler::new(Arc::new(Hello)));
//! let mut server = TinyHttpServer::configure(ServerConfig::default(), handler).unwrap();
//! server.start_server().unwrap();
//! println!("listening on {}", server.uri());
//! ```

pub mod binding;
pub mod body;
pub mod buffer;
pub mod codec;
pub mod cookies;
pub mod encoders;
pub mod error;
pub mod exchange;
pub mod handler;
pub mod headers;
pub mod httpdate;
pub mod multipart;
pub mod server;

pub use buffer::ByteBuf;
pub use cookies::{Cookie, CookieJar};
pub use error::{BufferError, ConversionError, HttpError, LifecycleError, ServerError};
pub use exchange::{AsyncExchange, CompletionGate, Exchange, ExchangeRequest, ExchangeResponse};
pub use handler::{Dispatched, HttpHandler, RequestDispatcher, RequestObserver, ServiceOutcome};
pub use headers::Headers;
pub use multipart::CompletedUpload;
pub use server::{EngineServer, ServerConfig};
