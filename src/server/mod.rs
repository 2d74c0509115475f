//! Engine-neutral server configuration, the per-engine adapter contract,
//! and the three engine implementations.

pub mod adapter;
pub mod config;
pub mod form;
pub mod hyper_engine;
pub mod minihttp;
pub mod raw;
pub mod statics;
pub mod tinyhttp;

pub use adapter::EngineServer;
pub use config::{MultipartLimits, RuntimeConfig, ServerConfig, SslConfig, StaticResourceConfig};
pub use hyper_engine::HyperServer;
pub use minihttp::MiniHttpServer;
pub use statics::StaticResolver;
pub use tinyhttp::TinyHttpServer;
