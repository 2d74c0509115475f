//! The uniform engine server contract.
//!
//! One implementation per native engine. The core depends only on this
//! trait; nothing above the `server` module names an engine-specific type.

use crate::error::ServerError;
use std::net::SocketAddr;

/// A constructed native server wired to the shared handler.
///
/// Construction does not start the server. `start_server`/`stop_server`
/// are idempotent relative to the actual running state, and the address
/// accessors report the really-bound values after start — which matters
/// when port `0` (any free port) was configured.
pub trait EngineServer: Send {
    fn start_server(&mut self) -> Result<(), ServerError>;

    fn stop_server(&mut self) -> Result<(), ServerError>;

    /// Reflects actual native state, not a cached flag.
    fn is_running(&self) -> bool;

    /// The actually bound address, once started.
    fn bound_addr(&self) -> Option<SocketAddr>;

    fn host(&self) -> String;

    fn scheme(&self) -> &str;

    /// The actually bound port after start; the configured port before.
    fn port(&self) -> u16;

    fn uri(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host(), self.port())
    }

    fn url(&self) -> String {
        self.uri()
    }
}

/// Resolve port `0` ahead of engines that cannot report their bound
/// address: bind once, record the kernel-assigned port, release.
pub(crate) fn reserve_port(host: &str, port: u16) -> Result<u16, ServerError> {
    if port != 0 {
        return Ok(port);
    }
    let listener =
        std::net::TcpListener::bind((host, 0)).map_err(|source| ServerError::Bind {
            addr: format!("{host}:0"),
            source,
        })?;
    let port = listener
        .local_addr()
        .map_err(|source| ServerError::Bind {
            addr: format!("{host}:0"),
            source,
        })?
        .port();
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_port_resolves_zero() {
        let port = reserve_port("127.0.0.1", 0).unwrap();
        assert_ne!(port, 0);
        assert_eq!(reserve_port("127.0.0.1", 9000).unwrap(), 9000);
    }
}
