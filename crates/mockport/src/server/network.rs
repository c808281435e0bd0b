//! Listener construction for endpoint servers.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Resolve `host:port` to the first socket address.
pub async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address for {host}:{port}"),
            )
        })
}

/// Create a TCP listener with SO_REUSEADDR set.
///
/// A restarted endpoint can rebind its port while old connections sit in
/// TIME_WAIT. Two live listeners on one port are still refused.
pub fn create_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// Resolve and bind in one step, mapping failures to a bind error for `host:port`.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, super::ServerError> {
    let bind_err = |source| super::ServerError::Bind {
        addr: format!("{host}:{port}"),
        source,
    };
    let addr = resolve(host, port).await.map_err(bind_err)?;
    create_listener(addr).map_err(bind_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_listener_on_same_port_fails() {
        let first = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();
        assert!(create_listener(addr).is_err());
    }

    #[tokio::test]
    async fn test_rebind_after_drop() {
        let first = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();
        drop(first);
        assert!(create_listener(addr).is_ok());
    }

    #[tokio::test]
    async fn test_bind_reports_address() {
        let held = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let port = held.local_addr().unwrap().port();
        let err = bind("127.0.0.1", port).await.unwrap_err();
        assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    }
}
