//! Listening-socket setup: dual-stack IPv6 when possible, IPv4 fallback.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Bind the accept socket. For an IPv6 address the v6-only option is
/// cleared so v4-mapped peers connect too; if that bind fails and the
/// address was the wildcard, fall back to IPv4-only.
pub fn bind_listener(bind: &str, port: u16) -> Result<TcpListener> {
    let addr: IpAddr = bind
        .parse()
        .with_context(|| format!("bind address {bind:?} is not an IP address"))?;

    match addr {
        IpAddr::V6(v6) => match bind_socket(SocketAddr::new(IpAddr::V6(v6), port), true) {
            Ok(listener) => {
                info!(%addr, port, "listening dual-stack");
                Ok(listener)
            }
            Err(e) if v6.is_unspecified() => {
                warn!("IPv6 bind failed ({e:#}); falling back to IPv4-only");
                let v4 = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
                let listener = bind_socket(v4, false)?;
                info!(addr = %v4.ip(), port, "listening IPv4-only");
                Ok(listener)
            }
            Err(e) => Err(e),
        },
        IpAddr::V4(_) => {
            let listener = bind_socket(SocketAddr::new(addr, port), false)?;
            info!(%addr, port, "listening IPv4");
            Ok(listener)
        }
    }
}

fn bind_socket(addr: SocketAddr, dual_stack: bool) -> Result<TcpListener> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .context("failed to create listening socket")?;

    if dual_stack {
        socket
            .set_only_v6(false)
            .context("failed to clear IPV6_V6ONLY")?;
    }
    socket
        .set_reuse_address(true)
        .context("failed to set SO_REUSEADDR")?;
    socket
        .set_keepalive(true)
        .context("failed to set SO_KEEPALIVE")?;

    socket
        .bind(&addr.into())
        .with_context(|| format!("failed to bind {addr}"))?;
    socket.listen(128).context("listen failed")?;
    socket
        .set_nonblocking(true)
        .context("failed to set non-blocking")?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener).context("failed to register listener with tokio")
}
