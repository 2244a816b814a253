//! Underlying network provider
//!
//! The seam between the primitives and the actual network. Production code
//! uses [`TokioNetwork`] (host sockets and getaddrinfo); tests and emulated
//! networks supply their own implementation.

use super::conn::{BoxConn, StreamConn, TcpConn};
use crate::context::Context;
use crate::tlsx::default_root_store;
use crate::Result;
use async_trait::async_trait;
use rustls::RootCertStore;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpStream, UdpSocket};

/// Primitive network operations everything else is built on
#[async_trait]
pub trait UnderlyingNetwork: Send + Sync {
    /// Open a connection to an IP endpoint.
    async fn dial_context(&self, ctx: &Context, network: &str, addr: SocketAddr)
        -> Result<BoxConn>;

    /// Resolve `domain` with the platform resolver.
    async fn get_addr_info(&self, ctx: &Context, domain: &str) -> Result<Vec<IpAddr>>;

    /// Name reported as the network of the system resolver
    fn get_addr_info_resolver_network(&self) -> &str {
        "getaddrinfo"
    }

    /// Bind a UDP socket for QUIC.
    fn listen_udp(&self, addr: SocketAddr) -> Result<std::net::UdpSocket>;

    /// Trust store used when the caller supplies none
    fn default_root_store(&self) -> Arc<RootCertStore>;
}

/// The host network, through tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioNetwork;

#[async_trait]
impl UnderlyingNetwork for TokioNetwork {
    async fn dial_context(
        &self,
        _ctx: &Context,
        network: &str,
        addr: SocketAddr,
    ) -> Result<BoxConn> {
        check_family(network, addr)?;
        match network {
            "tcp" | "tcp4" | "tcp6" => {
                let stream = TcpStream::connect(addr).await?;
                stream.set_nodelay(true).ok();
                Ok(Box::new(TcpConn::from_tcp(stream)?))
            }
            "udp" | "udp4" | "udp6" => {
                let bind: SocketAddr = if addr.is_ipv4() {
                    (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
                } else {
                    (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
                };
                let socket = UdpSocket::bind(bind).await?;
                socket.connect(addr).await?;
                Ok(Box::new(StreamConn::from_udp(socket)?))
            }
            other => Err(unsupported_network(other)),
        }
    }

    async fn get_addr_info(&self, _ctx: &Context, domain: &str) -> Result<Vec<IpAddr>> {
        let mut addrs: Vec<IpAddr> = Vec::new();
        for addr in tokio::net::lookup_host((domain, 0)).await? {
            if !addrs.contains(&addr.ip()) {
                addrs.push(addr.ip());
            }
        }
        Ok(addrs)
    }

    fn listen_udp(&self, addr: SocketAddr) -> Result<std::net::UdpSocket> {
        let socket = std::net::UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(socket)
    }

    fn default_root_store(&self) -> Arc<RootCertStore> {
        default_root_store()
    }
}

fn unsupported_network(network: &str) -> crate::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("unsupported network: {}", network),
    )
    .into()
}

fn check_family(network: &str, addr: SocketAddr) -> Result<()> {
    let mismatch = match network {
        "tcp4" | "udp4" => !addr.is_ipv4(),
        "tcp6" | "udp6" => !addr.is_ipv6(),
        _ => false,
    };
    if mismatch {
        return Err(crate::Error::InvalidAddress(format!(
            "{} is not a {} address",
            addr, network
        )));
    }
    Ok(())
}

static TOKIO_NETWORK: TokioNetwork = TokioNetwork;

/// An optional custom provider, falling back to [`TokioNetwork`].
///
/// Set once at construction and never changed afterwards, so it can be
/// shared freely between primitives.
#[derive(Clone, Default)]
pub struct MaybeCustomUnderlyingNetwork {
    custom: Option<Arc<dyn UnderlyingNetwork>>,
}

impl MaybeCustomUnderlyingNetwork {
    pub fn new(custom: Option<Arc<dyn UnderlyingNetwork>>) -> Self {
        Self { custom }
    }

    /// The custom provider if there is one, otherwise the host network.
    pub fn get(&self) -> &dyn UnderlyingNetwork {
        match &self.custom {
            Some(custom) => custom.as_ref(),
            None => &TOKIO_NETWORK,
        }
    }

    pub fn is_custom(&self) -> bool {
        self.custom.is_some()
    }
}

impl std::fmt::Debug for MaybeCustomUnderlyingNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaybeCustomUnderlyingNetwork")
            .field("custom", &self.custom.is_some())
            .finish()
    }
}
