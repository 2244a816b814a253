//! Network primitives
//!
//! One trait per primitive, each with exactly one primary operation:
//! - [`Resolver`]: name to addresses
//! - [`Dialer`]: TCP (or connected UDP) connection
//! - [`TlsHandshaker`]: TLS client handshake over an existing connection
//! - [`TlsDialer`]: dial and handshake in one step
//! - [`QuicDialer`]: QUIC session (feature `quic`)
//!
//! Implementations are built by [`Netx`] as decorator chains
//! (logging, tracing, error wrapping, base) over one
//! [`UnderlyingNetwork`].

mod addr;
mod bogon;
mod conn;
mod dialer;
mod factory;
mod provider;
#[cfg(feature = "quic")]
mod quic;
mod resolver;
mod tls;

pub use addr::{join_host_port, split_host_port};
pub use bogon::is_bogon;
pub use conn::{BoxConn, BoxTlsConn, NetConn, StreamConn, TcpConn, TlsConn, UdpConn};
pub use dialer::{new_single_use_dialer, DialerSystem, DEFAULT_CONNECT_TIMEOUT};
pub use factory::{Netx, NetxBuilder};
pub use provider::{MaybeCustomUnderlyingNetwork, TokioNetwork, UnderlyingNetwork};
#[cfg(feature = "quic")]
pub use quic::{QuicConn, QuicDialerQuinn, DEFAULT_QUIC_HANDSHAKE_TIMEOUT};
pub use resolver::{NullResolver, ResolverSystem, DEFAULT_RESOLVE_TIMEOUT};
pub use tls::{
    new_null_tls_dialer, new_single_use_tls_dialer, RustlsConn, TlsDialerStd,
    TlsHandshakerConfigurable, DEFAULT_TLS_HANDSHAKE_TIMEOUT,
};

use crate::context::Context;
use crate::tlsx::TlsConfig;
use crate::Result;
use async_trait::async_trait;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;

/// DNS resolution errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("no such host")]
    NoSuchHost,

    #[error("no answer from DNS server")]
    NoAnswer,

    /// getaddrinfo on Android reports "no data" for names it refuses to
    /// resolve, which is not the same as NXDOMAIN.
    #[error("no address associated with hostname")]
    AndroidCacheNoData,

    #[error("server misbehaving")]
    ServerMisbehaving,

    #[error("dns server refused")]
    Refused,

    #[error("temporary failure in name resolution")]
    TemporaryFailure,

    #[error("non-recoverable failure in name resolution")]
    NonRecoverableFailure,

    #[error("dns query timed out")]
    Timeout,

    #[error("dns reply with bogon address")]
    Bogon,

    #[error("{0}")]
    Other(String),
}

/// getaddrinfo messages as formatted by the standard library
static GETADDRINFO_MESSAGES: &[(&str, DnsError)] = &[
    // glibc, musl
    ("Name or service not known", DnsError::NoSuchHost),
    ("Name does not resolve", DnsError::NoSuchHost),
    ("Temporary failure in name resolution", DnsError::TemporaryFailure),
    ("Try again", DnsError::TemporaryFailure),
    ("Non-recoverable failure in name resolution", DnsError::NonRecoverableFailure),
    // macOS, BSD
    ("nodename nor servname provided, or not known", DnsError::NoSuchHost),
    ("non-recoverable failure in name resolution", DnsError::NonRecoverableFailure),
    ("temporary failure in name resolution", DnsError::TemporaryFailure),
];

const NO_DATA_MESSAGE: &str = "No address associated with hostname";

// winsock getaddrinfo codes
#[cfg(windows)]
const WSAHOST_NOT_FOUND: i32 = 11001;
#[cfg(windows)]
const WSATRY_AGAIN: i32 = 11002;
#[cfg(windows)]
const WSANO_RECOVERY: i32 = 11003;
#[cfg(windows)]
const WSANO_DATA: i32 = 11004;

/// Recover a [`DnsError`] from an I/O error produced by the system
/// resolver. Returns `None` for anything else.
pub fn dns_error_from_io(err: &io::Error) -> Option<DnsError> {
    if let Some(dns) = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<DnsError>())
    {
        return Some(dns.clone());
    }

    #[cfg(windows)]
    match err.raw_os_error() {
        Some(WSAHOST_NOT_FOUND) => return Some(DnsError::NoSuchHost),
        Some(WSATRY_AGAIN) => return Some(DnsError::TemporaryFailure),
        Some(WSANO_RECOVERY) => return Some(DnsError::NonRecoverableFailure),
        Some(WSANO_DATA) => return Some(DnsError::NoAnswer),
        _ => {}
    }

    let message = err.to_string();
    if message.contains(NO_DATA_MESSAGE) {
        return Some(if cfg!(target_os = "android") {
            DnsError::AndroidCacheNoData
        } else {
            DnsError::NoAnswer
        });
    }
    GETADDRINFO_MESSAGES
        .iter()
        .find(|(needle, _)| message.contains(needle))
        .map(|(_, dns)| dns.clone())
}

/// Resolves domain names
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `hostname` to its addresses.
    async fn lookup_host(&self, ctx: &Context, hostname: &str) -> Result<Vec<IpAddr>>;

    /// Kind of resolver ("getaddrinfo", "null", ...)
    fn network(&self) -> &str;

    /// Address of the resolver, empty for the system resolver
    fn address(&self) -> &str;

    fn close_idle_connections(&self);
}

/// Dials connections
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Dial `address` (`host:port`) over `network` (`tcp`, `tcp4`, `tcp6`,
    /// `udp`).
    async fn dial_context(&self, ctx: &Context, network: &str, address: &str) -> Result<BoxConn>;

    fn close_idle_connections(&self);
}

/// Performs TLS client handshakes
#[async_trait]
pub trait TlsHandshaker: Send + Sync {
    /// Run a handshake over `conn` using `config`.
    ///
    /// Takes ownership of `conn`: on failure it is dropped, which closes it.
    async fn handshake(&self, ctx: &Context, conn: BoxConn, config: &TlsConfig)
        -> Result<BoxTlsConn>;
}

/// Dials TLS connections
#[async_trait]
pub trait TlsDialer: Send + Sync {
    async fn dial_tls_context(
        &self,
        ctx: &Context,
        network: &str,
        address: &str,
    ) -> Result<BoxTlsConn>;

    fn close_idle_connections(&self);
}

/// Dials QUIC sessions
#[cfg(feature = "quic")]
#[async_trait]
pub trait QuicDialer: Send + Sync {
    async fn dial_context(&self, ctx: &Context, address: &str, config: &TlsConfig)
        -> Result<QuicConn>;

    fn close_idle_connections(&self);
}

#[async_trait]
impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    async fn lookup_host(&self, ctx: &Context, hostname: &str) -> Result<Vec<IpAddr>> {
        (**self).lookup_host(ctx, hostname).await
    }

    fn network(&self) -> &str {
        (**self).network()
    }

    fn address(&self) -> &str {
        (**self).address()
    }

    fn close_idle_connections(&self) {
        (**self).close_idle_connections()
    }
}

#[async_trait]
impl<D: Dialer + ?Sized> Dialer for Arc<D> {
    async fn dial_context(&self, ctx: &Context, network: &str, address: &str) -> Result<BoxConn> {
        (**self).dial_context(ctx, network, address).await
    }

    fn close_idle_connections(&self) {
        (**self).close_idle_connections()
    }
}

#[async_trait]
impl<H: TlsHandshaker + ?Sized> TlsHandshaker for Arc<H> {
    async fn handshake(
        &self,
        ctx: &Context,
        conn: BoxConn,
        config: &TlsConfig,
    ) -> Result<BoxTlsConn> {
        (**self).handshake(ctx, conn, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_getaddrinfo_messages() {
        let cases = [
            (
                "failed to lookup address information: Name or service not known",
                Some(DnsError::NoSuchHost),
            ),
            (
                "failed to lookup address information: nodename nor servname provided, or not known",
                Some(DnsError::NoSuchHost),
            ),
            (
                "failed to lookup address information: Temporary failure in name resolution",
                Some(DnsError::TemporaryFailure),
            ),
            (
                "failed to lookup address information: Non-recoverable failure in name resolution",
                Some(DnsError::NonRecoverableFailure),
            ),
            ("connection refused", None),
        ];
        for (message, expected) in cases {
            let err = io::Error::new(io::ErrorKind::Other, message);
            assert_eq!(dns_error_from_io(&err), expected, "{message}");
        }
    }

    #[test]
    fn test_no_data_depends_on_platform() {
        let err = io::Error::new(
            io::ErrorKind::Other,
            "failed to lookup address information: No address associated with hostname",
        );
        let expected = if cfg!(target_os = "android") {
            DnsError::AndroidCacheNoData
        } else {
            DnsError::NoAnswer
        };
        assert_eq!(dns_error_from_io(&err), Some(expected));
    }

    #[test]
    fn test_embedded_dns_error() {
        let err = io::Error::new(io::ErrorKind::Other, DnsError::Bogon);
        assert_eq!(dns_error_from_io(&err), Some(DnsError::Bogon));
    }
}
