//! TLS handshaker and TLS dialers
//!
//! Handshaker chain:
//!
//! ```text
//! TlsHandshakerLogger -> TlsHandshakerTrace -> TlsHandshakerErrWrapper
//!     -> TlsHandshakerConfigurable -> tokio-rustls
//! ```

use super::addr::split_host_port;
use super::conn::{BoxConn, BoxTlsConn, ErrWrapperConn, NetConn, TlsConn};
use super::dialer::take_once;
use super::provider::MaybeCustomUnderlyingNetwork;
use super::{Dialer, TlsDialer, TlsHandshaker};
use crate::context::Context;
use crate::failure::{classify_tls_handshake_error, maybe_new_err_wrapper, Operation};
use crate::logging::DebugLogger;
use crate::tlsx::{
    maybe_tls_connection_state, new_rustls_client_config, tls_cipher_suite_string,
    tls_version_string, TlsConfig, TlsConfigError, TlsConnectionState,
};
use crate::trace::{EventKind, NetworkEvent};
use crate::{Error, Result};
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

pub const DEFAULT_TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A client TLS session over a [`BoxConn`]
pub struct RustlsConn {
    stream: TlsStream<BoxConn>,
    server_name: String,
}

impl RustlsConn {
    pub fn get_ref(&self) -> &TlsStream<BoxConn> {
        &self.stream
    }

    pub fn into_inner(self) -> TlsStream<BoxConn> {
        self.stream
    }
}

impl NetConn for RustlsConn {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.get_ref().0.local_addr()
    }

    fn remote_addr(&self) -> io::Result<SocketAddr> {
        self.stream.get_ref().0.remote_addr()
    }

    fn set_deadline(&mut self, deadline: Option<tokio::time::Instant>) {
        self.stream.get_mut().0.set_deadline(deadline)
    }
}

impl TlsConn for RustlsConn {
    fn connection_state(&self) -> TlsConnectionState {
        TlsConnectionState::from_rustls(self.stream.get_ref().1, &self.server_name)
    }
}

impl AsyncRead for RustlsConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for RustlsConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

/// Handshakes with rustls.
///
/// Bounds the handshake with a deadline on the connection, cleared again
/// before returning. Uses the provider's default roots when the config has
/// none, without touching the caller's config.
pub struct TlsHandshakerConfigurable {
    provider: MaybeCustomUnderlyingNetwork,
    timeout: Duration,
}

impl TlsHandshakerConfigurable {
    /// `timeout` of zero selects [`DEFAULT_TLS_HANDSHAKE_TIMEOUT`].
    pub fn new(provider: MaybeCustomUnderlyingNetwork, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    fn timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TLS_HANDSHAKE_TIMEOUT
        } else {
            self.timeout
        }
    }
}

/// Name to verify: the configured server name, or the peer IP.
fn server_name_for(config: &TlsConfig, conn: &BoxConn) -> Result<ServerName<'static>> {
    if config.server_name.is_empty() {
        let ip = conn.remote_addr()?.ip();
        return Ok(ServerName::IpAddress(ip.into()));
    }
    ServerName::try_from(config.server_name.clone())
        .map_err(|_| TlsConfigError::InvalidServerName(config.server_name.clone()).into())
}

#[async_trait]
impl TlsHandshaker for TlsHandshakerConfigurable {
    async fn handshake(
        &self,
        ctx: &Context,
        mut conn: BoxConn,
        config: &TlsConfig,
    ) -> Result<BoxTlsConn> {
        let mut config = config.clone();
        if config.root_cas.is_none() {
            config.root_cas = Some(self.provider.get().default_root_store());
        }
        let server_name = server_name_for(&config, &conn)?;
        let connector = TlsConnector::from(Arc::new(new_rustls_client_config(&config)?));
        let sni = config.server_name;

        conn.set_deadline(Some(tokio::time::Instant::now() + self.timeout()));
        let result = ctx
            .run(async {
                match connector.connect(server_name, conn).into_fallible().await {
                    Ok(mut stream) => {
                        stream.get_mut().0.set_deadline(None);
                        Ok(stream)
                    }
                    Err((err, mut conn)) => {
                        conn.set_deadline(None);
                        Err(Error::from_tls_io(err))
                    }
                }
            })
            .await?;
        Ok(Box::new(RustlsConn {
            stream: result,
            server_name: sni,
        }))
    }
}

/// Classifies handshake errors, and the I/O errors of the connections it
/// hands out.
pub(crate) struct TlsHandshakerErrWrapper<H> {
    pub(crate) handshaker: H,
}

#[async_trait]
impl<H: TlsHandshaker> TlsHandshaker for TlsHandshakerErrWrapper<H> {
    async fn handshake(
        &self,
        ctx: &Context,
        conn: BoxConn,
        config: &TlsConfig,
    ) -> Result<BoxTlsConn> {
        match self.handshaker.handshake(ctx, conn, config).await {
            Ok(conn) => Ok(Box::new(ErrWrapperConn::new(conn))),
            Err(err) => Err(maybe_new_err_wrapper(
                classify_tls_handshake_error,
                Operation::TlsHandshake,
                err,
            )),
        }
    }
}

/// Emits handshake start/done events to the context's trace.
pub(crate) struct TlsHandshakerTrace<H> {
    pub(crate) handshaker: H,
}

#[async_trait]
impl<H: TlsHandshaker> TlsHandshaker for TlsHandshakerTrace<H> {
    async fn handshake(
        &self,
        ctx: &Context,
        conn: BoxConn,
        config: &TlsConfig,
    ) -> Result<BoxTlsConn> {
        let trace = ctx.trace();
        let remote = conn.remote_addr().ok().map(|addr| addr.to_string());
        let event = |kind: EventKind, started: Option<Instant>| {
            let mut event = match started {
                Some(started) => NetworkEvent::done(kind, started),
                None => NetworkEvent::new(kind),
            };
            event.remote_address = remote.clone();
            event.sni = Some(config.server_name.clone());
            event.alpn = config.next_protos.clone();
            event
        };

        let started = Instant::now();
        trace.record(event(EventKind::TlsHandshakeStart, None));
        let result = self.handshaker.handshake(ctx, conn, config).await;
        let mut done = event(EventKind::TlsHandshakeDone, Some(started)).with_outcome(&result);
        if let Ok(tls) = &result {
            let state = tls.connection_state();
            done.negotiated_protocol = Some(state.negotiated_protocol.clone());
            done.tls_version = Some(state.version_string());
            done.cipher_suite = Some(state.cipher_suite_string());
        }
        trace.record(done);
        result
    }
}

/// Logs handshakes.
pub(crate) struct TlsHandshakerLogger<H> {
    pub(crate) handshaker: H,
    pub(crate) logger: Arc<dyn DebugLogger>,
}

#[async_trait]
impl<H: TlsHandshaker> TlsHandshaker for TlsHandshakerLogger<H> {
    async fn handshake(
        &self,
        ctx: &Context,
        conn: BoxConn,
        config: &TlsConfig,
    ) -> Result<BoxTlsConn> {
        let prefix = format!(
            "tls_handshake {{sni={} next={:?}}}...",
            config.server_name, config.next_protos
        );
        self.logger.debug(&prefix);
        let start = Instant::now();
        let result = self.handshaker.handshake(ctx, conn, config).await;
        let elapsed = start.elapsed();
        match &result {
            Ok(tls) => {
                let state = maybe_tls_connection_state(Some(&**tls));
                self.logger.debug(&format!(
                    "{} ok in {:?} {{next={} cipher={} v={}}}",
                    prefix,
                    elapsed,
                    state.negotiated_protocol,
                    tls_cipher_suite_string(state.cipher_suite),
                    tls_version_string(state.version),
                ));
            }
            Err(err) => self
                .logger
                .debug(&format!("{} {} in {:?}", prefix, err, elapsed)),
        }
        result
    }
}

/// Dials with a [`Dialer`] and handshakes with a [`TlsHandshaker`].
pub struct TlsDialerStd {
    config: TlsConfig,
    dialer: Arc<dyn Dialer>,
    handshaker: Arc<dyn TlsHandshaker>,
}

impl TlsDialerStd {
    pub fn new(
        dialer: Arc<dyn Dialer>,
        handshaker: Arc<dyn TlsHandshaker>,
        config: TlsConfig,
    ) -> Self {
        Self {
            config,
            dialer,
            handshaker,
        }
    }

    /// Per-connection config: a clone of the base config with the server
    /// name defaulting to `host` and ALPN defaulting by well-known port.
    pub fn config_for(&self, host: &str, port: &str) -> TlsConfig {
        let mut config = self.config.clone();
        if config.server_name.is_empty() {
            config.server_name = host.to_string();
        }
        if config.next_protos.is_empty() {
            config.next_protos = match port {
                "443" => vec!["h2".to_string(), "http/1.1".to_string()],
                "853" => vec!["dot".to_string()],
                _ => Vec::new(),
            };
        }
        config
    }
}

#[async_trait]
impl TlsDialer for TlsDialerStd {
    async fn dial_tls_context(
        &self,
        ctx: &Context,
        network: &str,
        address: &str,
    ) -> Result<BoxTlsConn> {
        let (host, port) = split_host_port(address)?;
        let conn = self.dialer.dial_context(ctx, network, address).await?;
        let config = self.config_for(&host, &port);
        // the handshaker owns conn from here and drops it on failure
        self.handshaker.handshake(ctx, conn, &config).await
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections()
    }
}

/// Always fails with [`Error::NoTlsDialer`].
struct NullTlsDialer;

#[async_trait]
impl TlsDialer for NullTlsDialer {
    async fn dial_tls_context(
        &self,
        _ctx: &Context,
        _network: &str,
        _address: &str,
    ) -> Result<BoxTlsConn> {
        Err(Error::NoTlsDialer)
    }

    fn close_idle_connections(&self) {}
}

/// TLS dialer for code paths where TLS is disabled.
pub fn new_null_tls_dialer() -> Arc<dyn TlsDialer> {
    Arc::new(NullTlsDialer)
}

struct SingleUseTlsDialer {
    conn: Mutex<Option<BoxTlsConn>>,
}

#[async_trait]
impl TlsDialer for SingleUseTlsDialer {
    async fn dial_tls_context(
        &self,
        _ctx: &Context,
        _network: &str,
        _address: &str,
    ) -> Result<BoxTlsConn> {
        take_once(&self.conn)
    }

    fn close_idle_connections(&self) {}
}

/// TLS dialer that hands out `conn` exactly once, whatever the address, and
/// fails with [`Error::NoConnReuse`] afterwards.
pub fn new_single_use_tls_dialer(conn: BoxTlsConn) -> Arc<dyn TlsDialer> {
    Arc::new(SingleUseTlsDialer {
        conn: Mutex::new(Some(conn)),
    })
}
