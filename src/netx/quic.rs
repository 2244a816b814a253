//! QUIC dialer chain
//!
//! ```text
//! QuicDialerLogger -> QuicDialerResolver -> QuicDialerTrace
//!     -> QuicDialerErrWrapper -> QuicDialerQuinn -> provider UDP socket
//! ```

use super::addr::{join_host_port, split_host_port};
use super::provider::MaybeCustomUnderlyingNetwork;
use super::{DnsError, QuicDialer, Resolver};
use crate::context::Context;
use crate::failure::{
    classify, classify_quic_handshake_error, maybe_new_err_wrapper, reduce_errors, Operation,
};
use crate::logging::DebugLogger;
use crate::tlsx::{
    new_rustls_client_config, TlsConfig, TlsConfigError, TlsConnectionState, VERSION_TLS13,
};
use crate::trace::{EventKind, NetworkEvent};
use crate::{Error, Result};
use async_trait::async_trait;
use quinn::crypto::rustls::{HandshakeData, QuicClientConfig};
use rustls::pki_types::CertificateDer;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default bound on the QUIC handshake
pub const DEFAULT_QUIC_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// An established QUIC session
///
/// Owns the endpoint it was dialed from; dropping the session releases the
/// UDP socket.
pub struct QuicConn {
    connection: quinn::Connection,
    endpoint: quinn::Endpoint,
}

impl QuicConn {
    pub fn connection(&self) -> &quinn::Connection {
        &self.connection
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    pub fn local_address(&self) -> io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// TLS parameters of the session.
    ///
    /// `cipher_suite` is always zero: quinn does not report the negotiated
    /// suite.
    pub fn connection_state(&self) -> TlsConnectionState {
        let mut state = TlsConnectionState {
            version: VERSION_TLS13,
            ..TlsConnectionState::default()
        };
        if let Some(data) = self
            .connection
            .handshake_data()
            .and_then(|data| data.downcast::<HandshakeData>().ok())
        {
            state.negotiated_protocol = data
                .protocol
                .map(|proto| String::from_utf8_lossy(&proto).into_owned())
                .unwrap_or_default();
            state.server_name = data.server_name.unwrap_or_default();
        }
        if let Some(certs) = self
            .connection
            .peer_identity()
            .and_then(|identity| identity.downcast::<Vec<CertificateDer<'static>>>().ok())
        {
            state.peer_certificates = *certs;
        }
        state
    }

    /// Close the session immediately.
    pub fn close(&self) {
        self.connection.close(0u32.into(), b"");
        self.endpoint.close(0u32.into(), b"");
    }
}

/// Dials QUIC with quinn over a socket bound through the provider.
///
/// Requires an IP endpoint. Defaults the server name to the host, ALPN to
/// `h3`, and the trust store to the provider's roots.
pub struct QuicDialerQuinn {
    provider: MaybeCustomUnderlyingNetwork,
    timeout: Duration,
}

impl QuicDialerQuinn {
    /// `timeout` of zero selects [`DEFAULT_QUIC_HANDSHAKE_TIMEOUT`].
    pub fn new(provider: MaybeCustomUnderlyingNetwork, timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() {
            DEFAULT_QUIC_HANDSHAKE_TIMEOUT
        } else {
            timeout
        };
        Self { provider, timeout }
    }

    fn config_for(&self, host: &str, config: &TlsConfig) -> TlsConfig {
        let mut config = config.clone();
        if config.server_name.is_empty() {
            config.server_name = host.to_string();
        }
        if config.next_protos.is_empty() {
            config.next_protos = vec!["h3".to_string()];
        }
        if config.root_cas.is_none() {
            config.root_cas = Some(self.provider.get().default_root_store());
        }
        config
    }
}

#[async_trait]
impl QuicDialer for QuicDialerQuinn {
    async fn dial_context(
        &self,
        ctx: &Context,
        address: &str,
        config: &TlsConfig,
    ) -> Result<QuicConn> {
        let (host, _) = split_host_port(address)?;
        let addr: SocketAddr = address
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("{}: not an IP endpoint", address)))?;
        let config = self.config_for(&host, config);

        let tls = Arc::new(new_rustls_client_config(&config)?);
        let quic_tls =
            QuicClientConfig::try_from(tls).map_err(|e| TlsConfigError::Quic(e.to_string()))?;
        let client_config = quinn::ClientConfig::new(Arc::new(quic_tls));

        let bind: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = self.provider.get().listen_udp(bind)?;
        let endpoint = quinn::Endpoint::new(
            quinn::EndpointConfig::default(),
            None,
            socket,
            Arc::new(quinn::TokioRuntime),
        )?;
        let connecting = endpoint.connect_with(client_config, addr, &config.server_name)?;

        let handshake = async {
            match tokio::time::timeout(self.timeout, connecting).await {
                Ok(result) => result.map_err(Error::from),
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "i/o timeout").into()),
            }
        };
        match ctx.run(handshake).await {
            Ok(connection) => Ok(QuicConn {
                connection,
                endpoint,
            }),
            Err(err) => {
                endpoint.close(0u32.into(), b"");
                Err(err)
            }
        }
    }

    fn close_idle_connections(&self) {}
}

/// Classifies QUIC handshake errors.
pub(crate) struct QuicDialerErrWrapper<Q> {
    pub(crate) dialer: Q,
}

#[async_trait]
impl<Q: QuicDialer> QuicDialer for QuicDialerErrWrapper<Q> {
    async fn dial_context(
        &self,
        ctx: &Context,
        address: &str,
        config: &TlsConfig,
    ) -> Result<QuicConn> {
        self.dialer
            .dial_context(ctx, address, config)
            .await
            .map_err(|err| {
                maybe_new_err_wrapper(classify_quic_handshake_error, Operation::QuicHandshake, err)
            })
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections()
    }
}

/// Emits QUIC handshake start/done events to the context's trace.
pub(crate) struct QuicDialerTrace<Q> {
    pub(crate) dialer: Q,
}

#[async_trait]
impl<Q: QuicDialer> QuicDialer for QuicDialerTrace<Q> {
    async fn dial_context(
        &self,
        ctx: &Context,
        address: &str,
        config: &TlsConfig,
    ) -> Result<QuicConn> {
        let trace = ctx.trace();
        let event = |event: NetworkEvent| {
            let mut event = event.with_network("udp").with_address(address);
            event.sni = Some(config.server_name.clone());
            event.alpn = config.next_protos.clone();
            event
        };
        let started = Instant::now();
        trace.record(event(NetworkEvent::new(EventKind::QuicHandshakeStart)));
        let result = self.dialer.dial_context(ctx, address, config).await;
        let mut done =
            event(NetworkEvent::done(EventKind::QuicHandshakeDone, started)).with_outcome(&result);
        if let Ok(conn) = &result {
            let state = conn.connection_state();
            done.remote_address = Some(conn.remote_address().to_string());
            done.negotiated_protocol = Some(state.negotiated_protocol.clone());
            done.tls_version = Some(state.version_string());
            // no cipher_suite, quinn does not report it
        }
        trace.record(done);
        result
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections()
    }
}

/// Resolves the host and dials each address until one succeeds.
pub(crate) struct QuicDialerResolver<Q> {
    pub(crate) dialer: Q,
    pub(crate) resolver: Arc<dyn Resolver>,
}

#[async_trait]
impl<Q: QuicDialer> QuicDialer for QuicDialerResolver<Q> {
    async fn dial_context(
        &self,
        ctx: &Context,
        address: &str,
        config: &TlsConfig,
    ) -> Result<QuicConn> {
        let (host, port) = split_host_port(address)?;
        let addrs = self.resolver.lookup_host(ctx, &host).await?;
        if addrs.is_empty() {
            return Err(classify(Operation::Resolve, DnsError::NoAnswer.into()));
        }
        let mut config = config.clone();
        if config.server_name.is_empty() {
            config.server_name = host;
        }
        let mut errors = Vec::with_capacity(addrs.len());
        for ip in addrs {
            let target = join_host_port(&ip.to_string(), &port);
            match self.dialer.dial_context(ctx, &target, &config).await {
                Ok(conn) => return Ok(conn),
                Err(err) => errors.push(err),
            }
            if ctx.err().is_some() {
                break;
            }
        }
        Err(reduce_errors(errors)
            .unwrap_or_else(|| classify(Operation::QuicHandshake, Error::Canceled)))
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections();
        self.resolver.close_idle_connections();
    }
}

/// Logs QUIC dials.
pub(crate) struct QuicDialerLogger<Q> {
    pub(crate) dialer: Q,
    pub(crate) logger: Arc<dyn DebugLogger>,
}

#[async_trait]
impl<Q: QuicDialer> QuicDialer for QuicDialerLogger<Q> {
    async fn dial_context(
        &self,
        ctx: &Context,
        address: &str,
        config: &TlsConfig,
    ) -> Result<QuicConn> {
        self.logger.debug(&format!("quic_dial {}/udp...", address));
        let start = Instant::now();
        let result = self.dialer.dial_context(ctx, address, config).await;
        let elapsed = start.elapsed();
        match &result {
            Ok(conn) => self.logger.debug(&format!(
                "quic_dial {}/udp... ok in {:?} {{next={}}}",
                address,
                elapsed,
                conn.connection_state().negotiated_protocol
            )),
            Err(err) => self
                .logger
                .debug(&format!("quic_dial {}/udp... {} in {:?}", address, err, elapsed)),
        }
        result
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::codes::*;

    fn dialer() -> QuicDialerErrWrapper<QuicDialerQuinn> {
        QuicDialerErrWrapper {
            dialer: QuicDialerQuinn::new(
                MaybeCustomUnderlyingNetwork::default(),
                Duration::from_millis(100),
            ),
        }
    }

    #[test]
    fn test_config_defaults() {
        let quinn = QuicDialerQuinn::new(MaybeCustomUnderlyingNetwork::default(), Duration::ZERO);
        let config = quinn.config_for("example.com", &TlsConfig::default());
        assert_eq!(config.server_name, "example.com");
        assert_eq!(config.next_protos, vec!["h3"]);
        assert!(config.root_cas.is_some());

        let custom = TlsConfig {
            next_protos: vec!["doq".into()],
            ..TlsConfig::default()
        };
        assert_eq!(quinn.config_for("dns.example", &custom).next_protos, vec!["doq"]);
    }

    /// Serves QUIC with `h3` and a self-signed `localhost` certificate.
    /// Returns the server address and a store trusting the certificate.
    fn spawn_quic_server() -> (SocketAddr, rustls::RootCertStore) {
        use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert = certified.cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));
        let mut tls = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_protocol_versions(&[&rustls::version::TLS13])
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert.clone()], key)
        .unwrap();
        tls.alpn_protocols = vec![b"h3".to_vec()];
        let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls).unwrap();
        let endpoint = quinn::Endpoint::server(
            quinn::ServerConfig::with_crypto(Arc::new(crypto)),
            "127.0.0.1:0".parse().unwrap(),
        )
        .unwrap();
        let addr = endpoint.local_addr().unwrap();
        tokio::spawn(async move {
            while let Some(incoming) = endpoint.accept().await {
                if let Ok(conn) = incoming.await {
                    conn.closed().await;
                }
            }
        });

        let mut roots = rustls::RootCertStore::empty();
        roots.add(cert).unwrap();
        (addr, roots)
    }

    /// Test a handshake against a local server: the session state and the
    /// done event carry what quinn reports, and no cipher suite
    #[tokio::test]
    async fn test_handshake_state() {
        let (addr, roots) = spawn_quic_server();
        let trace = Arc::new(crate::trace::MeasurementTrace::new());
        let ctx = Context::new().with_trace(trace.clone());
        let chain = QuicDialerTrace {
            dialer: QuicDialerErrWrapper {
                dialer: QuicDialerQuinn::new(
                    MaybeCustomUnderlyingNetwork::default(),
                    Duration::from_secs(5),
                ),
            },
        };
        let config = TlsConfig {
            root_cas: Some(Arc::new(roots)),
            ..TlsConfig::with_server_name("localhost")
        };

        let conn = chain.dial_context(&ctx, &addr.to_string(), &config).await.unwrap();
        let state = conn.connection_state();
        assert_eq!(state.version, VERSION_TLS13);
        assert_eq!(state.negotiated_protocol, "h3");
        assert_eq!(state.server_name, "localhost");
        assert_eq!(state.cipher_suite, 0);
        assert_eq!(state.peer_certificates.len(), 1);
        conn.close();

        let events = trace.events();
        assert_eq!(events.len(), 2);
        let done = &events[1];
        assert_eq!(done.kind, EventKind::QuicHandshakeDone);
        assert!(done.failure.is_none());
        assert_eq!(done.tls_version.as_deref(), Some("TLSv1.3"));
        assert_eq!(done.negotiated_protocol.as_deref(), Some("h3"));
        assert!(done.cipher_suite.is_none());
    }

    #[tokio::test]
    async fn test_requires_ip_endpoint() {
        let err = dialer()
            .dial_context(&Context::new(), "example.com:443", &TlsConfig::default())
            .await
            .err()
            .unwrap();
        assert!(err.failure().unwrap().starts_with(UNKNOWN_FAILURE_PREFIX));
        assert!(matches!(
            err,
            Error::Wrapped(ref w) if matches!(w.wrapped(), Error::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // a bound socket that never answers
        let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let address = silent.local_addr().unwrap().to_string();

        let err = dialer()
            .dial_context(&Context::new(), &address, &TlsConfig::with_server_name("example.com"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.failure(), Some(GENERIC_TIMEOUT_ERROR));
        assert_eq!(err.operation(), Some(Operation::QuicHandshake));
    }
}
