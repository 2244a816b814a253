//! Dialer chain
//!
//! ```text
//! DialerLogger -> DialerResolver -> DialerTrace -> DialerErrWrapper
//!     -> DialerSystem -> provider
//! ```
//!
//! [`DialerResolver`] resolves the host once and runs the inner chain for
//! each address in turn, so every connect attempt is traced and classified
//! on its own.

use super::addr::{join_host_port, split_host_port};
use super::conn::{BoxConn, ErrWrapperConn};
use super::provider::MaybeCustomUnderlyingNetwork;
use super::{DnsError, Dialer, Resolver};
use crate::context::Context;
use crate::failure::{
    classify, classify_generic_error, maybe_new_err_wrapper, reduce_errors, Operation,
};
use crate::logging::DebugLogger;
use crate::trace::{EventKind, NetworkEvent};
use crate::{Error, Result};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Dials IP endpoints through the provider.
pub struct DialerSystem {
    provider: MaybeCustomUnderlyingNetwork,
    timeout: Duration,
}

impl DialerSystem {
    /// `timeout` of zero selects [`DEFAULT_CONNECT_TIMEOUT`].
    pub fn new(provider: MaybeCustomUnderlyingNetwork, timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() {
            DEFAULT_CONNECT_TIMEOUT
        } else {
            timeout
        };
        Self { provider, timeout }
    }
}

#[async_trait]
impl Dialer for DialerSystem {
    async fn dial_context(&self, ctx: &Context, network: &str, address: &str) -> Result<BoxConn> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("{}: not an IP endpoint", address)))?;
        let dial = async {
            match tokio::time::timeout(
                self.timeout,
                self.provider.get().dial_context(ctx, network, addr),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "i/o timeout").into()),
            }
        };
        ctx.run(dial).await
    }

    fn close_idle_connections(&self) {}
}

/// Classifies connect errors, and the I/O errors of the connections it
/// hands out.
pub(crate) struct DialerErrWrapper<D> {
    pub(crate) dialer: D,
}

#[async_trait]
impl<D: Dialer> Dialer for DialerErrWrapper<D> {
    async fn dial_context(&self, ctx: &Context, network: &str, address: &str) -> Result<BoxConn> {
        match self.dialer.dial_context(ctx, network, address).await {
            Ok(conn) => Ok(Box::new(ErrWrapperConn::new(conn))),
            Err(err) => Err(maybe_new_err_wrapper(
                classify_generic_error,
                Operation::Connect,
                err,
            )),
        }
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections()
    }
}

/// Emits connect start/done events to the context's trace.
pub(crate) struct DialerTrace<D> {
    pub(crate) dialer: D,
}

#[async_trait]
impl<D: Dialer> Dialer for DialerTrace<D> {
    async fn dial_context(&self, ctx: &Context, network: &str, address: &str) -> Result<BoxConn> {
        let trace = ctx.trace();
        let started = Instant::now();
        trace.record(
            NetworkEvent::new(EventKind::ConnectStart)
                .with_network(network)
                .with_address(address),
        );
        let result = self.dialer.dial_context(ctx, network, address).await;
        let mut done = NetworkEvent::done(EventKind::ConnectDone, started)
            .with_network(network)
            .with_address(address)
            .with_outcome(&result);
        if let Ok(conn) = &result {
            done.remote_address = conn.remote_addr().ok().map(|addr| addr.to_string());
        }
        trace.record(done);
        result
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections()
    }
}

/// Resolves the host and dials each address until one succeeds.
pub(crate) struct DialerResolver<D> {
    pub(crate) dialer: D,
    pub(crate) resolver: Arc<dyn Resolver>,
}

#[async_trait]
impl<D: Dialer> Dialer for DialerResolver<D> {
    async fn dial_context(&self, ctx: &Context, network: &str, address: &str) -> Result<BoxConn> {
        let (host, port) = split_host_port(address)?;
        let addrs = self.resolver.lookup_host(ctx, &host).await?;
        if addrs.is_empty() {
            return Err(classify(Operation::Resolve, DnsError::NoAnswer.into()));
        }
        let mut errors = Vec::with_capacity(addrs.len());
        for ip in addrs {
            let target = join_host_port(&ip.to_string(), &port);
            match self.dialer.dial_context(ctx, network, &target).await {
                Ok(conn) => return Ok(conn),
                Err(err) => errors.push(err),
            }
            if ctx.err().is_some() {
                break;
            }
        }
        Err(reduce_errors(errors).unwrap_or_else(|| classify(Operation::Connect, Error::Canceled)))
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections();
        self.resolver.close_idle_connections();
    }
}

/// Logs dials.
pub(crate) struct DialerLogger<D> {
    pub(crate) dialer: D,
    pub(crate) logger: Arc<dyn DebugLogger>,
}

#[async_trait]
impl<D: Dialer> Dialer for DialerLogger<D> {
    async fn dial_context(&self, ctx: &Context, network: &str, address: &str) -> Result<BoxConn> {
        self.logger.debug(&format!("dial {}/{}...", address, network));
        let start = Instant::now();
        let result = self.dialer.dial_context(ctx, network, address).await;
        let elapsed = start.elapsed();
        match &result {
            Ok(_) => self
                .logger
                .debug(&format!("dial {}/{}... ok in {:?}", address, network, elapsed)),
            Err(err) => self.logger.debug(&format!(
                "dial {}/{}... {} in {:?}",
                address, network, err, elapsed
            )),
        }
        result
    }

    fn close_idle_connections(&self) {
        self.dialer.close_idle_connections()
    }
}

/// Returns one pre-established connection on the first dial and fails with
/// [`Error::NoConnReuse`] afterwards. Ignores the requested address.
pub(crate) struct SingleUseDialer {
    conn: Mutex<Option<BoxConn>>,
}

#[async_trait]
impl Dialer for SingleUseDialer {
    async fn dial_context(&self, _ctx: &Context, _network: &str, _address: &str) -> Result<BoxConn> {
        take_once(&self.conn)
    }

    fn close_idle_connections(&self) {}
}

pub(crate) fn take_once<T>(slot: &Mutex<Option<T>>) -> Result<T> {
    slot.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
        .ok_or(Error::NoConnReuse)
}

/// Dialer that hands out `conn` exactly once.
pub fn new_single_use_dialer(conn: BoxConn) -> Arc<dyn Dialer> {
    Arc::new(SingleUseDialer {
        conn: Mutex::new(Some(conn)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::codes::*;
    use crate::netx::{NetConn, StreamConn};
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn duplex_conn() -> BoxConn {
        let (a, _b) = tokio::io::duplex(64);
        let addr: SocketAddr = "127.0.0.1:80".parse().unwrap();
        Box::new(StreamConn::new(a, addr, addr))
    }

    /// Refuses every address but `ok`.
    struct ScriptedDialer {
        ok: &'static str,
        attempts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Dialer for ScriptedDialer {
        async fn dial_context(&self, _ctx: &Context, _network: &str, address: &str) -> Result<BoxConn> {
            self.attempts.lock().unwrap().push(address.to_string());
            if address == self.ok {
                Ok(duplex_conn())
            } else {
                Err(io::Error::from(io::ErrorKind::ConnectionRefused).into())
            }
        }

        fn close_idle_connections(&self) {}
    }

    struct StaticResolver(Vec<IpAddr>, AtomicUsize);

    #[async_trait]
    impl Resolver for StaticResolver {
        async fn lookup_host(&self, _ctx: &Context, _hostname: &str) -> Result<Vec<IpAddr>> {
            Ok(self.0.clone())
        }

        fn network(&self) -> &str {
            "static"
        }

        fn address(&self) -> &str {
            ""
        }

        fn close_idle_connections(&self) {
            self.1.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_resolver_dialer_tries_each_address() {
        let resolver = Arc::new(StaticResolver(
            vec!["10.0.0.1".parse().unwrap(), "::1".parse().unwrap()],
            AtomicUsize::new(0),
        ));
        let dialer = DialerResolver {
            dialer: DialerErrWrapper {
                dialer: ScriptedDialer {
                    ok: "[::1]:443",
                    attempts: Mutex::new(vec![]),
                },
            },
            resolver: resolver.clone(),
        };
        dialer
            .dial_context(&Context::new(), "tcp", "example.com:443")
            .await
            .unwrap();
        assert_eq!(
            *dialer.dialer.dialer.attempts.lock().unwrap(),
            vec!["10.0.0.1:443", "[::1]:443"]
        );

        dialer.close_idle_connections();
        assert_eq!(resolver.1.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolver_dialer_reports_classified_error() {
        let dialer = DialerResolver {
            dialer: DialerErrWrapper {
                dialer: ScriptedDialer {
                    ok: "",
                    attempts: Mutex::new(vec![]),
                },
            },
            resolver: Arc::new(StaticResolver(
                vec!["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()],
                AtomicUsize::new(0),
            )),
        };
        let err = dialer
            .dial_context(&Context::new(), "tcp", "example.com:80")
            .await
            .err()
            .unwrap();
        assert_eq!(err.failure(), Some(CONNECTION_REFUSED));
        assert_eq!(err.operation(), Some(Operation::Connect));
    }

    #[tokio::test]
    async fn test_resolver_dialer_without_addresses() {
        let dialer = DialerResolver {
            dialer: ScriptedDialer {
                ok: "",
                attempts: Mutex::new(vec![]),
            },
            resolver: Arc::new(StaticResolver(vec![], AtomicUsize::new(0))),
        };
        let err = dialer
            .dial_context(&Context::new(), "tcp", "example.com:80")
            .await
            .err()
            .unwrap();
        assert_eq!(err.failure(), Some(DNS_NO_ANSWER));

        let err = dialer
            .dial_context(&Context::new(), "tcp", "example.com")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::MissingPort(_)));
    }

    #[tokio::test]
    async fn test_system_dialer_requires_ip_endpoint() {
        let dialer = DialerSystem::new(MaybeCustomUnderlyingNetwork::default(), Duration::ZERO);
        let err = dialer
            .dial_context(&Context::new(), "tcp", "example.com:80")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn test_single_use_dialer() {
        let dialer = new_single_use_dialer(duplex_conn());
        let ctx = Context::new();
        let conn = dialer.dial_context(&ctx, "tcp", "ignored:1").await.unwrap();
        assert_eq!(conn.remote_addr().unwrap().port(), 80);

        let err = dialer.dial_context(&ctx, "tcp", "ignored:1").await.err().unwrap();
        assert!(matches!(err, Error::NoConnReuse));
    }
}
