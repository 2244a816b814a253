//! Construction of decorated primitives.

use super::dialer::{DialerErrWrapper, DialerLogger, DialerResolver, DialerTrace, DialerSystem};
use super::provider::{MaybeCustomUnderlyingNetwork, UnderlyingNetwork};
#[cfg(feature = "quic")]
use super::quic::{
    QuicDialerErrWrapper, QuicDialerLogger, QuicDialerQuinn, QuicDialerResolver, QuicDialerTrace,
};
use super::resolver::{
    NullResolver, ResolverBogon, ResolverErrWrapper, ResolverLogger, ResolverShortCircuitIp,
    ResolverSystem, ResolverTrace, DEFAULT_RESOLVE_TIMEOUT,
};
use super::tls::{
    TlsDialerStd, TlsHandshakerConfigurable, TlsHandshakerErrWrapper, TlsHandshakerLogger,
    TlsHandshakerTrace,
};
#[cfg(feature = "quic")]
use super::QuicDialer;
use super::{Dialer, Resolver, TlsDialer, TlsHandshaker};
use crate::logging::{default_logger, DebugLogger};
use crate::tlsx::TlsConfig;
use std::sync::Arc;
use std::time::Duration;

/// Factory of fully decorated primitives bound to one provider
#[derive(Clone)]
pub struct Netx {
    provider: MaybeCustomUnderlyingNetwork,
    logger: Arc<dyn DebugLogger>,
    connect_timeout: Duration,
    resolve_timeout: Duration,
    tls_handshake_timeout: Duration,
    quic_handshake_timeout: Duration,
    reject_bogons: bool,
}

impl Default for Netx {
    fn default() -> Self {
        NetxBuilder::default().build()
    }
}

impl Netx {
    pub fn builder() -> NetxBuilder {
        NetxBuilder::default()
    }

    /// The provider every primitive of this factory uses
    pub fn provider(&self) -> &MaybeCustomUnderlyingNetwork {
        &self.provider
    }

    /// Resolver backed by the provider's getaddrinfo.
    pub fn new_stdlib_resolver(&self) -> Arc<dyn Resolver> {
        let system = ResolverSystem::new(self.provider.clone(), self.resolve_timeout);
        if self.reject_bogons {
            self.wrap_resolver(ResolverBogon { resolver: system })
        } else {
            self.wrap_resolver(system)
        }
    }

    fn wrap_resolver<R: Resolver + 'static>(&self, base: R) -> Arc<dyn Resolver> {
        Arc::new(ResolverShortCircuitIp {
            resolver: ResolverLogger {
                resolver: ResolverTrace {
                    resolver: ResolverErrWrapper { resolver: base },
                },
                logger: self.logger.clone(),
            },
        })
    }

    /// Dialer that resolves domain names with `resolver`.
    pub fn new_dialer_with_resolver(&self, resolver: Arc<dyn Resolver>) -> Arc<dyn Dialer> {
        Arc::new(DialerLogger {
            dialer: DialerResolver {
                dialer: DialerTrace {
                    dialer: DialerErrWrapper {
                        dialer: DialerSystem::new(self.provider.clone(), self.connect_timeout),
                    },
                },
                resolver,
            },
            logger: self.logger.clone(),
        })
    }

    /// Dialer that only accepts IP endpoints; domain names fail with
    /// [`Error::NoResolver`](crate::Error::NoResolver).
    pub fn new_dialer_without_resolver(&self) -> Arc<dyn Dialer> {
        self.new_dialer_with_resolver(Arc::new(ResolverShortCircuitIp {
            resolver: NullResolver,
        }))
    }

    pub fn new_tls_handshaker(&self) -> Arc<dyn TlsHandshaker> {
        Arc::new(TlsHandshakerLogger {
            handshaker: TlsHandshakerTrace {
                handshaker: TlsHandshakerErrWrapper {
                    handshaker: TlsHandshakerConfigurable::new(
                        self.provider.clone(),
                        self.tls_handshake_timeout,
                    ),
                },
            },
            logger: self.logger.clone(),
        })
    }

    /// TLS dialer with an empty base config.
    pub fn new_tls_dialer(
        &self,
        dialer: Arc<dyn Dialer>,
        handshaker: Arc<dyn TlsHandshaker>,
    ) -> Arc<dyn TlsDialer> {
        self.new_tls_dialer_with_config(dialer, handshaker, TlsConfig::default())
    }

    pub fn new_tls_dialer_with_config(
        &self,
        dialer: Arc<dyn Dialer>,
        handshaker: Arc<dyn TlsHandshaker>,
        config: TlsConfig,
    ) -> Arc<dyn TlsDialer> {
        Arc::new(TlsDialerStd::new(dialer, handshaker, config))
    }

    /// QUIC dialer that resolves domain names with `resolver`.
    #[cfg(feature = "quic")]
    pub fn new_quic_dialer_with_resolver(&self, resolver: Arc<dyn Resolver>) -> Arc<dyn QuicDialer> {
        Arc::new(QuicDialerLogger {
            dialer: QuicDialerResolver {
                dialer: QuicDialerTrace {
                    dialer: QuicDialerErrWrapper {
                        dialer: QuicDialerQuinn::new(
                            self.provider.clone(),
                            self.quic_handshake_timeout,
                        ),
                    },
                },
                resolver,
            },
            logger: self.logger.clone(),
        })
    }

    #[cfg(feature = "quic")]
    pub fn new_quic_dialer_without_resolver(&self) -> Arc<dyn QuicDialer> {
        self.new_quic_dialer_with_resolver(Arc::new(ResolverShortCircuitIp {
            resolver: NullResolver,
        }))
    }
}

/// Builder for [`Netx`]
///
/// Zero connect and handshake timeouts select each primitive's default.
pub struct NetxBuilder {
    provider: Option<Arc<dyn UnderlyingNetwork>>,
    logger: Option<Arc<dyn DebugLogger>>,
    connect_timeout: Duration,
    resolve_timeout: Duration,
    tls_handshake_timeout: Duration,
    quic_handshake_timeout: Duration,
    reject_bogons: bool,
}

impl Default for NetxBuilder {
    fn default() -> Self {
        Self {
            provider: None,
            logger: None,
            connect_timeout: Duration::ZERO,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            tls_handshake_timeout: Duration::ZERO,
            quic_handshake_timeout: Duration::ZERO,
            reject_bogons: false,
        }
    }
}

impl NetxBuilder {
    /// Use a custom provider instead of the host network.
    pub fn provider(mut self, provider: Arc<dyn UnderlyingNetwork>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn DebugLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Zero leaves resolution bounded by the caller's context only.
    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn tls_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.tls_handshake_timeout = timeout;
        self
    }

    pub fn quic_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.quic_handshake_timeout = timeout;
        self
    }

    /// Fail resolutions that return private or reserved addresses.
    pub fn reject_bogons(mut self, reject: bool) -> Self {
        self.reject_bogons = reject;
        self
    }

    pub fn build(self) -> Netx {
        Netx {
            provider: MaybeCustomUnderlyingNetwork::new(self.provider),
            logger: self.logger.unwrap_or_else(default_logger),
            connect_timeout: self.connect_timeout,
            resolve_timeout: self.resolve_timeout,
            tls_handshake_timeout: self.tls_handshake_timeout,
            quic_handshake_timeout: self.quic_handshake_timeout,
            reject_bogons: self.reject_bogons,
        }
    }
}
