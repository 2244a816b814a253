//! Resolver chain
//!
//! ```text
//! ResolverShortCircuitIp -> ResolverLogger -> ResolverTrace
//!     -> ResolverErrWrapper -> [ResolverBogon] -> ResolverSystem -> provider
//! ```

use super::provider::MaybeCustomUnderlyingNetwork;
use super::{is_bogon, DnsError, Resolver};
use crate::context::Context;
use crate::failure::{classify_resolver_error, maybe_new_err_wrapper, Operation};
use crate::logging::DebugLogger;
use crate::trace::{EventKind, NetworkEvent};
use crate::{Error, Result};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(15);

/// Resolves through the provider's getaddrinfo.
pub struct ResolverSystem {
    provider: MaybeCustomUnderlyingNetwork,
    timeout: Duration,
    network: String,
}

impl ResolverSystem {
    /// `timeout` of zero means the call is bounded by the context only.
    pub fn new(provider: MaybeCustomUnderlyingNetwork, timeout: Duration) -> Self {
        let network = provider.get().get_addr_info_resolver_network().to_string();
        Self {
            provider,
            timeout,
            network,
        }
    }
}

#[async_trait]
impl Resolver for ResolverSystem {
    async fn lookup_host(&self, ctx: &Context, hostname: &str) -> Result<Vec<IpAddr>> {
        let ctx = if self.timeout.is_zero() {
            ctx.clone()
        } else {
            ctx.clone().with_timeout(self.timeout)
        };
        let addrs = ctx
            .run(self.provider.get().get_addr_info(&ctx, hostname))
            .await?;
        if addrs.is_empty() {
            return Err(DnsError::NoAnswer.into());
        }
        Ok(addrs)
    }

    fn network(&self) -> &str {
        &self.network
    }

    fn address(&self) -> &str {
        ""
    }

    fn close_idle_connections(&self) {}
}

/// Fails resolutions that return a bogon address.
pub(crate) struct ResolverBogon<R> {
    pub(crate) resolver: R,
}

#[async_trait]
impl<R: Resolver> Resolver for ResolverBogon<R> {
    async fn lookup_host(&self, ctx: &Context, hostname: &str) -> Result<Vec<IpAddr>> {
        let addrs = self.resolver.lookup_host(ctx, hostname).await?;
        if addrs.iter().copied().any(is_bogon) {
            return Err(DnsError::Bogon.into());
        }
        Ok(addrs)
    }

    fn network(&self) -> &str {
        self.resolver.network()
    }

    fn address(&self) -> &str {
        self.resolver.address()
    }

    fn close_idle_connections(&self) {
        self.resolver.close_idle_connections()
    }
}

/// Classifies resolver errors.
pub(crate) struct ResolverErrWrapper<R> {
    pub(crate) resolver: R,
}

#[async_trait]
impl<R: Resolver> Resolver for ResolverErrWrapper<R> {
    async fn lookup_host(&self, ctx: &Context, hostname: &str) -> Result<Vec<IpAddr>> {
        self.resolver
            .lookup_host(ctx, hostname)
            .await
            .map_err(|err| maybe_new_err_wrapper(classify_resolver_error, Operation::Resolve, err))
    }

    fn network(&self) -> &str {
        self.resolver.network()
    }

    fn address(&self) -> &str {
        self.resolver.address()
    }

    fn close_idle_connections(&self) {
        self.resolver.close_idle_connections()
    }
}

/// Emits resolve start/done events to the context's trace.
pub(crate) struct ResolverTrace<R> {
    pub(crate) resolver: R,
}

#[async_trait]
impl<R: Resolver> Resolver for ResolverTrace<R> {
    async fn lookup_host(&self, ctx: &Context, hostname: &str) -> Result<Vec<IpAddr>> {
        let trace = ctx.trace();
        let started = Instant::now();
        trace.record(
            NetworkEvent::new(EventKind::ResolveStart)
                .with_hostname(hostname)
                .with_network(self.network())
                .with_address(self.address()),
        );
        let result = self.resolver.lookup_host(ctx, hostname).await;
        let mut done = NetworkEvent::done(EventKind::ResolveDone, started)
            .with_hostname(hostname)
            .with_network(self.network())
            .with_address(self.address())
            .with_outcome(&result);
        if let Ok(addrs) = &result {
            done.addresses = addrs.iter().map(IpAddr::to_string).collect();
        }
        trace.record(done);
        result
    }

    fn network(&self) -> &str {
        self.resolver.network()
    }

    fn address(&self) -> &str {
        self.resolver.address()
    }

    fn close_idle_connections(&self) {
        self.resolver.close_idle_connections()
    }
}

/// Logs resolutions.
pub(crate) struct ResolverLogger<R> {
    pub(crate) resolver: R,
    pub(crate) logger: Arc<dyn DebugLogger>,
}

#[async_trait]
impl<R: Resolver> Resolver for ResolverLogger<R> {
    async fn lookup_host(&self, ctx: &Context, hostname: &str) -> Result<Vec<IpAddr>> {
        self.logger.debug(&format!("resolve {}...", hostname));
        let start = Instant::now();
        let result = self.resolver.lookup_host(ctx, hostname).await;
        let elapsed = start.elapsed();
        match &result {
            Ok(addrs) => self
                .logger
                .debug(&format!("resolve {}... {:?} in {:?}", hostname, addrs, elapsed)),
            Err(err) => self
                .logger
                .debug(&format!("resolve {}... {} in {:?}", hostname, err, elapsed)),
        }
        result
    }

    fn network(&self) -> &str {
        self.resolver.network()
    }

    fn address(&self) -> &str {
        self.resolver.address()
    }

    fn close_idle_connections(&self) {
        self.resolver.close_idle_connections()
    }
}

/// Returns IP literals as they are, without a lookup.
pub(crate) struct ResolverShortCircuitIp<R> {
    pub(crate) resolver: R,
}

#[async_trait]
impl<R: Resolver> Resolver for ResolverShortCircuitIp<R> {
    async fn lookup_host(&self, ctx: &Context, hostname: &str) -> Result<Vec<IpAddr>> {
        let literal = hostname
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(hostname);
        if let Ok(ip) = literal.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        self.resolver.lookup_host(ctx, hostname).await
    }

    fn network(&self) -> &str {
        self.resolver.network()
    }

    fn address(&self) -> &str {
        self.resolver.address()
    }

    fn close_idle_connections(&self) {
        self.resolver.close_idle_connections()
    }
}

/// A resolver that always fails with [`Error::NoResolver`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

#[async_trait]
impl Resolver for NullResolver {
    async fn lookup_host(&self, _ctx: &Context, _hostname: &str) -> Result<Vec<IpAddr>> {
        Err(Error::NoResolver)
    }

    fn network(&self) -> &str {
        "null"
    }

    fn address(&self) -> &str {
        ""
    }

    fn close_idle_connections(&self) {}
}
