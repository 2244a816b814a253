//! # netprobe
//!
//! Observable, classifiable network primitives for censorship measurement.
//!
//! Every experiment (DNS lookups, TCP connects, TLS and QUIC handshakes) goes
//! through the primitives in [`netx`]. Each primitive is a decorator chain:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Logging decorator                  │
//! │       (human readable lines to a DebugLogger)        │
//! ├─────────────────────────────────────────────────────┤
//! │                   Tracing decorator                  │
//! │     (start/done NetworkEvents to the call's Trace)   │
//! ├─────────────────────────────────────────────────────┤
//! │                Error wrapping decorator              │
//! │   (raw error -> failure string, classified once)     │
//! ├─────────────────────────────────────────────────────┤
//! │                 Base implementation                  │
//! │         (rustls, quinn, resolver + dialer)           │
//! ├─────────────────────────────────────────────────────┤
//! │             Underlying network provider              │
//! │      (tokio sockets, getaddrinfo, or emulated)       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Failures come back as [`Error::Wrapped`] values whose failure string
//! (`connection_refused`, `dns_nxdomain_error`, `ssl_invalid_hostname`, ...)
//! is the stable vocabulary shared with measurement consumers.

pub mod config;
pub mod context;
pub mod failure;
pub mod logging;
pub mod netx;
pub mod tlsx;
pub mod trace;

pub use config::Config;
pub use context::Context;
pub use failure::{ErrWrapper, Operation};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
///
/// Raw variants are what base implementations and providers produce. The
/// error wrapping decorators replace them with [`Error::Wrapped`], which is
/// what experiment code sees.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(std::io::Error),

    #[error(transparent)]
    Dns(#[from] netx::DnsError),

    #[error("{0}")]
    Tls(#[from] rustls::Error),

    #[cfg(feature = "quic")]
    #[error("{0}")]
    QuicConnect(#[from] quinn::ConnectError),

    #[cfg(feature = "quic")]
    #[error("{0}")]
    QuicConnection(#[from] quinn::ConnectionError),

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Wrapped(#[from] ErrWrapper),

    #[error("TLS configuration error: {0}")]
    TlsConfig(#[from] tlsx::TlsConfigError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("address {0}: missing port in address")]
    MissingPort(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("no configured resolver")]
    NoResolver,

    #[error("no configured TLS dialer")]
    NoTlsDialer,

    #[error("cannot reuse connection")]
    NoConnReuse,
}

impl Error {
    /// Failure string of a classified error, `None` for raw errors.
    pub fn failure(&self) -> Option<&str> {
        self.err_wrapper().map(ErrWrapper::failure)
    }

    /// Operation that produced a classified error.
    pub fn operation(&self) -> Option<Operation> {
        self.err_wrapper().map(ErrWrapper::operation)
    }

    fn err_wrapper(&self) -> Option<&ErrWrapper> {
        match self {
            Error::Wrapped(w) => Some(w),
            Error::Io(err) => err
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<ErrWrapper>()),
            _ => None,
        }
    }

    /// Converts an I/O error coming out of tokio-rustls, lifting the
    /// embedded [`rustls::Error`] when there is one.
    pub(crate) fn from_tls_io(err: std::io::Error) -> Self {
        match err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        {
            Some(tls) => Error::Tls(tls.clone()),
            None => Error::Io(err),
        }
    }
}

/// I/O errors from the connections handed out by the primitives carry an
/// [`ErrWrapper`], which is lifted back into [`Error::Wrapped`].
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<ErrWrapper>()) {
            return Error::Io(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<ErrWrapper>()) {
            Some(Ok(wrapper)) => Error::Wrapped(*wrapper),
            Some(Err(inner)) => Error::Io(std::io::Error::new(kind, inner)),
            None => Error::Io(kind.into()),
        }
    }
}
