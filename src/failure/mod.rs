//! Failure classification
//!
//! Turns raw, platform-specific errors into the closed failure vocabulary
//! shared with the rest of the measurement platform:
//! - [`codes`]: the failure strings themselves
//! - [`classify`]: generic, resolver, TLS and QUIC classifiers
//! - [`ErrWrapper`]: a classified error tagged with its [`Operation`]
//!
//! A raw error is classified exactly once, by the innermost error wrapping
//! decorator that observes it. Every outer layer passes the wrapper through.

pub mod codes;
mod classify;
mod errno;
mod scrubber;

pub use classify::{
    classify_generic_error, classify_quic_handshake_error, classify_resolver_error,
    classify_tls_handshake_error,
};
pub use errno::errno_failure;
pub use scrubber::scrub;

use crate::Error;
use serde::{Serialize, Serializer};
use std::error::Error as StdError;
use std::fmt;
use std::io;

/// A classifier maps a raw error to a failure string.
pub type Classifier = fn(&(dyn StdError + 'static)) -> String;

/// Network phase that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Resolve,
    Connect,
    TlsHandshake,
    QuicHandshake,
    Read,
    Write,
    Close,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Resolve => "resolve",
            Operation::Connect => "connect",
            Operation::TlsHandshake => "tls_handshake",
            Operation::QuicHandshake => "quic_handshake",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Close => "close",
        }
    }

    /// The classifier that understands errors of this phase.
    pub fn classifier(&self) -> Classifier {
        match self {
            Operation::Resolve => classify_resolver_error,
            Operation::TlsHandshake => classify_tls_handshake_error,
            Operation::QuicHandshake => classify_quic_handshake_error,
            _ => classify_generic_error,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A classified error.
///
/// `Display` prints the failure string only. The raw error stays reachable
/// through [`ErrWrapper::wrapped`] and `source()`.
#[derive(Debug)]
pub struct ErrWrapper {
    failure: String,
    operation: Operation,
    wrapped: Box<Error>,
}

impl ErrWrapper {
    pub fn failure(&self) -> &str {
        &self.failure
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn wrapped(&self) -> &Error {
        &self.wrapped
    }

    pub fn into_wrapped(self) -> Error {
        *self.wrapped
    }
}

impl fmt::Display for ErrWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.failure)
    }
}

impl StdError for ErrWrapper {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.wrapped.as_ref())
    }
}

/// Classifies `err` and tags it with `operation`, unless it is already
/// classified, in which case it is returned untouched.
pub fn maybe_new_err_wrapper(classifier: Classifier, operation: Operation, err: Error) -> Error {
    match err {
        Error::Wrapped(_) => err,
        raw => {
            let failure = classifier(&raw);
            Error::Wrapped(ErrWrapper {
                failure,
                operation,
                wrapped: Box::new(raw),
            })
        }
    }
}

/// Classifies an I/O error from an established connection.
///
/// The result keeps the original [`io::ErrorKind`] and carries an
/// [`ErrWrapper`] as its payload. Errors that already carry one are
/// returned untouched.
pub fn wrap_io_error(operation: Operation, err: io::Error) -> io::Error {
    if err.get_ref().is_some_and(|inner| inner.is::<ErrWrapper>()) {
        return err;
    }
    let kind = err.kind();
    let raw = Error::Io(err);
    let failure = operation.classifier()(&raw);
    io::Error::new(
        kind,
        ErrWrapper {
            failure,
            operation,
            wrapped: Box::new(raw),
        },
    )
}

/// Classifies `err` with the classifier matching `operation`.
///
/// For collaborators that need classified errors outside the decorator
/// chains.
pub fn classify(operation: Operation, err: Error) -> Error {
    maybe_new_err_wrapper(operation.classifier(), operation, err)
}

/// Picks the most informative error out of a list of attempts: the first
/// classified error with a known failure, otherwise the first error.
///
/// Returns `None` for an empty list.
pub fn reduce_errors(errors: Vec<Error>) -> Option<Error> {
    let known = errors.iter().position(|err| {
        err.failure()
            .is_some_and(|f| !f.starts_with(codes::UNKNOWN_FAILURE_PREFIX))
    });
    let index = known.unwrap_or(0);
    errors.into_iter().nth(index)
}
