//! Classifiers.
//!
//! Each classifier walks the error and its causes and stops at the first
//! cause it recognizes. Typed causes come first: classified wrappers,
//! cancellation, [`DnsError`], TLS and QUIC errors, then raw OS codes, then
//! [`io::ErrorKind`]. Matching on message text is the last resort and is
//! best-effort only (see [`MESSAGE_FALLBACK`]).

use super::codes::*;
use super::{errno_failure, scrub, ErrWrapper};
use crate::netx::{dns_error_from_io, DnsError};
use crate::Error;
use rustls::{AlertDescription, CertificateError};
use std::error::Error as StdError;
use std::io;

/// Message substrings recognized when no typed cause matched. Only for
/// errors produced by code that does not expose a typed cause.
static MESSAGE_FALLBACK: &[(&str, &str)] = &[
    ("connection refused", CONNECTION_REFUSED),
    ("connection reset", CONNECTION_RESET),
    ("no such host", DNS_NXDOMAIN_ERROR),
    ("i/o timeout", GENERIC_TIMEOUT_ERROR),
    ("deadline has elapsed", GENERIC_TIMEOUT_ERROR),
    ("unexpected eof", EOF_ERROR),
];

/// Classifies errors from any operation.
pub fn classify_generic_error(err: &(dyn StdError + 'static)) -> String {
    for cause in causes(err) {
        if let Some(failure) = generic_failure(cause) {
            return failure;
        }
    }
    fallback(err)
}

/// Classifies errors from name resolution.
///
/// On top of the generic rules, I/O errors produced by getaddrinfo are
/// mapped to `dns_*` failures.
pub fn classify_resolver_error(err: &(dyn StdError + 'static)) -> String {
    for cause in causes(err) {
        if let Some(failure) = generic_failure(cause) {
            return failure;
        }
        if let Some(failure) = cause
            .downcast_ref::<io::Error>()
            .and_then(dns_error_from_io)
            .as_ref()
            .and_then(dns_failure)
        {
            return failure.to_string();
        }
    }
    fallback(err)
}

/// Classifies errors from a TLS handshake.
pub fn classify_tls_handshake_error(err: &(dyn StdError + 'static)) -> String {
    for cause in causes(err) {
        if let Some(tls) = cause.downcast_ref::<rustls::Error>() {
            return tls_failure(tls).to_string();
        }
        if let Some(failure) = generic_failure(cause) {
            return failure;
        }
    }
    fallback(err)
}

/// Classifies errors from a QUIC handshake.
pub fn classify_quic_handshake_error(err: &(dyn StdError + 'static)) -> String {
    for cause in causes(err) {
        #[cfg(feature = "quic")]
        if let Some(failure) = cause
            .downcast_ref::<quinn::ConnectionError>()
            .and_then(quic_failure)
        {
            return failure.to_string();
        }
        if let Some(tls) = cause.downcast_ref::<rustls::Error>() {
            return tls_failure(tls).to_string();
        }
        if let Some(failure) = generic_failure(cause) {
            return failure;
        }
    }
    fallback(err)
}

/// Iterates `err` and its causes, descending into custom `io::Error`
/// payloads and the transparent variants of [`Error`], which plain
/// `source()` chains skip.
fn causes<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |cur| next_cause(*cur))
}

fn next_cause<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a (dyn StdError + 'static)> {
    if let Some(err) = err.downcast_ref::<Error>() {
        return match err {
            Error::Io(inner) => Some(inner as &(dyn StdError + 'static)),
            Error::Dns(inner) => Some(inner as &(dyn StdError + 'static)),
            Error::Tls(inner) => Some(inner as &(dyn StdError + 'static)),
            #[cfg(feature = "quic")]
            Error::QuicConnect(inner) => Some(inner as &(dyn StdError + 'static)),
            #[cfg(feature = "quic")]
            Error::QuicConnection(inner) => Some(inner as &(dyn StdError + 'static)),
            Error::Wrapped(inner) => Some(inner as &(dyn StdError + 'static)),
            _ => None,
        };
    }
    if let Some(err) = err.downcast_ref::<io::Error>() {
        return err
            .get_ref()
            .map(|inner| inner as &(dyn StdError + 'static));
    }
    err.source()
}

fn generic_failure(cause: &(dyn StdError + 'static)) -> Option<String> {
    if let Some(wrapper) = cause.downcast_ref::<ErrWrapper>() {
        return Some(wrapper.failure().to_string());
    }
    if let Some(err) = cause.downcast_ref::<Error>() {
        return match err {
            Error::Canceled => Some(CONTEXT_CANCELED.to_string()),
            Error::DeadlineExceeded => Some(GENERIC_TIMEOUT_ERROR.to_string()),
            _ => None,
        };
    }
    if let Some(err) = cause.downcast_ref::<DnsError>() {
        return dns_failure(err).map(String::from);
    }
    if let Some(err) = cause.downcast_ref::<io::Error>() {
        return io_failure(err).map(String::from);
    }
    if cause.is::<tokio::time::error::Elapsed>() {
        return Some(GENERIC_TIMEOUT_ERROR.to_string());
    }
    None
}

fn io_failure(err: &io::Error) -> Option<&'static str> {
    if let Some(failure) = err.raw_os_error().and_then(errno_failure) {
        return Some(failure);
    }
    use io::ErrorKind::*;
    let failure = match err.kind() {
        ConnectionRefused => CONNECTION_REFUSED,
        ConnectionReset => CONNECTION_RESET,
        ConnectionAborted => CONNECTION_ABORTED,
        HostUnreachable => HOST_UNREACHABLE,
        NetworkUnreachable => NETWORK_UNREACHABLE,
        NetworkDown => NETWORK_DOWN,
        AddrInUse => ADDRESS_IN_USE,
        AddrNotAvailable => ADDRESS_NOT_AVAILABLE,
        NotConnected => NOT_CONNECTED,
        PermissionDenied => PERMISSION_DENIED,
        TimedOut => GENERIC_TIMEOUT_ERROR,
        UnexpectedEof => EOF_ERROR,
        Interrupted => INTERRUPTED,
        WouldBlock => OPERATION_WOULD_BLOCK,
        _ => return None,
    };
    Some(failure)
}

fn dns_failure(err: &DnsError) -> Option<&'static str> {
    let failure = match err {
        DnsError::NoSuchHost => DNS_NXDOMAIN_ERROR,
        DnsError::NoAnswer => DNS_NO_ANSWER,
        DnsError::AndroidCacheNoData => ANDROID_DNS_CACHE_NO_DATA,
        DnsError::ServerMisbehaving => DNS_SERVER_MISBEHAVING,
        DnsError::Refused => DNS_REFUSED_ERROR,
        DnsError::TemporaryFailure => DNS_TEMPORARY_FAILURE,
        DnsError::NonRecoverableFailure => DNS_NON_RECOVERABLE_FAILURE,
        DnsError::Timeout => GENERIC_TIMEOUT_ERROR,
        DnsError::Bogon => DNS_BOGON_ERROR,
        DnsError::Other(_) => return None,
    };
    Some(failure)
}

fn tls_failure(err: &rustls::Error) -> &'static str {
    match err {
        rustls::Error::InvalidCertificate(cert) => certificate_failure(cert),
        rustls::Error::AlertReceived(alert) => alert_failure(*alert),
        _ => SSL_FAILED_HANDSHAKE,
    }
}

fn certificate_failure(err: &CertificateError) -> &'static str {
    match err {
        CertificateError::UnknownIssuer => SSL_UNKNOWN_AUTHORITY,
        CertificateError::NotValidForName => SSL_INVALID_HOSTNAME,
        // Newer rustls releases add context-carrying variants of the above.
        other if format!("{other:?}").starts_with("NotValidForName") => SSL_INVALID_HOSTNAME,
        other if format!("{other:?}").starts_with("UnknownIssuer") => SSL_UNKNOWN_AUTHORITY,
        _ => SSL_INVALID_CERTIFICATE,
    }
}

fn alert_failure(alert: AlertDescription) -> &'static str {
    match alert {
        AlertDescription::UnknownCA => SSL_UNKNOWN_AUTHORITY,
        AlertDescription::BadCertificate
        | AlertDescription::UnsupportedCertificate
        | AlertDescription::CertificateRevoked
        | AlertDescription::CertificateExpired
        | AlertDescription::CertificateUnknown => SSL_INVALID_CERTIFICATE,
        AlertDescription::UnrecognisedName => SSL_INVALID_HOSTNAME,
        _ => SSL_FAILED_HANDSHAKE,
    }
}

// RFC 9000 section 20.1
#[cfg(feature = "quic")]
const QUIC_CONNECTION_REFUSED: u64 = 0x02;
#[cfg(feature = "quic")]
const QUIC_CRYPTO_ERROR: std::ops::RangeInclusive<u64> = 0x100..=0x1ff;

#[cfg(feature = "quic")]
fn quic_failure(err: &quinn::ConnectionError) -> Option<&'static str> {
    use quinn::ConnectionError;
    match err {
        ConnectionError::VersionMismatch => Some(QUIC_INCOMPATIBLE_VERSION),
        ConnectionError::TimedOut => Some(GENERIC_TIMEOUT_ERROR),
        ConnectionError::Reset => Some(CONNECTION_RESET),
        ConnectionError::LocallyClosed => Some(CONNECTION_ALREADY_CLOSED),
        ConnectionError::TransportError(err) => {
            quic_transport_failure(u64::from(err.code), &err.reason)
        }
        ConnectionError::ConnectionClosed(close) => quic_transport_failure(
            u64::from(close.error_code),
            &String::from_utf8_lossy(&close.reason),
        ),
        _ => None,
    }
}

#[cfg(feature = "quic")]
fn quic_transport_failure(code: u64, reason: &str) -> Option<&'static str> {
    if code == QUIC_CONNECTION_REFUSED {
        return Some(CONNECTION_REFUSED);
    }
    if !QUIC_CRYPTO_ERROR.contains(&code) {
        return None;
    }
    // Local certificate verification failures carry the rustls error text.
    if reason.contains("NotValidForName") {
        return Some(SSL_INVALID_HOSTNAME);
    }
    if reason.contains("UnknownIssuer") {
        return Some(SSL_UNKNOWN_AUTHORITY);
    }
    if reason.contains("invalid peer certificate") {
        return Some(SSL_INVALID_CERTIFICATE);
    }
    let alert = (code - QUIC_CRYPTO_ERROR.start()) as u8;
    Some(alert_failure(AlertDescription::from(alert)))
}

fn fallback(err: &(dyn StdError + 'static)) -> String {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    MESSAGE_FALLBACK
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, failure)| failure.to_string())
        .unwrap_or_else(|| format!("{}{}", UNKNOWN_FAILURE_PREFIX, scrub(&message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::{maybe_new_err_wrapper, Operation};

    fn io_kind(kind: io::ErrorKind) -> Error {
        Error::Io(io::Error::from(kind))
    }

    #[test]
    fn test_cancellation_is_distinct_from_timeout() {
        for classifier in [
            classify_generic_error,
            classify_resolver_error,
            classify_tls_handshake_error,
            classify_quic_handshake_error,
        ] {
            assert_eq!(classifier(&Error::Canceled), CONTEXT_CANCELED);
            assert_eq!(classifier(&Error::DeadlineExceeded), GENERIC_TIMEOUT_ERROR);
        }
    }

    #[test]
    fn test_io_kinds() {
        let cases = [
            (io::ErrorKind::ConnectionRefused, CONNECTION_REFUSED),
            (io::ErrorKind::ConnectionReset, CONNECTION_RESET),
            (io::ErrorKind::ConnectionAborted, CONNECTION_ABORTED),
            (io::ErrorKind::HostUnreachable, HOST_UNREACHABLE),
            (io::ErrorKind::NetworkUnreachable, NETWORK_UNREACHABLE),
            (io::ErrorKind::AddrInUse, ADDRESS_IN_USE),
            (io::ErrorKind::TimedOut, GENERIC_TIMEOUT_ERROR),
            (io::ErrorKind::UnexpectedEof, EOF_ERROR),
        ];
        for (kind, expected) in cases {
            assert_eq!(classify_generic_error(&io_kind(kind)), expected, "{kind:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_raw_errno_wins_over_kind() {
        let err = Error::Io(io::Error::from_raw_os_error(libc::ETIMEDOUT));
        assert_eq!(classify_generic_error(&err), TIMED_OUT);

        let err = Error::Io(io::Error::from_raw_os_error(libc::ECONNREFUSED));
        assert_eq!(classify_generic_error(&err), CONNECTION_REFUSED);
    }

    #[test]
    fn test_dns_errors() {
        let cases = [
            (DnsError::NoSuchHost, DNS_NXDOMAIN_ERROR),
            (DnsError::NoAnswer, DNS_NO_ANSWER),
            (DnsError::AndroidCacheNoData, ANDROID_DNS_CACHE_NO_DATA),
            (DnsError::ServerMisbehaving, DNS_SERVER_MISBEHAVING),
            (DnsError::Refused, DNS_REFUSED_ERROR),
            (DnsError::TemporaryFailure, DNS_TEMPORARY_FAILURE),
            (DnsError::Timeout, GENERIC_TIMEOUT_ERROR),
            (DnsError::Bogon, DNS_BOGON_ERROR),
        ];
        for (dns, expected) in cases {
            assert_eq!(classify_resolver_error(&Error::Dns(dns.clone())), expected, "{dns:?}");
        }
        assert_ne!(
            classify_resolver_error(&Error::Dns(DnsError::AndroidCacheNoData)),
            classify_resolver_error(&Error::Dns(DnsError::NoSuchHost)),
        );
    }

    #[test]
    fn test_resolver_understands_getaddrinfo_messages() {
        let err = Error::Io(io::Error::new(
            io::ErrorKind::Other,
            "failed to lookup address information: Name or service not known",
        ));
        assert_eq!(classify_resolver_error(&err), DNS_NXDOMAIN_ERROR);
        assert!(classify_generic_error(&err).starts_with(UNKNOWN_FAILURE_PREFIX));
    }

    #[test]
    fn test_dns_error_inside_io_error() {
        let err = Error::Io(io::Error::new(io::ErrorKind::Other, DnsError::Refused));
        assert_eq!(classify_generic_error(&err), DNS_REFUSED_ERROR);
    }

    #[test]
    fn test_tls_errors() {
        let cases = [
            (
                rustls::Error::InvalidCertificate(CertificateError::NotValidForName),
                SSL_INVALID_HOSTNAME,
            ),
            (
                rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer),
                SSL_UNKNOWN_AUTHORITY,
            ),
            (
                rustls::Error::InvalidCertificate(CertificateError::Expired),
                SSL_INVALID_CERTIFICATE,
            ),
            (
                rustls::Error::AlertReceived(AlertDescription::HandshakeFailure),
                SSL_FAILED_HANDSHAKE,
            ),
            (
                rustls::Error::AlertReceived(AlertDescription::UnknownCA),
                SSL_UNKNOWN_AUTHORITY,
            ),
        ];
        for (tls, expected) in cases {
            assert_eq!(classify_tls_handshake_error(&Error::Tls(tls.clone())), expected);

            // tokio-rustls reports the same errors wrapped in io::Error
            let wrapped = Error::Io(io::Error::new(io::ErrorKind::InvalidData, tls));
            assert_eq!(classify_tls_handshake_error(&wrapped), expected);
        }
    }

    #[test]
    fn test_tls_classifier_falls_back_to_generic() {
        let err = io_kind(io::ErrorKind::ConnectionReset);
        assert_eq!(classify_tls_handshake_error(&err), CONNECTION_RESET);

        let err = io_kind(io::ErrorKind::UnexpectedEof);
        assert_eq!(classify_tls_handshake_error(&err), EOF_ERROR);
    }

    #[test]
    fn test_unknown_failure_is_scrubbed() {
        let err = Error::Io(io::Error::new(
            io::ErrorKind::Other,
            "weird thing happened with 192.168.1.1:8443",
        ));
        assert_eq!(
            classify_generic_error(&err),
            "unknown_failure: weird thing happened with [scrubbed]"
        );
    }

    #[test]
    fn test_message_fallback() {
        let err = Error::Io(io::Error::new(io::ErrorKind::Other, "read: connection reset by peer"));
        assert_eq!(classify_generic_error(&err), CONNECTION_RESET);
    }

    #[test]
    fn test_idempotence() {
        let raw = || Error::Io(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert_eq!(classify_generic_error(&raw()), classify_generic_error(&raw()));

        let raw = || Error::Io(io::Error::new(io::ErrorKind::Other, "mystery"));
        let first = classify_generic_error(&raw());
        assert_eq!(first, classify_generic_error(&raw()));

        let wrapped = maybe_new_err_wrapper(classify_generic_error, Operation::Connect, raw());
        assert_eq!(classify_generic_error(&wrapped), first);
        assert_eq!(classify_tls_handshake_error(&wrapped), first);
        assert_eq!(classify_resolver_error(&wrapped), first);
    }

    #[test]
    fn test_elapsed_is_timeout() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let elapsed = rt
            .block_on(async {
                tokio::time::timeout(
                    std::time::Duration::from_millis(1),
                    std::future::pending::<()>(),
                )
                .await
            })
            .unwrap_err();
        let err = Error::Io(io::Error::new(io::ErrorKind::Other, elapsed));
        assert_eq!(classify_generic_error(&err), GENERIC_TIMEOUT_ERROR);
    }

    #[cfg(feature = "quic")]
    #[test]
    fn test_quic_errors() {
        let err = Error::QuicConnection(quinn::ConnectionError::VersionMismatch);
        assert_eq!(classify_quic_handshake_error(&err), QUIC_INCOMPATIBLE_VERSION);

        let err = Error::QuicConnection(quinn::ConnectionError::TimedOut);
        assert_eq!(classify_quic_handshake_error(&err), GENERIC_TIMEOUT_ERROR);

        assert_eq!(
            quic_transport_failure(0x100 + 48, "peer sent unknown_ca"),
            Some(SSL_UNKNOWN_AUTHORITY)
        );
        assert_eq!(
            quic_transport_failure(0x100 + 42, "invalid peer certificate: NotValidForName"),
            Some(SSL_INVALID_HOSTNAME)
        );
        assert_eq!(quic_transport_failure(0x02, ""), Some(CONNECTION_REFUSED));
        assert_eq!(quic_transport_failure(0x0a, ""), None);
    }
}
