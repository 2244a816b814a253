//! TLS configuration helpers
//!
//! - version and cipher suite names ([`tls_version_string`],
//!   [`tls_cipher_suite_string`])
//! - version pinning by name ([`configure_tls_version`])
//! - the [`TlsConfig`] view and its translation into a rustls
//!   `ClientConfig` ([`new_rustls_client_config`])
//! - the bundled default trust store ([`default_root_store`])

mod config;
mod danger;
mod roots;

pub use config::{new_rustls_client_config, TlsConfig};
pub use danger::NoVerify;
pub use roots::{default_root_store, new_default_root_store};

use crate::netx::TlsConn;
use rustls::pki_types::CertificateDer;
use thiserror::Error;

pub const VERSION_TLS10: u16 = 0x0301;
pub const VERSION_TLS11: u16 = 0x0302;
pub const VERSION_TLS12: u16 = 0x0303;
pub const VERSION_TLS13: u16 = 0x0304;

// TLS 1.0 - 1.2
pub const TLS_RSA_WITH_RC4_128_SHA: u16 = 0x0005;
pub const TLS_RSA_WITH_3DES_EDE_CBC_SHA: u16 = 0x000a;
pub const TLS_RSA_WITH_AES_128_CBC_SHA: u16 = 0x002f;
pub const TLS_RSA_WITH_AES_256_CBC_SHA: u16 = 0x0035;
pub const TLS_RSA_WITH_AES_128_CBC_SHA256: u16 = 0x003c;
pub const TLS_RSA_WITH_AES_128_GCM_SHA256: u16 = 0x009c;
pub const TLS_RSA_WITH_AES_256_GCM_SHA384: u16 = 0x009d;
pub const TLS_ECDHE_ECDSA_WITH_RC4_128_SHA: u16 = 0xc007;
pub const TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA: u16 = 0xc009;
pub const TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA: u16 = 0xc00a;
pub const TLS_ECDHE_RSA_WITH_RC4_128_SHA: u16 = 0xc011;
pub const TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA: u16 = 0xc012;
pub const TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA: u16 = 0xc013;
pub const TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA: u16 = 0xc014;
pub const TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256: u16 = 0xc023;
pub const TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256: u16 = 0xc027;
pub const TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256: u16 = 0xc02f;
pub const TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256: u16 = 0xc02b;
pub const TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384: u16 = 0xc030;
pub const TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384: u16 = 0xc02c;
pub const TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305: u16 = 0xcca8;
pub const TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305: u16 = 0xcca9;

// TLS 1.3
pub const TLS_AES_128_GCM_SHA256: u16 = 0x1301;
pub const TLS_AES_256_GCM_SHA384: u16 = 0x1302;
pub const TLS_CHACHA20_POLY1305_SHA256: u16 = 0x1303;

static VERSION_NAMES: &[(u16, &str)] = &[
    (VERSION_TLS10, "TLSv1"),
    (VERSION_TLS11, "TLSv1.1"),
    (VERSION_TLS12, "TLSv1.2"),
    (VERSION_TLS13, "TLSv1.3"),
    (0, ""),
];

static CIPHER_SUITE_NAMES: &[(u16, &str)] = &[
    (TLS_RSA_WITH_RC4_128_SHA, "TLS_RSA_WITH_RC4_128_SHA"),
    (TLS_RSA_WITH_3DES_EDE_CBC_SHA, "TLS_RSA_WITH_3DES_EDE_CBC_SHA"),
    (TLS_RSA_WITH_AES_128_CBC_SHA, "TLS_RSA_WITH_AES_128_CBC_SHA"),
    (TLS_RSA_WITH_AES_256_CBC_SHA, "TLS_RSA_WITH_AES_256_CBC_SHA"),
    (TLS_RSA_WITH_AES_128_CBC_SHA256, "TLS_RSA_WITH_AES_128_CBC_SHA256"),
    (TLS_RSA_WITH_AES_128_GCM_SHA256, "TLS_RSA_WITH_AES_128_GCM_SHA256"),
    (TLS_RSA_WITH_AES_256_GCM_SHA384, "TLS_RSA_WITH_AES_256_GCM_SHA384"),
    (TLS_ECDHE_ECDSA_WITH_RC4_128_SHA, "TLS_ECDHE_ECDSA_WITH_RC4_128_SHA"),
    (TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA, "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA"),
    (TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA, "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA"),
    (TLS_ECDHE_RSA_WITH_RC4_128_SHA, "TLS_ECDHE_RSA_WITH_RC4_128_SHA"),
    (TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA, "TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA"),
    (TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA"),
    (TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA, "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA"),
    (TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256, "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256"),
    (TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256"),
    (TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256, "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256"),
    (TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256, "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256"),
    (TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384, "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384"),
    (TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384, "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384"),
    (TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305, "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305"),
    (TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305, "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305"),
    (TLS_AES_128_GCM_SHA256, "TLS_AES_128_GCM_SHA256"),
    (TLS_AES_256_GCM_SHA384, "TLS_AES_256_GCM_SHA384"),
    (TLS_CHACHA20_POLY1305_SHA256, "TLS_CHACHA20_POLY1305_SHA256"),
    (0, ""),
];

/// TLS configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlsConfigError {
    #[error("invalid TLS version: {0:?}")]
    InvalidTlsVersion(String),

    /// A field outside the translatable set holds a non-default value.
    #[error("incompatible TLS config: field {field} is nonzero")]
    IncompatibleConfig { field: &'static str },

    #[error("no supported TLS version between {min:#06x} and {max:#06x}")]
    NoSupportedProtocolVersion { min: u16, max: u16 },

    #[error("invalid server name: {0:?}")]
    InvalidServerName(String),

    #[error("QUIC TLS config: {0}")]
    Quic(String),
}

/// Name of a TLS version: `""` for zero, `TLS_VERSION_UNKNOWN_<n>` for
/// values outside the table.
pub fn tls_version_string(value: u16) -> String {
    lookup(VERSION_NAMES, value)
        .map(str::to_string)
        .unwrap_or_else(|| format!("TLS_VERSION_UNKNOWN_{}", value))
}

/// Name of a TLS cipher suite: `""` for zero,
/// `TLS_CIPHER_SUITE_UNKNOWN_<n>` for values outside the table.
pub fn tls_cipher_suite_string(value: u16) -> String {
    lookup(CIPHER_SUITE_NAMES, value)
        .map(str::to_string)
        .unwrap_or_else(|| format!("TLS_CIPHER_SUITE_UNKNOWN_{}", value))
}

fn lookup(table: &'static [(u16, &'static str)], value: u16) -> Option<&'static str> {
    table
        .iter()
        .find(|(key, _)| *key == value)
        .map(|(_, name)| *name)
}

/// Pin both the minimum and the maximum version of `config` to `version`.
///
/// Accepts `TLSv1.3`, `TLSv1.2`, `TLSv1.1`, `TLSv1.0` (or `TLSv1`), and the
/// empty string, which leaves `config` untouched. On error `config` is not
/// modified.
pub fn configure_tls_version(config: &mut TlsConfig, version: &str) -> Result<(), TlsConfigError> {
    let value = match version {
        "TLSv1.3" => VERSION_TLS13,
        "TLSv1.2" => VERSION_TLS12,
        "TLSv1.1" => VERSION_TLS11,
        "TLSv1.0" | "TLSv1" => VERSION_TLS10,
        "" => return Ok(()),
        other => return Err(TlsConfigError::InvalidTlsVersion(other.to_string())),
    };
    config.min_version = value;
    config.max_version = value;
    Ok(())
}

/// A clone of `config`, or an empty config.
pub fn cloned_tls_config_or_default(config: Option<&TlsConfig>) -> TlsConfig {
    config.cloned().unwrap_or_default()
}

/// Negotiated parameters of a TLS session. Zero values mean unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsConnectionState {
    pub version: u16,
    pub cipher_suite: u16,
    pub negotiated_protocol: String,
    pub server_name: String,
    pub peer_certificates: Vec<CertificateDer<'static>>,
}

impl TlsConnectionState {
    /// Read the negotiated parameters of a rustls session.
    pub fn from_rustls(state: &rustls::CommonState, server_name: &str) -> Self {
        Self {
            version: state.protocol_version().map(u16::from).unwrap_or(0),
            cipher_suite: state
                .negotiated_cipher_suite()
                .map(|suite| u16::from(suite.suite()))
                .unwrap_or(0),
            negotiated_protocol: state
                .alpn_protocol()
                .map(|proto| String::from_utf8_lossy(proto).into_owned())
                .unwrap_or_default(),
            server_name: server_name.to_string(),
            peer_certificates: state
                .peer_certificates()
                .map(|certs| certs.to_vec())
                .unwrap_or_default(),
        }
    }

    pub fn version_string(&self) -> String {
        tls_version_string(self.version)
    }

    pub fn cipher_suite_string(&self) -> String {
        tls_cipher_suite_string(self.cipher_suite)
    }
}

/// Connection state of `conn`, or the empty state when there is no
/// connection.
pub fn maybe_tls_connection_state(conn: Option<&dyn TlsConn>) -> TlsConnectionState {
    conn.map(|conn| conn.connection_state()).unwrap_or_default()
}
