//! TLS configuration view and its translation into rustls.

use super::{default_root_store, NoVerify, TlsConfigError};
use rustls::client::danger::ServerCertVerifier;
use rustls::client::ResolvesClientCert;
use rustls::{ClientConfig, KeyLog, RootCertStore, SupportedProtocolVersion};
use std::sync::Arc;

/// Client TLS settings understood by every handshaker.
///
/// The first group of fields is translated by [`new_rustls_client_config`].
/// The second group exists so that callers can express settings that the
/// translation does not know how to carry over; any non-default value there
/// makes the translation fail instead of being dropped.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// SNI and name to verify; empty means "use the dialed host"
    pub server_name: String,
    /// ALPN protocols in preference order
    pub next_protos: Vec<String>,
    /// Minimum version, zero means unconstrained
    pub min_version: u16,
    /// Maximum version, zero means unconstrained
    pub max_version: u16,
    /// Trusted roots, `None` means the bundled default store
    pub root_cas: Option<Arc<RootCertStore>>,
    pub insecure_skip_verify: bool,
    pub dynamic_record_sizing_disabled: bool,

    pub cipher_suites: Vec<u16>,
    pub curve_preferences: Vec<u16>,
    pub session_tickets_disabled: bool,
    pub max_fragment_size: Option<usize>,
    pub key_log: Option<Arc<dyn KeyLog>>,
    pub client_cert_resolver: Option<Arc<dyn ResolvesClientCert>>,
    pub server_cert_verifier: Option<Arc<dyn ServerCertVerifier>>,
}

impl TlsConfig {
    /// Config with the given server name and nothing else
    pub fn with_server_name(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            ..Self::default()
        }
    }

    /// Name of the first unsupported field holding a non-default value.
    pub fn first_unsupported_field(&self) -> Option<&'static str> {
        if !self.cipher_suites.is_empty() {
            return Some("cipher_suites");
        }
        if !self.curve_preferences.is_empty() {
            return Some("curve_preferences");
        }
        if self.session_tickets_disabled {
            return Some("session_tickets_disabled");
        }
        if self.max_fragment_size.is_some() {
            return Some("max_fragment_size");
        }
        if self.key_log.is_some() {
            return Some("key_log");
        }
        if self.client_cert_resolver.is_some() {
            return Some("client_cert_resolver");
        }
        if self.server_cert_verifier.is_some() {
            return Some("server_cert_verifier");
        }
        None
    }

    /// Copy of the translatable fields, or an error naming the first
    /// unsupported field that is set.
    pub fn supported_subset(&self) -> Result<TlsConfig, TlsConfigError> {
        if let Some(field) = self.first_unsupported_field() {
            return Err(TlsConfigError::IncompatibleConfig { field });
        }
        Ok(TlsConfig {
            server_name: self.server_name.clone(),
            next_protos: self.next_protos.clone(),
            min_version: self.min_version,
            max_version: self.max_version,
            root_cas: self.root_cas.clone(),
            insecure_skip_verify: self.insecure_skip_verify,
            dynamic_record_sizing_disabled: self.dynamic_record_sizing_disabled,
            ..TlsConfig::default()
        })
    }

    /// rustls protocol versions within `[min_version, max_version]`
    fn protocol_versions(&self) -> Vec<&'static SupportedProtocolVersion> {
        let min = self.min_version;
        let max = if self.max_version == 0 {
            u16::MAX
        } else {
            self.max_version
        };
        rustls::ALL_VERSIONS
            .iter()
            .copied()
            .filter(|v| {
                let value = u16::from(v.version);
                value >= min && value <= max
            })
            .collect()
    }

    pub(crate) fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        self.next_protos
            .iter()
            .map(|proto| proto.as_bytes().to_vec())
            .collect()
    }
}

/// Build a rustls client configuration equivalent to `config`.
///
/// Fails with [`TlsConfigError::IncompatibleConfig`] when an unsupported
/// field is set. rustls never resizes records dynamically, so
/// `dynamic_record_sizing_disabled` needs no translation.
pub fn new_rustls_client_config(config: &TlsConfig) -> Result<ClientConfig, TlsConfigError> {
    let config = config.supported_subset()?;

    let versions = config.protocol_versions();
    let no_versions = || TlsConfigError::NoSupportedProtocolVersion {
        min: config.min_version,
        max: config.max_version,
    };
    if versions.is_empty() {
        return Err(no_versions());
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&versions)
        .map_err(|_| no_versions())?;

    let mut client = if config.insecure_skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerify::new()))
            .with_no_client_auth()
    } else {
        let roots = config.root_cas.clone().unwrap_or_else(default_root_store);
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    client.alpn_protocols = config.alpn_protocols();
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlsx::{VERSION_TLS10, VERSION_TLS12, VERSION_TLS13};

    #[derive(Debug)]
    struct NoKeyLog;

    impl KeyLog for NoKeyLog {
        fn log(&self, _label: &str, _client_random: &[u8], _secret: &[u8]) {}
    }

    #[derive(Debug)]
    struct NoClientCert;

    impl ResolvesClientCert for NoClientCert {
        fn resolve(
            &self,
            _root_hint_subjects: &[&[u8]],
            _sigschemes: &[rustls::SignatureScheme],
        ) -> Option<Arc<rustls::sign::CertifiedKey>> {
            None
        }

        fn has_certs(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_unsupported_field_is_rejected() {
        let config = TlsConfig {
            client_cert_resolver: Some(Arc::new(NoClientCert)),
            ..TlsConfig::default()
        };
        let err = new_rustls_client_config(&config).unwrap_err();
        assert_eq!(
            err,
            TlsConfigError::IncompatibleConfig {
                field: "client_cert_resolver"
            }
        );
    }

    #[test]
    fn test_each_unsupported_field_is_named() {
        let cases: Vec<(TlsConfig, &str)> = vec![
            (
                TlsConfig {
                    cipher_suites: vec![0x1301],
                    ..TlsConfig::default()
                },
                "cipher_suites",
            ),
            (
                TlsConfig {
                    curve_preferences: vec![29],
                    ..TlsConfig::default()
                },
                "curve_preferences",
            ),
            (
                TlsConfig {
                    session_tickets_disabled: true,
                    ..TlsConfig::default()
                },
                "session_tickets_disabled",
            ),
            (
                TlsConfig {
                    max_fragment_size: Some(1024),
                    ..TlsConfig::default()
                },
                "max_fragment_size",
            ),
            (
                TlsConfig {
                    key_log: Some(Arc::new(NoKeyLog)),
                    ..TlsConfig::default()
                },
                "key_log",
            ),
            (
                TlsConfig {
                    server_cert_verifier: Some(Arc::new(NoVerify::new())),
                    ..TlsConfig::default()
                },
                "server_cert_verifier",
            ),
        ];
        for (config, field) in cases {
            assert_eq!(
                config.supported_subset().unwrap_err(),
                TlsConfigError::IncompatibleConfig { field }
            );
        }
    }

    #[test]
    fn test_supported_fields_are_copied() {
        let roots = Arc::new(RootCertStore::empty());
        let config = TlsConfig {
            server_name: "example.com".into(),
            next_protos: vec!["h2".into(), "http/1.1".into()],
            min_version: VERSION_TLS12,
            max_version: VERSION_TLS13,
            root_cas: Some(roots.clone()),
            insecure_skip_verify: true,
            dynamic_record_sizing_disabled: true,
            ..TlsConfig::default()
        };
        let subset = config.supported_subset().unwrap();
        assert_eq!(subset.server_name, "example.com");
        assert_eq!(subset.next_protos, vec!["h2", "http/1.1"]);
        assert_eq!(subset.min_version, VERSION_TLS12);
        assert_eq!(subset.max_version, VERSION_TLS13);
        assert!(Arc::ptr_eq(subset.root_cas.as_ref().unwrap(), &roots));
        assert!(subset.insecure_skip_verify);
        assert!(subset.dynamic_record_sizing_disabled);

        let client = new_rustls_client_config(&config).unwrap();
        assert_eq!(client.alpn_protocols, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
    }

    #[test]
    fn test_version_bounds() {
        let tls13 = TlsConfig {
            min_version: VERSION_TLS13,
            max_version: VERSION_TLS13,
            ..TlsConfig::default()
        };
        let versions = tls13.protocol_versions();
        assert_eq!(versions.len(), 1);
        assert_eq!(u16::from(versions[0].version), VERSION_TLS13);

        assert_eq!(TlsConfig::default().protocol_versions().len(), 2);

        let tls10 = TlsConfig {
            min_version: VERSION_TLS10,
            max_version: VERSION_TLS10,
            ..TlsConfig::default()
        };
        assert!(matches!(
            new_rustls_client_config(&tls10),
            Err(TlsConfigError::NoSupportedProtocolVersion { .. })
        ));
    }
}
