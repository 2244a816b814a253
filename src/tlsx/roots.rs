//! Bundled trust store.

use once_cell::sync::Lazy;
use rustls::RootCertStore;
use std::sync::Arc;

static DEFAULT_ROOTS: Lazy<Arc<RootCertStore>> = Lazy::new(|| Arc::new(new_default_root_store()));

/// A fresh store holding the bundled Mozilla roots. Callers may modify it.
pub fn new_default_root_store() -> RootCertStore {
    RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    }
}

/// Shared handle to the bundled Mozilla roots, built once per process.
pub fn default_root_store() -> Arc<RootCertStore> {
    DEFAULT_ROOTS.clone()
}
