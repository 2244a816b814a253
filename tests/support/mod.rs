//! Shared test doubles
//!
//! [`LoopbackNetwork`] sends every TCP dial to one local listener, resolves
//! every domain to a fixed address list and keeps track of the connections
//! it hands out.

#![allow(dead_code)]

use async_trait::async_trait;
use netprobe::netx::{BoxConn, NetConn, TcpConn, TokioNetwork, UnderlyingNetwork};
use netprobe::{Context, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::RootCertStore;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;

/// What the provider observed
#[derive(Default)]
pub struct Observed {
    pub dials: Mutex<Vec<SocketAddr>>,
    pub live: AtomicUsize,
    pub deadlines: Mutex<Vec<Option<Instant>>>,
}

impl Observed {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn last_deadline(&self) -> Option<Option<Instant>> {
        self.deadlines.lock().unwrap().last().copied()
    }
}

pub struct LoopbackNetwork {
    pub target: SocketAddr,
    pub addrs: Vec<IpAddr>,
    pub dial_delay: Duration,
    pub resolve_delay: Duration,
    pub roots: Arc<RootCertStore>,
    pub observed: Arc<Observed>,
}

impl LoopbackNetwork {
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            addrs: vec!["127.0.0.1".parse().unwrap()],
            dial_delay: Duration::ZERO,
            resolve_delay: Duration::ZERO,
            roots: Arc::new(RootCertStore::empty()),
            observed: Arc::new(Observed::default()),
        }
    }

    pub fn with_roots(mut self, roots: RootCertStore) -> Self {
        self.roots = Arc::new(roots);
        self
    }

    pub fn with_dial_delay(mut self, delay: Duration) -> Self {
        self.dial_delay = delay;
        self
    }

    pub fn with_resolve_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = delay;
        self
    }
}

#[async_trait]
impl UnderlyingNetwork for LoopbackNetwork {
    async fn dial_context(
        &self,
        _ctx: &Context,
        _network: &str,
        addr: SocketAddr,
    ) -> Result<BoxConn> {
        self.observed.dials.lock().unwrap().push(addr);
        tokio::time::sleep(self.dial_delay).await;
        let stream = TcpStream::connect(self.target).await?;
        self.observed.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedConn {
            inner: TcpConn::from_tcp(stream)?,
            remote: addr,
            observed: self.observed.clone(),
        }))
    }

    async fn get_addr_info(&self, _ctx: &Context, _domain: &str) -> Result<Vec<IpAddr>> {
        tokio::time::sleep(self.resolve_delay).await;
        Ok(self.addrs.clone())
    }

    fn get_addr_info_resolver_network(&self) -> &str {
        "loopback"
    }

    fn listen_udp(&self, addr: SocketAddr) -> Result<std::net::UdpSocket> {
        TokioNetwork.listen_udp(addr)
    }

    fn default_root_store(&self) -> Arc<RootCertStore> {
        self.roots.clone()
    }
}

/// Connection that reports the dialed address and counts itself live
/// until dropped.
pub struct TrackedConn {
    inner: TcpConn,
    remote: SocketAddr,
    observed: Arc<Observed>,
}

impl Drop for TrackedConn {
    fn drop(&mut self) {
        self.observed.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl NetConn for TrackedConn {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn remote_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.remote)
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.observed.deadlines.lock().unwrap().push(deadline);
        self.inner.set_deadline(deadline)
    }
}

impl AsyncRead for TrackedConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Self-signed certificate for `localhost`
pub struct TestCert {
    pub cert: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
}

impl TestCert {
    pub fn generate() -> Self {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        Self {
            cert: certified.cert.der().clone(),
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
                certified.key_pair.serialize_der(),
            )),
        }
    }

    pub fn root_store(&self) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        roots.add(self.cert.clone()).unwrap();
        roots
    }
}

fn tls_acceptor(cert: &TestCert, alpn: &[&str]) -> TlsAcceptor {
    let mut config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![cert.cert.clone()], cert.key.clone_key())
    .unwrap();
    config.alpn_protocols = alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
    TlsAcceptor::from(Arc::new(config))
}

/// Accepts TLS connections forever, offering `alpn`. Each session reads
/// and discards until the peer goes away.
pub async fn spawn_tls_server(cert: &TestCert, alpn: &[&str]) -> SocketAddr {
    let acceptor = tls_acceptor(cert, alpn);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(mut tls) = acceptor.accept(stream).await {
                    let mut sink = tokio::io::sink();
                    let _ = tokio::io::copy(&mut tls, &mut sink).await;
                }
            });
        }
    });
    addr
}

/// Completes each TLS handshake, then closes the TCP connection without a
/// close_notify alert.
pub async fn spawn_tls_hangup_server(cert: &TestCert) -> SocketAddr {
    let acceptor = tls_acceptor(cert, &[]);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let _ = acceptor.accept(stream).await;
        }
    });
    addr
}

/// Waits for the first bytes of each connection and closes it without
/// reading them, which makes the kernel answer with a reset.
pub async fn spawn_reset_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let _ = stream.readable().await;
        }
    });
    addr
}

/// Accepts TCP connections and never writes a byte.
pub async fn spawn_silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}
