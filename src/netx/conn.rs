//! Connections handed out by the primitives.
//!
//! [`NetConn`] is a byte stream with addresses and a settable deadline.
//! [`StreamConn`] adds deadline enforcement to any stream, so TCP, UDP and
//! test doubles all time out the same way: once the deadline passes, reads
//! and writes fail with [`io::ErrorKind::TimedOut`] until it is moved or
//! cleared.

use crate::failure::{wrap_io_error, Operation};
use crate::tlsx::TlsConnectionState;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{Instant, Sleep};

/// A connection returned by a dialer
pub trait NetConn: AsyncRead + AsyncWrite + Unpin + Send {
    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn remote_addr(&self) -> io::Result<SocketAddr>;

    /// Set or clear (`None`) the read/write deadline.
    fn set_deadline(&mut self, deadline: Option<Instant>);
}

/// A connection with a completed TLS handshake
pub trait TlsConn: NetConn {
    fn connection_state(&self) -> TlsConnectionState;
}

pub type BoxConn = Box<dyn NetConn>;
pub type BoxTlsConn = Box<dyn TlsConn>;

impl<C: NetConn + ?Sized> NetConn for Box<C> {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        (**self).local_addr()
    }

    fn remote_addr(&self) -> io::Result<SocketAddr> {
        (**self).remote_addr()
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) {
        (**self).set_deadline(deadline)
    }
}

impl<C: TlsConn + ?Sized> TlsConn for Box<C> {
    fn connection_state(&self) -> TlsConnectionState {
        (**self).connection_state()
    }
}

fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "i/o timeout")
}

/// A stream with known addresses and deadline support
pub struct StreamConn<S> {
    inner: S,
    local: SocketAddr,
    remote: SocketAddr,
    deadline: Option<Pin<Box<Sleep>>>,
}

pub type TcpConn = StreamConn<TcpStream>;

impl<S> StreamConn<S> {
    pub fn new(inner: S, local: SocketAddr, remote: SocketAddr) -> Self {
        Self {
            inner,
            local,
            remote,
            deadline: None,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.as_ref().map(|sleep| sleep.deadline())
    }

    /// Ready with an error once the deadline has passed. Registers the
    /// waker otherwise, so pending I/O is woken up at the deadline.
    fn poll_deadline(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        match self.deadline.as_mut() {
            Some(sleep) => sleep.as_mut().poll(cx).map(|_| deadline_exceeded()),
            None => Poll::Pending,
        }
    }
}

impl TcpConn {
    pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        let local = stream.local_addr()?;
        let remote = stream.peer_addr()?;
        Ok(Self::new(stream, local, remote))
    }
}

impl StreamConn<UdpConn> {
    pub fn from_udp(socket: UdpSocket) -> io::Result<Self> {
        let local = socket.local_addr()?;
        let remote = socket.peer_addr()?;
        Ok(Self::new(UdpConn(socket), local, remote))
    }
}

impl<S> NetConn for StreamConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }

    fn remote_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.remote)
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) {
        let Some(at) = deadline else {
            self.deadline = None;
            return;
        };
        if let Some(sleep) = self.deadline.as_mut() {
            sleep.as_mut().reset(at);
        } else {
            self.deadline = Some(Box::pin(tokio::time::sleep_until(at)));
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for StreamConn<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Poll::Ready(err) = this.poll_deadline(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for StreamConn<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Poll::Ready(err) = this.poll_deadline(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Poll::Ready(err) = this.poll_deadline(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Classifies the I/O errors of an established connection.
///
/// Errors come out with their original kind and an [`ErrWrapper`] payload
/// tagged `read`, `write` or `close`.
///
/// [`ErrWrapper`]: crate::ErrWrapper
pub(crate) struct ErrWrapperConn<C> {
    inner: C,
}

impl<C> ErrWrapperConn<C> {
    pub(crate) fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: NetConn> NetConn for ErrWrapperConn<C> {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn remote_addr(&self) -> io::Result<SocketAddr> {
        self.inner.remote_addr()
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.inner.set_deadline(deadline)
    }
}

impl<C: TlsConn> TlsConn for ErrWrapperConn<C> {
    fn connection_state(&self) -> TlsConnectionState {
        self.inner.connection_state()
    }
}

impl<C: AsyncRead + Unpin> AsyncRead for ErrWrapperConn<C> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner)
            .poll_read(cx, buf)
            .map_err(|err| wrap_io_error(Operation::Read, err))
    }
}

impl<C: AsyncWrite + Unpin> AsyncWrite for ErrWrapperConn<C> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner)
            .poll_write(cx, buf)
            .map_err(|err| wrap_io_error(Operation::Write, err))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner)
            .poll_flush(cx)
            .map_err(|err| wrap_io_error(Operation::Write, err))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner)
            .poll_shutdown(cx)
            .map_err(|err| wrap_io_error(Operation::Close, err))
    }
}

/// A connected UDP socket exposed as a stream of datagrams
pub struct UdpConn(UdpSocket);

impl AsyncRead for UdpConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.0.poll_recv(cx, buf)
    }
}

impl AsyncWrite for UdpConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0.poll_send(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
