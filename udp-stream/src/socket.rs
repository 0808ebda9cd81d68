//! UDP implementation of [`Channel`].
//!
//! [`UdpChannel`] is a thin wrapper around `tokio::net::UdpSocket` bound to a
//! local address and pinned to one remote peer.  All protocol logic lives
//! elsewhere; this module owns only byte I/O.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::channel::{Channel, ChannelError};

/// Receive buffer size: the 16-bit UDP length field caps any datagram here.
pub const MAX_DATAGRAM: usize = 65_535;

/// Largest payload a single UDP datagram can carry over IPv4
/// (65 535 minus the 20-byte IP and 8-byte UDP headers).
pub const MAX_PAYLOAD: usize = 65_507;

/// A datagram socket that talks to exactly one peer.
///
/// The socket is owned exclusively; no other component reads from or writes
/// to it.
pub struct UdpChannel {
    inner: UdpSocket,
    local: SocketAddr,
    remote: SocketAddr,
    /// Scratch space reused by every `receive`.
    buf: Box<[u8]>,
}

impl std::fmt::Debug for UdpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpChannel")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

impl UdpChannel {
    /// Bind to `local` and address every datagram to `remote`.
    ///
    /// Passing port `0` lets the OS choose an ephemeral port; see
    /// [`local_addr`](Self::local_addr).
    pub async fn bind(local: SocketAddr, remote: SocketAddr) -> Result<Self, ChannelError> {
        let inner = UdpSocket::bind(local).await?;
        Self::from_tokio(inner, remote)
    }

    /// Adopt an already-bound std socket.
    ///
    /// Useful when both ends are bound first so each can learn the other's
    /// ephemeral port.  Must be called from within a tokio runtime.
    pub fn from_std(socket: std::net::UdpSocket, remote: SocketAddr) -> Result<Self, ChannelError> {
        socket.set_nonblocking(true)?;
        Self::from_tokio(UdpSocket::from_std(socket)?, remote)
    }

    fn from_tokio(inner: UdpSocket, remote: SocketAddr) -> Result<Self, ChannelError> {
        let local = inner.local_addr()?;
        log::debug!("[udp] bound {local} → {remote}");
        Ok(Self {
            inner,
            local,
            remote,
            buf: vec![0u8; MAX_DATAGRAM].into_boxed_slice(),
        })
    }

    /// Address this socket is bound to (with the OS-assigned port filled in).
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

#[async_trait]
impl Channel for UdpChannel {
    async fn send(&mut self, bytes: &[u8]) -> Result<usize, ChannelError> {
        Ok(self.inner.send_to(bytes, self.remote).await?)
    }

    /// Datagrams from any address other than the remote peer are discarded
    /// and do not restart the timeout.
    async fn receive(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>, ChannelError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let (n, from) = match (timeout, deadline) {
                (Some(t), _) if t.is_zero() => match self.inner.try_recv_from(&mut self.buf) {
                    Ok(received) => received,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Vec::new()),
                    Err(e) => return Err(e.into()),
                },
                (_, Some(deadline)) => {
                    match tokio::time::timeout_at(deadline, self.inner.recv_from(&mut self.buf)).await {
                        Ok(received) => received?,
                        Err(_elapsed) => return Ok(Vec::new()),
                    }
                }
                (_, None) => self.inner.recv_from(&mut self.buf).await?,
            };

            if from != self.remote {
                log::debug!("[udp] ignoring {n} byte(s) from stranger {from}");
                continue;
            }
            return Ok(self.buf[..n].to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> std::net::UdpSocket {
        std::net::UdpSocket::bind("127.0.0.1:0").expect("bind loopback")
    }

    #[tokio::test]
    async fn exchanges_datagrams_with_peer() {
        let (a, b) = (loopback(), loopback());
        let (a_addr, b_addr) = (a.local_addr().unwrap(), b.local_addr().unwrap());
        let mut a = UdpChannel::from_std(a, b_addr).unwrap();
        let mut b = UdpChannel::from_std(b, a_addr).unwrap();

        assert_eq!(a.local_addr(), a_addr);
        assert_eq!(a.remote_addr(), b_addr);

        a.send(b"over the wire").await.unwrap();
        let got = b.receive(Some(Duration::from_secs(2))).await.unwrap();
        assert_eq!(got, b"over the wire");
    }

    #[tokio::test]
    async fn timeout_yields_empty_datagram() {
        let peer = loopback();
        let mut a = UdpChannel::bind("127.0.0.1:0".parse().unwrap(), peer.local_addr().unwrap())
            .await
            .unwrap();

        assert!(a.receive(Some(Duration::ZERO)).await.unwrap().is_empty());
        assert!(a
            .receive(Some(Duration::from_millis(20)))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn strangers_are_ignored() {
        let (a, peer, stranger) = (loopback(), loopback(), loopback());
        let a_addr = a.local_addr().unwrap();
        let mut a = UdpChannel::from_std(a, peer.local_addr().unwrap()).unwrap();

        stranger.send_to(b"noise", a_addr).unwrap();
        peer.send_to(b"signal", a_addr).unwrap();

        let got = a.receive(Some(Duration::from_secs(2))).await.unwrap();
        assert_eq!(got, b"signal");
    }

    #[tokio::test]
    async fn consecutive_datagrams_do_not_bleed_into_each_other() {
        let (a, b) = (loopback(), loopback());
        let (a_addr, b_addr) = (a.local_addr().unwrap(), b.local_addr().unwrap());
        let mut a = UdpChannel::from_std(a, b_addr).unwrap();
        let mut b = UdpChannel::from_std(b, a_addr).unwrap();

        a.send(b"a longer datagram").await.unwrap();
        a.send(b"short").await.unwrap();

        let wait = Some(Duration::from_secs(2));
        assert_eq!(b.receive(wait).await.unwrap(), b"a longer datagram");
        assert_eq!(b.receive(wait).await.unwrap(), b"short");
    }

    #[tokio::test]
    async fn largest_payload_crosses_loopback() {
        let (a, b) = (loopback(), loopback());
        let (a_addr, b_addr) = (a.local_addr().unwrap(), b.local_addr().unwrap());
        let mut a = UdpChannel::from_std(a, b_addr).unwrap();
        let mut b = UdpChannel::from_std(b, a_addr).unwrap();

        let payload = vec![0xa5u8; MAX_PAYLOAD];
        assert_eq!(a.send(&payload).await.unwrap(), MAX_PAYLOAD);
        let got = b.receive(Some(Duration::from_secs(2))).await.unwrap();
        assert_eq!(got.len(), MAX_PAYLOAD);
    }
}
