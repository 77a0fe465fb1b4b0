use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use anyhow::{anyhow, bail};
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Plays the camera's part on localhost: it receives keepalive datagrams on its streaming
///  endpoint and sends stream data to a receiver.
pub struct FakeCamera {
    socket: UdpSocket,
}
impl FakeCamera {
    pub async fn bind_localhost() -> anyhow::Result<FakeCamera> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).await?;
        Ok(FakeCamera { socket })
    }

    pub fn stream_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Waits for the next datagram and checks that it is a (zero-length) keepalive, returning
    ///  its sender address.
    pub async fn expect_keepalive(&self, within: Duration) -> anyhow::Result<SocketAddr> {
        let mut buf = [0u8; 16];
        let (len, from) = timeout(within, self.socket.recv_from(&mut buf)).await
            .map_err(|_| anyhow!("no keepalive within {:?}", within))??;
        if len != 0 {
            bail!("expected a zero-length keepalive, got {} bytes", len);
        }
        Ok(from)
    }

    /// returns `true` if no datagram arrives within the given time
    pub async fn is_silent_for(&self, duration: Duration) -> bool {
        let mut buf = [0u8; 16];
        timeout(duration, self.socket.recv_from(&mut buf)).await
            .is_err()
    }

    pub async fn send_datagrams(&self, to: SocketAddr, datagrams: &[Vec<u8>]) -> anyhow::Result<()> {
        for datagram in datagrams {
            self.socket.send_to(datagram, to).await?;
        }
        Ok(())
    }
}
