use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use anyhow::bail;

use crate::stream::frame::{EOI, SOI};

/// This is the largest payload a single UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65536;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// The local address that the receiving UDP socket is bound to
    pub listen_addr: SocketAddr,
    /// The camera's streaming endpoint. Keepalive datagrams are sent here.
    pub stream_addr: SocketAddr,

    /// If no datagram arrives for this long, a keepalive is sent to the camera. The deadline
    ///  restarts after every receive and every keepalive.
    pub idle_deadline: Duration,

    pub receive_buffer_size: usize,

    /// Upper bound for the reassembly buffer. If it grows beyond this without an EOI marker,
    ///  the stream is considered out of sync and the buffer is discarded.
    pub max_frame_size: usize,

    /// The ESP32 firmware streams to whatever address its trigger datagram came from. If this
    ///  flag is set, keepalives are sent from the listen socket so that the stream arrives there;
    ///  otherwise they go out through the dedicated socket connected to `stream_addr`.
    pub keepalive_from_listen_addr: bool,
}

impl StreamConfig {
    pub fn new(listen_addr: SocketAddr, stream_addr: SocketAddr) -> StreamConfig {
        StreamConfig {
            listen_addr,
            stream_addr,
            idle_deadline: Duration::from_secs(1),
            receive_buffer_size: MAX_DATAGRAM_SIZE,
            max_frame_size: 1024*1024,
            keepalive_from_listen_addr: false,
        }
    }

    /// the addresses used by the ESP32 camera firmware in access point mode
    pub fn default_esp32() -> StreamConfig {
        Self::new(
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 4, 2), 31416).into(),
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 4, 1), 9000).into(),
        )
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.idle_deadline.is_zero() {
            bail!("idle deadline must not be zero");
        }
        if self.receive_buffer_size < SOI.len().max(EOI.len()) {
            bail!("receive buffer of {} bytes can not hold a frame marker", self.receive_buffer_size);
        }
        if self.receive_buffer_size > MAX_DATAGRAM_SIZE {
            bail!("receive buffer of {} bytes exceeds the maximum datagram size of {}", self.receive_buffer_size, MAX_DATAGRAM_SIZE);
        }
        if self.max_frame_size < self.receive_buffer_size {
            bail!("max frame size ({}) must be at least the receive buffer size ({})", self.max_frame_size, self.receive_buffer_size);
        }
        Ok(())
    }
}
