use std::fmt::{Debug, Formatter};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, trace, Instrument, Span};

use crate::stream::dispatch::FrameSender;
use crate::stream::frame_reassembler::{FrameReassembler, ReassemblyStats};
use crate::stream::stream_config::StreamConfig;
use crate::util::shutdown::ShutdownListener;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub reassembly: ReassemblyStats,
    pub keepalives_sent: u64,
    pub keepalive_errors: u64,
    pub read_errors: u64,
}

/// This trait decouples the receive loop from the sockets it talks to the camera through.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// receives a single datagram into `buf`, returning the number of bytes read
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// sends a zero-length datagram to the camera's streaming endpoint
    async fn send_keepalive(&self) -> io::Result<()>;
}

/// The camera-facing sockets: one bound to the local listen address that stream data arrives
///  on, and one connected to the camera's streaming endpoint for keepalives.
pub struct UdpDatagramTransport {
    receive_socket: UdpSocket,
    stream_socket: UdpSocket,
    stream_addr: SocketAddr,
    keepalive_from_listen_addr: bool,
}
impl UdpDatagramTransport {
    /// Binds and connects both sockets. Failure to do so is the only fatal error of stream
    ///  ingestion.
    pub async fn bind(config: &StreamConfig) -> anyhow::Result<UdpDatagramTransport> {
        let receive_socket = UdpSocket::bind(config.listen_addr).await
            .with_context(|| format!("binding listen socket to {}", config.listen_addr))?;
        info!("bound receive socket to {:?}", receive_socket.local_addr()?);

        let unspecified = if config.stream_addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let stream_socket = UdpSocket::bind(unspecified).await
            .context("binding keepalive socket")?;
        stream_socket.connect(config.stream_addr).await
            .with_context(|| format!("connecting keepalive socket to {}", config.stream_addr))?;
        debug!("connected keepalive socket to {:?}", config.stream_addr);

        Ok(UdpDatagramTransport {
            receive_socket,
            stream_socket,
            stream_addr: config.stream_addr,
            keepalive_from_listen_addr: config.keepalive_from_listen_addr,
        })
    }
}

#[async_trait]
impl DatagramTransport for UdpDatagramTransport {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.receive_socket.local_addr()
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let (num_read, from) = self.receive_socket.recv_from(buf).await?;
        trace!(num_read, ?from, "received datagram");
        Ok(num_read)
    }

    async fn send_keepalive(&self) -> io::Result<()> {
        if self.keepalive_from_listen_addr {
            self.receive_socket.send_to(&[], self.stream_addr).await?;
        }
        else {
            self.stream_socket.send(&[]).await?;
        }
        Ok(())
    }
}

/// The datagram source drives stream ingestion: its receive loop feeds every datagram into a
///  [FrameReassembler] and passes completed frames on to the consumer. If nothing arrives
///  within the idle deadline, it sends a zero-length datagram to the camera to (re-)trigger
///  the stream.
pub struct DatagramSource {
    transport: Arc<dyn DatagramTransport>,
    stream_addr: SocketAddr,
    idle_deadline: Duration,
    receive_buffer_size: usize,
    stats: SourceStats,
    span: Span,
}

impl Debug for DatagramSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DatagramSource{{listen:{:?}, stream:{:?}}}", self.transport.local_addr(), self.stream_addr)
    }
}

impl DatagramSource {
    /// Sets up the UDP sockets for the given configuration. This is where setup errors surface,
    ///  before any receiving starts.
    pub async fn bind(config: &StreamConfig) -> anyhow::Result<DatagramSource> {
        config.validate()?;
        let transport = UdpDatagramTransport::bind(config).await?;
        Self::new(Arc::new(transport), config)
    }

    pub fn new(transport: Arc<dyn DatagramTransport>, config: &StreamConfig) -> anyhow::Result<DatagramSource> {
        config.validate()?;
        let listen_addr = transport.local_addr()?;

        Ok(DatagramSource {
            transport,
            stream_addr: config.stream_addr,
            idle_deadline: config.idle_deadline,
            receive_buffer_size: config.receive_buffer_size,
            stats: Default::default(),
            span: info_span!("datagram_source", listen = ?listen_addr, stream = ?config.stream_addr),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// Runs the receive loop until shutdown is signalled or the consumer goes away. Shutdown is
    ///  checked once per iteration, so it takes effect after the current receive (bounded by
    ///  the idle deadline) or frame handoff completes.
    ///
    /// Both sockets are closed when this returns.
    pub async fn run(self, reassembler: FrameReassembler, frames: FrameSender, shutdown: ShutdownListener) -> SourceStats {
        let span = self.span.clone();
        self.recv_loop(reassembler, frames, shutdown)
            .instrument(span)
            .await
    }

    async fn recv_loop(mut self, mut reassembler: FrameReassembler, frames: FrameSender, mut shutdown: ShutdownListener) -> SourceStats {
        info!("receiving stream");

        let mut buf = vec![0u8; self.receive_buffer_size];
        loop {
            if shutdown.is_shut_down() {
                info!("stream stopped");
                break;
            }

            match timeout(self.idle_deadline, self.transport.recv(&mut buf)).await {
                Ok(Ok(num_read)) => {
                    // NB: only the bytes actually read - the rest of the buffer is stale
                    for frame in reassembler.feed(&buf[..num_read]) {
                        if frames.send(frame).await.is_err() {
                            info!("frame consumer is gone - stopping");
                            return self.final_stats(&reassembler);
                        }
                    }
                }
                Ok(Err(e)) => {
                    error!(error = ?e, "error receiving datagram");
                    self.stats.read_errors += 1;
                }
                Err(_) => {
                    self.send_keepalive().await;
                }
            }
        }

        self.final_stats(&reassembler)
    }

    async fn send_keepalive(&mut self) {
        debug!("no data within {:?} - sending keepalive", self.idle_deadline);

        match self.transport.send_keepalive().await {
            Ok(()) => self.stats.keepalives_sent += 1,
            Err(e) => {
                error!(error = ?e, "error sending keepalive");
                self.stats.keepalive_errors += 1;
            }
        }
    }

    fn final_stats(&mut self, reassembler: &FrameReassembler) -> SourceStats {
        self.stats.reassembly = reassembler.stats();
        info!(stats = ?self.stats, "datagram source finished");
        self.stats
    }
}
