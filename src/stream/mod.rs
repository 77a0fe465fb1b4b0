//! Reconstructs JPEG frames from an unframed motion-JPEG stream that an embedded camera sends
//!  over UDP.
//!
//! The wire carries raw MJPEG bytes - no header, no length field, no sequence number. Frame
//!  boundaries are recovered from the embedded markers only:
//!
//! ```ascii
//! SOI (start of image): FF D8 FF
//! EOI (end of image):   FF D9
//! ```
//!
//! A datagram can contain any number of frame boundaries, and a frame can span several
//!  datagrams. UDP reordering and loss are not compensated for: frames are delivered in the
//!  order their bytes arrived, and a frame that lost its EOI is cut off at the next SOI.
//!
//! ## Data flow
//!
//! ```ascii
//! UDP socket -> DatagramSource -> FrameReassembler::feed() -> dispatch channel (1 slot) -> consumer
//!                     |
//!                     +-- idle deadline expired -> zero-length keepalive to the camera
//! ```
//!
//! The [datagram_source::DatagramSource] drives the [frame_reassembler::FrameReassembler]
//!  synchronously from its receive loop, so the reassembly state is never shared. Completed
//!  frames go through a single-slot channel: if the consumer has not taken the previous frame
//!  yet, ingestion waits.

pub mod datagram_source;
pub mod dispatch;
pub mod frame;
pub mod frame_reassembler;
pub mod stream_config;

use std::net::SocketAddr;
use tokio::task::JoinHandle;

use crate::stream::datagram_source::{DatagramSource, SourceStats};
use crate::stream::dispatch::{dispatch_channel, FrameReceiver};
use crate::stream::frame_reassembler::FrameReassembler;
use crate::stream::stream_config::StreamConfig;
use crate::util::shutdown::Shutdown;

pub struct RunningStream {
    pub listen_addr: SocketAddr,
    pub frames: FrameReceiver,
    pub ingestion: JoinHandle<SourceStats>,
}

/// Binds the sockets and spawns the ingestion loop. Socket setup errors are returned right away;
///  after that, ingestion runs until `shutdown` is triggered or the returned [FrameReceiver] is
///  dropped.
pub async fn run_stream(config: &StreamConfig, shutdown: &Shutdown) -> anyhow::Result<RunningStream> {
    let source = DatagramSource::bind(config).await?;
    let listen_addr = source.local_addr()?;

    let (sender, frames) = dispatch_channel();
    let reassembler = FrameReassembler::new(config.max_frame_size);

    let ingestion = tokio::spawn(source.run(reassembler, sender, shutdown.listener()));

    Ok(RunningStream {
        listen_addr,
        frames,
        ingestion,
    })
}
