pub mod frame_sink;

use tokio::select;
use tracing::{info, info_span, warn, Instrument};

use crate::consumer::frame_sink::FrameSink;
use crate::stream::dispatch::FrameReceiver;
use crate::util::shutdown::ShutdownListener;

/// Drains the dispatch channel into a [FrameSink] until the channel is closed or shutdown is
///  triggered, returning the number of frames handed to the sink. A failing sink does not stop
///  the consumer.
pub async fn run_consumer(frames: FrameReceiver, sink: impl FrameSink, shutdown: ShutdownListener) -> u64 {
    consume(frames, sink, shutdown)
        .instrument(info_span!("consumer"))
        .await
}

async fn consume(mut frames: FrameReceiver, mut sink: impl FrameSink, mut shutdown: ShutdownListener) -> u64 {
    let mut num_frames = 0;
    loop {
        select! {
            frame = frames.recv() => {
                match frame {
                    Some(frame) => {
                        num_frames += 1;
                        if let Err(e) = sink.on_frame(&frame).await {
                            warn!(error = ?e, "error handling frame - skipping");
                        }
                    }
                    None => {
                        info!("frame channel closed");
                        break;
                    }
                }
            }
            _ = shutdown.wait() => {
                info!("consumer stopped");
                frames.close();
                break;
            }
        }
    }
    num_frames
}
