use tokio::sync::mpsc;

use crate::stream::frame::Frame;

/// Hands completed frames from the ingestion loop to a consumer through a single slot: at most
///  one frame is waiting for the consumer at any time, and the producer blocks while it is
///  occupied.
pub fn dispatch_channel() -> (FrameSender, FrameReceiver) {
    let (sender, receiver) = mpsc::channel(1);
    (FrameSender { sender }, FrameReceiver { receiver })
}

pub struct FrameSender {
    sender: mpsc::Sender<Frame>,
}
impl FrameSender {
    /// Waits for the slot to become free. Returns an error containing the frame if the consumer
    ///  is gone.
    pub async fn send(&self, frame: Frame) -> Result<(), Frame> {
        self.sender.send(frame).await
            .map_err(|e| e.0)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// The consumer's end. [FrameReceiver::recv] returns `None` once the producer has finished,
///  i.e. dropping the [FrameSender] is the terminal close signal.
pub struct FrameReceiver {
    receiver: mpsc::Receiver<Frame>,
}
impl FrameReceiver {
    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }

    pub fn close(&mut self) {
        self.receiver.close()
    }
}
