use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::debug;

/// A shared cancellation signal. Every activity that needs to stop gets its own
///  [ShutdownListener], so a single trigger stops ingestion and consumption alike.
#[derive(Clone)]
pub struct Shutdown {
    sender: broadcast::Sender<()>,
}
impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
impl Shutdown {
    pub fn new() -> Shutdown {
        let (sender, _) = broadcast::channel(1);
        Shutdown { sender }
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
            is_shut_down: false,
        }
    }

    pub fn trigger(&self) {
        // an error only means that there are no listeners left, which is fine
        if self.sender.send(()).is_err() {
            debug!("shutdown triggered without active listeners");
        }
    }
}

pub struct ShutdownListener {
    receiver: broadcast::Receiver<()>,
    is_shut_down: bool,
}
impl ShutdownListener {
    /// Non-blocking check for use at iteration boundaries. Once this returned `true`, it keeps
    ///  returning `true`.
    pub fn is_shut_down(&mut self) -> bool {
        if self.is_shut_down {
            return true;
        }
        match self.receiver.try_recv() {
            Ok(()) | Err(TryRecvError::Lagged(_)) | Err(TryRecvError::Closed) => {
                self.is_shut_down = true;
            }
            Err(TryRecvError::Empty) => {}
        }
        self.is_shut_down
    }

    /// Waits until shutdown is triggered (or every [Shutdown] handle is dropped)
    pub async fn wait(&mut self) {
        if self.is_shut_down {
            return;
        }
        let _ = self.receiver.recv().await;
        self.is_shut_down = true;
    }
}
