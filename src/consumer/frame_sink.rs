use std::path::PathBuf;
use async_trait::async_trait;
use anyhow::Context;
#[cfg(test)] use mockall::automock;
use tracing::info;

use crate::stream::frame::Frame;

/// The consumer's handling of a single frame, e.g. decoding and displaying it or storing it.
///  An error affects only this frame.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FrameSink: Send {
    async fn on_frame(&mut self, frame: &Frame) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct LoggingSink {
    num_frames: u64,
}
#[async_trait]
impl FrameSink for LoggingSink {
    async fn on_frame(&mut self, frame: &Frame) -> anyhow::Result<()> {
        self.num_frames += 1;
        info!(n = self.num_frames, len = frame.len(), terminated = frame.is_terminated(), "received frame");
        Ok(())
    }
}

/// Writes each frame to a file of its own: `frame-000001.jpg`, `frame-000002.jpg`, ...
pub struct DirectorySink {
    dir: PathBuf,
    num_frames: u64,
}
impl DirectorySink {
    pub async fn new(dir: impl Into<PathBuf>) -> anyhow::Result<DirectorySink> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await
            .with_context(|| format!("creating output directory {:?}", dir))?;
        Ok(DirectorySink {
            dir,
            num_frames: 0,
        })
    }

    fn file_name(n: u64) -> String {
        format!("frame-{:06}.jpg", n)
    }
}
#[async_trait]
impl FrameSink for DirectorySink {
    async fn on_frame(&mut self, frame: &Frame) -> anyhow::Result<()> {
        self.num_frames += 1;
        let path = self.dir.join(Self::file_name(self.num_frames));
        tokio::fs::write(&path, frame.as_bytes()).await
            .with_context(|| format!("writing frame to {:?}", path))?;
        Ok(())
    }
}
