//! Output sinks at the IPC boundary.

use std::io::Write;

use tokio::sync::mpsc;
use tracing::debug;

use termhub_core::OutputSink;

/// Sink that forwards batches into an in-process channel, standing in for
/// the IPC hop toward the renderer.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelSink {
    /// Create a sink and the receiving end the renderer side drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutputSink for ChannelSink {
    fn emit(&self, bytes: Vec<u8>) {
        // A dropped receiver degrades to "no output delivered", not an error
        let _ = self.tx.send(bytes);
    }
}

/// Sink that writes batches straight to stdout.
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&self, bytes: Vec<u8>) {
        let mut stdout = std::io::stdout().lock();
        if stdout
            .write_all(&bytes)
            .and_then(|()| stdout.flush())
            .is_err()
        {
            debug!("stdout write failed; dropping {} bytes", bytes.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_forwards_batches() {
        let (sink, mut rx) = ChannelSink::new();

        sink.emit(b"first".to_vec());
        sink.emit(b"second".to_vec());

        assert_eq!(rx.recv().await.unwrap(), b"first");
        assert_eq!(rx.recv().await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);

        // Emitting into the void is fine
        sink.emit(b"nobody listening".to_vec());
    }
}
