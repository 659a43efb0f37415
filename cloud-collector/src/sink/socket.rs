//! Unix socket sink for the local telemetry agent.
//!
//! Each message is written as one frame:
//!
//! ```text
//! [u32 BE data_id][u32 BE payload length][payload]
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::TelemetrySink;
use crate::delivery::DeliveryMessage;
use crate::{Error, Result};

const FRAME_HEADER_LEN: usize = 8;

/// Build the wire frame for `message`.
pub fn encode_frame(message: &DeliveryMessage) -> Result<Bytes> {
    let len = u32::try_from(message.payload.len())
        .map_err(|_| Error::send(format!("payload too large: {} bytes", message.payload.len())))?;

    let data_id = u32::try_from(message.data_id)
        .map_err(|_| Error::send(format!("invalid data id {}", message.data_id)))?;

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + message.payload.len());
    frame.put_u32(data_id);
    frame.put_u32(len);
    frame.put_slice(&message.payload);
    Ok(frame.freeze())
}

/// Sink writing frames to the agent's IPC socket.
pub struct UnixSocketSink {
    path: PathBuf,
    stream: Mutex<Option<UnixStream>>,
}

impl UnixSocketSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stream: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn connect(&self) -> std::io::Result<UnixStream> {
        UnixStream::connect(&self.path).await
    }
}

#[async_trait]
impl TelemetrySink for UnixSocketSink {
    async fn start(&self) -> Result<()> {
        let stream = self.connect().await.map_err(|e| {
            Error::SinkStartup(format!(
                "cannot connect to agent socket {}: {}",
                self.path.display(),
                e
            ))
        })?;
        *self.stream.lock().await = Some(stream);
        info!(path = %self.path.display(), "Connected to agent socket");
        Ok(())
    }

    async fn send(&self, message: &DeliveryMessage) -> Result<()> {
        let frame = encode_frame(message)?;
        let mut guard = self.stream.lock().await;

        if let Some(stream) = guard.as_mut() {
            match stream.write_all(&frame).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Agent socket write failed, reconnecting");
                    *guard = None;
                }
            }
        }

        let mut stream = self.connect().await.map_err(|e| {
            Error::send(format!(
                "reconnect to {} failed: {}",
                self.path.display(),
                e
            ))
        })?;
        stream
            .write_all(&frame)
            .await
            .map_err(|e| Error::send(format!("write after reconnect failed: {}", e)))?;
        debug!(path = %self.path.display(), "Reconnected to agent socket");
        *guard = Some(stream);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::PayloadKind;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    async fn read_frame(stream: &mut UnixStream) -> (u32, Vec<u8>) {
        let data_id = stream.read_u32().await.unwrap();
        let len = stream.read_u32().await.unwrap();
        let mut payload = vec![0u8; len as usize];
        stream.read_exact(&mut payload).await.unwrap();
        (data_id, payload)
    }

    #[test]
    fn test_encode_frame() {
        let message = DeliveryMessage::new(1001, r#"{"data":[]}"#, PayloadKind::Metrics, "1/host");
        let frame = encode_frame(&message).unwrap();

        assert_eq!(&frame[..4], &1001u32.to_be_bytes());
        assert_eq!(&frame[4..8], &11u32.to_be_bytes());
        assert_eq!(&frame[8..], br#"{"data":[]}"#);
    }

    #[test]
    fn test_encode_frame_rejects_negative_data_id() {
        let message = DeliveryMessage::new(-5, r#"{"data":[]}"#, PayloadKind::Events, "1/vm");
        assert!(matches!(encode_frame(&message), Err(Error::Send(_))));
    }

    #[tokio::test]
    async fn test_start_fails_without_socket() {
        let dir = tempfile::tempdir().unwrap();
        let sink = UnixSocketSink::new(dir.path().join("missing.sock"));

        let err = sink.start().await.unwrap_err();
        assert!(matches!(err, Error::SinkStartup(_)));
    }

    #[tokio::test]
    async fn test_sends_frames_and_reconnects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let sink = UnixSocketSink::new(&path);
        sink.start().await.unwrap();
        let (mut first, _) = listener.accept().await.unwrap();

        let message = DeliveryMessage::new(7, "hello", PayloadKind::Events, "1/host");
        sink.send(&message).await.unwrap();
        assert_eq!(read_frame(&mut first).await, (7, b"hello".to_vec()));

        // Agent restarts: the old connection goes away.
        drop(first);
        let mut reconnected = None;
        for _ in 0..5 {
            if sink.send(&message).await.is_ok()
                && let Ok(Ok((stream, _))) = tokio::time::timeout(
                    std::time::Duration::from_millis(200),
                    listener.accept(),
                )
                .await
            {
                reconnected = Some(stream);
                break;
            }
        }

        let mut second = reconnected.expect("sink never reconnected");
        assert_eq!(read_frame(&mut second).await, (7, b"hello".to_vec()));
    }
}
