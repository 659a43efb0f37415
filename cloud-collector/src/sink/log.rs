use async_trait::async_trait;
use tracing::{debug, info};

use super::TelemetrySink;
use crate::Result;
use crate::delivery::DeliveryMessage;

/// Sink that only logs what it receives. Used for dry runs without an agent.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
    async fn start(&self) -> Result<()> {
        info!("Check mode: messages are logged instead of sent to the agent");
        Ok(())
    }

    async fn send(&self, message: &DeliveryMessage) -> Result<()> {
        debug!(
            data_id = message.data_id,
            kind = %message.kind,
            source = %message.source,
            payload = %String::from_utf8_lossy(&message.payload),
            "Check mode message"
        );
        Ok(())
    }
}
