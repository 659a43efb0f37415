//! Telemetry sinks: where delivery workers hand messages off.

mod log;
mod socket;

pub use log::LogSink;
pub use socket::{UnixSocketSink, encode_frame};

use async_trait::async_trait;

use crate::Result;
use crate::delivery::DeliveryMessage;

/// Destination of delivered messages.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Prepare the sink. A failure here stops the process.
    async fn start(&self) -> Result<()>;

    /// Forward one message. Failures are reported and never retried by the caller.
    async fn send(&self, message: &DeliveryMessage) -> Result<()>;
}
