//! Delivery pipeline.
//!
//! Collection cycles enqueue serialized batches into one bounded queue; a
//! fixed pool of workers drains it into the [`TelemetrySink`](crate::sink::TelemetrySink).

mod message;
mod pipeline;
mod stats;

pub use message::{DeliveryMessage, PayloadKind};
pub use pipeline::{
    DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS, DeliveryConfig, DeliveryPipeline, DeliveryProducer,
};
pub use stats::{DeliveryStats, DeliveryStatsSnapshot};
