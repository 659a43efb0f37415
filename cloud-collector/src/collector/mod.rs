//! Collection cycles: per-account sampling of metrics and events.

mod cycle;
mod envelope;
mod events;
mod metrics;
mod storage;

pub use cycle::{CollectionContext, CollectionCycle, CollectionSettings, CycleReport};
pub use envelope::{
    Batch, EventContent, EventDimension, EventRecord, MetricDimension, MetricEnvelope,
    encode_batch, target_id,
};
pub use events::{collect_events, event_target, event_window};
pub use metrics::{
    DISK_USED_ALIAS, MEM_TOTAL_METRIC, MetricScope, collect_metrics, memory_total_gb,
    normalize_series, perf_aliases,
};
pub use storage::{
    StoreSpace, datastore_utilization, disk_utilization, host_disk_utilization, store_space_map,
};
