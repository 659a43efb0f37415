use std::fmt;

use bytes::Bytes;

/// What a payload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Metrics,
    Events,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Metrics => write!(f, "metrics"),
            PayloadKind::Events => write!(f, "events"),
        }
    }
}

/// A serialized batch bound for the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryMessage {
    /// Data channel the agent files the payload under.
    pub data_id: i32,
    /// JSON document `{"data": [...]}`.
    pub payload: Bytes,
    pub kind: PayloadKind,
    /// Producer label for logs, e.g. `7/host`.
    pub source: String,
}

impl DeliveryMessage {
    pub fn new(
        data_id: i32,
        payload: impl Into<Bytes>,
        kind: PayloadKind,
        source: impl Into<String>,
    ) -> Self {
        Self {
            data_id,
            payload: payload.into(),
            kind,
            source: source.into(),
        }
    }
}
