//! Reporting records as serialized for the agent.

use std::collections::HashMap;

use serde::Serialize;

use crate::Result;

/// Wrapper every payload is serialized in: `{"data": [...]}`.
#[derive(Debug, Serialize)]
pub struct Batch<'a, T> {
    pub data: &'a [T],
}

/// Serialize `records` as one batch document.
pub fn encode_batch<T: Serialize>(records: &[T]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&Batch { data: records })?)
}

/// Metrics of one entity at the cycle timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEnvelope {
    pub metrics: HashMap<String, f64>,
    /// `<account id>@<entity reference>`.
    pub target: String,
    pub dimension: MetricDimension,
    /// Seconds since the epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDimension {
    pub cloud_id: i64,
    pub instanceid: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub device_name: String,
}

/// One operational event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub event_name: String,
    pub event: EventContent,
    /// `[type][value][name]` of the object the event is about.
    pub target: String,
    pub dimension: EventDimension,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventContent {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDimension {
    pub user_name: String,
    pub cloud_id: i64,
    pub instanceid: String,
}

pub fn target_id(account_id: i64, reference: &str) -> String {
    format!("{}@{}", account_id, reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metric_envelope_shape() {
        let envelope = MetricEnvelope {
            metrics: HashMap::from([("cpu_usage_average".to_string(), 42.5)]),
            target: target_id(7, "host-10"),
            dimension: MetricDimension {
                cloud_id: 7,
                instanceid: "host-10".into(),
                entity_type: "host".into(),
                device_name: String::new(),
            },
            timestamp: 1_714_564_800,
        };

        let value: serde_json::Value =
            serde_json::from_slice(&encode_batch(&[envelope]).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "data": [{
                    "metrics": { "cpu_usage_average": 42.5 },
                    "target": "7@host-10",
                    "dimension": {
                        "cloud_id": 7,
                        "instanceid": "host-10",
                        "type": "host",
                        "device_name": ""
                    },
                    "timestamp": 1_714_564_800
                }]
            })
        );
    }

    #[test]
    fn test_event_record_shape() {
        let record = EventRecord {
            event_name: "VmPoweredOnEvent".into(),
            event: EventContent {
                content: "vm-42 powered on".into(),
            },
            target: "[VirtualMachine][vm-42][web-01]".into(),
            dimension: EventDimension {
                user_name: "root".into(),
                cloud_id: 7,
                instanceid: "host-10".into(),
            },
            timestamp: 1_714_564_800_123,
        };

        let value: serde_json::Value =
            serde_json::from_slice(&encode_batch(&[record]).unwrap()).unwrap();
        assert_eq!(value["data"][0]["event"]["content"], "vm-42 powered on");
        assert_eq!(value["data"][0]["dimension"]["instanceid"], "host-10");
        assert_eq!(value["data"][0]["timestamp"], 1_714_564_800_123i64);
    }
}
