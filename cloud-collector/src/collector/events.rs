//! Event collection for one sub-collection.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

use super::envelope::{EventContent, EventDimension, EventRecord};
use crate::Result;
use crate::config::EventWindowMode;
use crate::inventory::InventoryReference;
use crate::provider::{EventWindow, NamedRef, ProviderSession, RawEvent};

/// Window covering the last `period` before `now`, oriented per `mode`.
pub fn event_window(mode: EventWindowMode, now: DateTime<Utc>, period: Duration) -> EventWindow {
    match mode {
        EventWindowMode::Trailing => EventWindow::trailing(now, period),
        EventWindowMode::Inverted => EventWindow::inverted(now, period),
    }
}

/// `[type][value][name]` of the most specific object attached to `event`:
/// VM, then host, compute resource, datacenter. Empty when none is set.
pub fn event_target(event: &RawEvent) -> String {
    [
        &event.vm,
        &event.host,
        &event.compute_resource,
        &event.datacenter,
    ]
    .into_iter()
    .find_map(Option::as_ref)
    .map(|NamedRef { reference, name }| {
        format!("[{}][{}][{}]", reference.kind, reference.value, name)
    })
    .unwrap_or_default()
}

fn to_record(event: RawEvent, account_id: i64, owner: &InventoryReference) -> EventRecord {
    EventRecord {
        target: event_target(&event),
        event_name: event.event_type,
        event: EventContent {
            content: event.full_formatted_message,
        },
        dimension: EventDimension {
            user_name: event.user_name,
            cloud_id: account_id,
            instanceid: owner.value().to_string(),
        },
        timestamp: event.created_time.timestamp_millis(),
    }
}

/// Query events for every reference in turn.
///
/// The first failing query aborts the whole batch.
pub async fn collect_events(
    session: &dyn ProviderSession,
    account_id: i64,
    references: &[InventoryReference],
    window: &EventWindow,
) -> Result<Vec<EventRecord>> {
    let mut records = Vec::new();
    for reference in references {
        let events = session.query_events(&reference.object, window).await?;
        debug!(entity = %reference.object, count = events.len(), "Queried events");
        records.extend(
            events
                .into_iter()
                .map(|event| to_record(event, account_id, reference)),
        );
    }
    Ok(records)
}
