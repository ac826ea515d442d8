//! Best-effort fan-out after a committed engine change: SSE subscribers
//! and, when configured, the Kafka notification topics.

use omniport_core::models::AppendOutcome;
use omniport_shared::models::events::TripStatusNotice;
use serde::Serialize;

use crate::state::AppState;

pub fn publish<T>(state: &AppState, topic: &'static str, key: String, payload: T)
where
    T: Serialize + Send + Sync + 'static,
{
    if let Some(kafka) = state.kafka.clone() {
        tokio::spawn(async move {
            kafka.publish_json(topic, &key, &payload).await;
        });
    }
}

pub fn trip_status(state: &AppState, outcome: &AppendOutcome) {
    let notice = TripStatusNotice {
        event_id: outcome.event.id,
        trip_id: outcome.trip.id,
        event_type: outcome.event.event_type.as_str().to_string(),
        trip_status: outcome.trip.status.as_str().to_string(),
        message: outcome.event.message.clone(),
        occurred_at: outcome.event.occurred_at,
        inconsistent: outcome.transition.inconsistent,
    };
    // No subscribers is fine.
    let _ = state.sse_tx.send(notice.clone());
    publish(
        state,
        omniport_shared::models::events::TOPIC_TRIP_STATUS,
        outcome.trip.id.to_string(),
        notice,
    );
}
