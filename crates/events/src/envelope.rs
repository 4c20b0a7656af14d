use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use storefront_core::AggregateId;

use crate::Event;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("payload serialization failed: {0}")]
    Serialize(String),
}

/// Envelope for a published event.
///
/// `sequence_number` is the aggregate version reached by applying this event,
/// so consumers can discard duplicates per `(aggregate_id, sequence_number)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,

    aggregate_id: AggregateId,
    aggregate_type: String,
    sequence_number: u64,

    event_type: String,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            event_type: event_type.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<JsonValue> {
    /// Wrap a typed domain event, serializing its payload to JSON.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event: &E,
    ) -> Result<Self, EnvelopeError>
    where
        E: Event + Serialize,
    {
        let payload =
            serde_json::to_value(event).map_err(|e| EnvelopeError::Serialize(e.to_string()))?;

        Ok(Self::new(
            Uuid::now_v7(),
            aggregate_id,
            aggregate_type,
            sequence_number,
            event.event_type(),
            event.occurred_at(),
            payload,
        ))
    }

    /// Decode the payload back into a typed event.
    pub fn decode<E>(&self) -> Result<E, serde_json::Error>
    where
        E: for<'de> Deserialize<'de>,
    {
        serde_json::from_value(self.payload.clone())
    }
}
