use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

use crate::network::packet::status_description;

/// A single error descriptor for one failed send attempt.
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub struct AttemptError {
    /// The gateway's status code for rejections.
    /// `None` marks local transport-class failures, which never came with a
    /// response frame.
    pub status: Option<u8>,
    pub description: String,
    /// The correlation id the attempt was sent with.
    /// For rejections this is the id echoed back by the gateway.
    pub correlation_id: u32,
}

impl AttemptError {
    /// A transport-class failure (write, probe or reconnect trouble).
    pub fn transport(description: String, correlation_id: u32) -> Self {
        AttemptError {
            status: None,
            description,
            correlation_id,
        }
    }

    /// An application-level rejection reported by the gateway.
    pub fn rejection(status: u8, correlation_id: u32) -> Self {
        AttemptError {
            status: Some(status),
            description: status_description(status),
            correlation_id,
        }
    }
}

/// The accumulated retry state for a single (message, recipient) pair.
/// Created on the first failure and updated by each subsequent one.
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub struct AttemptRecord {
    pub message_id: u64,
    pub recipient: String,
    /// Number of attempts made so far.
    pub attempts: u32,
    /// One entry per failed attempt, in attempt order.
    pub errors: Vec<AttemptError>,
}

/// Per-recipient delivery errors of a full send cycle.
///
/// Records are keyed by the (message id, recipient) pair.
/// Reading state for an unknown pair doesn't create a record, it simply
/// reads as "no attempts yet".
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct DeliveryReport {
    records: BTreeMap<(u64, String), AttemptRecord>,
}

impl DeliveryReport {
    /// Register a failed attempt for a (message, recipient) pair.
    pub fn record_failure(&mut self, message_id: u64, recipient: &str, error: AttemptError) {
        let record = self
            .records
            .entry((message_id, recipient.to_string()))
            .or_insert_with(|| AttemptRecord {
                message_id,
                recipient: recipient.to_string(),
                attempts: 0,
                errors: Vec::new(),
            });

        record.attempts += 1;
        record.errors.push(error);
    }

    /// The number of attempts made so far for a (message, recipient) pair.
    pub fn attempts(&self, message_id: u64, recipient: &str) -> u32 {
        self.records
            .get(&(message_id, recipient.to_string()))
            .map(|record| record.attempts)
            .unwrap_or(0)
    }

    pub fn get(&self, message_id: u64, recipient: &str) -> Option<&AttemptRecord> {
        self.records.get(&(message_id, recipient.to_string()))
    }

    pub fn entries(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The caller-facing result of a send cycle.
///
/// After a fatal abort the counts cover exactly the notifications that were
/// attempted before the run stopped.
#[derive(PartialEq, Eq, Clone, Debug, Default, Deserialize, Serialize)]
pub struct Summary {
    /// Messages that were queued when the cycle started.
    pub queued_messages: usize,
    /// Recipients that entered the send loop, across all messages.
    pub total_notifications: usize,
    pub sent_notifications: usize,
    pub failed_notifications: usize,
}
