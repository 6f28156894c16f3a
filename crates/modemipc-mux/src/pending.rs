use std::collections::HashMap;
use std::time::{Duration, Instant};

use modemipc_frame::MessageType;

use crate::sequence::SequenceId;
use crate::transport::CompletionFn;

/// How an inbound response was matched to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// The response echoed the request's sequence id.
    Sequence,
    /// The echoed id was missing or stale; matched on command id instead.
    Command,
}

/// A sent request waiting for its response.
pub(crate) struct PendingEntry {
    pub(crate) sequence: SequenceId,
    pub(crate) command: u16,
    pub(crate) kind: MessageType,
    pub(crate) on_complete: CompletionFn,
    pub(crate) sent_at: Instant,
    pub(crate) deadline: Option<Instant>,
    order: u64,
}

impl PendingEntry {
    pub(crate) fn waited(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.sent_at)
    }
}

/// Sent requests keyed by sequence id, remembering send order for the
/// command-id fallback.
#[derive(Default)]
pub(crate) struct PendingTable {
    by_sequence: HashMap<SequenceId, PendingEntry>,
    next_order: u64,
}

impl PendingTable {
    pub(crate) fn insert(
        &mut self,
        sequence: SequenceId,
        command: u16,
        kind: MessageType,
        on_complete: CompletionFn,
        sent_at: Instant,
        timeout: Option<Duration>,
    ) {
        let order = self.next_order;
        self.next_order += 1;
        let entry = PendingEntry {
            sequence,
            command,
            kind,
            on_complete,
            sent_at,
            deadline: timeout.map(|t| sent_at + t),
            order,
        };
        // Allocation never hands out an id that is still pending.
        debug_assert!(!self.by_sequence.contains_key(&sequence));
        self.by_sequence.insert(sequence, entry);
    }

    pub(crate) fn contains(&self, sequence: SequenceId) -> bool {
        self.by_sequence.contains_key(&sequence)
    }

    pub(crate) fn remove(&mut self, sequence: SequenceId) -> Option<PendingEntry> {
        self.by_sequence.remove(&sequence)
    }

    /// Find and remove the entry an inbound response belongs to.
    ///
    /// A valid echoed id is tried first; if it is out of range or unknown,
    /// the earliest-sent entry with the same command id is taken.
    pub(crate) fn correlate(
        &mut self,
        echoed: u8,
        command: u16,
    ) -> Option<(PendingEntry, Correlation)> {
        if let Some(sequence) = SequenceId::new(echoed) {
            if let Some(entry) = self.by_sequence.remove(&sequence) {
                return Some((entry, Correlation::Sequence));
            }
        }

        let sequence = self
            .by_sequence
            .values()
            .filter(|e| e.command == command)
            .min_by_key(|e| e.order)
            .map(|e| e.sequence)?;
        self.by_sequence
            .remove(&sequence)
            .map(|entry| (entry, Correlation::Command))
    }

    /// Remove every entry whose deadline is at or before `now`, oldest first.
    pub(crate) fn take_expired(&mut self, now: Instant) -> Vec<PendingEntry> {
        let expired: Vec<SequenceId> = self
            .by_sequence
            .values()
            .filter(|e| e.deadline.is_some_and(|d| d <= now))
            .map(|e| e.sequence)
            .collect();

        let mut entries: Vec<PendingEntry> = expired
            .into_iter()
            .filter_map(|seq| self.by_sequence.remove(&seq))
            .collect();
        entries.sort_by_key(|e| e.order);
        entries
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.by_sequence.values().filter_map(|e| e.deadline).min()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_sequence.len()
    }
}
