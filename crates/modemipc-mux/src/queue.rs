use std::collections::VecDeque;

use bytes::Bytes;
use modemipc_frame::MessageType;

use crate::sequence::SequenceId;
use crate::transport::CompletionFn;

/// A request that has been enqueued but not yet handed to the channel.
pub(crate) struct OutboundRequest {
    pub(crate) sequence: SequenceId,
    pub(crate) command: u16,
    pub(crate) kind: MessageType,
    pub(crate) payload: Bytes,
    pub(crate) on_complete: Option<CompletionFn>,
}

/// FIFO of unsent requests.
#[derive(Default)]
pub(crate) struct RequestQueue {
    items: VecDeque<OutboundRequest>,
}

impl RequestQueue {
    pub(crate) fn push(&mut self, request: OutboundRequest) {
        self.items.push_back(request);
    }

    pub(crate) fn pop(&mut self) -> Option<OutboundRequest> {
        self.items.pop_front()
    }

    pub(crate) fn contains(&self, sequence: SequenceId) -> bool {
        self.items.iter().any(|r| r.sequence == sequence)
    }

    /// Pull a request out of the queue before it is sent.
    pub(crate) fn remove(&mut self, sequence: SequenceId) -> Option<OutboundRequest> {
        let pos = self.items.iter().position(|r| r.sequence == sequence)?;
        self.items.remove(pos)
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
