use std::time::{Duration, Instant};

use bytes::Bytes;
use modemipc_frame::{describe, Message, MessageType};
use tracing::{debug, trace, warn};

use crate::channel::Channel;
use crate::config::TransportConfig;
use crate::error::{MuxError, RequestError, Result};
use crate::pending::{Correlation, PendingTable};
use crate::queue::{OutboundRequest, RequestQueue};
use crate::registry::{MessageClass, NotificationRegistry, SubscriptionId};
use crate::sequence::{SequenceAllocator, SequenceId};

/// What a completion callback receives.
pub type ResponseResult<'a> = std::result::Result<Response<'a>, RequestError>;

/// Invoked at most once when a request is answered or expires.
pub type CompletionFn = Box<dyn FnOnce(&mut Transport, ResponseResult<'_>)>;

/// Invoked for every matching unsolicited message until unsubscribed.
pub type NotifyFn = Box<dyn FnMut(&mut Transport, &Notification<'_>)>;

/// A response correlated to one of our requests.
///
/// The payload is borrowed from the dispatcher for the duration of the
/// callback; copy it out to keep it.
#[derive(Debug, Clone, Copy)]
pub struct Response<'a> {
    pub sequence: SequenceId,
    pub command: u16,
    pub payload: &'a [u8],
    pub matched_by: Correlation,
    /// Time between the request hitting the channel and this response.
    pub elapsed: Duration,
}

/// An unsolicited message delivered to subscribers.
#[derive(Debug, Clone, Copy)]
pub struct Notification<'a> {
    pub class: MessageClass,
    pub command: u16,
    /// The modem's own sequence number for this message.
    pub mseq: u8,
    pub payload: &'a [u8],
}

/// Outcome of one drain step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drained {
    /// Nothing was queued.
    Idle,
    Sent(SequenceId),
    /// The channel rejected the write; the request is gone.
    Lost(SequenceId),
}

/// Request multiplexer for one baseband channel.
///
/// Owns the outbound queue, the pending-response table and the subscription
/// registry. It performs no I/O itself: the event loop calls
/// [`drain_one`](Self::drain_one) when the channel is writable and
/// [`dispatch`](Self::dispatch) for every inbound message.
///
/// Callbacks receive `&mut Transport` and may enqueue, subscribe or
/// unsubscribe from inside the call. A subscriber must not call
/// [`dispatch`](Self::dispatch) itself: its own callback is out of the
/// registry for the duration of the call and would be skipped.
pub struct Transport {
    config: TransportConfig,
    allocator: SequenceAllocator,
    queue: RequestQueue,
    pending: PendingTable,
    registry: NotificationRegistry,
    fanning_out: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            allocator: SequenceAllocator::new(),
            queue: RequestQueue::default(),
            pending: PendingTable::default(),
            registry: NotificationRegistry::default(),
            fanning_out: false,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Queue a request and return the sequence id it will carry.
    ///
    /// Without `on_complete` the request is fire-and-forget: it is dropped
    /// right after it is sent and any response to it goes unmatched.
    pub fn enqueue(
        &mut self,
        command: u16,
        kind: MessageType,
        payload: impl Into<Bytes>,
        on_complete: Option<CompletionFn>,
    ) -> Result<SequenceId> {
        if !kind.is_request() {
            return Err(MuxError::NotARequest(kind));
        }
        let payload = payload.into();
        if payload.len() > self.config.max_payload_size {
            return Err(MuxError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        let queue = &self.queue;
        let pending = &self.pending;
        let sequence = self
            .allocator
            .allocate(|id| queue.contains(id) || pending.contains(id))
            .ok_or(MuxError::SequenceExhausted)?;

        if self.queue.is_empty() {
            trace!("arming writable watch");
        }
        debug!(
            seq = sequence.get(),
            command = %describe(command),
            kind = %kind,
            len = payload.len(),
            expects_response = on_complete.is_some(),
            "request queued"
        );
        self.queue.push(OutboundRequest {
            sequence,
            command,
            kind,
            payload,
            on_complete,
        });
        Ok(sequence)
    }

    /// Queue a request whose response is delivered to `on_complete`.
    pub fn request<F>(
        &mut self,
        command: u16,
        kind: MessageType,
        payload: impl Into<Bytes>,
        on_complete: F,
    ) -> Result<SequenceId>
    where
        F: FnOnce(&mut Transport, ResponseResult<'_>) + 'static,
    {
        self.enqueue(command, kind, payload, Some(Box::new(on_complete)))
    }

    /// Queue a fire-and-forget request.
    pub fn post(
        &mut self,
        command: u16,
        kind: MessageType,
        payload: impl Into<Bytes>,
    ) -> Result<SequenceId> {
        self.enqueue(command, kind, payload, None)
    }

    pub fn subscribe_notification<F>(&mut self, command: u16, on_notify: F) -> Result<SubscriptionId>
    where
        F: FnMut(&mut Transport, &Notification<'_>) + 'static,
    {
        self.subscribe(MessageClass::Notification, command, Box::new(on_notify))
    }

    pub fn subscribe_indication<F>(&mut self, command: u16, on_notify: F) -> Result<SubscriptionId>
    where
        F: FnMut(&mut Transport, &Notification<'_>) + 'static,
    {
        self.subscribe(MessageClass::Indication, command, Box::new(on_notify))
    }

    pub fn subscribe(
        &mut self,
        class: MessageClass,
        command: u16,
        on_notify: NotifyFn,
    ) -> Result<SubscriptionId> {
        let id = self.registry.add(class, command, on_notify)?;
        debug!(
            subscription = id.get(),
            class = class.as_str(),
            command = %describe(command),
            "subscribed"
        );
        Ok(id)
    }

    /// Remove a subscription. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            debug!(subscription = id.get(), "unsubscribed");
        }
        removed
    }

    /// Send the request at the head of the queue.
    ///
    /// A request the channel rejects is lost: it is not retried and its
    /// callback is dropped without being called. Only a closed channel is
    /// returned as an error.
    pub fn drain_one<C: Channel + ?Sized>(&mut self, channel: &mut C) -> Result<Drained> {
        let Some(request) = self.queue.pop() else {
            return Ok(Drained::Idle);
        };
        let OutboundRequest {
            sequence,
            command,
            kind,
            payload,
            on_complete,
        } = request;

        if let Err(err) = channel.send(sequence, command, kind, &payload) {
            warn!(
                seq = sequence.get(),
                command = %describe(command),
                error = %err,
                dropped_callback = on_complete.is_some(),
                "request lost, send failed"
            );
            return match err {
                MuxError::Closed => Err(MuxError::Closed),
                _ => Ok(Drained::Lost(sequence)),
            };
        }
        drop(payload);

        debug!(seq = sequence.get(), command = %describe(command), kind = %kind, "request sent");
        if let Some(on_complete) = on_complete {
            self.pending.insert(
                sequence,
                command,
                kind,
                on_complete,
                Instant::now(),
                self.config.response_timeout,
            );
        }
        if self.queue.is_empty() {
            trace!("request queue empty, disarming writable watch");
        }
        Ok(Drained::Sent(sequence))
    }

    /// Route one inbound message to its pending request or its subscribers.
    ///
    /// Not reentrant from a notification callback.
    pub fn dispatch(&mut self, message: Message) {
        debug_assert!(
            !self.fanning_out,
            "dispatch called from inside a notification callback"
        );
        match message.kind() {
            MessageType::Resp => self.resolve(&message),
            kind => match MessageClass::from_type(kind) {
                Some(class) => self.fan_out(class, &message),
                None => warn!(
                    kind = %kind,
                    command = %describe(message.command()),
                    mseq = message.header.mseq,
                    "dropping message of unexpected type"
                ),
            },
        }
    }

    fn resolve(&mut self, message: &Message) {
        let command = message.command();
        let aseq = message.header.aseq;
        let Some((entry, matched_by)) = self.pending.correlate(aseq, command) else {
            debug!(aseq, command = %describe(command), "dropping unmatched response");
            return;
        };

        if matched_by == Correlation::Command {
            debug!(
                aseq,
                seq = entry.sequence.get(),
                command = %describe(command),
                "response matched by command id"
            );
        }
        let response = Response {
            sequence: entry.sequence,
            command,
            payload: &message.payload,
            matched_by,
            elapsed: entry.waited(Instant::now()),
        };
        (entry.on_complete)(self, Ok(response));
    }

    fn fan_out(&mut self, class: MessageClass, message: &Message) {
        let command = message.command();
        let subscribers = self.registry.matching(class, command);
        if subscribers.is_empty() {
            trace!(class = class.as_str(), command = %describe(command), "no subscribers");
            return;
        }

        let notification = Notification {
            class,
            command,
            mseq: message.header.mseq,
            payload: &message.payload,
        };
        self.fanning_out = true;
        for id in subscribers {
            // Gone if an earlier callback in this pass unsubscribed it.
            let Some(mut callback) = self.registry.take_callback(id) else {
                continue;
            };
            callback(self, &notification);
            self.registry.restore_callback(id, callback);
        }
        self.fanning_out = false;
    }

    /// Fail every pending request whose deadline has passed.
    ///
    /// Returns how many callbacks were invoked. The expired id is free
    /// again, so a late response to it no longer matches by sequence and
    /// falls back to the oldest pending request with the same command id.
    pub fn expire(&mut self, now: Instant) -> usize {
        let expired = self.pending.take_expired(now);
        let count = expired.len();
        for entry in expired {
            let waited = entry.waited(now);
            warn!(
                seq = entry.sequence.get(),
                command = %describe(entry.command),
                kind = %entry.kind,
                waited_ms = waited.as_millis() as u64,
                "request timed out"
            );
            (entry.on_complete)(self, Err(RequestError::TimedOut(waited)));
        }
        count
    }

    /// Earliest deadline among pending requests.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.next_deadline()
    }

    /// Withdraw a queued or pending request without calling its callback.
    ///
    /// For callers tearing down whatever their callbacks refer to. A request
    /// that was already sent stays sent, and its response is not discarded:
    /// with the id no longer pending it falls back to command-id matching
    /// and resolves the oldest pending request for the same command, if any.
    /// Retracting does not make it safe to reissue that command while the
    /// first answer may still arrive.
    pub fn retract(&mut self, sequence: SequenceId) -> bool {
        let retracted =
            self.queue.remove(sequence).is_some() || self.pending.remove(sequence).is_some();
        if retracted {
            debug!(seq = sequence.get(), "request retracted");
        }
        retracted
    }

    /// The writable watch should be armed.
    pub fn wants_write(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn is_pending(&self, sequence: SequenceId) -> bool {
        self.pending.contains(sequence)
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.registry.contains(id)
    }
}
