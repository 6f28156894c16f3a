use std::collections::HashMap;
use std::fmt;

use modemipc_frame::MessageType;

use crate::error::{MuxError, Result};
use crate::transport::NotifyFn;

/// The two classes of unsolicited message. Subscriptions never cross classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    Notification,
    Indication,
}

impl MessageClass {
    pub fn from_type(kind: MessageType) -> Option<Self> {
        match kind {
            MessageType::Notification => Some(Self::Notification),
            MessageType::Indication => Some(Self::Indication),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Indication => "indication",
        }
    }
}

/// Handle returned by subscribe; pass it to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u32);

impl SubscriptionId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

type WatchKey = (MessageClass, u16);

struct Subscription {
    key: WatchKey,
    /// Empty while the callback is running.
    callback: Option<NotifyFn>,
}

/// Subscriptions indexed by (class, command) in registration order.
pub(crate) struct NotificationRegistry {
    entries: HashMap<SubscriptionId, Subscription>,
    index: HashMap<WatchKey, Vec<SubscriptionId>>,
    next_id: u32,
}

impl Default for NotificationRegistry {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            index: HashMap::new(),
            next_id: 1,
        }
    }
}

impl NotificationRegistry {
    pub(crate) fn add(
        &mut self,
        class: MessageClass,
        command: u16,
        callback: NotifyFn,
    ) -> Result<SubscriptionId> {
        let id = self.allocate_id()?;
        let key = (class, command);
        self.entries.insert(
            id,
            Subscription {
                key,
                callback: Some(callback),
            },
        );
        self.index.entry(key).or_default().push(id);
        Ok(id)
    }

    /// Returns whether `id` was live.
    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(sub) = self.entries.remove(&id) else {
            return false;
        };
        if let Some(ids) = self.index.get_mut(&sub.key) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.index.remove(&sub.key);
            }
        }
        true
    }

    /// Snapshot of the ids subscribed to (class, command), in registration order.
    pub(crate) fn matching(&self, class: MessageClass, command: u16) -> Vec<SubscriptionId> {
        self.index
            .get(&(class, command))
            .cloned()
            .unwrap_or_default()
    }

    /// Borrow a live subscription's callback for one invocation.
    pub(crate) fn take_callback(&mut self, id: SubscriptionId) -> Option<NotifyFn> {
        self.entries.get_mut(&id)?.callback.take()
    }

    /// Return a callback after its invocation. Dropped if the subscription
    /// was removed meanwhile.
    pub(crate) fn restore_callback(&mut self, id: SubscriptionId, callback: NotifyFn) -> bool {
        match self.entries.get_mut(&id) {
            Some(sub) => {
                sub.callback = Some(callback);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn allocate_id(&mut self) -> Result<SubscriptionId> {
        if self.entries.len() >= (u32::MAX - 1) as usize {
            return Err(MuxError::SubscriptionExhausted);
        }
        loop {
            let id = SubscriptionId(self.next_id);
            self.next_id = if self.next_id == u32::MAX {
                1
            } else {
                self.next_id + 1
            };
            if !self.entries.contains_key(&id) {
                return Ok(id);
            }
        }
    }
}
