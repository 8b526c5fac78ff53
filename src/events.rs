// SPDX-License-Identifier: Apache-2.0

// Per-instance synchronous publish/subscribe for storage mutations.
// Every NamespaceStorage owns exactly one EventBus; buses are never
// shared, so two instances over the same namespace do not observe
// each other's writes.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Set,
    Merge,
    Remove,
    Clear,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::Set,
        EventType::Merge,
        EventType::Remove,
        EventType::Clear,
    ];
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Set => write!(f, "set"),
            EventType::Merge => write!(f, "merge"),
            EventType::Remove => write!(f, "remove"),
            EventType::Clear => write!(f, "clear"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownEventType(pub String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown event type {}", self.0)
    }
}

impl std::error::Error for UnknownEventType {}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(EventType::Set),
            "merge" => Ok(EventType::Merge),
            "remove" => Ok(EventType::Remove),
            "clear" => Ok(EventType::Clear),
            other => Err(UnknownEventType(other.to_string())),
        }
    }
}

/// A mutation that already hit the backing store. Keys are always
/// logical, i.e. without the namespace prefix.
#[derive(Clone, PartialEq, Eq)]
pub enum StorageEvent {
    Set { key: String, value: String },
    Merge { key: String, value: String },
    Remove { key: String },
    Clear,
}

impl StorageEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            StorageEvent::Set { .. } => EventType::Set,
            StorageEvent::Merge { .. } => EventType::Merge,
            StorageEvent::Remove { .. } => EventType::Remove,
            StorageEvent::Clear => EventType::Clear,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            StorageEvent::Set { key, .. }
            | StorageEvent::Merge { key, .. }
            | StorageEvent::Remove { key } => Some(key),
            StorageEvent::Clear => None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            StorageEvent::Set { value, .. } | StorageEvent::Merge { value, .. } => Some(value),
            StorageEvent::Remove { .. } | StorageEvent::Clear => None,
        }
    }
}

// Values may be sensitive, only their length is printed.
impl Debug for StorageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.key(), self.value()) {
            (Some(key), Some(value)) => {
                write!(f, "{} {} length:{}", self.event_type(), key, value.len())
            }
            (Some(key), None) => write!(f, "{} {}", self.event_type(), key),
            _ => write!(f, "{}", self.event_type()),
        }
    }
}

type ListenerFn = dyn Fn(&StorageEvent) + Send + Sync;

/// Callback registered on an [`EventBus`].
///
/// Cloning is cheap and keeps identity: `remove_listener` matches
/// clones of the same `Listener` and nothing else.
#[derive(Clone)]
pub struct Listener(Arc<ListenerFn>);

impl Listener {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&StorageEvent) + Send + Sync + 'static,
    {
        Listener(Arc::new(f))
    }

    fn call(&self, event: &StorageEvent) {
        (self.0)(event)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Listener {}

impl Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0))
    }
}

impl<F> From<F> for Listener
where
    F: Fn(&StorageEvent) + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Listener::new(f)
    }
}

// `removed` is shared with in-flight dispatch snapshots so a listener
// unregistered mid-dispatch is skipped for the rest of that dispatch.
#[derive(Debug, Clone)]
struct Registration {
    id: Uuid,
    listener: Listener,
    removed: Arc<AtomicBool>,
}

impl Registration {
    fn new(id: Uuid, listener: Listener) -> Self {
        Self {
            id,
            listener,
            removed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn mark_removed(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}

type Registry = HashMap<EventType, Vec<Registration>>;

#[derive(Debug, Default)]
struct Inner {
    listeners: Mutex<Registry>,
}

impl Inner {
    // A listener panicking during dispatch never holds the lock, but a
    // poisoned registry is still usable, so recover instead of failing.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_registration(&self, event_type: EventType, id: Uuid) -> bool {
        let mut listeners = self.lock();
        match listeners.get_mut(&event_type) {
            Some(regs) => {
                let before = regs.len();
                regs.retain(|r| {
                    if r.id == id {
                        r.mark_removed();
                        return false;
                    }
                    true
                });
                before != regs.len()
            }
            None => false,
        }
    }
}

/// Handle returned from `add_listener`. Dropping it leaves the listener
/// registered; call [`Subscription::remove`] to unregister.
#[derive(Debug, Clone)]
pub struct Subscription {
    event_type: EventType,
    id: Uuid,
    bus: Weak<Inner>,
}

impl Subscription {
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Unregisters this registration only. Calling it again, or after
    /// the bus is gone, does nothing.
    pub fn remove(&self) {
        if let Some(bus) = self.bus.upgrade() {
            if bus.remove_registration(self.event_type, self.id) {
                debug!("removed {} listener {}", self.event_type, self.id);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for every future event of `event_type`.
    /// Registering the same listener twice makes it fire twice.
    pub fn add_listener(&self, event_type: EventType, listener: impl Into<Listener>) -> Subscription {
        self.register(event_type, Uuid::new_v4(), listener.into())
    }

    fn register(&self, event_type: EventType, id: Uuid, listener: Listener) -> Subscription {
        self.inner
            .lock()
            .entry(event_type)
            .or_default()
            .push(Registration::new(id, listener));
        Subscription {
            event_type,
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Drops every registration of `listener` for `event_type`. Unknown
    /// listeners are ignored.
    pub fn remove_listener(&self, event_type: EventType, listener: &Listener) {
        if let Some(regs) = self.inner.lock().get_mut(&event_type) {
            regs.retain(|r| {
                if &r.listener == listener {
                    r.mark_removed();
                    return false;
                }
                true
            });
        }
    }

    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.inner
            .lock()
            .get(&event_type)
            .map_or(0, |regs| regs.len())
    }

    /// Calls every listener registered for the event's type, in
    /// registration order, on the current thread.
    ///
    /// Panics from a listener are not caught: the remaining listeners are
    /// skipped and the panic unwinds into the caller. A listener removed
    /// while dispatching is not called again, not even later in the same
    /// dispatch; listeners added while dispatching wait for the next one.
    pub fn dispatch(&self, event: &StorageEvent) {
        let snapshot: Vec<Registration> = match self.inner.lock().get(&event.event_type()) {
            Some(regs) => regs.clone(),
            None => return,
        };

        for reg in &snapshot {
            if reg.is_removed() {
                continue;
            }
            reg.listener.call(event);
        }
    }

    /// Forwards events of `event_type` into an unbounded channel, for
    /// consumers that would rather `recv().await` than run callbacks.
    /// Remove the subscription to close the channel's sending side; once the
    /// receiver is dropped the registration removes itself on the next event.
    pub fn subscribe(
        &self,
        event_type: EventType,
    ) -> (Subscription, mpsc::UnboundedReceiver<StorageEvent>) {
        let (tx, rx) = mpsc::unbounded_channel::<StorageEvent>();
        let id = Uuid::new_v4();
        let bus = Arc::downgrade(&self.inner);
        let listener = Listener::new(move |event: &StorageEvent| {
            if tx.send(event.clone()).is_err() {
                debug!("receiver for {} events dropped, removing {}", event_type, id);
                if let Some(bus) = bus.upgrade() {
                    bus.remove_registration(event_type, id);
                }
            }
        });
        (self.register(event_type, id, listener), rx)
    }
}
