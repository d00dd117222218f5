use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// Soft per-event listener ceiling; exceeding it only logs.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

pub type ListenerId = u64;

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// A dispatched event. `name` is fully qualified (`ns:...:event`).
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub name: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
struct Listener {
    id: ListenerId,
    handler: Handler,
    once: bool,
}

enum Dispatch {
    Deliver {
        event: Arc<Event>,
        handlers: Vec<Handler>,
    },
    Flush(oneshot::Sender<()>),
}

struct Shared {
    listeners: DashMap<String, Vec<Listener>>,
    warned: DashMap<String, ()>,
    next_id: AtomicU64,
    max_listeners: AtomicUsize,
    dispatcher: OnceLock<mpsc::UnboundedSender<Dispatch>>,
}

impl Shared {
    fn dispatcher(&self) -> Option<&mpsc::UnboundedSender<Dispatch>> {
        if let Some(tx) = self.dispatcher.get() {
            return Some(tx);
        }
        let handle = tokio::runtime::Handle::try_current().ok()?;
        Some(self.dispatcher.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            handle.spawn(dispatch_loop(rx));
            tx
        }))
    }
}

async fn dispatch_loop(mut rx: mpsc::UnboundedReceiver<Dispatch>) {
    while let Some(message) = rx.recv().await {
        match message {
            Dispatch::Deliver { event, handlers } => deliver(&event, &handlers),
            Dispatch::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn deliver(event: &Event, handlers: &[Handler]) {
    for handler in handlers {
        if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
            tracing::error!(event = %event.name, "Event listener panicked");
        }
    }
}

/// Namespaced publish/subscribe bus with asynchronous delivery.
///
/// `emit` snapshots the current listeners and hands them to a dispatch task,
/// so it returns before any listener runs. Listeners added or removed after
/// `emit` do not affect that emission. Child emitters created with
/// [`EventEmitter::child`] share the listener table and dispatch task of
/// their root and prefix every event name with their namespace.
///
/// One dispatch task serves the whole tree and runs listeners one at a
/// time in emission order. A slow listener therefore delays every later
/// event on the bus; listeners with real work should hand it off to a
/// spawned task.
#[derive(Clone)]
pub struct EventEmitter {
    shared: Arc<Shared>,
    namespace: Option<String>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::with_max_listeners(DEFAULT_MAX_LISTENERS)
    }

    pub fn with_max_listeners(max_listeners: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                listeners: DashMap::new(),
                warned: DashMap::new(),
                next_id: AtomicU64::new(1),
                max_listeners: AtomicUsize::new(max_listeners),
                dispatcher: OnceLock::new(),
            }),
            namespace: None,
        }
    }

    /// Emitter scoped under `namespace` (nested below this one's namespace).
    pub fn child(&self, namespace: &str) -> Self {
        let namespace = match &self.namespace {
            Some(parent) => format!("{}:{}", parent, namespace),
            None => namespace.to_string(),
        };
        Self {
            shared: Arc::clone(&self.shared),
            namespace: Some(namespace),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Fully qualified name of `event` within this emitter's namespace.
    pub fn full_name(&self, event: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, event),
            None => event.to_string(),
        }
    }

    pub fn set_max_listeners(&self, max: usize) {
        self.shared.max_listeners.store(max, Ordering::Relaxed);
    }

    pub fn max_listeners(&self) -> usize {
        self.shared.max_listeners.load(Ordering::Relaxed)
    }

    pub fn on<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add_listener(event, Arc::new(handler), false)
    }

    /// Like [`on`](Self::on) but removed once its invocation is queued.
    pub fn once<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add_listener(event, Arc::new(handler), true)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let name = self.full_name(event);
        let removed = match self.shared.listeners.get_mut(&name) {
            Some(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|l| l.id != id);
                before != listeners.len()
            }
            None => false,
        };
        self.shared
            .listeners
            .remove_if(&name, |_, listeners| listeners.is_empty());
        removed
    }

    /// Removes every listener of `event`, or every listener inside this
    /// emitter's namespace when `event` is `None`.
    pub fn remove_all_listeners(&self, event: Option<&str>) {
        match event {
            Some(event) => {
                self.shared.listeners.remove(&self.full_name(event));
            }
            None => match &self.namespace {
                Some(ns) => {
                    let prefix = format!("{}:", ns);
                    self.shared
                        .listeners
                        .retain(|name, _| !name.starts_with(&prefix));
                }
                None => self.shared.listeners.clear(),
            },
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.shared
            .listeners
            .get(&self.full_name(event))
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Fully qualified names with at least one listener in this namespace.
    pub fn event_names(&self) -> Vec<String> {
        let prefix = self.namespace.as_ref().map(|ns| format!("{}:", ns));
        let mut names: Vec<String> = self
            .shared
            .listeners
            .iter()
            .filter(|entry| match &prefix {
                Some(prefix) => entry.key().starts_with(prefix),
                None => true,
            })
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Schedules delivery to the current listeners of `event`.
    ///
    /// Returns the number of listeners scheduled.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        let name = self.full_name(event);

        let handlers: Vec<Handler> = match self.shared.listeners.get_mut(&name) {
            Some(mut listeners) => {
                let snapshot = listeners.iter().map(|l| Arc::clone(&l.handler)).collect();
                listeners.retain(|l| !l.once);
                snapshot
            }
            None => return 0,
        };
        self.shared
            .listeners
            .remove_if(&name, |_, listeners| listeners.is_empty());

        let count = handlers.len();
        let event = Arc::new(Event {
            name,
            payload,
            timestamp: Utc::now(),
        });

        match self.shared.dispatcher() {
            Some(tx) => {
                if let Err(mpsc::error::SendError(message)) = tx.send(Dispatch::Deliver {
                    event: Arc::clone(&event),
                    handlers,
                }) {
                    // dispatch task is gone (runtime shut down); deliver here
                    if let Dispatch::Deliver { event, handlers } = message {
                        deliver(&event, &handlers);
                    }
                }
            }
            None => deliver(&event, &handlers),
        }

        count
    }

    /// Resolves once every event emitted before this call has been delivered.
    pub async fn flush(&self) {
        let Some(tx) = self.shared.dispatcher.get() else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(Dispatch::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn add_listener(&self, event: &str, handler: Handler, once: bool) -> ListenerId {
        let name = self.full_name(event);
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        let count = {
            let mut listeners = self.shared.listeners.entry(name.clone()).or_default();
            listeners.push(Listener { id, handler, once });
            listeners.len()
        };

        let max = self.max_listeners();
        if max > 0 && count > max && self.shared.warned.insert(name.clone(), ()).is_none() {
            tracing::warn!(
                event = %name,
                count,
                max,
                "Possible listener leak: listener count exceeds ceiling"
            );
        }

        id
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("namespace", &self.namespace)
            .field("events", &self.shared.listeners.len())
            .finish()
    }
}
