//! Watch subscriptions.
//!
//! Every `watch` or `watch_paths` call registers its own subscription under
//! a fresh [`WatcherId`] before the request goes out, so no event can
//! arrive for an unknown watcher. The [`WatchRegistry`] is the connection's
//! handler for [`EventKind::Watch`](crate::protocol::EventKind::Watch) and
//! fans each event out to the matching subscription only.
//!
//! Delivery runs on the connection's event loop, so events for one
//! subscription reach listeners in wire order. Listeners are called without
//! any registry lock held and may add or remove listeners, or close the
//! handle, from inside the callback.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{ListenerId, WatcherId};
use crate::protocol::{
    Notification, Operation, ParsedEvent, PathWatcherEvent, WatchOptions, WatchPathsOptions,
};
use crate::transport::{Connection, EventHandler};

use super::pattern::{PathFilter, WatchTarget};

// ============================================================================
// Types
// ============================================================================

/// Listener for single change events.
type ChangeListener = Arc<dyn Fn(&PathWatcherEvent) + Send + Sync>;

/// Callback for change batches.
type BatchCallback = Arc<dyn Fn(&[PathWatcherEvent]) + Send + Sync>;

enum Subscription {
    Single {
        target: WatchTarget,
        listeners: Mutex<Vec<(ListenerId, ChangeListener)>>,
    },
    Batch {
        filter: PathFilter,
        callback: BatchCallback,
    },
}

/// A registered subscription.
struct Entry {
    /// Cleared on close or disconnect; checked before every callback.
    active: AtomicBool,
    subscription: Subscription,
}

impl Entry {
    fn new(subscription: Subscription) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicBool::new(true),
            subscription,
        })
    }

    #[inline]
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    #[inline]
    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

// ============================================================================
// WatchRegistry
// ============================================================================

/// Live watch subscriptions for one connection.
#[derive(Default)]
pub(crate) struct WatchRegistry {
    entries: Mutex<FxHashMap<WatcherId, Arc<Entry>>>,
}

impl WatchRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn insert(&self, id: WatcherId, subscription: Subscription) -> Arc<Entry> {
        let entry = Entry::new(subscription);
        self.entries.lock().insert(id, Arc::clone(&entry));
        entry
    }

    /// Stops delivery for `id`. Returns `false` if it was not registered.
    fn remove(&self, id: WatcherId) -> bool {
        match self.entries.lock().remove(&id) {
            Some(entry) => {
                entry.deactivate();
                true
            }
            None => false,
        }
    }

    fn get(&self, id: &WatcherId) -> Option<Arc<Entry>> {
        self.entries.lock().get(id).cloned()
    }

    fn deliver_single(&self, watcher_id: WatcherId, event: &PathWatcherEvent) {
        let Some(entry) = self.get(&watcher_id) else {
            trace!(%watcher_id, "Watch event for unknown watcher");
            return;
        };
        let Subscription::Single { target, listeners } = &entry.subscription else {
            debug!(%watcher_id, "Single event for a batch watcher");
            return;
        };
        if !target.matches(&event.path) {
            trace!(%watcher_id, path = %event.path, "Watch event outside pattern");
            return;
        }

        let snapshot: Vec<ChangeListener> =
            listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in snapshot {
            if !entry.is_active() {
                break;
            }
            listener(event);
        }
    }

    fn deliver_batch(&self, watcher_id: WatcherId, events: &[PathWatcherEvent]) {
        let Some(entry) = self.get(&watcher_id) else {
            trace!(%watcher_id, "Watch batch for unknown watcher");
            return;
        };
        let Subscription::Batch { filter, callback } = &entry.subscription else {
            debug!(%watcher_id, "Batch event for a single watcher");
            return;
        };

        let batch: Vec<PathWatcherEvent> = events
            .iter()
            .filter(|event| filter.matches(&event.path))
            .cloned()
            .collect();
        if batch.is_empty() || !entry.is_active() {
            return;
        }
        callback(&batch);
    }
}

impl EventHandler for WatchRegistry {
    fn handle(&self, event: &ParsedEvent) -> Vec<Notification> {
        match event {
            ParsedEvent::Watch { watcher_id, event } => self.deliver_single(*watcher_id, event),
            ParsedEvent::WatchPaths { watcher_id, events } => {
                self.deliver_batch(*watcher_id, events)
            }
            other => trace!(?other, "Non-watch event routed to watch registry"),
        }
        Vec::new()
    }

    fn disconnected(&self) {
        let entries: Vec<_> = self.entries.lock().drain().collect();
        if !entries.is_empty() {
            debug!(count = entries.len(), "Dropping watch subscriptions");
        }
        for (_, entry) in entries {
            entry.deactivate();
        }
    }
}

// ============================================================================
// Subscribe / Unsubscribe
// ============================================================================

/// Registers locally, then asks the sandbox to start watching.
///
/// A failed request unregisters again so nothing leaks.
async fn subscribe(
    connection: &Connection,
    registry: &WatchRegistry,
    watcher_id: WatcherId,
    subscription: Subscription,
    operation: Operation,
) -> Result<Arc<Entry>> {
    let entry = registry.insert(watcher_id, subscription);
    if let Err(e) = connection.call(operation).await {
        registry.remove(watcher_id);
        return Err(e);
    }
    debug!(%watcher_id, "Watch subscription active");
    Ok(entry)
}

/// Stops local delivery, then cancels the remote subscription.
async fn unsubscribe(
    connection: &Connection,
    registry: &WatchRegistry,
    watcher_id: WatcherId,
) -> Result<()> {
    if !registry.remove(watcher_id) || connection.state().is_terminal() {
        return Ok(());
    }
    match connection.call(Operation::Unwatch { watcher_id }).await {
        Ok(_) | Err(Error::ConnectionClosed) => Ok(()),
        Err(e) => Err(e),
    }
}

// ============================================================================
// WatcherHandle
// ============================================================================

/// Handle to a single-pattern watch.
///
/// Dropping the handle leaves the subscription running; call
/// [`WatcherHandle::close`] to end it.
pub struct WatcherHandle {
    id: WatcherId,
    pattern: String,
    entry: Arc<Entry>,
    registry: Arc<WatchRegistry>,
    connection: Connection,
}

impl WatcherHandle {
    pub(crate) async fn open(
        connection: &Connection,
        registry: &Arc<WatchRegistry>,
        pattern: &str,
        options: WatchOptions,
    ) -> Result<Self> {
        let target = WatchTarget::new(pattern, &options)?;
        let id = WatcherId::generate();
        let subscription = Subscription::Single {
            target,
            listeners: Mutex::new(Vec::new()),
        };
        let operation = Operation::Watch {
            watcher_id: id,
            path: pattern.to_string(),
            options,
        };

        let entry = subscribe(connection, registry, id, subscription, operation)
            .await
            .map_err(|e| e.at_path(pattern))?;

        Ok(Self {
            id,
            pattern: pattern.to_string(),
            entry,
            registry: Arc::clone(registry),
            connection: connection.clone(),
        })
    }

    /// Returns the subscription ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Returns the watched pattern.
    #[inline]
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns `true` until closed or disconnected.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.entry.is_active()
    }

    /// Adds a change listener.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&PathWatcherEvent) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        if let Subscription::Single { listeners, .. } = &self.entry.subscription {
            listeners.lock().push((id, Arc::new(listener)));
        }
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let Subscription::Single { listeners, .. } = &self.entry.subscription else {
            return false;
        };
        let mut guard = listeners.lock();
        let before = guard.len();
        guard.retain(|(listener_id, _)| *listener_id != id);
        guard.len() != before
    }

    /// Ends the subscription. No listener is called after this returns.
    ///
    /// Closing twice, or after the connection dropped, succeeds without a
    /// remote call.
    ///
    /// # Errors
    ///
    /// Returns the remote error if the sandbox rejects the `unwatch`;
    /// local delivery has stopped regardless.
    pub async fn close(&self) -> Result<()> {
        unsubscribe(&self.connection, &self.registry, self.id).await
    }
}

impl fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PathWatcher
// ============================================================================

/// Handle to a multi-path watch delivering batches.
pub struct PathWatcher {
    id: WatcherId,
    entry: Arc<Entry>,
    registry: Arc<WatchRegistry>,
    connection: Connection,
}

impl PathWatcher {
    pub(crate) async fn open<F>(
        connection: &Connection,
        registry: &Arc<WatchRegistry>,
        options: WatchPathsOptions,
        callback: F,
    ) -> Result<Self>
    where
        F: Fn(&[PathWatcherEvent]) + Send + Sync + 'static,
    {
        let filter = PathFilter::new(&options)?;
        let id = WatcherId::generate();
        let subscription = Subscription::Batch {
            filter,
            callback: Arc::new(callback),
        };
        let operation = Operation::WatchPaths {
            watcher_id: id,
            options,
        };

        let entry = subscribe(connection, registry, id, subscription, operation).await?;

        Ok(Self {
            id,
            entry,
            registry: Arc::clone(registry),
            connection: connection.clone(),
        })
    }

    /// Returns the subscription ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Returns `true` until closed or disconnected.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.entry.is_active()
    }

    /// Ends the subscription. See [`WatcherHandle::close`].
    ///
    /// # Errors
    ///
    /// Returns the remote error if the sandbox rejects the `unwatch`.
    pub async fn close(&self) -> Result<()> {
        unsubscribe(&self.connection, &self.registry, self.id).await
    }
}

impl fmt::Debug for PathWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathWatcher")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use crate::protocol::PathEventKind;

    fn single(pattern: &str, options: &WatchOptions) -> Subscription {
        Subscription::Single {
            target: WatchTarget::new(pattern, options).expect("target"),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn push_listener(entry: &Entry, listener: ChangeListener) {
        if let Subscription::Single { listeners, .. } = &entry.subscription {
            listeners.lock().push((ListenerId::next(), listener));
        }
    }

    fn change(path: &str) -> PathWatcherEvent {
        PathWatcherEvent::new(PathEventKind::Change, path)
    }

    #[test]
    fn test_event_reaches_only_its_watcher() {
        let registry = WatchRegistry::new();
        let first = WatcherId::generate();
        let second = WatcherId::generate();
        let first_hits = Arc::new(AtomicUsize::new(0));
        let second_hits = Arc::new(AtomicUsize::new(0));

        for (id, hits) in [(first, &first_hits), (second, &second_hits)] {
            let entry = registry.insert(id, single("src/**", &WatchOptions::default()));
            let hits = Arc::clone(hits);
            push_listener(
                &entry,
                Arc::new(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        registry.handle(&ParsedEvent::Watch {
            watcher_id: first,
            event: change("src/a.ts"),
        });

        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_event_outside_pattern_is_dropped() {
        let registry = WatchRegistry::new();
        let id = WatcherId::generate();
        let hits = Arc::new(AtomicUsize::new(0));
        let entry = registry.insert(id, single("src", &WatchOptions::default()));
        let counter = Arc::clone(&hits);
        push_listener(
            &entry,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.handle(&ParsedEvent::Watch {
            watcher_id: id,
            event: change("lib/a.ts"),
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_removed_watcher_gets_nothing() {
        let registry = WatchRegistry::new();
        let id = WatcherId::generate();
        let hits = Arc::new(AtomicUsize::new(0));
        let entry = registry.insert(id, single(".", &WatchOptions::recursive()));
        let counter = Arc::clone(&hits);
        push_listener(
            &entry,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        registry.handle(&ParsedEvent::Watch {
            watcher_id: id,
            event: change("a.txt"),
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!entry.is_active());
    }

    #[test]
    fn test_batch_is_filtered_in_order() {
        let registry = WatchRegistry::new();
        let id = WatcherId::generate();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.insert(
            id,
            Subscription::Batch {
                filter: PathFilter::new(
                    &WatchPathsOptions::include(["**/*.js"]).exclude(["node_modules/**"]),
                )
                .expect("filter"),
                callback: Arc::new(move |batch: &[PathWatcherEvent]| {
                    sink.lock()
                        .push(batch.iter().map(|e| e.path.clone()).collect::<Vec<_>>());
                }),
            },
        );

        registry.handle(&ParsedEvent::WatchPaths {
            watcher_id: id,
            events: vec![
                change("b.js"),
                change("node_modules/x.js"),
                change("a.css"),
                change("a.js"),
            ],
        });
        // Fully filtered batches are not delivered.
        registry.handle(&ParsedEvent::WatchPaths {
            watcher_id: id,
            events: vec![change("style.css")],
        });

        assert_eq!(*seen.lock(), vec![vec!["b.js".to_string(), "a.js".to_string()]]);
    }

    #[test]
    fn test_disconnect_clears_everything() {
        let registry = WatchRegistry::new();
        let entry = registry.insert(WatcherId::generate(), single("*", &WatchOptions::default()));
        registry.insert(WatcherId::generate(), single("x", &WatchOptions::default()));

        registry.disconnected();
        assert_eq!(registry.len(), 0);
        assert!(!entry.is_active());
    }
}
