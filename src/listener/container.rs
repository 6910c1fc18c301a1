//! Listener Container
//!
//! Owns the pub/sub subscription to the store and dispatches every message to
//! the listeners whose topic pattern matches its channel.
//!
//! ## Design
//!
//! The container runs as a Tokio task and:
//! 1. Subscribes to the store when started, so nothing published after
//!    [`ListenerContainer::start`] returns is missed
//! 2. Matches each message's channel against the registered glob patterns
//! 3. Calls the matching listeners in registration order
//!
//! Listeners can be added and removed while the container runs.

use crate::error::{LifecycleError, MappingError};
use crate::storage::engine::GlobPattern;
use crate::storage::{KeyValueStore, Message};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn};

/// Receives the messages of the topics it was registered for.
pub trait MessageListener: Send + Sync {
    /// Called on the container task for each message; must not block for long.
    fn on_message(&self, message: &Message, pattern: &str);
}

struct Registration {
    pattern: String,
    glob: GlobPattern,
    listener: Arc<dyn MessageListener>,
}

type Registrations = Arc<RwLock<Vec<Registration>>>;

/// Dispatches store pub/sub messages to [`MessageListener`]s.
pub struct ListenerContainer {
    store: Arc<dyn KeyValueStore>,
    registrations: Registrations,
    /// Sender to signal shutdown, present while running
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl ListenerContainer {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            registrations: Arc::new(RwLock::new(Vec::new())),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Registers `listener` for channels matching the glob `pattern`.
    pub fn add_listener(&self, pattern: &str, listener: Arc<dyn MessageListener>) {
        self.registrations.write().unwrap().push(Registration {
            pattern: pattern.to_string(),
            glob: GlobPattern::new(pattern),
            listener,
        });
        debug!(pattern = pattern, "Message listener registered");
    }

    /// Unregisters every registration of `listener`. Returns true if any existed.
    pub fn remove_listener(&self, listener: &Arc<dyn MessageListener>) -> bool {
        let mut registrations = self.registrations.write().unwrap();
        let before = registrations.len();
        registrations.retain(|registration| !Arc::ptr_eq(&registration.listener, listener));
        before != registrations.len()
    }

    pub fn listener_count(&self) -> usize {
        self.registrations.read().unwrap().len()
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.lock().unwrap().is_some()
    }

    /// Subscribes to the store and starts dispatching.
    ///
    /// Must be called from within a Tokio runtime. Starting a running
    /// container is a no-op.
    pub fn start(&self) -> Result<(), MappingError> {
        let mut shutdown = self.shutdown_tx.lock().unwrap();
        if shutdown.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LifecycleError::NoRuntime)?;
        let messages = self.store.subscribe()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        runtime.spawn(dispatch_loop(
            messages,
            Arc::clone(&self.registrations),
            shutdown_rx,
        ));
        *shutdown = Some(shutdown_tx);

        info!("Listener container started");
        Ok(())
    }

    /// Stops dispatching. Registrations are kept for the next start.
    pub fn stop(&self) {
        if let Some(shutdown_tx) = self.shutdown_tx.lock().unwrap().take() {
            let _ = shutdown_tx.send(true);
            info!("Listener container stopped");
        }
    }
}

impl Drop for ListenerContainer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Calls every listener whose pattern matches the message channel.
fn dispatch(registrations: &Registrations, message: &Message) {
    let matching: Vec<(String, Arc<dyn MessageListener>)> = registrations
        .read()
        .unwrap()
        .iter()
        .filter(|registration| registration.glob.matches_bytes(&message.channel))
        .map(|registration| (registration.pattern.clone(), Arc::clone(&registration.listener)))
        .collect();

    trace!(
        channel = ?message.channel,
        listeners = matching.len(),
        "Dispatching message"
    );

    // Lock released before listeners run so they may register others
    for (pattern, listener) in matching {
        listener.on_message(message, &pattern);
    }
}

/// The main dispatch loop.
async fn dispatch_loop(
    mut messages: broadcast::Receiver<Message>,
    registrations: Registrations,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = messages.recv() => match result {
                Ok(message) => dispatch(&registrations, &message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Listener container lagged, messages dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("Store closed the subscription");
                    return;
                }
            },
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Listener container received shutdown signal");
                    return;
                }
            }
        }
    }
}
