//! Adapter Configuration
//!
//! ```
//! use flashmap::config::{EnableKeyspaceEvents, MappingConfig};
//!
//! let config = MappingConfig {
//!     enable_keyspace_events: EnableKeyspaceEvents::OnStartup,
//!     ..Default::default()
//! };
//! assert_eq!(config.phantom_grace.as_secs(), 300);
//! ```

use std::time::Duration;

/// When the expiration listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnableKeyspaceEvents {
    /// Registered when the adapter starts
    OnStartup,
    /// Registered by the first `put` of a record with a time-to-live
    OnDemand,
    /// Never registered; expired records must be reconciled elsewhere
    #[default]
    Off,
}

/// Whether shadow copies of expiring records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowCopy {
    /// Kept while the expiration listener is active
    #[default]
    Default,
    /// Always kept for expiring records
    On,
    /// Never kept, and never read by the listener
    Off,
}

/// Configuration of a [`KeyValueAdapter`](crate::adapter::KeyValueAdapter).
#[derive(Debug, Clone)]
pub struct MappingConfig {
    pub enable_keyspace_events: EnableKeyspaceEvents,

    pub shadow_copy: ShadowCopy,

    /// How much longer a shadow copy lives than its record (default: 300s)
    pub phantom_grace: Duration,

    /// Written to `notify-keyspace-events` when the listener initializes and
    /// the store has no value set. `None` keeps the store settings.
    pub keyspace_notifications_config: Option<String>,

    /// Capacity of the expiration event channel (default: 1024)
    pub event_buffer_size: usize,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            enable_keyspace_events: EnableKeyspaceEvents::default(),
            shadow_copy: ShadowCopy::default(),
            phantom_grace: Duration::from_secs(300),
            keyspace_notifications_config: Some("Ex".to_string()),
            event_buffer_size: 1024,
        }
    }
}
