//! Keyspace Event Listeners
//!
//! ```text
//!  StorageEngine ──publish──> ListenerContainer ──"__keyevent@*__:expired"──> ExpirationListener
//!   (expired key)              (Tokio task)                                     │
//!                                                                                ├─ SREM keyspace id
//!                                                                                ├─ drop index memberships
//!                                                                                └─ broadcast ExpiredEvent
//! ```

pub mod container;
pub mod event;
pub mod expiration;

pub use container::{ListenerContainer, MessageListener};
pub use event::ExpiredEvent;
pub use expiration::{ExpirationListener, EXPIRED_TOPIC};
