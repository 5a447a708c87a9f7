//! The Domain Store, Session Registry & PTY Supervisor, and Subscription
//! Multiplexer (§4.3-§4.5): the three stateful components the Control-Plane
//! Server drives. Kept independent of any network transport so they can be
//! unit-tested as plain async/sync library code.

pub mod multiplexer;
pub mod session;
pub mod status_reducer;
pub mod store;

pub use multiplexer::{Subscription, SubscriptionMultiplexer};
pub use session::registry::SessionRegistry;
pub use status_reducer::{NoopStatusReducer, StatusReducer, TelemetrySummary};
pub use store::{DomainStore, StoreOp};
