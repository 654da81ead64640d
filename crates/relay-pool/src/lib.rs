pub mod adaptive;
pub mod classify;
pub mod select;
pub mod state;

pub use adaptive::AdaptiveTimeout;
pub use classify::{Outcome, TransportErrorKind, classify};
pub use select::{Selected, select};
pub use state::{EntryState, EntryStatus, Pool, PoolHandle, PoolSettings};
