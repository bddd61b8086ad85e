pub mod store;

pub use store::{LockKind, StateStore, StoreSnapshot};
