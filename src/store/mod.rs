//! Reconciling state store
//!
//! The consumer side of reconciliation: a store that keeps the last emitted
//! state and only notifies subscribers when a snapshot actually changes it.

mod state;

pub use state::{Listener, StateStore, SubscriptionId};
