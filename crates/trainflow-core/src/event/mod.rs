//! Run progress events.

pub mod bus;

pub use bus::{EventBus, RunSubscription};
