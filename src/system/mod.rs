//! Cross-thread plumbing between the operator side and the tracking worker.

pub mod shared_state;

pub use shared_state::SharedState;
