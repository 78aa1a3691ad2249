//! Storage implementations for the `StorageSystem` trait
//!
//! - `LocalSystem`: Direct filesystem access for standalone mode
//! - `MockSystem`: In-memory storage for tests

mod local;
pub mod mock;

pub use local::LocalSystem;
pub use mock::MockSystem;
