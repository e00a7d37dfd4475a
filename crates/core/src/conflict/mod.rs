//! Conflict resolution for bidirectional integrations

pub mod resolver;

pub use resolver::{local_version, ConflictResolver, Resolution};
