//! Mapping of imported events onto the internal class catalog
//!
//! [`scorer`] computes confidence verdicts; [`MappingPipeline`] persists
//! them, creates schedules and carries out review decisions.

pub mod ports;
pub mod scorer;
pub mod service;

pub use scorer::evaluate;
pub use service::MappingPipeline;
