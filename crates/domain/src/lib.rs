//! # StudioSync Domain
//!
//! Data model for the calendar and scheduling integration engine.
//!
//! This crate contains:
//! - Integrations, imported events and the class catalog
//! - The error taxonomy and `Result` alias
//! - Configuration structures and their defaults
//! - Text helpers used by adapters and the mapping pipeline
//!
//! ## Architecture
//! - No dependencies on other StudioSync crates
//! - No I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
pub use utils::workshop::{extract_workshop_details, WorkshopDetails};
