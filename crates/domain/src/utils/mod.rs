//! Pure helper functions shared by adapters and the mapping pipeline

pub mod text;
pub mod workshop;
