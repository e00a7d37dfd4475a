//! Provider adapter port and registry

pub mod ports;
pub mod registry;

pub use ports::{NativeEvent, ProviderAdapter};
pub use registry::ProviderRegistry;
