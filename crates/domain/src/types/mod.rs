//! Domain types and models

pub mod catalog;
pub mod event;
pub mod integration;
pub mod mapping;

pub use catalog::{Catalog, CatalogClass, CatalogInstructor, ClassSchedule, ScheduleChange, ScheduleSlot};
pub use event::{CanonicalEvent, ImportedEvent, MigrationStatus, SyncWindow};
pub use integration::{
    AcuitySettings, AppleSettings, CalendarIntegration, CalendarProvider, CalendlySettings,
    ConflictPolicy, GoogleSettings, IntegrationCredentials, MindbodySettings, OutlookSettings,
    ProviderAccount, ProviderSettings, SquareSettings, SyncDirection, SyncStatus,
};
pub use mapping::{ConflictRecord, ErrorDetail, EventMapping, ImportResult, SkippedEvent};
