//! Bidirectional conflict detection and resolution
//!
//! A conflict exists when the local schedule linked to an event and the
//! provider's copy of that event both changed since the last successful
//! sync. The integration's policy decides the winner.

use chrono::{DateTime, Utc};
use studiosync_domain::{CanonicalEvent, ClassSchedule, ConflictPolicy, ConflictRecord, ImportedEvent};

/// What the orchestrator does with a conflicting event.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Overwrite the provider's copy with the local version.
    PushLocal(CanonicalEvent),
    /// Store the remote version and map it again.
    AcceptRemote,
    /// Leave both sides untouched until a human decides.
    Review(ConflictRecord),
}

#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
}

impl ConflictResolver {
    pub const fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// Both sides changed since `last_sync_at`.
    ///
    /// There is no conflict before the first successful sync.
    pub fn is_conflict(
        stored: &ImportedEvent,
        schedule: &ClassSchedule,
        incoming: &CanonicalEvent,
        last_sync_at: Option<DateTime<Utc>>,
    ) -> bool {
        let Some(last_sync_at) = last_sync_at else {
            return false;
        };
        schedule.updated_at > last_sync_at && stored.content_hash != incoming.content_hash()
    }

    pub fn resolve(
        &self,
        stored: &ImportedEvent,
        schedule: &ClassSchedule,
        incoming: &CanonicalEvent,
    ) -> Resolution {
        match self.policy {
            ConflictPolicy::LocalWins => Resolution::PushLocal(local_version(stored, schedule)),
            ConflictPolicy::RemoteWins => Resolution::AcceptRemote,
            ConflictPolicy::ManualReview => Resolution::Review(ConflictRecord {
                event_id: stored.id.clone(),
                external_id: stored.external_id.clone(),
                schedule_id: schedule.id.clone(),
                local_updated_at: schedule.updated_at,
                remote_updated_at: incoming.remote_updated_at,
            }),
        }
    }
}

/// The stored event with the local schedule's times and location.
pub fn local_version(stored: &ImportedEvent, schedule: &ClassSchedule) -> CanonicalEvent {
    let mut event = stored.to_canonical();
    event.start_time = schedule.start_time;
    event.end_time = schedule.end_time;
    if schedule.location.is_some() {
        event.location = schedule.location.clone();
    }
    event
}
