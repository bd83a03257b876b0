//! Session lifecycle state

/// Session lifecycle phase
///
/// Phases only move forward: `Created → Active → Stopping → Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Constructed, processing worker not yet running
    Created,
    /// Worker running, accepting chunks
    Active,
    /// Stop requested; worker and dispatchers exit on their next poll tick
    Stopping,
    /// Erased from the registry; permanently invalid
    Removed,
}

impl SessionPhase {
    /// Derive the phase from the session's lifecycle flags
    pub(crate) fn from_flags(started: bool, active: bool, removed: bool) -> Self {
        if removed {
            SessionPhase::Removed
        } else if !active {
            SessionPhase::Stopping
        } else if started {
            SessionPhase::Active
        } else {
            SessionPhase::Created
        }
    }

    /// Check if chunks are still accepted in this phase
    pub fn accepts_chunks(&self) -> bool {
        matches!(self, SessionPhase::Created | SessionPhase::Active)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Created => "created",
            SessionPhase::Active => "active",
            SessionPhase::Stopping => "stopping",
            SessionPhase::Removed => "removed",
        };
        f.write_str(name)
    }
}
