//! # Sync Sessions
//!
//! Every pipeline run gets a session id that is threaded into the
//! append-only change logs, so all audit rows of one pass can be grouped
//! afterwards.

use chrono::Utc;
use uuid::Uuid;

/// Identity of one pipeline run.
#[derive(Debug, Clone)]
pub struct SyncSession {
    /// UUID v4, recorded on every change-log row of the run.
    pub id: String,

    /// Unix seconds at session start; also the `last_sync` stamp the run
    /// writes on every row it sees.
    pub started_at: i64,
}

impl SyncSession {
    pub fn begin() -> Self {
        SyncSession {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_are_distinct() {
        let a = SyncSession::begin();
        let b = SyncSession::begin();
        assert_ne!(a.id, b.id);
        assert!(a.started_at > 0);
    }
}
