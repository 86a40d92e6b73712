//! Status reporter
//!
//! Read path over the session: sweeps live process state, self-heals a stale
//! Recording session whose processes all died, and produces the pure-data
//! report consumed by the transport layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{Session, SessionState};

/// Liveness of one tracked stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub id: String,
    pub alive: bool,
}

/// Session status as reported to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub recording: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub session_id: Option<Uuid>,
    pub streams: Vec<StreamStatus>,
}

/// Sweep stream liveness and reconcile the session state against it.
///
/// When the controller still believes it is recording but every process has
/// died, the session is downgraded to idle as a side effect of the read: the
/// overlay writer is stopped and the dead handles are dropped.
pub(crate) async fn reconcile(session: &mut Session) -> StatusReport {
    let streams: Vec<StreamStatus> = session
        .streams
        .iter_mut()
        .map(|handle| StreamStatus {
            id: handle.id().to_string(),
            alive: handle.is_alive(),
        })
        .collect();

    let any_alive = streams.iter().any(|s| s.alive);
    if session.state == SessionState::Recording && !any_alive {
        tracing::warn!("all capture processes died, downgrading session to idle");
        if let Some(overlay) = session.overlay.take() {
            overlay.stop().await;
        }
        session.reset(SessionState::Idle);
        return StatusReport {
            recording: false,
            started_at: None,
            session_id: None,
            streams: Vec::new(),
        };
    }

    StatusReport {
        recording: session.state == SessionState::Recording,
        started_at: session.started_at,
        session_id: session.session_id,
        streams,
    }
}
