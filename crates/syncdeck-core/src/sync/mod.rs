//! Session state synchronizer: polls the daemon, diffs against the last
//! snapshot and publishes one event per changed session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::daemon::DaemonClient;
use crate::error::Result;
use crate::hub::{ChangeKind, Hub, HubEvent};
use crate::models::{DaemonStatus, Session};

/// Sessions keyed by daemon identifier
pub type Snapshot = HashMap<String, Session>;

/// One session-level difference between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionChange {
    pub kind: ChangeKind,
    pub session: Session,
}

/// Compare two snapshots by identifier.
///
/// Changes are ordered by session name, then identifier.
pub fn diff_snapshots(previous: &Snapshot, next: &Snapshot) -> Vec<SessionChange> {
    let mut changes: Vec<SessionChange> = next
        .iter()
        .filter_map(|(identifier, session)| match previous.get(identifier) {
            None => Some(SessionChange {
                kind: ChangeKind::Added,
                session: session.clone(),
            }),
            Some(old) if session.differs_from(old) => Some(SessionChange {
                kind: ChangeKind::Changed,
                session: session.clone(),
            }),
            Some(_) => None,
        })
        .collect();

    changes.extend(
        previous
            .iter()
            .filter(|(identifier, _)| !next.contains_key(*identifier))
            .map(|(_, session)| SessionChange {
                kind: ChangeKind::Removed,
                session: session.clone(),
            }),
    );

    changes.sort_by(|a, b| {
        a.session
            .name
            .cmp(&b.session.name)
            .then_with(|| a.session.identifier.cmp(&b.session.identifier))
    });
    changes
}

/// Owns the current session snapshot.
pub struct SessionSynchronizer {
    daemon: Arc<dyn DaemonClient>,
    hub: Hub,
    snapshot: RwLock<Arc<Snapshot>>,
    poll_guard: tokio::sync::Mutex<()>,
    last_daemon_status: Mutex<Option<DaemonStatus>>,
}

impl SessionSynchronizer {
    pub fn new(daemon: Arc<dyn DaemonClient>, hub: Hub) -> Self {
        Self {
            daemon,
            hub,
            snapshot: RwLock::new(Arc::new(Snapshot::new())),
            poll_guard: tokio::sync::Mutex::new(()),
            last_daemon_status: Mutex::new(None),
        }
    }

    /// Last successfully polled snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        match self.snapshot.read() {
            Ok(snapshot) => Arc::clone(&snapshot),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Snapshot as a list sorted by name
    pub fn sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.snapshot().values().cloned().collect();
        sessions.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.identifier.cmp(&b.identifier)));
        sessions
    }

    /// Timer-driven poll. Returns `None` when a poll is already running.
    pub async fn tick(&self) -> Result<Option<Vec<SessionChange>>> {
        let Ok(_guard) = self.poll_guard.try_lock() else {
            tracing::debug!("Previous poll still running; skipping tick");
            return Ok(None);
        };
        self.poll().await.map(Some)
    }

    /// Caller-initiated poll; waits for any running poll to finish first.
    pub async fn refresh(&self) -> Result<Vec<SessionChange>> {
        let _guard = self.poll_guard.lock().await;
        self.poll().await
    }

    async fn poll(&self) -> Result<Vec<SessionChange>> {
        let sessions = match self.daemon.list().await {
            Ok(sessions) => sessions,
            Err(error) => {
                tracing::warn!("Session poll failed; keeping previous snapshot: {error}");
                let status = self.daemon.status().await;
                self.note_daemon_status(status);
                return Err(error);
            }
        };
        self.note_daemon_status(DaemonStatus::Running);

        let next: Snapshot = sessions
            .into_iter()
            .map(|session| (session.identifier.clone(), session))
            .collect();
        let next = Arc::new(next);

        let previous = {
            let mut slot = match self.snapshot.write() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::replace(&mut *slot, Arc::clone(&next))
        };

        let changes = diff_snapshots(&previous, &next);
        for change in &changes {
            tracing::debug!(
                session = %change.session.name,
                kind = ?change.kind,
                status = %change.session.status,
                "Session changed"
            );
            self.hub.publish(HubEvent::SessionChanged {
                change: change.kind,
                session: change.session.clone(),
            });
        }
        Ok(changes)
    }

    /// Record the daemon's status, publishing an event when it changed.
    /// Returns whether it changed.
    pub fn note_daemon_status(&self, status: DaemonStatus) -> bool {
        let mut last = match self.last_daemon_status.lock() {
            Ok(last) => last,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *last == Some(status) {
            return false;
        }
        *last = Some(status);
        drop(last);

        tracing::info!(status = %status, "Daemon status changed");
        self.hub.publish(HubEvent::DaemonStatus { status });
        true
    }
}
