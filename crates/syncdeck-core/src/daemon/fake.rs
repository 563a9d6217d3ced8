//! Scripted in-memory daemon for tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{is_remote_url, CreateSpec, DaemonClient};
use crate::error::{Error, Result};
use crate::models::{
    Conflict, DaemonStatus, Endpoint, Session, SessionAction, SessionRef, SessionStatus,
};

#[derive(Default)]
struct FakeState {
    sessions: Vec<Session>,
    conflicts: HashMap<String, Vec<Conflict>>,
    calls: Vec<String>,
    next_id: usize,
    unreachable: bool,
    fail_create: Option<String>,
    action_delay: Duration,
    action_timeouts: usize,
    in_flight: HashMap<String, usize>,
    peak_in_flight: HashMap<String, usize>,
    listing_gate: Option<Arc<Notify>>,
}

/// Records every invocation and answers from scripted state.
#[derive(Default)]
pub struct FakeDaemon {
    state: Mutex<FakeState>,
}

pub fn session(name: &str, status: SessionStatus) -> Session {
    Session {
        identifier: format!("sync_{name}"),
        name: name.to_string(),
        status,
        alpha: Endpoint {
            url: format!("/local/{name}"),
            connected: true,
        },
        beta: Endpoint {
            url: format!("u@mutagen-{name}:/remote/{name}"),
            connected: true,
        },
    }
}

pub fn conflict(path: &str) -> Conflict {
    Conflict {
        path: path.to_string(),
        alpha_digest: Some("aaaaaaaa".to_string()),
        beta_digest: Some("bbbbbbbb".to_string()),
    }
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_sessions(&self, sessions: Vec<Session>) {
        self.with_state(|state| state.sessions = sessions);
    }

    pub fn set_status(&self, name: &str, status: SessionStatus) {
        self.with_state(|state| {
            for session in state.sessions.iter_mut().filter(|s| s.name == name) {
                session.status = status;
            }
        });
    }

    pub fn set_conflicts(&self, name: &str, conflicts: Vec<Conflict>) {
        self.with_state(|state| {
            state.conflicts.insert(name.to_string(), conflicts);
        });
    }

    /// Make listing fail as if the daemon were down, until `start` is called.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.with_state(|state| state.unreachable = unreachable);
    }

    pub fn fail_create(&self, message: &str) {
        self.with_state(|state| state.fail_create = Some(message.to_string()));
    }

    /// Hold every action this long before applying it.
    pub fn set_action_delay(&self, delay: Duration) {
        self.with_state(|state| state.action_delay = delay);
    }

    /// Fail the next `count` actions as if the daemon hung.
    pub fn time_out_actions(&self, count: usize) {
        self.with_state(|state| state.action_timeouts = count);
    }

    /// Most actions ever running at once for one session.
    pub fn peak_in_flight(&self, name: &str) -> usize {
        self.with_state(|state| state.peak_in_flight.get(name).copied().unwrap_or_default())
    }

    /// Make `all_conflicts` answer from the state at call time, but only
    /// return once the gate is notified.
    pub fn gate_listing(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.with_state(|state| state.listing_gate = Some(Arc::clone(&gate)));
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|state| state.calls.clone())
    }
}

#[async_trait]
impl DaemonClient for FakeDaemon {
    async fn create(&self, spec: &CreateSpec) -> Result<SessionRef> {
        self.with_state(|state| {
            state.calls.push(format!(
                "create {} {} {} {}",
                spec.name, spec.mode, spec.alpha, spec.beta
            ));
            if let Some(message) = state.fail_create.take() {
                return Err(Error::Daemon(message));
            }
            state.next_id += 1;
            let identifier = format!("sync_new{}", state.next_id);
            state.conflicts.remove(&spec.name);
            // Listings report the local endpoint as alpha.
            let (local, remote) = if is_remote_url(&spec.alpha) {
                (&spec.beta, &spec.alpha)
            } else {
                (&spec.alpha, &spec.beta)
            };
            state.sessions.push(Session {
                identifier: identifier.clone(),
                name: spec.name.clone(),
                status: SessionStatus::Watching,
                alpha: Endpoint {
                    url: local.clone(),
                    connected: true,
                },
                beta: Endpoint {
                    url: remote.clone(),
                    connected: true,
                },
            });
            Ok(SessionRef {
                name: spec.name.clone(),
                identifier: Some(identifier.clone()),
                output: format!("Created session {identifier}\n"),
            })
        })
    }

    async fn list(&self) -> Result<Vec<Session>> {
        self.with_state(|state| {
            state.calls.push("list".to_string());
            if state.unreachable {
                return Err(Error::DaemonUnreachable("unable to connect to daemon".into()));
            }
            Ok(state.sessions.clone())
        })
    }

    async fn action(&self, session_name: &str, action: SessionAction) -> Result<()> {
        let delay = self.with_state(|state| {
            state.calls.push(format!("{action} {session_name}"));
            let running = state.in_flight.entry(session_name.to_string()).or_default();
            *running += 1;
            let running = *running;
            let peak = state
                .peak_in_flight
                .entry(session_name.to_string())
                .or_default();
            *peak = (*peak).max(running);
            state.action_delay
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.with_state(|state| {
            if let Some(running) = state.in_flight.get_mut(session_name) {
                *running -= 1;
            }
            if state.action_timeouts > 0 {
                state.action_timeouts -= 1;
                return Err(Error::DaemonTimeout {
                    command: format!("mutagen sync {action} {session_name}"),
                    seconds: 60,
                });
            }
            let index = state
                .sessions
                .iter()
                .position(|s| s.name == session_name)
                .ok_or_else(|| Error::NotFound(format!("session {session_name}")))?;
            match action {
                SessionAction::Terminate => {
                    state.sessions.remove(index);
                }
                SessionAction::Pause => state.sessions[index].status = SessionStatus::Paused,
                SessionAction::Resume => state.sessions[index].status = SessionStatus::Watching,
                SessionAction::Flush => {}
            }
            Ok(())
        })
    }

    async fn conflicts(&self, session_name: &str) -> Result<Vec<Conflict>> {
        self.with_state(|state| {
            state.calls.push(format!("conflicts {session_name}"));
            if !state.sessions.iter().any(|s| s.name == session_name) {
                return Err(Error::NotFound(format!("session {session_name}")));
            }
            Ok(state
                .conflicts
                .get(session_name)
                .cloned()
                .unwrap_or_default())
        })
    }

    async fn all_conflicts(&self) -> Result<HashMap<String, Vec<Conflict>>> {
        let (reported, gate) = self.with_state(|state| {
            state.calls.push("all-conflicts".to_string());
            if state.unreachable {
                return Err(Error::DaemonUnreachable("unable to connect to daemon".into()));
            }
            let reported: HashMap<String, Vec<Conflict>> = state
                .sessions
                .iter()
                .map(|session| {
                    let conflicts = state.conflicts.get(&session.name).cloned().unwrap_or_default();
                    (session.name.clone(), conflicts)
                })
                .collect();
            Ok((reported, state.listing_gate.take()))
        })?;
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(reported)
    }

    async fn status(&self) -> DaemonStatus {
        self.with_state(|state| {
            if state.unreachable {
                DaemonStatus::Stopped
            } else {
                DaemonStatus::Running
            }
        })
    }

    async fn start(&self) -> Result<()> {
        self.with_state(|state| {
            state.calls.push("start".to_string());
            state.unreachable = false;
        });
        Ok(())
    }

    fn executable(&self) -> Option<&Path> {
        Some(Path::new("/fake/mutagen"))
    }
}
