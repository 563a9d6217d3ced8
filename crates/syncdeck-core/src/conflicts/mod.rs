//! Conflict reconciliation controller.
//!
//! Each session name moves through
//! `clean -> conflicted -> awaiting-decision -> resolving -> clean`.
//! At most one session is awaiting a decision or resolving at a time;
//! other conflicted sessions wait in a FIFO queue.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::daemon::{CreateSpec, DaemonClient};
use crate::error::{Error, Result};
use crate::hub::{Hub, HubEvent};
use crate::models::{Conflict, Session, SessionAction, SessionRef, Side};

/// Where a session sits in the reconciliation state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPhase {
    #[default]
    Clean,
    /// Conflicts reported, queued behind the active prompt
    Conflicted,
    AwaitingDecision,
    Resolving,
}

/// Conflicts surfaced to the operator for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPrompt {
    pub session_name: String,
    pub conflicts: Vec<Conflict>,
}

/// Active prompt plus the sessions queued behind it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConflicts {
    pub active: Option<ConflictPrompt>,
    pub resolving: bool,
    pub queued: Vec<String>,
}

#[derive(Debug, Default)]
struct ControllerState {
    phases: HashMap<String, ConflictPhase>,
    conflicts: HashMap<String, Vec<Conflict>>,
    queue: VecDeque<String>,
    active: Option<String>,
    /// Bumped whenever a session starts resolving or is cleared; daemon
    /// answers requested under an older generation are dropped.
    generations: HashMap<String, u64>,
}

impl ControllerState {
    fn phase(&self, session_name: &str) -> ConflictPhase {
        self.phases.get(session_name).copied().unwrap_or_default()
    }

    fn generation(&self, session_name: &str) -> u64 {
        self.generations.get(session_name).copied().unwrap_or_default()
    }

    fn bump(&mut self, session_name: &str) {
        *self.generations.entry(session_name.to_string()).or_default() += 1;
    }

    /// Apply a listing requested at `generation`, unless the session moved on.
    fn observe_at(
        &mut self,
        session_name: &str,
        generation: u64,
        conflicts: Vec<Conflict>,
    ) -> Option<HubEvent> {
        if self.generation(session_name) != generation {
            tracing::debug!(session = %session_name, "Dropping conflict listing from before a state change");
            return None;
        }
        self.observe(session_name, conflicts)
    }

    fn clear(&mut self, session_name: &str) {
        self.bump(session_name);
        self.phases.remove(session_name);
        self.conflicts.remove(session_name);
        self.queue.retain(|queued| queued != session_name);
        if self.active.as_deref() == Some(session_name) {
            self.active = None;
        }
    }

    /// Move the next queued session into `awaiting-decision` when nothing is active.
    fn promote(&mut self) -> Option<HubEvent> {
        if self.active.is_some() {
            return None;
        }
        let session_name = self.queue.pop_front()?;
        self.phases
            .insert(session_name.clone(), ConflictPhase::AwaitingDecision);
        self.active = Some(session_name.clone());
        let conflicts = self
            .conflicts
            .get(&session_name)
            .cloned()
            .unwrap_or_default();
        Some(HubEvent::ConflictPrompt {
            session_name,
            conflicts,
        })
    }

    fn observe(&mut self, session_name: &str, conflicts: Vec<Conflict>) -> Option<HubEvent> {
        let phase = self.phase(session_name);
        match (phase, conflicts.is_empty()) {
            (ConflictPhase::Resolving, _) => {}
            (ConflictPhase::Clean, true) => {}
            (ConflictPhase::Clean, false) => {
                self.phases
                    .insert(session_name.to_string(), ConflictPhase::Conflicted);
                self.conflicts.insert(session_name.to_string(), conflicts);
                self.queue.push_back(session_name.to_string());
            }
            (ConflictPhase::Conflicted | ConflictPhase::AwaitingDecision, false) => {
                self.conflicts.insert(session_name.to_string(), conflicts);
            }
            (ConflictPhase::Conflicted | ConflictPhase::AwaitingDecision, true) => {
                self.clear(session_name);
            }
        }
        self.promote()
    }
}

/// Owns the reconciliation state for every session.
pub struct ConflictController {
    daemon: Arc<dyn DaemonClient>,
    hub: Hub,
    state: Mutex<ControllerState>,
}

impl ConflictController {
    pub fn new(daemon: Arc<dyn DaemonClient>, hub: Hub) -> Self {
        Self {
            daemon,
            hub,
            state: Mutex::new(ControllerState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn publish(&self, event: Option<HubEvent>) {
        if let Some(event) = event {
            if let HubEvent::ConflictPrompt { session_name, conflicts } = &event {
                tracing::info!(
                    session = %session_name,
                    count = conflicts.len(),
                    "Conflicts awaiting a decision"
                );
            }
            self.hub.publish(event);
        }
    }

    #[cfg(test)]
    fn phase(&self, session_name: &str) -> ConflictPhase {
        self.state().phase(session_name)
    }

    #[cfg(test)]
    fn observe(&self, session_name: &str, conflicts: Vec<Conflict>) {
        let event = self.state().observe(session_name, conflicts);
        self.publish(event);
    }

    /// Current conflicts of one session, fed into the state machine.
    pub async fn query(&self, session_name: &str) -> Result<Vec<Conflict>> {
        let generation = self.state().generation(session_name);
        let conflicts = self.daemon.conflicts(session_name).await?;
        let event = self
            .state()
            .observe_at(session_name, generation, conflicts.clone());
        self.publish(event);
        Ok(conflicts)
    }

    /// Drop all state for a session, e.g. after it was terminated.
    pub fn forget(&self, session_name: &str) {
        let event = {
            let mut state = self.state();
            if state.phase(session_name) == ConflictPhase::Resolving {
                return;
            }
            state.clear(session_name);
            state.promote()
        };
        self.publish(event);
    }

    /// Update the state machine from one conflict listing of every session.
    ///
    /// Sessions awaiting a decision or resolving are left alone. Tracked
    /// sessions missing from `sessions` are forgotten.
    pub async fn scan(&self, sessions: &[Session]) {
        let requested: Vec<(String, u64)> = {
            let state = self.state();
            sessions
                .iter()
                .map(|session| session.name.as_str())
                .filter(|name| {
                    matches!(
                        state.phase(name),
                        ConflictPhase::Clean | ConflictPhase::Conflicted
                    )
                })
                .map(|name| (name.to_string(), state.generation(name)))
                .collect()
        };

        let mut reported = if requested.is_empty() {
            HashMap::new()
        } else {
            match self.daemon.all_conflicts().await {
                Ok(reported) => reported,
                Err(error) => {
                    tracing::warn!("Conflict query failed: {error}");
                    HashMap::new()
                }
            }
        };

        let events: Vec<HubEvent> = {
            let mut state = self.state();
            let vanished: Vec<String> = state
                .phases
                .iter()
                .filter(|(name, phase)| {
                    **phase != ConflictPhase::Resolving
                        && !sessions.iter().any(|session| &session.name == *name)
                })
                .map(|(name, _)| name.clone())
                .collect();
            for name in vanished {
                tracing::debug!(session = %name, "Forgetting conflicts of vanished session");
                state.clear(&name);
            }

            // Queue order follows listing order.
            let mut events: Vec<HubEvent> = requested
                .into_iter()
                .filter_map(|(name, generation)| {
                    let conflicts = reported.remove(&name)?;
                    state.observe_at(&name, generation, conflicts)
                })
                .collect();
            events.extend(state.promote());
            events
        };
        for event in events {
            self.publish(Some(event));
        }
    }

    /// The prompt currently awaiting a decision and the queue behind it.
    pub fn pending(&self) -> PendingConflicts {
        let state = self.state();
        let active = state.active.as_ref().map(|name| ConflictPrompt {
            session_name: name.clone(),
            conflicts: state.conflicts.get(name).cloned().unwrap_or_default(),
        });
        PendingConflicts {
            resolving: state
                .active
                .as_deref()
                .is_some_and(|name| state.phase(name) == ConflictPhase::Resolving),
            active,
            queued: state.queue.iter().cloned().collect(),
        }
    }

    /// Resolve a session's conflicts by recreating it as a one-way replica
    /// from `winner` to the other side.
    ///
    /// Allowed for the session currently awaiting a decision, or for any
    /// session while no prompt is active. On failure the session returns to
    /// `conflicted` at the head of the queue.
    pub async fn resolve(&self, session_name: &str, winner: Side) -> Result<SessionRef> {
        let previous = self.begin(session_name)?;
        tracing::info!(session = %session_name, winner = %winner, "Resolving conflicts");

        match self.recreate(session_name, winner).await {
            Ok(created) => {
                let event = {
                    let mut state = self.state();
                    state.clear(session_name);
                    state.promote()
                };
                tracing::info!(session = %session_name, winner = %winner, "Conflicts resolved");
                self.hub.publish(HubEvent::ConflictResolved {
                    session_name: session_name.to_string(),
                    winner,
                });
                self.publish(event);
                Ok(created)
            }
            Err(error) => {
                tracing::warn!(session = %session_name, "Conflict resolution failed: {error}");
                let event = {
                    let mut state = self.state();
                    if state.active.as_deref() == Some(session_name) {
                        state.active = None;
                    }
                    if previous == ConflictPhase::Clean {
                        state.clear(session_name);
                    } else {
                        state
                            .phases
                            .insert(session_name.to_string(), ConflictPhase::Conflicted);
                        state.queue.push_front(session_name.to_string());
                    }
                    state.promote()
                };
                self.publish(event);
                Err(error)
            }
        }
    }

    fn begin(&self, session_name: &str) -> Result<ConflictPhase> {
        let mut state = self.state();
        let phase = state.phase(session_name);
        if phase == ConflictPhase::Resolving {
            return Err(Error::InvalidInput(format!(
                "conflicts of '{session_name}' are already being resolved"
            )));
        }
        match state.active.as_deref() {
            Some(active) if active != session_name => {
                return Err(Error::InvalidInput(format!(
                    "conflicts of '{active}' must be resolved first"
                )));
            }
            _ => {}
        }
        state.queue.retain(|queued| queued != session_name);
        state.bump(session_name);
        state
            .phases
            .insert(session_name.to_string(), ConflictPhase::Resolving);
        state.active = Some(session_name.to_string());
        Ok(phase)
    }

    async fn recreate(&self, session_name: &str, winner: Side) -> Result<SessionRef> {
        let sessions = self.daemon.list().await?;
        let session = sessions
            .into_iter()
            .find(|session| session.name == session_name)
            .ok_or_else(|| Error::NotFound(format!("session '{session_name}'")))?;

        self.daemon
            .action(session_name, SessionAction::Terminate)
            .await?;
        let spec = CreateSpec::replica(
            session_name,
            winner,
            &session.alpha.url,
            &session.beta.url,
        );
        self.daemon.create(&spec).await
    }
}
