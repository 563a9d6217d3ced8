//! Engine facade wiring the connection store, SSH configurator, daemon
//! adapter, synchronizer, conflict controller and broadcast hub.
//!
//! Front ends (HTTP API, CLI) talk only to [`Engine`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::config::EngineConfig;
use crate::conflicts::{ConflictController, PendingConflicts};
use crate::daemon::preseed::run_preseed;
use crate::daemon::{locate_mutagen, CreateSpec, DaemonClient, MutagenCli, INSTALL_URL};
use crate::error::Result;
use crate::export::{ExportBundle, ImportBundle};
use crate::hub::{Hub, HubEvent, DEFAULT_CAPACITY};
use crate::locks::SessionLocks;
use crate::models::{
    Conflict, Connection, ConnectionConfig, ConnectionId, DaemonStatus, InitialSyncDirection,
    ResolutionDecision, Session, SessionAction, SessionRef,
};
use crate::services::{ConnectionStore, ImportReport};
use crate::ssh::{default_ssh_dir, discover_keys, SshConfigurator, SshKey};
use crate::sync::SessionSynchronizer;

/// Whether the daemon executable was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub installed: bool,
    pub path: Option<String>,
    pub install_url: String,
}

/// What quick-connect did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum QuickConnect {
    /// An existing session was resumed
    Resumed { session_name: String },
    Created { session: SessionRef },
}

pub struct Engine {
    config: EngineConfig,
    store: ConnectionStore,
    ssh: SshConfigurator,
    daemon: Arc<dyn DaemonClient>,
    hub: Hub,
    sync: SessionSynchronizer,
    conflicts: ConflictController,
    locks: SessionLocks,
}

impl Engine {
    /// Open the connection database and locate the daemon executable.
    pub async fn open(config: EngineConfig) -> Result<Self> {
        let store = ConnectionStore::open_path(&config.db_path).await?;
        let daemon = MutagenCli::new(
            locate_mutagen(config.mutagen_bin.clone()),
            config.command_timeout,
            config.create_timeout,
        );
        let ssh = SshConfigurator::new(&config.ssh_config_path, config.ssh_agent);
        Ok(Self::with_parts(config, store, Arc::new(daemon), ssh))
    }

    pub fn with_parts(
        config: EngineConfig,
        store: ConnectionStore,
        daemon: Arc<dyn DaemonClient>,
        ssh: SshConfigurator,
    ) -> Self {
        let hub = Hub::new(DEFAULT_CAPACITY);
        Self {
            sync: SessionSynchronizer::new(Arc::clone(&daemon), hub.clone()),
            conflicts: ConflictController::new(Arc::clone(&daemon), hub.clone()),
            config,
            store,
            ssh,
            daemon,
            hub,
            locks: SessionLocks::new(),
        }
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Push channel; events published after this call are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.hub.subscribe()
    }

    // -- connections --------------------------------------------------------

    pub async fn list_connections(&self) -> Result<Vec<Connection>> {
        self.store.list().await
    }

    pub async fn get_connection(&self, id: &ConnectionId) -> Result<Connection> {
        self.store.get(id).await
    }

    pub async fn create_connection(&self, config: ConnectionConfig) -> Result<Connection> {
        self.store.create(config).await
    }

    pub async fn update_connection(
        &self,
        id: &ConnectionId,
        config: ConnectionConfig,
    ) -> Result<Connection> {
        self.store.update(id, config).await
    }

    /// Delete the record and its SSH alias block.
    pub async fn delete_connection(&self, id: &ConnectionId) -> Result<Connection> {
        let connection = self.store.delete(id).await?;
        if let Err(error) = self.ssh.remove_access(&connection).await {
            tracing::warn!(connection = %connection.name, "Could not remove SSH alias: {error}");
        }
        Ok(connection)
    }

    pub async fn duplicate_connection(&self, id: &ConnectionId) -> Result<Connection> {
        self.store.duplicate(id).await
    }

    pub async fn import_connections(&self, bundle: &ImportBundle) -> Result<ImportReport> {
        self.store.import(bundle).await
    }

    pub async fn export_connections(&self) -> Result<ExportBundle> {
        self.store.export().await
    }

    /// Resume the connection's session when the daemon has one, otherwise
    /// create it with the stored mode.
    pub async fn quick_connect(&self, id: &ConnectionId) -> Result<QuickConnect> {
        let connection = self.store.get(id).await?;
        self.store.touch_last_used(id).await?;

        let session_name = connection.session_name();
        let exists = self
            .list_sessions()
            .await?
            .iter()
            .any(|session| session.name == session_name);

        if exists {
            self.session_action(&session_name, SessionAction::Resume)
                .await?;
            return Ok(QuickConnect::Resumed { session_name });
        }
        let session = self
            .start_session(&connection, InitialSyncDirection::Skip)
            .await?;
        Ok(QuickConnect::Created { session })
    }

    // -- sessions -----------------------------------------------------------

    /// Save the connection (by name) and create its session.
    pub async fn create_session(
        &self,
        config: ConnectionConfig,
        initial_sync: InitialSyncDirection,
    ) -> Result<SessionRef> {
        let connection = self.store.upsert_by_name(config).await?;
        self.store.touch_last_used(&connection.id).await?;
        self.start_session(&connection, initial_sync).await
    }

    async fn start_session(
        &self,
        connection: &Connection,
        initial_sync: InitialSyncDirection,
    ) -> Result<SessionRef> {
        let session_name = connection.session_name();
        let created = {
            let _guard = self.locks.acquire(&session_name).await;
            let alias = self.ssh.ensure_access(connection).await?;
            run_preseed(connection, initial_sync, self.config.preseed_timeout).await?;
            tokio::fs::create_dir_all(&connection.local_path).await?;

            let spec = CreateSpec::for_connection(connection, &alias, connection.sync_mode);
            self.daemon.create(&spec).await?
        };
        self.refresh_quietly().await;
        Ok(created)
    }

    /// Poll the daemon now and return the fresh snapshot.
    ///
    /// With autostart enabled, a stopped daemon is started once and the
    /// listing retried.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        match self.sync.refresh().await {
            Ok(_) => Ok(self.sync.sessions()),
            Err(error)
                if error.is_unreachable()
                    && self.config.autostart_daemon
                    && self.daemon.executable().is_some() =>
            {
                tracing::info!("Daemon unreachable; starting it");
                self.start_daemon().await?;
                self.sync.refresh().await?;
                Ok(self.sync.sessions())
            }
            Err(error) => Err(error),
        }
    }

    /// Last polled snapshot without querying the daemon
    pub fn cached_sessions(&self) -> Vec<Session> {
        self.sync.sessions()
    }

    pub async fn session_action(&self, session_name: &str, action: SessionAction) -> Result<()> {
        {
            let _guard = self.locks.acquire(session_name).await;
            self.daemon.action(session_name, action).await?;
            if action == SessionAction::Terminate {
                self.conflicts.forget(session_name);
            }
        }
        self.refresh_quietly().await;
        Ok(())
    }

    async fn refresh_quietly(&self) {
        if let Err(error) = self.sync.refresh().await {
            tracing::debug!("Refresh after session change failed: {error}");
        }
    }

    // -- conflicts ----------------------------------------------------------

    /// Current conflicts of one session; non-empty results enter the
    /// reconciliation queue.
    pub async fn conflicts(&self, session_name: &str) -> Result<Vec<Conflict>> {
        self.conflicts.query(session_name).await
    }

    pub async fn resolve_conflict(&self, decision: &ResolutionDecision) -> Result<SessionRef> {
        let created = {
            let _guard = self.locks.acquire(&decision.session_name).await;
            self.conflicts
                .resolve(&decision.session_name, decision.winner)
                .await?
        };
        self.refresh_quietly().await;
        Ok(created)
    }

    pub fn pending_conflicts(&self) -> PendingConflicts {
        self.conflicts.pending()
    }

    // -- daemon -------------------------------------------------------------

    pub async fn daemon_status(&self) -> DaemonStatus {
        let status = self.daemon.status().await;
        self.sync.note_daemon_status(status);
        status
    }

    pub async fn start_daemon(&self) -> Result<()> {
        self.daemon.start().await?;
        self.daemon_status().await;
        Ok(())
    }

    pub fn installation(&self) -> Installation {
        let path = self.daemon.executable().map(|p| p.display().to_string());
        Installation {
            installed: path.is_some(),
            path,
            install_url: INSTALL_URL.to_string(),
        }
    }

    pub fn ssh_keys(&self) -> Vec<SshKey> {
        default_ssh_dir()
            .map(|dir| discover_keys(&dir))
            .unwrap_or_default()
    }

    // -- background polling -------------------------------------------------

    /// One timer pass: poll unless a poll is running, then scan the fresh
    /// snapshot for conflicts.
    pub async fn poll_once(&self) {
        match self.sync.tick().await {
            Ok(Some(_)) => {
                let sessions = self.sync.sessions();
                self.conflicts.scan(&sessions).await;
            }
            Ok(None) => {}
            Err(error) => tracing::debug!("Background poll failed: {error}"),
        }
    }

    /// Poll every `interval` until the returned handle is aborted.
    ///
    /// Each pass runs on its own task so a hung daemon call never delays
    /// the timer; overlapping passes are skipped by the synchronizer.
    pub fn spawn_background(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut passes = JoinSet::new();
            tracing::info!(interval_ms = interval.as_millis(), "Session poller started");
            loop {
                ticker.tick().await;
                while let Some(finished) = passes.try_join_next() {
                    if let Err(error) = finished {
                        tracing::warn!("Poll task failed: {error}");
                    }
                }
                let engine = Arc::clone(&engine);
                passes.spawn(async move { engine.poll_once().await });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::fake::{conflict, session, FakeDaemon};
    use crate::error::Error;
    use crate::hub::ChangeKind;
    use crate::models::{Side, SessionStatus, SyncMode};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    struct Fixture {
        engine: Engine,
        fake: Arc<FakeDaemon>,
        dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeDaemon::new());
        let store = ConnectionStore::open_in_memory().await.unwrap();
        let ssh = SshConfigurator::new(dir.path().join("ssh").join("config"), false);
        let config = EngineConfig {
            db_path: dir.path().join("unused.db"),
            ssh_config_path: dir.path().join("ssh").join("config"),
            ..EngineConfig::default()
        };
        let engine = Engine::with_parts(config, store, fake.clone(), ssh);
        Fixture { engine, fake, dir }
    }

    fn connection_config(name: &str, local: &std::path::Path) -> ConnectionConfig {
        ConnectionConfig {
            name: name.to_string(),
            host: "h".to_string(),
            port: 2222,
            username: "u".to_string(),
            remote_path: "/r".to_string(),
            local_path: local.display().to_string(),
            ssh_key_path: None,
            sync_mode: SyncMode::TwoWaySafe,
            tags: BTreeSet::new(),
            is_favorite: false,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_session_saves_connection_writes_alias_and_creates() {
        let Fixture { engine, fake, dir } = fixture().await;
        let local = dir.path().join("work").join("proj");

        let created = engine
            .create_session(connection_config("proj", &local), InitialSyncDirection::Skip)
            .await
            .unwrap();
        assert_eq!(created.name, "proj");
        assert!(local.is_dir());

        let saved = engine.list_connections().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].last_used.is_some());

        let ssh_config = std::fs::read_to_string(dir.path().join("ssh").join("config")).unwrap();
        assert!(ssh_config.contains("Host mutagen-proj"));
        assert!(ssh_config.contains("Port 2222"));

        let calls = fake.calls();
        assert_eq!(
            calls[0],
            format!("create proj two-way-safe {} u@mutagen-proj:/r", local.display())
        );
        // Snapshot refreshed after creation.
        assert_eq!(engine.cached_sessions().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_session_upserts_existing_connection_by_name() {
        let Fixture { engine, dir, .. } = fixture().await;
        let local = dir.path().join("proj");
        engine
            .create_connection(connection_config("proj", &local))
            .await
            .unwrap();

        let mut changed = connection_config("proj", &local);
        changed.host = "other".to_string();
        engine
            .create_session(changed, InitialSyncDirection::Skip)
            .await
            .unwrap();

        let saved = engine.list_connections().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].host, "other");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn quick_connect_resumes_existing_session() {
        let Fixture { engine, fake, dir } = fixture().await;
        let connection = engine
            .create_connection(connection_config("proj", &dir.path().join("proj")))
            .await
            .unwrap();
        fake.set_sessions(vec![session("proj", SessionStatus::Paused)]);

        let outcome = engine.quick_connect(&connection.id).await.unwrap();
        assert_eq!(
            outcome,
            QuickConnect::Resumed {
                session_name: "proj".to_string()
            }
        );
        assert!(fake.calls().contains(&"resume proj".to_string()));
        assert!(engine.get_connection(&connection.id).await.unwrap().last_used.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn quick_connect_creates_missing_session() {
        let Fixture { engine, fake, dir } = fixture().await;
        let connection = engine
            .create_connection(connection_config("my app", &dir.path().join("app")))
            .await
            .unwrap();

        let outcome = engine.quick_connect(&connection.id).await.unwrap();
        assert!(matches!(outcome, QuickConnect::Created { session } if session.name == "my-app"));
        assert!(fake.calls().iter().any(|call| call.starts_with("create my-app ")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn listing_autostarts_a_stopped_daemon_once() {
        let Fixture { engine, fake, .. } = fixture().await;
        fake.set_sessions(vec![session("a", SessionStatus::Watching)]);
        fake.set_unreachable(true);

        let sessions = engine.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(fake.calls(), vec!["list", "start", "list"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn listing_without_autostart_surfaces_unreachable() {
        let Fixture { mut engine, fake, .. } = fixture().await;
        engine.config.autostart_daemon = false;
        fake.set_unreachable(true);

        let error = engine.list_sessions().await.unwrap_err();
        assert!(error.is_unreachable());
        assert!(!fake.calls().contains(&"start".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn terminate_publishes_removal_and_forgets_conflicts() {
        let Fixture { engine, fake, .. } = fixture().await;
        fake.set_sessions(vec![session("proj", SessionStatus::Watching)]);
        fake.set_conflicts("proj", vec![conflict("a.txt")]);
        engine.list_sessions().await.unwrap();
        assert_eq!(engine.conflicts("proj").await.unwrap().len(), 1);
        assert!(engine.pending_conflicts().active.is_some());

        let mut rx = engine.subscribe();
        engine
            .session_action("proj", SessionAction::Terminate)
            .await
            .unwrap();

        assert!(engine.pending_conflicts().active.is_none());
        let removed = std::iter::from_fn(|| rx.try_recv().ok()).any(|event| {
            matches!(event, HubEvent::SessionChanged { change: ChangeKind::Removed, .. })
        });
        assert!(removed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_session_action_is_not_found() {
        let Fixture { engine, .. } = fixture().await;
        let error = engine
            .session_action("ghost", SessionAction::Pause)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timed_out_action_releases_the_session_lock() {
        let Fixture { engine, fake, .. } = fixture().await;
        fake.set_sessions(vec![session("proj", SessionStatus::Watching)]);
        fake.time_out_actions(1);

        let error = engine
            .session_action("proj", SessionAction::Pause)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::DaemonTimeout { .. }));

        tokio::time::timeout(
            Duration::from_secs(5),
            engine.session_action("proj", SessionAction::Pause),
        )
        .await
        .expect("session lock still held")
        .unwrap();
        assert_eq!(engine.cached_sessions()[0].status, SessionStatus::Paused);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timed_out_resolution_releases_the_session_lock() {
        let Fixture { engine, fake, .. } = fixture().await;
        fake.set_sessions(vec![session("proj", SessionStatus::Watching)]);
        fake.time_out_actions(1);
        let decision = ResolutionDecision {
            session_name: "proj".to_string(),
            winner: Side::Beta,
        };

        let error = engine.resolve_conflict(&decision).await.unwrap_err();
        assert!(matches!(error, Error::DaemonTimeout { .. }));
        assert_eq!(engine.pending_conflicts(), PendingConflicts::default());

        tokio::time::timeout(Duration::from_secs(5), engine.resolve_conflict(&decision))
            .await
            .expect("session lock still held")
            .unwrap();
        assert!(fake.calls().contains(
            &"create proj one-way-replica u@mutagen-proj:/remote/proj /local/proj".to_string()
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn actions_on_one_session_run_one_at_a_time() {
        let Fixture { engine, fake, .. } = fixture().await;
        fake.set_sessions(vec![
            session("proj", SessionStatus::Watching),
            session("docs", SessionStatus::Watching),
        ]);
        fake.set_action_delay(Duration::from_millis(50));

        let (pause, resume, other) = tokio::join!(
            engine.session_action("proj", SessionAction::Pause),
            engine.session_action("proj", SessionAction::Resume),
            engine.session_action("docs", SessionAction::Pause),
        );
        pause.unwrap();
        resume.unwrap();
        other.unwrap();

        assert_eq!(fake.peak_in_flight("proj"), 1);
        let proj_actions = fake
            .calls()
            .iter()
            .filter(|call| call.ends_with(" proj"))
            .count();
        assert_eq!(proj_actions, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_conflict_recreates_session_as_replica() {
        let Fixture { engine, fake, .. } = fixture().await;
        fake.set_sessions(vec![session("proj", SessionStatus::Watching)]);
        fake.set_conflicts("proj", vec![conflict("a.txt")]);
        engine.poll_once().await;
        assert_eq!(
            engine.pending_conflicts().active.map(|p| p.session_name),
            Some("proj".to_string())
        );

        engine
            .resolve_conflict(&ResolutionDecision {
                session_name: "proj".to_string(),
                winner: Side::Beta,
            })
            .await
            .unwrap();

        assert!(fake.calls().contains(
            &"create proj one-way-replica u@mutagen-proj:/remote/proj /local/proj".to_string()
        ));
        assert_eq!(engine.pending_conflicts(), PendingConflicts::default());
        assert_eq!(engine.cached_sessions()[0].identifier, "sync_new1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_connection_removes_ssh_alias() {
        let Fixture { engine, dir, .. } = fixture().await;
        let local = dir.path().join("proj");
        engine
            .create_session(connection_config("proj", &local), InitialSyncDirection::Skip)
            .await
            .unwrap();
        let id = engine.list_connections().await.unwrap()[0].id;

        engine.delete_connection(&id).await.unwrap();

        let ssh_config = std::fs::read_to_string(dir.path().join("ssh").join("config")).unwrap();
        assert!(!ssh_config.contains("mutagen-proj"));
        assert!(matches!(
            engine.get_connection(&id).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn daemon_status_change_is_broadcast_once() {
        let Fixture { engine, fake, .. } = fixture().await;
        let mut rx = engine.subscribe();

        assert_eq!(engine.daemon_status().await, DaemonStatus::Running);
        assert_eq!(engine.daemon_status().await, DaemonStatus::Running);
        fake.set_unreachable(true);
        assert_eq!(engine.daemon_status().await, DaemonStatus::Stopped);

        let statuses: Vec<DaemonStatus> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|event| match event {
                HubEvent::DaemonStatus { status } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![DaemonStatus::Running, DaemonStatus::Stopped]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn installation_reports_resolved_executable() {
        let Fixture { engine, .. } = fixture().await;
        let installation = engine.installation();
        assert!(installation.installed);
        assert_eq!(installation.path.as_deref(), Some("/fake/mutagen"));
    }
}
