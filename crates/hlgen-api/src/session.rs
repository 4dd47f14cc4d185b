//! In-memory user sessions.
//!
//! A session owns a temporary working directory (the uploaded video and the
//! clips cut from it) and the report of its latest run. The directory is
//! removed when the session is dropped, so ending or expiring a session is
//! just removing it from the store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hlgen_models::{HighlightReport, SessionId};
use tempfile::TempDir;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::metrics;

/// Interval between expiry sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct SessionState {
    report: Option<HighlightReport>,
    last_active: Instant,
}

/// One user's workspace.
pub struct Session {
    id: SessionId,
    dir: TempDir,
    busy: AtomicBool,
    state: RwLock<SessionState>,
}

impl Session {
    fn create(root: &Path) -> std::io::Result<Self> {
        let id = SessionId::new();
        let dir = tempfile::Builder::new()
            .prefix(&format!("session-{}-", id))
            .tempdir_in(root)?;
        std::fs::create_dir_all(dir.path().join("clips"))?;

        Ok(Self {
            id,
            dir,
            busy: AtomicBool::new(false),
            state: RwLock::new(SessionState {
                report: None,
                last_active: Instant::now(),
            }),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Where an uploaded video is written.
    pub fn input_path(&self, file_name: &str) -> PathBuf {
        self.dir.path().join(format!("input_{}", file_name))
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.dir.path().join("clips")
    }

    /// Path of a clip file inside this session.
    pub fn clip_path(&self, file_name: &str) -> PathBuf {
        self.clips_dir().join(file_name)
    }

    /// Claim the session for a pipeline run. Returns `false` when a run is
    /// already in progress.
    pub fn try_begin(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the claim taken by [`Session::try_begin`].
    pub fn finish(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn report(&self) -> Option<HighlightReport> {
        self.state.read().await.report.clone()
    }

    pub async fn set_report(&self, report: HighlightReport) {
        let mut state = self.state.write().await;
        state.report = Some(report);
        state.last_active = Instant::now();
    }

    /// Discard the previous run: its report, uploaded video and clips.
    /// `keep` names a file to leave in place (the new upload).
    pub async fn reset(&self, keep: Option<&Path>) -> std::io::Result<()> {
        {
            let mut state = self.state.write().await;
            state.report = None;
            state.last_active = Instant::now();
        }

        let mut entries = tokio::fs::read_dir(self.dir.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if Some(path.as_path()) == keep {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                tokio::fs::remove_file(&path).await?;
            }
        }
        tokio::fs::create_dir_all(self.clips_dir()).await
    }

    async fn touch(&self) {
        self.state.write().await.last_active = Instant::now();
    }

    async fn idle_for(&self) -> Duration {
        self.state.read().await.last_active.elapsed()
    }
}

/// All live sessions.
pub struct SessionStore {
    root: PathBuf,
    ttl: Duration,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session with a fresh working directory.
    pub async fn create(&self) -> std::io::Result<Arc<Session>> {
        tokio::fs::create_dir_all(&self.root).await?;
        let root = self.root.clone();
        let session = tokio::task::spawn_blocking(move || Session::create(&root))
            .await
            .map_err(std::io::Error::other)??;
        let session = Arc::new(session);

        self.sessions
            .write()
            .await
            .insert(session.id().clone(), Arc::clone(&session));
        debug!(session_id = %session.id(), dir = %session.dir().display(), "Session created");
        Ok(session)
    }

    /// Look up a session and mark it active.
    pub async fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        let session = self.sessions.read().await.get(id).cloned()?;
        session.touch().await;
        Some(session)
    }

    /// Remove a session. Its working directory goes away with the last
    /// reference.
    pub async fn remove(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(session_id = %id, "Session ended");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove sessions idle longer than the TTL. Sessions with a run in
    /// progress are kept.
    pub async fn sweep_expired(&self) -> usize {
        let candidates: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();

        let mut expired = Vec::new();
        for session in candidates {
            if !session.is_busy() && session.idle_for().await > self.ttl {
                expired.push(session.id().clone());
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        for id in &expired {
            sessions.remove(id);
        }
        expired.len()
    }

    /// Delete session directories under the work root that no live session
    /// owns, such as those left behind by a previous process.
    pub async fn remove_orphaned_dirs(&self) -> std::io::Result<usize> {
        let live: Vec<PathBuf> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.dir().to_path_buf())
            .collect();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_session_dir = entry.file_name().to_string_lossy().starts_with("session-");
            if !is_session_dir || live.contains(&path) || !entry.file_type().await?.is_dir() {
                continue;
            }

            let age = entry
                .metadata()
                .await?
                .modified()?
                .elapsed()
                .unwrap_or_default();
            if age > self.ttl {
                tokio::fs::remove_dir_all(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Background task that expires idle sessions.
pub struct SessionSweeper {
    store: Arc<SessionStore>,
}

impl SessionSweeper {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Run forever; spawn as a background task.
    pub async fn run(&self) {
        info!(
            "Starting session sweeper (interval: {:?}, ttl: {:?})",
            SWEEP_INTERVAL, self.store.ttl
        );

        let mut ticker = interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;

            if let Err(e) = self.sweep().await {
                error!("Session sweep error: {}", e);
            }
        }
    }

    async fn sweep(&self) -> anyhow::Result<()> {
        let removed = self.store.sweep_expired().await;
        let remaining = self.store.len().await;
        metrics::set_active_sessions(remaining);
        if removed > 0 {
            info!(removed, remaining, "Expired idle sessions");
        }

        let orphaned = self.store.remove_orphaned_dirs().await?;
        if orphaned > 0 {
            warn!(orphaned, "Removed orphaned session directories");
        }
        Ok(())
    }
}
