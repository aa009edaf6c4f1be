//! Change detection over `git status`.
//!
//! The baseline for a task is the set of dirty paths at the moment the
//! task starts; `detect_changes` reports paths dirty now that were not
//! dirty then. When git is missing, slow, or the directory is not a
//! repository, both calls degrade to "no changes" instead of failing the
//! control loop.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::ports::ChangeDetector;
use crate::domain::DomainResult;

/// Upper bound on one `git status` invocation.
const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// [`ChangeDetector`] backed by `git status --porcelain`.
#[derive(Debug, Clone)]
pub struct GitChangeDetector {
    repo_dir: PathBuf,
    timeout: Duration,
    baselines: Arc<RwLock<HashMap<Uuid, BTreeSet<String>>>>,
}

impl GitChangeDetector {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
            baselines: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Dirty paths right now, empty when git is unavailable.
    async fn current_files(&self) -> BTreeSet<String> {
        let mut command = Command::new("git");
        command
            .args(["status", "--porcelain", "--untracked-files=all"])
            .current_dir(&self.repo_dir)
            .stdin(Stdio::null());

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => {
                warn!(%error, "git unavailable, reporting no changes");
                return BTreeSet::new();
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "git status timed out, reporting no changes");
                return BTreeSet::new();
            }
        };

        if !output.status.success() {
            warn!(
                status = %output.status,
                "git status failed, reporting no changes"
            );
            return BTreeSet::new();
        }

        parse_porcelain(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl ChangeDetector for GitChangeDetector {
    #[instrument(skip(self), fields(task_id = %task_id))]
    async fn track_baseline(&self, task_id: Uuid) -> DomainResult<()> {
        let files = self.current_files().await;
        debug!(dirty = files.len(), "captured change baseline");
        self.baselines.write().await.insert(task_id, files);
        Ok(())
    }

    #[instrument(skip(self), fields(task_id = %task_id, iteration))]
    async fn detect_changes(&self, task_id: Uuid, iteration: u32) -> DomainResult<Vec<String>> {
        let current = self.current_files().await;
        let baselines = self.baselines.read().await;
        let baseline = baselines.get(&task_id);

        let changed: Vec<String> = current
            .into_iter()
            .filter(|path| baseline.is_none_or(|b| !b.contains(path)))
            .collect();
        debug!(changed = changed.len(), "detected changes since baseline");
        Ok(changed)
    }
}

/// Extract paths from `git status --porcelain` output. Renames report the
/// destination path.
fn parse_porcelain(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| {
            let entry = &line[3..];
            match entry.split_once(" -> ") {
                Some((_, to)) => to.to_string(),
                None => entry.to_string(),
            }
        })
        .collect()
}
