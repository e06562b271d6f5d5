/*
[INPUT]:  Task map mutations from the manager and submission machines
[OUTPUT]: Durable tasks.json surviving process restarts
[POS]:    Persistence layer - checkpoint storage for crash recovery
[UPDATE]: When the persisted layout or write discipline changes
*/

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use crate::model::Task;

const TASKS_FILE: &str = "tasks.json";

/// Durable storage for the task set.
///
/// The whole task map is the single unit of persistence: every write replaces
/// the file atomically (temp + rename). Each submission machine only ever
/// touches its own task's key, so concurrent upserts are last-write-wins per
/// key and need no further coordination.
#[derive(Debug)]
pub struct TaskStore {
    path: PathBuf,
    tasks: Mutex<HashMap<String, Task>>,
}

impl TaskStore {
    /// Open (or create) the store under the given directory.
    ///
    /// A missing tasks.json is a first run and yields an empty map.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create data dir {}", dir.display()))?;

        let path = dir.join(TASKS_FILE);
        let tasks = Self::load(&path).await?;

        Ok(Self {
            path,
            tasks: Mutex::new(tasks),
        })
    }

    async fn load(path: &Path) -> Result<HashMap<String, Task>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let tasks: HashMap<String, Task> =
            serde_json::from_str(&content).with_context(|| format!("parse {}", path.display()))?;
        Ok(tasks)
    }

    /// Snapshot of the full task map.
    pub async fn tasks(&self) -> HashMap<String, Task> {
        self.tasks.lock().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        self.tasks.lock().await.get(id).cloned()
    }

    /// Insert or replace one task and checkpoint the map.
    pub async fn upsert(&self, mut task: Task) -> Result<()> {
        task.validate()?;
        task.updated_at = chrono::Utc::now();
        let mut tasks = self.tasks.lock().await;
        tasks.insert(task.id.clone(), task);
        self.save(&tasks).await
    }

    /// Remove every task (logout).
    pub async fn purge(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        tasks.clear();
        self.save(&tasks).await
    }

    async fn save(&self, tasks: &HashMap<String, Task>) -> Result<()> {
        let content = serde_json::to_string_pretty(tasks)?;

        // Atomic write: write to temp file then rename
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, content)
            .await
            .with_context(|| format!("write {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("rename into {}", self.path.display()))?;
        Ok(())
    }
}
