//! Task persistence.
//!
//! `TaskStore` is the seam between the access layer and storage. Two
//! implementations exist: a purely in-memory one and one that mirrors every
//! mutation into a JSON file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::task::{Task, TaskId, TaskPatch, UserId};

/// Result of [`TaskStore::apply_patch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    NotFound,
    NotOwner,
    /// The patch matched the stored values; nothing was written.
    Unchanged(Task),
    Updated(Task),
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> Result<Task, StoreError>;

    async fn find(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Tasks owned by `owner`, newest first.
    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Task>, StoreError>;

    /// Looks up `id`, checks it belongs to `owner` and applies `patch`, all
    /// under one write lock so concurrent patches to a task never overwrite
    /// each other.
    async fn apply_patch(
        &self,
        id: TaskId,
        owner: UserId,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<PatchOutcome, StoreError>;

    /// Returns whether a record was removed.
    async fn remove(&self, id: TaskId) -> Result<bool, StoreError>;
}

fn owned_newest_first(tasks: &[Task], owner: UserId) -> Vec<Task> {
    // Reverse insertion order first so the stable sort breaks timestamp ties
    // in favour of the later insert.
    let mut owned: Vec<Task> = tasks
        .iter()
        .rev()
        .filter(|t| t.is_owned_by(owner))
        .cloned()
        .collect();
    owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    owned
}

fn patch_in(
    tasks: &mut [Task],
    id: TaskId,
    owner: UserId,
    patch: TaskPatch,
    now: DateTime<Utc>,
) -> PatchOutcome {
    let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
        return PatchOutcome::NotFound;
    };
    if !task.is_owned_by(owner) {
        return PatchOutcome::NotOwner;
    }
    if task.apply(patch, now) {
        PatchOutcome::Updated(task.clone())
    } else {
        PatchOutcome::Unchanged(task.clone())
    }
}

fn remove_from(tasks: &mut Vec<Task>, id: TaskId) -> bool {
    let before = tasks.len();
    tasks.retain(|t| t.id != id);
    tasks.len() != before
}

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<Vec<Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<Task, StoreError> {
        self.tasks.write().await.push(task.clone());
        Ok(task)
    }

    async fn find(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.iter().find(|t| t.id == id).cloned())
    }

    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Task>, StoreError> {
        Ok(owned_newest_first(&self.tasks.read().await, owner))
    }

    async fn apply_patch(
        &self,
        id: TaskId,
        owner: UserId,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<PatchOutcome, StoreError> {
        Ok(patch_in(&mut self.tasks.write().await, id, owner, patch, now))
    }

    async fn remove(&self, id: TaskId) -> Result<bool, StoreError> {
        Ok(remove_from(&mut *self.tasks.write().await, id))
    }
}

/// A JSON document on disk holding one value of type `T`.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so readers never observe a half-written document.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as `T::default()`.
    pub async fn load<T: DeserializeOwned + Default>(&self) -> Result<T, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) if data.trim().is_empty() => Ok(T::default()),
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(T::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        let data = serde_json::to_string_pretty(value)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, data).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

/// Task store backed by a JSON file. The whole collection is kept in memory
/// and the file is rewritten after every mutation, under the write lock.
#[derive(Debug)]
pub struct JsonFileTaskStore {
    tasks: RwLock<Vec<Task>>,
    file: JsonFile,
}

impl JsonFileTaskStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let file = JsonFile::new(path);
        let tasks: Vec<Task> = file.load().await?;
        tracing::info!(path = %file.path().display(), count = tasks.len(), "loaded tasks");
        Ok(Self {
            tasks: RwLock::new(tasks),
            file,
        })
    }
}

#[async_trait]
impl TaskStore for JsonFileTaskStore {
    async fn insert(&self, task: Task) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        tasks.push(task.clone());
        if let Err(err) = self.file.save(&*tasks).await {
            tasks.pop();
            return Err(err);
        }
        Ok(task)
    }

    async fn find(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.iter().find(|t| t.id == id).cloned())
    }

    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Task>, StoreError> {
        Ok(owned_newest_first(&self.tasks.read().await, owner))
    }

    async fn apply_patch(
        &self,
        id: TaskId,
        owner: UserId,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<PatchOutcome, StoreError> {
        let mut tasks = self.tasks.write().await;
        let mut staged = tasks.clone();
        let outcome = patch_in(&mut staged, id, owner, patch, now);
        if let PatchOutcome::Updated(_) = outcome {
            self.file.save(&staged).await?;
            *tasks = staged;
        }
        Ok(outcome)
    }

    async fn remove(&self, id: TaskId) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;
        let mut staged = tasks.clone();
        if !remove_from(&mut staged, id) {
            return Ok(false);
        }
        self.file.save(&staged).await?;
        *tasks = staged;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{NewTask, TaskStatus};
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    fn task_at(owner: UserId, title: &str, minute: i64) -> Task {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        Task::new(owner, NewTask::titled(title), base + Duration::minutes(minute))
    }

    #[rstest]
    #[tokio::test]
    async fn lists_only_owner_tasks_newest_first() {
        let store = InMemoryTaskStore::new();
        let alice = UserId::generate();
        let bob = UserId::generate();

        store.insert(task_at(alice, "first", 0)).await.unwrap();
        store.insert(task_at(bob, "bob's", 1)).await.unwrap();
        store.insert(task_at(alice, "second", 2)).await.unwrap();

        let titles: Vec<String> = store
            .list_by_owner(alice)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[rstest]
    #[tokio::test]
    async fn equal_timestamps_list_later_insert_first() {
        let store = InMemoryTaskStore::new();
        let owner = UserId::generate();
        store.insert(task_at(owner, "older", 5)).await.unwrap();
        store.insert(task_at(owner, "newer", 5)).await.unwrap();

        let listed = store.list_by_owner(owner).await.unwrap();
        assert_eq!(listed[0].title, "newer");
    }

    #[rstest]
    #[tokio::test]
    async fn patch_checks_existence_and_owner() {
        let store = InMemoryTaskStore::new();
        let owner = UserId::generate();
        let task = store.insert(task_at(owner, "mine", 0)).await.unwrap();
        let now = Utc::now();

        assert_eq!(
            store
                .apply_patch(TaskId::generate(), owner, TaskPatch::default(), now)
                .await
                .unwrap(),
            PatchOutcome::NotFound
        );
        assert_eq!(
            store
                .apply_patch(task.id, UserId::generate(), TaskPatch::status(TaskStatus::Done), now)
                .await
                .unwrap(),
            PatchOutcome::NotOwner
        );
        assert_eq!(
            store
                .apply_patch(task.id, owner, TaskPatch::status(TaskStatus::Pending), now)
                .await
                .unwrap(),
            PatchOutcome::Unchanged(task.clone())
        );
        assert_eq!(store.find(task.id).await.unwrap(), Some(task));
    }

    #[rstest]
    #[tokio::test]
    async fn json_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let owner = UserId::generate();

        let store = JsonFileTaskStore::open(&path).await.unwrap();
        let kept = store.insert(task_at(owner, "keep", 0)).await.unwrap();
        let dropped = store.insert(task_at(owner, "drop", 1)).await.unwrap();
        let outcome = store
            .apply_patch(kept.id, owner, TaskPatch::status(TaskStatus::Working), Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, PatchOutcome::Updated(_)));
        assert!(store.remove(dropped.id).await.unwrap());
        drop(store);

        let reopened = JsonFileTaskStore::open(&path).await.unwrap();
        let tasks = reopened.list_by_owner(owner).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, kept.id);
        assert_eq!(tasks[0].status, TaskStatus::Working);
    }

    #[rstest]
    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            JsonFileTaskStore::open(&path).await,
            Err(StoreError::Serialization(_))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn remove_unknown_id_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileTaskStore::open(dir.path().join("tasks.json"))
            .await
            .unwrap();
        assert!(!store.remove(TaskId::generate()).await.unwrap());
    }
}
