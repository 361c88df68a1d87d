//! Ownership-checked task operations.

use std::sync::Arc;

use chrono::Utc;

use crate::error::TaskError;
use crate::store::{PatchOutcome, TaskStore};
use crate::task::{NewTask, Task, TaskId, TaskPatch, UserId};

pub const DELETED_MESSAGE: &str = "Task deleted successfully";

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, owner: UserId, draft: NewTask) -> Result<Task, TaskError> {
        if !draft.title.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            return Err(TaskError::Validation("Task title is required".to_string()));
        }

        let task = self.store.insert(Task::new(owner, draft, Utc::now())).await?;
        tracing::info!(task = %task.id, %owner, "task created");
        Ok(task)
    }

    pub async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Task>, TaskError> {
        let tasks = self.store.list_by_owner(owner).await?;
        tracing::debug!(%owner, count = tasks.len(), "tasks listed");
        Ok(tasks)
    }

    pub async fn update(
        &self,
        owner: UserId,
        id: &str,
        patch: TaskPatch,
    ) -> Result<Task, TaskError> {
        let id = parse_id(id)?;
        match self.store.apply_patch(id, owner, patch, Utc::now()).await? {
            PatchOutcome::NotFound => Err(TaskError::NotFound),
            PatchOutcome::NotOwner => Err(rejected(id, owner)),
            PatchOutcome::Unchanged(task) => Ok(task),
            PatchOutcome::Updated(task) => {
                tracing::info!(task = %task.id, status = %task.status, "task updated");
                Ok(task)
            }
        }
    }

    pub async fn delete(&self, owner: UserId, id: &str) -> Result<&'static str, TaskError> {
        let task = self.owned(owner, id).await?;
        if !self.store.remove(task.id).await? {
            return Err(TaskError::NotFound);
        }
        tracing::info!(task = %task.id, %owner, "task deleted");
        Ok(DELETED_MESSAGE)
    }

    /// Loads the task and checks that `owner` may touch it.
    async fn owned(&self, owner: UserId, id: &str) -> Result<Task, TaskError> {
        let id = parse_id(id)?;
        let task = self.store.find(id).await?.ok_or(TaskError::NotFound)?;
        if !task.is_owned_by(owner) {
            return Err(rejected(id, owner));
        }
        Ok(task)
    }
}

// Ids that do not parse cannot name a stored task.
fn parse_id(id: &str) -> Result<TaskId, TaskError> {
    id.parse().map_err(|_| TaskError::NotFound)
}

fn rejected(id: TaskId, caller: UserId) -> TaskError {
    tracing::warn!(task = %id, %caller, "ownership check rejected");
    TaskError::Unauthorized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::InMemoryTaskStore;
    use crate::task::TaskStatus;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate};
    use rstest::{fixture, rstest};
    use tokio::sync::Barrier;

    /// Holds every patch at a barrier so two of them reach the store together.
    struct Rendezvous {
        inner: InMemoryTaskStore,
        barrier: Barrier,
    }

    #[async_trait]
    impl TaskStore for Rendezvous {
        async fn insert(&self, task: Task) -> Result<Task, StoreError> {
            self.inner.insert(task).await
        }

        async fn find(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
            self.inner.find(id).await
        }

        async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Task>, StoreError> {
            self.inner.list_by_owner(owner).await
        }

        async fn apply_patch(
            &self,
            id: TaskId,
            owner: UserId,
            patch: TaskPatch,
            now: DateTime<Utc>,
        ) -> Result<PatchOutcome, StoreError> {
            self.barrier.wait().await;
            self.inner.apply_patch(id, owner, patch, now).await
        }

        async fn remove(&self, id: TaskId) -> Result<bool, StoreError> {
            self.inner.remove(id).await
        }
    }

    #[fixture]
    fn service() -> TaskService {
        TaskService::new(Arc::new(InMemoryTaskStore::new()))
    }

    fn draft(title: &str) -> NewTask {
        NewTask {
            title: Some(title.to_string()),
            description: Some("details".to_string()),
            status: None,
            deadline: NaiveDate::from_ymd_opt(2030, 1, 15),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn create_defaults_status_to_pending(service: TaskService) {
        let owner = UserId::generate();
        let task = service.create(owner, draft("Buy milk")).await.unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.owner, owner);
        assert_eq!(task.title, "Buy milk");
    }

    #[rstest]
    #[tokio::test]
    async fn create_keeps_explicit_status(service: TaskService) {
        let mut new = draft("Started already");
        new.status = Some(TaskStatus::Working);
        let task = service.create(UserId::generate(), new).await.unwrap();
        assert_eq!(task.status, TaskStatus::Working);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("   "))]
    #[tokio::test]
    async fn create_without_title_persists_nothing(
        service: TaskService,
        #[case] title: Option<&str>,
    ) {
        let owner = UserId::generate();
        let new = NewTask {
            title: title.map(str::to_string),
            ..NewTask::default()
        };

        let result = service.create(owner, new).await;

        assert!(matches!(result, Err(TaskError::Validation(_))));
        assert!(service.list_by_owner(owner).await.unwrap().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn list_never_leaks_other_owners(service: TaskService) {
        let alice = UserId::generate();
        let bob = UserId::generate();
        service.create(alice, draft("alice 1")).await.unwrap();
        service.create(bob, draft("bob 1")).await.unwrap();
        service.create(alice, draft("alice 2")).await.unwrap();

        let listed = service.list_by_owner(alice).await.unwrap();

        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|t| t.owner == alice));
        assert_eq!(listed[0].title, "alice 2");
    }

    #[rstest]
    #[tokio::test]
    async fn update_by_stranger_is_rejected_and_changes_nothing(service: TaskService) {
        let owner = UserId::generate();
        let task = service.create(owner, draft("mine")).await.unwrap();

        let result = service
            .update(
                UserId::generate(),
                &task.id.to_string(),
                TaskPatch::status(TaskStatus::Done),
            )
            .await;

        assert!(matches!(result, Err(TaskError::Unauthorized)));
        let stored = service.list_by_owner(owner).await.unwrap();
        assert_eq!(stored[0], task);
    }

    #[rstest]
    #[tokio::test]
    async fn update_status_only_leaves_the_rest(service: TaskService) {
        let owner = UserId::generate();
        let task = service.create(owner, draft("report")).await.unwrap();

        let updated = service
            .update(owner, &task.id.to_string(), TaskPatch::status(TaskStatus::Done))
            .await
            .unwrap();

        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.title, task.title);
        assert_eq!(updated.description, task.description);
        assert_eq!(updated.deadline, task.deadline);
        assert_eq!(updated.created_at, task.created_at);
    }

    #[rstest]
    #[tokio::test]
    async fn concurrent_patches_to_different_fields_both_stick() {
        let service = TaskService::new(Arc::new(Rendezvous {
            inner: InMemoryTaskStore::new(),
            barrier: Barrier::new(2),
        }));
        let owner = UserId::generate();
        let task = service.create(owner, draft("orig")).await.unwrap();
        let id = task.id.to_string();

        let rename = TaskPatch {
            title: Some("renamed".to_string()),
            ..TaskPatch::default()
        };
        let (renamed, finished) = tokio::join!(
            service.update(owner, &id, rename),
            service.update(owner, &id, TaskPatch::status(TaskStatus::Done)),
        );
        renamed.unwrap();
        finished.unwrap();

        let stored = service.list_by_owner(owner).await.unwrap();
        assert_eq!(stored[0].title, "renamed");
        assert_eq!(stored[0].status, TaskStatus::Done);
    }

    #[rstest]
    #[case("not-a-uuid")]
    #[case("6f1c1d3e-2b7a-4c55-9a0e-3f1b2c4d5e6f")]
    #[tokio::test]
    async fn unknown_ids_are_not_found(service: TaskService, #[case] id: &str) {
        let owner = UserId::generate();
        assert!(matches!(
            service.update(owner, id, TaskPatch::default()).await,
            Err(TaskError::NotFound)
        ));
        assert!(matches!(
            service.delete(owner, id).await,
            Err(TaskError::NotFound)
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn delete_respects_ownership(service: TaskService) {
        let owner = UserId::generate();
        let task = service.create(owner, draft("temp")).await.unwrap();
        let id = task.id.to_string();

        let denied = service.delete(UserId::generate(), &id).await;
        assert!(matches!(denied, Err(TaskError::Unauthorized)));
        assert_eq!(service.list_by_owner(owner).await.unwrap().len(), 1);

        assert_eq!(service.delete(owner, &id).await.unwrap(), DELETED_MESSAGE);
        assert!(service.list_by_owner(owner).await.unwrap().is_empty());
    }
}
