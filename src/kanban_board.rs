use chrono::NaiveDate;

use crate::task::{Task, TaskId, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(TaskStatus),
}

impl StatusFilter {
    pub const ORDER: [StatusFilter; 4] = [
        StatusFilter::All,
        StatusFilter::Only(TaskStatus::Pending),
        StatusFilter::Only(TaskStatus::Working),
        StatusFilter::Only(TaskStatus::Done),
    ];

    pub fn next(self) -> Self {
        let index = Self::ORDER.iter().position(|f| *f == self).unwrap_or(0);
        Self::ORDER[(index + 1) % Self::ORDER.len()]
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusFilter::All => "All",
            StatusFilter::Only(status) => status.label(),
        }
    }

    pub fn matches(self, status: TaskStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => wanted == status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub working: usize,
    pub done: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// A transient notification shown until the next action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub detail: String,
}

impl Notice {
    pub fn success(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            title: title.into(),
            detail: detail.into(),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            title: "Error".to_string(),
            detail: detail.into(),
        }
    }
}

/// Label of the toggle action for a card in `status`.
pub fn toggle_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "Start Working",
        TaskStatus::Working => "Mark Done",
        TaskStatus::Done => "Mark Pending",
    }
}

/// Notification shown after a task was toggled into `status`.
pub fn toggle_notice(status: TaskStatus) -> Notice {
    match status {
        TaskStatus::Done => Notice::success("Task completed!", "Great job on finishing this task!"),
        TaskStatus::Working => Notice::success("Task in progress", "Keep going!"),
        TaskStatus::Pending => Notice::success("Task reopened", "Moved back to pending."),
    }
}

/// Client-side view state: the owner's whole task list plus the filter,
/// search query and selection used to render it.
#[derive(Debug, Default)]
pub struct KanbanBoard {
    pub tasks: Vec<Task>,
    pub filter: StatusFilter,
    pub query: String,
    pub selected_task: usize,
    pub notice: Option<Notice>,
}

impl KanbanBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
        self.clamp_selection();
    }

    pub fn add_task(&mut self, task: Task) {
        self.tasks.insert(0, task);
    }

    pub fn replace_task(&mut self, task: Task) {
        if let Some(slot) = self.tasks.iter_mut().find(|t| t.id == task.id) {
            *slot = task;
        }
    }

    pub fn set_status(&mut self, id: TaskId, status: TaskStatus) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.status = status;
        }
        self.clamp_selection();
    }

    pub fn remove_task(&mut self, id: TaskId) {
        self.tasks.retain(|t| t.id != id);
        self.clamp_selection();
    }

    pub fn find(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// The tasks passing the status filter and the search query, newest first.
    pub fn visible(&self) -> Vec<&Task> {
        let needle = self.query.to_lowercase();
        let mut tasks: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| self.filter.matches(t.status))
            .filter(|t| {
                needle.is_empty()
                    || t.title.to_lowercase().contains(&needle)
                    || t.description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    pub fn selected(&self) -> Option<&Task> {
        self.visible().get(self.selected_task).copied()
    }

    pub fn select_next(&mut self) {
        let count = self.visible().len();
        if self.selected_task + 1 < count {
            self.selected_task += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected_task = self.selected_task.saturating_sub(1);
    }

    pub fn cycle_filter(&mut self) {
        self.filter = self.filter.next();
        self.clamp_selection();
    }

    pub fn set_query(&mut self, query: String) {
        self.query = query;
        self.clamp_selection();
    }

    pub fn stats(&self) -> TaskStats {
        let count = |status| self.tasks.iter().filter(|t| t.status == status).count();
        TaskStats {
            total: self.tasks.len(),
            pending: count(TaskStatus::Pending),
            working: count(TaskStatus::Working),
            done: count(TaskStatus::Done),
        }
    }

    pub fn overdue_count(&self, today: NaiveDate) -> usize {
        self.tasks.iter().filter(|t| t.is_overdue(today)).count()
    }

    fn clamp_selection(&mut self) {
        let count = self.visible().len();
        if self.selected_task >= count {
            self.selected_task = count.saturating_sub(1);
        }
    }
}
