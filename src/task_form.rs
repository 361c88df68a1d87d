use crate::task::{parse_deadline, NewTask, Task, TaskId, TaskPatch, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Title,
    Description,
    Status,
    Deadline,
}

impl FormField {
    const ORDER: [FormField; 4] = [
        FormField::Title,
        FormField::Description,
        FormField::Status,
        FormField::Deadline,
    ];

    fn step(self, delta: isize) -> Self {
        let index = Self::ORDER.iter().position(|f| *f == self).unwrap_or(0) as isize;
        let len = Self::ORDER.len() as isize;
        Self::ORDER[(index + delta).rem_euclid(len) as usize]
    }
}

/// What a submitted form turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Create(NewTask),
    Update(TaskId, TaskPatch),
}

/// Editing state for the create/edit dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskForm {
    pub editing: Option<TaskId>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub deadline: String,
    pub focus: FormField,
    pub error: Option<String>,
}

impl TaskForm {
    pub fn create() -> Self {
        Self {
            editing: None,
            title: String::new(),
            description: String::new(),
            status: TaskStatus::Pending,
            deadline: String::new(),
            focus: FormField::Title,
            error: None,
        }
    }

    pub fn edit(task: &Task) -> Self {
        Self {
            editing: Some(task.id),
            title: task.title.clone(),
            description: task.description.clone().unwrap_or_default(),
            status: task.status,
            deadline: task
                .deadline
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            focus: FormField::Title,
            error: None,
        }
    }

    pub fn heading(&self) -> &'static str {
        if self.editing.is_some() {
            "Edit Task"
        } else {
            "Create New Task"
        }
    }

    pub fn can_submit(&self) -> bool {
        !self.title.trim().is_empty()
    }

    pub fn focus_next(&mut self) {
        self.focus = self.focus.step(1);
    }

    pub fn focus_previous(&mut self) {
        self.focus = self.focus.step(-1);
    }

    pub fn push_char(&mut self, c: char) {
        match self.focus {
            FormField::Title => self.title.push(c),
            FormField::Description => self.description.push(c),
            FormField::Deadline => self.deadline.push(c),
            FormField::Status => {
                if c == ' ' {
                    self.status = self.status.next();
                }
            }
        }
    }

    pub fn pop_char(&mut self) {
        match self.focus {
            FormField::Title => {
                self.title.pop();
            }
            FormField::Description => {
                self.description.pop();
            }
            FormField::Deadline => {
                self.deadline.pop();
            }
            FormField::Status => {}
        }
    }

    pub fn cycle_status(&mut self, forward: bool) {
        self.status = if forward {
            self.status.next()
        } else {
            self.status.next().next()
        };
    }

    /// Validates and converts the form. Title and description are trimmed;
    /// a blank deadline means "none".
    pub fn submit(&mut self) -> Option<Submission> {
        if !self.can_submit() {
            self.error = Some("Title is required".to_string());
            return None;
        }
        let deadline = match self.deadline.trim() {
            "" => None,
            raw => match parse_deadline(raw) {
                Ok(date) => Some(date),
                Err(message) => {
                    self.error = Some(message);
                    return None;
                }
            },
        };
        self.error = None;

        let title = Some(self.title.trim().to_string());
        let description = Some(self.description.trim().to_string());
        let status = Some(self.status);

        Some(match self.editing {
            Some(id) => Submission::Update(
                id,
                TaskPatch {
                    title,
                    description,
                    status,
                    deadline,
                },
            ),
            None => Submission::Create(NewTask {
                title,
                description,
                status,
                deadline,
            }),
        })
    }
}
