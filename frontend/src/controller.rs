//! Task list controller.
//!
//! [`Model::update`] is pure: it folds a [`Msg`] into the model and returns
//! the [`Cmd`] (at most one store write or subscription change) the runtime
//! has to perform. Task state only ever changes when a snapshot arrives via
//! [`Msg::TasksLoaded`]; writes are never applied locally.

use shared::{ContentUpdate, Task, TaskId, TaskStatus, UserId};

/// Which tasks a list view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskFilter {
    #[default]
    All,
    Todo,
    Doing,
    Done,
}

impl TaskFilter {
    pub fn matches(&self, status: TaskStatus) -> bool {
        match self {
            TaskFilter::All => true,
            TaskFilter::Todo => status == TaskStatus::Todo,
            TaskFilter::Doing => status == TaskStatus::Doing,
            TaskFilter::Done => status == TaskStatus::Done,
        }
    }
}

impl From<TaskStatus> for TaskFilter {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Todo => TaskFilter::Todo,
            TaskStatus::Doing => TaskFilter::Doing,
            TaskStatus::Done => TaskFilter::Done,
        }
    }
}

/// Tasks passing `filter`, in their existing order.
pub fn filter_tasks(tasks: &[Task], filter: TaskFilter) -> Vec<&Task> {
    tasks.iter().filter(|task| filter.matches(task.status)).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub total: usize,
    pub todo: usize,
    pub doing: usize,
    pub done: usize,
}

impl TaskCounts {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        tasks.iter().fold(Self::default(), |mut counts, task| {
            counts.total += 1;
            match task.status {
                TaskStatus::Todo => counts.todo += 1,
                TaskStatus::Doing => counts.doing += 1,
                TaskStatus::Done => counts.done += 1,
            }
            counts
        })
    }

    pub fn for_filter(&self, filter: TaskFilter) -> usize {
        match filter {
            TaskFilter::All => self.total,
            TaskFilter::Todo => self.todo,
            TaskFilter::Doing => self.doing,
            TaskFilter::Done => self.done,
        }
    }
}

/// In-progress edit of one task's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    pub id: TaskId,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    // Session
    SignedIn(UserId),
    SignedOut,
    TasksLoaded { user_id: UserId, tasks: Vec<Task> },

    // Views
    SetFilter(TaskFilter),

    // Creating
    SetNewTaskTitle(String),
    SetNewTaskDescription(String),
    CreateTask,

    // Moving
    MoveTask { id: TaskId, to: TaskStatus },
    /// Completed drag gesture; `zone` is the column it was dropped on, if any.
    DropTask { id: TaskId, zone: Option<String> },
    ToggleDone(TaskId),

    // Editing
    EditTask(TaskId),
    SetEditTitle(String),
    SetEditDescription(String),
    SaveEdit,
    CancelEdit,

    DeleteTask(TaskId),
    Error(String),
}

/// Side effect requested by [`Model::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    None,
    Subscribe(UserId),
    Unsubscribe,
    AddTask {
        title: String,
        description: String,
        user_id: UserId,
    },
    UpdateStatus {
        id: TaskId,
        status: TaskStatus,
    },
    UpdateContent {
        id: TaskId,
        content: ContentUpdate,
    },
    DeleteTask(TaskId),
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    user: Option<UserId>,
    tasks: Vec<Task>,
    filter: TaskFilter,
    new_task_title: String,
    new_task_description: String,
    editing: Option<EditDraft>,
    loading: bool,
    last_error: Option<String>,
}

impl Model {
    pub fn update(&mut self, msg: Msg) -> Cmd {
        match msg {
            Msg::SignedIn(user_id) => {
                if self.user.as_ref() == Some(&user_id) {
                    return Cmd::None;
                }
                *self = Model {
                    user: Some(user_id.clone()),
                    loading: true,
                    filter: self.filter,
                    ..Model::default()
                };
                Cmd::Subscribe(user_id)
            }
            Msg::SignedOut => {
                if self.user.is_none() {
                    return Cmd::None;
                }
                *self = Model::default();
                Cmd::Unsubscribe
            }
            Msg::TasksLoaded { user_id, tasks } => {
                if self.user.as_ref() != Some(&user_id) {
                    tracing::debug!(%user_id, "dropping snapshot for a user no longer in session");
                    return Cmd::None;
                }
                self.tasks = tasks;
                self.loading = false;
                let draft_gone = self
                    .editing
                    .as_ref()
                    .is_some_and(|draft| self.task(draft.id).is_none());
                if draft_gone {
                    self.editing = None;
                }
                Cmd::None
            }
            Msg::SetFilter(filter) => {
                self.filter = filter;
                Cmd::None
            }
            Msg::SetNewTaskTitle(title) => {
                self.new_task_title = title;
                Cmd::None
            }
            Msg::SetNewTaskDescription(description) => {
                self.new_task_description = description;
                Cmd::None
            }
            Msg::CreateTask => {
                let Some(user_id) = self.user.clone() else {
                    return Cmd::None;
                };
                let title = self.new_task_title.trim().to_string();
                if title.is_empty() {
                    return Cmd::None;
                }
                let description = self.new_task_description.trim().to_string();
                self.new_task_title.clear();
                self.new_task_description.clear();
                Cmd::AddTask {
                    title,
                    description,
                    user_id,
                }
            }
            Msg::MoveTask { id, to } => self.transition(id, to),
            Msg::DropTask { id, zone } => {
                match zone.as_deref().map(str::parse::<TaskStatus>) {
                    Some(Ok(to)) => self.transition(id, to),
                    Some(Err(e)) => {
                        tracing::debug!(%id, error = %e, "ignoring drop on unknown zone");
                        Cmd::None
                    }
                    None => Cmd::None,
                }
            }
            Msg::ToggleDone(id) => match self.task(id).map(|task| task.status) {
                Some(TaskStatus::Done) => self.transition(id, TaskStatus::Todo),
                Some(_) => self.transition(id, TaskStatus::Done),
                None => Cmd::None,
            },
            Msg::EditTask(id) => {
                if let Some(task) = self.task(id) {
                    self.editing = Some(EditDraft {
                        id,
                        title: task.title.clone(),
                        description: task.description.clone(),
                    });
                }
                Cmd::None
            }
            Msg::SetEditTitle(title) => {
                if let Some(draft) = self.editing.as_mut() {
                    draft.title = title;
                }
                Cmd::None
            }
            Msg::SetEditDescription(description) => {
                if let Some(draft) = self.editing.as_mut() {
                    draft.description = description;
                }
                Cmd::None
            }
            Msg::SaveEdit => {
                let Some(draft) = &self.editing else {
                    return Cmd::None;
                };
                let title = draft.title.trim();
                if title.is_empty() {
                    return Cmd::None;
                }
                let cmd = Cmd::UpdateContent {
                    id: draft.id,
                    content: ContentUpdate {
                        title: Some(title.to_string()),
                        description: Some(draft.description.trim().to_string()),
                    },
                };
                self.editing = None;
                cmd
            }
            Msg::CancelEdit => {
                self.editing = None;
                Cmd::None
            }
            Msg::DeleteTask(id) => {
                if self.editing.as_ref().is_some_and(|draft| draft.id == id) {
                    self.editing = None;
                }
                Cmd::DeleteTask(id)
            }
            Msg::Error(error) => {
                self.last_error = Some(error);
                Cmd::None
            }
        }
    }

    /// Status write for a move, or nothing when the task is unknown or
    /// already in `to`.
    fn transition(&self, id: TaskId, to: TaskStatus) -> Cmd {
        match self.task(id) {
            Some(task) if task.status != to => Cmd::UpdateStatus { id, status: to },
            _ => Cmd::None,
        }
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn filter(&self) -> TaskFilter {
        self.filter
    }

    pub fn visible_tasks(&self) -> Vec<&Task> {
        filter_tasks(&self.tasks, self.filter)
    }

    /// One board column.
    pub fn column(&self, status: TaskStatus) -> Vec<&Task> {
        filter_tasks(&self.tasks, status.into())
    }

    pub fn counts(&self) -> TaskCounts {
        TaskCounts::from_tasks(&self.tasks)
    }

    pub fn new_task_title(&self) -> &str {
        &self.new_task_title
    }

    pub fn new_task_description(&self) -> &str {
        &self.new_task_description
    }

    pub fn editing(&self) -> Option<&EditDraft> {
        self.editing.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
