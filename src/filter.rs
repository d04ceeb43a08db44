// Query engine: filtered, sorted views over a task collection

use crate::task::{Priority, Status, Task};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Value accepted by a filter: every value, or exactly one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter<T> {
    All,
    Only(T),
}

impl<T> Default for Filter<T> {
    fn default() -> Self {
        Filter::All
    }
}

impl<T: PartialEq> Filter<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Filter::All => true,
            Filter::Only(expected) => expected == value,
        }
    }
}

impl<T: FromStr> FromStr for Filter<T> {
    type Err = T::Err;

    /// "all" (any case) is the match-everything sentinel
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(Filter::All)
        } else {
            s.parse().map(Filter::Only)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown sort key {0:?}")]
pub struct UnknownSortKey(pub String);

/// Field a view is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Title,
    Description,
    Priority,
    Status,
    #[default]
    DueDate,
    DueTime,
    EstimatedDuration,
    TimeSpent,
    CreatedAt,
    LastModified,
}

impl SortKey {
    pub const ALL: [SortKey; 10] = [
        SortKey::Title,
        SortKey::Description,
        SortKey::Priority,
        SortKey::Status,
        SortKey::DueDate,
        SortKey::DueTime,
        SortKey::EstimatedDuration,
        SortKey::TimeSpent,
        SortKey::CreatedAt,
        SortKey::LastModified,
    ];

    /// Field name as it appears in task documents
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Title => "title",
            SortKey::Description => "description",
            SortKey::Priority => "priority",
            SortKey::Status => "status",
            SortKey::DueDate => "dueDate",
            SortKey::DueTime => "dueTime",
            SortKey::EstimatedDuration => "estimatedDuration",
            SortKey::TimeSpent => "timeSpent",
            SortKey::CreatedAt => "createdAt",
            SortKey::LastModified => "lastModified",
        }
    }

    /// Ascending comparison of two tasks on this key
    pub fn compare(self, a: &Task, b: &Task) -> Ordering {
        match self {
            SortKey::Title => compare_title(a, b),
            SortKey::Description => a.description.cmp(&b.description),
            SortKey::Priority => a.priority.weight().cmp(&b.priority.weight()),
            SortKey::Status => a.status.weight().cmp(&b.status.weight()),
            SortKey::DueDate => compare_due_date(a, b),
            SortKey::DueTime => a.due_time.cmp(&b.due_time),
            SortKey::EstimatedDuration => a.estimated_duration.cmp(&b.estimated_duration),
            SortKey::TimeSpent => a.time_spent.cmp(&b.time_spent),
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::LastModified => a.last_modified.cmp(&b.last_modified),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = UnknownSortKey;

    /// Accepts document field names (`dueDate`) and their kebab/snake forms
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        SortKey::ALL
            .into_iter()
            .find(|key| key.as_str().to_lowercase() == normalized)
            .ok_or_else(|| UnknownSortKey(s.to_string()))
    }
}

fn compare_title(a: &Task, b: &Task) -> Ordering {
    a.title.to_lowercase().cmp(&b.title.to_lowercase())
}

// Tasks without a due date sort as the latest possible date
fn compare_due_date(a: &Task, b: &Task) -> Ordering {
    match (a.due_date, b.due_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(format!("unknown sort direction {:?} (expected asc or desc)", other)),
        }
    }
}

/// Search text, filters and ordering for a view
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    pub search: String,
    pub status: Filter<Status>,
    pub priority: Filter<Priority>,
    pub sort: SortKey,
    pub direction: SortDirection,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = term.into();
        self
    }

    pub fn status(mut self, status: Filter<Status>) -> Self {
        self.status = status;
        self
    }

    pub fn priority(mut self, priority: Filter<Priority>) -> Self {
        self.priority = priority;
        self
    }

    pub fn sort(mut self, key: SortKey, direction: SortDirection) -> Self {
        self.sort = key;
        self.direction = direction;
        self
    }

    /// Sort on `key`, flipping direction if it is already the active key
    ///
    /// A newly selected key starts ascending.
    pub fn select_sort(&mut self, key: SortKey) {
        if self.sort == key {
            self.direction = self.direction.toggled();
        } else {
            self.sort = key;
            self.direction = SortDirection::Asc;
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.status.matches(&task.status) && self.priority.matches(&task.priority) && matches_search(task, &self.search)
    }
}

fn matches_search(task: &Task, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    let term = term.to_lowercase();
    task.title.to_lowercase().contains(&term) || task.description.to_lowercase().contains(&term)
}

/// Filter and sort `tasks` for display
///
/// The sort is stable in both directions: tasks with equal keys keep their
/// collection order.
pub fn view<'a>(tasks: &'a [Task], query: &Query) -> Vec<&'a Task> {
    let mut rows: Vec<&Task> = tasks.iter().filter(|task| query.matches(task)).collect();
    rows.sort_by(|a, b| query.direction.apply(query.sort.compare(a, b)));
    rows
}
