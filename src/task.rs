// Task data model and draft coercion

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Unique identifier of a task, immutable once assigned
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Collections written by the browser app use millisecond timestamps as ids
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Int(i64),
            UInt(u64),
            Float(f64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => TaskId(s),
            RawId::Int(n) => TaskId(n.to_string()),
            RawId::UInt(n) => TaskId(n.to_string()),
            RawId::Float(n) if n.is_finite() && n.fract() == 0.0 => TaskId(format!("{:.0}", n)),
            RawId::Float(n) => TaskId(n.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Ordinal used for sorting: low < medium < high
    pub fn weight(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = DraftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(DraftError::InvalidPriority(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Overdue,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in-progress",
            Status::Completed => "completed",
            Status::Overdue => "overdue",
        }
    }

    /// Ordinal used for sorting: pending < overdue < in-progress < completed
    pub fn weight(self) -> u8 {
        match self {
            Status::Pending => 1,
            Status::Overdue => 2,
            Status::InProgress => 3,
            Status::Completed => 4,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = DraftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "in-progress" | "in_progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            "overdue" => Ok(Status::Overdue),
            _ => Err(DraftError::InvalidStatus(s.to_string())),
        }
    }
}

/// Reasons a draft cannot become a task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("title cannot be empty")]
    EmptyTitle,

    #[error("unknown priority {0:?} (expected low, medium or high)")]
    InvalidPriority(String),

    #[error("unknown status {0:?} (expected pending, in-progress, completed or overdue)")]
    InvalidStatus(String),

    #[error("invalid due date {0:?} (expected YYYY-MM-DD)")]
    InvalidDueDate(String),

    #[error("invalid due time {0:?} (expected HH:MM)")]
    InvalidDueTime(String),
}

/// A single trackable work item
///
/// Field names serialize in camelCase, matching documents written by the
/// browser version of the app so stored collections and exports stay interchangeable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    #[serde(default, with = "due_date_codec")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, with = "due_time_codec")]
    pub due_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "deserialize_minutes")]
    pub estimated_duration: u32,
    #[serde(default, deserialize_with = "deserialize_minutes")]
    pub time_spent: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub(crate) fn from_draft(id: TaskId, fields: DraftFields, now: DateTime<Utc>) -> Self {
        let mut task = Task {
            id,
            title: String::new(),
            description: String::new(),
            priority: fields.priority,
            status: Status::Pending,
            due_date: None,
            due_time: None,
            estimated_duration: 0,
            time_spent: 0,
            created_at: now,
            last_modified: now,
            completed_at: None,
        };
        task.apply(fields, now);
        task
    }

    /// Replace every mutable field; id and created_at are untouched
    pub(crate) fn apply(&mut self, fields: DraftFields, now: DateTime<Utc>) {
        self.title = fields.title;
        self.description = fields.description;
        self.priority = fields.priority;
        self.due_date = fields.due_date;
        self.due_time = fields.due_time;
        self.estimated_duration = fields.estimated_duration;
        self.time_spent = fields.time_spent;
        self.set_status(fields.status, now);
        self.last_modified = now;
    }

    /// Change status keeping completed_at set exactly while completed
    pub(crate) fn set_status(&mut self, status: Status, now: DateTime<Utc>) {
        if status == Status::Completed {
            if self.status != Status::Completed || self.completed_at.is_none() {
                self.completed_at = Some(now);
            }
        } else {
            self.completed_at = None;
        }
        self.status = status;
    }

    pub fn is_completed(&self) -> bool {
        self.status == Status::Completed
    }

    /// Moment the task falls due: the due date at the due time, or at the end
    /// of that day when no time is given
    pub fn due_moment(&self) -> Option<NaiveDateTime> {
        let date = self.due_date?;
        let time = match self.due_time {
            Some(time) => time,
            None => NaiveTime::from_hms_opt(23, 59, 59)?,
        };
        Some(date.and_time(time))
    }

    /// True when the task is unfinished and its due moment lies before `now`
    pub fn is_past_due(&self, now: NaiveDateTime) -> bool {
        !self.is_completed() && self.due_moment().is_some_and(|due| due < now)
    }

    /// Share of the estimate already spent, capped at 100
    pub fn progress_percent(&self) -> f64 {
        if self.estimated_duration == 0 {
            return 0.0;
        }
        (f64::from(self.time_spent) / f64::from(self.estimated_duration) * 100.0).min(100.0)
    }

    pub fn due_label(&self) -> String {
        match (self.due_date, self.due_time) {
            (None, _) => "No due date".to_string(),
            (Some(date), None) => date.format(DATE_FORMAT).to_string(),
            (Some(date), Some(time)) => format!("{} {}", date.format(DATE_FORMAT), format_time(&time)),
        }
    }
}

/// Caller-supplied raw field values for creating or updating a task
///
/// Everything is text, as collected from a form or command line. `parse`
/// validates and coerces it into typed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub priority: String,
    pub status: String,
    pub due_date: String,
    pub due_time: String,
    pub estimated_duration: String,
    pub time_spent: String,
}

impl Default for TaskDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            priority: Priority::Medium.as_str().to_string(),
            status: Status::Pending.as_str().to_string(),
            due_date: String::new(),
            due_time: String::new(),
            estimated_duration: String::new(),
            time_spent: String::new(),
        }
    }
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn parse(&self) -> Result<DraftFields, DraftError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(DraftError::EmptyTitle);
        }

        let due_date = parse_due_date(&self.due_date)?;
        // A time of day means nothing without a date
        let due_time = match due_date {
            Some(_) => parse_due_time(&self.due_time)?,
            None => None,
        };

        Ok(DraftFields {
            title: title.to_string(),
            description: self.description.clone(),
            priority: self.priority.parse()?,
            status: self.status.parse()?,
            due_date,
            due_time,
            estimated_duration: coerce_minutes(&self.estimated_duration),
            time_spent: coerce_minutes(&self.time_spent),
        })
    }
}

impl From<&Task> for TaskDraft {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority.as_str().to_string(),
            status: task.status.as_str().to_string(),
            due_date: task.due_date.map(|d| d.format(DATE_FORMAT).to_string()).unwrap_or_default(),
            due_time: task.due_time.as_ref().map(format_time).unwrap_or_default(),
            estimated_duration: task.estimated_duration.to_string(),
            time_spent: task.time_spent.to_string(),
        }
    }
}

/// Validated, typed draft values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftFields {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    pub estimated_duration: u32,
    pub time_spent: u32,
}

/// Coerce a raw minute count into a non-negative integer
///
/// Fractions are floored; negative, non-numeric and non-finite input becomes 0.
pub fn coerce_minutes(raw: &str) -> u32 {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return n.clamp(0, i64::from(u32::MAX)) as u32;
    }
    raw.parse::<f64>().map(minutes_from_f64).unwrap_or(0)
}

fn minutes_from_f64(n: f64) -> u32 {
    if n.is_finite() && n > 0.0 {
        n.floor().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

fn parse_due_date(raw: &str) -> Result<Option<NaiveDate>, DraftError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map(Some)
        .map_err(|_| DraftError::InvalidDueDate(raw.to_string()))
}

fn parse_due_time(raw: &str) -> Result<Option<NaiveTime>, DraftError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(raw, format).ok())
        .map(Some)
        .ok_or_else(|| DraftError::InvalidDueTime(raw.to_string()))
}

fn format_time(time: &NaiveTime) -> String {
    if time.nanosecond() != 0 {
        time.format("%H:%M:%S%.f").to_string()
    } else if time.second() != 0 {
        time.format("%H:%M:%S").to_string()
    } else {
        time.format("%H:%M").to_string()
    }
}

fn deserialize_minutes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().map(minutes_from_f64).unwrap_or(0),
        serde_json::Value::String(s) => coerce_minutes(&s),
        _ => 0,
    })
}

// Empty strings stand for "no due date" in legacy documents
mod due_date_codec {
    use super::{DATE_FORMAT, parse_due_date};
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer.serialize_str(&date.format(DATE_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(raw) => parse_due_date(&raw).map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}

mod due_time_codec {
    use super::{format_time, parse_due_time};
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.serialize_str(&format_time(time)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(raw) => parse_due_time(&raw).map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}
