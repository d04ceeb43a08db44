// Aggregate statistics over a task collection

use crate::task::{Status, Task};
use serde::Serialize;

/// Counts and time totals over the full collection, ignoring any view filters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub overdue: usize,
    pub total_estimated_minutes: u64,
    pub total_spent_minutes: u64,
    /// Spent over estimated, as a percentage capped at 100
    pub productivity_ratio: f64,
}

impl Statistics {
    /// Productivity ratio with one decimal place, e.g. "25.0%"
    pub fn productivity_label(&self) -> String {
        format!("{:.1}%", self.productivity_ratio)
    }
}

pub fn stats(tasks: &[Task]) -> Statistics {
    let mut statistics = Statistics {
        total: tasks.len(),
        ..Statistics::default()
    };

    for task in tasks {
        match task.status {
            Status::Completed => statistics.completed += 1,
            Status::InProgress => statistics.in_progress += 1,
            Status::Overdue => statistics.overdue += 1,
            Status::Pending => {}
        }
        statistics.total_estimated_minutes += u64::from(task.estimated_duration);
        statistics.total_spent_minutes += u64::from(task.time_spent);
    }

    if statistics.total_estimated_minutes > 0 {
        let ratio = statistics.total_spent_minutes as f64 / statistics.total_estimated_minutes as f64 * 100.0;
        statistics.productivity_ratio = ratio.min(100.0);
    }

    statistics
}

/// Render a minute count as "Hh Mm"
pub fn format_minutes(minutes: u64) -> String {
    format!("{}h {}m", minutes / 60, minutes % 60)
}
