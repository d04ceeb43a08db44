// Task store: the owned, persisted task collection

use crate::clock::{Clock, SystemClock};
use crate::filter::{Query, view};
use crate::ids::{IdGenerator, UuidIds};
use crate::persist::{self, ImportError};
use crate::slot::Slot;
use crate::stats::{Statistics, stats};
use crate::task::{DraftError, Status, Task, TaskDraft, TaskId};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::io::Read;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Draft(#[from] DraftError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("failed to persist tasks: {0:#}")]
    Storage(eyre::Report),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Ordered task collection persisted to a durable slot
///
/// Every mutation builds the next collection, writes it to the slot and only
/// then replaces the in-memory state, so a failed write leaves the store as it
/// was. Lookups that miss return `None`/`false` rather than an error.
pub struct TaskStore {
    slot: Box<dyn Slot>,
    tasks: Vec<Task>,
    ids: Box<dyn IdGenerator>,
    clock: Box<dyn Clock>,
}

impl TaskStore {
    /// Open a store over `slot`, loading whatever collection it holds
    pub fn open(slot: impl Slot + 'static) -> Self {
        let tasks = persist::load(&slot);
        Self {
            slot: Box::new(slot),
            tasks,
            ids: Box::new(UuidIds),
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Snapshot of the collection in insertion order
    pub fn all(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }

    pub fn view(&self, query: &Query) -> Vec<&Task> {
        view(&self.tasks, query)
    }

    pub fn stats(&self) -> Statistics {
        stats(&self.tasks)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Append a new task built from `draft`
    pub fn create(&mut self, draft: &TaskDraft) -> Result<Task> {
        let fields = draft.parse()?;
        let id = fresh_id(self.ids.as_mut(), &self.tasks);
        let task = Task::from_draft(id, fields, self.clock.now());

        let mut next = self.tasks.clone();
        next.push(task.clone());
        self.commit(next)?;

        debug!(id = %task.id, status = %task.status, "Created task");
        Ok(task)
    }

    /// Replace the mutable fields of task `id` with the draft's values
    pub fn update(&mut self, id: &TaskId, draft: &TaskDraft) -> Result<Option<Task>> {
        let Some(index) = self.position(id) else {
            debug!(id = %id, "Update of unknown task");
            return Ok(None);
        };
        let fields = draft.parse()?;

        let mut next = self.tasks.clone();
        let now = advance(next[index].last_modified, self.clock.now());
        next[index].apply(fields, now);
        let task = next[index].clone();
        self.commit(next)?;

        debug!(id = %task.id, status = %task.status, "Updated task");
        Ok(Some(task))
    }

    /// Remove task `id`; returns whether anything was removed
    pub fn delete(&mut self, id: &TaskId) -> Result<bool> {
        let Some(index) = self.position(id) else {
            debug!(id = %id, "Delete of unknown task");
            return Ok(false);
        };

        let mut next = self.tasks.clone();
        next.remove(index);
        self.commit(next)?;

        debug!(id = %id, "Deleted task");
        Ok(true)
    }

    /// Flip between completed and pending
    pub fn toggle_complete(&mut self, id: &TaskId) -> Result<Option<Task>> {
        let Some(index) = self.position(id) else {
            debug!(id = %id, "Toggle of unknown task");
            return Ok(None);
        };

        let mut next = self.tasks.clone();
        let task = &mut next[index];
        let now = advance(task.last_modified, self.clock.now());
        let status = if task.is_completed() {
            Status::Pending
        } else {
            Status::Completed
        };
        task.set_status(status, now);
        task.last_modified = now;
        let task = task.clone();
        self.commit(next)?;

        debug!(id = %task.id, status = %task.status, "Toggled task completion");
        Ok(Some(task))
    }

    /// Wholesale replacement of the collection
    ///
    /// The collection must pass the same checks as an import document, so
    /// whatever is saved here loads back on the next open.
    pub fn replace_all(&mut self, tasks: Vec<Task>) -> Result<()> {
        persist::validate(&tasks)?;

        let count = tasks.len();
        self.commit(tasks)?;
        info!(count, "Replaced task collection");
        Ok(())
    }

    /// Validate `text` as an import document and replace the collection with it
    ///
    /// On any error the current collection is left untouched. Returns the
    /// number of imported tasks.
    pub fn import_document(&mut self, text: &str) -> Result<usize> {
        let tasks = persist::import_document(text)?;
        let count = tasks.len();
        self.replace_all(tasks)?;
        Ok(count)
    }

    pub fn import_from<R: Read>(&mut self, reader: R) -> Result<usize> {
        let tasks = persist::import_from(reader)?;
        let count = tasks.len();
        self.replace_all(tasks)?;
        Ok(count)
    }

    pub fn export_document(&self) -> eyre::Result<String> {
        persist::export_document(&self.tasks)
    }

    /// Move unfinished tasks whose due moment precedes `now` to overdue
    ///
    /// Only pending and in-progress tasks are touched. Returns how many tasks
    /// changed; nothing is written when none did.
    pub fn mark_overdue(&mut self, now: NaiveDateTime) -> Result<usize> {
        let stamp = self.clock.now();
        let mut next = self.tasks.clone();
        let mut changed = 0;

        for task in next
            .iter_mut()
            .filter(|task| matches!(task.status, Status::Pending | Status::InProgress))
            .filter(|task| task.is_past_due(now))
        {
            let stamp = advance(task.last_modified, stamp);
            task.set_status(Status::Overdue, stamp);
            task.last_modified = stamp;
            changed += 1;
        }

        if changed > 0 {
            self.commit(next)?;
            info!(count = changed, "Marked tasks overdue");
        }
        Ok(changed)
    }

    /// Insert the demonstration tasks into an empty store
    ///
    /// Returns the number of tasks added, zero when the store already has tasks.
    pub fn seed_samples(&mut self) -> Result<usize> {
        if !self.tasks.is_empty() {
            return Ok(0);
        }

        let mut next = Vec::new();
        for draft in sample_drafts() {
            let fields = draft.parse()?;
            let id = fresh_id(self.ids.as_mut(), &next);
            next.push(Task::from_draft(id, fields, self.clock.now()));
        }

        let count = next.len();
        self.commit(next)?;
        info!(count, "Seeded sample tasks");
        Ok(count)
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| &task.id == id)
    }

    fn commit(&mut self, next: Vec<Task>) -> Result<()> {
        persist::save(self.slot.as_mut(), &next).map_err(StoreError::Storage)?;
        self.tasks = next;
        Ok(())
    }
}

fn fresh_id(ids: &mut dyn IdGenerator, taken: &[Task]) -> TaskId {
    loop {
        let id = ids.next_id();
        if !taken.iter().any(|task| task.id == id) {
            return id;
        }
        debug!(id = %id, "Generated id already in use, retrying");
    }
}

// lastModified moves forward on every change, even within one clock tick
fn advance(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    now.max(previous + Duration::milliseconds(1))
}

fn sample_drafts() -> [TaskDraft; 3] {
    [
        TaskDraft {
            title: "Complete project proposal".to_string(),
            description: "Finish the project proposal and send to client for review".to_string(),
            priority: "high".to_string(),
            status: "in-progress".to_string(),
            due_date: "2023-06-30".to_string(),
            due_time: "17:00".to_string(),
            estimated_duration: "120".to_string(),
            time_spent: "45".to_string(),
        },
        TaskDraft {
            title: "Team meeting".to_string(),
            description: "Weekly team sync meeting".to_string(),
            priority: "medium".to_string(),
            status: "pending".to_string(),
            due_date: "2023-06-25".to_string(),
            due_time: "10:30".to_string(),
            estimated_duration: "60".to_string(),
            time_spent: "0".to_string(),
        },
        TaskDraft {
            title: "Research new technologies".to_string(),
            description: "Look into new frameworks and tools for upcoming project".to_string(),
            priority: "low".to_string(),
            status: "completed".to_string(),
            due_date: "2023-07-05".to_string(),
            due_time: String::new(),
            estimated_duration: "180".to_string(),
            time_spent: "210".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::StepClock;
    use crate::filter::{SortDirection, SortKey};
    use crate::ids::SequentialIds;
    use crate::persist::TASKS_KEY;
    use crate::slot::{MemorySlot, SqliteSlot};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use eyre::eyre;
    use tempfile::TempDir;

    fn test_store() -> TaskStore {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        TaskStore::open(MemorySlot::new())
            .with_id_generator(SequentialIds::default())
            .with_clock(StepClock::new(start, Duration::seconds(1)))
    }

    fn draft(title: &str, priority: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            priority: priority.to_string(),
            estimated_duration: "30".to_string(),
            ..TaskDraft::default()
        }
    }

    /// Slot whose writes always fail
    struct BrokenSlot;

    impl Slot for BrokenSlot {
        fn read(&self, _key: &str) -> eyre::Result<Option<String>> {
            Ok(None)
        }

        fn write(&mut self, _key: &str, _value: &str) -> eyre::Result<()> {
            Err(eyre!("disk full"))
        }
    }

    #[test]
    fn test_create_appends_with_fresh_ids() {
        let mut store = test_store();
        let a = store.create(&draft("A", "low")).unwrap();
        let b = store.create(&draft("B", "high")).unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(store.len(), 2);
        assert_eq!(store.all()[0].id, a.id);
        assert_eq!(store.all()[1].id, b.id);
        assert_eq!(a.created_at, a.last_modified);
        assert_eq!(a.estimated_duration, 30);
    }

    #[test]
    fn test_create_rejects_empty_title() {
        let mut store = test_store();
        let err = store.create(&TaskDraft::new("")).unwrap_err();
        assert!(matches!(err, StoreError::Draft(DraftError::EmptyTitle)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_create_skips_ids_in_use() {
        let mut store = test_store();
        store
            .import_document(r#"[{"id":"1","title":"x","priority":"low","status":"pending"}]"#)
            .unwrap();

        let task = store.create(&draft("A", "low")).unwrap();
        assert_eq!(task.id.as_str(), "2");
    }

    #[test]
    fn test_mutations_persist() {
        let temp = TempDir::new().unwrap();
        let id = {
            let mut store = TaskStore::open(SqliteSlot::open(temp.path()).unwrap());
            let task = store.create(&draft("Persist me", "medium")).unwrap();
            store.toggle_complete(&task.id).unwrap();
            task.id
        };

        let store = TaskStore::open(SqliteSlot::open(temp.path()).unwrap());
        let task = store.get(&id).unwrap();
        assert_eq!(task.title, "Persist me");
        assert_eq!(task.status, Status::Completed);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_update_replaces_fields_and_keeps_identity() {
        let mut store = test_store();
        let original = store.create(&draft("Old", "low")).unwrap();

        let mut changes = TaskDraft::from(&original);
        changes.title = "New".to_string();
        changes.priority = "high".to_string();
        changes.time_spent = "12".to_string();
        let updated = store.update(&original.id, &changes).unwrap().unwrap();

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert!(updated.last_modified > original.last_modified);
        assert_eq!(updated.title, "New");
        assert_eq!(updated.time_spent, 12);
        assert_eq!(store.get(&original.id), Some(&updated));
    }

    #[test]
    fn test_update_status_maintains_completed_at() {
        let mut store = test_store();
        let task = store.create(&draft("A", "low")).unwrap();

        let mut changes = TaskDraft::from(&task);
        changes.status = "completed".to_string();
        let done = store.update(&task.id, &changes).unwrap().unwrap();
        assert!(done.completed_at.is_some());

        changes.status = "in-progress".to_string();
        let reopened = store.update(&task.id, &changes).unwrap().unwrap();
        assert_eq!(reopened.completed_at, None);
    }

    #[test]
    fn test_update_unknown_id() {
        let mut store = test_store();
        let result = store.update(&TaskId::new("missing"), &draft("A", "low")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_delete() {
        let mut store = test_store();
        let a = store.create(&draft("A", "low")).unwrap();
        let b = store.create(&draft("B", "low")).unwrap();

        assert!(store.delete(&a.id).unwrap());
        assert!(!store.delete(&a.id).unwrap());
        assert_eq!(store.len(), 1);
        assert_eq!(store.all()[0].id, b.id);
    }

    #[test]
    fn test_toggle_complete_is_an_involution() {
        let mut store = test_store();
        let task = store.create(&draft("A", "low")).unwrap();
        assert_eq!(task.completed_at, None);

        let done = store.toggle_complete(&task.id).unwrap().unwrap();
        assert_eq!(done.status, Status::Completed);
        assert!(done.completed_at.is_some());
        assert!(done.last_modified > task.last_modified);

        let back = store.toggle_complete(&task.id).unwrap().unwrap();
        assert_eq!(back.status, Status::Pending);
        assert_eq!(back.completed_at, None);
        assert!(back.last_modified > done.last_modified);
    }

    #[test]
    fn test_last_modified_advances_within_one_tick() {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut store = TaskStore::open(MemorySlot::new())
            .with_id_generator(SequentialIds::default())
            .with_clock(StepClock::new(start, Duration::zero()));
        let task = store.create(&draft("A", "low")).unwrap();

        let done = store.toggle_complete(&task.id).unwrap().unwrap();
        let back = store.toggle_complete(&task.id).unwrap().unwrap();
        assert!(done.last_modified > task.last_modified);
        assert!(back.last_modified > done.last_modified);

        let edited = store.update(&task.id, &TaskDraft::from(&back)).unwrap().unwrap();
        assert!(edited.last_modified > back.last_modified);
        assert_eq!(edited.created_at, start);
    }

    #[test]
    fn test_update_unknown_id_ignores_bad_draft() {
        let mut store = test_store();
        let result = store.update(&TaskId::new("missing"), &TaskDraft::new("")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_toggle_unknown_id() {
        let mut store = test_store();
        assert!(store.toggle_complete(&TaskId::new("nope")).unwrap().is_none());
    }

    #[test]
    fn test_import_failure_leaves_store_unchanged() {
        let mut store = test_store();
        store.create(&draft("Keep me", "low")).unwrap();
        let before = store.all().to_vec();

        let err = store.import_document(r#"[{"id":1,"title":"x"}]"#).unwrap_err();
        assert!(matches!(err, StoreError::Import(ImportError::MissingField { .. })));
        assert_eq!(store.all(), before.as_slice());

        let err = store.import_document("not json").unwrap_err();
        assert!(matches!(err, StoreError::Import(ref e) if e.is_parse_error()));
        assert_eq!(store.all(), before.as_slice());
    }

    #[test]
    fn test_import_replaces_collection() {
        let mut store = test_store();
        store.create(&draft("Old", "low")).unwrap();

        let count = store
            .import_document(
                r#"[{"id":"x1","title":"One","priority":"high","status":"pending"},
                    {"id":"x2","title":"Two","priority":"low","status":"overdue"}]"#,
            )
            .unwrap();

        assert_eq!(count, 2);
        let titles: Vec<&str> = store.all().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["One", "Two"]);
    }

    #[test]
    fn test_export_then_import_round_trip() {
        let mut store = test_store();
        store.create(&draft("A", "low")).unwrap();
        let b = store.create(&draft("B", "high")).unwrap();
        store.toggle_complete(&b.id).unwrap();
        let document = store.export_document().unwrap();

        let mut other = test_store();
        other.import_document(&document).unwrap();
        assert_eq!(other.all(), store.all());
    }

    #[test]
    fn test_replace_all_rejects_duplicate_ids() {
        let mut store = test_store();
        let task = store.create(&draft("A", "low")).unwrap();

        let err = store.replace_all(vec![task.clone(), task]).unwrap_err();
        assert!(matches!(err, StoreError::Import(ImportError::DuplicateId(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replace_all_rejects_blank_fields() {
        let mut store = test_store();
        let a = store.create(&draft("A", "low")).unwrap();
        let mut b = store.create(&draft("B", "low")).unwrap();

        b.title = String::new();
        let err = store.replace_all(vec![a.clone(), b.clone()]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Import(ImportError::MissingField { index: 1, field: "title" })
        ));

        b.title = "B".to_string();
        b.id = TaskId::new("  ");
        let err = store.replace_all(vec![a, b]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Import(ImportError::MissingField { index: 1, field: "id" })
        ));
        assert_eq!(store.all()[1].title, "B");
    }

    #[test]
    fn test_replace_all_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let mut store = TaskStore::open(SqliteSlot::open(temp.path()).unwrap());
        let a = store.create(&draft("A", "low")).unwrap();
        let mut b = store.create(&draft("B", "high")).unwrap();

        b.title = String::new();
        assert!(store.replace_all(vec![a.clone(), b.clone()]).is_err());

        b.title = "Renamed".to_string();
        store.replace_all(vec![b.clone(), a.clone()]).unwrap();
        drop(store);

        let reopened = TaskStore::open(SqliteSlot::open(temp.path()).unwrap());
        assert_eq!(reopened.all(), [b, a].as_slice());
    }

    #[test]
    fn test_storage_failure_leaves_memory_untouched() {
        let mut store = TaskStore::open(BrokenSlot);
        let err = store.create(&draft("A", "low")).unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_open_with_corrupt_slot_is_empty() {
        let mut slot = MemorySlot::new();
        slot.write(TASKS_KEY, "<<garbage>>").unwrap();
        let store = TaskStore::open(slot);
        assert!(store.is_empty());
    }

    #[test]
    fn test_mark_overdue() {
        let mut store = test_store();
        let mut late = draft("Late", "low");
        late.due_date = "2023-06-25".to_string();
        late.due_time = "10:30".to_string();
        let late = store.create(&late).unwrap();

        let mut done = draft("Done", "low");
        done.due_date = "2023-06-01".to_string();
        done.status = "completed".to_string();
        store.create(&done).unwrap();

        let mut future = draft("Future", "low");
        future.due_date = "2030-01-01".to_string();
        store.create(&future).unwrap();

        store.create(&draft("Undated", "low")).unwrap();

        let now = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
        assert_eq!(store.mark_overdue(now).unwrap(), 1);
        assert_eq!(store.get(&late.id).unwrap().status, Status::Overdue);
        assert_eq!(store.stats().overdue, 1);

        assert_eq!(store.mark_overdue(now).unwrap(), 0);
    }

    #[test]
    fn test_seed_samples_only_when_empty() {
        let mut store = test_store();
        assert_eq!(store.seed_samples().unwrap(), 3);
        assert_eq!(store.seed_samples().unwrap(), 0);

        let statistics = store.stats();
        assert_eq!(statistics.total, 3);
        assert_eq!(statistics.completed, 1);
        assert_eq!(statistics.in_progress, 1);
        assert_eq!(statistics.total_estimated_minutes, 360);
        assert_eq!(statistics.total_spent_minutes, 255);

        let research = &store.all()[2];
        assert!(research.completed_at.is_some());
    }

    #[test]
    fn test_view_through_store() {
        let mut store = test_store();
        store.create(&draft("Team meeting", "medium")).unwrap();
        store.create(&draft("Write report", "high")).unwrap();
        store.create(&draft("Meeting notes", "low")).unwrap();

        let query = Query::new().search("meeting").sort(SortKey::Priority, SortDirection::Asc);
        let titles: Vec<&str> = store.view(&query).iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["Meeting notes", "Team meeting"]);
    }
}
