use chrono::Local;
use clap::{Args, Parser, Subcommand};
use colored::{ColoredString, Colorize};
use eyre::{Result, eyre};
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tasktable::persist::{self, write_export_file};
use tasktable::{
    Config, Filter, IdScheme, Priority, Query, SequentialIds, SortDirection, SortKey, SqliteSlot, Status, StoreError,
    Task, TaskDraft, TaskId, TaskStore, format_minutes,
};

#[derive(Parser)]
#[command(name = "tasktable")]
#[command(about = "TaskTable CLI - Task list with filtering, sorting, statistics and JSON import/export")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to the store directory (default: from config, else the user data directory)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    /// Path to a YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Task fields shared by add and edit
#[derive(Args)]
struct TaskFields {
    /// Longer description
    #[arg(short, long)]
    description: Option<String>,

    /// low, medium or high
    #[arg(short, long)]
    priority: Option<String>,

    /// pending, in-progress, completed or overdue
    #[arg(long)]
    status: Option<String>,

    /// Due date (YYYY-MM-DD, empty to clear)
    #[arg(long)]
    due: Option<String>,

    /// Due time (HH:MM, empty to clear)
    #[arg(long)]
    time: Option<String>,

    /// Estimated duration in minutes
    #[arg(short, long)]
    estimate: Option<String>,

    /// Time already spent in minutes
    #[arg(long)]
    spent: Option<String>,
}

impl TaskFields {
    fn apply(self, draft: &mut TaskDraft) {
        let TaskFields {
            description,
            priority,
            status,
            due,
            time,
            estimate,
            spent,
        } = self;

        for (value, target) in [
            (description, &mut draft.description),
            (priority, &mut draft.priority),
            (status, &mut draft.status),
            (due, &mut draft.due_date),
            (time, &mut draft.due_time),
            (estimate, &mut draft.estimated_duration),
            (spent, &mut draft.time_spent),
        ] {
            if let Some(value) = value {
                *target = value;
            }
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new task
    Add {
        title: String,

        #[command(flatten)]
        fields: TaskFields,
    },

    /// Change fields of an existing task
    Edit {
        id: String,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        #[command(flatten)]
        fields: TaskFields,
    },

    /// Delete a task
    Rm {
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Toggle a task between completed and pending
    Done { id: String },

    /// Show tasks as a table
    List {
        /// Only tasks whose title or description contains this text
        #[arg(short = 'q', long)]
        search: Option<String>,

        /// Status filter, or "all"
        #[arg(long, default_value = "all")]
        status: Filter<Status>,

        /// Priority filter, or "all"
        #[arg(long, default_value = "all")]
        priority: Filter<Priority>,

        /// Sort key (title, priority, dueDate, status, timeSpent, ...)
        #[arg(long)]
        sort: Option<SortKey>,

        /// asc or desc
        #[arg(long)]
        direction: Option<SortDirection>,
    },

    /// Show aggregate statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write all tasks as JSON to a file, a directory (as tasks.json) or stdout ("-")
    Export { path: Option<PathBuf> },

    /// Replace all tasks with the contents of a JSON file ("-" for stdin)
    Import { path: PathBuf },

    /// Mark unfinished tasks past their due time as overdue
    Overdue,

    /// Add demonstration tasks to an empty store
    Sample,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing on stderr so exported JSON on stdout stays clean
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let store_path = cli.store_path.unwrap_or_else(|| config.store_path.clone());
    let mut store = open_store(&config, store_path)?;

    match cli.command {
        Commands::Add { title, fields } => {
            let mut draft = TaskDraft::new(title);
            fields.apply(&mut draft);
            let task = store.create(&draft)?;
            println!("Task added: {} ({})", task.title, task.id);
        }
        Commands::Edit { id, title, fields } => {
            let id = TaskId::new(id);
            let existing = store.get(&id).ok_or_else(|| not_found(&id))?;
            let mut draft = TaskDraft::from(existing);
            if let Some(title) = title {
                draft.title = title;
            }
            fields.apply(&mut draft);
            let task = store.update(&id, &draft)?.ok_or_else(|| not_found(&id))?;
            println!("Task updated: {}", task.title);
        }
        Commands::Rm { id, yes } => {
            let id = TaskId::new(id);
            let title = store.get(&id).ok_or_else(|| not_found(&id))?.title.clone();
            if !yes && !confirm(&format!("Delete task \"{}\"?", title))? {
                println!("Cancelled");
                return Ok(());
            }
            if store.delete(&id)? {
                println!("Task deleted: {}", title);
            }
        }
        Commands::Done { id } => {
            let id = TaskId::new(id);
            let task = store.toggle_complete(&id)?.ok_or_else(|| not_found(&id))?;
            if task.is_completed() {
                println!("Task completed: {}", task.title);
            } else {
                println!("Task marked as pending: {}", task.title);
            }
        }
        Commands::List {
            search,
            status,
            priority,
            sort,
            direction,
        } => {
            let query = Query::new()
                .search(search.unwrap_or_default())
                .status(status)
                .priority(priority)
                .sort(sort.unwrap_or(config.sort), direction.unwrap_or(config.direction));
            print_tasks(&store.view(&query));
        }
        Commands::Stats { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&store.stats())?);
            } else {
                print_stats(&store);
            }
        }
        Commands::Export { path } => match path {
            Some(path) if path.as_os_str() != "-" => {
                let written = write_export_file(&path, store.all())?;
                println!("Exported {} tasks to {}", store.len(), written.display());
            }
            _ => persist::export_to(store.all(), io::stdout().lock())?,
        },
        Commands::Import { path } => {
            let result = if path.as_os_str() == "-" {
                store.import_from(io::stdin().lock())
            } else {
                store.import_from(File::open(&path)?)
            };
            let count = result.map_err(describe_import_error)?;
            println!("Imported {} tasks", count);
        }
        Commands::Overdue => {
            let count = store.mark_overdue(Local::now().naive_local())?;
            println!("{} task(s) marked overdue", count);
        }
        Commands::Sample => {
            let count = store.seed_samples()?;
            if count == 0 {
                println!("Store already has tasks, no samples added");
            } else {
                println!("Added {} sample tasks", count);
            }
        }
    }

    Ok(())
}

fn open_store(config: &Config, store_path: PathBuf) -> Result<TaskStore> {
    let slot = SqliteSlot::open(&store_path)?;
    let mut store = TaskStore::open(slot);

    if config.id_scheme == IdScheme::Sequential {
        let ids = SequentialIds::following(store.all());
        store = store.with_id_generator(ids);
    }
    if config.seed_samples {
        store.seed_samples()?;
    }
    if config.auto_overdue {
        store.mark_overdue(Local::now().naive_local())?;
    }

    Ok(store)
}

fn not_found(id: &TaskId) -> eyre::Report {
    eyre!("No task with id {}", id)
}

fn describe_import_error(err: StoreError) -> eyre::Report {
    match err {
        StoreError::Import(e) if e.is_parse_error() => eyre!("Error parsing file: {}", e),
        StoreError::Import(e) => eyre!("Invalid file format: {}", e),
        other => other.into(),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_tasks(rows: &[&Task]) {
    if rows.is_empty() {
        println!("{}", "No tasks found".dimmed());
        return;
    }

    println!(
        "{}",
        format!(
            "{:<36}  {:<30}  {:<8}  {:<16}  {:<11}  {}",
            "ID", "TITLE", "PRIORITY", "DUE", "STATUS", "TIME"
        )
        .bold()
    );

    for task in rows {
        println!(
            "{:<36}  {:<30}  {}  {:<16}  {}  {}m / {}m ({:.0}%)",
            task.id.as_str(),
            truncate(&task.title, 30),
            priority_cell(task.priority),
            task.due_label(),
            status_cell(task.status),
            task.time_spent,
            task.estimated_duration,
            task.progress_percent(),
        );
    }
}

fn print_stats(store: &TaskStore) {
    let s = store.stats();
    println!(
        "{} {}   {} {}   {} {}   {} {}",
        "Total:".bold(),
        s.total,
        "Completed:".bold(),
        s.completed,
        "In progress:".bold(),
        s.in_progress,
        "Overdue:".bold(),
        s.overdue
    );
    println!(
        "{} {}   {} {}   {} {}",
        "Estimated:".bold(),
        format_minutes(s.total_estimated_minutes),
        "Spent:".bold(),
        format_minutes(s.total_spent_minutes),
        "Productivity:".bold(),
        s.productivity_label()
    );
}

// Pad before colouring so escape codes don't count towards the width
fn priority_cell(priority: Priority) -> ColoredString {
    let cell = format!("{:<8}", priority.as_str());
    match priority {
        Priority::High => cell.red(),
        Priority::Medium => cell.yellow(),
        Priority::Low => cell.green(),
    }
}

fn status_cell(status: Status) -> ColoredString {
    let cell = format!("{:<11}", status.as_str());
    match status {
        Status::Completed => cell.green(),
        Status::InProgress => cell.blue(),
        Status::Overdue => cell.red().bold(),
        Status::Pending => cell.normal(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
