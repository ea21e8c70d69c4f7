mod browser;
mod config;
mod db;
mod error;
mod export;
mod extract;
mod models;
mod notify;
mod reminders;
mod stats;
mod store;
mod tui;
mod views;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use browser::{PageFetcher, SpaWatcher};
use config::Config;
use db::Database;
use models::{parse_date, ApplicationRecord, ApplicationStatus, RecordPatch};
use notify::{ConsoleNotifier, Notifier, Urgency};
use reminders::ReminderDaemon;
use store::{InsertOutcome, RecordStore};
use views::StatusFilter;

#[derive(Parser)]
#[command(name = "jobtrack")]
#[command(about = "Track job applications - capture postings, update status, get follow-up reminders")]
struct Cli {
    /// Database file (overrides config and JOBTRACK_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// List supported job boards
    Sites,

    /// Extract a job from a posting page
    Capture {
        /// Posting URL
        url: String,

        /// Read the page from a saved HTML file instead of fetching it
        #[arg(long)]
        html_file: Option<PathBuf>,

        /// Save the job to the tracker
        #[arg(short, long)]
        save: bool,
    },

    /// Open a board in a WebDriver browser and capture jobs as you click through
    WatchPage {
        /// Starting URL
        url: String,

        /// Save each recognized job
        #[arg(short, long)]
        save: bool,
    },

    /// Track a job entered by hand
    Add {
        #[arg(short, long)]
        company: String,

        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        location: Option<String>,

        #[arg(short, long)]
        url: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// List applications, newest first
    List {
        /// all, Applied (incl. Screening), Interview, or an exact status
        #[arg(short, long, default_value = "all")]
        status: String,

        /// Case-insensitive match on company, title, or location
        #[arg(short = 'q', long, default_value = "")]
        search: String,
    },

    /// Show one application
    Show {
        /// Application ID
        id: String,
    },

    /// Change status, notes, or dates of an application
    Update {
        /// Application ID
        id: String,

        /// New status, e.g. "Applied" or interview-scheduled
        #[arg(short, long, value_parser = parse_status)]
        status: Option<ApplicationStatus>,

        #[arg(short, long)]
        notes: Option<String>,

        /// Follow-up date (YYYY-MM-DD), or "none" to clear
        #[arg(short, long)]
        follow_up: Option<String>,

        /// Date applied (YYYY-MM-DD), or "none" to clear
        #[arg(short, long)]
        applied: Option<String>,
    },

    /// Remove one application
    Delete {
        /// Application ID
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Remove every application
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Counts per status
    Stats {
        /// Header counters only (Applied includes Screening, Offer includes Accepted)
        #[arg(long)]
        quick: bool,

        #[arg(long)]
        json: bool,
    },

    /// List upcoming follow-up reminders
    Reminders,

    /// Schedule follow-up timers and deliver the ones that are due
    Remind {
        /// Keep running, checking every poll interval
        #[arg(short, long)]
        watch: bool,
    },

    /// Export applications to CSV
    Export {
        /// Output file (default: job-applications-<date>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write a JSON backup instead of CSV
        #[arg(long)]
        json: bool,
    },

    /// Import applications from a JSON backup
    Import {
        /// JSON array of applications, or an object with an "applications" array
        file: PathBuf,
    },

    /// Interactive list view
    Browse,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobtrack=warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let db_path = cli.db.clone().unwrap_or_else(|| config.database_path());
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let notifier = ConsoleNotifier;

    if let Commands::Init = cli.command {
        db.init()?;
        println!("Database initialized at {}", db.path().display());
        return Ok(());
    }
    db.ensure_initialized()?;

    let mut store = RecordStore::new(&db);
    let changes = store.subscribe();

    run(cli.command, &mut store, &config, &notifier)?;

    // Any committed change moves the follow-up timers along with it.
    if let Some(latest) = changes.try_iter().last() {
        match reminders::reconcile(&db, &latest, Utc::now()) {
            Ok(report) => debug!(?report, "reminders reconciled after change"),
            Err(e) => warn!(error = %e, "could not reschedule reminders"),
        }
    }

    Ok(())
}

fn run(command: Commands, store: &mut RecordStore, config: &Config, notifier: &dyn Notifier) -> Result<()> {
    match command {
        Commands::Init => unreachable!("handled before the store is opened"),

        Commands::Sites => {
            for site in extract::SITES.iter() {
                println!("{}", site.domain);
            }
        }

        Commands::Capture { url, html_file, save } => {
            let html = match html_file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read HTML file: {}", path.display()))?,
                None => PageFetcher::new()?.fetch(&url)?,
            };

            let Some(candidate) = extract::capture(&html, &url, Utc::now()) else {
                match extract::hostname(&url).and_then(|h| extract::identify_site(&h)) {
                    Some(site) => println!("No job posting recognized on this {} page.", site.domain),
                    None => println!("Not a supported job board. Run 'jobtrack sites' for the list."),
                }
                return Ok(());
            };

            print_candidate(&candidate);
            if save {
                save_candidate(store, candidate, notifier)?;
            } else if let Some(existing) = store.find(&candidate.id)? {
                println!("Already tracked - {}", existing.status);
            } else {
                println!("\nNot saved. Re-run with --save to track it.");
            }
        }

        Commands::WatchPage { url, save } => {
            let watcher = SpaWatcher {
                webdriver_url: config.webdriver_url.clone(),
                settle_delay: config.settle_delay(),
                poll_interval: std::time::Duration::from_secs(1),
            };
            println!("Watching for job postings. Press Ctrl-C to stop.");
            watcher.watch(&url, |candidate| {
                println!();
                print_candidate(candidate);
                if save {
                    save_candidate(store, candidate.clone(), notifier)?;
                } else if let Some(existing) = store.find(&candidate.id)? {
                    println!("Already tracked - {}", existing.status);
                }
                Ok(())
            })?;
        }

        Commands::Add {
            company,
            title,
            location,
            url,
            description,
        } => {
            if company.trim().is_empty() || title.trim().is_empty() {
                return Err(anyhow!("Company and title must not be empty"));
            }
            let url = url.unwrap_or_default();
            let source = extract::hostname(&url).unwrap_or_else(|| "manual".to_string());
            let candidate = ApplicationRecord::candidate(
                company.trim(),
                title.trim(),
                location.as_deref(),
                description.as_deref(),
                &url,
                &source,
                Utc::now(),
            );
            save_candidate(store, candidate, notifier)?;
        }

        Commands::List { status, search } => {
            let records = store.load()?;
            let shown = views::apply_filters(&records, &StatusFilter::parse(&status), &search);
            if shown.is_empty() {
                if search.is_empty() {
                    println!("No applications found.");
                } else {
                    println!("No matching applications.");
                }
            } else {
                let now = Utc::now();
                println!("{:<32} {:<20} {:<28} {:<20} {:<14}", "ID", "STATUS", "TITLE", "COMPANY", "ADDED");
                println!("{}", "-".repeat(118));
                for job in &shown {
                    println!(
                        "{:<32} {:<20} {:<28} {:<20} {:<14}",
                        truncate(&job.id, 30),
                        job.status,
                        truncate(&job.job_title, 26),
                        truncate(&job.company_name, 18),
                        views::relative_date(job.effective_date(), now)
                    );
                }
                println!("\n{} of {} applications", shown.len(), records.len());
            }
        }

        Commands::Show { id } => match store.find(&id)? {
            Some(job) => print_record(&job),
            None => not_found(store, &id)?,
        },

        Commands::Update {
            id,
            status,
            notes,
            follow_up,
            applied,
        } => {
            let patch = RecordPatch {
                status,
                notes,
                follow_up_date: follow_up.as_deref().map(parse_date_arg).transpose()?,
                date_applied: applied.as_deref().map(parse_date_arg).transpose()?,
            };
            if patch.is_empty() {
                return Err(anyhow!("Nothing to update. Pass --status, --notes, --follow-up, or --applied."));
            }
            let updated = report_failure(
                store.update(&id, &patch, Utc::now()).map_err(Into::into),
                notifier,
                "Failed to update job",
            )?;
            match updated {
                Some(job) => println!("Updated '{}': {}", job.id, job.status),
                None => not_found(store, &id)?,
            }
        }

        Commands::Delete { id, yes } => {
            let Some(job) = store.find(&id)? else {
                return not_found(store, &id);
            };
            let prompt = format!("Delete {} at {} from the tracker?", job.job_title, job.company_name);
            if !yes && !confirm(&prompt)? {
                println!("Cancelled.");
                return Ok(());
            }
            report_failure(store.delete(&id).map_err(Into::into), notifier, "Failed to delete job")?;
            println!("Job removed from tracker");
        }

        Commands::Clear { yes } => {
            let count = store.load()?.len();
            if count == 0 {
                println!("No applications to delete.");
                return Ok(());
            }
            let prompt = format!(
                "Delete all {} tracked applications? This cannot be undone.",
                count
            );
            if !yes && !confirm(&prompt)? {
                println!("Cancelled.");
                return Ok(());
            }
            let removed = report_failure(store.clear().map_err(Into::into), notifier, "Failed to delete jobs")?;
            println!("Deleted {} applications.", removed);
        }

        Commands::Stats { quick, json } => {
            let records = store.load()?;
            if quick {
                let q = stats::quick_stats(&records);
                if json {
                    println!("{}", serde_json::to_string_pretty(&q)?);
                } else {
                    println!("Total:     {}", q.total);
                    println!("Applied:   {}", q.applied);
                    println!("Interview: {}", q.interview);
                    println!("Offer:     {}", q.offer);
                }
            } else {
                let s = stats::compute_stats(&records);
                if json {
                    println!("{}", serde_json::to_string_pretty(&s)?);
                } else {
                    for (label, count) in s.buckets() {
                        println!("{:<16} {:>5}", label, count);
                    }
                    println!("{}", "-".repeat(22));
                    println!("{:<16} {:>5}", "Total", s.total);
                    let uncounted = s.total - s.counted();
                    if uncounted > 0 {
                        println!("({} with an unrecognized status)", uncounted);
                    }
                }
            }
        }

        Commands::Reminders => {
            let now = Utc::now();
            let pending = reminders::pending_reminders(&store.load()?, now);
            if pending.is_empty() {
                println!("No upcoming follow-ups.");
            } else {
                println!("{:<12} {:<10} {:<30} {:<20} {:<30}", "DATE", "IN", "TITLE", "COMPANY", "ID");
                println!("{}", "-".repeat(106));
                for r in pending {
                    let days = (r.fire_at - now).num_days();
                    let due_in = if days == 0 { "today".to_string() } else { format!("{} days", days) };
                    println!(
                        "{:<12} {:<10} {:<30} {:<20} {:<30}",
                        r.fire_at.format("%Y-%m-%d"),
                        due_in,
                        truncate(&r.job_title, 28),
                        truncate(&r.company_name, 18),
                        r.record_id
                    );
                }
            }
        }

        Commands::Remind { watch } => {
            let mut daemon = ReminderDaemon::new(store.database(), notifier);
            if watch {
                println!(
                    "Watching follow-ups every {}s. Press Ctrl-C to stop.",
                    config.poll_interval().as_secs()
                );
                daemon.run(config.poll_interval());
            }
            let fired = daemon.tick(Utc::now())?;
            let scheduled = reminders::pending_reminders(&store.load()?, Utc::now()).len();
            println!("{} reminders scheduled, {} delivered now.", scheduled, fired);
        }

        Commands::Export { output, json } => {
            let records = store.load()?;
            let (content, default_name) = if json {
                let name = format!("job-applications-{}.json", Utc::now().format("%Y-%m-%d"));
                (export::to_json(&records)?, name)
            } else {
                (export::to_csv(&records), export::export_file_name(Utc::now().date_naive()))
            };
            let path = output.unwrap_or_else(|| PathBuf::from(default_name));
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            println!("Exported {} applications to {}", records.len(), path.display());
        }

        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let incoming = match serde_json::from_str::<Backup>(&text)
                .with_context(|| format!("{} is not an applications backup", file.display()))?
            {
                Backup::List(records) => records,
                Backup::Wrapped { applications } => applications,
            };
            let total = incoming.len();
            let added = report_failure(store.import(incoming).map_err(Into::into), notifier, "Failed to import jobs")?;
            println!("Imported {} of {} applications ({} already tracked).", added, total, total - added);
        }

        Commands::Browse => tui::run_browse(store)?,
    }

    Ok(())
}

/// Accepted shapes for `import`: a bare array or a storage dump.
#[derive(Deserialize)]
#[serde(untagged)]
enum Backup {
    List(Vec<ApplicationRecord>),
    Wrapped { applications: Vec<ApplicationRecord> },
}

fn save_candidate(store: &mut RecordStore, candidate: ApplicationRecord, notifier: &dyn Notifier) -> Result<()> {
    let outcome = report_failure(
        store.insert(candidate, Utc::now()).map_err(Into::into),
        notifier,
        "Failed to save job",
    )?;
    match outcome {
        InsertOutcome::Inserted(job) => {
            notifier.show(
                "Job Saved!",
                &format!("{} at {}", job.job_title, job.company_name),
                Urgency::Normal,
            );
            println!("Saved as '{}'", job.id);
        }
        InsertOutcome::AlreadyTracked(job) => {
            println!("Already tracked - {} (use 'jobtrack update {}')", job.status, job.id);
        }
    }
    Ok(())
}

/// Shows a transient failure notice for a user action, then passes the
/// error on.
fn report_failure<T>(result: Result<T>, notifier: &dyn Notifier, message: &str) -> Result<T> {
    result.map_err(|e| {
        notifier.show("Job Tracker", message, Urgency::Normal);
        e.context(message.to_string())
    })
}

fn not_found(store: &RecordStore, id: &str) -> Result<()> {
    println!("Application '{}' not found.", id);
    let records = store.load()?;
    let closest = records
        .iter()
        .map(|r| (strsim::jaro_winkler(id, &r.id), &r.id))
        .filter(|(score, _)| *score > 0.8)
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    if let Some((_, suggestion)) = closest {
        println!("Did you mean '{}'?", suggestion);
    }
    Ok(())
}

fn parse_date_arg(raw: &str) -> Result<Option<NaiveDate>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_date(raw)
        .map(Some)
        .ok_or_else(|| anyhow!("Invalid date '{}'. Use YYYY-MM-DD or 'none'.", raw))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_candidate(job: &ApplicationRecord) {
    println!("Title:    {}", job.job_title);
    println!("Company:  {}", job.company_name);
    println!("Location: {}", job.location);
    println!("ID:       {}", job.id);
}

fn print_record(job: &ApplicationRecord) {
    println!("{}", job.job_title);
    println!("at {}", job.company_name);
    println!("ID: {}", job.id);
    println!("Location: {}", job.location);
    println!("Status: {}", job.status);
    if !job.url.is_empty() {
        println!("URL: {}", job.url);
    }
    if !job.source.is_empty() {
        println!("Source: {}", job.source);
    }
    println!("Found: {}", job.date_found.format("%Y-%m-%d %H:%M"));
    if let Some(added) = job.date_added {
        println!("Added: {}", added.format("%Y-%m-%d %H:%M"));
    }
    if let Some(applied) = job.date_applied {
        println!("Applied: {}", applied);
    }
    if let Some(follow_up) = job.follow_up_date {
        println!("Follow up: {}", follow_up);
    }
    if let Some(updated) = job.last_updated {
        println!("Last updated: {}", updated.format("%Y-%m-%d %H:%M"));
    }
    if !job.notes.is_empty() {
        println!("\n--- Notes ---\n{}", textwrap::fill(&job.notes, 80));
    }
    if !job.description.is_empty() {
        println!("\n--- Description ---\n{}", textwrap::fill(&job.description, 80));
    }
}

fn parse_status(s: &str) -> Result<ApplicationStatus, String> {
    s.parse()
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
