//! dutyplan CLI - Break-Supervision Duty Planner
//!
//! Command-line interface for planning supervision duties, importing
//! lesson timetables (GPU001) and exporting the duty roster (GPU009).

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dutyplan_core::{weekday_index, SchedulerConfig, TeacherId};
use dutyplan_io::{parse_gpu001, render_gpu009, DutyLine};
use dutyplan_scheduler::{generate_assignments, ScheduleOutcome};
use dutyplan_store::{connect, AssignmentRepository, TeacherRepository};

#[derive(Parser)]
#[command(name = "dutyplan")]
#[command(author, version, about = "Break-supervision duty planner", long_about = None)]
struct Cli {
    /// Path to the planner database
    #[arg(long, env = "DUTYPLAN_DB", default_value = "dutyplan.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and schema without planning anything
    InitDb,

    /// Plan supervision duties for a date range
    Schedule {
        /// First date of the range (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        from: String,

        /// Last date of the range (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        to: String,

        /// Number of supervised breaks per school day
        #[arg(long, default_value = "4")]
        breaks_per_day: u8,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import a GPU001 lesson timetable, replacing all stored lessons
    ImportLessons {
        /// GPU001.TXT file path
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Export the duty roster in GPU009 format
    ExportGpu009 {
        /// First date of the range (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        from: String,

        /// Last date of the range (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        to: String,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => cmd_init_db(&cli.db).await,
        Commands::Schedule {
            from,
            to,
            breaks_per_day,
            json,
        } => cmd_schedule(&cli.db, &from, &to, breaks_per_day, json).await,
        Commands::ImportLessons { file } => cmd_import_lessons(&cli.db, &file).await,
        Commands::ExportGpu009 { from, to, output } => {
            cmd_export_gpu009(&cli.db, &from, &to, output.as_deref()).await
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}

async fn cmd_init_db(db: &Path) -> Result<()> {
    connect(db)
        .await
        .with_context(|| format!("opening database {}", db.display()))?;
    println!("database ready at {}", db.display());
    Ok(())
}

async fn cmd_schedule(
    db: &Path,
    from: &str,
    to: &str,
    breaks_per_day: u8,
    json: bool,
) -> Result<()> {
    let start = parse_date(from)?;
    let end = parse_date(to)?;
    anyhow::ensure!(start <= end, "range start {start} lies after end {end}");
    anyhow::ensure!(
        (1..=4).contains(&breaks_per_day),
        "breaks-per-day must be between 1 and 4"
    );

    let pool = connect(db)
        .await
        .with_context(|| format!("opening database {}", db.display()))?;
    let config = SchedulerConfig::from_env();
    info!(%start, %end, breaks_per_day, "starting planning run");

    let outcome = generate_assignments(&pool, start, end, breaks_per_day, &config)
        .await
        .context("planning run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        ScheduleOutcome::Planned(summary) => {
            println!(
                "plan written: {} assignments, status {}, shortfall {}, max deviation {} ({:.2}s)",
                summary.assignments_created,
                summary.status,
                summary.total_shortfall,
                summary.max_dev,
                summary.wall_time_seconds,
            );
            for entry in &summary.shortfalls {
                println!(
                    "  uncovered: slot {} floor {} missing {}",
                    entry.slot_id, entry.floor_id, entry.missing
                );
            }
        }
        ScheduleOutcome::SolverFailed { status } => {
            anyhow::bail!("solver found no usable plan (status {status}); nothing written");
        }
        ScheduleOutcome::SkippedNoFloors => println!("nothing planned: no floors defined"),
        ScheduleOutcome::SkippedNoTeachers => {
            println!("nothing planned: no non-exempt teachers found");
        }
        ScheduleOutcome::SkippedNoDemand => {
            println!("nothing planned: no break slot in the range carries demand");
        }
    }
    Ok(())
}

async fn cmd_import_lessons(db: &Path, file: &Path) -> Result<()> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("reading lesson file {}", file.display()))?;
    let (lessons, stats) = parse_gpu001(&content);

    let pool = connect(db)
        .await
        .with_context(|| format!("opening database {}", db.display()))?;
    let teachers = TeacherRepository::new(pool.clone());
    let by_abbreviation = teachers.abbreviation_index().await?;

    let mut grouped: HashMap<TeacherId, BTreeSet<(u8, u8)>> = HashMap::new();
    let mut unknown_teachers = 0usize;
    for lesson in lessons {
        match by_abbreviation.get(&lesson.abbreviation) {
            Some(&teacher_id) => {
                grouped
                    .entry(teacher_id)
                    .or_default()
                    .insert((lesson.weekday, lesson.hour));
            }
            None => unknown_teachers += 1,
        }
    }
    if unknown_teachers > 0 {
        warn!(unknown_teachers, "lesson lines referenced unknown abbreviations");
    }

    let imported = teachers.replace_lessons(&grouped).await?;
    println!(
        "lessons imported: processed {}, imported {}, errors {}, unknown teachers {}",
        stats.processed, imported, stats.errors, unknown_teachers
    );
    Ok(())
}

async fn cmd_export_gpu009(
    db: &Path,
    from: &str,
    to: &str,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let start = parse_date(from)?;
    let end = parse_date(to)?;
    anyhow::ensure!(start <= end, "range start {start} lies after end {end}");

    let pool = connect(db)
        .await
        .with_context(|| format!("opening database {}", db.display()))?;
    let records = AssignmentRepository::new(pool.clone())
        .list_export_records(start, end)
        .await?;

    let lines: Vec<DutyLine> = records
        .into_iter()
        .map(|record| DutyLine {
            floor_name: record.floor_name,
            abbreviation: record.abbreviation,
            last_name: record.last_name,
            weekday: weekday_index(record.date),
            break_index: record.break_index.clamp(1, u8::MAX.into()) as u8,
        })
        .collect();
    let text = render_gpu009(&lines);

    match output {
        Some(path) => {
            fs::write(path, &text).with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {} duty lines to {}", lines.len(), path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
