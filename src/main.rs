use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod aggregate;
mod config;
mod dashboard;
mod db;
mod format;
mod forms;
mod models;
mod pages;
mod report;
mod session;
mod table;

use forms::{CourseChanges, CourseInput, HealthInput, SocialInput, StudentChanges, StudentInput};
use models::EnrollmentStatus;
use pages::{ListOptions, Page};
use report::{ReportData, ReportKind};

#[derive(Parser)]
#[command(name = "ong-admin")]
#[command(about = "Administração da ONG Amar Sem Limites: alunos, cursos, frequência e relatórios", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ListArgs {
    /// Filter rows by name (case-insensitive)
    #[arg(long)]
    search: Option<String>,
    /// Print the detail of the row with this id
    #[arg(long)]
    select: Option<String>,
    /// Print the table as JSON
    #[arg(long)]
    json: bool,
}

impl ListArgs {
    fn options(&self) -> ListOptions {
        ListOptions {
            search: self.search.clone(),
            select: self.select.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo data
    Seed,
    /// Import students from a CSV file
    ImportStudents {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List students
    Students(ListArgs),
    /// Register a student
    AddStudent(StudentInput),
    /// Change some fields of a student
    UpdateStudent {
        #[arg(long)]
        id: Uuid,
        #[command(flatten)]
        changes: StudentChanges,
    },
    /// Delete a student with their enrollments and records
    DeleteStudent {
        #[arg(long)]
        id: Uuid,
    },
    /// List courses
    Courses(ListArgs),
    /// Create a course
    AddCourse(CourseInput),
    /// Change some fields of a course
    UpdateCourse {
        #[arg(long)]
        id: Uuid,
        #[command(flatten)]
        changes: CourseChanges,
    },
    /// Delete a course with its enrollments
    DeleteCourse {
        #[arg(long)]
        id: Uuid,
    },
    /// Enroll a student in a course
    Enroll {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        course: Uuid,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Lock (trancar) an enrollment
    LockEnrollment {
        #[arg(long)]
        id: Uuid,
    },
    /// List enrollments
    Enrollments {
        #[arg(long)]
        course: Option<Uuid>,
        #[arg(long)]
        status: Option<String>,
        #[command(flatten)]
        list: ListArgs,
    },
    /// List attendance saved per course and day
    Attendance {
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[command(flatten)]
        list: ListArgs,
    },
    /// Register attendance for a course; everyone not listed as absent is present
    RecordAttendance {
        #[arg(long)]
        course: Uuid,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Enrollment or student id, repeatable
        #[arg(long)]
        absent: Vec<Uuid>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// List social assistance records
    Social(ListArgs),
    /// Register a social assistance record
    AddSocialRecord(SocialInput),
    /// List health records
    Health(ListArgs),
    /// Register a health record
    AddHealthRecord(HealthInput),
    /// Headline numbers and students per course
    Dashboard {
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(value_enum)]
        kind: ReportKind,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// Logs go to stderr so stdout stays clean for tables and JSON.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ong_admin={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_page(page: &Page, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(page)?);
    } else {
        print!("{}", page.to_text());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = config::Config::from_env()?;
    let session = config.session();
    let today = Local::now().date_naive();
    debug!(role = %session.role, user_id = %session.user_id, "session ready");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool, today).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportStudents { csv } => {
            let imported = db::import_students(&pool, &csv, today).await?;
            println!("Imported {imported} students from {}.", csv.display());
        }
        Commands::Students(list) => {
            let page = pages::students_page(&pool, &session, &list.options()).await?;
            print_page(&page, list.json)?;
        }
        Commands::AddStudent(input) => {
            let id = forms::create_student(&pool, &session, input, today).await?;
            println!("Student {id} created.");
        }
        Commands::UpdateStudent { id, changes } => {
            forms::update_student(&pool, &session, id, changes, today).await?;
            println!("Student {id} updated.");
        }
        Commands::DeleteStudent { id } => {
            forms::delete_student(&pool, &session, id).await?;
            println!("Student {id} deleted.");
        }
        Commands::Courses(list) => {
            let page = pages::courses_page(&pool, &session, &list.options()).await?;
            print_page(&page, list.json)?;
        }
        Commands::AddCourse(input) => {
            let id = forms::create_course(&pool, &session, input).await?;
            println!("Course {id} created.");
        }
        Commands::UpdateCourse { id, changes } => {
            forms::update_course(&pool, &session, id, changes).await?;
            println!("Course {id} updated.");
        }
        Commands::DeleteCourse { id } => {
            forms::delete_course(&pool, &session, id).await?;
            println!("Course {id} deleted.");
        }
        Commands::Enroll {
            student,
            course,
            date,
        } => {
            let id =
                forms::enroll(&pool, &session, student, course, date.unwrap_or(today)).await?;
            println!("Enrollment {id} created.");
        }
        Commands::LockEnrollment { id } => {
            forms::lock_enrollment(&pool, &session, id).await?;
            println!("Enrollment {id} locked.");
        }
        Commands::Enrollments {
            course,
            status,
            list,
        } => {
            let status = status
                .as_deref()
                .map(str::parse::<EnrollmentStatus>)
                .transpose()?;
            let page =
                pages::enrollments_page(&pool, &session, course, status, &list.options()).await?;
            print_page(&page, list.json)?;
        }
        Commands::Attendance { since_days, list } => {
            let page =
                pages::attendance_page(&pool, &session, today, since_days, &list.options()).await?;
            print_page(&page, list.json)?;
        }
        Commands::RecordAttendance {
            course,
            date,
            absent,
            reason,
        } => {
            let date = date.unwrap_or(today);
            let written = pages::record_attendance(
                &pool,
                &session,
                course,
                date,
                &absent,
                reason.as_deref(),
            )
            .await?;
            println!("Attendance saved for {written} students on {date}.");
        }
        Commands::Social(list) => {
            let page = pages::social_page(&pool, &session, &list.options()).await?;
            print_page(&page, list.json)?;
        }
        Commands::AddSocialRecord(input) => {
            let id = forms::create_social_record(&pool, &session, input, today).await?;
            println!("Social assistance record {id} created.");
        }
        Commands::Health(list) => {
            let page = pages::health_page(&pool, &session, &list.options()).await?;
            print_page(&page, list.json)?;
        }
        Commands::AddHealthRecord(input) => {
            let id = forms::create_health_record(&pool, &session, input, today).await?;
            println!("Health record {id} created.");
        }
        Commands::Dashboard { json } => {
            let dashboard = dashboard::load(&pool, &session).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
            } else {
                print!("{}", dashboard.to_text());
            }
        }
        Commands::Report { kind, out } => {
            let data = ReportData::load(&pool, &session, kind).await?;
            let report = report::build_report(kind, &session, today, &data);
            let out = out.unwrap_or_else(|| PathBuf::from(kind.default_file_name(today)));
            std::fs::write(&out, report.to_markdown())
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
