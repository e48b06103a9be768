use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

mod config;
mod db;
mod enrollment;
mod export;
mod grading;
mod leaderboard;
mod logging;
mod models;
mod report;
mod roster;
mod validate;

use crate::models::{AcademicYear, Snapshot};
use crate::roster::StudentQuery;
use crate::validate::NewGrade;

#[derive(Parser)]
#[command(name = "academic-analytics")]
#[command(about = "Grades, enrollment trends and leaderboards for an academic roster", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import students from a CSV file
    ImportStudents {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import grades from a CSV file (student_id,course_id,grade,score)
    ImportGrades {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record a single grade
    RecordGrade {
        #[arg(long)]
        student: String,
        #[arg(long)]
        course: String,
        /// Letter grade; suggested from the score when omitted
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        score: f64,
    },
    /// Enroll students in a course
    AssignCourse {
        #[arg(long)]
        course: String,
        #[arg(long = "student", required = true)]
        students: Vec<String>,
    },
    /// List students, best GPA first
    Students {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        year: Option<AcademicYear>,
        /// Only students enrolled in this course id
        #[arg(long, conflicts_with = "exclude_course")]
        course: Option<String>,
        /// Only students not enrolled in this course id; combines with
        /// --search and --year
        #[arg(long)]
        exclude_course: Option<String>,
    },
    /// Show one student with their courses and grades
    Student { id: String },
    /// List courses
    Courses {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List faculty members
    Faculty {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List grade records
    Grades {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Totals, top students and popular courses
    Dashboard,
    /// Monthly enrollments for a year
    Trend {
        /// Defaults to the current year
        #[arg(long)]
        year: Option<i32>,
    },
    /// Student counts per GPA range
    GpaDistribution,
    /// Most enrolled courses
    PopularCourses {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Course count per course name
    CourseNames,
    /// Top scores, optionally for one course id
    Leaderboard {
        #[arg(long)]
        course: Option<String>,
    },
    /// Letter grade, grade points and pass flag for a score
    Resolve {
        #[arg(allow_negative_numbers = true)]
        score: f64,
    },
    /// Suggested letter for a partially typed score
    Suggest {
        #[arg(allow_hyphen_values = true)]
        input: String,
    },
    /// Export a collection as CSV
    Export {
        #[arg(value_enum)]
        kind: ExportKind,
        #[arg(long)]
        out: PathBuf,
        /// Year for the trends export; defaults to the current year
        #[arg(long)]
        year: Option<i32>,
        /// Course id for the top-students export
        #[arg(long)]
        course: Option<String>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        course: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportKind {
    Students,
    Courses,
    Faculty,
    Trends,
    TopStudents,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn target_year(year: Option<i32>) -> anyhow::Result<i32> {
    Ok(validate::year(year.unwrap_or_else(|| Utc::now().year()))?)
}

/// Renders a CSV export in memory so a failure never leaves a partial file.
fn render_export(
    kind: ExportKind,
    snapshot: &Snapshot,
    year: i32,
    course: Option<&str>,
) -> anyhow::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    match kind {
        ExportKind::Students => export::students(&mut buffer, &snapshot.students)?,
        ExportKind::Courses => export::courses(&mut buffer, &snapshot.courses)?,
        ExportKind::Faculty => export::faculty(&mut buffer, &snapshot.faculty)?,
        ExportKind::Trends => {
            let trend = enrollment::monthly_trend(&snapshot.students, year);
            export::enrollment_trends(&mut buffer, &trend)?
        }
        ExportKind::TopStudents => {
            let board = leaderboard::build_leaderboard(
                &snapshot.grades,
                &snapshot.students,
                &snapshot.courses,
                course,
            );
            export::top_students(&mut buffer, &board)?
        }
    }
    Ok(buffer)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = validate::error_code(&err);
            tracing::debug!(code, "command failed");
            eprintln!("error[{code}]: {err:#}");
            ExitCode::from(validate::exit_status(code))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Pure commands don't need the store.
    match &cli.command {
        Commands::Resolve { score } => return print_json(&grading::resolve(*score)),
        Commands::Suggest { input } => {
            println!("{}", grading::auto_suggest(input.as_str()));
            return Ok(());
        }
        _ => {}
    }

    let config = config::Config::from_env()?;
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
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportStudents { csv } => {
            let count = db::import_students_csv(&pool, &csv).await?;
            println!("Stored {count} students from {}.", csv.display());
        }
        Commands::ImportGrades { csv } => {
            let summary = db::import_grades_csv(&pool, &csv).await?;
            println!(
                "Inserted {} grades from {} ({} duplicates skipped).",
                summary.inserted,
                csv.display(),
                summary.duplicates
            );
        }
        Commands::RecordGrade {
            student,
            course,
            grade,
            score,
        } => {
            let grade = match grade {
                Some(grade) => grade,
                None => grading::auto_suggest(validate::score(score)?),
            };
            let input = NewGrade {
                student_id: student,
                course_id: course,
                grade,
                score,
            };
            let recorded = db::record_grade(&pool, &input).await?;
            print_json(&recorded)?;
        }
        Commands::AssignCourse { course, students } => {
            let plan = db::assign_course(&pool, &course, &students).await?;
            println!(
                "Course assigned to {} student(s) successfully.",
                plan.newly_enrolled.len()
            );
            print_json(&plan)?;
        }
        Commands::Students {
            search,
            year,
            course,
            exclude_course,
        } => {
            let snapshot = db::fetch_snapshot(&pool).await?;
            let query = StudentQuery {
                search,
                year,
                course_id: course,
                exclude_course_id: exclude_course,
            };
            print_json(&roster::list_students(
                &snapshot.students,
                &snapshot.courses,
                &query,
            ))?;
        }
        Commands::Student { id } => {
            let snapshot = db::fetch_snapshot(&pool).await?;
            print_json(&roster::student_detail(&snapshot, &id)?)?;
        }
        Commands::Courses {
            search,
            page,
            limit,
        } => {
            let courses = db::fetch_courses(&pool).await?;
            let matched = roster::search_courses(&courses, search.as_deref());
            print_json(&roster::paginate(matched, page, limit)?)?;
        }
        Commands::Faculty {
            search,
            page,
            limit,
        } => {
            let faculty = db::fetch_faculty(&pool).await?;
            let matched = roster::search_faculty(&faculty, search.as_deref());
            print_json(&roster::paginate(matched, page, limit)?)?;
        }
        Commands::Grades { page, limit } => {
            let grades = db::fetch_grades(&pool).await?;
            print_json(&roster::paginate(grades, page, limit)?)?;
        }
        Commands::Dashboard => {
            let snapshot = db::fetch_snapshot(&pool).await?;
            print_json(&enrollment::dashboard_summary(&snapshot))?;
        }
        Commands::Trend { year } => {
            let year = target_year(year)?;
            let students = db::fetch_students(&pool).await?;
            print_json(&enrollment::monthly_trend(&students, year))?;
        }
        Commands::GpaDistribution => {
            let students = db::fetch_students(&pool).await?;
            print_json(&enrollment::gpa_distribution(&students))?;
        }
        Commands::PopularCourses { limit } => {
            let courses = db::fetch_courses(&pool).await?;
            print_json(&enrollment::top_by_enrollment(&courses, limit))?;
        }
        Commands::CourseNames => {
            let courses = db::fetch_courses(&pool).await?;
            print_json(&enrollment::course_name_counts(&courses))?;
        }
        Commands::Leaderboard { course } => {
            let snapshot = db::fetch_snapshot(&pool).await?;
            let board = leaderboard::build_leaderboard(
                &snapshot.grades,
                &snapshot.students,
                &snapshot.courses,
                course.as_deref(),
            );
            print_json(&board)?;
        }
        Commands::Export {
            kind,
            out,
            year,
            course,
        } => {
            let year = target_year(year)?;
            let snapshot = db::fetch_snapshot(&pool).await?;
            let csv = render_export(kind, &snapshot, year, course.as_deref())?;
            std::fs::write(&out, csv).with_context(|| format!("failed to write {}", out.display()))?;
            println!("Export written to {}.", out.display());
        }
        Commands::Report { year, course, out } => {
            let year = target_year(year)?;
            let snapshot = db::fetch_snapshot(&pool).await?;
            let report = report::build_report(year, course.as_deref(), &snapshot);
            std::fs::write(&out, report).with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        // Answered before connecting.
        Commands::Resolve { .. } | Commands::Suggest { .. } => {}
    }

    info!("done");
    Ok(())
}
