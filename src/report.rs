use std::fmt::Write;

use crate::enrollment;
use crate::leaderboard;
use crate::models::Snapshot;

const REPORT_LEADERBOARD_ROWS: usize = 10;

pub fn build_report(year: i32, course_filter: Option<&str>, snapshot: &Snapshot) -> String {
    let summary = enrollment::dashboard_summary(snapshot);
    let trend = enrollment::monthly_trend(&snapshot.students, year);
    let bins = enrollment::gpa_distribution(&snapshot.students);
    let board = leaderboard::build_leaderboard(
        &snapshot.grades,
        &snapshot.students,
        &snapshot.courses,
        course_filter,
    );

    let mut output = String::new();

    let _ = writeln!(output, "# Academic Dashboard Report");
    let _ = writeln!(
        output,
        "{} students, {} courses, {} faculty members",
        summary.total_students, summary.total_courses, summary.total_faculty
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Enrollments in {year}");

    let enrolled_this_year: usize = trend.iter().map(|t| t.enrollments).sum();
    if enrolled_this_year == 0 {
        let _ = writeln!(output, "No students enrolled in {year}.");
    } else {
        for month in trend.iter().filter(|t| t.enrollments > 0) {
            let _ = writeln!(output, "- {}: {}", month.month, month.enrollments);
        }
        let _ = writeln!(output, "- Total: {enrolled_this_year}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## GPA Distribution");

    if snapshot.students.is_empty() {
        let _ = writeln!(output, "No students on record.");
    } else {
        for (label, count) in &bins {
            let _ = writeln!(output, "- {label}: {count}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Popular Courses");

    if summary.popular_courses.is_empty() {
        let _ = writeln!(output, "No courses on record.");
    } else {
        for course in &summary.popular_courses {
            let _ = writeln!(
                output,
                "- {} ({}): {} enrolled, {} credits",
                course.name, course.code, course.enrollment, course.credits
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Performers");

    if board.is_empty() {
        let _ = writeln!(output, "No graded students for this selection.");
    } else {
        for entry in board.iter().take(REPORT_LEADERBOARD_ROWS) {
            let _ = writeln!(
                output,
                "{}. {} ({}) in {} {}: {} ({:.1})",
                entry.rank,
                entry.name,
                entry.email,
                entry.course_code,
                entry.course_name,
                entry.grade,
                entry.score
            );
        }
    }

    output
}
