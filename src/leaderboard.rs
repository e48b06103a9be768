use std::collections::HashMap;

use crate::models::{Course, Grade, Student, TopStudent};

pub const LEADERBOARD_SIZE: usize = 20;

/// Course selector value that disables filtering.
pub const ALL_COURSES: &str = "all";

/// Ranks grade records by score, highest first, and keeps the top
/// [`LEADERBOARD_SIZE`].
///
/// Grades whose student or course is missing from the snapshot are skipped.
/// `course_filter` matches course identifiers; `None` or `"all"` keeps every
/// course. Equal scores keep the order of `grades`, and ranks are the 1-based
/// position after sorting, so ties still get distinct ranks.
pub fn build_leaderboard(
    grades: &[Grade],
    students: &[Student],
    courses: &[Course],
    course_filter: Option<&str>,
) -> Vec<TopStudent> {
    let students_by_id: HashMap<&str, &Student> =
        students.iter().map(|s| (s.id.as_str(), s)).collect();
    let courses_by_id: HashMap<&str, &Course> =
        courses.iter().map(|c| (c.id.as_str(), c)).collect();
    let course_filter = course_filter.filter(|value| *value != ALL_COURSES);

    let mut rows: Vec<TopStudent> = grades
        .iter()
        .filter_map(|grade| {
            let student = students_by_id.get(grade.student_id.as_str())?;
            let course = courses_by_id.get(grade.course_id.as_str())?;
            Some((grade, *student, *course))
        })
        .filter(|(_, _, course)| course_filter.map_or(true, |id| course.id == id))
        .map(|(grade, student, course)| TopStudent {
            id: student.id.clone(),
            name: student.name.clone(),
            email: student.email.clone(),
            course_name: course.name.clone(),
            course_code: course.code.clone(),
            grade: grade.grade,
            score: grade.score,
            rank: 0,
        })
        .collect();

    rows.sort_by(|a, b| b.score.total_cmp(&a.score));
    rows.truncate(LEADERBOARD_SIZE);

    for (index, row) in rows.iter_mut().enumerate() {
        row.rank = index + 1;
    }

    rows
}
