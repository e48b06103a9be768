use chrono::Datelike;
use indexmap::IndexMap;

use crate::models::{Course, CourseEnrollment, DashboardSummary, EnrollmentTrend, Snapshot, Student};

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// GPA bins, highest floor first. Students below every floor land in
/// [`BELOW_LOWEST_BIN`].
const GPA_BINS: [(f64, &str); 5] = [
    (3.9, "3.9-4.0"),
    (3.7, "3.7-3.8"),
    (3.5, "3.5-3.6"),
    (3.3, "3.3-3.4"),
    (3.0, "3.0-3.2"),
];
const BELOW_LOWEST_BIN: &str = "Below 3.0";

pub const DASHBOARD_TOP_N: usize = 5;

/// Enrollments per calendar month of `target_year`, always twelve entries
/// from January to December.
pub fn monthly_trend(students: &[Student], target_year: i32) -> Vec<EnrollmentTrend> {
    let mut counts = [0usize; 12];

    for student in students
        .iter()
        .filter(|s| s.enrollment_date.year() == target_year)
    {
        counts[student.enrollment_date.month0() as usize] += 1;
    }

    MONTH_NAMES
        .iter()
        .zip(counts)
        .map(|(month, enrollments)| EnrollmentTrend {
            month: format!("{month} {target_year}"),
            enrollments,
        })
        .collect()
}

pub fn gpa_bin_label(gpa: f64) -> &'static str {
    GPA_BINS
        .iter()
        .find(|(floor, _)| gpa >= *floor)
        .map(|(_, label)| *label)
        .unwrap_or(BELOW_LOWEST_BIN)
}

/// Histogram of stored GPAs. Every bin is present, in descending order,
/// and the counts add up to `students.len()`.
pub fn gpa_distribution(students: &[Student]) -> IndexMap<&'static str, usize> {
    let mut bins: IndexMap<&'static str, usize> = GPA_BINS
        .iter()
        .map(|(_, label)| (*label, 0))
        .chain(std::iter::once((BELOW_LOWEST_BIN, 0)))
        .collect();

    for student in students {
        *bins.entry(gpa_bin_label(student.gpa)).or_insert(0) += 1;
    }

    bins
}

/// The `n` most enrolled courses, descending. Equal enrollments keep their
/// input order.
pub fn top_by_enrollment(courses: &[Course], n: usize) -> Vec<Course> {
    let mut sorted = courses.to_vec();
    sorted.sort_by(|a, b| b.enrollment.cmp(&a.enrollment));
    sorted.truncate(n);
    sorted
}

/// Course count per course name, in first-seen order. The store has no
/// department on courses, so this is a plain name tally.
pub fn course_name_counts(courses: &[Course]) -> IndexMap<String, usize> {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for course in courses {
        *counts.entry(course.name.clone()).or_insert(0) += 1;
    }
    counts
}

/// Top students by stored GPA, descending, stable among equals.
pub fn top_by_gpa(students: &[Student], n: usize) -> Vec<Student> {
    let mut sorted = students.to_vec();
    sorted.sort_by(|a, b| b.gpa.total_cmp(&a.gpa));
    sorted.truncate(n);
    sorted
}

pub fn dashboard_summary(snapshot: &Snapshot) -> DashboardSummary {
    DashboardSummary {
        total_students: snapshot.students.len(),
        total_courses: snapshot.courses.len(),
        total_faculty: snapshot.faculty.len(),
        top_students: top_by_gpa(&snapshot.students, DASHBOARD_TOP_N),
        popular_courses: top_by_enrollment(&snapshot.courses, DASHBOARD_TOP_N),
        course_enrollment_data: snapshot
            .courses
            .iter()
            .map(|course| CourseEnrollment {
                name: if course.code.is_empty() {
                    "Unknown".to_string()
                } else {
                    course.code.clone()
                },
                enrollment: course.enrollment,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AcademicYear, Faculty};
    use chrono::NaiveDate;

    fn student(id: &str, gpa: f64, enrolled: (i32, u32, u32)) -> Student {
        Student {
            id: id.to_string(),
            name: format!("Student {id}"),
            email: format!("{id}@example.edu"),
            year: AcademicYear::Sophomore,
            gpa,
            enrollment_date: NaiveDate::from_ymd_opt(enrolled.0, enrolled.1, enrolled.2).unwrap(),
            enrolled_courses: vec![],
        }
    }

    fn course(id: &str, name: &str, enrollment: u32) -> Course {
        Course {
            id: id.to_string(),
            name: name.to_string(),
            code: id.to_uppercase(),
            faculty: vec![],
            enrollment,
            credits: 3,
        }
    }

    #[test]
    fn trend_counts_only_target_year() {
        let students = vec![
            student("s1", 3.0, (2024, 1, 15)),
            student("s2", 3.0, (2024, 1, 31)),
            student("s3", 3.0, (2024, 12, 1)),
            student("s4", 3.0, (2023, 1, 10)),
        ];

        let trend = monthly_trend(&students, 2024);
        assert_eq!(trend.len(), 12);
        assert_eq!(trend[0].month, "Jan 2024");
        assert_eq!(trend[0].enrollments, 2);
        assert_eq!(trend[11].month, "Dec 2024");
        assert_eq!(trend[11].enrollments, 1);
        assert_eq!(trend.iter().map(|t| t.enrollments).sum::<usize>(), 3);
    }

    #[test]
    fn trend_for_empty_input_is_all_zero() {
        let trend = monthly_trend(&[], 2030);
        assert_eq!(trend.len(), 12);
        assert!(trend.iter().all(|t| t.enrollments == 0));
        assert_eq!(trend[5].month, "Jun 2030");
    }

    #[test]
    fn gpa_distribution_matches_mixed_population() {
        let students = vec![
            student("s1", 3.95, (2024, 1, 1)),
            student("s2", 3.6, (2024, 1, 1)),
            student("s3", 2.9, (2024, 1, 1)),
        ];

        let bins = gpa_distribution(&students);
        let expected = [
            ("3.9-4.0", 1),
            ("3.7-3.8", 0),
            ("3.5-3.6", 1),
            ("3.3-3.4", 0),
            ("3.0-3.2", 0),
            ("Below 3.0", 1),
        ];
        assert_eq!(bins.len(), expected.len());
        for ((label, count), (expected_label, expected_count)) in bins.iter().zip(expected) {
            assert_eq!(*label, expected_label);
            assert_eq!(*count, expected_count);
        }
    }

    #[test]
    fn gpa_bins_use_floor_boundaries() {
        assert_eq!(gpa_bin_label(4.0), "3.9-4.0");
        assert_eq!(gpa_bin_label(3.9), "3.9-4.0");
        assert_eq!(gpa_bin_label(3.85), "3.7-3.8");
        assert_eq!(gpa_bin_label(3.0), "3.0-3.2");
        assert_eq!(gpa_bin_label(2.99), "Below 3.0");
        assert_eq!(gpa_bin_label(f64::NAN), "Below 3.0");
    }

    #[test]
    fn gpa_bins_sum_to_population() {
        let students: Vec<Student> = (0..41)
            .map(|i| student(&format!("s{i}"), i as f64 / 10.0, (2022, 9, 1)))
            .collect();
        let bins = gpa_distribution(&students);
        assert_eq!(bins.values().sum::<usize>(), students.len());
    }

    #[test]
    fn top_by_enrollment_is_stable_on_ties() {
        let courses = vec![
            course("c1", "Algebra", 30),
            course("c2", "Biology", 45),
            course("c3", "Chemistry", 30),
            course("c4", "Drama", 10),
        ];

        let top = top_by_enrollment(&courses, 3);
        let ids: Vec<&str> = top.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1", "c3"]);
        assert_eq!(top_by_enrollment(&courses, 10).len(), 4);
    }

    #[test]
    fn course_names_are_tallied() {
        let courses = vec![
            course("c1", "Physics", 10),
            course("c2", "Art", 10),
            course("c3", "Physics", 10),
        ];
        let counts = course_name_counts(&courses);
        assert_eq!(counts.get("Physics"), Some(&2));
        assert_eq!(counts.get("Art"), Some(&1));
        assert_eq!(counts.keys().next().map(String::as_str), Some("Physics"));
    }

    #[test]
    fn top_by_gpa_tolerates_nan() {
        let students = vec![
            student("s1", 3.2, (2024, 1, 1)),
            student("s2", f64::NAN, (2024, 1, 1)),
            student("s3", 3.8, (2024, 1, 1)),
            student("s4", 3.2, (2024, 1, 1)),
        ];
        let top = top_by_gpa(&students, 4);
        let finite: Vec<&str> = top
            .iter()
            .filter(|s| !s.gpa.is_nan())
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(finite, vec!["s3", "s1", "s4"]);
    }

    #[test]
    fn dashboard_summary_counts_and_ranks() {
        let snapshot = Snapshot {
            students: vec![
                student("s1", 3.1, (2024, 2, 1)),
                student("s2", 3.8, (2024, 2, 1)),
            ],
            courses: vec![course("c1", "Physics", 12), course("c2", "Art", 40)],
            faculty: vec![Faculty {
                id: "f1".to_string(),
                name: "Dr. Reyes".to_string(),
                email: "reyes@example.edu".to_string(),
                department: "Science".to_string(),
                courses: vec!["c1".to_string()],
            }],
            grades: vec![],
        };

        let summary = dashboard_summary(&snapshot);
        assert_eq!(summary.total_students, 2);
        assert_eq!(summary.total_courses, 2);
        assert_eq!(summary.total_faculty, 1);
        assert_eq!(summary.top_students[0].id, "s2");
        assert_eq!(summary.popular_courses[0].id, "c2");
        assert_eq!(summary.course_enrollment_data[0].name, "C1");
        assert_eq!(summary.course_enrollment_data[0].enrollment, 12);
    }
}
