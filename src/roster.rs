use std::collections::HashMap;

use serde::Serialize;

use crate::models::{
    AcademicYear, Course, Faculty, Page, Pagination, Snapshot, Student, StudentDetail,
    StudentListing,
};
use crate::validate::{self, ValidationError};

#[derive(Debug, Clone, Default)]
pub struct StudentQuery {
    pub search: Option<String>,
    pub year: Option<AcademicYear>,
    pub course_id: Option<String>,
    /// Keeps only students not enrolled in this course id.
    pub exclude_course_id: Option<String>,
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Students matching every given filter, highest GPA first. Enrolled course
/// ids are resolved against `courses`; ids with no matching course are dropped.
pub fn list_students(
    students: &[Student],
    courses: &[Course],
    query: &StudentQuery,
) -> Vec<StudentListing> {
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);
    let courses_by_id: HashMap<&str, &Course> =
        courses.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut matched: Vec<&Student> = students
        .iter()
        .filter(|s| {
            needle.as_deref().map_or(true, |n| {
                contains_ignore_case(&s.name, n) || contains_ignore_case(&s.email, n)
            })
        })
        .filter(|s| query.year.map_or(true, |year| s.year == year))
        .filter(|s| {
            query
                .course_id
                .as_deref()
                .map_or(true, |id| s.enrolled_courses.iter().any(|c| c == id))
        })
        .filter(|s| {
            query
                .exclude_course_id
                .as_deref()
                .map_or(true, |id| !s.enrolled_courses.iter().any(|c| c == id))
        })
        .collect();

    matched.sort_by(|a, b| b.gpa.total_cmp(&a.gpa));

    matched
        .into_iter()
        .map(|student| StudentListing {
            courses: student
                .enrolled_courses
                .iter()
                .filter_map(|id| courses_by_id.get(id.as_str()).map(|c| (*c).clone()))
                .collect(),
            student: student.clone(),
        })
        .collect()
}

pub fn student_detail(snapshot: &Snapshot, id: &str) -> Result<StudentDetail, ValidationError> {
    let student = snapshot
        .students
        .iter()
        .find(|s| s.id == id)
        .ok_or_else(|| ValidationError::NotFound {
            entity: "student",
            id: id.to_string(),
        })?;

    Ok(StudentDetail {
        courses: snapshot
            .courses
            .iter()
            .filter(|c| student.enrolled_courses.contains(&c.id))
            .cloned()
            .collect(),
        grades: snapshot
            .grades
            .iter()
            .filter(|g| g.student_id == id)
            .cloned()
            .collect(),
        student: student.clone(),
    })
}

pub fn search_courses(courses: &[Course], search: Option<&str>) -> Vec<Course> {
    match search.map(str::trim).filter(|s| !s.is_empty()) {
        None => courses.to_vec(),
        Some(term) => {
            let needle = term.to_lowercase();
            courses
                .iter()
                .filter(|c| {
                    contains_ignore_case(&c.name, &needle) || contains_ignore_case(&c.code, &needle)
                })
                .cloned()
                .collect()
        }
    }
}

pub fn search_faculty(faculty: &[Faculty], search: Option<&str>) -> Vec<Faculty> {
    match search.map(str::trim).filter(|s| !s.is_empty()) {
        None => faculty.to_vec(),
        Some(term) => {
            let needle = term.to_lowercase();
            faculty
                .iter()
                .filter(|f| {
                    contains_ignore_case(&f.name, &needle)
                        || contains_ignore_case(&f.email, &needle)
                        || contains_ignore_case(&f.department, &needle)
                })
                .cloned()
                .collect()
        }
    }
}

/// Slices `items` into 1-based page `page` of size `limit`.
pub fn paginate<T>(items: Vec<T>, page: usize, limit: usize) -> Result<Page<T>, ValidationError> {
    let (page, limit) = validate::pagination(page, limit)?;
    let total = items.len();
    let data = items
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();

    Ok(Page {
        data,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        },
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPlan {
    pub course_id: String,
    pub newly_enrolled: Vec<String>,
    pub already_enrolled: Vec<String>,
    pub new_enrollment: u32,
}

/// Works out which students a course assignment actually adds. Every id
/// must exist; students already in the course, and repeated ids, are only
/// counted once.
pub fn plan_assignment(
    students: &[Student],
    course: &Course,
    student_ids: &[String],
) -> Result<AssignmentPlan, ValidationError> {
    if student_ids.is_empty() {
        return Err(ValidationError::MissingParam("studentIds"));
    }

    let mut newly_enrolled: Vec<String> = Vec::new();
    let mut already_enrolled: Vec<String> = Vec::new();

    for id in student_ids {
        let student = students
            .iter()
            .find(|s| &s.id == id)
            .ok_or_else(|| ValidationError::NotFound {
                entity: "student",
                id: id.clone(),
            })?;

        if student.enrolled_courses.contains(&course.id) {
            if !already_enrolled.contains(id) {
                already_enrolled.push(id.clone());
            }
        } else if !newly_enrolled.contains(id) {
            newly_enrolled.push(id.clone());
        }
    }

    let added = u32::try_from(newly_enrolled.len()).unwrap_or(u32::MAX);
    Ok(AssignmentPlan {
        course_id: course.id.clone(),
        new_enrollment: course.enrollment.saturating_add(added),
        newly_enrolled,
        already_enrolled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Grade, LetterGrade};
    use chrono::NaiveDate;

    fn student(id: &str, name: &str, year: AcademicYear, gpa: f64, courses: &[&str]) -> Student {
        Student {
            id: id.to_string(),
            name: name.to_string(),
            email: format!("{}@example.edu", name.to_lowercase().replace(' ', ".")),
            year,
            gpa,
            enrollment_date: NaiveDate::from_ymd_opt(2023, 9, 4).unwrap(),
            enrolled_courses: courses.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn course(id: &str, name: &str, code: &str, enrollment: u32) -> Course {
        Course {
            id: id.to_string(),
            name: name.to_string(),
            code: code.to_string(),
            faculty: vec![],
            enrollment,
            credits: 3,
        }
    }

    fn sample_students() -> Vec<Student> {
        vec![
            student("s1", "Avery Lee", AcademicYear::Freshman, 3.1, &["c1"]),
            student("s2", "Jules Moreno", AcademicYear::Senior, 3.9, &["c1", "c2"]),
            student("s3", "Kiara Patel", AcademicYear::Senior, 2.7, &["c9"]),
        ]
    }

    fn sample_courses() -> Vec<Course> {
        vec![
            course("c1", "Calculus I", "MATH101", 2),
            course("c2", "Organic Chemistry", "CHEM210", 1),
        ]
    }

    #[test]
    fn lists_by_gpa_and_resolves_courses() {
        let listing = list_students(&sample_students(), &sample_courses(), &StudentQuery::default());
        let ids: Vec<&str> = listing.iter().map(|l| l.student.id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s1", "s3"]);
        assert_eq!(listing[0].courses.len(), 2);
        assert!(listing[2].courses.is_empty());
    }

    #[test]
    fn filters_combine() {
        let query = StudentQuery {
            search: Some("MORENO".to_string()),
            year: Some(AcademicYear::Senior),
            course_id: Some("c2".to_string()),
            ..Default::default()
        };
        let listing = list_students(&sample_students(), &sample_courses(), &query);
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].student.id, "s2");

        let by_email = StudentQuery {
            search: Some("kiara.patel@".to_string()),
            ..Default::default()
        };
        assert_eq!(list_students(&sample_students(), &sample_courses(), &by_email).len(), 1);
    }

    #[test]
    fn excludes_students_already_in_course() {
        let query = StudentQuery {
            exclude_course_id: Some("c1".to_string()),
            ..Default::default()
        };
        let candidates = list_students(&sample_students(), &sample_courses(), &query);
        let ids: Vec<&str> = candidates.iter().map(|l| l.student.id.as_str()).collect();
        assert_eq!(ids, vec!["s3"]);
    }

    #[test]
    fn exclusion_still_honours_search_and_year() {
        let mut students = sample_students();
        students.push(student("s4", "Noor Haddad", AcademicYear::Freshman, 3.4, &[]));

        let query = StudentQuery {
            year: Some(AcademicYear::Freshman),
            exclude_course_id: Some("c1".to_string()),
            ..Default::default()
        };
        let ids: Vec<String> = list_students(&students, &sample_courses(), &query)
            .into_iter()
            .map(|l| l.student.id)
            .collect();
        assert_eq!(ids, vec!["s4".to_string()]);

        let query = StudentQuery {
            search: Some("avery".to_string()),
            exclude_course_id: Some("c1".to_string()),
            ..Default::default()
        };
        assert!(list_students(&students, &sample_courses(), &query).is_empty());
    }

    #[test]
    fn nan_gpa_does_not_break_listing() {
        let mut students = sample_students();
        students.push(student("s5", "Ira Blum", AcademicYear::Junior, f64::NAN, &[]));
        let listing = list_students(&students, &sample_courses(), &StudentQuery::default());
        let finite: Vec<&str> = listing
            .iter()
            .filter(|l| !l.student.gpa.is_nan())
            .map(|l| l.student.id.as_str())
            .collect();
        assert_eq!(finite, vec!["s2", "s1", "s3"]);
    }

    #[test]
    fn detail_collects_courses_and_grades() {
        let snapshot = Snapshot {
            students: sample_students(),
            courses: sample_courses(),
            faculty: vec![],
            grades: vec![
                Grade {
                    student_id: "s2".to_string(),
                    course_id: "c2".to_string(),
                    grade: LetterGrade::A,
                    score: 87.0,
                },
                Grade {
                    student_id: "s1".to_string(),
                    course_id: "c1".to_string(),
                    grade: LetterGrade::C,
                    score: 58.0,
                },
            ],
        };

        let detail = student_detail(&snapshot, "s2").unwrap();
        assert_eq!(detail.courses.len(), 2);
        assert_eq!(detail.grades.len(), 1);
        assert_eq!(detail.grades[0].grade, LetterGrade::A);

        let missing = student_detail(&snapshot, "nope").unwrap_err();
        assert_eq!(missing.code(), "NOT_FOUND");
    }

    #[test]
    fn search_matches_course_name_or_code() {
        let courses = sample_courses();
        assert_eq!(search_courses(&courses, Some("chem")).len(), 1);
        assert_eq!(search_courses(&courses, Some("math101")).len(), 1);
        assert_eq!(search_courses(&courses, Some("   ")).len(), 2);
        assert_eq!(search_courses(&courses, None).len(), 2);
    }

    #[test]
    fn search_matches_faculty_department() {
        let faculty = vec![Faculty {
            id: "f1".to_string(),
            name: "Dana Okafor".to_string(),
            email: "okafor@example.edu".to_string(),
            department: "Mathematics".to_string(),
            courses: vec!["c1".to_string()],
        }];
        assert_eq!(search_faculty(&faculty, Some("math")).len(), 1);
        assert!(search_faculty(&faculty, Some("history")).is_empty());
    }

    #[test]
    fn paginates_with_total_pages() {
        let page = paginate((1..=23).collect::<Vec<_>>(), 3, 10).unwrap();
        assert_eq!(page.data, vec![21, 22, 23]);
        assert_eq!(page.pagination.total, 23);
        assert_eq!(page.pagination.total_pages, 3);

        let past_end = paginate(vec![1, 2], 5, 10).unwrap();
        assert!(past_end.data.is_empty());
        assert_eq!(past_end.pagination.total_pages, 1);

        assert!(paginate(vec![1], 0, 10).is_err());
    }

    #[test]
    fn assignment_skips_existing_members() {
        let students = sample_students();
        let course = &sample_courses()[0];
        let ids = vec!["s1".to_string(), "s3".to_string(), "s3".to_string()];

        let plan = plan_assignment(&students, course, &ids).unwrap();
        assert_eq!(plan.newly_enrolled, vec!["s3".to_string()]);
        assert_eq!(plan.already_enrolled, vec!["s1".to_string()]);
        assert_eq!(plan.new_enrollment, 3);
    }

    #[test]
    fn assignment_rejects_unknown_or_empty() {
        let students = sample_students();
        let course = &sample_courses()[0];
        assert_eq!(
            plan_assignment(&students, course, &[]).unwrap_err(),
            ValidationError::MissingParam("studentIds")
        );
        assert_eq!(
            plan_assignment(&students, course, &["s404".to_string()])
                .unwrap_err()
                .code(),
            "NOT_FOUND"
        );
    }
}
