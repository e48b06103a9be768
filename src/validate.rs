use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::grading::{MAX_SCORE, MIN_SCORE};
use crate::models::{AcademicYear, Course, Grade, LetterGrade, Student};

pub const MIN_YEAR: i32 = 2000;
pub const MAX_YEAR: i32 = 2100;

/// Request errors rejected before any computation runs.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("invalid year {0}; use a year between 2000 and 2100 (e.g. 2023)")]
    Year(i32),

    #[error("score {0} is outside 0-100")]
    Score(f64),

    #[error("unknown letter grade '{0}'; expected one of A+, A, A-, B+, B, B-, C+, C, C-, D+, D, D-, F")]
    LetterGrade(String),

    #[error("gpa {0} is outside 0.0-4.0")]
    Gpa(f64),

    #[error("unknown academic year '{0}'; expected Freshman, Sophomore, Junior or Senior")]
    AcademicYear(String),

    #[error("a grade for student {student_id} in course {course_id} already exists")]
    DuplicateGrade {
        student_id: String,
        course_id: String,
    },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("student id '{id}' already belongs to {email}")]
    StudentIdTaken { id: String, email: String },

    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),

    #[error("{field} must be at least 1")]
    Pagination { field: &'static str },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::NotFound { .. } => "NOT_FOUND",
            ValidationError::DuplicateGrade { .. } | ValidationError::StudentIdTaken { .. } => {
                "CONFLICT"
            }
            _ => "BAD_REQUEST",
        }
    }
}

/// Code for a command failure: the first validation error in the chain, or
/// `INTERNAL_ERROR` for store and I/O failures.
pub fn error_code(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ValidationError>())
        .map_or("INTERNAL_ERROR", ValidationError::code)
}

/// Process exit status per error code. 2 stays with clap's usage errors.
pub fn exit_status(code: &str) -> u8 {
    match code {
        "BAD_REQUEST" => 3,
        "NOT_FOUND" => 4,
        "CONFLICT" => 5,
        _ => 1,
    }
}

pub fn year(value: i32) -> Result<i32, ValidationError> {
    if (MIN_YEAR..=MAX_YEAR).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::Year(value))
    }
}

pub fn score(value: f64) -> Result<f64, ValidationError> {
    if value.is_nan() || !(MIN_SCORE..=MAX_SCORE).contains(&value) {
        Err(ValidationError::Score(value))
    } else {
        Ok(value)
    }
}

pub fn letter_grade(value: &str) -> Result<LetterGrade, ValidationError> {
    value
        .parse()
        .map_err(|_| ValidationError::LetterGrade(value.to_string()))
}

pub fn gpa(value: f64) -> Result<f64, ValidationError> {
    if value.is_nan() || !(0.0..=4.0).contains(&value) {
        Err(ValidationError::Gpa(value))
    } else {
        Ok(value)
    }
}

pub fn academic_year(value: &str) -> Result<AcademicYear, ValidationError> {
    value
        .parse()
        .map_err(|_| ValidationError::AcademicYear(value.to_string()))
}

pub fn pagination(page: usize, limit: usize) -> Result<(usize, usize), ValidationError> {
    if page == 0 {
        return Err(ValidationError::Pagination { field: "page" });
    }
    if limit == 0 {
        return Err(ValidationError::Pagination { field: "limit" });
    }
    Ok((page, limit))
}

/// Grade submission as it arrives from a form or CSV row.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewGrade {
    pub student_id: String,
    pub course_id: String,
    pub grade: String,
    pub score: f64,
}

impl NewGrade {
    /// Checks the score range, then the letter; references and uniqueness
    /// are checked against the store. The score goes first because an
    /// omitted letter is filled from it.
    pub fn validate(&self) -> Result<Grade, ValidationError> {
        if self.student_id.trim().is_empty() {
            return Err(ValidationError::MissingParam("studentId"));
        }
        if self.course_id.trim().is_empty() {
            return Err(ValidationError::MissingParam("courseId"));
        }

        let score = score(self.score)?;
        Ok(Grade {
            student_id: self.student_id.trim().to_string(),
            course_id: self.course_id.trim().to_string(),
            grade: letter_grade(&self.grade)?,
            score,
        })
    }
}

/// Student record as it arrives from an import file. A missing id gets a
/// fresh UUID; `enrolled_courses` is a `;`-separated list of course ids.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewStudent {
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    pub year: String,
    pub gpa: f64,
    pub enrollment_date: NaiveDate,
    #[serde(default)]
    pub enrolled_courses: Option<String>,
}

impl NewStudent {
    pub fn validate(&self) -> Result<Student, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingParam("name"));
        }
        if self.email.trim().is_empty() {
            return Err(ValidationError::MissingParam("email"));
        }

        let mut enrolled_courses: Vec<String> = Vec::new();
        for id in self
            .enrolled_courses
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            if !enrolled_courses.iter().any(|existing| existing == id) {
                enrolled_courses.push(id.to_string());
            }
        }

        Ok(Student {
            id: self
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: self.name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            year: academic_year(&self.year)?,
            gpa: gpa(self.gpa)?,
            enrollment_date: self.enrollment_date,
            enrolled_courses,
        })
    }
}

/// Full check of a submission against an in-memory snapshot.
pub fn new_grade(
    input: &NewGrade,
    students: &[Student],
    courses: &[Course],
    existing: &[Grade],
) -> Result<Grade, ValidationError> {
    let grade = input.validate()?;

    if !students.iter().any(|s| s.id == grade.student_id) {
        return Err(ValidationError::NotFound {
            entity: "student",
            id: grade.student_id,
        });
    }
    if !courses.iter().any(|c| c.id == grade.course_id) {
        return Err(ValidationError::NotFound {
            entity: "course",
            id: grade.course_id,
        });
    }
    ensure_unique(&grade, existing)?;

    Ok(grade)
}

pub fn ensure_unique(grade: &Grade, existing: &[Grade]) -> Result<(), ValidationError> {
    let taken = existing
        .iter()
        .any(|g| g.student_id == grade.student_id && g.course_id == grade.course_id);
    if taken {
        Err(ValidationError::DuplicateGrade {
            student_id: grade.student_id.clone(),
            course_id: grade.course_id.clone(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(grade: &str, score: f64) -> NewGrade {
        NewGrade {
            student_id: "s1".to_string(),
            course_id: "c1".to_string(),
            grade: grade.to_string(),
            score,
        }
    }

    fn roster() -> (Vec<Student>, Vec<Course>) {
        let students = vec![Student {
            id: "s1".to_string(),
            name: "Mina Park".to_string(),
            email: "mina@example.edu".to_string(),
            year: AcademicYear::Senior,
            gpa: 3.4,
            enrollment_date: NaiveDate::from_ymd_opt(2021, 9, 1).unwrap(),
            enrolled_courses: vec!["c1".to_string()],
        }];
        let courses = vec![Course {
            id: "c1".to_string(),
            name: "Linear Algebra".to_string(),
            code: "MATH220".to_string(),
            faculty: vec![],
            enrollment: 1,
            credits: 4,
        }];
        (students, courses)
    }

    #[test]
    fn year_range_is_inclusive() {
        assert_eq!(year(2000), Ok(2000));
        assert_eq!(year(2100), Ok(2100));
        assert_eq!(year(1999), Err(ValidationError::Year(1999)));
        assert_eq!(year(2101), Err(ValidationError::Year(2101)));
    }

    #[test]
    fn score_range_matches_grade_resolver() {
        assert!(score(0.0).is_ok());
        assert!(score(100.0).is_ok());
        assert!(score(-0.1).is_err());
        assert!(score(100.5).is_err());
        assert!(score(f64::NAN).is_err());
    }

    #[test]
    fn rejects_unknown_letters() {
        let err = submission("E", 50.0).validate().unwrap_err();
        assert_eq!(err, ValidationError::LetterGrade("E".to_string()));
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[test]
    fn out_of_range_score_wins_over_suggested_letter() {
        let suggested = crate::grading::auto_suggest(150.0);
        assert_eq!(suggested, "Invalid");
        let err = submission(&suggested, 150.0).validate().unwrap_err();
        assert_eq!(err, ValidationError::Score(150.0));

        let err = submission("E", -5.0).validate().unwrap_err();
        assert_eq!(err, ValidationError::Score(-5.0));
    }

    #[test]
    fn failures_map_to_codes_through_context() {
        use anyhow::Context;

        let missing: anyhow::Result<()> = Err(ValidationError::NotFound {
            entity: "course",
            id: "c9".to_string(),
        })
        .context("grade row 3 is invalid");
        let err = missing.unwrap_err();
        assert_eq!(error_code(&err), "NOT_FOUND");
        assert_eq!(exit_status(error_code(&err)), 4);

        let bad_year = anyhow::Error::from(ValidationError::Year(1999));
        assert_eq!(error_code(&bad_year), "BAD_REQUEST");
        assert_eq!(exit_status(error_code(&bad_year)), 3);

        let taken = anyhow::Error::from(ValidationError::StudentIdTaken {
            id: "s1".to_string(),
            email: "mina@example.edu".to_string(),
        });
        assert_eq!(exit_status(error_code(&taken)), 5);

        let io = anyhow::anyhow!("connection refused");
        assert_eq!(error_code(&io), "INTERNAL_ERROR");
        assert_eq!(exit_status(error_code(&io)), 1);
    }

    #[test]
    fn accepts_well_formed_submission() {
        let (students, courses) = roster();
        let grade = new_grade(&submission("B+", 81.0), &students, &courses, &[]).unwrap();
        assert_eq!(grade.grade, LetterGrade::BPlus);
        assert_eq!(grade.score, 81.0);
    }

    #[test]
    fn rejects_duplicate_pair() {
        let (students, courses) = roster();
        let existing = vec![submission("A", 86.0).validate().unwrap()];
        let err = new_grade(&submission("B", 78.0), &students, &courses, &existing).unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[test]
    fn rejects_unknown_student() {
        let (students, courses) = roster();
        let mut input = submission("B", 78.0);
        input.student_id = "s9".to_string();
        let err = new_grade(&input, &students, &courses, &[]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NotFound {
                entity: "student",
                id: "s9".to_string()
            }
        );
    }

    #[test]
    fn pagination_needs_positive_values() {
        assert_eq!(pagination(1, 10), Ok((1, 10)));
        assert_eq!(
            pagination(0, 10),
            Err(ValidationError::Pagination { field: "page" })
        );
        assert_eq!(
            pagination(2, 0),
            Err(ValidationError::Pagination { field: "limit" })
        );
    }

    #[test]
    fn new_student_gets_generated_id_and_unique_courses() {
        let input = NewStudent {
            id: None,
            name: " Rosa Diaz ".to_string(),
            email: "Rosa.Diaz@Example.edu".to_string(),
            year: "sophomore".to_string(),
            gpa: 3.45,
            enrollment_date: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            enrolled_courses: Some("c1; c2;c1;".to_string()),
        };

        let student = input.validate().unwrap();
        assert!(Uuid::parse_str(&student.id).is_ok());
        assert_eq!(student.name, "Rosa Diaz");
        assert_eq!(student.email, "rosa.diaz@example.edu");
        assert_eq!(student.year, AcademicYear::Sophomore);
        assert_eq!(student.enrolled_courses, vec!["c1".to_string(), "c2".to_string()]);
    }

    #[test]
    fn new_student_rejects_bad_gpa_and_year() {
        let mut input = NewStudent {
            id: Some("s7".to_string()),
            name: "Sam Ortiz".to_string(),
            email: "sam@example.edu".to_string(),
            year: "Senior".to_string(),
            gpa: 4.2,
            enrollment_date: NaiveDate::from_ymd_opt(2020, 9, 1).unwrap(),
            enrolled_courses: None,
        };
        assert_eq!(input.validate().unwrap_err(), ValidationError::Gpa(4.2));

        input.gpa = 3.0;
        input.year = "Graduate".to_string();
        assert_eq!(
            input.validate().unwrap_err(),
            ValidationError::AcademicYear("Graduate".to_string())
        );
    }
}
