use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcademicYear {
    Freshman,
    Sophomore,
    Junior,
    Senior,
}

impl AcademicYear {
    pub const ALL: [AcademicYear; 4] = [
        AcademicYear::Freshman,
        AcademicYear::Sophomore,
        AcademicYear::Junior,
        AcademicYear::Senior,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AcademicYear::Freshman => "Freshman",
            AcademicYear::Sophomore => "Sophomore",
            AcademicYear::Junior => "Junior",
            AcademicYear::Senior => "Senior",
        }
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcademicYear {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AcademicYear::ALL
            .into_iter()
            .find(|year| year.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown academic year '{value}'"))
    }
}

/// Letter grades accepted on a grade record, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LetterGrade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "D+")]
    DPlus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "D-")]
    DMinus,
    #[serde(rename = "F")]
    F,
}

impl LetterGrade {
    pub const ALL: [LetterGrade; 13] = [
        LetterGrade::APlus,
        LetterGrade::A,
        LetterGrade::AMinus,
        LetterGrade::BPlus,
        LetterGrade::B,
        LetterGrade::BMinus,
        LetterGrade::CPlus,
        LetterGrade::C,
        LetterGrade::CMinus,
        LetterGrade::DPlus,
        LetterGrade::D,
        LetterGrade::DMinus,
        LetterGrade::F,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LetterGrade::APlus => "A+",
            LetterGrade::A => "A",
            LetterGrade::AMinus => "A-",
            LetterGrade::BPlus => "B+",
            LetterGrade::B => "B",
            LetterGrade::BMinus => "B-",
            LetterGrade::CPlus => "C+",
            LetterGrade::C => "C",
            LetterGrade::CMinus => "C-",
            LetterGrade::DPlus => "D+",
            LetterGrade::D => "D",
            LetterGrade::DMinus => "D-",
            LetterGrade::F => "F",
        }
    }

    pub fn grade_points(self) -> f64 {
        match self {
            LetterGrade::APlus | LetterGrade::A => 4.0,
            LetterGrade::AMinus => 3.7,
            LetterGrade::BPlus => 3.3,
            LetterGrade::B => 3.0,
            LetterGrade::BMinus => 2.7,
            LetterGrade::CPlus => 2.3,
            LetterGrade::C => 2.0,
            LetterGrade::CMinus => 1.7,
            LetterGrade::DPlus => 1.3,
            LetterGrade::D => 1.0,
            LetterGrade::DMinus => 0.7,
            LetterGrade::F => 0.0,
        }
    }

    /// C- is the lowest passing letter; every D and F fails.
    pub fn is_passing(self) -> bool {
        !matches!(
            self,
            LetterGrade::DPlus | LetterGrade::D | LetterGrade::DMinus | LetterGrade::F
        )
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LetterGrade {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        LetterGrade::ALL
            .into_iter()
            .find(|grade| grade.as_str() == value.trim())
            .ok_or_else(|| format!("unknown letter grade '{value}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    pub year: AcademicYear,
    pub gpa: f64,
    pub enrollment_date: NaiveDate,
    pub enrolled_courses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    pub code: String,
    pub faculty: Vec<String>,
    pub enrollment: u32,
    pub credits: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
    pub id: String,
    pub name: String,
    pub email: String,
    pub department: String,
    pub courses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub student_id: String,
    pub course_id: String,
    pub grade: LetterGrade,
    pub score: f64,
}

/// Everything fetched from the store for one request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub students: Vec<Student>,
    pub courses: Vec<Course>,
    pub faculty: Vec<Faculty>,
    pub grades: Vec<Grade>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
    pub letter: &'static str,
    pub gpa: f64,
    pub is_passing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentTrend {
    pub month: String,
    pub enrollments: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopStudent {
    pub id: String,
    pub name: String,
    pub email: String,
    pub course_name: String,
    pub course_code: String,
    pub grade: LetterGrade,
    pub score: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseEnrollment {
    pub name: String,
    pub enrollment: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_students: usize,
    pub total_courses: usize,
    pub total_faculty: usize,
    pub top_students: Vec<Student>,
    pub popular_courses: Vec<Course>,
    pub course_enrollment_data: Vec<CourseEnrollment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentListing {
    #[serde(flatten)]
    pub student: Student,
    pub courses: Vec<Course>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentDetail {
    #[serde(flatten)]
    pub student: Student,
    pub courses: Vec<Course>,
    pub grades: Vec<Grade>,
}
