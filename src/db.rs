use std::collections::{HashMap, HashSet};
use std::io::Read;

use anyhow::Context;
use chrono::NaiveDate;
use indexmap::IndexMap;
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};
use tracing::{debug, info, warn};

use crate::models::{Course, Faculty, Grade, Snapshot, Student};
use crate::roster::{self, AssignmentPlan};
use crate::validate::{self, NewGrade, NewStudent, ValidationError};

const STUDENT_COLUMNS: &str =
    "id, name, email, year, gpa, enrollment_date, enrolled_courses";
const COURSE_COLUMNS: &str = "id, name, code, faculty, enrollment, credits";

const SELECT_STUDENTS: &str = "SELECT id, name, email, year, gpa, enrollment_date, enrolled_courses \
     FROM academic_analytics.students ORDER BY id";
const SELECT_COURSES: &str = "SELECT id, name, code, faculty, enrollment, credits \
     FROM academic_analytics.courses ORDER BY code";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn student_from_row(row: &PgRow) -> anyhow::Result<Student> {
    let year: String = row.try_get("year")?;
    Ok(Student {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        year: validate::academic_year(&year)?,
        gpa: row.try_get("gpa")?,
        enrollment_date: row.try_get("enrollment_date")?,
        enrolled_courses: row.try_get("enrolled_courses")?,
    })
}

fn course_from_row(row: &PgRow) -> anyhow::Result<Course> {
    let id: String = row.try_get("id")?;
    let enrollment: i32 = row.try_get("enrollment")?;
    let credits: i32 = row.try_get("credits")?;
    Ok(Course {
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        faculty: row.try_get("faculty")?,
        enrollment: u32::try_from(enrollment)
            .with_context(|| format!("course {id} has negative enrollment"))?,
        credits: u32::try_from(credits)
            .with_context(|| format!("course {id} has negative credits"))?,
        id,
    })
}

fn faculty_from_row(row: &PgRow) -> anyhow::Result<Faculty> {
    Ok(Faculty {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        department: row.try_get("department")?,
        courses: row.try_get("courses")?,
    })
}

fn grade_from_row(row: &PgRow) -> anyhow::Result<Grade> {
    let letter: String = row.try_get("grade")?;
    Ok(Grade {
        student_id: row.try_get("student_id")?,
        course_id: row.try_get("course_id")?,
        grade: validate::letter_grade(&letter)?,
        score: row.try_get("score")?,
    })
}

pub async fn fetch_students<'e, E: PgExecutor<'e>>(executor: E) -> anyhow::Result<Vec<Student>> {
    let rows = sqlx::query(SELECT_STUDENTS).fetch_all(executor).await?;
    rows.iter().map(student_from_row).collect()
}

pub async fn fetch_courses<'e, E: PgExecutor<'e>>(executor: E) -> anyhow::Result<Vec<Course>> {
    let rows = sqlx::query(SELECT_COURSES).fetch_all(executor).await?;
    rows.iter().map(course_from_row).collect()
}

pub async fn fetch_faculty(pool: &PgPool) -> anyhow::Result<Vec<Faculty>> {
    let rows = sqlx::query(
        "SELECT id, name, email, department, courses FROM academic_analytics.faculty ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(faculty_from_row).collect()
}

/// Grades in the order they were recorded; the leaderboard keeps this
/// order among equal scores.
pub async fn fetch_grades<'e, E: PgExecutor<'e>>(executor: E) -> anyhow::Result<Vec<Grade>> {
    let rows = sqlx::query(
        "SELECT student_id, course_id, grade, score FROM academic_analytics.grades \
         ORDER BY recorded_at, student_id, course_id",
    )
    .fetch_all(executor)
    .await?;
    rows.iter().map(grade_from_row).collect()
}

/// Loads all four collections concurrently.
#[tracing::instrument(skip(pool))]
pub async fn fetch_snapshot(pool: &PgPool) -> anyhow::Result<Snapshot> {
    let (students, courses, faculty, grades) = tokio::try_join!(
        fetch_students(pool),
        fetch_courses(pool),
        fetch_faculty(pool),
        fetch_grades(pool),
    )?;

    debug!(
        students = students.len(),
        courses = courses.len(),
        faculty = faculty.len(),
        grades = grades.len(),
        "snapshot loaded"
    );

    Ok(Snapshot {
        students,
        courses,
        faculty,
        grades,
    })
}

/// Inserts one grade, returning false when the (student, course) pair is
/// already graded.
async fn insert_grade<'e, E: PgExecutor<'e>>(executor: E, grade: &Grade) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO academic_analytics.grades (student_id, course_id, grade, score)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (student_id, course_id) DO NOTHING
        "#,
    )
    .bind(&grade.student_id)
    .bind(&grade.course_id)
    .bind(grade.grade.as_str())
    .bind(grade.score)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Validates a submission against the current store contents and inserts
/// it. The primary key still guards against a concurrent duplicate.
#[tracing::instrument(skip(pool, input), fields(student_id = %input.student_id, course_id = %input.course_id))]
pub async fn record_grade(pool: &PgPool, input: &NewGrade) -> anyhow::Result<Grade> {
    let (students, courses, grades) = tokio::try_join!(
        fetch_students(pool),
        fetch_courses(pool),
        fetch_grades(pool),
    )?;
    let grade = validate::new_grade(input, &students, &courses, &grades)?;

    if !insert_grade(pool, &grade).await? {
        return Err(ValidationError::DuplicateGrade {
            student_id: grade.student_id,
            course_id: grade.course_id,
        }
        .into());
    }

    info!(grade = %grade.grade, score = grade.score, "grade recorded");
    Ok(grade)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Parses grade rows (`student_id,course_id,grade,score`), validating each.
/// Errors name the 1-based data row.
pub fn read_grade_rows<R: Read>(reader: R) -> anyhow::Result<Vec<Grade>> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut grades = Vec::new();

    for (index, result) in csv.deserialize::<NewGrade>().enumerate() {
        let row = result.with_context(|| format!("grade row {} is malformed", index + 1))?;
        let grade = row
            .validate()
            .with_context(|| format!("grade row {} is invalid", index + 1))?;
        grades.push(grade);
    }

    Ok(grades)
}

pub fn read_student_rows<R: Read>(reader: R) -> anyhow::Result<Vec<Student>> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut students = Vec::new();

    for (index, result) in csv.deserialize::<NewStudent>().enumerate() {
        let row = result.with_context(|| format!("student row {} is malformed", index + 1))?;
        let student = row
            .validate()
            .with_context(|| format!("student row {} is invalid", index + 1))?;
        students.push(student);
    }

    Ok(students)
}

fn invalid_row(kind: &str, row: usize, err: ValidationError) -> anyhow::Error {
    anyhow::Error::new(err).context(format!("{kind} row {row} is invalid"))
}

/// Grades from an import file that are not yet on record. Every row must
/// reference a known student and course or the whole import is rejected;
/// pairs already graded, in the store or earlier in the file, are counted
/// as duplicates.
pub fn plan_grade_import(
    rows: Vec<Grade>,
    students: &[Student],
    courses: &[Course],
    existing: &[Grade],
) -> anyhow::Result<(Vec<Grade>, usize)> {
    let student_ids: HashSet<&str> = students.iter().map(|s| s.id.as_str()).collect();
    let course_ids: HashSet<&str> = courses.iter().map(|c| c.id.as_str()).collect();
    let mut graded: HashSet<(String, String)> = existing
        .iter()
        .map(|g| (g.student_id.clone(), g.course_id.clone()))
        .collect();

    let mut fresh = Vec::new();
    let mut duplicates = 0;
    for (index, grade) in rows.into_iter().enumerate() {
        if !student_ids.contains(grade.student_id.as_str()) {
            let err = ValidationError::NotFound {
                entity: "student",
                id: grade.student_id,
            };
            return Err(invalid_row("grade", index + 1, err));
        }
        if !course_ids.contains(grade.course_id.as_str()) {
            let err = ValidationError::NotFound {
                entity: "course",
                id: grade.course_id,
            };
            return Err(invalid_row("grade", index + 1, err));
        }

        if graded.insert((grade.student_id.clone(), grade.course_id.clone())) {
            fresh.push(grade);
        } else {
            debug!(row = index + 1, student_id = %grade.student_id, course_id = %grade.course_id, "duplicate grade row");
            duplicates += 1;
        }
    }

    Ok((fresh, duplicates))
}

/// Imports a grade file in one transaction: either every new grade is
/// stored or none is.
#[tracing::instrument(skip(pool), fields(path = %csv_path.display()))]
pub async fn import_grades_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<ImportSummary> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = read_grade_rows(file)?;

    let mut tx = pool.begin().await?;
    let students = fetch_students(&mut *tx).await?;
    let courses = fetch_courses(&mut *tx).await?;
    let existing = fetch_grades(&mut *tx).await?;
    let (fresh, duplicates) = plan_grade_import(rows, &students, &courses, &existing)?;

    let mut summary = ImportSummary {
        inserted: 0,
        duplicates,
    };
    for grade in &fresh {
        if insert_grade(&mut *tx, grade)
            .await
            .with_context(|| format!("failed to insert grade for {}/{}", grade.student_id, grade.course_id))?
        {
            summary.inserted += 1;
        } else {
            warn!(student_id = %grade.student_id, course_id = %grade.course_id, "duplicate grade skipped");
            summary.duplicates += 1;
        }
    }
    tx.commit().await?;

    info!(inserted = summary.inserted, duplicates = summary.duplicates, "grade import finished");
    Ok(summary)
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct StudentImportPlan {
    pub students: Vec<Student>,
    /// Net enrollment change per course id; courses with no change are left out.
    pub enrollment_changes: IndexMap<String, i32>,
}

/// Resolves imported students against the roster. A row whose email is on
/// file updates that student under its existing id, enrolled courses
/// included. A row whose id already belongs to another email is rejected,
/// as is any unknown course id. Later rows for the same email win.
pub fn plan_student_import(
    rows: Vec<Student>,
    existing: &[Student],
    courses: &[Course],
) -> anyhow::Result<StudentImportPlan> {
    let course_ids: HashSet<&str> = courses.iter().map(|c| c.id.as_str()).collect();
    let mut by_email: HashMap<String, Student> = existing
        .iter()
        .map(|s| (s.email.to_lowercase(), s.clone()))
        .collect();
    let mut email_by_id: HashMap<String, String> = existing
        .iter()
        .map(|s| (s.id.clone(), s.email.to_lowercase()))
        .collect();

    let mut planned: IndexMap<String, Student> = IndexMap::new();
    let mut changes: IndexMap<String, i32> = IndexMap::new();

    for (index, mut student) in rows.into_iter().enumerate() {
        if let Some(missing) = student
            .enrolled_courses
            .iter()
            .find(|id| !course_ids.contains(id.as_str()))
        {
            let err = ValidationError::NotFound {
                entity: "course",
                id: missing.clone(),
            };
            return Err(invalid_row("student", index + 1, err));
        }

        let before = match by_email.get(&student.email) {
            Some(current) => {
                student.id = current.id.clone();
                current.enrolled_courses.clone()
            }
            None => {
                if let Some(owner) = email_by_id.get(&student.id) {
                    let err = ValidationError::StudentIdTaken {
                        id: student.id,
                        email: owner.clone(),
                    };
                    return Err(invalid_row("student", index + 1, err));
                }
                Vec::new()
            }
        };

        for id in student.enrolled_courses.iter().filter(|id| !before.contains(id)) {
            *changes.entry(id.clone()).or_default() += 1;
        }
        for id in before.iter().filter(|id| !student.enrolled_courses.contains(id)) {
            *changes.entry(id.clone()).or_default() -= 1;
        }

        email_by_id.insert(student.id.clone(), student.email.clone());
        by_email.insert(student.email.clone(), student.clone());
        planned.insert(student.email.clone(), student);
    }

    changes.retain(|_, delta| *delta != 0);
    Ok(StudentImportPlan {
        students: planned.into_values().collect(),
        enrollment_changes: changes,
    })
}

async fn upsert_student<'e, E: PgExecutor<'e>>(executor: E, student: &Student) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO academic_analytics.students
        (id, name, email, year, gpa, enrollment_date, enrolled_courses)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (email) DO UPDATE
        SET name = EXCLUDED.name,
            year = EXCLUDED.year,
            gpa = EXCLUDED.gpa,
            enrollment_date = EXCLUDED.enrollment_date,
            enrolled_courses = EXCLUDED.enrolled_courses
        "#,
    )
    .bind(&student.id)
    .bind(&student.name)
    .bind(&student.email)
    .bind(student.year.as_str())
    .bind(student.gpa)
    .bind(student.enrollment_date)
    .bind(&student.enrolled_courses)
    .execute(executor)
    .await?;
    Ok(())
}

/// Imports a student file in one transaction, upserting by email and
/// moving course enrollment counts with each student's course set.
#[tracing::instrument(skip(pool), fields(path = %csv_path.display()))]
pub async fn import_students_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = read_student_rows(file)?;

    let mut tx = pool.begin().await?;
    // Holds off concurrent course assignments until the counts are settled.
    sqlx::query("LOCK TABLE academic_analytics.students IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut *tx)
        .await?;
    let existing = fetch_students(&mut *tx).await?;
    let courses = fetch_courses(&mut *tx).await?;
    let plan = plan_student_import(rows, &existing, &courses)?;

    for student in &plan.students {
        upsert_student(&mut *tx, student)
            .await
            .with_context(|| format!("failed to store student {}", student.email))?;
    }
    for (course_id, delta) in &plan.enrollment_changes {
        sqlx::query(
            "UPDATE academic_analytics.courses \
             SET enrollment = GREATEST(enrollment + $1, 0) WHERE id = $2",
        )
        .bind(*delta)
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    info!(
        count = plan.students.len(),
        courses_changed = plan.enrollment_changes.len(),
        "student import finished"
    );
    Ok(plan.students.len())
}

/// Enrolls students in a course inside one transaction. Students already in
/// the course are left alone and the course's enrollment grows by the
/// number actually added.
#[tracing::instrument(skip(pool, student_ids), fields(students = student_ids.len()))]
pub async fn assign_course(
    pool: &PgPool,
    course_id: &str,
    student_ids: &[String],
) -> anyhow::Result<AssignmentPlan> {
    let mut tx = pool.begin().await?;

    let course_row = sqlx::query(&format!(
        "SELECT {COURSE_COLUMNS} FROM academic_analytics.courses WHERE id = $1 FOR UPDATE"
    ))
    .bind(course_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ValidationError::NotFound {
        entity: "course",
        id: course_id.to_string(),
    })?;
    let course = course_from_row(&course_row)?;

    let student_rows = sqlx::query(&format!(
        "SELECT {STUDENT_COLUMNS} FROM academic_analytics.students WHERE id = ANY($1) FOR UPDATE"
    ))
    .bind(student_ids)
    .fetch_all(&mut *tx)
    .await?;
    let students = student_rows
        .iter()
        .map(student_from_row)
        .collect::<anyhow::Result<Vec<_>>>()?;

    let plan = roster::plan_assignment(&students, &course, student_ids)?;

    for student_id in &plan.newly_enrolled {
        sqlx::query(
            "UPDATE academic_analytics.students \
             SET enrolled_courses = array_append(enrolled_courses, $1) WHERE id = $2",
        )
        .bind(&plan.course_id)
        .bind(student_id)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE academic_analytics.courses SET enrollment = $1 WHERE id = $2")
        .bind(i32::try_from(plan.new_enrollment).context("enrollment overflow")?)
        .bind(&plan.course_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(
        course_id = %plan.course_id,
        added = plan.newly_enrolled.len(),
        skipped = plan.already_enrolled.len(),
        "course assigned"
    );
    Ok(plan)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let faculty = vec![
        ("fac-001", "Dana Okafor", "dana.okafor@university.edu", "Mathematics", vec!["crs-101", "crs-220"]),
        ("fac-002", "Marcus Hale", "marcus.hale@university.edu", "Chemistry", vec!["crs-150"]),
        ("fac-003", "Ines Carvalho", "ines.carvalho@university.edu", "History", vec!["crs-210"]),
    ];

    for (id, name, email, department, courses) in faculty {
        let courses: Vec<String> = courses.into_iter().map(str::to_string).collect();
        sqlx::query(
            r#"
            INSERT INTO academic_analytics.faculty (id, name, email, department, courses)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, department = EXCLUDED.department, courses = EXCLUDED.courses
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(department)
        .bind(&courses)
        .execute(pool)
        .await?;
    }

    let courses = vec![
        ("crs-101", "Calculus I", "MATH101", "fac-001", 3, 4),
        ("crs-220", "Linear Algebra", "MATH220", "fac-001", 2, 3),
        ("crs-150", "General Chemistry", "CHEM150", "fac-002", 2, 4),
        ("crs-210", "Modern World History", "HIST210", "fac-003", 1, 3),
    ];

    for (id, name, code, faculty_id, enrollment, credits) in courses {
        sqlx::query(
            r#"
            INSERT INTO academic_analytics.courses (id, name, code, faculty, enrollment, credits)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(code)
        .bind(vec![faculty_id.to_string()])
        .bind(enrollment)
        .bind(credits)
        .execute(pool)
        .await?;
    }

    let students = vec![
        ("stu-001", "Avery Lee", "avery.lee@university.edu", "Junior", 3.92, (2024, 1, 15), vec!["crs-101", "crs-150"]),
        ("stu-002", "Jules Moreno", "jules.moreno@university.edu", "Sophomore", 3.41, (2024, 3, 2), vec!["crs-101", "crs-220"]),
        ("stu-003", "Kiara Patel", "kiara.patel@university.edu", "Senior", 3.68, (2023, 9, 5), vec!["crs-150", "crs-210"]),
        ("stu-004", "Tomás Ruiz", "tomas.ruiz@university.edu", "Freshman", 2.85, (2024, 9, 3), vec!["crs-101", "crs-220"]),
    ];

    for (id, name, email, year, gpa, (y, m, d), courses) in students {
        let student = Student {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            year: validate::academic_year(year)?,
            gpa,
            enrollment_date: NaiveDate::from_ymd_opt(y, m, d).context("invalid date")?,
            enrolled_courses: courses.into_iter().map(str::to_string).collect(),
        };
        upsert_student(pool, &student).await?;
    }

    let grades = vec![
        ("stu-001", "crs-101", "A+", 94.0),
        ("stu-002", "crs-101", "B+", 81.5),
        ("stu-004", "crs-101", "C+", 63.0),
        ("stu-001", "crs-150", "A", 88.0),
        ("stu-003", "crs-150", "A-", 84.0),
        ("stu-002", "crs-220", "B", 78.0),
        ("stu-004", "crs-220", "D", 48.0),
        ("stu-003", "crs-210", "A+", 94.0),
    ];

    for (student_id, course_id, letter, score) in grades {
        let grade = Grade {
            student_id: student_id.to_string(),
            course_id: course_id.to_string(),
            grade: validate::letter_grade(letter)?,
            score,
        };
        insert_grade(pool, &grade).await?;
    }

    Ok(())
}
