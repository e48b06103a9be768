use std::io::Write;

use crate::models::{Course, EnrollmentTrend, Faculty, Student, TopStudent};

pub fn students<W: Write>(writer: W, students: &[Student]) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        "Student ID",
        "Name",
        "Email",
        "Academic Year",
        "Enrolled Courses",
        "Enrollment Date",
    ])?;

    for student in students {
        csv.write_record([
            student.id.clone(),
            student.name.clone(),
            student.email.clone(),
            student.year.to_string(),
            student.enrolled_courses.len().to_string(),
            student.enrollment_date.format("%B %-d, %Y").to_string(),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

pub fn courses<W: Write>(writer: W, courses: &[Course]) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        "Code",
        "Course Name",
        "Credits",
        "Enrolled Students",
        "Faculty Assigned",
    ])?;

    for course in courses {
        csv.write_record([
            course.code.clone(),
            course.name.clone(),
            course.credits.to_string(),
            course.enrollment.to_string(),
            course.faculty.join(","),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

pub fn faculty<W: Write>(writer: W, faculty: &[Faculty]) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["Faculty Name", "Email", "Department", "Courses"])?;

    for member in faculty {
        csv.write_record([
            member.name.clone(),
            member.email.clone(),
            member.department.clone(),
            member.courses.join(", "),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

pub fn enrollment_trends<W: Write>(writer: W, trends: &[EnrollmentTrend]) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["Month", "Total Enrollments"])?;

    for trend in trends {
        csv.write_record([trend.month.clone(), trend.enrollments.to_string()])?;
    }

    csv.flush()?;
    Ok(())
}

pub fn top_students<W: Write>(writer: W, leaderboard: &[TopStudent]) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["Rank", "Name", "Email", "Course", "Code", "Grade", "Score"])?;

    for entry in leaderboard {
        csv.write_record([
            entry.rank.to_string(),
            entry.name.clone(),
            entry.email.clone(),
            entry.course_name.clone(),
            entry.course_code.clone(),
            entry.grade.to_string(),
            entry.score.to_string(),
        ])?;
    }

    csv.flush()?;
    Ok(())
}
