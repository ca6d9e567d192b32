use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use serde_json::json;
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::model::{
    AdminOverview, AuditLog, ClassPerformance, Course, CourseGrades, Grade, GradeDistribution,
    GradeReport, Profile, RawGrade, RecentGrade, TeacherOverview, UserRole,
};

pub const DEFAULT_AUDIT_LIMIT: usize = 10;
pub const DEFAULT_RECENT_GRADES_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for CalcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CalcError {}

/// Half-up 1-decimal rounding: `Int(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Mean rounded to one decimal, 0 for an empty slice.
///
/// The rounded result is clamped into `[min, max]` of the inputs so that a
/// rounded mean never reports a value no constituent reached (e.g. a lone
/// 89.96 must not become 90.0).
pub fn rounded_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: f64 = values.iter().sum();
    let mean = sum / (values.len() as f64);
    let (lo, hi) = min_max(values);
    round_off_1_decimal(mean).clamp(lo, hi)
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        })
}

fn invalid_grade_value(grade_id: &str, raw: &serde_json::Value) -> CalcError {
    CalcError::new(
        "invalid_grade_value",
        format!("invalid grade value for grade {}", grade_id),
    )
    .with_details(json!({ "gradeId": grade_id, "value": raw }))
}

/// Coerces a loosely-typed grade value to a finite `f64`.
///
/// Numbers and numeric strings are accepted; everything else is a caller
/// error.
pub fn normalize_grade_value(grade_id: &str, raw: &serde_json::Value) -> Result<f64, CalcError> {
    let parsed = match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(invalid_grade_value(grade_id, raw)),
    }
}

pub fn normalize_grade(raw: RawGrade) -> Result<Grade, CalcError> {
    let value = normalize_grade_value(&raw.id, &raw.value)?;
    Ok(Grade {
        id: raw.id,
        student_id: raw.student_id,
        student_name: raw.student_name,
        course_id: raw.course_id,
        course_name: raw.course_name,
        value,
        comment: raw.comment,
        date: raw.date,
    })
}

pub fn normalize_grades(raws: Vec<RawGrade>) -> Result<Vec<Grade>, CalcError> {
    raws.into_iter().map(normalize_grade).collect()
}

pub fn course_average(grades: &[Grade]) -> f64 {
    let values: Vec<f64> = grades.iter().map(|g| g.value).collect();
    rounded_mean(&values)
}

/// One group per enrolled course, in enrollment order. Grades for courses
/// outside `courses` are dropped.
pub fn group_grades_by_course(grades: &[Grade], courses: &[Course]) -> Vec<CourseGrades> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut groups: Vec<CourseGrades> = Vec::with_capacity(courses.len());
    for c in courses {
        if !seen.insert(c.id.as_str()) {
            continue;
        }
        let course_grades: Vec<Grade> = grades
            .iter()
            .filter(|g| g.course_id == c.id)
            .cloned()
            .collect();
        let average = course_average(&course_grades);
        groups.push(CourseGrades {
            course_id: c.id.clone(),
            course_name: c.name.clone(),
            grades: course_grades,
            average,
        });
    }
    groups
}

/// Mean of per-course averages. Every enrolled course weighs the same no
/// matter how many grades it holds; this is not the flat mean of all values.
pub fn overall_average(courses: &[CourseGrades]) -> f64 {
    let averages: Vec<f64> = courses.iter().map(|c| c.average).collect();
    rounded_mean(&averages)
}

pub fn build_grade_report(
    student_id: &str,
    student_name: &str,
    grades: &[Grade],
    enrolled: &[Course],
) -> GradeReport {
    let own: Vec<Grade> = grades
        .iter()
        .filter(|g| g.student_id == student_id)
        .cloned()
        .collect();
    let courses = group_grades_by_course(&own, enrolled);
    let overall_average = overall_average(&courses);
    GradeReport {
        student_id: student_id.to_string(),
        student_name: student_name.to_string(),
        courses,
        overall_average,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeBand {
    A,
    B,
    C,
    D,
    F,
}

/// A: >= 90 (no upper bound), B: >= 80, C: >= 70, D: >= 60, F: everything else.
pub fn grade_band(value: f64) -> GradeBand {
    match value {
        v if v >= 90.0 => GradeBand::A,
        v if v >= 80.0 => GradeBand::B,
        v if v >= 70.0 => GradeBand::C,
        v if v >= 60.0 => GradeBand::D,
        _ => GradeBand::F,
    }
}

pub fn grade_distribution<I>(values: I) -> GradeDistribution
where
    I: IntoIterator<Item = f64>,
{
    let mut dist = GradeDistribution::default();
    for v in values {
        match grade_band(v) {
            GradeBand::A => dist.a += 1,
            GradeBand::B => dist.b += 1,
            GradeBand::C => dist.c += 1,
            GradeBand::D => dist.d += 1,
            GradeBand::F => dist.f += 1,
        }
    }
    dist
}

/// Teacher-facing summary of one course. Uses the flat mean over every
/// grade in the course, unlike the per-student overall average.
pub fn class_performance(course: &Course, grades: &[Grade]) -> ClassPerformance {
    let values: Vec<f64> = grades
        .iter()
        .filter(|g| g.course_id == course.id)
        .map(|g| g.value)
        .collect();
    let student_count = grades
        .iter()
        .filter(|g| g.course_id == course.id)
        .map(|g| g.student_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let (highest_grade, lowest_grade) = if values.is_empty() {
        (0.0, 0.0)
    } else {
        let (lo, hi) = min_max(&values);
        (hi, lo)
    };

    ClassPerformance {
        course_id: course.id.clone(),
        course_name: course.name.clone(),
        teacher_id: course.teacher_id.clone(),
        average_grade: rounded_mean(&values),
        highest_grade,
        lowest_grade,
        student_count,
        grade_distribution: grade_distribution(values.iter().copied()),
    }
}

pub fn teacher_overview(teacher_id: &str, courses: Vec<ClassPerformance>) -> TeacherOverview {
    let total_students: usize = courses.iter().map(|c| c.student_count).sum();
    let weighted_average = if total_students > 0 {
        let weighted: f64 = courses
            .iter()
            .map(|c| c.average_grade * (c.student_count as f64))
            .sum();
        round_off_1_decimal(weighted / (total_students as f64))
    } else {
        0.0
    };
    TeacherOverview {
        teacher_id: teacher_id.to_string(),
        course_count: courses.len(),
        total_students,
        weighted_average,
        courses,
    }
}

fn parse_grade_date(date: &str) -> Option<NaiveDate> {
    let t = date.trim();
    NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(t).ok().map(|d| d.date_naive()))
}

/// Flattens a report into its most recent `limit` grades, oldest first.
pub fn recent_grades(report: &GradeReport, limit: usize) -> Vec<RecentGrade> {
    let mut all: Vec<(Option<NaiveDate>, RecentGrade)> = report
        .courses
        .iter()
        .flat_map(|c| {
            c.grades.iter().map(move |g| {
                (
                    parse_grade_date(&g.date),
                    RecentGrade {
                        date: g.date.clone(),
                        value: g.value,
                        course_name: c.course_name.clone(),
                    },
                )
            })
        })
        .collect();
    all.sort_by(|(da, a), (db, b)| da.cmp(db).then_with(|| a.date.cmp(&b.date)));
    let skip = all.len().saturating_sub(limit);
    all.into_iter().skip(skip).map(|(_, g)| g).collect()
}

fn parse_timestamp(ts: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(ts.trim()).ok()
}

/// Newest `limit` entries, newest first. Unparseable timestamps sort last;
/// ties keep their input order.
pub fn recent_audit_logs(logs: &[AuditLog], limit: usize) -> Vec<AuditLog> {
    let mut keyed: Vec<(Option<DateTime<FixedOffset>>, &AuditLog)> = logs
        .iter()
        .map(|l| (parse_timestamp(&l.timestamp), l))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    keyed
        .into_iter()
        .take(limit)
        .map(|(_, l)| l.clone())
        .collect()
}

pub fn admin_overview(profiles: &[Profile], course_count: usize, logs: &[AuditLog]) -> AdminOverview {
    let count_role = |role: UserRole| profiles.iter().filter(|p| p.role == role).count();
    AdminOverview {
        student_count: count_role(UserRole::Student),
        teacher_count: count_role(UserRole::Teacher),
        admin_count: count_role(UserRole::Admin),
        course_count,
        recent_activity: recent_audit_logs(logs, DEFAULT_AUDIT_LIMIT),
    }
}
