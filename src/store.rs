use anyhow::{anyhow, bail};
use serde_json::json;

use crate::model::{AuditLog, Course, Enrollment, Profile, RawGrade, UserRole};

pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct NewCourse {
    pub id: String,
    pub name: String,
    pub code: String,
    pub teacher_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGrade {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub value: f64,
    pub comment: Option<String>,
    pub date: String,
}

/// Everything the daemon needs from a backend. Names on courses, grades and
/// enrollments are resolved by the store; missing profiles read as
/// `"Unknown"`.
///
/// Course listings are ordered by name. Grade listings are newest first.
pub trait RecordStore {
    fn backend(&self) -> &'static str;

    fn profile(&self, id: &str) -> anyhow::Result<Option<Profile>>;
    fn profiles(&self, role: Option<UserRole>) -> anyhow::Result<Vec<Profile>>;
    fn courses(&self) -> anyhow::Result<Vec<Course>>;
    fn course(&self, id: &str) -> anyhow::Result<Option<Course>>;
    fn courses_by_teacher(&self, teacher_id: &str) -> anyhow::Result<Vec<Course>>;
    fn enrolled_courses(&self, student_id: &str) -> anyhow::Result<Vec<Course>>;
    fn enrollments(&self, course_id: &str) -> anyhow::Result<Vec<Enrollment>>;
    fn grades_for_student(&self, student_id: &str) -> anyhow::Result<Vec<RawGrade>>;
    fn grades_for_course(&self, course_id: &str) -> anyhow::Result<Vec<RawGrade>>;
    fn grade(&self, id: &str) -> anyhow::Result<Option<RawGrade>>;
    fn audit_logs(&self) -> anyhow::Result<Vec<AuditLog>>;

    fn insert_profile(&mut self, profile: &Profile) -> anyhow::Result<()>;
    fn update_profile(&mut self, profile: &Profile) -> anyhow::Result<bool>;
    fn insert_course(&mut self, course: &NewCourse) -> anyhow::Result<()>;
    fn enroll(&mut self, enrollment_id: &str, student_id: &str, course_id: &str)
        -> anyhow::Result<()>;
    fn insert_grade(&mut self, grade: &NewGrade) -> anyhow::Result<()>;
    fn update_grade(&mut self, id: &str, value: f64, comment: Option<&str>)
        -> anyhow::Result<bool>;
    fn append_audit_log(&mut self, log: &AuditLog) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
struct EnrollmentRow {
    id: String,
    student_id: String,
    course_id: String,
}

#[derive(Debug, Clone)]
struct GradeRow {
    id: String,
    student_id: String,
    course_id: String,
    value: serde_json::Value,
    comment: Option<String>,
    date: String,
}

/// In-memory backend, used for the demo workspace.
#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: Vec<Profile>,
    courses: Vec<NewCourse>,
    enrollments: Vec<EnrollmentRow>,
    grades: Vec<GradeRow>,
    audit_logs: Vec<AuditLog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn profile_name(&self, id: &str) -> String {
        self.profiles
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string())
    }

    fn resolve_course(&self, row: &NewCourse) -> Course {
        Course {
            id: row.id.clone(),
            name: row.name.clone(),
            code: row.code.clone(),
            teacher_id: row.teacher_id.clone(),
            teacher_name: self.profile_name(&row.teacher_id),
        }
    }

    fn course_name(&self, id: &str) -> String {
        self.courses
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string())
    }

    fn resolve_grade(&self, row: &GradeRow) -> RawGrade {
        RawGrade {
            id: row.id.clone(),
            student_id: row.student_id.clone(),
            student_name: self.profile_name(&row.student_id),
            course_id: row.course_id.clone(),
            course_name: self.course_name(&row.course_id),
            value: row.value.clone(),
            comment: row.comment.clone(),
            date: row.date.clone(),
        }
    }

    fn sorted_courses<'a, I>(&self, rows: I) -> Vec<Course>
    where
        I: IntoIterator<Item = &'a NewCourse>,
    {
        let mut out: Vec<Course> = rows.into_iter().map(|c| self.resolve_course(c)).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    fn newest_grades<F>(&self, keep: F) -> Vec<RawGrade>
    where
        F: Fn(&GradeRow) -> bool,
    {
        self.grades
            .iter()
            .rev()
            .filter(|g| keep(g))
            .map(|g| self.resolve_grade(g))
            .collect()
    }
}

impl RecordStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn profile(&self, id: &str) -> anyhow::Result<Option<Profile>> {
        Ok(self.profiles.iter().find(|p| p.id == id).cloned())
    }

    fn profiles(&self, role: Option<UserRole>) -> anyhow::Result<Vec<Profile>> {
        let mut out: Vec<Profile> = self
            .profiles
            .iter()
            .filter(|p| role.map(|r| p.role == r).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn courses(&self) -> anyhow::Result<Vec<Course>> {
        Ok(self.sorted_courses(self.courses.iter()))
    }

    fn course(&self, id: &str) -> anyhow::Result<Option<Course>> {
        Ok(self
            .courses
            .iter()
            .find(|c| c.id == id)
            .map(|c| self.resolve_course(c)))
    }

    fn courses_by_teacher(&self, teacher_id: &str) -> anyhow::Result<Vec<Course>> {
        Ok(self.sorted_courses(self.courses.iter().filter(|c| c.teacher_id == teacher_id)))
    }

    fn enrolled_courses(&self, student_id: &str) -> anyhow::Result<Vec<Course>> {
        let rows = self.courses.iter().filter(|c| {
            self.enrollments
                .iter()
                .any(|e| e.student_id == student_id && e.course_id == c.id)
        });
        Ok(self.sorted_courses(rows))
    }

    fn enrollments(&self, course_id: &str) -> anyhow::Result<Vec<Enrollment>> {
        Ok(self
            .enrollments
            .iter()
            .filter(|e| e.course_id == course_id)
            .map(|e| Enrollment {
                id: e.id.clone(),
                student_id: e.student_id.clone(),
                student_name: self.profile_name(&e.student_id),
                course_id: e.course_id.clone(),
            })
            .collect())
    }

    fn grades_for_student(&self, student_id: &str) -> anyhow::Result<Vec<RawGrade>> {
        Ok(self.newest_grades(|g| g.student_id == student_id))
    }

    fn grades_for_course(&self, course_id: &str) -> anyhow::Result<Vec<RawGrade>> {
        Ok(self.newest_grades(|g| g.course_id == course_id))
    }

    fn grade(&self, id: &str) -> anyhow::Result<Option<RawGrade>> {
        Ok(self
            .grades
            .iter()
            .find(|g| g.id == id)
            .map(|g| self.resolve_grade(g)))
    }

    fn audit_logs(&self) -> anyhow::Result<Vec<AuditLog>> {
        Ok(self.audit_logs.clone())
    }

    fn insert_profile(&mut self, profile: &Profile) -> anyhow::Result<()> {
        if self.profiles.iter().any(|p| p.id == profile.id) {
            bail!("profile {} already exists", profile.id);
        }
        self.profiles.push(profile.clone());
        Ok(())
    }

    fn update_profile(&mut self, profile: &Profile) -> anyhow::Result<bool> {
        match self.profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => {
                *existing = profile.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert_course(&mut self, course: &NewCourse) -> anyhow::Result<()> {
        if self.courses.iter().any(|c| c.id == course.id) {
            bail!("course {} already exists", course.id);
        }
        if !self.profiles.iter().any(|p| p.id == course.teacher_id) {
            bail!("teacher {} not found", course.teacher_id);
        }
        self.courses.push(course.clone());
        Ok(())
    }

    fn enroll(
        &mut self,
        enrollment_id: &str,
        student_id: &str,
        course_id: &str,
    ) -> anyhow::Result<()> {
        if self
            .enrollments
            .iter()
            .any(|e| e.student_id == student_id && e.course_id == course_id)
        {
            bail!("student {} already enrolled in {}", student_id, course_id);
        }
        if !self.profiles.iter().any(|p| p.id == student_id) {
            bail!("student {} not found", student_id);
        }
        if !self.courses.iter().any(|c| c.id == course_id) {
            bail!("course {} not found", course_id);
        }
        self.enrollments.push(EnrollmentRow {
            id: enrollment_id.to_string(),
            student_id: student_id.to_string(),
            course_id: course_id.to_string(),
        });
        Ok(())
    }

    fn insert_grade(&mut self, grade: &NewGrade) -> anyhow::Result<()> {
        if self.grades.iter().any(|g| g.id == grade.id) {
            bail!("grade {} already exists", grade.id);
        }
        if !self.profiles.iter().any(|p| p.id == grade.student_id) {
            bail!("student {} not found", grade.student_id);
        }
        if !self.courses.iter().any(|c| c.id == grade.course_id) {
            bail!("course {} not found", grade.course_id);
        }
        self.grades.push(GradeRow {
            id: grade.id.clone(),
            student_id: grade.student_id.clone(),
            course_id: grade.course_id.clone(),
            value: json!(grade.value),
            comment: grade.comment.clone(),
            date: grade.date.clone(),
        });
        Ok(())
    }

    fn update_grade(&mut self, id: &str, value: f64, comment: Option<&str>) -> anyhow::Result<bool> {
        let Some(row) = self.grades.iter_mut().find(|g| g.id == id) else {
            return Ok(false);
        };
        row.value = serde_json::Number::from_f64(value)
            .map(serde_json::Value::Number)
            .ok_or_else(|| anyhow!("grade value {} is not finite", value))?;
        row.comment = comment.map(|c| c.to_string());
        Ok(true)
    }

    fn append_audit_log(&mut self, log: &AuditLog) -> anyhow::Result<()> {
        self.audit_logs.push(log.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, name: &str, role: UserRole) -> Profile {
        Profile {
            id: id.to_string(),
            name: name.to_string(),
            email: format!("{}@example.com", id),
            role,
            avatar: None,
        }
    }

    fn seeded() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .insert_profile(&profile("t1", "Teacher User", UserRole::Teacher))
            .unwrap();
        store
            .insert_profile(&profile("s1", "Alex Johnson", UserRole::Student))
            .unwrap();
        for (id, name) in [("c2", "Physics 101"), ("c1", "Mathematics 101")] {
            store
                .insert_course(&NewCourse {
                    id: id.to_string(),
                    name: name.to_string(),
                    code: id.to_ascii_uppercase(),
                    teacher_id: "t1".to_string(),
                })
                .unwrap();
        }
        store
    }

    #[test]
    fn courses_resolve_teacher_names_and_sort_by_name() {
        let store = seeded();
        let courses = store.courses().unwrap();
        let names: Vec<&str> = courses.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Mathematics 101", "Physics 101"]);
        assert_eq!(courses[0].teacher_name, "Teacher User");
    }

    #[test]
    fn enrollment_is_unique_per_pair() {
        let mut store = seeded();
        store.enroll("e1", "s1", "c1").unwrap();
        assert!(store.enroll("e2", "s1", "c1").is_err());
        assert!(store.enroll("e3", "missing", "c1").is_err());
        let enrolled = store.enrolled_courses("s1").unwrap();
        assert_eq!(enrolled.len(), 1);
        assert_eq!(enrolled[0].id, "c1");
    }

    #[test]
    fn grades_list_newest_first_with_names() {
        let mut store = seeded();
        for (id, value) in [("g1", 70.0), ("g2", 80.0)] {
            store
                .insert_grade(&NewGrade {
                    id: id.to_string(),
                    student_id: "s1".to_string(),
                    course_id: "c1".to_string(),
                    value,
                    comment: None,
                    date: "2024-03-01".to_string(),
                })
                .unwrap();
        }
        let grades = store.grades_for_student("s1").unwrap();
        assert_eq!(grades[0].id, "g2");
        assert_eq!(grades[0].student_name, "Alex Johnson");
        assert_eq!(grades[0].course_name, "Mathematics 101");

        assert!(store.update_grade("g1", 91.0, Some("Excellent work!")).unwrap());
        let g1 = store.grade("g1").unwrap().unwrap();
        assert_eq!(g1.value, json!(91.0));
        assert_eq!(g1.comment.as_deref(), Some("Excellent work!"));
        assert!(!store.update_grade("nope", 1.0, None).unwrap());
    }
}
