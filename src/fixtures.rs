use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::model::{AuditLog, Profile, UserRole};
use crate::store::{NewCourse, NewGrade, RecordStore};

const ADMINS: &[(&str, &str, &str)] = &[("1", "Admin User", "admin@example.com")];

const TEACHERS: &[(&str, &str, &str)] = &[
    ("2", "Teacher User", "teacher@example.com"),
    ("8", "Dr. Robert Smith", "robert@example.com"),
    ("9", "Prof. Lisa Wong", "lisa@example.com"),
];

const STUDENTS: &[(&str, &str, &str)] = &[
    ("3", "Student User", "student@example.com"),
    ("4", "Alex Johnson", "alex@example.com"),
    ("5", "Maria Garcia", "maria@example.com"),
    ("6", "James Wilson", "james@example.com"),
    ("7", "Emily Chen", "emily@example.com"),
];

// (id, name, code, teacher id)
const COURSES: &[(&str, &str, &str, &str)] = &[
    ("c1", "Mathematics 101", "MATH101", "2"),
    ("c2", "Physics 101", "PHYS101", "2"),
    ("c3", "Computer Science Fundamentals", "CS101", "8"),
    ("c4", "Biology Basics", "BIO101", "9"),
    ("c5", "History of Art", "ART101", "9"),
    ("c6", "Advanced Mathematics", "MATH201", "2"),
];

const ACTIONS: &[&str] = &[
    "Login",
    "Logout",
    "Add Grade",
    "Edit Grade",
    "View Report",
    "Add User",
    "Edit User",
    "Download Report",
];

pub const DEMO_AUDIT_LOG_COUNT: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSummary {
    pub profiles: usize,
    pub courses: usize,
    pub enrollments: usize,
    pub grades: usize,
    pub audit_logs: usize,
}

fn avatar_url(name: &str, background: &str) -> String {
    format!(
        "https://ui-avatars.com/api/?name={}&background={}&color=fff",
        name.replace(' ', "+"),
        background
    )
}

pub fn comment_for(value: f64) -> &'static str {
    if value >= 90.0 {
        "Excellent work!"
    } else if value >= 80.0 {
        "Good job."
    } else if value >= 70.0 {
        "Satisfactory."
    } else {
        "Needs improvement."
    }
}

fn demo_profiles() -> Vec<Profile> {
    let mut out = Vec::new();
    let groups: [(&[(&str, &str, &str)], UserRole, &str); 3] = [
        (ADMINS, UserRole::Admin, "3b82f6"),
        (TEACHERS, UserRole::Teacher, "8b5cf6"),
        (STUDENTS, UserRole::Student, "22c55e"),
    ];
    for (rows, role, background) in groups {
        for (id, name, email) in rows {
            out.push(Profile {
                id: id.to_string(),
                name: name.to_string(),
                email: email.to_string(),
                role,
                avatar: Some(avatar_url(name, background)),
            });
        }
    }
    out
}

/// One to three grades per student and course, valued 61..=100 and dated
/// within the last 60 days. Stable across runs.
fn demo_grades() -> Vec<NewGrade> {
    let today = Utc::now().date_naive();
    let mut out = Vec::new();
    for (si, (student_id, _, _)) in STUDENTS.iter().enumerate() {
        for (ci, (course_id, _, _, _)) in COURSES.iter().enumerate() {
            let count = 1 + (si * 5 + ci * 3) % 3;
            for k in 0..count {
                let seed = si * 31 + ci * 17 + k * 11;
                let value = (61 + seed % 40) as f64;
                let days_ago = ((seed * 7) % 60) as i64;
                out.push(NewGrade {
                    id: format!("g{}", out.len() + 1),
                    student_id: student_id.to_string(),
                    course_id: course_id.to_string(),
                    value,
                    comment: Some(comment_for(value).to_string()),
                    date: (today - Duration::days(days_ago))
                        .format("%Y-%m-%d")
                        .to_string(),
                });
            }
        }
    }
    out
}

fn demo_audit_logs(profiles: &[Profile]) -> Vec<AuditLog> {
    let now = Utc::now();
    let student_names: Vec<&str> = STUDENTS.iter().map(|(_, name, _)| *name).collect();
    let course_names: Vec<&str> = COURSES.iter().map(|(_, name, _, _)| *name).collect();
    (0..DEMO_AUDIT_LOG_COUNT)
        .map(|i| {
            let user = &profiles[(i * 7) % profiles.len()];
            let action = ACTIONS[(i * 3) % ACTIONS.len()];
            let student = student_names[i % student_names.len()];
            let course = course_names[(i * 5) % course_names.len()];
            let details = match action {
                "Login" => format!("User logged in from IP 192.168.1.{}", (i * 37) % 255),
                "Logout" => "User logged out".to_string(),
                "Add Grade" => format!("Added grade for {} in {}", student, course),
                "Edit Grade" => format!("Modified grade for {} in {}", student, course),
                "View Report" if user.role == UserRole::Student => {
                    "Viewed performance report for self".to_string()
                }
                "View Report" => format!("Viewed performance report for {}", course),
                "Add User" => format!("Added new user with role: {}", user.role.as_str()),
                "Edit User" => format!("Updated user profile for {}", student),
                _ => format!("Downloaded CSV report for {}", course),
            };
            let minutes_ago = ((i * 613) % (30 * 1440)) as i64;
            AuditLog {
                id: format!("log{}", i),
                user_id: user.id.clone(),
                user_name: user.name.clone(),
                user_role: user.role,
                action: action.to_string(),
                details,
                timestamp: (now - Duration::minutes(minutes_ago)).to_rfc3339(),
            }
        })
        .collect()
}

/// Loads the demo school into `store`. Every student is enrolled in every
/// course.
pub fn seed(store: &mut dyn RecordStore) -> anyhow::Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    let profiles = demo_profiles();
    for p in &profiles {
        store.insert_profile(p)?;
        summary.profiles += 1;
    }

    for (id, name, code, teacher_id) in COURSES {
        store.insert_course(&NewCourse {
            id: id.to_string(),
            name: name.to_string(),
            code: code.to_string(),
            teacher_id: teacher_id.to_string(),
        })?;
        summary.courses += 1;
    }

    for (student_id, _, _) in STUDENTS {
        for (course_id, _, _, _) in COURSES {
            let enrollment_id = format!("e-{}-{}", student_id, course_id);
            store.enroll(&enrollment_id, student_id, course_id)?;
            summary.enrollments += 1;
        }
    }

    for g in demo_grades() {
        store.insert_grade(&g)?;
        summary.grades += 1;
    }

    for log in demo_audit_logs(&profiles) {
        store.append_audit_log(&log)?;
        summary.audit_logs += 1;
    }

    info!(
        backend = store.backend(),
        profiles = summary.profiles,
        courses = summary.courses,
        grades = summary.grades,
        "demo data seeded"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc;
    use crate::store::MemoryStore;

    #[test]
    fn seed_populates_every_table() {
        let mut store = MemoryStore::new();
        let summary = seed(&mut store).expect("seed");
        assert_eq!(summary.profiles, 9);
        assert_eq!(summary.courses, 6);
        assert_eq!(summary.enrollments, 30);
        assert_eq!(summary.audit_logs, DEMO_AUDIT_LOG_COUNT);
        assert!(summary.grades >= 30 && summary.grades <= 90);
    }

    #[test]
    fn demo_grades_stay_between_61_and_100() {
        for g in demo_grades() {
            assert!(g.value >= 61.0 && g.value <= 100.0, "{}", g.value);
            assert_eq!(g.comment.as_deref(), Some(comment_for(g.value)));
        }
    }

    #[test]
    fn seeded_reports_cover_every_course() {
        let mut store = MemoryStore::new();
        seed(&mut store).expect("seed");
        let courses = store.enrolled_courses("4").expect("courses");
        let grades = calc::normalize_grades(store.grades_for_student("4").expect("grades"))
            .expect("normalize");
        let report = calc::build_grade_report("4", "Alex Johnson", &grades, &courses);
        assert_eq!(report.courses.len(), 6);
        assert!(report.courses.iter().all(|c| !c.grades.is_empty()));
        assert!(report.overall_average >= 61.0 && report.overall_average <= 100.0);
    }

    #[test]
    fn seeding_twice_fails() {
        let mut store = MemoryStore::new();
        seed(&mut store).expect("seed");
        assert!(seed(&mut store).is_err());
    }
}
