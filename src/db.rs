use anyhow::Context;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;

use crate::model::{AuditLog, Course, Enrollment, Profile, RawGrade, UserRole};
use crate::store::{NewCourse, NewGrade, RecordStore};

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS profiles(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            avatar_url TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_profiles_role ON profiles(role)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES profiles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_teacher ON courses(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES profiles(id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            UNIQUE(student_id, course_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_course ON enrollments(course_id)",
        [],
    )?;

    // REAL affinity: numeric text is coerced on insert, anything else is kept
    // as text and rejected later during normalization.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            value REAL NOT NULL,
            comment TEXT,
            graded_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES profiles(id),
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_course ON grades(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_logs(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            user_name TEXT NOT NULL,
            user_role TEXT NOT NULL,
            action TEXT NOT NULL,
            details TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

const COURSE_SELECT: &str = "SELECT c.id, c.name, c.code, c.teacher_id, COALESCE(p.full_name, 'Unknown')
     FROM courses c
     LEFT JOIN profiles p ON p.id = c.teacher_id";

const GRADE_SELECT: &str = "SELECT g.id, g.student_id, COALESCE(sp.full_name, 'Unknown'),
            g.course_id, COALESCE(c.name, 'Unknown'), g.value, g.comment, g.graded_at
     FROM grades g
     LEFT JOIN profiles sp ON sp.id = g.student_id
     LEFT JOIN courses c ON c.id = g.course_id";

fn parse_role(r: &Row<'_>, idx: usize) -> rusqlite::Result<UserRole> {
    let raw: String = r.get(idx)?;
    UserRole::parse(&raw).ok_or_else(|| rusqlite::Error::InvalidColumnType(idx, raw, Type::Text))
}

fn profile_from_row(r: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: r.get(0)?,
        name: r.get(1)?,
        email: r.get(2)?,
        role: parse_role(r, 3)?,
        avatar: r.get(4)?,
    })
}

fn course_from_row(r: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: r.get(0)?,
        name: r.get(1)?,
        code: r.get(2)?,
        teacher_id: r.get(3)?,
        teacher_name: r.get(4)?,
    })
}

fn sql_value_to_json(v: Value) -> serde_json::Value {
    match v {
        Value::Null | Value::Blob(_) => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(i),
        Value::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s),
    }
}

fn grade_from_row(r: &Row<'_>) -> rusqlite::Result<RawGrade> {
    Ok(RawGrade {
        id: r.get(0)?,
        student_id: r.get(1)?,
        student_name: r.get(2)?,
        course_id: r.get(3)?,
        course_name: r.get(4)?,
        value: sql_value_to_json(r.get::<_, Value>(5)?),
        comment: r.get(6)?,
        date: r.get(7)?,
    })
}

fn audit_from_row(r: &Row<'_>) -> rusqlite::Result<AuditLog> {
    let role: String = r.get(3)?;
    Ok(AuditLog {
        id: r.get(0)?,
        user_id: r.get(1)?,
        user_name: r.get(2)?,
        user_role: UserRole::parse(&role).unwrap_or(UserRole::Admin),
        action: r.get(4)?,
        details: r.get(5)?,
        timestamp: r.get(6)?,
    })
}

/// SQLite-backed record store living in a workspace directory.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: open_db(workspace)?,
        })
    }

    fn query_list<T, P, F>(&self, sql: &str, params: P, map: F) -> anyhow::Result<Vec<T>>
    where
        P: rusqlite::Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, map)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(rows)
    }
}

impl RecordStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn profile(&self, id: &str) -> anyhow::Result<Option<Profile>> {
        let p = self
            .conn
            .query_row(
                "SELECT id, full_name, email, role, avatar_url FROM profiles WHERE id = ?",
                [id],
                profile_from_row,
            )
            .optional()?;
        Ok(p)
    }

    fn profiles(&self, role: Option<UserRole>) -> anyhow::Result<Vec<Profile>> {
        match role {
            Some(role) => self.query_list(
                "SELECT id, full_name, email, role, avatar_url
                 FROM profiles
                 WHERE role = ?
                 ORDER BY full_name",
                [role.as_str()],
                profile_from_row,
            ),
            None => self.query_list(
                "SELECT id, full_name, email, role, avatar_url
                 FROM profiles
                 ORDER BY full_name",
                [],
                profile_from_row,
            ),
        }
        .context("failed to list profiles")
    }

    fn courses(&self) -> anyhow::Result<Vec<Course>> {
        self.query_list(
            &format!("{} ORDER BY c.name", COURSE_SELECT),
            [],
            course_from_row,
        )
        .context("failed to list courses")
    }

    fn course(&self, id: &str) -> anyhow::Result<Option<Course>> {
        let c = self
            .conn
            .query_row(
                &format!("{} WHERE c.id = ?", COURSE_SELECT),
                [id],
                course_from_row,
            )
            .optional()?;
        Ok(c)
    }

    fn courses_by_teacher(&self, teacher_id: &str) -> anyhow::Result<Vec<Course>> {
        self.query_list(
            &format!("{} WHERE c.teacher_id = ? ORDER BY c.name", COURSE_SELECT),
            [teacher_id],
            course_from_row,
        )
        .context("failed to list teacher courses")
    }

    fn enrolled_courses(&self, student_id: &str) -> anyhow::Result<Vec<Course>> {
        self.query_list(
            &format!(
                "{} JOIN enrollments e ON e.course_id = c.id
                 WHERE e.student_id = ?
                 ORDER BY c.name",
                COURSE_SELECT
            ),
            [student_id],
            course_from_row,
        )
        .context("failed to list enrolled courses")
    }

    fn enrollments(&self, course_id: &str) -> anyhow::Result<Vec<Enrollment>> {
        self.query_list(
            "SELECT e.id, e.student_id, COALESCE(p.full_name, 'Unknown'), e.course_id
             FROM enrollments e
             LEFT JOIN profiles p ON p.id = e.student_id
             WHERE e.course_id = ?
             ORDER BY e.rowid",
            [course_id],
            |r| {
                Ok(Enrollment {
                    id: r.get(0)?,
                    student_id: r.get(1)?,
                    student_name: r.get(2)?,
                    course_id: r.get(3)?,
                })
            },
        )
        .context("failed to list enrollments")
    }

    fn grades_for_student(&self, student_id: &str) -> anyhow::Result<Vec<RawGrade>> {
        self.query_list(
            &format!(
                "{} WHERE g.student_id = ? ORDER BY g.created_at DESC, g.rowid DESC",
                GRADE_SELECT
            ),
            [student_id],
            grade_from_row,
        )
        .context("failed to list student grades")
    }

    fn grades_for_course(&self, course_id: &str) -> anyhow::Result<Vec<RawGrade>> {
        self.query_list(
            &format!(
                "{} WHERE g.course_id = ? ORDER BY g.created_at DESC, g.rowid DESC",
                GRADE_SELECT
            ),
            [course_id],
            grade_from_row,
        )
        .context("failed to list course grades")
    }

    fn grade(&self, id: &str) -> anyhow::Result<Option<RawGrade>> {
        let g = self
            .conn
            .query_row(
                &format!("{} WHERE g.id = ?", GRADE_SELECT),
                [id],
                grade_from_row,
            )
            .optional()?;
        Ok(g)
    }

    fn audit_logs(&self) -> anyhow::Result<Vec<AuditLog>> {
        self.query_list(
            "SELECT id, user_id, user_name, user_role, action, details, created_at
             FROM audit_logs
             ORDER BY rowid",
            [],
            audit_from_row,
        )
        .context("failed to list audit logs")
    }

    fn insert_profile(&mut self, profile: &Profile) -> anyhow::Result<()> {
        self.conn
            .execute(
                "INSERT INTO profiles(id, full_name, email, role, avatar_url) VALUES(?, ?, ?, ?, ?)",
                (
                    &profile.id,
                    &profile.name,
                    &profile.email,
                    profile.role.as_str(),
                    &profile.avatar,
                ),
            )
            .with_context(|| format!("failed to insert profile {}", profile.id))?;
        Ok(())
    }

    fn update_profile(&mut self, profile: &Profile) -> anyhow::Result<bool> {
        let changed = self.conn.execute(
            "UPDATE profiles SET full_name = ?, email = ?, avatar_url = ? WHERE id = ?",
            (&profile.name, &profile.email, &profile.avatar, &profile.id),
        )?;
        Ok(changed > 0)
    }

    fn insert_course(&mut self, course: &NewCourse) -> anyhow::Result<()> {
        self.conn
            .execute(
                "INSERT INTO courses(id, name, code, teacher_id) VALUES(?, ?, ?, ?)",
                (&course.id, &course.name, &course.code, &course.teacher_id),
            )
            .with_context(|| format!("failed to insert course {}", course.id))?;
        Ok(())
    }

    fn enroll(
        &mut self,
        enrollment_id: &str,
        student_id: &str,
        course_id: &str,
    ) -> anyhow::Result<()> {
        self.conn
            .execute(
                "INSERT INTO enrollments(id, student_id, course_id) VALUES(?, ?, ?)",
                (enrollment_id, student_id, course_id),
            )
            .with_context(|| format!("failed to enroll {} in {}", student_id, course_id))?;
        Ok(())
    }

    fn insert_grade(&mut self, grade: &NewGrade) -> anyhow::Result<()> {
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO grades(id, student_id, course_id, value, comment, graded_at, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    &grade.id,
                    &grade.student_id,
                    &grade.course_id,
                    grade.value,
                    &grade.comment,
                    &grade.date,
                    &created_at,
                ),
            )
            .with_context(|| format!("failed to insert grade {}", grade.id))?;
        Ok(())
    }

    fn update_grade(&mut self, id: &str, value: f64, comment: Option<&str>) -> anyhow::Result<bool> {
        let changed = self.conn.execute(
            "UPDATE grades SET value = ?, comment = ? WHERE id = ?",
            (value, comment, id),
        )?;
        Ok(changed > 0)
    }

    fn append_audit_log(&mut self, log: &AuditLog) -> anyhow::Result<()> {
        self.conn
            .execute(
                "INSERT INTO audit_logs(id, user_id, user_name, user_role, action, details, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    &log.id,
                    &log.user_id,
                    &log.user_name,
                    log.user_role.as_str(),
                    &log.action,
                    &log.details,
                    &log.timestamp,
                ),
            )
            .context("failed to append audit log")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn seeded_store(prefix: &str) -> SqliteStore {
        let mut store = SqliteStore::open(&temp_dir(prefix)).expect("open store");
        for (id, name, role) in [
            ("t1", "Teacher User", UserRole::Teacher),
            ("s1", "Alex Johnson", UserRole::Student),
        ] {
            store
                .insert_profile(&Profile {
                    id: id.to_string(),
                    name: name.to_string(),
                    email: format!("{}@example.com", id),
                    role,
                    avatar: None,
                })
                .expect("insert profile");
        }
        store
            .insert_course(&NewCourse {
                id: "c1".to_string(),
                name: "Mathematics 101".to_string(),
                code: "MATH101".to_string(),
                teacher_id: "t1".to_string(),
            })
            .expect("insert course");
        store.enroll("e1", "s1", "c1").expect("enroll");
        store
    }

    #[test]
    fn open_db_is_idempotent() {
        let dir = temp_dir("gradebook-db-open");
        drop(open_db(&dir).expect("first open"));
        let conn = open_db(&dir).expect("second open");
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('profiles', 'courses', 'enrollments', 'grades', 'audit_logs')",
                [],
                |r| r.get(0),
            )
            .expect("count tables");
        assert_eq!(tables, 5);
    }

    #[test]
    fn enrolled_courses_join_teacher_name() {
        let store = seeded_store("gradebook-db-enrolled");
        let courses = store.enrolled_courses("s1").expect("courses");
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].teacher_name, "Teacher User");
        assert!(store.enrolled_courses("t1").expect("courses").is_empty());
    }

    #[test]
    fn duplicate_enrollment_is_rejected() {
        let mut store = seeded_store("gradebook-db-dup-enroll");
        assert!(store.enroll("e2", "s1", "c1").is_err());
    }

    #[test]
    fn text_grade_values_surface_as_strings() {
        let mut store = seeded_store("gradebook-db-text-value");
        store
            .insert_grade(&NewGrade {
                id: "g1".to_string(),
                student_id: "s1".to_string(),
                course_id: "c1".to_string(),
                value: 88.0,
                comment: None,
                date: "2024-03-01".to_string(),
            })
            .expect("insert grade");
        store
            .conn
            .execute(
                "INSERT INTO grades(id, student_id, course_id, value, comment, graded_at, created_at)
                 VALUES('g2', 's1', 'c1', 'n/a', NULL, '2024-03-02', '2024-03-02T00:00:00Z'),
                       ('g3', 's1', 'c1', '75', NULL, '2024-03-03', '2024-03-03T00:00:00Z')",
                [],
            )
            .expect("insert raw rows");

        let g1 = store.grade("g1").expect("query").expect("g1");
        assert_eq!(g1.value, json!(88.0));
        assert_eq!(g1.course_name, "Mathematics 101");
        let g2 = store.grade("g2").expect("query").expect("g2");
        assert_eq!(g2.value, json!("n/a"));
        let g3 = store.grade("g3").expect("query").expect("g3");
        assert_eq!(g3.value, json!(75.0));
    }

    #[test]
    fn update_grade_touches_value_and_comment_only() {
        let mut store = seeded_store("gradebook-db-update");
        store
            .insert_grade(&NewGrade {
                id: "g1".to_string(),
                student_id: "s1".to_string(),
                course_id: "c1".to_string(),
                value: 60.0,
                comment: Some("Needs improvement.".to_string()),
                date: "2024-03-01".to_string(),
            })
            .expect("insert grade");
        assert!(store.update_grade("g1", 72.0, None).expect("update"));
        let g = store.grade("g1").expect("query").expect("g1");
        assert_eq!(g.value, json!(72.0));
        assert_eq!(g.comment, None);
        assert_eq!(g.student_id, "s1");
        assert_eq!(g.date, "2024-03-01");
    }
}
