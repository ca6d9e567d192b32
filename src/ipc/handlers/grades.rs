use crate::calc;
use crate::ipc::error::{calc_err, err, no_workspace, not_found, ok, store_err};
use crate::ipc::handlers::audit;
use crate::ipc::params::{optional_str, profile_with_role, reject_keys, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{Grade, UserRole};
use crate::store::{NewGrade, RecordStore};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

const MIN_GRADE: f64 = 0.0;
const MAX_GRADE: f64 = 100.0;

/// Normalizes an incoming grade value and holds it to 0..=100.
fn parse_grade_value(req: &Request, grade_id: &str) -> Result<f64, serde_json::Value> {
    let Some(raw) = req.params.get("value") else {
        return Err(err(&req.id, "bad_params", "missing value", None));
    };
    let value = calc::normalize_grade_value(grade_id, raw).map_err(|e| calc_err(&req.id, e))?;
    if !(MIN_GRADE..=MAX_GRADE).contains(&value) {
        return Err(err(
            &req.id,
            "invalid_grade_value",
            format!("grade value must be between {} and {}", MIN_GRADE, MAX_GRADE),
            Some(json!({ "gradeId": grade_id, "value": value })),
        ));
    }
    Ok(value)
}

fn parse_grade_date(req: &Request) -> Result<String, serde_json::Value> {
    match optional_str(req, "date")? {
        None => Ok(Utc::now().date_naive().format("%Y-%m-%d").to_string()),
        Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
            .map(|date| date.format("%Y-%m-%d").to_string())
            .map_err(|_| {
                err(
                    &req.id,
                    "bad_params",
                    "date must be YYYY-MM-DD",
                    Some(json!({ "date": d })),
                )
            }),
    }
}

fn load_grade(store: &dyn RecordStore, req: &Request, id: &str) -> Result<Grade, serde_json::Value> {
    match store.grade(id) {
        Ok(Some(raw)) => calc::normalize_grade(raw).map_err(|e| calc_err(&req.id, e)),
        Ok(None) => Err(not_found(&req.id, "grade", id)),
        Err(e) => Err(store_err(&req.id, "db_query_failed", e)),
    }
}

/// Reads the optional `actorId`. A present non-string value is rejected
/// before anything is written.
fn parse_actor(req: &Request) -> Result<Option<String>, serde_json::Value> {
    Ok(optional_str(req, "actorId")?.filter(|v| !v.is_empty()))
}

/// Best-effort audit entry for a grade write. A failed append does not undo
/// the write.
fn audit_grade_write(
    store: &mut dyn RecordStore,
    actor_id: Option<&str>,
    action: &str,
    grade: &Grade,
) {
    let Some(actor_id) = actor_id else {
        return;
    };
    let details = format!(
        "{} grade for {} in {}",
        if action == "Add Grade" { "Added" } else { "Modified" },
        grade.student_name,
        grade.course_name
    );
    if let Err(e) = audit::record(store, actor_id, action, &details) {
        warn!(grade_id = %grade.id, error = %format!("{e:#}"), "audit append failed");
    }
}

fn handle_grades_by_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let raw = match store.grades_for_student(&student_id) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    };
    match calc::normalize_grades(raw) {
        Ok(grades) => ok(&req.id, json!({ "grades": grades })),
        Err(e) => calc_err(&req.id, e),
    }
}

fn handle_grades_by_course(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let raw = match store.grades_for_course(&course_id) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    };
    match calc::normalize_grades(raw) {
        Ok(grades) => ok(&req.id, json!({ "grades": grades })),
        Err(e) => calc_err(&req.id, e),
    }
}

fn handle_grades_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref_mut() else {
        return no_workspace(&req.id);
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade_id = Uuid::new_v4().to_string();
    let value = match parse_grade_value(req, &grade_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let comment = match optional_str(req, "comment") {
        Ok(v) => v.filter(|s| !s.is_empty()),
        Err(e) => return e,
    };
    let date = match parse_grade_date(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actor_id = match parse_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    if let Err(e) = profile_with_role(store, req, &student_id, UserRole::Student) {
        return e;
    }
    match store.course(&course_id) {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(&req.id, "course", &course_id),
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    }

    if let Err(e) = store.insert_grade(&NewGrade {
        id: grade_id.clone(),
        student_id,
        course_id,
        value,
        comment,
        date,
    }) {
        return store_err(&req.id, "db_insert_failed", e);
    }

    let grade = match load_grade(store, req, &grade_id) {
        Ok(g) => g,
        Err(e) => return e,
    };
    audit_grade_write(store, actor_id.as_deref(), "Add Grade", &grade);
    ok(&req.id, json!({ "grade": grade }))
}

/// Replaces value and/or comment. Identity fields are immutable. A stored
/// value that does not normalize can still be replaced.
fn handle_grades_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref_mut() else {
        return no_workspace(&req.id);
    };
    let grade_id = match required_str(req, "gradeId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = reject_keys(req, &["id", "studentId", "courseId"]) {
        return e;
    }
    let actor_id = match parse_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let existing = match store.grade(&grade_id) {
        Ok(Some(raw)) => raw,
        Ok(None) => return not_found(&req.id, "grade", &grade_id),
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    };
    let value = if req.params.get("value").is_some() {
        match parse_grade_value(req, &grade_id) {
            Ok(v) => v,
            Err(e) => return e,
        }
    } else {
        match calc::normalize_grade_value(&grade_id, &existing.value) {
            Ok(v) => v,
            Err(e) => return calc_err(&req.id, e),
        }
    };
    let comment = if req.params.get("comment").is_some() {
        match optional_str(req, "comment") {
            Ok(v) => v.filter(|s| !s.is_empty()),
            Err(e) => return e,
        }
    } else {
        existing.comment
    };

    match store.update_grade(&grade_id, value, comment.as_deref()) {
        Ok(true) => {}
        Ok(false) => return not_found(&req.id, "grade", &grade_id),
        Err(e) => return store_err(&req.id, "db_update_failed", e),
    }

    let grade = match load_grade(store, req, &grade_id) {
        Ok(g) => g,
        Err(e) => return e,
    };
    audit_grade_write(store, actor_id.as_deref(), "Edit Grade", &grade);
    ok(&req.id, json!({ "grade": grade }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.byStudent" => Some(handle_grades_by_student(state, req)),
        "grades.byCourse" => Some(handle_grades_by_course(state, req)),
        "grades.add" => Some(handle_grades_add(state, req)),
        "grades.update" => Some(handle_grades_update(state, req)),
        _ => None,
    }
}
