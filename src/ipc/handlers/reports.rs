use crate::calc;
use crate::ipc::error::{calc_err, no_workspace, not_found, ok, store_err};
use crate::ipc::params::{optional_limit, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{ClassPerformance, Course, GradeReport};
use crate::store::{RecordStore, UNKNOWN_NAME};
use serde_json::json;

fn student_report(
    store: &dyn RecordStore,
    req: &Request,
    student_id: &str,
) -> Result<GradeReport, serde_json::Value> {
    let courses = store
        .enrolled_courses(student_id)
        .map_err(|e| store_err(&req.id, "db_query_failed", e))?;
    let raw = store
        .grades_for_student(student_id)
        .map_err(|e| store_err(&req.id, "db_query_failed", e))?;
    let grades = calc::normalize_grades(raw).map_err(|e| calc_err(&req.id, e))?;
    let student_name = store
        .profile(student_id)
        .map_err(|e| store_err(&req.id, "db_query_failed", e))?
        .map(|p| p.name)
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());

    Ok(calc::build_grade_report(
        student_id,
        &student_name,
        &grades,
        &courses,
    ))
}

fn course_performance(
    store: &dyn RecordStore,
    req: &Request,
    course: &Course,
) -> Result<ClassPerformance, serde_json::Value> {
    let raw = store
        .grades_for_course(&course.id)
        .map_err(|e| store_err(&req.id, "db_query_failed", e))?;
    let grades = calc::normalize_grades(raw).map_err(|e| calc_err(&req.id, e))?;
    Ok(calc::class_performance(course, &grades))
}

fn handle_reports_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match student_report(store, req, &student_id) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => e,
    }
}

fn handle_reports_recent_grades(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let limit = match optional_limit(req, "limit", calc::DEFAULT_RECENT_GRADES_LIMIT) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match student_report(store, req, &student_id) {
        Ok(report) => ok(
            &req.id,
            json!({ "grades": calc::recent_grades(&report, limit) }),
        ),
        Err(e) => e,
    }
}

fn handle_reports_class_performance(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let course = match store.course(&course_id) {
        Ok(Some(c)) => c,
        Ok(None) => return not_found(&req.id, "course", &course_id),
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    };
    match course_performance(store, req, &course) {
        Ok(perf) => ok(&req.id, json!(perf)),
        Err(e) => e,
    }
}

fn handle_reports_teacher_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let courses = match store.courses_by_teacher(&teacher_id) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    };
    let mut performance = Vec::with_capacity(courses.len());
    for course in &courses {
        match course_performance(store, req, course) {
            Ok(p) => performance.push(p),
            Err(e) => return e,
        }
    }
    ok(
        &req.id,
        json!(calc::teacher_overview(&teacher_id, performance)),
    )
}

fn handle_reports_admin_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };

    let profiles = match store.profiles(None) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    };
    let course_count = match store.courses() {
        Ok(v) => v.len(),
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    };
    let logs = match store.audit_logs() {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    };
    ok(
        &req.id,
        json!(calc::admin_overview(&profiles, course_count, &logs)),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.student" => Some(handle_reports_student(state, req)),
        "reports.recentGrades" => Some(handle_reports_recent_grades(state, req)),
        "reports.classPerformance" => Some(handle_reports_class_performance(state, req)),
        "reports.teacherOverview" => Some(handle_reports_teacher_overview(state, req)),
        "reports.adminOverview" => Some(handle_reports_admin_overview(state, req)),
        _ => None,
    }
}
