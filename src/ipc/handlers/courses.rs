use crate::ipc::error::{err, no_workspace, not_found, ok, store_err};
use crate::ipc::params::{optional_str, profile_with_role, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::UserRole;
use crate::store::NewCourse;
use serde_json::json;
use uuid::Uuid;

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let teacher_id = match optional_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match optional_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let courses = match (teacher_id, student_id) {
        (Some(_), Some(_)) => {
            return err(
                &req.id,
                "bad_params",
                "pass at most one of teacherId, studentId",
                None,
            )
        }
        (Some(t), None) => store.courses_by_teacher(&t),
        (None, Some(s)) => store.enrolled_courses(&s),
        (None, None) => store.courses(),
    };
    match courses {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => store_err(&req.id, "db_query_failed", e),
    }
}

fn handle_courses_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match store.course(&course_id) {
        Ok(Some(course)) => ok(&req.id, json!({ "course": course })),
        Ok(None) => not_found(&req.id, "course", &course_id),
        Err(e) => store_err(&req.id, "db_query_failed", e),
    }
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref_mut() else {
        return no_workspace(&req.id);
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let code = match required_str(req, "code") {
        Ok(v) => v.to_ascii_uppercase(),
        Err(e) => return e,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = profile_with_role(store, req, &teacher_id, UserRole::Teacher) {
        return e;
    }

    let course_id = Uuid::new_v4().to_string();
    if let Err(e) = store.insert_course(&NewCourse {
        id: course_id.clone(),
        name,
        code,
        teacher_id,
    }) {
        return store_err(&req.id, "db_insert_failed", e);
    }

    match store.course(&course_id) {
        Ok(Some(course)) => ok(&req.id, json!({ "course": course })),
        Ok(None) => not_found(&req.id, "course", &course_id),
        Err(e) => store_err(&req.id, "db_query_failed", e),
    }
}

fn handle_enrollments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match store.course(&course_id) {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(&req.id, "course", &course_id),
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    }
    match store.enrollments(&course_id) {
        Ok(enrollments) => ok(&req.id, json!({ "enrollments": enrollments })),
        Err(e) => store_err(&req.id, "db_query_failed", e),
    }
}

fn handle_enrollments_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref_mut() else {
        return no_workspace(&req.id);
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let student = match profile_with_role(store, req, &student_id, UserRole::Student) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let existing = match store.course(&course_id) {
        Ok(Some(_)) => match store.enrollments(&course_id) {
            Ok(v) => v,
            Err(e) => return store_err(&req.id, "db_query_failed", e),
        },
        Ok(None) => return not_found(&req.id, "course", &course_id),
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    };
    if existing.iter().any(|e| e.student_id == student_id) {
        return err(
            &req.id,
            "already_enrolled",
            "student is already enrolled in this course",
            Some(json!({ "studentId": student_id, "courseId": course_id })),
        );
    }

    let enrollment_id = Uuid::new_v4().to_string();
    match store.enroll(&enrollment_id, &student_id, &course_id) {
        Ok(()) => ok(
            &req.id,
            json!({
                "enrollment": {
                    "id": enrollment_id,
                    "studentId": student_id,
                    "studentName": student.name,
                    "courseId": course_id,
                }
            }),
        ),
        Err(e) => store_err(&req.id, "db_insert_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.get" => Some(handle_courses_get(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "enrollments.list" => Some(handle_enrollments_list(state, req)),
        "enrollments.add" => Some(handle_enrollments_add(state, req)),
        _ => None,
    }
}
