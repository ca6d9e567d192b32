use crate::calc;
use crate::ipc::error::{no_workspace, ok, store_err};
use crate::ipc::params::{optional_limit, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{AuditLog, UserRole};
use crate::store::RecordStore;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

const SYSTEM_USER_NAME: &str = "System";

/// Appends an entry for `user_id`. Unknown users are logged as the system
/// admin.
pub fn record(
    store: &mut dyn RecordStore,
    user_id: &str,
    action: &str,
    details: &str,
) -> anyhow::Result<AuditLog> {
    let profile = store.profile(user_id)?;
    let log = AuditLog {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        user_name: profile
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| SYSTEM_USER_NAME.to_string()),
        user_role: profile.map(|p| p.role).unwrap_or(UserRole::Admin),
        action: action.to_string(),
        details: details.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    };
    store.append_audit_log(&log)?;
    Ok(log)
}

fn handle_audit_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let limit = match optional_limit(req, "limit", calc::DEFAULT_AUDIT_LIMIT) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match store.audit_logs() {
        Ok(logs) => ok(
            &req.id,
            json!({ "logs": calc::recent_audit_logs(&logs, limit) }),
        ),
        Err(e) => store_err(&req.id, "db_query_failed", e),
    }
}

fn handle_audit_append(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref_mut() else {
        return no_workspace(&req.id);
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let action = match required_str(req, "action") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let details = match optional_str(req, "details") {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return e,
    };

    match record(store, &user_id, &action, &details) {
        Ok(log) => ok(&req.id, json!({ "log": log })),
        Err(e) => store_err(&req.id, "db_insert_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "audit.list" => Some(handle_audit_list(state, req)),
        "audit.append" => Some(handle_audit_append(state, req)),
        _ => None,
    }
}
