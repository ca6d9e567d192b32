use crate::fixtures;
use crate::ipc::error::{err, no_workspace, ok, store_err};
use crate::ipc::params::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "backend": state.backend(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };

    match state.open_workspace(&path) {
        Ok(()) => ok(
            &req.id,
            json!({ "workspacePath": path.to_string_lossy(), "backend": state.backend() }),
        ),
        Err(e) => store_err(&req.id, "db_open_failed", e),
    }
}

fn handle_workspace_open_demo(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.open_demo() {
        Ok(summary) => ok(
            &req.id,
            json!({ "backend": state.backend(), "seeded": summary }),
        ),
        Err(e) => store_err(&req.id, "seed_failed", e),
    }
}

/// Seeds the selected workspace with the demo dataset. Only an empty
/// workspace is accepted.
fn handle_workspace_seed_demo(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref_mut() else {
        return no_workspace(&req.id);
    };

    match store.profiles(None) {
        Ok(existing) if !existing.is_empty() => {
            return err(
                &req.id,
                "workspace_not_empty",
                "demo data can only be seeded into an empty workspace",
                Some(json!({ "profiles": existing.len() })),
            );
        }
        Ok(_) => {}
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    }

    match fixtures::seed(store) {
        Ok(summary) => ok(&req.id, json!({ "seeded": summary })),
        Err(e) => store_err(&req.id, "seed_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.openDemo" => Some(handle_workspace_open_demo(state, req)),
        "workspace.seedDemo" => Some(handle_workspace_seed_demo(state, req)),
        _ => None,
    }
}
