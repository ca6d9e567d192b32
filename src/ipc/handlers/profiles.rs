use crate::ipc::error::{err, no_workspace, not_found, ok, store_err};
use crate::ipc::params::{optional_role, optional_str, reject_keys, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::Profile;
use serde_json::json;
use uuid::Uuid;

fn handle_profiles_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let role = match optional_role(req, "role") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match store.profiles(role) {
        Ok(profiles) => ok(&req.id, json!({ "profiles": profiles })),
        Err(e) => store_err(&req.id, "db_query_failed", e),
    }
}

fn handle_profiles_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref() else {
        return no_workspace(&req.id);
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match store.profile(&id) {
        Ok(Some(profile)) => ok(&req.id, json!({ "profile": profile })),
        Ok(None) => not_found(&req.id, "profile", &id),
        Err(e) => store_err(&req.id, "db_query_failed", e),
    }
}

fn handle_profiles_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref_mut() else {
        return no_workspace(&req.id);
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let role = match optional_role(req, "role") {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "bad_params", "missing role", None),
        Err(e) => return e,
    };
    let email = match optional_str(req, "email") {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return e,
    };
    let avatar = match optional_str(req, "avatar") {
        Ok(v) => v.filter(|s| !s.is_empty()),
        Err(e) => return e,
    };
    let id = match optional_str(req, "id") {
        Ok(Some(v)) if !v.is_empty() => v,
        Ok(_) => Uuid::new_v4().to_string(),
        Err(e) => return e,
    };

    match store.profile(&id) {
        Ok(Some(_)) => {
            return err(
                &req.id,
                "already_exists",
                "profile already exists",
                Some(json!({ "id": id })),
            )
        }
        Ok(None) => {}
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    }

    let profile = Profile {
        id,
        name,
        email,
        role,
        avatar,
    };
    match store.insert_profile(&profile) {
        Ok(()) => ok(&req.id, json!({ "profile": profile })),
        Err(e) => store_err(&req.id, "db_insert_failed", e),
    }
}

/// Name, email and avatar are editable; the role is fixed at creation.
fn handle_profiles_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_deref_mut() else {
        return no_workspace(&req.id);
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = reject_keys(req, &["role"]) {
        return e;
    }

    let mut profile = match store.profile(&id) {
        Ok(Some(p)) => p,
        Ok(None) => return not_found(&req.id, "profile", &id),
        Err(e) => return store_err(&req.id, "db_query_failed", e),
    };

    match optional_str(req, "name") {
        Ok(Some(v)) if v.is_empty() => {
            return err(&req.id, "bad_params", "name must not be empty", None)
        }
        Ok(Some(v)) => profile.name = v,
        Ok(None) => {}
        Err(e) => return e,
    }
    match optional_str(req, "email") {
        Ok(Some(v)) => profile.email = v,
        Ok(None) => {}
        Err(e) => return e,
    }
    if req.params.get("avatar").is_some() {
        match optional_str(req, "avatar") {
            Ok(v) => profile.avatar = v.filter(|s| !s.is_empty()),
            Err(e) => return e,
        }
    }

    match store.update_profile(&profile) {
        Ok(true) => ok(&req.id, json!({ "profile": profile })),
        Ok(false) => not_found(&req.id, "profile", &id),
        Err(e) => store_err(&req.id, "db_update_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "profiles.list" => Some(handle_profiles_list(state, req)),
        "profiles.get" => Some(handle_profiles_get(state, req)),
        "profiles.create" => Some(handle_profiles_create(state, req)),
        "profiles.update" => Some(handle_profiles_update(state, req)),
        _ => None,
    }
}
