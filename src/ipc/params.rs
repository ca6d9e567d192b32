use serde_json::json;

use crate::ipc::error::{err, not_found, store_err};
use crate::ipc::types::Request;
use crate::model::{Profile, UserRole};
use crate::store::RecordStore;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    let v = req
        .params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))?;
    if v.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        ));
    }
    Ok(v)
}

/// Absent or null reads as `None`; a non-string is rejected.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.trim().to_string()))
            .ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must be a string", key),
                    None,
                )
            }),
    }
}

/// Absent or null gives `default`. Whole numbers are accepted in integer or
/// float form (`10`, `10.0`); fractions and negatives are rejected.
pub fn optional_limit(
    req: &Request,
    key: &str,
    default: usize,
) -> Result<usize, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v
            .as_u64()
            .or_else(|| {
                v.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
            .map(|n| n as usize)
            .ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must be a non-negative integer", key),
                    None,
                )
            }),
    }
}

pub fn optional_role(req: &Request, key: &str) -> Result<Option<UserRole>, serde_json::Value> {
    let Some(raw) = optional_str(req, key)? else {
        return Ok(None);
    };
    UserRole::parse(&raw).map(Some).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("{} must be one of: student, teacher, admin", key),
            None,
        )
    })
}

/// Rejects any of `keys` present in params.
pub fn reject_keys(req: &Request, keys: &[&str]) -> Result<(), serde_json::Value> {
    for key in keys {
        if req.params.get(*key).is_some() {
            return Err(err(
                &req.id,
                "bad_params",
                format!("{} cannot be changed", key),
                None,
            ));
        }
    }
    Ok(())
}

/// Loads profile `id` and checks that it holds `role`.
pub fn profile_with_role(
    store: &dyn RecordStore,
    req: &Request,
    id: &str,
    role: UserRole,
) -> Result<Profile, serde_json::Value> {
    match store.profile(id) {
        Ok(Some(p)) if p.role == role => Ok(p),
        Ok(Some(p)) => Err(err(
            &req.id,
            "bad_params",
            format!("profile {} is not a {}", id, role.as_str()),
            Some(json!({ "id": id, "role": p.role })),
        )),
        Ok(None) => Err(not_found(&req.id, role.as_str(), id)),
        Err(e) => Err(store_err(&req.id, "db_query_failed", e)),
    }
}
