//! Audit trail (spec §4.4): logins, failed logins, permission checks and
//! significant denials are persisted as ordinary entities so they are
//! queryable like anything else, with a `retention:period` tag marking how
//! long they are meant to be kept (pruning itself is `entitydb-metrics`'
//! concern for metric entities; audit entities rely on an operator's
//! compaction policy, out of this crate's scope).

use entitydb_core::{EntityId, Error, Tag, Timestamp};
use entitydb_engine::Repository;

const SEVEN_DAYS_SECS: i64 = 7 * 24 * 60 * 60;
const THIRTY_DAYS_SECS: i64 = 30 * 24 * 60 * 60;

/// Record a login attempt (spec scenario 1 and 5).
pub fn record_auth_event(repo: &Repository, username: &str, success: bool) -> Result<EntityId, Error> {
    let now = Timestamp::now();
    let entity = repo.create(
        vec![
            Tag::new(now, "type:auth_event")?,
            Tag::new(now, "dataset:system")?,
            Tag::new(now, &format!("username:{username}"))?,
            Tag::new(now, &format!("success:{success}"))?,
            Tag::new(now, &format!("retention:period:{SEVEN_DAYS_SECS}"))?,
        ],
        Vec::new(),
    )?;
    Ok(entity.id)
}

/// Record a `RequirePermission` evaluation.
pub fn record_permission_check(
    repo: &Repository,
    user_id: &EntityId,
    required: &str,
    granted: bool,
) -> Result<EntityId, Error> {
    let now = Timestamp::now();
    let entity = repo.create(
        vec![
            Tag::new(now, "type:permission_check")?,
            Tag::new(now, "dataset:system")?,
            Tag::new(now, &format!("user:{user_id}"))?,
            Tag::new(now, &format!("required:{required}"))?,
            Tag::new(now, &format!("granted:{granted}"))?,
            Tag::new(now, &format!("retention:period:{SEVEN_DAYS_SECS}"))?,
        ],
        Vec::new(),
    )?;
    Ok(entity.id)
}

/// Record a significant denial or other security-relevant event, kept
/// longer than routine audit entries.
pub fn record_security_event(repo: &Repository, detail: &str) -> Result<EntityId, Error> {
    let now = Timestamp::now();
    let entity = repo.create(
        vec![
            Tag::new(now, "type:security_event")?,
            Tag::new(now, "dataset:system")?,
            Tag::new(now, &format!("detail:{detail}"))?,
            Tag::new(now, &format!("retention:period:{THIRTY_DAYS_SECS}"))?,
        ],
        Vec::new(),
    )?;
    Ok(entity.id)
}
