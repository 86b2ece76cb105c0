//! Permission evaluation (spec §4.4)
//!
//! Permissions are ordinary `rbac:` tags on the user entity; evaluation is
//! pure and takes no lock, so it can run on the hot request path without
//! touching the repository beyond the single user-entity fetch the caller
//! already did.

use entitydb_core::tag::wildcard_matches;

const ADMIN_ROLE: &str = "rbac:role:admin";
const WILDCARD_PERM: &str = "rbac:perm:*";

/// Does `user_perms` (the caller's current bare tags) satisfy `required`
/// (e.g. `"rbac:perm:entity:create"`, optionally scoped
/// `"rbac:perm:entity:create:dataset:acme"`)?
///
/// Evaluation order mirrors spec §4.4:
/// 1. admin role or the blanket `rbac:perm:*` wildcard,
/// 2. an exact match,
/// 3. a namespace-prefix wildcard (`rbac:perm:entity:*`),
/// 4. a dataset-scoped form (`…:dataset:<name>` or `…:dataset:*`).
pub fn has_permission(user_perms: &[String], required: &str) -> bool {
    if user_perms.iter().any(|p| p == ADMIN_ROLE || p == WILDCARD_PERM) {
        return true;
    }
    if user_perms.iter().any(|p| p == required) {
        return true;
    }
    if user_perms
        .iter()
        .any(|p| p.ends_with(":*") && wildcard_matches(p, required))
    {
        return true;
    }
    if let Some((resource_action, scope)) = required.split_once(":dataset:") {
        let scoped_wildcard = format!("{resource_action}:dataset:*");
        if user_perms.iter().any(|p| p == &scoped_wildcard) {
            return true;
        }
        let _ = scope; // exact scoped match already covered by the exact-match check above
    }
    false
}
