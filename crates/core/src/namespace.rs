//! Well-known tag namespace prefixes
//!
//! These are contracts, not enforced by storage (see spec §3): a reader
//! that doesn't understand `content:` tags can still store and retrieve
//! the entity. The one rule storage *does* enforce is the `dataset`
//! namespace's aliases: `hub:`/`dataspace:` are rejected rather than
//! perpetuated (spec §9 open question).

/// Tag namespace helpers and the reserved `system` dataset name.
pub struct Namespace;

impl Namespace {
    /// The reserved dataset every user/session/metric/config entity must
    /// carry (invariant I4).
    pub const SYSTEM_DATASET: &'static str = "system";

    /// Namespaces that historically aliased `dataset:` in the source
    /// system and must be rejected rather than accepted (spec §9).
    const REJECTED_DATASET_ALIASES: &'static [&'static str] = &["hub:", "dataspace:"];

    /// Does `bare` use one of the rejected dataset-aliasing namespaces?
    pub fn is_rejected_alias(bare: &str) -> bool {
        Self::REJECTED_DATASET_ALIASES
            .iter()
            .any(|prefix| bare.starts_with(prefix))
    }

    /// Build a `dataset:<name>` tag value.
    pub fn dataset(name: &str) -> String {
        format!("dataset:{name}")
    }

    /// Build a `type:<kind>` tag value.
    pub fn type_tag(kind: &str) -> String {
        format!("type:{kind}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_known_aliases() {
        assert!(Namespace::is_rejected_alias("hub:production"));
        assert!(Namespace::is_rejected_alias("dataspace:team-a"));
        assert!(!Namespace::is_rejected_alias("dataset:system"));
    }
}
