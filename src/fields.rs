//! # Field Name Translation
//!
//! Single-field transfer queries name fields in the generic vocabulary (the
//! camelCase names of [`TransferDetails`](crate::models::TransferDetails)).
//! Each backend family owns a [`FieldMap`] saying which of those names it
//! understands unchanged and which it knows under another name. Maps are built
//! once and only read afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Generic transfer fields that may be queried one at a time
pub const TRANSFER_FIELDS: &[&str] = &[
    "jobId",
    "jobState",
    "source",
    "destination",
    "verifyChecksum",
    "overwrite",
    "priority",
    "retry",
    "retryDelay",
    "maxTimeInQueue",
    "copyPinLifetime",
    "bringOnline",
    "targetQos",
    "cancel",
    "submittedAt",
    "submittedTo",
    "finishedAt",
    "reason",
    "vo",
    "userDN",
    "jobMetadata",
];

/// Generic → backend field names for one backend family
#[derive(Debug)]
pub struct FieldMap {
    family: &'static str,
    as_is: HashSet<&'static str>,
    renames: HashMap<&'static str, &'static str>,
}

impl FieldMap {
    pub fn new(
        family: &'static str,
        as_is: &[&'static str],
        renames: &[(&'static str, &'static str)],
    ) -> Self {
        debug_assert!(
            as_is
                .iter()
                .chain(renames.iter().map(|(generic, _)| generic))
                .all(|name| TRANSFER_FIELDS.contains(name)),
            "field map for {family} names a field outside the generic set"
        );

        Self {
            family,
            as_is: as_is.iter().copied().collect(),
            renames: renames.iter().copied().collect(),
        }
    }

    pub const fn family(&self) -> &'static str {
        self.family
    }

    /// Backend name for a generic field, or `None` when the backend does not expose it
    pub fn translate(&self, generic: &str) -> Option<&'static str> {
        if let Some(name) = self.as_is.get(generic) {
            return Some(*name);
        }
        self.renames.get(generic).copied()
    }

    pub fn supports(&self, generic: &str) -> bool {
        self.translate(generic).is_some()
    }

    /// Generic names this backend understands, in no particular order
    pub fn generic_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.as_is.iter().chain(self.renames.keys()).copied()
    }
}

/// FTS3 job fields
pub static FTS_FIELDS: LazyLock<FieldMap> = LazyLock::new(|| {
    FieldMap::new(
        "fts",
        &["priority", "retry", "reason"],
        &[
            ("jobId", "job_id"),
            ("jobState", "job_state"),
            ("source", "source_se"),
            ("destination", "dest_se"),
            ("verifyChecksum", "verify_checksum"),
            ("overwrite", "overwrite_flag"),
            ("retryDelay", "retry_delay"),
            ("maxTimeInQueue", "max_time_in_queue"),
            ("copyPinLifetime", "copy_pin_lifetime"),
            ("bringOnline", "bring_online"),
            ("targetQos", "target_qos"),
            ("cancel", "cancel_job"),
            ("submittedAt", "submit_time"),
            ("submittedTo", "submit_host"),
            ("finishedAt", "job_finished"),
            ("userDN", "user_dn"),
            ("vo", "vo_name"),
            ("jobMetadata", "job_metadata"),
        ],
    )
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_translation() {
        assert_eq!(FTS_FIELDS.translate("priority"), Some("priority"));
        assert_eq!(FTS_FIELDS.translate("jobState"), Some("job_state"));
        assert_eq!(FTS_FIELDS.translate("finishedAt"), Some("job_finished"));
        assert_eq!(FTS_FIELDS.translate("foo"), None);
        assert_eq!(FTS_FIELDS.translate("job_state"), None);
    }

    #[test]
    fn test_fts_covers_generic_set() {
        for field in TRANSFER_FIELDS {
            assert!(FTS_FIELDS.supports(field), "{field} missing from FTS map");
        }
    }

    #[test]
    fn test_families_differ() {
        let narrow = FieldMap::new("narrow", &["priority"], &[("jobId", "id")]);
        assert_eq!(narrow.translate("jobId"), Some("id"));
        assert!(!narrow.supports("finishedAt"));
        assert!(FTS_FIELDS.supports("finishedAt"));
        assert_eq!(narrow.generic_names().count(), 2);
    }
}
