//! Stable alert identity derived from labels.
//!
//! Two events whose significant labels are equal always produce the same
//! fingerprint, whatever order the labels arrived in. `severity` and any
//! `__`-prefixed key are not part of an alert's identity: a warning that
//! escalates to critical is still the same incident.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

/// Label key that never contributes to identity.
pub const SEVERITY_LABEL: &str = "severity";

/// Prefix of reserved/internal label keys.
pub const RESERVED_PREFIX: &str = "__";

/// Number of digest bytes kept in the rendered fingerprint.
const FINGERPRINT_BYTES: usize = 8;

/// Returns true if `key` is part of an alert's identity.
#[must_use]
pub fn is_identity_label(key: &str) -> bool {
    key != SEVERITY_LABEL && !key.starts_with(RESERVED_PREFIX)
}

/// Computes the 16-character lowercase hex fingerprint of a label set.
#[must_use]
pub fn fingerprint(labels: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = labels.keys().filter(|k| is_identity_label(k)).collect();
    keys.sort_unstable();

    let canonical = keys
        .iter()
        .map(|k| format!("{k}={}", labels[*k]))
        .collect::<Vec<_>>()
        .join("|");

    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(&digest[..FINGERPRINT_BYTES])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn fingerprint_is_sixteen_lowercase_hex() {
        let fp = fingerprint(&labels(&[("alertname", "HighCPU"), ("instance", "node-1")]));
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn empty_labels_have_fixed_fingerprint() {
        // first 8 bytes of sha256("")
        assert_eq!(fingerprint(&HashMap::new()), "e3b0c44298fc1c14");
    }

    #[test]
    fn only_excluded_labels_match_empty() {
        let fp = fingerprint(&labels(&[("severity", "critical"), ("__name__", "up")]));
        assert_eq!(fp, fingerprint(&HashMap::new()));
    }

    #[test]
    fn severity_does_not_change_identity() {
        let warning = labels(&[("alertname", "DiskFull"), ("severity", "warning")]);
        let critical = labels(&[("alertname", "DiskFull"), ("severity", "critical")]);
        let absent = labels(&[("alertname", "DiskFull")]);
        assert_eq!(fingerprint(&warning), fingerprint(&critical));
        assert_eq!(fingerprint(&warning), fingerprint(&absent));
    }

    #[test]
    fn reserved_labels_ignored() {
        let a = labels(&[("alertname", "DiskFull"), ("__alerts_path__", "/a")]);
        let b = labels(&[("alertname", "DiskFull"), ("__alerts_path__", "/b")]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn value_change_changes_identity() {
        let a = labels(&[("alertname", "HighCPU"), ("instance", "node-1")]);
        let b = labels(&[("alertname", "HighCPU"), ("instance", "node-2")]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn added_key_changes_identity() {
        let a = labels(&[("alertname", "HighCPU")]);
        let b = labels(&[("alertname", "HighCPU"), ("job", "node")]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn is_identity_label_rules() {
        assert!(is_identity_label("alertname"));
        assert!(is_identity_label("_single"));
        assert!(!is_identity_label("severity"));
        assert!(!is_identity_label("__name__"));
    }

    fn arb_labels() -> impl Strategy<Value = Vec<(String, String)>> {
        proptest::collection::vec(("[a-z][a-z_]{0,8}", "[a-zA-Z0-9-]{0,8}"), 0..8)
    }

    proptest! {
        #[test]
        fn prop_insertion_order_irrelevant(pairs in arb_labels()) {
            let forward: HashMap<String, String> = pairs.iter().cloned().collect();
            let mut reversed_pairs = forward.clone().into_iter().collect::<Vec<_>>();
            reversed_pairs.reverse();
            let reversed: HashMap<String, String> = reversed_pairs.into_iter().collect();
            prop_assert_eq!(fingerprint(&forward), fingerprint(&reversed));
        }

        #[test]
        fn prop_severity_value_irrelevant(pairs in arb_labels(), sev in "[a-z]{0,10}") {
            let base: HashMap<String, String> = pairs.into_iter().collect();
            let mut with_severity = base.clone();
            with_severity.insert("severity".to_string(), sev);
            prop_assert_eq!(fingerprint(&base), fingerprint(&with_severity));
        }

        #[test]
        fn prop_identity_value_change_detected(pairs in arb_labels(), extra in "[a-z]{1,8}") {
            let base: HashMap<String, String> = pairs.into_iter().collect();
            let mut changed = base.clone();
            let key = "zz_identity".to_string();
            let old = changed.get(&key).cloned().unwrap_or_default();
            changed.insert(key, format!("{old}{extra}"));
            prop_assert_ne!(fingerprint(&base), fingerprint(&changed));
        }

        #[test]
        fn prop_output_shape(pairs in arb_labels()) {
            let fp = fingerprint(&pairs.into_iter().collect());
            prop_assert_eq!(fp.len(), 16);
            prop_assert!(fp.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
    }
}
