use std::collections::BTreeMap;

/// Decides whether a secret is in scope for syncing.
///
/// Every configured annotation must be present on the resource with an equal
/// value; the first mismatch rules the whole resource out. No configured
/// annotations means everything is in scope.
pub fn matches(annotations: &BTreeMap<String, String>, filter: &BTreeMap<String, String>) -> bool {
    filter
        .iter()
        .all(|(key, expected)| annotations.get(key) == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(&pairs(&[]), &pairs(&[])));
        assert!(matches(&pairs(&[("sync", "true")]), &pairs(&[])));
    }

    #[test]
    fn exact_annotation_matches() {
        assert!(matches(
            &pairs(&[("sync", "true")]),
            &pairs(&[("sync", "true")])
        ));
    }

    #[test]
    fn value_mismatch_rules_the_resource_out() {
        assert!(!matches(
            &pairs(&[("sync", "false")]),
            &pairs(&[("sync", "true")])
        ));
    }

    #[test]
    fn missing_annotation_rules_the_resource_out() {
        assert!(!matches(
            &pairs(&[("other", "true")]),
            &pairs(&[("sync", "true")])
        ));
    }

    #[test]
    fn unannotated_resource_fails_any_filter() {
        assert!(!matches(&pairs(&[]), &pairs(&[("sync", "true")])));
    }

    #[test]
    fn all_filter_entries_must_match() {
        let filter = pairs(&[("sync", "true"), ("team", "infra")]);

        assert!(matches(
            &pairs(&[("sync", "true"), ("team", "infra"), ("extra", "x")]),
            &filter
        ));
        assert!(!matches(
            &pairs(&[("sync", "true"), ("team", "web")]),
            &filter
        ));
        assert!(!matches(&pairs(&[("sync", "true")]), &filter));
    }
}
