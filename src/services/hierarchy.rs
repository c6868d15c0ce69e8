// Table hierarchy classification: orders tables into warehouse layers
// (ads/dim/dws/dwd/ods/...) by a prioritized regex list.
use regex::Regex;
use tracing::warn;

pub struct HierarchyClassifier {
    patterns: Vec<Regex>,
}

impl HierarchyClassifier {
    /// Compile the configured pattern list. Invalid expressions are dropped
    /// with a warning; an empty result disables classification.
    pub fn from_patterns(patterns: &[String]) -> Self {
        let compiled = patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!("Invalid table hierarchy pattern {:?}: {}", pattern, e);
                    None
                }
            })
            .collect();

        Self { patterns: compiled }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Partition `tables` into buckets in pattern priority order.
    ///
    /// The first matching pattern claims a name; each bucket is sorted
    /// lexicographically; names matching nothing form a final sorted
    /// bucket. With no patterns the input comes back untouched.
    pub fn classify(&self, tables: Vec<String>) -> Vec<String> {
        if self.patterns.is_empty() {
            return tables;
        }

        let mut ordered = Vec::with_capacity(tables.len());
        let mut remaining = tables;

        for pattern in &self.patterns {
            let (mut matched, rest): (Vec<String>, Vec<String>) =
                remaining.into_iter().partition(|t| pattern.is_match(t));
            matched.sort();
            ordered.extend(matched);
            remaining = rest;
        }

        remaining.sort();
        ordered.extend(remaining);
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_layer_ordering() {
        let classifier =
            HierarchyClassifier::from_patterns(&patterns(&["^ads_.*$", "^dwd_.*$", "^ods_.*$"]));

        let result = classifier.classify(names(&[
            "ods_events",
            "dwd_orders",
            "ads_report_daily",
            "dwd_customers",
        ]));

        assert_eq!(
            result,
            names(&["ads_report_daily", "dwd_customers", "dwd_orders", "ods_events"])
        );
    }

    #[test]
    fn test_unmatched_names_sort_last() {
        let classifier = HierarchyClassifier::from_patterns(&patterns(&["^dim_.*$"]));

        let result = classifier.classify(names(&["zebra", "dim_user", "alpha"]));
        assert_eq!(result, names(&["dim_user", "alpha", "zebra"]));
    }

    #[test]
    fn test_output_is_a_permutation_of_input() {
        let classifier = HierarchyClassifier::from_patterns(&patterns(&[
            "^ads_.*$",
            "^dim_.*$",
            "^.*$",
        ]));

        let input = names(&["dim_b", "raw_x", "ads_a", "dim_a", "misc"]);
        let result = classifier.classify(input.clone());

        assert_eq!(result.len(), input.len());
        let mut sorted_in = input.clone();
        let mut sorted_out = result.clone();
        sorted_in.sort();
        sorted_out.sort();
        assert_eq!(sorted_in, sorted_out);

        // Catch-all claims everything that earlier layers did not.
        assert_eq!(result, names(&["ads_a", "dim_a", "dim_b", "misc", "raw_x"]));
    }

    #[test]
    fn test_invalid_patterns_are_dropped() {
        let classifier =
            HierarchyClassifier::from_patterns(&patterns(&["^ads_.*$", "[broken", "^dim_.*$"]));

        let result = classifier.classify(names(&["dim_user", "ads_kpi"]));
        assert_eq!(result, names(&["ads_kpi", "dim_user"]));
    }

    #[test]
    fn test_empty_pattern_list_passes_through() {
        let classifier = HierarchyClassifier::from_patterns(&[]);
        assert!(classifier.is_empty());

        let input = names(&["b", "a", "c"]);
        assert_eq!(classifier.classify(input.clone()), input);
    }
}
