//! ## grindvakt-detection::criteria
//! **Substring matching of resolved labels against blocking criteria**
//!
//! [`should_block`] is the reference definition. [`CriteriaMatcher`] compiles
//! a criteria snapshot into an Aho-Corasick automaton once per scan tick and
//! answers identically for every label.

use aho_corasick::AhoCorasick;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("Criteria compilation failed: {0}")]
    Compile(String),
}

/// First criterion, in list order, that occurs in `label` (case-sensitive).
pub fn should_block<'c, S: AsRef<str>>(label: &str, criteria: &'c [S]) -> Option<&'c str> {
    criteria
        .iter()
        .map(AsRef::as_ref)
        .find(|criterion| label.contains(criterion))
}

pub struct CriteriaMatcher {
    criteria: Vec<String>,
    automaton: AhoCorasick,
}

impl CriteriaMatcher {
    pub fn new<I, S>(criteria: I) -> Result<Self, DecisionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let criteria: Vec<String> = criteria.into_iter().map(Into::into).collect();
        let automaton =
            AhoCorasick::new(&criteria).map_err(|e| DecisionError::Compile(e.to_string()))?;
        Ok(Self {
            criteria,
            automaton,
        })
    }

    /// Same answer as [`should_block`]: overlapping search, lowest criterion index wins.
    pub fn matched(&self, label: &str) -> Option<&str> {
        if self.criteria.iter().any(String::is_empty) {
            return should_block(label, &self.criteria);
        }
        self.automaton
            .find_overlapping_iter(label)
            .map(|m| m.pattern().as_usize())
            .min()
            .map(|index| self.criteria[index].as_str())
    }

    pub fn criteria(&self) -> &[String] {
        &self.criteria
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn criteria() -> Vec<String> {
        vec!["s3".into(), "aws.amazon.com".into()]
    }

    #[test]
    fn bucket_host_matches_s3() {
        assert_eq!(should_block("bucket.s3.amazonaws.com", &criteria()), Some("s3"));
    }

    #[test]
    fn provider_label_matches() {
        assert_eq!(
            should_block("aws.amazon.com", &criteria()),
            Some("aws.amazon.com")
        );
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(should_block("BUCKET.S3.AMAZONAWS.COM", &criteria()), None);
    }

    #[test]
    fn list_order_decides_between_overlapping_hits() {
        let criteria = vec!["amazon".to_string(), "aws.amazon.com".to_string()];
        let matcher = CriteriaMatcher::new(criteria.clone()).unwrap();
        assert_eq!(should_block("aws.amazon.com", &criteria), Some("amazon"));
        assert_eq!(matcher.matched("aws.amazon.com"), Some("amazon"));
    }

    #[test]
    fn empty_criteria_never_match() {
        let none: Vec<String> = Vec::new();
        assert_eq!(should_block("anything", &none), None);
        assert_eq!(CriteriaMatcher::new(none).unwrap().matched("anything"), None);
    }

    proptest! {
        #[test]
        fn matches_iff_some_criterion_is_substring(
            label in "[a-z0-9.]{0,24}",
            criteria in prop::collection::vec("[a-z0-9.]{1,4}", 0..6),
        ) {
            let expected = criteria.iter().any(|c| label.contains(c.as_str()));
            let result = should_block(&label, &criteria);
            prop_assert_eq!(result.is_some(), expected);
            if let Some(hit) = result {
                prop_assert!(label.contains(hit));
            }
        }

        #[test]
        fn compiled_matcher_agrees_with_reference(
            label in "[a-c.]{0,24}",
            criteria in prop::collection::vec("[a-c.]{1,3}", 0..6),
        ) {
            let matcher = CriteriaMatcher::new(criteria.clone()).unwrap();
            prop_assert_eq!(matcher.matched(&label), should_block(&label, &criteria));
        }
    }
}
