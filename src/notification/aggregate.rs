//! Aggregation of repeated multicast results.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::provider::{BatchResult, ProviderError};

use super::TargetSet;

/// Summary of every batch sent for one request.
///
/// Counts are plain sums and failed tokens a set union, so folding the same
/// batches in any order yields the same totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub total_success_count: usize,
    pub total_failure_count: usize,
    /// Tokens that failed in at least one batch
    pub failed_tokens: BTreeSet<String>,
    /// Number of per-target failures by error code
    pub failure_codes: BTreeMap<String, usize>,
    /// Raw batch results, in fold order
    pub batches: Vec<BatchResult>,
}

impl AggregateReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one batch into the report.
    ///
    /// `targets` must be the set the batch was addressed to. A result whose
    /// outcomes or counts do not match it is rejected.
    pub fn fold(mut self, batch: BatchResult, targets: &TargetSet) -> Result<Self, ProviderError> {
        batch.verify(targets.len())?;

        self.total_success_count += batch.success_count;
        self.total_failure_count += batch.failure_count;

        for (token, outcome) in targets.iter().zip(&batch.responses) {
            if outcome.success {
                continue;
            }
            self.failed_tokens.insert(token.clone());

            let code = outcome
                .error
                .as_ref()
                .map(|e| e.code.as_str())
                .unwrap_or("messaging/unknown-error");
            *self.failure_codes.entry(code.to_string()).or_default() += 1;
        }

        self.batches.push(batch);
        Ok(self)
    }

    /// Fold a sequence of batches addressed to the same targets
    pub fn from_batches<I>(batches: I, targets: &TargetSet) -> Result<Self, ProviderError>
    where
        I: IntoIterator<Item = BatchResult>,
    {
        batches
            .into_iter()
            .try_fold(Self::new(), |report, batch| report.fold(batch, targets))
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SendOutcome;

    fn targets(tokens: &[&str]) -> TargetSet {
        TargetSet::new(tokens.iter().map(|t| t.to_string()).collect()).unwrap()
    }

    /// Batch where the targets at `failed` indices failed as unregistered
    fn batch(size: usize, failed: &[usize]) -> BatchResult {
        let outcomes = (0..size)
            .map(|i| {
                if failed.contains(&i) {
                    SendOutcome::failed(&ProviderError::RegistrationTokenNotRegistered(
                        "gone".into(),
                    ))
                } else {
                    SendOutcome::delivered(format!("m{}", i))
                }
            })
            .collect();
        BatchResult::from_outcomes(outcomes)
    }

    #[test]
    fn test_fold_sums_and_unions() {
        let set = targets(&["A", "B", "C"]);

        let report = AggregateReport::new()
            .fold(batch(3, &[1]), &set)
            .unwrap()
            .fold(batch(3, &[1]), &set)
            .unwrap();

        assert_eq!(report.total_success_count, 4);
        assert_eq!(report.total_failure_count, 2);
        assert_eq!(report.failed_tokens, BTreeSet::from(["B".to_string()]));
        assert_eq!(
            report.failure_codes.get("messaging/registration-token-not-registered"),
            Some(&2)
        );
        assert_eq!(report.batch_count(), 2);
    }

    #[test]
    fn test_failed_token_deduplicated_across_batches() {
        let set = targets(&["A", "B", "C"]);
        let report = AggregateReport::from_batches(
            vec![batch(3, &[0]), batch(3, &[]), batch(3, &[0])],
            &set,
        )
        .unwrap();

        assert_eq!(report.failed_tokens.len(), 1);
        assert!(report.failed_tokens.contains("A"));
    }

    #[test]
    fn test_order_independence() {
        let set = targets(&["A", "B", "C", "D"]);
        let batches = vec![batch(4, &[0]), batch(4, &[1, 2]), batch(4, &[]), batch(4, &[3, 0])];

        let forward = AggregateReport::from_batches(batches.clone(), &set).unwrap();
        let reversed =
            AggregateReport::from_batches(batches.into_iter().rev(), &set).unwrap();

        assert_eq!(forward.total_success_count, reversed.total_success_count);
        assert_eq!(forward.total_failure_count, reversed.total_failure_count);
        assert_eq!(forward.failed_tokens, reversed.failed_tokens);
        assert_eq!(forward.failure_codes, reversed.failure_codes);
    }

    #[test]
    fn test_count_conservation() {
        let set = targets(&["A", "B", "C", "D", "E"]);
        let batches = vec![batch(5, &[0, 4]), batch(5, &[2]), batch(5, &[])];
        let batch_count = batches.len();

        let report = AggregateReport::from_batches(batches, &set).unwrap();
        assert_eq!(
            report.total_success_count + report.total_failure_count,
            batch_count * set.len()
        );
    }

    #[test]
    fn test_failed_tokens_never_shrink() {
        let set = targets(&["A", "B"]);
        let mut report = AggregateReport::new();
        let mut previous = 0;

        for failed in [&[1][..], &[], &[0], &[]] {
            report = report.fold(batch(2, failed), &set).unwrap();
            assert!(report.failed_tokens.len() >= previous);
            previous = report.failed_tokens.len();
        }
        assert_eq!(previous, 2);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let set = targets(&["A", "B"]);
        let err = AggregateReport::new().fold(batch(3, &[]), &set).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn test_inconsistent_counts_rejected() {
        let set = targets(&["A", "B"]);
        let mut inflated = batch(2, &[1]);
        inflated.success_count = 2;
        inflated.failure_count = 0;

        let err = AggregateReport::new().fold(inflated, &set).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }
}
