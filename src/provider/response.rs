//! Results returned by messaging providers.

use serde::{Deserialize, Serialize};

use super::ProviderError;

/// Error attached to a failed per-target outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub code: String,
    pub message: String,
}

impl From<&ProviderError> for OutcomeError {
    fn from(err: &ProviderError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of delivering to one target of a multicast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

impl SendOutcome {
    pub fn delivered(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: &ProviderError) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

impl From<Result<String, ProviderError>> for SendOutcome {
    fn from(result: Result<String, ProviderError>) -> Self {
        match result {
            Ok(message_id) => SendOutcome::delivered(message_id),
            Err(err) => SendOutcome::failed(&err),
        }
    }
}

/// Outcome of one multicast call.
///
/// `responses` has one entry per target, in the order of the target set the
/// multicast was addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub success_count: usize,
    pub failure_count: usize,
    pub responses: Vec<SendOutcome>,
}

impl BatchResult {
    /// Build a result from ordered outcomes, deriving the counts
    pub fn from_outcomes(responses: Vec<SendOutcome>) -> Self {
        let success_count = responses.iter().filter(|r| r.success).count();
        Self {
            success_count,
            failure_count: responses.len() - success_count,
            responses,
        }
    }

    /// Check that the result can be correlated with `target_count` targets:
    /// one outcome per target and counts that agree with the outcomes.
    pub fn verify(&self, target_count: usize) -> Result<(), ProviderError> {
        if self.responses.len() != target_count {
            return Err(ProviderError::MalformedResponse(format!(
                "batch has {} outcomes for {} targets",
                self.responses.len(),
                target_count
            )));
        }

        let delivered = self.responses.iter().filter(|r| r.success).count();
        if self.success_count != delivered || self.failure_count != target_count - delivered {
            return Err(ProviderError::MalformedResponse(format!(
                "batch reports {} delivered and {} failed, outcomes show {} and {}",
                self.success_count,
                self.failure_count,
                delivered,
                target_count - delivered
            )));
        }
        Ok(())
    }

    /// Indices of targets that failed
    pub fn failed_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.responses
            .iter()
            .enumerate()
            .filter(|(_, outcome)| !outcome.success)
            .map(|(index, _)| index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicManagementError {
    /// Index of the token in the request
    pub index: usize,
    pub reason: String,
}

/// Outcome of a topic subscribe/unsubscribe call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicManagementResult {
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: Vec<TopicManagementError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_result_counts() {
        let batch = BatchResult::from_outcomes(vec![
            SendOutcome::delivered("m1"),
            SendOutcome::failed(&ProviderError::RegistrationTokenNotRegistered("b".into())),
            SendOutcome::delivered("m3"),
        ]);

        assert_eq!(batch.success_count, 2);
        assert_eq!(batch.failure_count, 1);
        assert_eq!(batch.failed_indices().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_verify_rejects_missing_outcomes() {
        let batch = BatchResult::from_outcomes(vec![SendOutcome::delivered("m1")]);

        assert!(batch.verify(1).is_ok());
        assert!(matches!(
            batch.verify(3),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_verify_rejects_inconsistent_counts() {
        let batch = BatchResult {
            success_count: 2,
            failure_count: 0,
            responses: vec![
                SendOutcome::delivered("m1"),
                SendOutcome::failed(&ProviderError::RegistrationTokenNotRegistered("b".into())),
            ],
        };

        assert!(matches!(
            batch.verify(2),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_outcome_serialization() {
        let failed = SendOutcome::failed(&ProviderError::InvalidRegistrationToken("x".into()));
        let value = serde_json::to_value(&failed).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "messaging/invalid-registration-token");
        assert!(value.get("messageId").is_none());

        let ok = serde_json::to_value(SendOutcome::delivered("id-1")).unwrap();
        assert_eq!(ok["messageId"], "id-1");
    }
}
