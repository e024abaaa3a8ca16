//! Errors reported by messaging providers.

use thiserror::Error;

/// Errors that can occur while talking to the messaging provider.
///
/// Variants mirror the error codes surfaced by the Firebase Admin SDK so that
/// callers (and per-target outcomes) can be classified consistently regardless
/// of which backend produced them.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The token is not a syntactically valid registration token
    #[error("Invalid registration token: {0}")]
    InvalidRegistrationToken(String),

    /// The token was valid once but the app instance is gone
    #[error("Registration token is not registered: {0}")]
    RegistrationTokenNotRegistered(String),

    /// The request was rejected as malformed (bad topic, oversized payload, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The token belongs to a different sender
    #[error("Mismatched credential: {0}")]
    MismatchedCredential(String),

    #[error("Message rate exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Messaging service unavailable: {0}")]
    Unavailable(String),

    /// Credentials could not be loaded or exchanged for an access token
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with something that does not fit the contract
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Messaging service internal error: {0}")]
    Internal(String),

    #[error("Unknown messaging error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Stable error code, in the `messaging/<kind>` form.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::InvalidRegistrationToken(_) => "messaging/invalid-registration-token",
            ProviderError::RegistrationTokenNotRegistered(_) => {
                "messaging/registration-token-not-registered"
            }
            ProviderError::InvalidArgument(_) => "messaging/invalid-argument",
            ProviderError::MismatchedCredential(_) => "messaging/mismatched-credential",
            ProviderError::QuotaExceeded(_) => "messaging/message-rate-exceeded",
            ProviderError::Unavailable(_) => "messaging/server-unavailable",
            ProviderError::Authentication(_) => "messaging/authentication-error",
            ProviderError::Transport(_) => "messaging/network-error",
            ProviderError::MalformedResponse(_) => "messaging/malformed-response",
            ProviderError::Internal(_) => "messaging/internal-error",
            ProviderError::Unknown(_) => "messaging/unknown-error",
        }
    }

    /// Whether the error is about the addressed device rather than the service.
    pub fn is_addressing_error(&self) -> bool {
        matches!(
            self,
            ProviderError::InvalidRegistrationToken(_)
                | ProviderError::RegistrationTokenNotRegistered(_)
        )
    }
}
