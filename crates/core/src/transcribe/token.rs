//! HuggingFace token validation with one-shot memoization.

use tokio::sync::OnceCell;
use tracing::warn;

use crate::cancel::{wait_cancelled, CancelSignal};
use crate::config::{TranscribeConfig, VadMethod};

/// Errors from token validation. Only transient failures surface;
/// auth failures fall back to the no-auth VAD method instead.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token validation transport error: {0}")]
    Transport(String),

    #[error("token validation failed transiently: HTTP {0}")]
    Transient(u16),

    #[error("token validation cancelled")]
    Cancelled,
}

/// Validates the HuggingFace token once per stage instance.
///
/// A definitive answer (valid, or rejected with 401/403) is memoized;
/// transient failures are not, so the next call retries.
pub struct TokenValidator {
    verdict: OnceCell<bool>,
}

impl TokenValidator {
    pub fn new() -> Self {
        Self {
            verdict: OnceCell::new(),
        }
    }

    /// Resolve the effective VAD method: pyannote only with a token
    /// the validation endpoint accepts, silero otherwise.
    pub async fn effective_vad_method(
        &self,
        config: &TranscribeConfig,
        cancel: &CancelSignal,
    ) -> Result<VadMethod, TokenError> {
        if config.vad_method != VadMethod::Pyannote {
            return Ok(VadMethod::Silero);
        }
        if self.validate(config, cancel).await? {
            Ok(VadMethod::Pyannote)
        } else {
            Ok(VadMethod::Silero)
        }
    }

    /// Whether the configured token is valid, memoized.
    pub async fn validate(
        &self,
        config: &TranscribeConfig,
        cancel: &CancelSignal,
    ) -> Result<bool, TokenError> {
        self.verdict
            .get_or_try_init(|| async {
                if config.hf_token.is_empty() {
                    warn!("No HuggingFace token configured, falling back to silero VAD");
                    return Ok(false);
                }
                check_token(&config.hf_endpoint, &config.hf_token, cancel).await
            })
            .await
            .copied()
    }
}

impl Default for TokenValidator {
    fn default() -> Self {
        Self::new()
    }
}

async fn check_token(
    endpoint: &str,
    token: &str,
    cancel: &CancelSignal,
) -> Result<bool, TokenError> {
    let client = reqwest::Client::new();
    let request = client
        .get(endpoint)
        .header("Authorization", format!("Bearer {}", token));

    let response = tokio::select! {
        r = request.send() => r.map_err(|e| TokenError::Transport(e.to_string()))?,
        _ = wait_cancelled(cancel) => return Err(TokenError::Cancelled),
    };

    let status = response.status();
    if status.is_success() {
        return Ok(true);
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        warn!(status = status.as_u16(), "HuggingFace token rejected, falling back to silero VAD");
        return Ok(false);
    }
    Err(TokenError::Transient(status.as_u16()))
}
