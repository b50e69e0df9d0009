use thiserror::Error;

/// One rejected strategy from an ordered fallback chain (codec selection,
/// mux tool selection), kept for diagnostics.
#[derive(Debug, Clone)]
pub struct FailedAttempt {
    /// Name of the strategy that was tried (e.g. an encoder name).
    pub name: String,
    /// Why it was rejected.
    pub reason: String,
}

impl std::fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.reason)
    }
}

/// Failure taxonomy for the conversion pipeline.
///
/// Only the variants raised before any output exists are fatal to a job
/// (`SourceUnreadable`, `InvalidDimension`, `NoCodecAvailable`). Mux
/// failures degrade to a silent final video and are never fatal.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid dimension: {0}")]
    InvalidDimension(String),

    #[error("source unreadable: {0}")]
    SourceUnreadable(String),

    #[error("no usable video encoder: {}", format_attempts(.0))]
    NoCodecAvailable(Vec<FailedAttempt>),

    #[error("audio mux failed: {}", format_attempts(.0))]
    MuxFailed(Vec<FailedAttempt>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

fn format_attempts(attempts: &[FailedAttempt]) -> String {
    if attempts.is_empty() {
        return "no strategies attempted".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_codec_message_lists_attempts() {
        let err = ConvertError::NoCodecAvailable(vec![
            FailedAttempt {
                name: "libx264".into(),
                reason: "not compiled in".into(),
            },
            FailedAttempt {
                name: "mpeg4".into(),
                reason: "spawn failed".into(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("libx264"));
        assert!(msg.contains("mpeg4"));
    }
}
