use serde::Serialize;

/// アプリケーション共通エラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "E_GENERATOR_UNAVAILABLE")]
    GeneratorUnavailable,
    #[serde(rename = "E_GENERATOR_FAILED")]
    GeneratorFailed,
    #[serde(rename = "E_MALFORMED_OUTPUT")]
    MalformedGeneratorOutput,
    #[serde(rename = "E_SPEECH_INPUT")]
    SpeechInputFailed,
    #[serde(rename = "E_RESOURCE_LOAD")]
    ResourceLoadFailed,
    #[serde(rename = "E_INVALID_STATE")]
    InvalidState,
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeneratorUnavailable => "E_GENERATOR_UNAVAILABLE",
            Self::GeneratorFailed => "E_GENERATOR_FAILED",
            Self::MalformedGeneratorOutput => "E_MALFORMED_OUTPUT",
            Self::SpeechInputFailed => "E_SPEECH_INPUT",
            Self::ResourceLoadFailed => "E_RESOURCE_LOAD",
            Self::InvalidState => "E_INVALID_STATE",
            Self::Internal => "E_INTERNAL",
        }
    }
}

/// アプリケーションエラー（スナップショットの last_error 兼用）
#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
}

impl AppError {
    pub fn generator_unavailable(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::GeneratorUnavailable,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn generator_failed(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::GeneratorFailed,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn malformed_output(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::MalformedGeneratorOutput,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn speech_input(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::SpeechInputFailed,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn resource_load(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ResourceLoadFailed,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidState,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: msg.into(),
            recoverable: false,
        }
    }

    /// スナップショットに載せる診断文字列
    pub fn diagnostic(&self) -> String {
        format!("{}: {}", self.code.as_str(), self.message)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_contains_code_and_message() {
        let err = AppError::generator_failed("model offline");
        assert_eq!(err.diagnostic(), "E_GENERATOR_FAILED: model offline");
        assert!(err.recoverable);
    }

    #[test]
    fn internal_is_not_recoverable() {
        assert!(!AppError::internal("boom").recoverable);
    }
}
