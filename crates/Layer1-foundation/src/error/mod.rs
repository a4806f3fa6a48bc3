//! Error types for the EaseCI plugin runtime
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// 플러그인 런타임 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    /// 플러그인 설정 파일 저장 실패 - 유일하게 critical로 취급되는 에러
    #[error("Plugin config persistence failed: {0}")]
    ConfigPersistence(String),

    // ========================================================================
    // 플러그인 관련
    // ========================================================================
    #[error("Plugin manifest error: {0}")]
    Manifest(String),

    #[error("Plugin load failed: {plugin} - {message}")]
    Load { plugin: String, message: String },

    #[error("Plugin download failed: {plugin} - {message}")]
    Download { plugin: String, message: String },

    /// Standalone/Extension 계약 위반 (프로그래밍 오류)
    #[error("Plugin contract violated: {0}")]
    ContractViolation(String),

    // ========================================================================
    // 실행 관련
    // ========================================================================
    #[error("Timeout: {0}")]
    Timeout(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 프로세스 수준으로 전파되어야 하는 에러인지 확인
    ///
    /// 설정 저장 실패만 critical
    pub fn is_critical(&self) -> bool {
        matches!(self, Error::ConfigPersistence(_))
    }

    /// 재시도 가능한 에러인지 확인 (자동 재시도는 없음, 호출자 판단용)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Http(_) | Error::Download { .. })
    }

    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::InvalidInput(_) | Error::Config(_) | Error::Manifest(_)
        )
    }

    /// Load 에러 생성 헬퍼
    pub fn load(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Load {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Download 에러 생성 헬퍼
    pub fn download(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Download {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
