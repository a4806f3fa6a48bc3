//! # easeci-foundation
//!
//! Foundation layer for the EaseCI plugin runtime:
//! - Error: 공통 에러 타입과 `Result` 별칭
//! - Config: plugins.yml 설정 소스와 타입 뷰 (PluginsSettings)

pub mod config;
pub mod error;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    DeclaredPlugin, DownloadSettings, PluginsSettings, RegistrySettings, YamlSource,
    validate_plugin_identity, DEFAULT_REGISTRY_TIMEOUT_MS, PLUGINS_CONFIG_FILE, PLUGINS_FILE,
};
