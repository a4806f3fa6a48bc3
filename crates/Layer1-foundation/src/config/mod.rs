//! Config - 플러그인 런타임 설정
//!
//! - `source.rs` - YAML 설정 소스 (경로 기반 조회)
//! - `plugins.rs` - PluginsSettings 타입 뷰 (plugins.yml)

mod plugins;
mod source;

pub use plugins::{
    DeclaredPlugin, DownloadSettings, PluginsSettings, RegistrySettings,
    validate_plugin_identity, DEFAULT_REGISTRY_TIMEOUT_MS, PLUGINS_CONFIG_FILE, PLUGINS_FILE,
};
pub use source::YamlSource;
