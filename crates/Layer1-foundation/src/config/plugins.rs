//! Plugins Settings - plugins.yml 타입 뷰
//!
//! 선언된 플러그인 목록, 플러그인 디렉토리, 레지스트리 접속 정보,
//! 다운로드 정책을 [`YamlSource`]에서 경로 기반으로 읽어옵니다.

use super::source::YamlSource;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 플러그인 선언 파일명
pub const PLUGINS_FILE: &str = "plugins.yml";

/// 플러그인 설정(UUID 바인딩) 저장 파일명
pub const PLUGINS_CONFIG_FILE: &str = "plugins-config.json";

/// 기본 레지스트리 타임아웃 (밀리초)
pub const DEFAULT_REGISTRY_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// DeclaredPlugin - plugins.yml에 선언된 플러그인
// ============================================================================

/// 선언된 플러그인 참조
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredPlugin {
    pub name: String,

    /// YAML에서 `1.0`처럼 숫자로 적어도 문자열로 받는다
    #[serde(deserialize_with = "scalar_as_string")]
    pub version: String,

    /// false면 해석 대상에서 제외
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 원격 레지스트리 다운로드 대상 여부
    #[serde(default = "default_true")]
    pub downloadable: bool,
}

impl DeclaredPlugin {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            enabled: true,
            downloadable: true,
        }
    }

    pub fn not_downloadable(mut self) -> Self {
        self.downloadable = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_plugin_identity(&self.name, &self.version)
    }
}

/// 플러그인 이름 / 버전 검사
///
/// 둘 다 아티팩트 파일명과 레지스트리 URL의 경로 세그먼트가 되므로
/// 비어 있거나 경로 구분자, 제어 문자를 포함하거나 `.`으로 시작하면 거부한다.
pub fn validate_plugin_identity(name: &str, version: &str) -> Result<()> {
    for (field, value) in [("name", name), ("version", version)] {
        if value.trim().is_empty() {
            return Err(Error::InvalidInput(format!("Plugin {} is empty", field)));
        }
        if value.starts_with('.')
            || value.contains(['/', '\\'])
            || value.chars().any(char::is_control)
        {
            return Err(Error::InvalidInput(format!(
                "Plugin {} '{}' is not a single path segment",
                field,
                value.escape_debug()
            )));
        }
    }
    Ok(())
}

fn default_true() -> bool {
    true
}

fn scalar_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a version string, got {:?}",
            other
        ))),
    }
}

// ============================================================================
// RegistrySettings / DownloadSettings
// ============================================================================

/// 원격 플러그인 레지스트리 접속 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    pub url: String,
    pub timeout_ms: u64,
}

impl RegistrySettings {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            url: "https://registry.easeci.io".to_string(),
            timeout_ms: DEFAULT_REGISTRY_TIMEOUT_MS,
        }
    }
}

/// 누락된 플러그인의 다운로드 정책
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// `plugins.local.download`
    pub enabled: bool,

    /// 새로 받은 플러그인을 곧바로 enabled=true로 등록할지 여부
    pub auto_enable: bool,

    /// 동시 다운로드 상한 (None = 제한 없음)
    pub max_concurrent: Option<usize>,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_enable: true,
            max_concurrent: None,
        }
    }
}

// ============================================================================
// PluginsSettings - 전체 설정
// ============================================================================

/// plugins.yml 전체 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginsSettings {
    /// 선언된 플러그인
    pub declared: Vec<DeclaredPlugin>,

    /// 플러그인 디렉토리 (첫 번째가 다운로드 대상)
    pub directories: Vec<PathBuf>,

    /// 플러그인 설정 저장 파일
    pub config_file: PathBuf,

    pub registry: RegistrySettings,

    pub download: DownloadSettings,
}

impl PluginsSettings {
    /// 디렉토리 하나로 기본 설정 생성
    pub fn new(plugin_dir: impl Into<PathBuf>) -> Self {
        let plugin_dir = plugin_dir.into();
        Self {
            declared: Vec::new(),
            config_file: plugin_dir.join(PLUGINS_CONFIG_FILE),
            directories: vec![plugin_dir],
            registry: RegistrySettings::default(),
            download: DownloadSettings::default(),
        }
    }

    /// 사용자 홈 디렉토리 기반 기본 플러그인 디렉토리 (~/.easeci/plugins)
    pub fn default_plugin_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".easeci").join("plugins"))
            .unwrap_or_else(|| PathBuf::from("plugins"))
    }

    /// plugins.yml 로드
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = YamlSource::load(path)?;
        Self::from_source(&source)
    }

    /// 설정 소스에서 타입 뷰 구성
    ///
    /// 상대 경로는 plugins.yml이 있는 디렉토리 기준으로 해석한다.
    pub fn from_source(source: &YamlSource) -> Result<Self> {
        let base_dir = source
            .path()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { base_dir.join(p) };

        let declared: Vec<DeclaredPlugin> = source.get_or("plugins.declared", Vec::new())?;
        for plugin in &declared {
            plugin.validate()?;
        }

        let mut directories: Vec<PathBuf> = source
            .get_or::<Vec<PathBuf>>("plugins.directories", Vec::new())?
            .into_iter()
            .map(&resolve)
            .collect();
        if directories.is_empty() {
            directories.push(Self::default_plugin_dir());
        }

        let config_file = match source.get_optional::<PathBuf>("plugins.config-file")? {
            Some(path) => resolve(path),
            None => directories[0].join(PLUGINS_CONFIG_FILE),
        };

        let registry = RegistrySettings {
            url: source.get_or("plugins.registry.url", RegistrySettings::default().url)?,
            timeout_ms: source.get_or("plugins.registry.timeout", DEFAULT_REGISTRY_TIMEOUT_MS)?,
        };

        let download = DownloadSettings {
            enabled: source.get_or("plugins.local.download", false)?,
            auto_enable: source.get_or("plugins.local.auto-enable", true)?,
            max_concurrent: source
                .get_optional::<usize>("plugins.local.max-concurrent-downloads")?
                .filter(|n| *n > 0),
        };

        debug!(
            "Loaded plugin settings: {} declared, {} directories",
            declared.len(),
            directories.len()
        );

        Ok(Self {
            declared,
            directories,
            config_file,
            registry,
            download,
        })
    }

    /// 다운로드 대상 디렉토리
    pub fn download_dir(&self) -> &Path {
        self.directories
            .first()
            .map_or_else(|| Path::new("plugins"), PathBuf::as_path)
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn declare(mut self, plugin: DeclaredPlugin) -> Self {
        self.declared.push(plugin);
        self
    }

    pub fn with_registry(mut self, url: impl Into<String>, timeout_ms: u64) -> Self {
        self.registry = RegistrySettings {
            url: url.into(),
            timeout_ms,
        };
        self
    }

    pub fn with_download(mut self, enabled: bool) -> Self {
        self.download.enabled = enabled;
        self
    }

    pub fn with_auto_enable(mut self, auto_enable: bool) -> Self {
        self.download.auto_enable = auto_enable;
        self
    }

    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directories.push(dir.into());
        self
    }
}
