//! Plugin Config - 플러그인 설정(UUID 바인딩) 저장소
//!
//! plugins-config.json을 통해 UUID ↔ (name, version, enabled) 바인딩을 관리합니다.
//! 계약 이름(standalone/extension)별로 그룹화하여 저장합니다.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::manifest::ContractType;
use easeci_foundation::{Error, Result};

// ============================================================================
// ConfigDescriptor - 영속 바인딩
// ============================================================================

/// UUID ↔ 플러그인 바인딩
///
/// (name, version)당 하나만 존재하고, UUID는 한 번 정해지면 바뀌지 않는다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDescriptor {
    pub uuid: Uuid,

    pub name: String,

    pub version: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ConfigDescriptor {
    /// 새 UUID로 생성 (enabled = true)
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_uuid(Uuid::new_v4(), name, version)
    }

    pub fn with_uuid(uuid: Uuid, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            version: version.into(),
            enabled: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn matches(&self, name: &str, version: &str) -> bool {
        self.name == name && self.version == version
    }
}

// ============================================================================
// PluginConfigFile - plugins-config.json 구조
// ============================================================================

/// plugins-config.json 파일 구조
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PluginConfigFile {
    #[serde(default = "default_version")]
    version: String,

    /// 계약 이름 → 바인딩 목록
    #[serde(default)]
    plugins: BTreeMap<String, Vec<ConfigDescriptor>>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for PluginConfigFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            plugins: BTreeMap::new(),
        }
    }
}

impl PluginConfigFile {
    fn descriptors(&self) -> impl Iterator<Item = &ConfigDescriptor> {
        self.plugins.values().flatten()
    }

    fn descriptors_mut(&mut self) -> impl Iterator<Item = &mut ConfigDescriptor> {
        self.plugins.values_mut().flatten()
    }
}

// ============================================================================
// PluginConfig - 설정 저장소
// ============================================================================

/// 플러그인 설정 저장소 - enable/disable의 영속 원본
pub struct PluginConfig {
    /// plugins-config.json 경로
    path: PathBuf,

    /// 메모리 캐시
    cache: RwLock<PluginConfigFile>,
}

impl PluginConfig {
    /// 빈 저장소 생성 (디스크를 읽지 않음)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(PluginConfigFile::default()),
        }
    }

    /// 생성 + 로드
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let config = Self::new(path);
        config.load().await?;
        Ok(config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // 로드 / 저장
    // ========================================================================

    /// 파일 로드 - 파일이 없으면 빈 저장소
    pub async fn load(&self) -> Result<()> {
        if !self.path.exists() {
            debug!("Plugin config not found at {:?}, using empty", self.path);
            return Ok(());
        }

        let content = fs::read_to_string(&self.path).await?;
        let file: PluginConfigFile = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid {}: {}", self.path.display(), e)))?;

        let count = file.descriptors().count();
        *self.cache.write().await = file;

        info!("Loaded {} plugin config descriptors", count);
        Ok(())
    }

    /// 파일 저장 - 실패는 항상 `ConfigPersistence`
    pub async fn save(&self) -> Result<()> {
        let persistence = |e: std::io::Error| {
            Error::ConfigPersistence(format!("{}: {}", self.path.display(), e))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(persistence)?;
        }

        let cache = self.cache.read().await;
        let content = serde_json::to_string_pretty(&*cache)
            .map_err(|e| Error::ConfigPersistence(e.to_string()))?;

        fs::write(&self.path, content).await.map_err(persistence)?;

        debug!(
            "Saved plugin config with {} descriptors",
            cache.descriptors().count()
        );
        Ok(())
    }

    // ========================================================================
    // 바인딩 관리
    // ========================================================================

    /// 바인딩 추가 - 같은 (name, version)이 이미 있으면 아무것도 바꾸지 않고 false
    pub async fn add(&self, contract: ContractType, descriptor: ConfigDescriptor) -> bool {
        let mut cache = self.cache.write().await;

        if cache
            .descriptors()
            .any(|d| d.matches(&descriptor.name, &descriptor.version))
        {
            debug!(
                "Config descriptor for {}:{} already present",
                descriptor.name, descriptor.version
            );
            return false;
        }

        info!(
            "Registered {} plugin {}:{} as {}",
            contract, descriptor.name, descriptor.version, descriptor.uuid
        );
        cache
            .plugins
            .entry(contract.contract_name().to_string())
            .or_default()
            .push(descriptor);
        true
    }

    /// 활성화 상태 변경 - 바인딩이 없으면 false
    pub async fn set_enabled(&self, name: &str, version: &str, enabled: bool) -> bool {
        let mut cache = self.cache.write().await;

        if let Some(descriptor) = cache.descriptors_mut().find(|d| d.matches(name, version)) {
            descriptor.enabled = enabled;
            info!(
                "Plugin {}:{} {}",
                name,
                version,
                if enabled { "enabled" } else { "disabled" }
            );
            return true;
        }
        false
    }

    /// (name, version)으로 조회
    pub async fn find(&self, name: &str, version: &str) -> Option<ConfigDescriptor> {
        self.cache
            .read()
            .await
            .descriptors()
            .find(|d| d.matches(name, version))
            .cloned()
    }

    /// 활성화된 바인딩만 조회
    pub async fn find_enabled(&self, name: &str, version: &str) -> Option<ConfigDescriptor> {
        self.find(name, version).await.filter(|d| d.enabled)
    }

    /// UUID로 조회
    pub async fn find_by_uuid(&self, uuid: Uuid) -> Option<ConfigDescriptor> {
        self.cache
            .read()
            .await
            .descriptors()
            .find(|d| d.uuid == uuid)
            .cloned()
    }

    /// 전체 바인딩 (계약 이름 순)
    pub async fn list(&self) -> Vec<(ContractType, ConfigDescriptor)> {
        let cache = self.cache.read().await;
        cache
            .plugins
            .iter()
            .filter_map(|(group, descriptors)| {
                group.parse::<ContractType>().ok().map(|c| (c, descriptors))
            })
            .flat_map(|(contract, descriptors)| {
                descriptors.iter().map(move |d| (contract, d.clone()))
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.descriptors().count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// ============================================================================
// 테스트
// ============================================================================
