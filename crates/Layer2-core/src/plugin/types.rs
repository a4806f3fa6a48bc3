//! Plugin 타입 - 식별자 + 아티팩트 참조

use super::manifest::{ContractType, PluginManifest};
use easeci_foundation::{DeclaredPlugin, Result};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// 아티팩트 참조
#[derive(Debug, Clone, Default)]
pub struct Artifact {
    /// 디스크상의 아티팩트 경로
    pub path: Option<PathBuf>,

    /// 로컬에 저장되어 있는지 여부
    pub stored_locally: bool,

    /// 파싱된 매니페스트
    pub manifest: Option<PluginManifest>,
}

/// 플러그인 - (name, version) 식별자와 아티팩트 정보
///
/// 동등성/해시는 (name, version)만 사용한다.
#[derive(Debug, Clone)]
pub struct Plugin {
    pub name: String,

    pub version: String,

    /// 해석 전에는 알 수 없음
    pub contract_type: Option<ContractType>,

    pub artifact: Artifact,

    /// 원격 레지스트리에서 받을 수 있는지 여부
    pub downloadable: bool,
}

impl Plugin {
    /// 아직 해석되지 않은 플러그인
    pub fn unresolved(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            contract_type: None,
            artifact: Artifact::default(),
            downloadable: true,
        }
    }

    /// 디스크에서 찾은 아티팩트로 생성
    pub fn resolved(path: impl Into<PathBuf>, manifest: PluginManifest) -> Result<Self> {
        let contract_type = manifest.contract_type()?;
        Ok(Self {
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            contract_type: Some(contract_type),
            artifact: Artifact {
                path: Some(path.into()),
                stored_locally: true,
                manifest: Some(manifest),
            },
            downloadable: true,
        })
    }

    pub fn with_downloadable(mut self, downloadable: bool) -> Self {
        self.downloadable = downloadable;
        self
    }

    pub fn is_stored_locally(&self) -> bool {
        self.artifact.stored_locally
    }

    pub fn manifest(&self) -> Option<&PluginManifest> {
        self.artifact.manifest.as_ref()
    }

    /// "name:version"
    pub fn short_name(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }

    pub fn matches(&self, name: &str, version: &str) -> bool {
        self.name == name && self.version == version
    }
}

impl From<&DeclaredPlugin> for Plugin {
    fn from(declared: &DeclaredPlugin) -> Self {
        Plugin::unresolved(&declared.name, &declared.version).with_downloadable(declared.downloadable)
    }
}

impl PartialEq for Plugin {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl Eq for Plugin {}

impl Hash for Plugin {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)?;
        match (&self.contract_type, &self.artifact.path) {
            (Some(contract), Some(path)) => write!(f, " [{}] {}", contract, path.display()),
            _ => write!(f, " [unresolved]"),
        }
    }
}
