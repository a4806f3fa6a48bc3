//! Plugin Manifest - 아티팩트에 내장된 메타데이터
//!
//! 아티팩트는 `<name>-<version>.plugin` 이름의 tar.gz 파일이고,
//! 루트(또는 단일 최상위 폴더) 안에 `plugin.json`을 가진다.

use easeci_foundation::{validate_plugin_identity, Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Read};
use std::path::{Component, Path};
use std::str::FromStr;
use tar::Archive;

/// 아티팩트 내부 매니페스트 파일명
pub const MANIFEST_FILE: &str = "plugin.json";

/// 아티팩트 파일 확장자
pub const ARTIFACT_EXTENSION: &str = "plugin";

/// 이름/버전으로 아티팩트 파일명 생성 (예: "alpha-1.0.plugin")
pub fn artifact_file_name(name: &str, version: &str) -> String {
    format!("{}-{}.{}", name, version, ARTIFACT_EXTENSION)
}

// ============================================================================
// ContractType - 플러그인 계약 타입
// ============================================================================

/// 플러그인이 구현하는 계약
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    /// 전용 백그라운드 태스크에서 start/stop 훅으로 구동
    Standalone,

    /// 전용 태스크 없이 로드 즉시 사용 가능
    Extension,
}

impl ContractType {
    pub const ALL: [ContractType; 2] = [ContractType::Standalone, ContractType::Extension];

    /// 매니페스트 `implements` 값 / 설정 파일의 그룹 키
    pub fn contract_name(&self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::Extension => "extension",
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.contract_name())
    }
}

impl FromStr for ContractType {
    type Err = Error;

    /// "standalone", "Extension", "io.easeci.extension.Standalone" 모두 허용
    fn from_str(s: &str) -> Result<Self> {
        let simple = s.trim().rsplit('.').next().unwrap_or_default();
        if simple.eq_ignore_ascii_case("standalone") {
            Ok(Self::Standalone)
        } else if simple.eq_ignore_ascii_case("extension") {
            Ok(Self::Extension)
        } else {
            Err(Error::Manifest(format!("Unknown plugin contract: '{}'", s)))
        }
    }
}

// ============================================================================
// PluginManifest - plugin.json
// ============================================================================

/// 아티팩트 매니페스트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub name: String,

    pub version: String,

    /// 구현한 계약 이름 (ContractType과 1:1)
    pub implements: String,

    /// 팩토리가 생성자를 찾는 엔트리 포인트
    pub entry: String,

    #[serde(default)]
    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl PluginManifest {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        contract: ContractType,
        entry: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            implements: contract.contract_name().to_string(),
            entry: entry.into(),
            description: String::new(),
            author: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// `implements` 값을 계약 타입으로 변환
    pub fn contract_type(&self) -> Result<ContractType> {
        self.implements.parse()
    }

    /// plugin.json 파싱 + 필수 필드 검증
    pub fn from_json(content: &str) -> Result<Self> {
        let manifest: PluginManifest = serde_json::from_str(content)
            .map_err(|e| Error::Manifest(format!("Invalid {}: {}", MANIFEST_FILE, e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("name", &self.name),
            ("version", &self.version),
            ("entry", &self.entry),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Manifest(format!(
                    "{} is missing '{}' field",
                    MANIFEST_FILE, field
                )));
            }
        }
        validate_plugin_identity(&self.name, &self.version)
            .map_err(|e| Error::Manifest(format!("{} rejected: {}", MANIFEST_FILE, e)))?;
        self.contract_type().map(|_| ())
    }

    /// 아티팩트(tar.gz) 바이트에서 매니페스트 추출
    pub fn from_artifact_bytes(data: &[u8]) -> Result<Self> {
        let mut archive = Archive::new(GzDecoder::new(Cursor::new(data)));
        let entries = archive
            .entries()
            .map_err(|e| Error::Manifest(format!("Failed to read artifact: {}", e)))?;

        for entry in entries {
            let mut entry =
                entry.map_err(|e| Error::Manifest(format!("Failed to read entry: {}", e)))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let path = entry
                .path()
                .map_err(|e| Error::Manifest(format!("Invalid entry path: {}", e)))?
                .into_owned();
            if !is_manifest_path(&path) {
                continue;
            }

            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| Error::Manifest(format!("Failed to read {}: {}", MANIFEST_FILE, e)))?;
            return Self::from_json(&content);
        }

        Err(Error::Manifest(format!("Artifact has no {}", MANIFEST_FILE)))
    }

    /// 이 매니페스트를 담은 아티팩트(tar.gz) 생성
    ///
    /// `files`는 매니페스트 외에 함께 담을 (상대 경로, 내용) 목록.
    pub fn pack(&self, files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
        self.validate()?;
        let manifest = serde_json::to_vec_pretty(self)?;
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let entries = std::iter::once((MANIFEST_FILE, manifest.as_slice())).chain(files.iter().copied());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, data)?;
        }

        let encoder = builder.into_inner()?;
        Ok(encoder.finish()?)
    }
}

/// `plugin.json` 또는 `<root>/plugin.json` 만 인정 (상위 경로 탈출 금지)
fn is_manifest_path(path: &Path) -> bool {
    let mut normal = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => normal.push(segment),
            Component::CurDir => {}
            _ => return false,
        }
    }
    matches!(normal.last(), Some(last) if *last == MANIFEST_FILE) && normal.len() <= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_parsing() {
        assert_eq!("standalone".parse::<ContractType>().unwrap(), ContractType::Standalone);
        assert_eq!("Extension".parse::<ContractType>().unwrap(), ContractType::Extension);
        assert_eq!(
            "io.easeci.extension.Standalone".parse::<ContractType>().unwrap(),
            ContractType::Standalone
        );
        assert!("daemon".parse::<ContractType>().is_err());
        assert_eq!(ContractType::Extension.to_string(), "extension");
    }

    #[test]
    fn test_manifest_json() {
        let json = r#"{
            "name": "alpha",
            "version": "1.0",
            "implements": "standalone",
            "entry": "com.example.Alpha",
            "author": "EaseCI"
        }"#;

        let manifest = PluginManifest::from_json(json).unwrap();
        assert_eq!(manifest.name, "alpha");
        assert_eq!(manifest.contract_type().unwrap(), ContractType::Standalone);
        assert_eq!(manifest.author.as_deref(), Some("EaseCI"));
        assert!(manifest.description.is_empty());
    }

    #[test]
    fn test_manifest_missing_entry() {
        let json = r#"{"name": "alpha", "version": "1.0", "implements": "extension", "entry": " "}"#;
        assert!(matches!(PluginManifest::from_json(json), Err(Error::Manifest(_))));
    }

    #[test]
    fn test_pack_and_read() {
        let manifest = PluginManifest::new("alpha", "1.0", ContractType::Extension, "alpha.main")
            .with_description("test extension");
        let bytes = manifest.pack(&[("README.md", b"# alpha")]).unwrap();

        let parsed = PluginManifest::from_artifact_bytes(&bytes).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_artifact_without_manifest() {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(3);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "lib/a.so", &b"abc"[..]).unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();

        assert!(PluginManifest::from_artifact_bytes(&bytes).is_err());
    }

    #[test]
    fn test_manifest_path_rules() {
        assert!(is_manifest_path(Path::new("plugin.json")));
        assert!(is_manifest_path(Path::new("./alpha-1.0/plugin.json")));
        assert!(!is_manifest_path(Path::new("a/b/plugin.json")));
        assert!(!is_manifest_path(Path::new("../plugin.json")));
        assert_eq!(artifact_file_name("alpha", "1.0"), "alpha-1.0.plugin");
    }

    #[test]
    fn test_manifest_rejects_path_like_identity() {
        for (name, version) in [("../evil", "1.0"), ("a/b", "1.0"), ("alpha", "../../1.0")] {
            let json = format!(
                r#"{{"name": "{}", "version": "{}", "implements": "standalone", "entry": "x"}}"#,
                name, version
            );
            assert!(
                matches!(PluginManifest::from_json(&json), Err(Error::Manifest(_))),
                "{}:{} was accepted",
                name,
                version
            );

            let manifest = PluginManifest::new(name, version, ContractType::Standalone, "x");
            assert!(manifest.pack(&[]).is_err());
        }
    }
}
