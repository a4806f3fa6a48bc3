//! YAML 설정 소스 - 점(.) 경로 기반 조회
//!
//! `plugins.yml`을 읽어 `plugins.registry.timeout` 같은 경로로 값을 꺼냅니다.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// YAML 설정 소스
#[derive(Debug, Clone)]
pub struct YamlSource {
    /// 원본 파일 경로 (메모리에서 만든 경우 None)
    path: Option<PathBuf>,

    /// 파싱된 YAML 트리
    root: Value,
}

impl YamlSource {
    /// 파일에서 로드
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let root: Value = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            root,
        })
    }

    /// 문자열에서 생성
    pub fn parse(content: &str) -> Result<Self> {
        Ok(Self {
            path: None,
            root: serde_yaml::from_str(content)?,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 경로에 해당하는 원시 값
    pub fn raw(&self, key_path: &str) -> Option<&Value> {
        key_path
            .split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.root, |node, segment| match node {
                Value::Mapping(map) => map.get(segment),
                Value::Sequence(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get(index)),
                _ => None,
            })
    }

    /// 경로 존재 여부
    pub fn contains(&self, key_path: &str) -> bool {
        self.raw(key_path).is_some_and(|v| !v.is_null())
    }

    /// 타입 지정 조회 - 값이 없으면 NotFound
    pub fn get<T: DeserializeOwned>(&self, key_path: &str) -> Result<T> {
        let value = self
            .raw(key_path)
            .filter(|v| !v.is_null())
            .ok_or_else(|| Error::NotFound(format!("Config key '{}' is missing", key_path)))?;

        serde_yaml::from_value(value.clone())
            .map_err(|e| Error::Config(format!("Config key '{}' has wrong type: {}", key_path, e)))
    }

    /// 타입 지정 조회 (Optional) - 값이 없으면 None, 타입이 틀리면 에러
    pub fn get_optional<T: DeserializeOwned>(&self, key_path: &str) -> Result<Option<T>> {
        if !self.contains(key_path) {
            return Ok(None);
        }
        self.get(key_path).map(Some)
    }

    /// 타입 지정 조회 (기본값)
    pub fn get_or<T: DeserializeOwned>(&self, key_path: &str, default: T) -> Result<T> {
        Ok(self.get_optional(key_path)?.unwrap_or(default))
    }
}
