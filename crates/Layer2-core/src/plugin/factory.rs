//! Plugin Factory - 엔트리 포인트 → 플러그인 객체 생성
//!
//! 로딩 메커니즘(공유 라이브러리, 스크립트 등)은 [`PluginFactory`] 뒤에 숨긴다.
//! 기본 구현 [`BuiltinFactory`]는 컴파일 타임에 등록된 생성자 카탈로그이다.

use super::manifest::PluginManifest;
use super::traits::{ExtensionPlugin, PluginObject, StandalonePlugin};
use easeci_foundation::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 플러그인 객체 팩토리
pub trait PluginFactory: Send + Sync {
    /// 팩토리 이름 (로그용)
    fn name(&self) -> &str;

    /// 매니페스트의 엔트리 포인트로 객체 생성
    fn create(&self, manifest: &PluginManifest) -> Result<PluginObject>;
}

/// 생성자 함수
pub type Constructor = Arc<dyn Fn(&PluginManifest) -> Result<PluginObject> + Send + Sync>;

/// 컴파일 타임 생성자 카탈로그
#[derive(Default, Clone)]
pub struct BuiltinFactory {
    constructors: HashMap<String, Constructor>,
}

impl BuiltinFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 생성자 등록 (같은 엔트리는 덮어씀)
    pub fn register<F>(&mut self, entry: impl Into<String>, constructor: F)
    where
        F: Fn(&PluginManifest) -> Result<PluginObject> + Send + Sync + 'static,
    {
        let entry = entry.into();
        debug!("Registered builtin constructor: {}", entry);
        self.constructors.insert(entry, Arc::new(constructor));
    }

    /// Standalone 생성자 등록 (빌더)
    pub fn with_standalone<P, F>(mut self, entry: impl Into<String>, constructor: F) -> Self
    where
        P: StandalonePlugin + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.register(entry, move |_| Ok(PluginObject::standalone(constructor())));
        self
    }

    /// Extension 생성자 등록 (빌더)
    pub fn with_extension<P, F>(mut self, entry: impl Into<String>, constructor: F) -> Self
    where
        P: ExtensionPlugin + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.register(entry, move |_| Ok(PluginObject::extension(constructor())));
        self
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.constructors.contains_key(entry)
    }

    /// 등록된 엔트리 포인트 (정렬됨)
    pub fn entries(&self) -> Vec<&str> {
        let mut entries: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        entries.sort_unstable();
        entries
    }
}

impl PluginFactory for BuiltinFactory {
    fn name(&self) -> &str {
        "builtin"
    }

    fn create(&self, manifest: &PluginManifest) -> Result<PluginObject> {
        let constructor = self.constructors.get(&manifest.entry).ok_or_else(|| {
            Error::load(
                format!("{}:{}", manifest.name, manifest.version),
                format!("unknown entry point '{}'", manifest.entry),
            )
        })?;
        constructor(manifest)
    }
}
