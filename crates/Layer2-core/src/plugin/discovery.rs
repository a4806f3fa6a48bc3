//! Plugin Resolver - 선언된 플러그인 ↔ 디스크 아티팩트 매칭
//!
//! 플러그인 디렉토리에서 `*.plugin` 아티팩트를 찾고 내장 매니페스트를 읽습니다.
//! 읽기 전용이며, 같은 디렉토리 상태에 대해 항상 같은 결과를 냅니다
//! (디렉토리는 설정 순서대로, 디렉토리 안은 파일명 순으로, 먼저 찾은 것이 우선).

use super::infrastructure::PluginInfrastructure;
use super::manifest::{PluginManifest, ARTIFACT_EXTENSION};
use super::types::Plugin;
use easeci_foundation::{DeclaredPlugin, Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// 플러그인 해석기
#[derive(Debug, Clone, Copy, Default)]
pub struct PluginResolver;

impl PluginResolver {
    pub fn new() -> Self {
        Self
    }

    // ========================================================================
    // 아티팩트 스캔
    // ========================================================================

    /// 모든 디렉토리의 아티팩트 스캔 - (name, version)이 겹치면 먼저 찾은 것만
    pub async fn scan(&self, infra: &PluginInfrastructure) -> Vec<Plugin> {
        let mut seen = HashSet::new();
        let mut plugins = Vec::new();

        for dir in infra.directories() {
            if !dir.exists() {
                debug!("Plugin directory {:?} does not exist, skipping", dir);
                continue;
            }

            match self.scan_directory(dir).await {
                Ok(found) => {
                    for plugin in found {
                        if seen.insert((plugin.name.clone(), plugin.version.clone())) {
                            plugins.push(plugin);
                        } else {
                            debug!("Shadowed artifact for {}", plugin);
                        }
                    }
                }
                Err(e) => warn!("Failed to scan plugin directory {:?}: {}", dir, e),
            }
        }

        plugins
    }

    /// 디렉토리 하나 스캔 (파일명 순)
    async fn scan_directory(&self, dir: &Path) -> Result<Vec<Plugin>> {
        let mut artifacts: Vec<PathBuf> = Vec::new();

        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == ARTIFACT_EXTENSION) && path.is_file() {
                artifacts.push(path);
            }
        }
        artifacts.sort();

        let mut plugins = Vec::with_capacity(artifacts.len());
        for path in artifacts {
            match read_artifact(&path).await {
                Ok(plugin) => {
                    debug!("Found artifact: {}", plugin);
                    plugins.push(plugin);
                }
                Err(e) => warn!("Skipping unreadable artifact {:?}: {}", path, e),
            }
        }

        Ok(plugins)
    }

    // ========================================================================
    // 해석
    // ========================================================================

    /// 선언된(enabled) 플러그인 중 디스크에서 찾은 것들
    pub async fn resolve_declared(
        &self,
        declared: &[DeclaredPlugin],
        infra: &PluginInfrastructure,
    ) -> HashSet<Plugin> {
        let available = self.scan(infra).await;

        let resolved: HashSet<Plugin> = declared
            .iter()
            .filter(|d| d.enabled)
            .filter_map(|d| {
                available
                    .iter()
                    .find(|p| p.matches(&d.name, &d.version))
                    .map(|p| p.clone().with_downloadable(d.downloadable))
            })
            .collect();

        info!(
            "Resolved {} of {} declared plugins",
            resolved.len(),
            declared.iter().filter(|d| d.enabled).count()
        );
        resolved
    }

    /// 선언됐지만 해석되지 않은 플러그인 (로컬에 없음, 선언의 downloadable 유지)
    pub fn unresolved(declared: &[DeclaredPlugin], resolved: &HashSet<Plugin>) -> HashSet<Plugin> {
        declared
            .iter()
            .filter(|d| d.enabled)
            .map(Plugin::from)
            .filter(|p| !resolved.contains(p))
            .collect()
    }

    /// 특정 (name, version)의 아티팩트 찾기
    pub async fn resolve_by_identity(
        &self,
        infra: &PluginInfrastructure,
        name: &str,
        version: &str,
    ) -> Result<Plugin> {
        self.scan(infra)
            .await
            .into_iter()
            .find(|p| p.matches(name, version))
            .ok_or_else(|| Error::NotFound(format!("Plugin artifact {}:{}", name, version)))
    }
}

/// 아티팩트 파일을 읽어 해석된 Plugin 생성
async fn read_artifact(path: &Path) -> Result<Plugin> {
    let data = fs::read(path).await?;
    let manifest = PluginManifest::from_artifact_bytes(&data)?;
    Plugin::resolved(path, manifest)
}
