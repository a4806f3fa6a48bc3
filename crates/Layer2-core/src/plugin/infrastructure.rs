//! Plugin Infrastructure - 플러그인 디렉토리 준비

use easeci_foundation::{PluginsSettings, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// 플러그인 디렉토리 목록 (첫 번째가 다운로드 대상)
#[derive(Debug, Clone)]
pub struct PluginInfrastructure {
    directories: Vec<PathBuf>,
}

impl PluginInfrastructure {
    pub fn new(directories: Vec<PathBuf>) -> Self {
        Self { directories }
    }

    pub fn from_settings(settings: &PluginsSettings) -> Self {
        Self::new(settings.directories.clone())
    }

    /// 모든 디렉토리 생성
    ///
    /// 하나가 실패해도 나머지는 계속 시도하고, 첫 번째 에러를 돌려준다.
    pub async fn prepare(&self) -> Result<()> {
        let mut first_error = None;

        for dir in &self.directories {
            match fs::create_dir_all(dir).await {
                Ok(()) => debug!("Plugin directory ready: {:?}", dir),
                Err(e) => {
                    warn!("Failed to prepare plugin directory {:?}: {}", dir, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// 검색 순서대로의 디렉토리
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// 다운로드 대상 디렉토리
    pub fn download_dir(&self) -> Option<&Path> {
        self.directories.first().map(PathBuf::as_path)
    }
}
