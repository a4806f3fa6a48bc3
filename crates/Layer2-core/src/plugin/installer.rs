//! Plugin Downloader - 원격 레지스트리에서 누락된 아티팩트 다운로드
//!
//! 받은 바이트는 임시 파일에 쓴 뒤 rename 하므로, 플러그인 디렉토리에는
//! 완전한 아티팩트만 나타난다. 자동 재시도는 하지 않는다.

use super::manifest::{artifact_file_name, PluginManifest};
use super::types::{Artifact, Plugin};
use async_trait::async_trait;
use easeci_foundation::{validate_plugin_identity, Error, RegistrySettings, Result};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Semaphore;
use tracing::{debug, info};

// ============================================================================
// ArtifactSource - 아티팩트 공급원
// ============================================================================

/// (name, version)으로 아티팩트 바이트를 가져오는 공급원
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// 공급원 이름 (로그용)
    fn name(&self) -> &str;

    /// 아티팩트 바이트 조회
    async fn fetch(&self, name: &str, version: &str) -> Result<Vec<u8>>;
}

// ============================================================================
// RegistryClient - HTTP 레지스트리
// ============================================================================

/// 업데이트 확인 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    pub name: String,
    pub current: String,
    pub latest: String,
    pub update_available: bool,
}

/// `GET /api/v1/plugin/{name}/latest` 응답
#[derive(Debug, Deserialize)]
struct LatestRelease {
    version: String,
}

/// 원격 플러그인 레지스트리 클라이언트
pub struct RegistryClient {
    base_url: String,
    client: Client,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("easeci-plugins/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_settings(settings: &RegistrySettings) -> Result<Self> {
        Self::new(&settings.url, settings.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/api/v1/plugin/{name}/{version}` - 이름과 버전은 세그먼트 단위로 인코딩
    fn plugin_url(&self, name: &str, version: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid registry url {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Registry url {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v1", "plugin", name, version]);
        Ok(url)
    }

    /// 최신 버전 조회 후 현재 버전과 비교
    pub async fn check_for_update(&self, name: &str, version: &str) -> Result<UpdateCheck> {
        let url = self.plugin_url(name, "latest")?;
        debug!("Checking for update: {}", url);

        let response = self.client.get(url).send().await.map_err(http_error)?;
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "Update check for {} failed: HTTP {}",
                name,
                response.status()
            )));
        }

        let latest: LatestRelease = response.json().await.map_err(http_error)?;
        let update_available = latest.version != version;
        if update_available {
            info!("Update available for {}: {} -> {}", name, version, latest.version);
        }

        Ok(UpdateCheck {
            name: name.to_string(),
            current: version.to_string(),
            latest: latest.version,
            update_available,
        })
    }
}

#[async_trait]
impl ArtifactSource for RegistryClient {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn fetch(&self, name: &str, version: &str) -> Result<Vec<u8>> {
        let url = self.plugin_url(name, version)?;
        debug!("Downloading {}", url);

        let response = self.client.get(url).send().await.map_err(http_error)?;
        if !response.status().is_success() {
            return Err(Error::download(
                format!("{}:{}", name, version),
                format!("HTTP {}", response.status()),
            ));
        }

        let bytes = response.bytes().await.map_err(http_error)?;
        Ok(bytes.to_vec())
    }
}

fn http_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

// ============================================================================
// PluginDownloader
// ============================================================================

/// 플러그인 다운로더
pub struct PluginDownloader {
    source: Arc<dyn ArtifactSource>,

    /// 다운로드 대상 디렉토리
    destination: PathBuf,

    /// 아티팩트 하나당 타임아웃
    timeout: Duration,

    /// 동시 다운로드 상한 (None = 제한 없음)
    limiter: Option<Arc<Semaphore>>,
}

impl PluginDownloader {
    pub fn new(source: Arc<dyn ArtifactSource>, destination: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            source,
            destination: destination.into(),
            timeout,
            limiter: None,
        }
    }

    /// 동시 다운로드 상한 설정
    pub fn with_max_concurrent(mut self, max: Option<usize>) -> Self {
        self.limiter = max.filter(|n| *n > 0).map(|n| Arc::new(Semaphore::new(n)));
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// 아티팩트를 받아 대상 디렉토리에 저장하고 stored_locally = true인 Plugin 반환
    ///
    /// 이름이나 버전이 단일 경로 세그먼트가 아니면 요청 전에 거부한다.
    pub async fn download(&self, plugin: Plugin) -> Result<Plugin> {
        if plugin.is_stored_locally() {
            return Err(Error::ContractViolation(format!(
                "{} is already stored locally",
                plugin.short_name()
            )));
        }
        validate_plugin_identity(&plugin.name, &plugin.version)?;

        let _permit = match &self.limiter {
            Some(limiter) => Some(
                limiter
                    .acquire()
                    .await
                    .map_err(|e| Error::Internal(e.to_string()))?,
            ),
            None => None,
        };

        let short_name = plugin.short_name();
        info!("Downloading plugin {} from {}", short_name, self.source.name());

        let bytes = tokio::time::timeout(self.timeout, self.source.fetch(&plugin.name, &plugin.version))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "Download of {} exceeded {}ms",
                    short_name,
                    self.timeout.as_millis()
                ))
            })??;

        let manifest = PluginManifest::from_artifact_bytes(&bytes)
            .map_err(|e| Error::download(&short_name, e.to_string()))?;
        if manifest.name != plugin.name || manifest.version != plugin.version {
            return Err(Error::download(
                &short_name,
                format!(
                    "artifact describes {}:{} instead",
                    manifest.name, manifest.version
                ),
            ));
        }
        let contract_type = manifest.contract_type()?;

        let path = self.store(&plugin, &bytes).await?;
        info!("Downloaded plugin {} to {:?} ({} bytes)", short_name, path, bytes.len());

        Ok(Plugin {
            contract_type: Some(contract_type),
            artifact: Artifact {
                path: Some(path),
                stored_locally: true,
                manifest: Some(manifest),
            },
            ..plugin
        })
    }

    /// 임시 파일에 쓴 뒤 rename
    async fn store(&self, plugin: &Plugin, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.destination).await?;

        let file_name = artifact_file_name(&plugin.name, &plugin.version);
        let path = self.destination.join(&file_name);
        let partial = self.destination.join(format!(".{}.part", file_name));

        fs::write(&partial, bytes).await?;
        if let Err(e) = fs::rename(&partial, &path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::manifest::ContractType;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct MemorySource {
        artifacts: HashMap<(String, String), Vec<u8>>,
        delay: Duration,
        fetches: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MemorySource {
        fn new(artifacts: HashMap<(String, String), Vec<u8>>, delay: Duration) -> Self {
            Self {
                artifacts,
                delay,
                fetches: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ArtifactSource for MemorySource {
        fn name(&self) -> &str {
            "memory"
        }

        async fn fetch(&self, name: &str, version: &str) -> Result<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.artifacts
                .get(&(name.to_string(), version.to_string()))
                .cloned()
                .ok_or_else(|| Error::download(format!("{}:{}", name, version), "HTTP 404"))
        }
    }

    fn source_with(name: &str, version: &str, delay: Duration) -> Arc<MemorySource> {
        source_with_all(&[(name, version)], delay)
    }

    fn source_with_all(plugins: &[(&str, &str)], delay: Duration) -> Arc<MemorySource> {
        let artifacts = plugins
            .iter()
            .map(|(name, version)| {
                let manifest =
                    PluginManifest::new(*name, *version, ContractType::Standalone, "alpha.main");
                ((name.to_string(), version.to_string()), manifest.pack(&[]).unwrap())
            })
            .collect();
        Arc::new(MemorySource::new(artifacts, delay))
    }

    #[tokio::test]
    async fn test_download_stores_artifact() {
        let temp = TempDir::new().unwrap();
        let downloader = PluginDownloader::new(
            source_with("alpha", "1.0", Duration::ZERO),
            temp.path(),
            Duration::from_secs(5),
        )
        .with_max_concurrent(Some(2));

        let plugin = downloader.download(Plugin::unresolved("alpha", "1.0")).await.unwrap();

        assert!(plugin.is_stored_locally());
        assert_eq!(plugin.contract_type, Some(ContractType::Standalone));
        assert_eq!(plugin.artifact.path, Some(temp.path().join("alpha-1.0.plugin")));
        assert!(temp.path().join("alpha-1.0.plugin").is_file());
        assert!(!temp.path().join(".alpha-1.0.plugin.part").exists());
    }

    #[tokio::test]
    async fn test_download_local_plugin_is_violation() {
        let temp = TempDir::new().unwrap();
        let downloader = PluginDownloader::new(
            source_with("alpha", "1.0", Duration::ZERO),
            temp.path(),
            Duration::from_secs(5),
        );

        let manifest = PluginManifest::new("alpha", "1.0", ContractType::Standalone, "alpha.main");
        let local = Plugin::resolved(temp.path().join("alpha-1.0.plugin"), manifest).unwrap();

        let result = downloader.download(local).await;
        assert!(matches!(result, Err(Error::ContractViolation(_))));
    }

    #[tokio::test]
    async fn test_download_timeout() {
        let temp = TempDir::new().unwrap();
        let downloader = PluginDownloader::new(
            source_with("alpha", "1.0", Duration::from_secs(5)),
            temp.path(),
            Duration::from_millis(20),
        );

        let result = downloader.download(Plugin::unresolved("alpha", "1.0")).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert!(!temp.path().join("alpha-1.0.plugin").exists());
    }

    #[tokio::test]
    async fn test_download_missing_and_mismatch() {
        let temp = TempDir::new().unwrap();
        let downloader = PluginDownloader::new(
            source_with("alpha", "1.0", Duration::ZERO),
            temp.path(),
            Duration::from_secs(5),
        );

        let missing = downloader.download(Plugin::unresolved("beta", "1.0")).await;
        assert!(matches!(missing, Err(Error::Download { .. })));

        let mut mismatch = HashMap::new();
        mismatch.insert(
            ("alpha".to_string(), "2.0".to_string()),
            PluginManifest::new("alpha", "1.0", ContractType::Extension, "x")
                .pack(&[])
                .unwrap(),
        );
        let downloader = PluginDownloader::new(
            Arc::new(MemorySource::new(mismatch, Duration::ZERO)),
            temp.path(),
            Duration::from_secs(5),
        );
        let result = downloader.download(Plugin::unresolved("alpha", "2.0")).await;
        assert!(matches!(result, Err(Error::Download { .. })));
    }

    #[test]
    fn test_registry_urls() {
        let client = RegistryClient::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.plugin_url("alpha", "1.0").unwrap().as_str(),
            "http://localhost:8080/api/v1/plugin/alpha/1.0"
        );
        assert_eq!(
            client.plugin_url("my plugin", "1.0#rc").unwrap().as_str(),
            "http://localhost:8080/api/v1/plugin/my%20plugin/1.0%23rc"
        );

        let nested = RegistryClient::new("https://registry.example/easeci", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            nested.plugin_url("alpha", "latest").unwrap().as_str(),
            "https://registry.example/easeci/api/v1/plugin/alpha/latest"
        );

        let invalid = RegistryClient::new("not a url", Duration::from_secs(1)).unwrap();
        assert!(matches!(invalid.plugin_url("alpha", "1.0"), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_download_rejects_path_like_identity() {
        let temp = TempDir::new().unwrap();
        let destination = temp.path().join("plugins");
        let source = source_with("alpha", "1.0", Duration::ZERO);
        let downloader = PluginDownloader::new(source.clone(), &destination, Duration::from_secs(5));

        for (name, version) in [("../evil", "1.0"), ("alpha", "../../1.0"), ("a\\b", "1.0")] {
            let result = downloader.download(Plugin::unresolved(name, version)).await;
            assert!(matches!(result, Err(Error::InvalidInput(_))), "{}:{}", name, version);
        }

        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
        assert!(!temp.path().join("evil-1.0.plugin").exists());
        assert!(!destination.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_download_respects_concurrency_limit() {
        let temp = TempDir::new().unwrap();
        let source = source_with_all(
            &[("p0", "1.0"), ("p1", "1.0"), ("p2", "1.0"), ("p3", "1.0"), ("p4", "1.0")],
            Duration::from_millis(50),
        );
        let downloader = Arc::new(
            PluginDownloader::new(source.clone(), temp.path(), Duration::from_secs(5))
                .with_max_concurrent(Some(2)),
        );

        let tasks: Vec<_> = (0..5)
            .map(|i| {
                let downloader = Arc::clone(&downloader);
                tokio::spawn(async move {
                    downloader
                        .download(Plugin::unresolved(format!("p{}", i), "1.0"))
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_stored_locally());
        }

        assert_eq!(source.fetches.load(Ordering::SeqCst), 5);
        let max = source.max_in_flight.load(Ordering::SeqCst);
        assert!((1..=2).contains(&max), "{} downloads ran at once", max);
        assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
    }
}
