//! 통합 테스트 공용 픽스처

#![allow(dead_code)]

use async_trait::async_trait;
use easeci_core::{
    artifact_file_name, ArtifactSource, BuiltinFactory, ConfigDescriptor, ContractType, Error,
    ExtensionManager, ExtensionPlugin, PluginManifest, PluginsSettings, Result, StandalonePlugin,
};
use std::any::Any;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

pub const WORKER_ENTRY: &str = "test.Worker";
pub const FAILING_WORKER_ENTRY: &str = "test.FailingWorker";
pub const ONESHOT_ENTRY: &str = "test.OneShotWorker";
pub const EXTENSION_ENTRY: &str = "test.Extension";

// ============================================================================
// 테스트 플러그인
// ============================================================================

/// 훅 호출 관찰용 공유 상태
#[derive(Default)]
pub struct HookCounter {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub started: Notify,
}

impl HookCounter {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

/// stop 신호가 올 때까지 start()가 반환하지 않는 Standalone 플러그인
pub struct Worker {
    hooks: Arc<HookCounter>,
    stop_signal: Notify,
    fail_stop: bool,
    one_shot: bool,
}

impl Worker {
    fn new(hooks: &Arc<HookCounter>) -> Self {
        Self {
            hooks: Arc::clone(hooks),
            stop_signal: Notify::new(),
            fail_stop: false,
            one_shot: false,
        }
    }
}

#[async_trait]
impl StandalonePlugin for Worker {
    async fn start(&self) -> Result<()> {
        self.hooks.starts.fetch_add(1, Ordering::SeqCst);
        self.hooks.started.notify_one();
        if !self.one_shot {
            self.stop_signal.notified().await;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.hooks.stops.fetch_add(1, Ordering::SeqCst);
        self.stop_signal.notify_one();
        if self.fail_stop {
            return Err(Error::Internal("stop hook failed".to_string()));
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct Passive;

impl ExtensionPlugin for Passive {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn factory(hooks: &Arc<HookCounter>) -> Arc<BuiltinFactory> {
    let worker_hooks = Arc::clone(hooks);
    let failing_hooks = Arc::clone(hooks);
    let one_shot_hooks = Arc::clone(hooks);
    Arc::new(
        BuiltinFactory::new()
            .with_standalone(WORKER_ENTRY, move || Worker::new(&worker_hooks))
            .with_standalone(FAILING_WORKER_ENTRY, move || Worker {
                fail_stop: true,
                ..Worker::new(&failing_hooks)
            })
            .with_standalone(ONESHOT_ENTRY, move || Worker {
                one_shot: true,
                ..Worker::new(&one_shot_hooks)
            })
            .with_extension(EXTENSION_ENTRY, || Passive),
    )
}

// ============================================================================
// 아티팩트 / 레지스트리
// ============================================================================

pub fn artifact(name: &str, version: &str, contract: ContractType, entry: &str) -> Vec<u8> {
    PluginManifest::new(name, version, contract, entry)
        .with_description("integration test plugin")
        .pack(&[])
        .unwrap()
}

pub fn write_artifact(dir: &Path, name: &str, version: &str, contract: ContractType, entry: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join(artifact_file_name(name, version)),
        artifact(name, version, contract, entry),
    )
    .unwrap();
}

/// 메모리 레지스트리
#[derive(Default)]
pub struct MemoryRegistry {
    artifacts: HashMap<(String, String), Vec<u8>>,
    pub fetches: AtomicUsize,
}

impl MemoryRegistry {
    pub fn with(mut self, name: &str, version: &str, contract: ContractType, entry: &str) -> Self {
        self.artifacts.insert(
            (name.to_string(), version.to_string()),
            artifact(name, version, contract, entry),
        );
        self
    }
}

#[async_trait]
impl ArtifactSource for MemoryRegistry {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, name: &str, version: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.artifacts
            .get(&(name.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| Error::download(format!("{}:{}", name, version), "HTTP 404"))
    }
}

// ============================================================================
// 매니저
// ============================================================================

pub async fn manager(settings: PluginsSettings, hooks: &Arc<HookCounter>) -> ExtensionManager {
    ExtensionManager::builder(settings)
        .factory(factory(hooks))
        .build()
        .await
        .unwrap()
}

pub async fn manager_with_registry(
    settings: PluginsSettings,
    hooks: &Arc<HookCounter>,
    registry: Arc<MemoryRegistry>,
) -> ExtensionManager {
    ExtensionManager::builder(settings)
        .factory(factory(hooks))
        .artifact_source(registry)
        .build()
        .await
        .unwrap()
}

/// 설정 바인딩 추가 후 UUID 반환
pub async fn seed(
    manager: &ExtensionManager,
    contract: ContractType,
    name: &str,
    version: &str,
    enabled: bool,
) -> Uuid {
    let descriptor = ConfigDescriptor::new(name, version).enabled(enabled);
    let uuid = descriptor.uuid;
    manager.config().add(contract, descriptor).await;
    uuid
}
