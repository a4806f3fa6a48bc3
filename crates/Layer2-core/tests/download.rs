//! 누락된 플러그인 다운로드 파이프라인 테스트

mod common;

use common::*;
use easeci_core::{
    artifact_file_name, ContractType, DeclaredPlugin, EventType, PluginConfig, PluginsSettings,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_download_install_and_start() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("plugins");
    let settings = PluginsSettings::new(&dir)
        .declare(DeclaredPlugin::new("alpha", "1.0"))
        .with_download(true);
    let config_file = settings.config_file.clone();

    let registry = Arc::new(MemoryRegistry::default().with(
        "alpha",
        "1.0",
        ContractType::Standalone,
        WORKER_ENTRY,
    ));
    let hooks = Arc::new(HookCounter::default());
    let manager = manager_with_registry(settings, &hooks, Arc::clone(&registry)).await;

    let mut report = manager.enable_extensions().await;
    assert!(report.resolved.is_empty());
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.pending_downloads(), 1);

    let results = report.wait_downloads().await;
    assert_eq!(results.len(), 1);
    let (plugin, result) = &results[0];
    assert_eq!(plugin.name, "alpha");
    let response = result.as_ref().unwrap();
    assert!(response.success, "{:?}", response.messages);
    assert_eq!(report.pending_downloads(), 0);

    tokio::time::timeout(Duration::from_secs(5), hooks.started.notified())
        .await
        .expect("downloaded plugin was not started");
    assert_eq!(hooks.starts(), 1);
    assert_eq!(registry.fetches.load(Ordering::SeqCst), 1);

    // 아티팩트가 첫 번째 플러그인 디렉토리에 저장됨
    assert!(dir.join(artifact_file_name("alpha", "1.0")).exists());

    // 새 UUID로 설정에 등록되고 enabled로 저장됨
    let persisted = PluginConfig::open(&config_file).await.unwrap();
    let descriptor = persisted.find("alpha", "1.0").await.unwrap();
    assert!(descriptor.enabled);
    assert!(!descriptor.uuid.is_nil());

    let instance = manager
        .find_instance(ContractType::Standalone, descriptor.uuid)
        .await
        .unwrap();
    assert!(instance.is_started());
    assert!(instance.has_task());
    assert!(instance.plugin().is_stored_locally());

    let events = manager.events();
    assert_eq!(events.history_by_type(EventType::DownloadCompleted).await.len(), 1);
    assert_eq!(events.history_by_type(EventType::PluginLoaded).await.len(), 1);
    assert_eq!(events.history_by_type(EventType::PluginStarted).await.len(), 1);

    manager.stop_all().await.unwrap();
}

#[tokio::test]
async fn test_download_failure_registers_nothing() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("plugins");
    let settings = PluginsSettings::new(&dir)
        .declare(DeclaredPlugin::new("beta", "2.0"))
        .with_download(true);

    let registry = Arc::new(MemoryRegistry::default());
    let hooks = Arc::new(HookCounter::default());
    let manager = manager_with_registry(settings, &hooks, Arc::clone(&registry)).await;

    let mut report = manager.enable_extensions().await;
    let results = report.wait_downloads().await;

    assert_eq!(results.len(), 1);
    assert!(results[0].1.is_err());
    assert!(manager.config().find("beta", "2.0").await.is_none());
    assert!(!dir.join(artifact_file_name("beta", "2.0")).exists());
    assert!(manager.instances(ContractType::Standalone).await.is_empty());

    let failed = manager
        .events()
        .history_by_type(EventType::DownloadFailed)
        .await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].plugin, "beta:2.0");
}

#[tokio::test]
async fn test_download_registers_disabled_without_auto_enable() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("plugins");
    let settings = PluginsSettings::new(&dir)
        .declare(DeclaredPlugin::new("gamma", "0.3"))
        .with_download(true)
        .with_auto_enable(false);
    let config_file = settings.config_file.clone();

    let registry = Arc::new(MemoryRegistry::default().with(
        "gamma",
        "0.3",
        ContractType::Extension,
        EXTENSION_ENTRY,
    ));
    let hooks = Arc::new(HookCounter::default());
    let manager = manager_with_registry(settings, &hooks, registry).await;

    let mut report = manager.enable_extensions().await;
    let results = report.wait_downloads().await;
    let response = results[0].1.as_ref().unwrap();

    assert!(response.success);
    assert!(response.messages[0].contains("registered as disabled"));

    let persisted = PluginConfig::open(&config_file).await.unwrap();
    assert!(!persisted.find("gamma", "0.3").await.unwrap().enabled);
    assert!(manager.instances(ContractType::Extension).await.is_empty());
    assert!(manager
        .events()
        .history_by_type(EventType::PluginLoaded)
        .await
        .is_empty());
}

#[tokio::test]
async fn test_download_reuses_existing_descriptor() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("plugins");
    let settings = PluginsSettings::new(&dir)
        .declare(DeclaredPlugin::new("beta", "2.0"))
        .with_download(true);

    let registry = Arc::new(MemoryRegistry::default().with(
        "beta",
        "2.0",
        ContractType::Extension,
        EXTENSION_ENTRY,
    ));
    let hooks = Arc::new(HookCounter::default());
    let manager = manager_with_registry(settings, &hooks, registry).await;
    let uuid = seed(&manager, ContractType::Extension, "beta", "2.0", true).await;

    let mut report = manager.enable_extensions().await;
    let results = report.wait_downloads().await;
    assert!(results[0].1.as_ref().unwrap().success);

    let instance = manager
        .find_instance(ContractType::Extension, uuid)
        .await
        .unwrap();
    assert!(instance.is_running());
    assert_eq!(manager.config().len().await, 1);
}

#[tokio::test]
async fn test_no_download_when_not_allowed() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("plugins");
    let registry = Arc::new(MemoryRegistry::default().with(
        "alpha",
        "1.0",
        ContractType::Standalone,
        WORKER_ENTRY,
    ));
    let hooks = Arc::new(HookCounter::default());

    // 선언이 downloadable: false
    let settings = PluginsSettings::new(&dir)
        .declare(DeclaredPlugin::new("alpha", "1.0").not_downloadable())
        .with_download(true);
    let manager = manager_with_registry(settings, &hooks, Arc::clone(&registry)).await;
    let mut report = manager.enable_extensions().await;
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.pending_downloads(), 0);
    assert!(report.wait_downloads().await.is_empty());

    // plugins.local.download: false
    let settings = PluginsSettings::new(&dir).declare(DeclaredPlugin::new("alpha", "1.0"));
    let manager = manager_with_registry(settings, &hooks, Arc::clone(&registry)).await;
    let report = manager.enable_extensions().await;
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.pending_downloads(), 0);

    assert_eq!(registry.fetches.load(Ordering::SeqCst), 0);
    assert!(!dir.join(artifact_file_name("alpha", "1.0")).exists());
}
