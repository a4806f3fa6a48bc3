//! Extension Manager - 플러그인 라이프사이클 오케스트레이터
//!
//! - 부팅 시 일괄 활성화 (해석 → 로드 → 누락된 플러그인 다운로드 파이프라인)
//! - 플러그인 단위 startup / shutdown / restart
//!
//! 프로세스 진입점(main)이 하나를 만들어 clone으로 공유한다. 모든 필드는 `Arc`.
//! 같은 (계약 타입, UUID)에 대한 startup / shutdown / restart / stop_all은 하나씩 순서대로 실행된다.

use super::action::{ActionRequest, ActionResponse};
use super::container::{ContainerState, PluginContainer};
use super::discovery::PluginResolver;
use super::events::{EventBus, PluginEvent};
use super::factory::{BuiltinFactory, PluginFactory};
use super::infrastructure::PluginInfrastructure;
use super::installer::{ArtifactSource, PluginDownloader, RegistryClient, UpdateCheck};
use super::instance::{Instance, InstanceId};
use super::loader::PluginLoader;
use super::manifest::ContractType;
use super::store::{ConfigDescriptor, PluginConfig};
use super::types::Plugin;
use easeci_foundation::{Error, PluginsSettings, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ============================================================================
// BootReport - enable_extensions 결과
// ============================================================================

/// 다운로드 파이프라인 태스크
pub type DownloadTask = JoinHandle<Result<ActionResponse>>;

/// 부팅 결과 보고서
pub struct BootReport {
    /// 디스크에서 찾은 선언 플러그인
    pub resolved: HashSet<Plugin>,

    /// 해석됐지만 로드되지 않은 플러그인
    pub not_loaded: HashSet<Plugin>,

    /// 선언됐지만 디스크에 없는 플러그인
    pub unresolved: HashSet<Plugin>,

    downloads: Vec<(Plugin, DownloadTask)>,
}

impl BootReport {
    /// 진행 중인 다운로드 파이프라인 수
    pub fn pending_downloads(&self) -> usize {
        self.downloads.len()
    }

    /// 모든 다운로드 파이프라인이 끝날 때까지 대기
    pub async fn wait_downloads(&mut self) -> Vec<(Plugin, Result<ActionResponse>)> {
        let (plugins, tasks): (Vec<Plugin>, Vec<DownloadTask>) = self.downloads.drain(..).unzip();
        let joined = futures::future::join_all(tasks).await;

        plugins
            .into_iter()
            .zip(joined)
            .map(|(plugin, joined)| {
                let result = joined.unwrap_or_else(|e| {
                    Err(Error::Internal(format!("Download task failed: {}", e)))
                });
                (plugin, result)
            })
            .collect()
    }

    /// 사람이 읽을 수 있는 요약
    pub fn summary(&self) -> String {
        let mut resolved: Vec<String> = self.resolved.iter().map(Plugin::to_string).collect();
        resolved.sort();
        format!(
            "{} resolved, {} not loaded, {} unresolved, {} downloading\n{}",
            self.resolved.len(),
            self.not_loaded.len(),
            self.unresolved.len(),
            self.downloads.len(),
            resolved.join("\n")
        )
    }
}

// ============================================================================
// ExtensionManagerBuilder
// ============================================================================

/// 매니저 빌더
pub struct ExtensionManagerBuilder {
    settings: PluginsSettings,
    factory: Option<Arc<dyn PluginFactory>>,
    source: Option<Arc<dyn ArtifactSource>>,
    events: Option<Arc<EventBus>>,
}

impl ExtensionManagerBuilder {
    /// 플러그인 객체 팩토리 (기본: 빈 BuiltinFactory)
    pub fn factory(mut self, factory: Arc<dyn PluginFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// 아티팩트 공급원 (기본: plugins.registry 설정의 RegistryClient)
    pub fn artifact_source(mut self, source: Arc<dyn ArtifactSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// 매니저 생성
    ///
    /// 디렉토리 준비 실패는 로그만 남기고 계속 진행한다.
    /// 설정 파일을 읽을 수 없거나 레지스트리 클라이언트를 만들 수 없으면 에러.
    pub async fn build(self) -> Result<ExtensionManager> {
        info!("ExtensionManager instance creation started");
        let settings = self.settings;

        let infrastructure = PluginInfrastructure::from_settings(&settings);
        if let Err(e) = infrastructure.prepare().await {
            warn!("Plugin infrastructure is not fully prepared, continuing degraded: {}", e);
        }

        let config = PluginConfig::open(&settings.config_file).await?;
        let registry = Arc::new(RegistryClient::from_settings(&settings.registry)?);
        let source: Arc<dyn ArtifactSource> = match self.source {
            Some(source) => source,
            None => registry.clone(),
        };

        let destination = infrastructure
            .download_dir()
            .unwrap_or_else(|| settings.download_dir())
            .to_path_buf();
        let downloader = PluginDownloader::new(source, destination, settings.registry.timeout())
            .with_max_concurrent(settings.download.max_concurrent);

        let events = self.events.unwrap_or_default();
        let container = Arc::new(PluginContainer::new());
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(BuiltinFactory::new()));
        let loader = PluginLoader::new(factory, Arc::clone(&container), Arc::clone(&events));

        Ok(ExtensionManager {
            settings: Arc::new(settings),
            infrastructure: Arc::new(infrastructure),
            config: Arc::new(config),
            container,
            resolver: PluginResolver::new(),
            loader: Arc::new(loader),
            downloader: Arc::new(downloader),
            registry,
            events,
            lifecycle: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

// ============================================================================
// ExtensionManager
// ============================================================================

/// 확장 매니저
#[derive(Clone)]
pub struct ExtensionManager {
    settings: Arc<PluginsSettings>,
    infrastructure: Arc<PluginInfrastructure>,
    config: Arc<PluginConfig>,
    container: Arc<PluginContainer>,
    resolver: PluginResolver,
    loader: Arc<PluginLoader>,
    downloader: Arc<PluginDownloader>,
    registry: Arc<RegistryClient>,
    events: Arc<EventBus>,

    /// (계약 타입, UUID)별 라이프사이클 락
    lifecycle: Arc<Mutex<HashMap<(ContractType, Uuid), Arc<Mutex<()>>>>>,
}

impl ExtensionManager {
    pub fn builder(settings: PluginsSettings) -> ExtensionManagerBuilder {
        ExtensionManagerBuilder {
            settings,
            factory: None,
            source: None,
            events: None,
        }
    }

    // ========================================================================
    // 부팅
    // ========================================================================

    /// 선언된 플러그인 일괄 활성화
    ///
    /// 디스크에 없는 플러그인은 다운로드가 켜져 있으면 플러그인마다
    /// 다운로드 → 재해석 → 설정 등록 → 로드 → startup 파이프라인을 띄운다.
    pub async fn enable_extensions(&self) -> BootReport {
        info!("Declared plugins enabling started");
        let declared = &self.settings.declared;

        let resolved = self
            .resolver
            .resolve_declared(declared, &self.infrastructure)
            .await;
        let not_loaded = self.loader.load_all(&resolved, &self.config).await;
        let unresolved = PluginResolver::unresolved(declared, &resolved);

        let downloads = if unresolved.is_empty() {
            Vec::new()
        } else if self.settings.download.enabled {
            self.download_in_flight(&unresolved)
        } else {
            info!(
                "{} declared plugins are missing and downloading is disabled",
                unresolved.len()
            );
            Vec::new()
        };

        let report = BootReport {
            resolved,
            not_loaded,
            unresolved,
            downloads,
        };
        if report.not_loaded.is_empty() && report.unresolved.is_empty() {
            info!("All plugins were loaded correctly. Report: {}", report.summary());
        }
        report
    }

    /// 로드만 되고 아직 시작되지 않은 Standalone 플러그인 시작
    pub async fn start_loaded(&self) -> Result<ActionResponse> {
        let mut response = ActionResponse::of(true, Vec::new());
        for instance in self.container.list(ContractType::Standalone).await {
            if instance.is_running() {
                continue;
            }
            let request = request_for(&instance);
            response = response.then(self.startup(&request).await?);
        }
        Ok(response)
    }

    /// 실행 중인 모든 플러그인 정지 (설정은 건드리지 않음)
    pub async fn stop_all(&self) -> Result<ActionResponse> {
        let mut response = ActionResponse::of(true, Vec::new());
        for contract in ContractType::ALL {
            for listed in self.container.list(contract).await {
                let _guard = self.lock_lifecycle(contract, listed.uuid()).await;
                let Some(instance) = self.container.find_by_uuid(contract, listed.uuid()).await
                else {
                    continue;
                };
                if instance.is_running() {
                    response = response.then(self.stop_instance(&instance).await?);
                }
            }
        }
        Ok(response)
    }

    // ========================================================================
    // 단일 플러그인 제어
    // ========================================================================

    /// 계약 타입별 컨테이너 집계
    pub async fn state(&self, contract: ContractType) -> ContainerState {
        self.container.state(contract).await
    }

    /// 플러그인 시작
    ///
    /// 이미 실행 중이면 다시 띄우지 않고 성공. 아니면 객체를 새로 만들고
    /// Standalone은 전용 태스크에서 `start()`를 호출한 뒤 설정에 enabled = true를 저장한다.
    pub async fn startup(&self, request: &ActionRequest) -> Result<ActionResponse> {
        let _guard = self
            .lock_lifecycle(request.extension_type, request.plugin_uuid)
            .await;
        self.startup_locked(request).await
    }

    async fn startup_locked(&self, request: &ActionRequest) -> Result<ActionResponse> {
        info!("Trying to start plugin identified by UUID: {}", request.plugin_uuid);

        let Some(instance) = self
            .container
            .find_by_uuid(request.extension_type, request.plugin_uuid)
            .await
        else {
            error!("Cannot find instance by UUID: {}", request.plugin_uuid);
            return Ok(ActionResponse::failure(format!(
                "Cannot find plugin to startup: {}",
                request
            )));
        };

        let short_name = instance.plugin().short_name();
        if instance.is_running() {
            return Ok(ActionResponse::success(format!(
                "Plugin {} is already running",
                short_name
            )));
        }

        let instance = match self.loader.reinstantiate(&instance, &self.config).await {
            Ok(instance) => instance,
            Err(e) => {
                warn!("Plugin {} could not be reinstantiated: {}", short_name, e);
                return Ok(ActionResponse::failure(format!(
                    "Plugin {} could not be instantiated: {}",
                    short_name, e
                )));
            }
        };

        let launched = match instance.contract_type() {
            ContractType::Standalone => self.launch_standalone(&instance).await?,
            ContractType::Extension => {
                if let Some(object) = instance.object() {
                    object.to_extension()?;
                }
                info!(
                    "Extension plugin {} is active ({})",
                    short_name,
                    instance.identity()
                );
                self.events
                    .publish(PluginEvent::started(&short_name, instance.uuid()))
                    .await;
                ActionResponse::success(format!("Plugin {} is active", short_name))
            }
        };

        let configured = self.set_enabled_in_config(&instance, true).await;
        Ok(launched.then(configured))
    }

    /// 플러그인 정지
    ///
    /// 정지 단계와 설정 단계(enabled = false 저장)를 항상 둘 다 실행한다.
    /// 성공은 두 단계의 AND이고, 메시지는 설정 단계 → 정지 단계 순이다.
    pub async fn shutdown(&self, request: &ActionRequest) -> Result<ActionResponse> {
        let _guard = self
            .lock_lifecycle(request.extension_type, request.plugin_uuid)
            .await;
        self.shutdown_locked(request).await
    }

    async fn shutdown_locked(&self, request: &ActionRequest) -> Result<ActionResponse> {
        info!("Trying to finish plugin identified by UUID: {}", request.plugin_uuid);

        let Some(instance) = self
            .container
            .find_by_uuid(request.extension_type, request.plugin_uuid)
            .await
        else {
            return Ok(ActionResponse::failure(format!(
                "Cannot find plugin to shutdown: {}",
                request
            )));
        };

        let stopped = self.stop_instance(&instance).await?;
        let configured = self.set_enabled_in_config(&instance, false).await;
        Ok(ActionResponse::fold(stopped, configured))
    }

    /// shutdown 후 startup - 메시지는 호출 순서대로, 두 단계 사이에 다른 요청이 끼어들지 않는다
    pub async fn restart(&self, request: &ActionRequest) -> Result<ActionResponse> {
        let _guard = self
            .lock_lifecycle(request.extension_type, request.plugin_uuid)
            .await;
        let stopped = self.shutdown_locked(request).await?;
        let started = self.startup_locked(request).await?;
        Ok(stopped.then(started))
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub async fn find_instance_by_identity(&self, identity: InstanceId) -> Option<Instance> {
        self.container.find_by_identity(identity).await
    }

    pub async fn find_instance(&self, contract: ContractType, uuid: Uuid) -> Option<Instance> {
        self.container.find_by_uuid(contract, uuid).await
    }

    pub async fn instances(&self, contract: ContractType) -> Vec<Instance> {
        self.container.list(contract).await
    }

    /// 레지스트리에서 최신 버전 확인
    pub async fn check_for_update(&self, name: &str, version: &str) -> Result<UpdateCheck> {
        self.registry.check_for_update(name, version).await
    }

    /// 선언된 플러그인 해석만 수행 (로드하지 않음)
    pub async fn resolve(&self) -> (HashSet<Plugin>, HashSet<Plugin>) {
        let declared = &self.settings.declared;
        let resolved = self
            .resolver
            .resolve_declared(declared, &self.infrastructure)
            .await;
        let unresolved = PluginResolver::unresolved(declared, &resolved);
        (resolved, unresolved)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn config(&self) -> &Arc<PluginConfig> {
        &self.config
    }

    pub fn settings(&self) -> &PluginsSettings {
        &self.settings
    }

    // ========================================================================
    // 내부 단계
    // ========================================================================

    /// (계약 타입, UUID) 단위 라이프사이클 락 획득
    async fn lock_lifecycle(&self, contract: ContractType, uuid: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.lifecycle.lock().await;
            Arc::clone(locks.entry((contract, uuid)).or_default())
        };
        lock.lock_owned().await
    }

    /// Standalone 플러그인을 전용 태스크에서 시작하고 started + 태스크 바인딩
    async fn launch_standalone(&self, instance: &Instance) -> Result<ActionResponse> {
        let short_name = instance.plugin().short_name();
        let Some(object) = instance.object() else {
            return Ok(ActionResponse::failure(format!(
                "Plugin {} has no live object to start",
                short_name
            )));
        };
        let plugin = object.to_standalone()?;

        let task_plugin = Arc::clone(&plugin);
        let task_name = short_name.clone();
        let handle = tokio::spawn(async move {
            debug!("Standalone plugin {} task running", task_name);
            match task_plugin.start().await {
                Ok(()) => debug!("Standalone plugin {} start() returned", task_name),
                Err(e) => warn!("Standalone plugin {} finished with error: {}", task_name, e),
            }
        });

        let bound = self
            .container
            .update(
                instance.contract_type(),
                instance.uuid(),
                instance.identity(),
                |i| {
                    i.set_started(true);
                    i.bind_task(handle)
                },
            )
            .await;

        match bound {
            Some((_, snapshot)) => {
                info!(
                    "Standalone plugin {} ({}) is running on a dedicated task",
                    short_name,
                    snapshot.identity()
                );
                self.events
                    .publish(PluginEvent::started(&short_name, instance.uuid()))
                    .await;
                Ok(ActionResponse::success(format!(
                    "Plugin {} is started on a dedicated task",
                    short_name
                )))
            }
            None => {
                warn!("Plugin {} was replaced or removed while starting", short_name);
                if let Err(e) = plugin.stop().await {
                    warn!("Orphaned plugin {} did not stop: {}", short_name, e);
                }
                Ok(ActionResponse::failure(format!(
                    "Plugin {} was replaced or removed while starting",
                    short_name
                )))
            }
        }
    }

    /// 정지 단계 - Standalone은 stop() 후 해제, Extension은 해제만
    async fn stop_instance(&self, instance: &Instance) -> Result<ActionResponse> {
        let short_name = instance.plugin().short_name();
        let (contract, uuid) = (instance.contract_type(), instance.uuid());
        let identity = instance.identity();

        let Some(object) = instance.object() else {
            return Ok(ActionResponse::success(format!(
                "Plugin {} was already stopped",
                short_name
            )));
        };

        let response = match contract {
            ContractType::Standalone => {
                info!("Stopping standalone plugin {}", short_name);
                let plugin = object.to_standalone()?;
                let stopped = plugin.stop().await;
                let cleared = self
                    .container
                    .update(contract, uuid, identity, Instance::clear)
                    .await;

                match (stopped, cleared) {
                    (Ok(()), Some(_)) => ActionResponse::success(format!(
                        "Plugin {} is stopped by stop() method",
                        short_name
                    )),
                    (Err(e), _) => ActionResponse::failure(format!(
                        "Plugin {} was not stopped correctly: {}",
                        short_name, e
                    )),
                    (Ok(()), None) => ActionResponse::failure(format!(
                        "Plugin {} was not stopped correctly",
                        short_name
                    )),
                }
            }
            ContractType::Extension => {
                info!("Releasing extension plugin {}", short_name);
                object.to_extension()?;
                match self
                    .container
                    .update(contract, uuid, identity, Instance::clear)
                    .await
                {
                    Some(_) => ActionResponse::success(format!(
                        "Plugin {} was released from memory",
                        short_name
                    )),
                    None => ActionResponse::failure(format!(
                        "Plugin {} was not removed",
                        short_name
                    )),
                }
            }
        };

        if response.success {
            self.events
                .publish(PluginEvent::stopped(&short_name, uuid))
                .await;
        }
        Ok(response)
    }

    /// 설정 단계 - enabled 변경 + 저장
    async fn set_enabled_in_config(&self, instance: &Instance, enabled: bool) -> ActionResponse {
        let plugin = instance.plugin();
        let short_name = plugin.short_name();

        if !self
            .config
            .set_enabled(&plugin.name, &plugin.version, enabled)
            .await
        {
            return ActionResponse::failure(format!(
                "Config file was not modified, no descriptor for {}",
                short_name
            ));
        }

        match self.save_config(&short_name).await {
            Ok(()) => ActionResponse::success(format!(
                "Config file was modified correctly, and plugin {} was {}",
                short_name,
                if enabled { "enabled" } else { "disabled" }
            )),
            Err(e) => ActionResponse::failure(format!("Config file was not modified: {}", e)),
        }
    }

    /// 설정 저장 - 실패는 critical 로그 + 이벤트
    async fn save_config(&self, short_name: &str) -> Result<()> {
        if let Err(e) = self.config.save().await {
            error!("Critical plugin system failure while saving config for {}: {}", short_name, e);
            self.events
                .publish(PluginEvent::critical(short_name, &e.to_string()))
                .await;
            return Err(e);
        }
        Ok(())
    }

    // ========================================================================
    // 다운로드 파이프라인
    // ========================================================================

    fn download_in_flight(&self, unresolved: &HashSet<Plugin>) -> Vec<(Plugin, DownloadTask)> {
        let mut candidates: Vec<Plugin> = unresolved
            .iter()
            .filter(|p| p.downloadable && !p.is_stored_locally())
            .cloned()
            .collect();
        candidates.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));

        info!(
            "Downloading of plugins just started for items: {}",
            candidates
                .iter()
                .map(Plugin::short_name)
                .collect::<Vec<_>>()
                .join(", ")
        );

        candidates
            .into_iter()
            .map(|plugin| {
                let manager = self.clone();
                let target = plugin.clone();
                let task = tokio::spawn(async move {
                    let short_name = target.short_name();
                    let result = manager.install(target).await;
                    if let Err(e) = &result {
                        warn!("Plugin {} was not installed: {}", short_name, e);
                    }
                    result
                });
                (plugin, task)
            })
            .collect()
    }

    /// 다운로드 → 재해석 → 설정 등록/저장 → 로드 → startup
    async fn install(&self, plugin: Plugin) -> Result<ActionResponse> {
        let short_name = plugin.short_name();

        let downloaded = match self.downloader.download(plugin).await {
            Ok(downloaded) => downloaded,
            Err(e) => {
                self.events
                    .publish(PluginEvent::download_failed(&short_name, &e.to_string()))
                    .await;
                return Err(e);
            }
        };
        if let Some(path) = &downloaded.artifact.path {
            self.events
                .publish(PluginEvent::download_completed(&short_name, path))
                .await;
        }

        let resolved = self
            .resolver
            .resolve_by_identity(&self.infrastructure, &downloaded.name, &downloaded.version)
            .await?;
        let contract = resolved
            .contract_type
            .ok_or_else(|| Error::load(&short_name, "contract type is unknown"))?;

        let descriptor = match self.config.find(&resolved.name, &resolved.version).await {
            Some(existing) => existing,
            None => {
                let descriptor = ConfigDescriptor::new(&resolved.name, &resolved.version)
                    .enabled(self.settings.download.auto_enable);
                self.config.add(contract, descriptor.clone()).await;
                self.save_config(&short_name).await?;
                descriptor
            }
        };

        if !descriptor.enabled {
            info!("Plugin {} was downloaded and registered as disabled", short_name);
            return Ok(ActionResponse::success(format!(
                "Plugin {} was downloaded and registered as disabled",
                short_name
            )));
        }

        if let Err(e) = self.loader.load(&resolved, &self.config).await {
            info!("Downloaded but not loaded: {}", short_name);
            return Err(e);
        }

        let request = ActionRequest::new(contract, descriptor.uuid, &resolved.name, &resolved.version);
        let response = self.startup(&request).await?;
        if response.success {
            info!("Plugin {} correctly installed in EaseCI system", short_name);
        }
        Ok(response)
    }
}

fn request_for(instance: &Instance) -> ActionRequest {
    let plugin = instance.plugin();
    ActionRequest::new(
        instance.contract_type(),
        instance.uuid(),
        &plugin.name,
        &plugin.version,
    )
}
