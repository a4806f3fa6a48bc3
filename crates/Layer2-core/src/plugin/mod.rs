//! # Plugin System
//!
//! EaseCI 플러그인 라이프사이클 엔진
//!
//! ## 개요
//!
//! 선언된 플러그인을 디스크에서 찾고, 없으면 레지스트리에서 받아오고,
//! 격리된 배치로 로드한 뒤 Standalone 플러그인은 전용 태스크에서 구동합니다.
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ExtensionManager                         │
//! │                                                             │
//! │  PluginResolver ──► PluginLoader ──► PluginContainer        │
//! │        ▲                 │                 ▲                │
//! │        │                 ▼                 │                │
//! │  PluginDownloader   PluginFactory     startup/shutdown      │
//! │        │                                   │                │
//! │        └──────────► PluginConfig ◄─────────┘                │
//! │                (plugins-config.json)                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 계약 타입
//!
//! 1. **Standalone**: 전용 태스크에서 `start()`, `stop()`으로 협조적 종료
//! 2. **Extension**: 로드 즉시 사용 가능
//!
//! ## 예시
//!
//! ```ignore
//! let factory = BuiltinFactory::new().with_standalone("acme.Worker", || Worker::new());
//! let manager = ExtensionManager::builder(PluginsSettings::load("plugins.yml")?)
//!     .factory(Arc::new(factory))
//!     .build()
//!     .await?;
//!
//! let mut report = manager.enable_extensions().await;
//! report.wait_downloads().await;
//! manager.start_loaded().await?;
//! ```

mod action;
mod container;
mod discovery;
mod events;
mod factory;
mod infrastructure;
mod installer;
mod instance;
mod loader;
mod manager;
mod manifest;
mod store;
mod traits;
mod types;

pub use action::{ActionRequest, ActionResponse};
pub use container::{ContainerState, PluginContainer};
pub use discovery::PluginResolver;
pub use events::{EventBus, EventType, PluginEvent, PluginEventHandler};
pub use factory::{BuiltinFactory, Constructor, PluginFactory};
pub use infrastructure::PluginInfrastructure;
pub use installer::{ArtifactSource, PluginDownloader, RegistryClient, UpdateCheck};
pub use instance::{Instance, InstanceId};
pub use loader::PluginLoader;
pub use manager::{BootReport, DownloadTask, ExtensionManager, ExtensionManagerBuilder};
pub use manifest::{artifact_file_name, ContractType, PluginManifest, ARTIFACT_EXTENSION, MANIFEST_FILE};
pub use store::{ConfigDescriptor, PluginConfig};
pub use traits::{ExtensionPlugin, PluginObject, StandalonePlugin};
pub use types::{Artifact, Plugin};
