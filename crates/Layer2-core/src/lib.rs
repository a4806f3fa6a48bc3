//! easeci-core: Plugin lifecycle runtime for EaseCI
//!
//! Layer2 - 플러그인 해석/다운로드/로드/구동 레이어
//!
//! # 주요 모듈
//!
//! - `plugin`: 플러그인 라이프사이클 엔진 (ExtensionManager)
//!
//! # 사용 예시
//!
//! ```ignore
//! use easeci_core::{ActionRequest, ContractType, ExtensionManager};
//!
//! let manager = ExtensionManager::builder(settings).build().await?;
//! manager.enable_extensions().await;
//!
//! let response = manager
//!     .shutdown(&ActionRequest::new(ContractType::Standalone, uuid, "alpha", "1.0"))
//!     .await?;
//! println!("{:?}", response.messages);
//! ```

pub mod plugin;

// Re-exports: Plugin
pub use plugin::{
    artifact_file_name, ActionRequest, ActionResponse, Artifact, ArtifactSource, BootReport,
    BuiltinFactory, ConfigDescriptor, ContainerState, ContractType, EventBus, EventType,
    ExtensionManager, ExtensionManagerBuilder, ExtensionPlugin, Instance, InstanceId, Plugin,
    PluginConfig, PluginContainer, PluginDownloader, PluginEvent, PluginEventHandler,
    PluginFactory, PluginInfrastructure, PluginLoader, PluginManifest, PluginObject,
    PluginResolver, RegistryClient, StandalonePlugin, UpdateCheck,
};

// Re-exports: Foundation
pub use easeci_foundation::{DeclaredPlugin, Error, PluginsSettings, Result};
