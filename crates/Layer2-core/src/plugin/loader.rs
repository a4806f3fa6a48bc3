//! Plugin Loader - 해석된 아티팩트 → 컨테이너의 인스턴스
//!
//! 플러그인 하나의 생성 실패(알 수 없는 엔트리, 계약 불일치, 생성자 에러/패닉)는
//! "로드되지 않음" 집합으로 보고되고 배치 전체를 멈추지 않는다.

use super::container::PluginContainer;
use super::events::{EventBus, PluginEvent};
use super::factory::PluginFactory;
use super::instance::Instance;
use super::store::PluginConfig;
use super::traits::PluginObject;
use super::types::Plugin;
use easeci_foundation::{Error, Result};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 플러그인 로더
pub struct PluginLoader {
    factory: Arc<dyn PluginFactory>,
    container: Arc<PluginContainer>,
    events: Arc<EventBus>,
}

impl PluginLoader {
    pub fn new(
        factory: Arc<dyn PluginFactory>,
        container: Arc<PluginContainer>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            factory,
            container,
            events,
        }
    }

    // ========================================================================
    // 배치 로드
    // ========================================================================

    /// 해석된 플러그인을 모두 로드하고, 로드되지 않은 것들을 돌려준다
    pub async fn load_all(&self, resolved: &HashSet<Plugin>, config: &PluginConfig) -> HashSet<Plugin> {
        let mut ordered: Vec<&Plugin> = resolved.iter().collect();
        ordered.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));

        let mut not_loaded = HashSet::new();
        for plugin in ordered {
            if let Err(e) = self.load(plugin, config).await {
                warn!("Plugin {} not loaded: {}", plugin.short_name(), e);
                not_loaded.insert(plugin.clone());
            }
        }

        info!(
            "Loaded {} of {} resolved plugins",
            resolved.len() - not_loaded.len(),
            resolved.len()
        );
        not_loaded
    }

    /// 플러그인 하나 로드 - 활성화된 설정 바인딩이 있어야 한다
    ///
    /// 같은 UUID로 이미 로드되어 있으면 기존 인스턴스를 그대로 돌려준다.
    pub async fn load(&self, plugin: &Plugin, config: &PluginConfig) -> Result<Instance> {
        let short_name = plugin.short_name();
        let contract = plugin
            .contract_type
            .ok_or_else(|| Error::load(&short_name, "plugin is not resolved"))?;

        let descriptor = config
            .find_enabled(&plugin.name, &plugin.version)
            .await
            .ok_or_else(|| Error::load(&short_name, "no enabled config descriptor"))?;

        if let Some(existing) = self.container.find_by_uuid(contract, descriptor.uuid).await {
            debug!("Plugin {} is already loaded as {}", short_name, descriptor.uuid);
            return Ok(existing);
        }

        let object = self.instantiate(plugin)?;
        let instance = Instance::new(plugin.clone(), descriptor.uuid, object);
        self.container.register(instance.clone()).await;
        self.events
            .publish(PluginEvent::loaded(&short_name, descriptor.uuid))
            .await;

        Ok(instance)
    }

    // ========================================================================
    // 재생성
    // ========================================================================

    /// 해제된 인스턴스의 객체를 다시 만들어 같은 UUID로 교체 등록
    ///
    /// 새 인스턴스는 started = false, 태스크 미바인딩, 새 식별 마커를 가진다.
    pub async fn reinstantiate(&self, existing: &Instance, config: &PluginConfig) -> Result<Instance> {
        let plugin = existing.plugin();
        if config.find(&plugin.name, &plugin.version).await.is_none() {
            return Err(Error::NotFound(format!(
                "Config descriptor for {}",
                plugin.short_name()
            )));
        }

        let object = self.instantiate(plugin)?;
        let instance = Instance::new(plugin.clone(), existing.uuid(), object);
        self.container.register(instance.clone()).await;

        debug!(
            "Reinstantiated plugin {} ({} -> {})",
            plugin.short_name(),
            existing.identity(),
            instance.identity()
        );
        Ok(instance)
    }

    // ========================================================================
    // 객체 생성
    // ========================================================================

    /// 팩토리로 객체 생성 - 패닉과 계약 불일치는 Load 에러로 변환
    fn instantiate(&self, plugin: &Plugin) -> Result<PluginObject> {
        let short_name = plugin.short_name();
        let manifest = plugin
            .manifest()
            .ok_or_else(|| Error::load(&short_name, "artifact has no manifest"))?;
        let expected = manifest.contract_type()?;

        let factory = &self.factory;
        let object = catch_unwind(AssertUnwindSafe(|| factory.create(manifest)))
            .map_err(|panic| Error::load(&short_name, panic_message(panic.as_ref())))?
            .map_err(|e| match e {
                Error::Load { .. } => e,
                other => Error::load(&short_name, other.to_string()),
            })?;

        if object.contract_type() != expected {
            return Err(Error::load(
                &short_name,
                format!(
                    "manifest declares {} but {} produced {}",
                    expected,
                    self.factory.name(),
                    object.contract_type()
                ),
            ));
        }

        Ok(object)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("constructor panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::factory::BuiltinFactory;
    use crate::plugin::manifest::{ContractType, PluginManifest};
    use crate::plugin::store::ConfigDescriptor;
    use crate::plugin::traits::ExtensionPlugin;
    use std::any::Any;
    use tempfile::TempDir;

    struct Noop;

    impl ExtensionPlugin for Noop {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn resolved(name: &str, entry: &str) -> Plugin {
        let manifest = PluginManifest::new(name, "1.0", ContractType::Extension, entry);
        Plugin::resolved(format!("/plugins/{}-1.0.plugin", name), manifest).unwrap()
    }

    fn factory() -> Arc<dyn PluginFactory> {
        let mut factory = BuiltinFactory::new().with_extension("noop", || Noop);
        factory.register("panics", |_| panic!("boom"));
        factory.register("fails", |_| {
            Err(Error::Internal("constructor failed".to_string()))
        });
        Arc::new(factory)
    }

    async fn setup(names: &[&str]) -> (PluginLoader, Arc<PluginContainer>, PluginConfig, TempDir) {
        let temp = TempDir::new().unwrap();
        let config = PluginConfig::new(temp.path().join("plugins-config.json"));
        for name in names {
            config
                .add(ContractType::Extension, ConfigDescriptor::new(*name, "1.0"))
                .await;
        }
        let container = Arc::new(PluginContainer::new());
        let loader = PluginLoader::new(factory(), Arc::clone(&container), Arc::new(EventBus::new()));
        (loader, container, config, temp)
    }

    #[tokio::test]
    async fn test_one_failure_is_isolated() {
        let (loader, container, config, _temp) = setup(&["a", "b", "c"]).await;

        let resolved: HashSet<Plugin> = [
            resolved("a", "noop"),
            resolved("b", "panics"),
            resolved("c", "noop"),
        ]
        .into_iter()
        .collect();

        let not_loaded = loader.load_all(&resolved, &config).await;

        assert_eq!(not_loaded.len(), 1);
        assert_eq!(not_loaded.iter().next().unwrap().name, "b");
        assert_eq!(container.len().await, 2);

        let a = config.find("a", "1.0").await.unwrap();
        assert!(container.find_by_uuid(ContractType::Extension, a.uuid).await.is_some());
    }

    #[tokio::test]
    async fn test_disabled_or_unknown_is_not_loaded() {
        let (loader, container, config, _temp) = setup(&["a"]).await;
        config.set_enabled("a", "1.0", false).await;

        let resolved: HashSet<Plugin> = [resolved("a", "noop"), resolved("z", "noop")]
            .into_iter()
            .collect();
        let not_loaded = loader.load_all(&resolved, &config).await;

        assert_eq!(not_loaded.len(), 2);
        assert!(container.is_empty().await);
    }

    #[tokio::test]
    async fn test_constructor_error_and_unknown_entry() {
        let (loader, _container, config, _temp) = setup(&["a", "b"]).await;

        let err = loader.load(&resolved("a", "fails"), &config).await.unwrap_err();
        assert!(err.to_string().contains("constructor failed"));

        let err = loader.load(&resolved("b", "missing"), &config).await.unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }

    #[tokio::test]
    async fn test_contract_mismatch_is_load_failure() {
        let (loader, _container, config, _temp) = setup(&["a"]).await;

        let manifest = PluginManifest::new("a", "1.0", ContractType::Standalone, "noop");
        let plugin = Plugin::resolved("/plugins/a-1.0.plugin", manifest).unwrap();

        let err = loader.load(&plugin, &config).await.unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
        assert!(err.to_string().contains("manifest declares standalone"));
    }

    #[tokio::test]
    async fn test_reinstantiate_keeps_uuid() {
        let (loader, container, config, _temp) = setup(&["a"]).await;
        let original = loader.load(&resolved("a", "noop"), &config).await.unwrap();

        let rebuilt = loader.reinstantiate(&original, &config).await.unwrap();

        assert_eq!(rebuilt.uuid(), original.uuid());
        assert_ne!(rebuilt.identity(), original.identity());
        assert!(!rebuilt.is_started());
        assert!(!rebuilt.has_task());
        assert_eq!(container.len().await, 1);
        assert!(container.find_by_identity(original.identity()).await.is_none());
    }
}
