//! Plugin Container - 인스턴스 레지스트리
//!
//! (계약 타입, UUID)와 인스턴스 식별자 두 개의 인덱스를 하나의 락으로 관리한다.
//! 모든 연산은 락 안에서 원자적으로 끝나고, 플러그인 훅은 락을 잡은 채로 호출하지 않는다.

use super::instance::{Instance, InstanceId};
use super::manifest::ContractType;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// 계약 타입별 집계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    pub loaded: usize,
    pub running: usize,
}

#[derive(Default)]
struct ContainerInner {
    instances: HashMap<(ContractType, Uuid), Instance>,
    by_identity: HashMap<InstanceId, (ContractType, Uuid)>,
}

/// 플러그인 컨테이너
#[derive(Default)]
pub struct PluginContainer {
    inner: RwLock<ContainerInner>,
}

impl PluginContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 인스턴스 등록 - 같은 키가 있으면 교체하고 이전 인스턴스를 돌려준다
    pub async fn register(&self, instance: Instance) -> Option<Instance> {
        let key = (instance.contract_type(), instance.uuid());
        let mut inner = self.inner.write().await;

        let previous = inner.instances.insert(key, instance.clone());
        if let Some(previous) = &previous {
            inner.by_identity.remove(&previous.identity());
        }
        inner.by_identity.insert(instance.identity(), key);

        info!(
            "Registered {} instance {} as {} ({})",
            key.0,
            instance.plugin().short_name(),
            key.1,
            instance.identity()
        );
        previous
    }

    /// UUID로 조회 (스냅샷)
    pub async fn find_by_uuid(&self, contract: ContractType, uuid: Uuid) -> Option<Instance> {
        self.inner.read().await.instances.get(&(contract, uuid)).cloned()
    }

    /// 식별 마커로 조회 (스냅샷)
    pub async fn find_by_identity(&self, identity: InstanceId) -> Option<Instance> {
        let inner = self.inner.read().await;
        inner
            .by_identity
            .get(&identity)
            .and_then(|key| inner.instances.get(key))
            .cloned()
    }

    /// 인스턴스 제거
    pub async fn remove(&self, contract: ContractType, uuid: Uuid) -> Option<Instance> {
        let mut inner = self.inner.write().await;
        let removed = inner.instances.remove(&(contract, uuid));
        if let Some(instance) = &removed {
            inner.by_identity.remove(&instance.identity());
            debug!("Removed instance {} ({})", uuid, instance.identity());
        }
        removed
    }

    /// 계약 타입별 인스턴스 목록 (스냅샷)
    pub async fn list(&self, contract: ContractType) -> Vec<Instance> {
        self.inner
            .read()
            .await
            .instances
            .iter()
            .filter(|((c, _), _)| *c == contract)
            .map(|(_, instance)| instance.clone())
            .collect()
    }

    /// 계약 타입별 집계
    pub async fn state(&self, contract: ContractType) -> ContainerState {
        let inner = self.inner.read().await;
        inner
            .instances
            .iter()
            .filter(|((c, _), _)| *c == contract)
            .fold(ContainerState::default(), |mut state, (_, instance)| {
                state.loaded += 1;
                if instance.is_running() {
                    state.running += 1;
                }
                state
            })
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.instances.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 락 안에서 인스턴스를 변경하고 결과 스냅샷을 돌려준다
    ///
    /// 등록된 인스턴스의 식별 마커가 `expected`와 다르면(그 사이 교체됨) 변경하지 않고 None.
    pub(crate) async fn update<R>(
        &self,
        contract: ContractType,
        uuid: Uuid,
        expected: InstanceId,
        f: impl FnOnce(&mut Instance) -> R,
    ) -> Option<(R, Instance)> {
        let mut inner = self.inner.write().await;
        let instance = inner.instances.get_mut(&(contract, uuid))?;
        if instance.identity() != expected {
            debug!(
                "Instance {} was replaced ({} -> {}), update skipped",
                uuid,
                expected,
                instance.identity()
            );
            return None;
        }
        let result = f(instance);
        Some((result, instance.clone()))
    }
}
