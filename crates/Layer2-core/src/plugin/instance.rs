//! Plugin Instance - 로드된 플러그인의 런타임 핸들
//!
//! 호출자는 항상 스냅샷(clone)을 받는다. 상태 변경은 컨테이너만 수행한다.

use super::manifest::ContractType;
use super::traits::PluginObject;
use super::types::Plugin;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

// ============================================================================
// InstanceId - 프로세스 내 고유 식별 마커
// ============================================================================

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// 인스턴스 식별 마커 - 생성될 때마다 새로 발급
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance-{}", self.0)
    }
}

// ============================================================================
// Instance
// ============================================================================

/// 플러그인 인스턴스
#[derive(Debug, Clone)]
pub struct Instance {
    plugin: Plugin,

    /// 컨테이너 등록 키
    uuid: Uuid,

    contract_type: ContractType,

    /// 살아있는 객체 (clear 이후 None)
    object: Option<PluginObject>,

    identity: InstanceId,

    /// Standalone: start 태스크가 실제로 띄워졌는지
    started: bool,

    /// Standalone 전용 백그라운드 태스크 - 한 번만 바인딩
    task: Option<Arc<JoinHandle<()>>>,

    instantiated_at: DateTime<Utc>,
}

impl Instance {
    /// 새 인스턴스 (started = false, 태스크 미바인딩)
    pub(crate) fn new(plugin: Plugin, uuid: Uuid, object: PluginObject) -> Self {
        Self {
            contract_type: plugin
                .contract_type
                .unwrap_or_else(|| object.contract_type()),
            plugin,
            uuid,
            object: Some(object),
            identity: InstanceId::next(),
            started: false,
            task: None,
            instantiated_at: Utc::now(),
        }
    }

    pub fn plugin(&self) -> &Plugin {
        &self.plugin
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn contract_type(&self) -> ContractType {
        self.contract_type
    }

    pub fn object(&self) -> Option<&PluginObject> {
        self.object.as_ref()
    }

    pub fn identity(&self) -> InstanceId {
        self.identity
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn has_task(&self) -> bool {
        self.task.is_some()
    }

    pub fn instantiated_at(&self) -> DateTime<Utc> {
        self.instantiated_at
    }

    /// 바인딩된 백그라운드 태스크가 이미 끝났는지 (미바인딩이면 None)
    pub fn task_finished(&self) -> Option<bool> {
        self.task.as_ref().map(|handle| handle.is_finished())
    }

    /// Standalone → started이고 바인딩된 태스크가 아직 살아 있음, Extension → 객체 존재 여부
    pub fn is_running(&self) -> bool {
        match self.contract_type {
            ContractType::Standalone => self.started && self.task_finished() != Some(true),
            ContractType::Extension => self.object.is_some(),
        }
    }

    // ========================================================================
    // 컨테이너 전용 변경자
    // ========================================================================

    /// 객체 해제 (started = false)
    pub(crate) fn clear(&mut self) {
        self.object = None;
        self.started = false;
    }

    pub(crate) fn set_started(&mut self, started: bool) {
        self.started = started;
    }

    /// 태스크 바인딩 - 이미 바인딩되어 있으면 원래 핸들을 유지하고 false
    pub(crate) fn bind_task(&mut self, handle: JoinHandle<()>) -> bool {
        if self.task.is_some() {
            warn!(
                "Task for plugin {} ({}) is already bound, keeping the original",
                self.plugin.short_name(),
                self.identity
            );
            return false;
        }
        self.task = Some(Arc::new(handle));
        true
    }
}
