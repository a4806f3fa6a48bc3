//! Plugin Events - 라이프사이클 이벤트 시스템
//!
//! 로드/시작/정지/다운로드/치명적 실패를 브로드캐스트하고 최근 이력을 보관합니다.
//! 설정 저장 실패 같은 critical 에러가 프로세스에 전달되는 통로이기도 합니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// PluginEvent - 플러그인 이벤트 타입
// ============================================================================

/// 플러그인 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEvent {
    pub event_type: EventType,

    /// 이벤트 데이터
    pub data: Value,

    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// 대상 플러그인 ("name:version")
    pub plugin: String,
}

impl PluginEvent {
    pub fn new(event_type: EventType, plugin: impl Into<String>, data: Value) -> Self {
        Self {
            event_type,
            data,
            timestamp: chrono::Utc::now(),
            plugin: plugin.into(),
        }
    }

    pub fn loaded(plugin: &str, uuid: Uuid) -> Self {
        Self::new(EventType::PluginLoaded, plugin, serde_json::json!({ "uuid": uuid }))
    }

    pub fn started(plugin: &str, uuid: Uuid) -> Self {
        Self::new(EventType::PluginStarted, plugin, serde_json::json!({ "uuid": uuid }))
    }

    pub fn stopped(plugin: &str, uuid: Uuid) -> Self {
        Self::new(EventType::PluginStopped, plugin, serde_json::json!({ "uuid": uuid }))
    }

    pub fn download_completed(plugin: &str, path: &std::path::Path) -> Self {
        Self::new(
            EventType::DownloadCompleted,
            plugin,
            serde_json::json!({ "path": path.display().to_string() }),
        )
    }

    pub fn download_failed(plugin: &str, error: &str) -> Self {
        Self::new(EventType::DownloadFailed, plugin, serde_json::json!({ "error": error }))
    }

    pub fn critical(plugin: &str, error: &str) -> Self {
        Self::new(EventType::CriticalFailure, plugin, serde_json::json!({ "error": error }))
    }
}

/// 이벤트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // 라이프사이클 이벤트
    PluginLoaded,
    PluginStarted,
    PluginStopped,

    // 다운로드 이벤트
    DownloadCompleted,
    DownloadFailed,

    /// 설정 영속화 실패 등 프로세스가 알아야 하는 실패
    CriticalFailure,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PluginLoaded => write!(f, "plugin_loaded"),
            Self::PluginStarted => write!(f, "plugin_started"),
            Self::PluginStopped => write!(f, "plugin_stopped"),
            Self::DownloadCompleted => write!(f, "download_completed"),
            Self::DownloadFailed => write!(f, "download_failed"),
            Self::CriticalFailure => write!(f, "critical_failure"),
        }
    }
}

// ============================================================================
// PluginEventHandler - 이벤트 핸들러 트레이트
// ============================================================================

/// 이벤트 핸들러 트레이트
#[async_trait]
pub trait PluginEventHandler: Send + Sync {
    /// 핸들러 이름
    fn name(&self) -> &str;

    /// 관심 있는 이벤트 타입들
    fn interested_events(&self) -> Vec<EventType>;

    async fn handle(&self, event: &PluginEvent);
}

// ============================================================================
// EventBus - 이벤트 버스 (발행/구독)
// ============================================================================

/// 이벤트 버스 - 이벤트 발행 및 구독 관리
pub struct EventBus {
    sender: broadcast::Sender<PluginEvent>,

    /// 등록된 핸들러
    handlers: RwLock<HashMap<String, Arc<dyn PluginEventHandler>>>,

    /// 이벤트 히스토리 (최근 N개)
    history: RwLock<VecDeque<PluginEvent>>,

    history_size: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(256, 100)
    }

    /// 용량 지정하여 생성
    pub fn with_capacity(channel_capacity: usize, history_size: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            sender,
            handlers: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::with_capacity(history_size)),
            history_size,
        }
    }

    /// 이벤트 핸들러 등록
    pub async fn register_handler(&self, handler: Arc<dyn PluginEventHandler>) {
        let name = handler.name().to_string();
        self.handlers.write().await.insert(name, handler);
    }

    pub async fn unregister_handler(&self, name: &str) {
        self.handlers.write().await.remove(name);
    }

    /// 이벤트 발행
    pub async fn publish(&self, event: PluginEvent) {
        debug!("Publishing event: {} for {}", event.event_type, event.plugin);

        {
            let mut history = self.history.write().await;
            if history.len() >= self.history_size {
                history.pop_front();
            }
            if self.history_size > 0 {
                history.push_back(event.clone());
            }
        }

        // 구독자가 없어도 OK
        let _ = self.sender.send(event.clone());

        // 핸들러 목록을 복사한 뒤 락 밖에서 호출
        let handlers: Vec<_> = self
            .handlers
            .read()
            .await
            .values()
            .filter(|h| h.interested_events().contains(&event.event_type))
            .cloned()
            .collect();
        for handler in handlers {
            handler.handle(&event).await;
        }
    }

    /// 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.sender.subscribe()
    }

    /// 이벤트 히스토리 조회
    pub async fn history(&self) -> Vec<PluginEvent> {
        self.history.read().await.iter().cloned().collect()
    }

    /// 특정 타입의 이벤트 히스토리 조회
    pub async fn history_by_type(&self, event_type: EventType) -> Vec<PluginEvent> {
        self.history
            .read()
            .await
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub async fn clear_history(&self) {
        self.history.write().await.clear();
    }

    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
