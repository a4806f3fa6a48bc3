//! 바이너리에 내장된 플러그인
//!
//! 아티팩트 매니페스트의 `entry`가 여기 등록된 이름과 같으면 이 생성자로 객체를 만든다.

use async_trait::async_trait;
use easeci_core::{BuiltinFactory, PluginManifest, PluginObject, Result, StandalonePlugin};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;

/// 하트비트 플러그인 엔트리 포인트
pub const HEARTBEAT_ENTRY: &str = "easeci.builtin.heartbeat";

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// 내장 플러그인이 등록된 팩토리
pub fn factory() -> BuiltinFactory {
    let mut factory = BuiltinFactory::new();
    factory.register(HEARTBEAT_ENTRY, |manifest: &PluginManifest| {
        Ok(PluginObject::standalone(HeartbeatPlugin::new(
            manifest.name.clone(),
            DEFAULT_HEARTBEAT_INTERVAL,
        )))
    });
    factory
}

// ============================================================================
// HeartbeatPlugin
// ============================================================================

/// 주기적으로 살아 있음을 로그로 남기는 Standalone 플러그인
pub struct HeartbeatPlugin {
    name: String,
    interval: Duration,
    beats: AtomicU64,
    shutdown: Notify,
}

impl HeartbeatPlugin {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            beats: AtomicU64::new(0),
            shutdown: Notify::new(),
        }
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StandalonePlugin for HeartbeatPlugin {
    async fn start(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let beat = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
                    info!("[{}] heartbeat #{}", self.name, beat);
                }
                _ = self.shutdown.notified() => {
                    info!("[{}] heartbeat stopped after {} beats", self.name, self.beats());
                    return Ok(());
                }
            }
        }
    }

    async fn stop(&self) -> Result<()> {
        // start()가 아직 대기 전이어도 permit이 남는다
        self.shutdown.notify_one();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
