//! Plugin traits - 핵심 플러그인 인터페이스
//!
//! 계약은 두 가지뿐이다:
//! - [`StandalonePlugin`]: 전용 태스크에서 `start()`가 돌고, `stop()`으로 협조적 종료
//! - [`ExtensionPlugin`]: 로드 즉시 사용 가능, 전용 태스크 없음

use super::manifest::ContractType;
use async_trait::async_trait;
use easeci_foundation::{Error, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Plugin Traits - 모든 플러그인이 구현해야 하는 인터페이스
// ============================================================================

/// Standalone 플러그인
///
/// `start()`는 플러그인이 멈출 때까지 반환하지 않아도 된다.
/// 런타임은 태스크를 강제 종료하지 않으므로 `stop()` 신호를 반드시 관찰해야 한다.
#[async_trait]
pub trait StandalonePlugin: Send + Sync {
    /// 플러그인 작업 시작 (전용 백그라운드 태스크에서 호출)
    async fn start(&self) -> Result<()>;

    /// 종료 요청
    async fn stop(&self) -> Result<()>;

    /// 타입 캐스팅을 위한 헬퍼 (다운캐스팅 지원)
    fn as_any(&self) -> &dyn Any;
}

/// Extension 플러그인
pub trait ExtensionPlugin: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

// ============================================================================
// PluginObject - 생성된 플러그인 객체
// ============================================================================

/// 팩토리가 생성한 살아있는 플러그인 객체
#[derive(Clone)]
pub enum PluginObject {
    Standalone(Arc<dyn StandalonePlugin>),
    Extension(Arc<dyn ExtensionPlugin>),
}

impl PluginObject {
    pub fn standalone(plugin: impl StandalonePlugin + 'static) -> Self {
        Self::Standalone(Arc::new(plugin))
    }

    pub fn extension(plugin: impl ExtensionPlugin + 'static) -> Self {
        Self::Extension(Arc::new(plugin))
    }

    pub fn contract_type(&self) -> ContractType {
        match self {
            Self::Standalone(_) => ContractType::Standalone,
            Self::Extension(_) => ContractType::Extension,
        }
    }

    /// Standalone으로 취급 - Extension이면 계약 위반
    pub fn to_standalone(&self) -> Result<Arc<dyn StandalonePlugin>> {
        match self {
            Self::Standalone(plugin) => Ok(Arc::clone(plugin)),
            Self::Extension(_) => Err(Error::ContractViolation(
                "extension object used as standalone".to_string(),
            )),
        }
    }

    /// Extension으로 취급 - Standalone이면 계약 위반
    pub fn to_extension(&self) -> Result<Arc<dyn ExtensionPlugin>> {
        match self {
            Self::Extension(plugin) => Ok(Arc::clone(plugin)),
            Self::Standalone(_) => Err(Error::ContractViolation(
                "standalone object used as extension".to_string(),
            )),
        }
    }

    pub fn as_any(&self) -> &dyn Any {
        match self {
            Self::Standalone(plugin) => plugin.as_any(),
            Self::Extension(plugin) => plugin.as_any(),
        }
    }
}

impl fmt::Debug for PluginObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PluginObject::{}", self.contract_type())
    }
}
