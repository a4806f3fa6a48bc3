//! Action DTOs - startup/shutdown/restart 요청과 응답

use super::manifest::ContractType;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 단일 플러그인 대상 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub extension_type: ContractType,
    pub plugin_uuid: Uuid,
    pub plugin_name: String,
    pub plugin_version: String,
}

impl ActionRequest {
    pub fn new(
        extension_type: ContractType,
        plugin_uuid: Uuid,
        plugin_name: impl Into<String>,
        plugin_version: impl Into<String>,
    ) -> Self {
        Self {
            extension_type,
            plugin_uuid,
            plugin_name: plugin_name.into(),
            plugin_version: plugin_version.into(),
        }
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ActionRequest(extensionType={}, pluginUuid={}, pluginName={}, pluginVersion={})",
            self.extension_type, self.plugin_uuid, self.plugin_name, self.plugin_version
        )
    }
}

/// 요청 처리 결과 - 성공 여부 + 순서 있는 메시지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    #[serde(rename = "isSuccessfullyDone")]
    pub success: bool,

    #[serde(default)]
    pub messages: Vec<String>,
}

impl ActionResponse {
    pub fn of(success: bool, messages: Vec<String>) -> Self {
        Self { success, messages }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::of(true, vec![message.into()])
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::of(false, vec![message.into()])
    }

    /// 순서대로 이어붙임: 성공 = AND, 메시지는 self → next
    pub fn then(mut self, next: ActionResponse) -> Self {
        self.success &= next.success;
        self.messages.extend(next.messages);
        self
    }

    /// 먼저 실행된 단계 위에 나중 단계를 접는다: 성공 = AND, 메시지는 later → earlier
    ///
    /// shutdown 응답(정지 단계 + 설정 단계)이 이 순서로 합쳐진다.
    pub fn fold(earlier: ActionResponse, later: ActionResponse) -> Self {
        later.then(earlier)
    }
}
