//! Refinery 模块 - issue 记录与 agent 描述块解析

use crate::merge_queue::QueueItem;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// issue 记录（JSON 数组元素或 JSONL 行）
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub issue_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

/// 描述块中的原始 agent 状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Active,
    Error,
    #[default]
    Idle,
}

/// refinery 对外状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RefineryStatus {
    Processing,
    Error,
    #[default]
    Idle,
}

impl From<AgentState> for RefineryStatus {
    /// agent_state → status 的固定映射
    fn from(state: AgentState) -> Self {
        match state {
            AgentState::Active => RefineryStatus::Processing,
            AgentState::Error => RefineryStatus::Error,
            AgentState::Idle => RefineryStatus::Idle,
        }
    }
}

/// 从描述块解析出的 refinery 片段
#[derive(Debug, Clone, PartialEq)]
pub struct RefineryRecord {
    pub id: String,
    pub name: String,
    pub rig: String,
    pub status: RefineryStatus,
    pub agent_state: AgentState,
}

/// 完整的 refinery 视图（含合并队列）
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Refinery {
    pub id: String,
    pub name: String,
    pub rig: String,
    pub status: RefineryStatus,
    pub agent_state: AgentState,
    pub queue_depth: u32,
    pub queue_items: Vec<QueueItem>,
    pub unread_mail: u32,
}

/// 从自由文本描述块提取 `field: value`
pub fn descriptor_field(description: &str, field: &str) -> Option<String> {
    let re = Regex::new(&format!(r"{}:\s*(.+)", regex::escape(field))).ok()?;
    re.captures(description)
        .map(|caps| caps[1].trim().to_string())
}

/// 从 issue 解析 refinery 描述块
///
/// 仅当 issue_type 为 "agent" 且描述块带 `role_type: refinery` 标记时归类；
/// `agent_state` 不在 {active, error, idle} 中或缺失时按 idle 处理。
pub fn parse_refinery_descriptor(issue: &Issue) -> Option<RefineryRecord> {
    if issue.issue_type != "agent" {
        return None;
    }

    let role_type = descriptor_field(&issue.description, "role_type")?;
    if role_type != "refinery" {
        return None;
    }

    let agent_state = descriptor_field(&issue.description, "agent_state")
        .and_then(|s| match s.as_str() {
            "active" => Some(AgentState::Active),
            "error" => Some(AgentState::Error),
            "idle" => Some(AgentState::Idle),
            // 未识别的值按缺失处理
            _ => None,
        })
        .unwrap_or_default();

    Some(RefineryRecord {
        id: issue.id.clone(),
        name: issue.title.clone(),
        rig: descriptor_field(&issue.description, "rig").unwrap_or_default(),
        status: agent_state.into(),
        agent_state,
    })
}

/// 解析 issue 列表：JSON 数组或逐行 JSONL，坏行直接丢弃
pub fn parse_issues(stdout: &str) -> Vec<Issue> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if let Ok(list) = serde_json::from_str::<Vec<Issue>>(trimmed) {
        return list;
    }
    trimmed
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<Issue>(l).ok())
        .collect()
}
