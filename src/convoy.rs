//! Convoy 模块 - 跨 issue 工作批次的类型与解析

use serde::{Deserialize, Serialize};

/// convoy 进度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ConvoyProgress {
    pub completed: u32,
    pub total: u32,
}

/// convoy 状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConvoyStatus {
    Active,
    Completed,
    #[default]
    Stalled,
}

/// 一个 convoy（围绕一批 issue 的工作编队）
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Convoy {
    pub id: String,
    pub title: String,
    pub issues: Vec<String>,
    pub status: ConvoyStatus,
    pub progress: ConvoyProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// 解析 convoy 列表输出（JSON 数组，解析失败返回空列表）
pub fn parse_convoys(stdout: &str) -> Vec<Convoy> {
    serde_json::from_str(stdout.trim()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_convoys() {
        let stdout = r#"[{
            "id": "convoy-1",
            "title": "Feature Convoy",
            "issues": ["issue-1", "issue-2"],
            "status": "active",
            "progress": {"completed": 1, "total": 2},
            "assignee": "Emma5",
            "created_at": "2025-01-10T00:00:00Z",
            "updated_at": "2025-01-12T00:00:00Z"
        }]"#;

        let convoys = parse_convoys(stdout);
        assert_eq!(convoys.len(), 1);
        assert_eq!(convoys[0].status, ConvoyStatus::Active);
        assert_eq!(convoys[0].progress.completed, 1);
        assert_eq!(convoys[0].assignee.as_deref(), Some("Emma5"));
    }

    #[test]
    fn test_assignee_optional() {
        let convoys = parse_convoys(r#"[{"id": "c2", "title": "Unassigned", "status": "stalled"}]"#);
        assert_eq!(convoys.len(), 1);
        assert!(convoys[0].assignee.is_none());
    }

    #[test]
    fn test_malformed_yields_empty() {
        assert!(parse_convoys("oops").is_empty());
        assert!(parse_convoys("").is_empty());
    }
}
