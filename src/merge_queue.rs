//! 合并队列解析模块 - fleet mq list 表格输出解析

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 合并队列中的一项
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// 解析 fleet mq list 的表格输出
///
/// 输出形如：
/// ```text
/// 📋 Merge queue for 'editor_fleet5':
/// ID             SCORE PRI  CONVOY       BRANCH                   STATUS        AGE
/// ─────────────────────────────────────────────────────────────────────────────────
/// e5-pmc7       1202.8 P2   (none)       crew/Emma5               ready          2h
/// ```
/// 横幅、表头、分隔线被跳过；不匹配的数据行直接丢弃，不报错。
pub fn parse_merge_queue(stdout: &str) -> Vec<QueueItem> {
    // 数据行：ID  SCORE PRI  CONVOY  BRANCH  STATUS  AGE
    let row_re = Regex::new(r"^(\S+)\s+[\d.]+\s+\S+\s+\S+\s+(\S+)\s+(\S+)").unwrap();

    let mut items = Vec::new();
    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with("ID")
            || trimmed.starts_with('─')
            || trimmed.starts_with("📋")
        {
            continue;
        }
        if let Some(caps) = row_re.captures(trimmed) {
            items.push(QueueItem {
                id: caps[1].to_string(),
                branch: Some(caps[2].to_string()),
                // 暂以 STATUS 列充当标题
                title: Some(caps[3].to_string()),
            });
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_row() {
        let items =
            parse_merge_queue("e5-pmc7   1202.8 P2  (none)  crew/Emma5   ready   2h");

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "e5-pmc7");
        assert_eq!(items[0].branch.as_deref(), Some("crew/Emma5"));
        assert_eq!(items[0].title.as_deref(), Some("ready"));
    }

    #[test]
    fn test_skips_banner_header_and_separator() {
        let stdout = "📋 Merge queue for 'editor_fleet5':\n\
            ID             SCORE PRI  CONVOY       BRANCH                   STATUS        AGE\n\
            ─────────────────────────────────────────────────────────────────────────────────\n\
            e5-pmc7       1202.8 P2   (none)       crew/Emma5               ready          2h\n\
            e5-qrs8        980.1 P1   convoy-3     crew/Nux2                blocked        5h\n";

        let items = parse_merge_queue(stdout);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].id, "e5-qrs8");
        assert_eq!(items[1].branch.as_deref(), Some("crew/Nux2"));
    }

    #[test]
    fn test_non_matching_rows_are_dropped() {
        // SCORE 列不是数字，不符合数据行格式
        let items = parse_merge_queue("queue is empty\ne5-pmc7 n/a P2 (none) branch ready 2h");
        assert!(items.is_empty());
    }

    #[test]
    fn test_empty_output() {
        assert!(parse_merge_queue("").is_empty());
    }
}
