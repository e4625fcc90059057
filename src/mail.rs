//! 邮件解析模块 - 收件箱输出的多格式解析

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// 一封邮件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MailMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub timestamp: String,
    pub read: bool,
}

/// 收件箱状态
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Mailbox {
    pub messages: Vec<MailMessage>,
    pub unread_count: u32,
}

/// 原始 JSON 邮件条目，所有字段都可缺省
#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    read: Option<bool>,
    #[serde(default)]
    unread: Option<bool>,
}

/// 解析收件箱输出
///
/// 依次尝试：JSON 数组；`[unread] from: subject` 行（unread 标记
/// 同时决定单条 read 字段与未读计数）；`id | from | subject | date`
/// 行（一律视为已读）。无法识别的行静默丢弃，永不报错。
pub fn parse_inbox(stdout: &str, address: &str) -> Mailbox {
    let trimmed = stdout.trim();
    let text = if trimmed.is_empty() { "[]" } else { trimmed };

    // 优先尝试 JSON 数组格式
    if let Ok(wire) = serde_json::from_str::<Vec<WireMessage>>(text) {
        let messages: Vec<MailMessage> = wire
            .into_iter()
            .enumerate()
            .map(|(idx, msg)| {
                let read = msg.read.unwrap_or_else(|| !msg.unread.unwrap_or(false));
                MailMessage {
                    id: msg.id.unwrap_or_else(|| format!("msg-{}", idx)),
                    from: msg.from.unwrap_or_else(|| "unknown".to_string()),
                    to: msg.to.unwrap_or_else(|| address.to_string()),
                    subject: msg.subject.unwrap_or_else(|| "(no subject)".to_string()),
                    body: msg.body.or(msg.content).unwrap_or_default(),
                    timestamp: msg
                        .timestamp
                        .or(msg.date)
                        .unwrap_or_else(|| Utc::now().to_rfc3339()),
                    read,
                }
            })
            .collect();
        let unread_count = messages.iter().filter(|m| !m.read).count() as u32;
        return Mailbox {
            messages,
            unread_count,
        };
    }

    parse_inbox_lines(stdout, address)
}

/// 逐行扫描文本格式
fn parse_inbox_lines(stdout: &str, address: &str) -> Mailbox {
    // 格式 1：[unread] from: subject
    let line_re = Regex::new(r"^\s*(\[unread\])?\s*(\S+):\s*(.+)").unwrap();
    // 格式 2：id | from | subject | date
    let table_re = Regex::new(r"^\s*(\S+)\s*\|\s*(\S+)\s*\|\s*(.+?)\s*\|\s*(.+)").unwrap();

    let mut messages = Vec::new();
    let mut unread_count = 0u32;

    for (idx, line) in stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
    {
        if let Some(caps) = line_re.captures(line) {
            let is_unread = caps.get(1).is_some();
            if is_unread {
                unread_count += 1;
            }
            messages.push(MailMessage {
                id: format!("msg-{}", idx),
                from: caps[2].to_string(),
                to: address.to_string(),
                subject: caps[3].trim_end().to_string(),
                body: String::new(),
                timestamp: Utc::now().to_rfc3339(),
                read: !is_unread,
            });
            continue;
        }

        if let Some(caps) = table_re.captures(line) {
            messages.push(MailMessage {
                id: caps[1].to_string(),
                from: caps[2].to_string(),
                to: address.to_string(),
                subject: caps[3].to_string(),
                body: String::new(),
                timestamp: caps[4].trim_end().to_string(),
                read: true,
            });
        }
        // 其余行静默丢弃
    }

    Mailbox {
        messages,
        unread_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_array() {
        let stdout = r#"[
            {"id": "m1", "from": "coordinator", "subject": "Deploy", "unread": true},
            {"from": "healthchecker", "body": "all green", "read": true}
        ]"#;

        let mailbox = parse_inbox(stdout, "overseer");
        assert_eq!(mailbox.messages.len(), 2);
        assert_eq!(mailbox.unread_count, 1);
        assert!(!mailbox.messages[0].read);
        // 缺省字段有默认值
        assert_eq!(mailbox.messages[1].id, "msg-1");
        assert_eq!(mailbox.messages[1].subject, "(no subject)");
        assert_eq!(mailbox.messages[1].to, "overseer");
        assert_eq!(mailbox.messages[1].body, "all green");
    }

    #[test]
    fn test_parse_unread_line_format() {
        let mailbox = parse_inbox("[unread] mayor: Budget review", "overseer");

        assert_eq!(mailbox.messages.len(), 1);
        assert_eq!(mailbox.unread_count, 1);
        let msg = &mailbox.messages[0];
        assert_eq!(msg.from, "mayor");
        assert_eq!(msg.subject, "Budget review");
        assert!(!msg.read);
    }

    #[test]
    fn test_parse_read_line_format() {
        let mailbox = parse_inbox("deacon: Status update", "overseer");

        assert_eq!(mailbox.unread_count, 0);
        assert!(mailbox.messages[0].read);
    }

    #[test]
    fn test_parse_pipe_table_format() {
        let mailbox = parse_inbox("abc123 | deacon | Status update | 2025-01-01", "overseer");

        assert_eq!(mailbox.messages.len(), 1);
        let msg = &mailbox.messages[0];
        assert_eq!(msg.id, "abc123");
        assert_eq!(msg.from, "deacon");
        assert_eq!(msg.subject, "Status update");
        assert_eq!(msg.timestamp, "2025-01-01");
        assert!(msg.read);
        assert_eq!(mailbox.unread_count, 0);
    }

    #[test]
    fn test_unmatched_lines_are_dropped() {
        let stdout = "=== inbox ===\n[unread] mayor: Budget review\n-- no colon no pipes --\n";
        let mailbox = parse_inbox(stdout, "overseer");
        assert_eq!(mailbox.messages.len(), 1);
    }

    #[test]
    fn test_empty_output_is_empty_mailbox() {
        assert_eq!(parse_inbox("", "overseer"), Mailbox::default());
        assert_eq!(parse_inbox("[]", "overseer"), Mailbox::default());
    }

    #[test]
    fn test_mixed_line_formats() {
        let stdout = "[unread] mayor: Budget review\nabc123 | deacon | Status update | 2025-01-01";
        let mailbox = parse_inbox(stdout, "overseer");
        assert_eq!(mailbox.messages.len(), 2);
        assert_eq!(mailbox.unread_count, 1);
    }
}
