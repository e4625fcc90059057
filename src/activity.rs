//! 终端活动分类模块 - 从 session scrollback 推断 Agent 当前活动

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 工具参数保留宽度（超出部分以省略号收尾）
const TOOL_ARGS_WIDTH: usize = 50;
/// Waiting 内容总宽度（含省略号）
const WAITING_WIDTH: usize = 80;
/// 兜底行硬截断宽度
const FALLBACK_WIDTH: usize = 60;

/// 一次活动分类结果
///
/// 任何输入（包括空缓冲区）都会得到一个分类结果。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityClassification {
    pub activity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl ActivityClassification {
    fn plain(activity: impl Into<String>) -> Self {
        Self {
            activity: activity.into(),
            duration: None,
            tool: None,
        }
    }
}

/// 终端活动分类器
///
/// 规则按严格优先级从最近一行向上匹配：
/// 思考/处理状态 > 工具调用 > Running 标记 > 提示符下的 Waiting 内容 >
/// 最后一个有效行 > "No output" 哨兵。
pub struct ActivityClassifier {
    thinking_re: Regex,
    tool_re: Regex,
}

impl ActivityClassifier {
    pub fn new() -> Self {
        Self {
            // 思考/处理状态：✻ Action… (3m 12s)
            thinking_re: Regex::new(
                r"[✻✶✢]\s+(.+?)\s*(?:…|\.\.\.)\s*(?:\((?:ctrl\+c to interrupt\s*·\s*)?(\d+m?\s*\d*s?))?",
            )
            .unwrap(),
            // 工具调用：⏺ Tool(args)
            tool_re: Regex::new(r"⏺\s+(\w+)\((.+?)\)").unwrap(),
        }
    }

    /// 对一份 scrollback 缓冲区做分类
    pub fn classify(&self, output: &str) -> ActivityClassification {
        let lines: Vec<&str> = output.lines().collect();

        // 活动状态：从最近一行向上扫描
        for line in lines.iter().rev() {
            if let Some(caps) = self.thinking_re.captures(line) {
                return ActivityClassification {
                    activity: caps[1].trim().to_string(),
                    duration: caps.get(2).map(|m| m.as_str().trim().to_string()),
                    tool: None,
                };
            }

            if let Some(caps) = self.tool_re.captures(line) {
                let tool = caps[1].to_string();
                let args = truncate_with_ellipsis(&caps[2], TOOL_ARGS_WIDTH);
                return ActivityClassification {
                    activity: format!("{}: {}", tool, args),
                    duration: None,
                    tool: Some(tool),
                };
            }

            if line.contains("Running…") || line.contains("Running...") {
                return ActivityClassification::plain("Running command...");
            }
        }

        // 处于提示符：正向提取最后的有效内容
        let at_prompt = output.contains('❯') && !output.contains('✻') && !output.contains('⏺');
        if at_prompt {
            let content: Vec<&str> = lines
                .iter()
                .map(|l| l.trim())
                .filter(|t| !is_chrome(t))
                .collect();

            let start = content.len().saturating_sub(3);
            let joined = content[start..].join(" ");
            let joined = joined.trim();
            if !joined.is_empty() {
                return ActivityClassification::plain(format!(
                    "Waiting: {}",
                    ellipsize(joined, WAITING_WIDTH)
                ));
            }
            return ActivityClassification::plain("At prompt");
        }

        // 兜底：最后一个非空、非分隔线的行，硬截断
        if let Some(last) = lines
            .iter()
            .filter(|l| !l.trim().is_empty() && !l.contains("───"))
            .last()
        {
            let activity: String = last.trim().chars().take(FALLBACK_WIDTH).collect();
            return ActivityClassification::plain(activity);
        }

        ActivityClassification::plain("No output")
    }
}

impl Default for ActivityClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// 一次性分类入口（内部构建分类器）
pub fn classify_activity(output: &str) -> ActivityClassification {
    ActivityClassifier::new().classify(output)
}

/// UI 装饰行判定（空行、边框、快捷键提示等）
fn is_chrome(trimmed: &str) -> bool {
    if trimmed.is_empty() {
        return true;
    }
    if trimmed.starts_with('─') || trimmed.starts_with('│') {
        return true;
    }
    if trimmed.starts_with('╭') || trimmed.starts_with('╰') {
        return true;
    }
    if trimmed.contains("bypass permissions")
        || trimmed.contains("shift+tab")
        || trimmed.contains("⏵⏵")
        || trimmed.contains("/ide for")
    {
        return true;
    }
    if trimmed
        .chars()
        .all(|c| matches!(c, '▐' | '▛' | '▜' | '▘' | '▝'))
    {
        return true;
    }
    if trimmed.starts_with('❯') && trimmed.chars().count() < 3 {
        return true;
    }
    false
}

/// 保留 width 个字符，超出时附加省略号（总长 width + 3）
fn truncate_with_ellipsis(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let kept: String = text.chars().take(width).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

/// 截断到总宽 width（含省略号）
fn ellipsize(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let kept: String = text.chars().take(width - 3).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}
