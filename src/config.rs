//! 配置模块 - 读取 ~/.fleet-monitor/config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 监控配置文件内容
///
/// 配置读取永不失败：文件不存在或内容损坏时直接使用默认值。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    /// 舰队工作区根目录覆盖（支持 ~ 展开）
    pub fleet_base_path: Option<String>,
    /// 额外的可执行文件搜索目录，优先于系统 PATH
    pub bin_paths: Vec<String>,
}

impl MonitorConfig {
    /// 配置文件固定路径：~/.fleet-monitor/config.json
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fleet-monitor")
            .join("config.json")
    }

    /// 从默认路径加载配置
    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    /// 从指定路径加载（测试用）
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            // 内容损坏时忽略，退回默认值
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// 展开后的根目录覆盖
    pub fn base_path(&self) -> Option<PathBuf> {
        self.fleet_base_path.as_deref().map(expand_tilde)
    }

    /// 展开后的 bin 目录列表
    pub fn bin_dirs(&self) -> Vec<PathBuf> {
        self.bin_paths.iter().map(|p| expand_tilde(p)).collect()
    }
}

/// 将开头的 ~ 展开为用户主目录
fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest.trim_start_matches('/')),
        None => PathBuf::from(path),
    }
}
