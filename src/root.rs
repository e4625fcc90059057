//! 根目录解析模块 - 定位舰队工作区根目录

use crate::config::MonitorConfig;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// 根目录环境变量覆盖，优先级最高
pub const ROOT_ENV_VAR: &str = "FLEET_BASE_PATH";
/// 工作区标记目录
pub const ROOT_MARKER: &str = ".fleet";
/// 向上查找标记目录的最大层数
const MAX_WALK_LEVELS: usize = 10;

/// 环境变量来源：真实进程环境或测试注入的固定值
enum EnvSource {
    Process,
    Fixed(Option<String>),
}

/// 根目录解析器
///
/// 解析优先级：环境变量 > 缓存值 > 配置文件（需带标记目录）>
/// 从起始目录向上查找标记目录 > 起始目录本身。
/// 解析永不失败，最差退化为起始目录。
pub struct RootResolver {
    config: MonitorConfig,
    start_dir: PathBuf,
    env: EnvSource,
    cached: Mutex<Option<PathBuf>>,
}

impl RootResolver {
    /// 以进程环境与当前目录构建
    pub fn new(config: MonitorConfig) -> Self {
        let start_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config,
            start_dir,
            env: EnvSource::Process,
            cached: Mutex::new(None),
        }
    }

    /// 注入起始目录与环境覆盖（测试用）
    pub fn with_overrides(
        config: MonitorConfig,
        start_dir: PathBuf,
        env_override: Option<String>,
    ) -> Self {
        Self {
            config,
            start_dir,
            env: EnvSource::Fixed(env_override),
            cached: Mutex::new(None),
        }
    }

    /// 解析舰队根目录
    pub fn resolve(&self) -> PathBuf {
        // 环境变量覆盖永远优先，原样返回且不参与缓存
        if let Some(path) = self.env_value() {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(cached) = self.cached.lock().unwrap().clone() {
            return cached;
        }

        // 配置文件中的根目录仅在标记目录存在时接受
        if let Some(base) = self.config.base_path() {
            if base.join(ROOT_MARKER).exists() {
                debug!(path = %base.display(), "Fleet root resolved from config");
                *self.cached.lock().unwrap() = Some(base.clone());
                return base;
            }
        }

        if let Some(found) = Self::walk_up(&self.start_dir) {
            debug!(path = %found.display(), "Fleet root detected by marker walk");
            *self.cached.lock().unwrap() = Some(found.clone());
            return found;
        }

        // 兜底：起始目录
        self.start_dir.clone()
    }

    /// 清除缓存的解析结果（配置变更后调用）
    pub fn reset(&self) {
        *self.cached.lock().unwrap() = None;
    }

    fn env_value(&self) -> Option<String> {
        match &self.env {
            EnvSource::Process => std::env::var(ROOT_ENV_VAR).ok(),
            EnvSource::Fixed(value) => value.clone(),
        }
    }

    /// 从 start 向上逐级查找包含标记目录的祖先
    fn walk_up(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        for _ in 0..MAX_WALK_LEVELS {
            if current.join(ROOT_MARKER).exists() {
                return Some(current);
            }
            match current.parent() {
                Some(parent) => {
                    let parent = parent.to_path_buf();
                    if parent == current {
                        break;
                    }
                    current = parent;
                }
                // 到达文件系统根
                None => break,
            }
        }
        None
    }
}
