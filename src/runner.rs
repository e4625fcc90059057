//! 命令执行模块 - 带超时和 PATH 扩展的外部命令执行

use crate::config::MonitorConfig;
use crate::root::RootResolver;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// 默认命令超时（毫秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// 命令执行错误
#[derive(Debug, Error)]
pub enum ExecError {
    /// 超时，进程已被终止
    #[error("command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    /// 非零退出，携带已捕获的输出
    ///
    /// 部分外部工具（如诊断检查）故意以非零退出同时输出有用内容，
    /// 调用方需要检查错误负载而不是一律当作"无数据"。
    #[error("command exited with status {status}: {stderr}")]
    Failure {
        status: i32,
        stdout: String,
        stderr: String,
    },
    /// 进程启动失败
    #[error("failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),
}

/// 命令输出
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// 执行选项
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// 超时，默认 10 秒
    pub timeout: Option<Duration>,
    /// 工作目录，默认为解析出的舰队根目录
    pub cwd: Option<PathBuf>,
}

/// 外部命令执行器
///
/// 所有命令经 `sh -c` 运行在舰队根目录下；配置的 bin 目录
/// 被前置到继承的 PATH，优先于系统默认路径。
pub struct CommandRunner {
    config: MonitorConfig,
    resolver: Arc<RootResolver>,
}

impl CommandRunner {
    pub fn new(config: MonitorConfig, resolver: Arc<RootResolver>) -> Self {
        Self { config, resolver }
    }

    /// 执行 shell 命令
    ///
    /// 超时后终止进程并返回 `ExecError::Timeout`；
    /// 非零退出返回 `ExecError::Failure`，其中携带已捕获的 stdout/stderr。
    pub async fn execute(
        &self,
        command: &str,
        options: ExecOptions,
    ) -> Result<ExecOutput, ExecError> {
        let timeout = options
            .timeout
            .unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS));
        let cwd = options.cwd.unwrap_or_else(|| self.resolver.resolve());

        debug!(command = %command, cwd = %cwd.display(), "Executing fleet command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&cwd)
            .env("PATH", self.extended_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let timeout_ms = timeout.as_millis() as u64;
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                // 超时：持有 child 的 future 被丢弃，kill_on_drop 负责终止进程
                warn!(command = %command, timeout_ms, "Command timed out, killing process");
                return Err(ExecError::Timeout { timeout_ms });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok(ExecOutput { stdout, stderr })
        } else {
            Err(ExecError::Failure {
                status: output.status.code().unwrap_or(-1),
                stdout,
                stderr,
            })
        }
    }

    /// 构造扩展后的 PATH：配置的 bin 目录在前，继承的 PATH 在后
    fn extended_path(&self) -> String {
        let inherited = std::env::var("PATH").unwrap_or_default();
        let dirs = self.config.bin_dirs();
        if dirs.is_empty() {
            return inherited;
        }
        let mut parts: Vec<String> = dirs.iter().map(|p| p.display().to_string()).collect();
        parts.push(inherited);
        parts.join(":")
    }
}

/// 校验可安全插入 shell 命令的标识符（字母数字、下划线、短横线）
pub fn is_safe_token(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_safe_token() {
        assert!(is_safe_token("editor_fleet5"));
        assert!(is_safe_token("crew-Emma5"));
        assert!(!is_safe_token(""));
        assert!(!is_safe_token("rig; rm -rf /"));
        assert!(!is_safe_token("a b"));
    }
}
