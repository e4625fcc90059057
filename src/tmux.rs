//! tmux 管理模块 - Agent 会话的 pane 捕获

use crate::runner::{is_safe_token, CommandRunner, ExecError, ExecOptions};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// pane 捕获超时
const CAPTURE_TIMEOUT: Duration = Duration::from_millis(3_000);

/// tmux 探测结果缓存：0 未探测 / 1 可用 / 2 不可用
const PROBE_UNKNOWN: u8 = 0;
const PROBE_FOUND: u8 = 1;
const PROBE_MISSING: u8 = 2;

/// tmux 管理器
///
/// 所有 tmux 调用都经过 CommandRunner，配置的 bin 目录因此同样生效。
pub struct TmuxManager {
    runner: Arc<CommandRunner>,
    available: AtomicU8,
}

impl TmuxManager {
    pub fn new(runner: Arc<CommandRunner>) -> Self {
        Self {
            runner,
            available: AtomicU8::new(PROBE_UNKNOWN),
        }
    }

    /// tmux 是否可用（探测结果缓存进程生命周期）
    pub fn available(&self) -> bool {
        match self.available.load(Ordering::Relaxed) {
            PROBE_FOUND => true,
            PROBE_MISSING => false,
            _ => {
                let found = which::which("tmux").is_ok();
                debug!(found, "Probed for tmux binary");
                self.available.store(
                    if found { PROBE_FOUND } else { PROBE_MISSING },
                    Ordering::Relaxed,
                );
                found
            }
        }
    }

    /// 捕获指定 session 最近 lines 行的终端输出
    pub async fn capture_pane(&self, session: &str, lines: u32) -> Result<String, ExecError> {
        if !is_safe_token(session) {
            return Err(ExecError::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid session name: {}", session),
            )));
        }

        let command = format!(
            "tmux capture-pane -t {} -p 2>/dev/null | tail -{}",
            session, lines
        );
        let output = self
            .runner
            .execute(
                &command,
                ExecOptions {
                    timeout: Some(CAPTURE_TIMEOUT),
                    cwd: None,
                },
            )
            .await?;
        Ok(output.stdout)
    }
}
