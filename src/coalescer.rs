//! 状态合并模块 - 带 TTL 缓存与单飞行保证的 fleet status 获取

use crate::clock::{system_clock, Clock};
use crate::runner::{ExecError, ExecOutput};
use crate::status::{parse_status, StatusSnapshot};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 状态缓存 TTL：与客户端默认轮询间隔一致，
/// N 个独立轮询方在一个窗口内只触发一次外部调用
pub const STATUS_CACHE_TTL: Duration = Duration::from_millis(5_000);

/// 外部状态获取接口（可注入，便于测试）
pub trait StatusFetch: Send + Sync {
    fn fetch(&self) -> BoxFuture<'static, Result<ExecOutput, ExecError>>;
}

type SharedFetch = Shared<BoxFuture<'static, Option<Arc<StatusSnapshot>>>>;

struct CoalescerState {
    cache: Option<(Arc<StatusSnapshot>, Instant)>,
    in_flight: Option<SharedFetch>,
}

/// fleet status 合并器
///
/// 缓存命中直接返回；未命中时保证任意数量的并发调用共享同一次
/// 外部命令执行。获取失败不写缓存，下一次调用立即重试。
pub struct StatusCoalescer {
    ttl: Duration,
    fetcher: Arc<dyn StatusFetch>,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<CoalescerState>>,
}

impl StatusCoalescer {
    pub fn new(fetcher: Arc<dyn StatusFetch>) -> Self {
        Self::with_parts(fetcher, system_clock(), STATUS_CACHE_TTL)
    }

    /// 注入时钟与 TTL（测试用）
    pub fn with_parts(fetcher: Arc<dyn StatusFetch>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            ttl,
            fetcher,
            clock,
            state: Arc::new(Mutex::new(CoalescerState {
                cache: None,
                in_flight: None,
            })),
        }
    }

    /// 获取状态快照
    ///
    /// 返回 None 仅发生在获取过程出现运行时错误（超时/启动失败）时；
    /// 命令输出无法解析会得到规范空快照而不是 None。
    pub async fn get(&self) -> Option<Arc<StatusSnapshot>> {
        let shared = {
            let mut state = self.state.lock().unwrap();

            // 缓存仍然新鲜：直接返回
            if let Some((snapshot, stamp)) = &state.cache {
                if self.clock.now().duration_since(*stamp) < self.ttl {
                    return Some(snapshot.clone());
                }
            }

            // 已有进行中的获取：共用同一个 future
            if let Some(in_flight) = state.in_flight.clone() {
                in_flight
            } else {
                // 标记必须在任何 await 之前安装，
                // 否则两个同步到达的调用方会各自发起获取
                let shared = self.spawn_fetch();
                state.in_flight = Some(shared.clone());
                shared
            }
        };

        shared.await
    }

    fn spawn_fetch(&self) -> SharedFetch {
        let fetcher = self.fetcher.clone();
        let clock = self.clock.clone();
        let state = self.state.clone();

        async move {
            let parsed = match fetcher.fetch().await {
                Ok(output) => Some(parse_status(&output.stdout)),
                // 非零退出视为"命令自身失败"：喂入安全的空 JSON 兜底串
                Err(ExecError::Failure { status, .. }) => {
                    debug!(status, "Status command exited non-zero, using empty fallback");
                    Some(parse_status("{}"))
                }
                // 超时/启动失败：所有等待方得到 None，缓存保持原样
                Err(err) => {
                    warn!(error = %err, "Status fetch failed");
                    None
                }
            };

            let mut state = state.lock().unwrap();
            state.in_flight = None;
            match parsed {
                Some(snapshot) => {
                    let snapshot = Arc::new(snapshot);
                    state.cache = Some((snapshot.clone(), clock.now()));
                    Some(snapshot)
                }
                None => None,
            }
        }
        .boxed()
        .shared()
    }

    /// 清空缓存；进行中的获取不受影响，完成后照常写入
    pub fn reset(&self) {
        self.state.lock().unwrap().cache = None;
    }

    /// 当前是否持有新鲜缓存（诊断用）
    pub fn is_cached(&self) -> bool {
        let state = self.state.lock().unwrap();
        match &state.cache {
            Some((_, stamp)) => self.clock.now().duration_since(*stamp) < self.ttl,
            None => false,
        }
    }
}
