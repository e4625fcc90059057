//! 舰队客户端模块 - 面向消费方的聚合查询门面

use crate::activity::{ActivityClassification, ActivityClassifier};
use crate::cache::ResourceCache;
use crate::coalescer::{StatusCoalescer, StatusFetch};
use crate::config::MonitorConfig;
use crate::convoy::{parse_convoys, Convoy};
use crate::mail::{parse_inbox, Mailbox};
use crate::merge_queue::{parse_merge_queue, QueueItem};
use crate::refinery::{parse_issues, parse_refinery_descriptor, Issue, Refinery, RefineryRecord};
use crate::root::RootResolver;
use crate::runner::{is_safe_token, CommandRunner, ExecError, ExecOptions, ExecOutput};
use crate::status::{summarize, Agent, AgentRole, StatusSnapshot, StatusSummary};
use crate::tmux::TmuxManager;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// fleet status 获取超时（比普通命令宽松）
const STATUS_TIMEOUT: Duration = Duration::from_millis(15_000);
/// 邮件缓存 TTL
const MAIL_CACHE_TTL: Duration = Duration::from_millis(10_000);
/// 集合资源缓存 TTL
const RESOURCE_CACHE_TTL: Duration = Duration::from_millis(5_000);
/// 合并队列查询超时
const QUEUE_TIMEOUT: Duration = Duration::from_millis(5_000);
/// doctor 全量检查超时
const DOCTOR_TIMEOUT: Duration = Duration::from_millis(120_000);
/// 销毁 worker 的超时（清理 worktree 可能较慢）
const NUKE_TIMEOUT: Duration = Duration::from_millis(30_000);
/// 活动分类取用的 scrollback 行数
const ACTIVITY_LINES: u32 = 20;

/// 单个 Agent 的活动视图
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentActivity {
    pub session: String,
    pub name: String,
    pub role: AgentRole,
    #[serde(flatten)]
    pub classification: ActivityClassification,
}

/// 诊断检查报告
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DoctorReport {
    pub success: bool,
    pub has_issues: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

/// 销毁 worker 失败的分类
#[derive(Debug, Error)]
pub enum NukeError {
    /// 安全检查拒绝（未提交/未推送的工作或活跃的合并请求），可 force 覆盖
    #[error("safety check refused to nuke {name}: {details}")]
    SafetyCheck {
        name: String,
        details: String,
        can_force: bool,
    },
    /// worker 不存在
    #[error("worker {name} not found in rig {rig}")]
    NotFound {
        rig: String,
        name: String,
        details: String,
    },
    /// 非法的 rig 或 worker 名称
    #[error("invalid rig or worker name")]
    InvalidName,
    /// 其他执行失败
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// 通过 CommandRunner 执行 fleet status 的获取器
struct RunnerStatusFetch {
    runner: Arc<CommandRunner>,
}

impl StatusFetch for RunnerStatusFetch {
    fn fetch(&self) -> BoxFuture<'static, Result<ExecOutput, ExecError>> {
        let runner = self.runner.clone();
        async move {
            runner
                .execute(
                    r#"fleet status --json 2>/dev/null || echo "{}""#,
                    ExecOptions {
                        timeout: Some(STATUS_TIMEOUT),
                        cwd: None,
                    },
                )
                .await
        }
        .boxed()
    }
}

/// 舰队聚合客户端
///
/// 持有状态合并器与各资源缓存。所有查询对调用方都不抛错：
/// 外部接口异常时退化为空集合或 None，最后一份好数据在
/// 后台重试期间继续可见。
pub struct FleetClient {
    runner: Arc<CommandRunner>,
    resolver: Arc<RootResolver>,
    tmux: TmuxManager,
    classifier: ActivityClassifier,
    coalescer: StatusCoalescer,
    issues: ResourceCache<Vec<Issue>>,
    convoys: ResourceCache<Vec<Convoy>>,
    refineries: ResourceCache<Vec<Refinery>>,
    /// 按地址独立的收件箱缓存
    mailboxes: Mutex<HashMap<String, Arc<ResourceCache<Mailbox>>>>,
}

impl FleetClient {
    /// 以默认配置文件构建客户端
    pub fn new() -> Self {
        Self::with_config(MonitorConfig::load())
    }

    pub fn with_config(config: MonitorConfig) -> Self {
        let resolver = Arc::new(RootResolver::new(config.clone()));
        let runner = Arc::new(CommandRunner::new(config, resolver.clone()));
        Self::with_runner(runner, resolver)
    }

    /// 注入 runner 与 resolver（测试用）
    pub fn with_runner(runner: Arc<CommandRunner>, resolver: Arc<RootResolver>) -> Self {
        let fetcher = Arc::new(RunnerStatusFetch {
            runner: runner.clone(),
        });
        Self {
            tmux: TmuxManager::new(runner.clone()),
            classifier: ActivityClassifier::new(),
            coalescer: StatusCoalescer::new(fetcher),
            issues: ResourceCache::new(RESOURCE_CACHE_TTL),
            convoys: ResourceCache::new(RESOURCE_CACHE_TTL),
            refineries: ResourceCache::new(RESOURCE_CACHE_TTL),
            mailboxes: Mutex::new(HashMap::new()),
            resolver,
            runner,
        }
    }

    /// 合并后的状态快照（5 秒 TTL，单飞行）
    pub async fn status(&self) -> Option<Arc<StatusSnapshot>> {
        self.coalescer.get().await
    }

    /// 快照汇总
    pub async fn summary(&self) -> Option<StatusSummary> {
        self.status().await.map(|snapshot| summarize(&snapshot))
    }

    /// 角色过滤：worker
    pub async fn workers(&self) -> Vec<Agent> {
        self.agents_by_role(AgentRole::Worker).await
    }

    /// 角色过滤：patrol/witness 单元
    pub async fn patrols(&self) -> Vec<Agent> {
        self.agents_by_role(AgentRole::Patrol).await
    }

    async fn agents_by_role(&self, role: AgentRole) -> Vec<Agent> {
        match self.status().await {
            Some(snapshot) => snapshot
                .agents
                .iter()
                .filter(|a| a.role == role)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// 所有运行中 Agent 的当前活动
    ///
    /// 并行捕获各 session 的 scrollback 并分类；
    /// 捕获失败（session 不存在等）的 Agent 被静默跳过。
    pub async fn activities(&self) -> Vec<AgentActivity> {
        if !self.tmux.available() {
            debug!("tmux not available, skipping activity capture");
            return Vec::new();
        }
        let Some(snapshot) = self.status().await else {
            return Vec::new();
        };

        let targets: Vec<(String, String, AgentRole)> = snapshot
            .agents
            .iter()
            .filter(|a| a.running)
            .filter_map(|a| {
                a.session
                    .clone()
                    .map(|session| (session, a.name.clone(), a.role))
            })
            .collect();

        let captures = join_all(
            targets
                .iter()
                .map(|(session, _, _)| self.tmux.capture_pane(session, ACTIVITY_LINES)),
        )
        .await;

        targets
            .into_iter()
            .zip(captures)
            .filter_map(|((session, name, role), capture)| match capture {
                Ok(output) => Some(AgentActivity {
                    classification: self.classifier.classify(&output),
                    session,
                    name,
                    role,
                }),
                Err(err) => {
                    debug!(session = %session, error = %err, "Pane capture failed");
                    None
                }
            })
            .collect()
    }

    /// 指定地址的收件箱（10 秒 TTL，按地址独立缓存）
    pub async fn inbox(&self, address: &str) -> Arc<Mailbox> {
        if !is_safe_token(address) {
            warn!(address = %address, "Rejecting unsafe mail address");
            return Arc::new(Mailbox::default());
        }

        let cache = {
            let mut boxes = self.mailboxes.lock().unwrap();
            boxes
                .entry(address.to_string())
                .or_insert_with(|| Arc::new(ResourceCache::new(MAIL_CACHE_TTL)))
                .clone()
        };

        let runner = self.runner.clone();
        let address = address.to_string();
        cache
            .get_with(|| async move {
                let command = format!(
                    r#"fleet mail inbox {addr} --json 2>/dev/null || fleet mail inbox {addr} 2>/dev/null || echo "[]""#,
                    addr = address
                );
                match runner.execute(&command, ExecOptions::default()).await {
                    Ok(output) => Some(parse_inbox(&output.stdout, &address)),
                    Err(err) => {
                        warn!(address = %address, error = %err, "Mail inbox fetch failed");
                        None
                    }
                }
            })
            .await
    }

    /// issue 列表（JSON 数组或 JSONL，5 秒 TTL）
    pub async fn issues(&self) -> Arc<Vec<Issue>> {
        let runner = self.runner.clone();
        self.issues
            .get_with(|| async move {
                match runner
                    .execute(
                        r#"fleet bd list --json 2>/dev/null || echo "[]""#,
                        ExecOptions::default(),
                    )
                    .await
                {
                    Ok(output) => Some(parse_issues(&output.stdout)),
                    Err(err) => {
                        warn!(error = %err, "Issue listing failed");
                        None
                    }
                }
            })
            .await
    }

    /// convoy 列表（5 秒 TTL）
    pub async fn convoys(&self) -> Arc<Vec<Convoy>> {
        let runner = self.runner.clone();
        self.convoys
            .get_with(|| async move {
                match runner
                    .execute(
                        r#"fleet convoy list --json 2>/dev/null || echo "[]""#,
                        ExecOptions::default(),
                    )
                    .await
                {
                    Ok(output) => Some(parse_convoys(&output.stdout)),
                    Err(err) => {
                        warn!(error = %err, "Convoy listing failed");
                        None
                    }
                }
            })
            .await
    }

    /// 指定 rig 的合并队列（不单独缓存，refineries 视图有自己的 TTL）
    pub async fn merge_queue(&self, rig: &str) -> Vec<QueueItem> {
        if !is_safe_token(rig) {
            warn!(rig = %rig, "Rejecting unsafe rig name");
            return Vec::new();
        }
        match self
            .runner
            .execute(
                &format!("fleet mq list {}", rig),
                ExecOptions {
                    timeout: Some(QUEUE_TIMEOUT),
                    cwd: None,
                },
            )
            .await
        {
            Ok(output) => parse_merge_queue(&output.stdout),
            Err(err) => {
                warn!(rig = %rig, error = %err, "Merge queue fetch failed");
                Vec::new()
            }
        }
    }

    /// 全部 rig 的 refinery 视图（5 秒 TTL）
    ///
    /// rig 名称取状态快照分组与描述块 rig 字段的并集；
    /// 各 rig 的合并队列并行获取，缺失描述块的 rig 使用默认值。
    pub async fn refineries(&self) -> Arc<Vec<Refinery>> {
        let this = self;
        self.refineries
            .get_with(|| async move {
                let issues = this.issues().await;
                let records: Vec<RefineryRecord> = issues
                    .iter()
                    .filter_map(parse_refinery_descriptor)
                    .collect();

                let mut rigs: Vec<String> = Vec::new();
                if let Some(snapshot) = this.status().await {
                    for rig in &snapshot.rigs {
                        if !rigs.contains(rig) {
                            rigs.push(rig.clone());
                        }
                    }
                }
                for record in &records {
                    if !record.rig.is_empty() && !rigs.contains(&record.rig) {
                        rigs.push(record.rig.clone());
                    }
                }

                let queues = join_all(rigs.iter().map(|rig| this.merge_queue(rig))).await;

                let refineries = rigs
                    .into_iter()
                    .zip(queues)
                    .map(|(rig, queue)| {
                        let record = records.iter().find(|r| r.rig == rig);
                        Refinery {
                            id: record
                                .map(|r| r.id.clone())
                                .unwrap_or_else(|| format!("refinery-{}", rig)),
                            name: record
                                .map(|r| r.name.clone())
                                .unwrap_or_else(|| format!("{} Refinery", rig)),
                            status: record.map(|r| r.status).unwrap_or_default(),
                            agent_state: record.map(|r| r.agent_state).unwrap_or_default(),
                            queue_depth: queue.len() as u32,
                            queue_items: queue,
                            unread_mail: 0,
                            rig,
                        }
                    })
                    .collect();
                Some(refineries)
            })
            .await
    }

    /// 运行舰队诊断
    ///
    /// doctor 在发现问题时以非零退出但仍输出诊断内容，
    /// 因此非零退出且有 stdout 时视为"检查完成、存在问题"。
    pub async fn doctor_check(&self) -> Result<DoctorReport, ExecError> {
        match self
            .runner
            .execute(
                "fleet doctor --verbose",
                ExecOptions {
                    timeout: Some(DOCTOR_TIMEOUT),
                    cwd: None,
                },
            )
            .await
        {
            Ok(output) => Ok(DoctorReport {
                success: true,
                has_issues: false,
                output: if output.stdout.is_empty() {
                    "No issues found".to_string()
                } else {
                    output.stdout
                },
                stderr: non_empty(output.stderr),
            }),
            Err(ExecError::Failure { stdout, stderr, .. }) if !stdout.is_empty() => {
                Ok(DoctorReport {
                    success: true,
                    has_issues: true,
                    output: stdout,
                    stderr: non_empty(stderr),
                })
            }
            Err(err) => {
                error!(error = %err, "Doctor check failed");
                Err(err)
            }
        }
    }

    /// 彻底销毁一个 worker（session、worktree、分支、agent 记录）
    ///
    /// 目标拒绝执行时按输出内容分类：安全检查失败可用 force 覆盖，
    /// 不存在的 worker 单独上报。
    pub async fn worker_nuke(
        &self,
        rig: &str,
        name: &str,
        force: bool,
    ) -> Result<String, NukeError> {
        if !is_safe_token(rig) || !is_safe_token(name) {
            return Err(NukeError::InvalidName);
        }

        let force_flag = if force { " --force" } else { "" };
        let command = format!("fleet worker nuke {}/{}{}", rig, name, force_flag);
        match self
            .runner
            .execute(
                &command,
                ExecOptions {
                    timeout: Some(NUKE_TIMEOUT),
                    cwd: None,
                },
            )
            .await
        {
            Ok(output) => Ok(output.stdout),
            Err(ExecError::Failure {
                status,
                stdout,
                stderr,
            }) => {
                let details = if stderr.trim().is_empty() {
                    stdout.clone()
                } else {
                    stderr.clone()
                };
                let lowered = details.to_lowercase();
                if lowered.contains("uncommitted")
                    || lowered.contains("unpushed")
                    || lowered.contains("merge request")
                    || lowered.contains("work on hook")
                    || lowered.contains("safety check")
                {
                    Err(NukeError::SafetyCheck {
                        name: name.to_string(),
                        details,
                        can_force: true,
                    })
                } else if lowered.contains("not found") || lowered.contains("does not exist") {
                    Err(NukeError::NotFound {
                        rig: rig.to_string(),
                        name: name.to_string(),
                        details,
                    })
                } else {
                    Err(NukeError::Exec(ExecError::Failure {
                        status,
                        stdout,
                        stderr,
                    }))
                }
            }
            Err(err) => Err(NukeError::Exec(err)),
        }
    }

    /// 失效全部缓存；下一次查询重新获取
    pub fn invalidate(&self) {
        self.coalescer.reset();
        self.issues.invalidate();
        self.convoys.invalidate();
        self.refineries.invalidate();
        for cache in self.mailboxes.lock().unwrap().values() {
            cache.invalidate();
        }
    }

    /// 失效并立刻重新拉取状态快照
    pub async fn refresh(&self) -> Option<Arc<StatusSnapshot>> {
        self.invalidate();
        self.status().await
    }

    /// 当前解析出的舰队根目录（设置页展示用）
    pub fn resolved_root(&self) -> PathBuf {
        self.resolver.resolve()
    }

    /// 清除根目录缓存（配置变更后调用）
    pub fn reset_root_cache(&self) {
        self.resolver.reset();
    }
}

impl Default for FleetClient {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
