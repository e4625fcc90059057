//! Fleet Monitor - 自治 Agent 舰队的实时状态聚合
//!
//! 通过外部 fleet CLI 与 tmux 会话聚合舰队状态：
//! 根目录解析、带超时的命令执行、单飞行状态合并、
//! 容错的文本解析器、资源级 TTL 缓存与轮询控制。

pub mod activity;
pub mod cache;
pub mod client;
pub mod clock;
pub mod coalescer;
pub mod config;
pub mod convoy;
pub mod mail;
pub mod merge_queue;
pub mod poller;
pub mod refinery;
pub mod root;
pub mod runner;
pub mod status;
pub mod tmux;

pub use activity::{classify_activity, ActivityClassification, ActivityClassifier};
pub use cache::ResourceCache;
pub use client::{AgentActivity, DoctorReport, FleetClient, NukeError};
pub use clock::{Clock, FakeClock, SystemClock};
pub use coalescer::{StatusCoalescer, StatusFetch, STATUS_CACHE_TTL};
pub use config::MonitorConfig;
pub use convoy::{parse_convoys, Convoy, ConvoyProgress, ConvoyStatus};
pub use mail::{parse_inbox, MailMessage, Mailbox};
pub use merge_queue::{parse_merge_queue, QueueItem};
pub use poller::{PollFetch, PollState, PollingController};
pub use refinery::{
    parse_issues, parse_refinery_descriptor, AgentState, Issue, Refinery, RefineryStatus,
};
pub use root::{RootResolver, ROOT_ENV_VAR, ROOT_MARKER};
pub use runner::{is_safe_token, CommandRunner, ExecError, ExecOptions, ExecOutput};
pub use status::{
    derive_role, parse_status, summarize, Agent, AgentRole, StatusSnapshot, StatusSummary,
};
pub use tmux::TmuxManager;
