//! 状态快照模块 - fleet status 输出的类型、归一化与汇总

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// 默认舰队名称（输出未携带名称时使用）
pub const DEFAULT_FLEET_NAME: &str = "Fleet";

/// Agent 角色，由名称与可选角色提示确定性推导，永不歧义
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Coordinator,
    HealthChecker,
    Patrol,
    Worker,
    CrewMember,
    Unknown,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Coordinator => write!(f, "coordinator"),
            AgentRole::HealthChecker => write!(f, "health-checker"),
            AgentRole::Patrol => write!(f, "patrol"),
            AgentRole::Worker => write!(f, "worker"),
            AgentRole::CrewMember => write!(f, "crew-member"),
            AgentRole::Unknown => write!(f, "unknown"),
        }
    }
}

/// 单个被监控的 Agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub name: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub role: AgentRole,
    pub running: bool,
    pub has_work: bool,
    pub unread_mail: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_subject: Option<String>,
}

/// 一次内部一致的聚合状态快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    pub name: String,
    /// 归一化时观察到的分组（rig）名称，扁平格式下为空
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rigs: Vec<String>,
    pub agents: Vec<Agent>,
}

impl StatusSnapshot {
    /// 规范空快照：解析失败时的统一返回值
    pub fn empty() -> Self {
        Self {
            name: DEFAULT_FLEET_NAME.to_string(),
            rigs: Vec::new(),
            agents: Vec::new(),
        }
    }
}

/// 按角色聚合的统计
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RoleBreakdown {
    pub total: u32,
    pub running: u32,
    pub with_work: u32,
    pub unread_mail: u32,
}

/// 快照汇总
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusSummary {
    pub total_agents: u32,
    pub running_agents: u32,
    pub agents_with_work: u32,
    pub total_unread_mail: u32,
    pub by_role: HashMap<AgentRole, RoleBreakdown>,
}

/// fleet status --json 中的原始 agent 条目，除名称外均可缺省
#[derive(Debug, Clone, Deserialize)]
struct WireAgent {
    name: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    running: bool,
    #[serde(default)]
    has_work: bool,
    #[serde(default)]
    unread_mail: u32,
    #[serde(default)]
    first_subject: Option<String>,
}

/// 顶层对象格式：扁平 agents 与嵌套 rigs 可同时出现
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireStatus {
    name: Option<String>,
    agents: Vec<WireAgent>,
    rigs: Vec<WireRig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireRig {
    name: Option<String>,
    agents: Vec<WireAgent>,
}

/// 从名称与可选角色提示推导角色
///
/// 推导是确定性的：同样的输入永远得到同一角色，无法识别时落到 Unknown。
pub fn derive_role(name: &str, hint: Option<&str>) -> AgentRole {
    let name = name.to_lowercase();
    let hint = hint.map(|h| h.to_lowercase()).unwrap_or_default();

    if name == "coordinator" {
        return AgentRole::Coordinator;
    }
    if name == "healthchecker" || name == "health-checker" || hint == "health-check" {
        return AgentRole::HealthChecker;
    }
    if name.contains("witness") || name.contains("patrol") || hint == "witness" || hint == "patrol"
    {
        return AgentRole::Patrol;
    }
    if hint == "worker" || hint == "polecat" || name.contains("worker") {
        return AgentRole::Worker;
    }
    if hint == "crew" {
        return AgentRole::CrewMember;
    }
    AgentRole::Unknown
}

/// 解析 fleet status --json 输出为规范快照
///
/// 接受三种格式：扁平 `{agents: [...]}`、嵌套 `{rigs: [{agents: [...]}]}`、
/// 以及旧版的顶层 agent 数组。任何解析错误都返回规范空快照，绝不向上抛出。
/// 同名 agent 出现在多个分组下时，归一化顺序中的后出现者胜出。
pub fn parse_status(stdout: &str) -> StatusSnapshot {
    let trimmed = stdout.trim();
    let text = if trimmed.is_empty() { "{}" } else { trimmed };

    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "Failed to parse fleet status output");
            return StatusSnapshot::empty();
        }
    };

    let mut snapshot = StatusSnapshot::empty();
    let mut index: HashMap<String, usize> = HashMap::new();

    // 旧版格式：顶层直接是 agent 数组
    if value.is_array() {
        let wire: Vec<WireAgent> = serde_json::from_value(value).unwrap_or_default();
        for agent in wire {
            upsert_agent(&mut snapshot.agents, &mut index, agent);
        }
        return snapshot;
    }

    let wire: WireStatus = match serde_json::from_value(value) {
        Ok(wire) => wire,
        Err(err) => {
            warn!(error = %err, "Unexpected fleet status shape");
            return StatusSnapshot::empty();
        }
    };

    if let Some(name) = wire.name {
        if !name.is_empty() {
            snapshot.name = name;
        }
    }
    for agent in wire.agents {
        upsert_agent(&mut snapshot.agents, &mut index, agent);
    }
    for rig in wire.rigs {
        if let Some(name) = rig.name {
            if !name.is_empty() && !snapshot.rigs.contains(&name) {
                snapshot.rigs.push(name);
            }
        }
        for agent in rig.agents {
            upsert_agent(&mut snapshot.agents, &mut index, agent);
        }
    }
    snapshot
}

/// 按名称插入或覆盖（同名 agent 后出现者胜出）
fn upsert_agent(agents: &mut Vec<Agent>, index: &mut HashMap<String, usize>, wire: WireAgent) {
    let role = derive_role(&wire.name, wire.role.as_deref());
    let agent = Agent {
        address: wire.address.unwrap_or_else(|| wire.name.clone()),
        name: wire.name,
        session: wire.session,
        role,
        running: wire.running,
        has_work: wire.has_work,
        unread_mail: wire.unread_mail,
        first_subject: wire.first_subject,
    };
    match index.get(&agent.name) {
        Some(&existing) => agents[existing] = agent,
        None => {
            index.insert(agent.name.clone(), agents.len());
            agents.push(agent);
        }
    }
}

/// 计算快照汇总
pub fn summarize(snapshot: &StatusSnapshot) -> StatusSummary {
    let mut by_role: HashMap<AgentRole, RoleBreakdown> = HashMap::new();

    for agent in &snapshot.agents {
        let entry = by_role.entry(agent.role).or_default();
        entry.total += 1;
        if agent.running {
            entry.running += 1;
        }
        if agent.has_work {
            entry.with_work += 1;
        }
        entry.unread_mail += agent.unread_mail;
    }

    StatusSummary {
        total_agents: snapshot.agents.len() as u32,
        running_agents: snapshot.agents.iter().filter(|a| a.running).count() as u32,
        agents_with_work: snapshot.agents.iter().filter(|a| a.has_work).count() as u32,
        total_unread_mail: snapshot.agents.iter().map(|a| a.unread_mail).sum(),
        by_role,
    }
}
