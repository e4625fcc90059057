//! Fleet Monitor CLI
//!
//! 聚合查询自治 Agent 舰队的实时状态 (fleet CLI + tmux 会话)

use anyhow::Result;
use clap::{Parser, Subcommand};
use fleet_monitor::{FleetClient, NukeError, PollFetch, PollingController};
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "flm")]
#[command(about = "Fleet Monitor - 聚合查询自治 Agent 舰队的实时状态")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 查看舰队状态快照
    Status {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查看所有运行中 Agent 的当前活动
    Activity {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查看收件箱
    Inbox {
        /// 收件地址
        #[arg(default_value = "overseer")]
        address: String,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查看指定 rig 的合并队列
    Queue {
        /// rig 名称
        rig: String,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查看所有 rig 的 refinery 状态
    Refineries {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查看 convoy 列表
    Convoys {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查看 issue 列表
    Issues {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 运行舰队诊断检查
    Doctor,
    /// 彻底销毁一个 worker（危险操作）
    Nuke {
        /// rig 名称
        rig: String,
        /// worker 名称
        name: String,
        /// 跳过安全检查强制执行
        #[arg(long)]
        force: bool,
    },
    /// 持续轮询并打印舰队状态汇总
    Watch {
        /// 轮询间隔（秒）
        #[arg(long, short, default_value = "5")]
        interval: u64,
    },
    /// 显示解析出的舰队根目录
    Root,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化 tracing 日志系统
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug flm watch
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fleet_monitor=info,flm=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let client = Arc::new(FleetClient::new());

    match cli.command {
        Commands::Status { json } => match client.status().await {
            Some(snapshot) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&*snapshot)?);
                } else {
                    println!("舰队: {} ({} 个 Agent)\n", snapshot.name, snapshot.agents.len());
                    for agent in &snapshot.agents {
                        println!(
                            "  {} | 角色: {} | 运行: {} | 待办: {} | 未读: {}",
                            agent.name,
                            agent.role,
                            if agent.running { "是" } else { "否" },
                            if agent.has_work { "是" } else { "否" },
                            agent.unread_mail
                        );
                    }
                }
            }
            None => {
                eprintln!("无法获取舰队状态");
                std::process::exit(1);
            }
        },
        Commands::Activity { json } => {
            let activities = client.activities().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&activities)?);
            } else if activities.is_empty() {
                println!("没有可捕获的活动 (无运行中的 session 或 tmux 不可用)");
            } else {
                for activity in &activities {
                    let duration = activity
                        .classification
                        .duration
                        .as_deref()
                        .map(|d| format!(" ({})", d))
                        .unwrap_or_default();
                    println!(
                        "  [{}] {} - {}{}",
                        activity.role, activity.name, activity.classification.activity, duration
                    );
                }
            }
        }
        Commands::Inbox { address, json } => {
            let mailbox = client.inbox(&address).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&*mailbox)?);
            } else {
                println!(
                    "收件箱 {} ({} 封, {} 未读)\n",
                    address,
                    mailbox.messages.len(),
                    mailbox.unread_count
                );
                for msg in &mailbox.messages {
                    println!(
                        "  {} {} | {} | {}",
                        if msg.read { " " } else { "●" },
                        msg.id,
                        msg.from,
                        msg.subject
                    );
                }
            }
        }
        Commands::Queue { rig, json } => {
            let items = client.merge_queue(&rig).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                println!("rig {} 的合并队列 ({} 项)\n", rig, items.len());
                for item in &items {
                    println!(
                        "  {} | 分支: {} | 状态: {}",
                        item.id,
                        item.branch.as_deref().unwrap_or("-"),
                        item.title.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Commands::Refineries { json } => {
            let refineries = client.refineries().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&*refineries)?);
            } else {
                println!("发现 {} 个 refinery:\n", refineries.len());
                for refinery in refineries.iter() {
                    println!(
                        "  {} | rig: {} | 状态: {:?} | 队列深度: {}",
                        refinery.name, refinery.rig, refinery.status, refinery.queue_depth
                    );
                }
            }
        }
        Commands::Convoys { json } => {
            let convoys = client.convoys().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&*convoys)?);
            } else {
                println!("发现 {} 个 convoy:\n", convoys.len());
                for convoy in convoys.iter() {
                    println!(
                        "  {} | {} | {:?} | 进度: {}/{}",
                        convoy.id,
                        convoy.title,
                        convoy.status,
                        convoy.progress.completed,
                        convoy.progress.total
                    );
                }
            }
        }
        Commands::Issues { json } => {
            let issues = client.issues().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&*issues)?);
            } else {
                println!("发现 {} 个 issue:\n", issues.len());
                for issue in issues.iter() {
                    println!(
                        "  {} | {} | 类型: {}",
                        issue.id,
                        issue.title,
                        if issue.issue_type.is_empty() {
                            "-"
                        } else {
                            issue.issue_type.as_str()
                        }
                    );
                }
            }
        }
        Commands::Doctor => {
            println!("运行舰队诊断中（可能需要几分钟）...");
            match client.doctor_check().await {
                Ok(report) => {
                    println!("{}", report.output.trim());
                    if report.has_issues {
                        println!("\n⚠️  诊断发现问题");
                        std::process::exit(1);
                    }
                    println!("\n✅ 诊断通过");
                }
                Err(err) => {
                    eprintln!("诊断执行失败: {}", err);
                    std::process::exit(1);
                }
            }
        }
        Commands::Nuke { rig, name, force } => {
            match client.worker_nuke(&rig, &name, force).await {
                Ok(output) => {
                    println!("已销毁 worker: {}/{}", rig, name);
                    if !output.trim().is_empty() {
                        println!("{}", output.trim());
                    }
                }
                Err(NukeError::SafetyCheck { details, .. }) => {
                    eprintln!("安全检查未通过，worker 仍有未完成的工作:");
                    eprintln!("{}", details.trim());
                    eprintln!("确认无误后可使用 --force 强制销毁");
                    std::process::exit(1);
                }
                Err(err) => {
                    eprintln!("销毁失败: {}", err);
                    std::process::exit(1);
                }
            }
        }
        Commands::Watch { interval } => {
            println!("🔍 开始监控舰队状态 (间隔: {}秒)...", interval);
            println!("按 Ctrl+C 退出\n");

            let poll_client = client.clone();
            let fetch: PollFetch = Arc::new(move || {
                let client = poll_client.clone();
                async move {
                    // 每轮强制重新获取，绕过 TTL
                    client.invalidate();
                    match client.summary().await {
                        Some(summary) => println!(
                            "Agent: {} 总数 / {} 运行中 / {} 有待办 / {} 未读邮件",
                            summary.total_agents,
                            summary.running_agents,
                            summary.agents_with_work,
                            summary.total_unread_mail
                        ),
                        None => eprintln!("状态获取失败，等待下次轮询"),
                    }
                }
                .boxed()
            });

            let poller = PollingController::new(Duration::from_secs(interval), fetch);
            poller.enable();
            tokio::signal::ctrl_c().await?;
            poller.disable();
            println!("已停止监控");
        }
        Commands::Root => {
            println!("{}", client.resolved_root().display());
        }
    }

    Ok(())
}
