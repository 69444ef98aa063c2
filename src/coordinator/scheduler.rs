//! Agent 调度器
//!
//! 按注册顺序扫描，依赖全部完成的 pending Agent 才可执行；一个 Agent 失败不影响
//! 与它无依赖关系的 Agent，但会永久阻塞依赖它的 Agent（本轮不自动重试）。
//! 依赖图是否有环由调用方保证，调度器不做环检测；无法就绪的 Agent 保持 pending，
//! run_all 静默以部分完成收尾，调用方通过最终状态自行检查。

use std::collections::HashMap;

use serde_json::json;
use thiserror::Error;

use crate::agent::{Agent, RunOutcome};
use crate::coordinator::global_memory::GlobalMemoryManager;
use crate::coordinator::progress::{AgentStatus, ProgressTracker};
use crate::report::{ReportType, ReportTypeConfig};

/// 调度错误
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("未注册的 Agent: {0}")]
    UnknownAgent(String),

    #[error("Agent {agent} 当前状态 {status:?} 不可执行")]
    InvalidState { agent: String, status: AgentStatus },

    /// 全局聚合写盘失败（静默丢写比中止更糟，向上抛出）
    #[error("全局记忆写入失败: {0}")]
    Storage(#[from] anyhow::Error),
}

struct RegisteredAgent {
    name: String,
    agent: Agent,
    dependencies: Vec<String>,
}

/// 多 Agent 调度器
pub struct AgentScheduler {
    run_id: String,
    agents: Vec<RegisteredAgent>,
    report_type: ReportType,
    report_config: ReportTypeConfig,
    progress: ProgressTracker,
    memory_manager: GlobalMemoryManager,
    results: HashMap<String, RunOutcome>,
}

impl AgentScheduler {
    pub fn new(memory_manager: GlobalMemoryManager, report_type: ReportType) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            agents: Vec::new(),
            report_type,
            report_config: ReportTypeConfig::new(),
            progress: ProgressTracker::new(),
            memory_manager,
            results: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn report_type(&self) -> ReportType {
        self.report_type
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn memory_manager(&mut self) -> &mut GlobalMemoryManager {
        &mut self.memory_manager
    }

    pub fn results(&self) -> &HashMap<String, RunOutcome> {
        &self.results
    }

    /// 注册 Agent 及其依赖；按研报类型调整能力集，并把初始记忆快照登记到全局管理器
    pub fn register(&mut self, mut agent: Agent, dependencies: Vec<String>) {
        self.adjust_capabilities(&mut agent);

        let name = agent.profile().name().to_string();
        let snapshot = agent.snapshot();
        self.memory_manager.register_snapshot(&name, snapshot);
        self.progress
            .update_agent_status(&name, AgentStatus::Pending, HashMap::new());

        tracing::info!(
            agent = %name,
            dependencies = ?dependencies,
            "注册 Agent"
        );
        self.agents.push(RegisteredAgent {
            name,
            agent,
            dependencies,
        });
    }

    /// 数据 / 分析 Agent 的能力集收窄到当前研报类型对应的工具列表
    fn adjust_capabilities(&self, agent: &mut Agent) {
        let tools = match agent.profile().name() {
            "DataAgent" => Some(self.report_config.data_tools(self.report_type)),
            "AnalysisAgent" => Some(self.report_config.analysis_tools(self.report_type)),
            _ => None,
        };
        if let Some(tools) = tools {
            agent.profile_mut().set_capabilities(tools);
        }
    }

    /// 依赖是否全部完成
    pub fn can_execute(&self, agent_name: &str) -> bool {
        let Some(entry) = self.agents.iter().find(|a| a.name == agent_name) else {
            return false;
        };
        entry
            .dependencies
            .iter()
            .all(|dep| self.progress.status_of(dep) == Some(AgentStatus::Completed))
    }

    /// 按注册顺序返回第一个可执行的 pending Agent
    pub fn next_ready(&self) -> Option<String> {
        self.agents
            .iter()
            .find(|entry| {
                self.progress.status_of(&entry.name) == Some(AgentStatus::Pending)
                    && self.can_execute(&entry.name)
            })
            .map(|entry| entry.name.clone())
    }

    /// 执行指定 Agent：pending → running → completed/failed，
    /// 无论成败都刷新快照、留痕时间戳，并把产出记入全局聚合
    pub async fn execute(&mut self, agent_name: &str) -> Result<(), SchedulerError> {
        let idx = self
            .agents
            .iter()
            .position(|a| a.name == agent_name)
            .ok_or_else(|| SchedulerError::UnknownAgent(agent_name.to_string()))?;

        let status = self.progress.status_of(agent_name);
        if status != Some(AgentStatus::Pending) {
            return Err(SchedulerError::InvalidState {
                agent: agent_name.to_string(),
                status: status.unwrap_or(AgentStatus::Pending),
            });
        }

        tracing::info!(agent = agent_name, "Coordinator: 开始执行");
        self.progress.update_agent_status(
            agent_name,
            AgentStatus::Running,
            HashMap::from([("run_id".to_string(), json!(self.run_id))]),
        );

        let outcome = self.agents[idx].agent.run().await;

        // 执行循环把单步失败都消化在内部；整轮无一步成功且存在失败，视为该 Agent 失败
        let agent_failed = outcome.completed.is_empty() && !outcome.failed.is_empty();
        let final_status = if agent_failed {
            AgentStatus::Failed
        } else {
            AgentStatus::Completed
        };

        let details = HashMap::from([
            ("result_keys".to_string(), json!(outcome.context.keys().collect::<Vec<_>>())),
            ("failed_steps".to_string(), json!(outcome.failed)),
        ]);
        self.progress
            .update_agent_status(agent_name, final_status, details);

        let snapshot = self.agents[idx].agent.snapshot();
        self.memory_manager.register_snapshot(agent_name, snapshot);

        let result_doc = json!(outcome.context);
        self.results.insert(agent_name.to_string(), outcome);
        self.memory_manager
            .record_agent_result(agent_name, &result_doc)?;

        if final_status == AgentStatus::Completed {
            self.progress.complete_phase(format!("{}完成", agent_name));
        }

        tracing::info!(agent = agent_name, status = ?final_status, "Coordinator: 执行结束");
        Ok(())
    }

    /// 依序执行所有可就绪的 Agent，直到没有 Agent 可执行且没有 Agent 在运行。
    /// 依赖永远无法满足的 Agent 保持 pending —— 这是静默的部分完成，不报错
    pub async fn run_all(&mut self) -> &HashMap<String, RunOutcome> {
        let report_name = self.report_config.get_spec(self.report_type).name;
        self.progress
            .set_current_phase(format!("执行{}工作流程", report_name));

        loop {
            let Some(name) = self.next_ready() else {
                // 串行执行下不会有 running 态残留；保留检查以备并行化后轮询等待
                let summary = self.progress.get_progress_summary();
                if summary.active_agents.is_empty() {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                continue;
            };

            if let Err(e) = self.execute(&name).await {
                tracing::error!(agent = %name, error = %e, "Agent 执行异常");
            }
        }

        let summary = self.progress.get_progress_summary();
        if !summary.pending_agents.is_empty() {
            tracing::warn!(
                pending = ?summary.pending_agents,
                "部分 Agent 因依赖未满足而未执行"
            );
        }
        self.progress
            .set_current_phase(format!("{}工作流程完成", report_name));
        &self.results
    }

    /// 生成系统状态报告（Markdown）
    pub fn status_report(&mut self) -> String {
        let summary = self.progress.get_progress_summary();
        let memory_snapshot = self.memory_manager.get_global_memory_snapshot();

        format!(
            "# 多Agent系统状态报告\n\
             运行批次: {run_id}\n\
             研报类型: {report_name}\n\n\
             ## 执行进展\n\
             - 当前阶段: {phase}\n\
             - 整体进度: {progress:.0}%\n\
             - 已完成: {completed} agents\n\
             - 失败: {failed} agents\n\
             - 未执行: {pending} agents\n\n\
             ## 记忆使用情况\n\
             - 全局上下文项目: {global_items}\n\
             - 基础记忆上下文大小: {base_context}\n\
             - 注册Agent记忆数量: {agent_count}\n",
            run_id = self.run_id,
            report_name = self.report_config.get_spec(self.report_type).name,
            phase = summary.current_phase,
            progress = summary.overall_progress * 100.0,
            completed = summary.completed_agents.len(),
            failed = summary.failed_agents.len(),
            pending = summary.pending_agents.len(),
            global_items = memory_snapshot.global_context.len(),
            base_context = memory_snapshot.base_stats.context_size,
            agent_count = memory_snapshot.agents.len(),
        )
    }
}
