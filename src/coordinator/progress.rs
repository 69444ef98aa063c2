//! 进展跟踪
//!
//! 记录每个 Agent 的状态流转（带时间戳）、阶段推进与整体进度，
//! 无论执行成败都会留痕，供可观测与最终状态检查使用。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Agent 生命周期状态；failed 为终态（调度器不自动重试）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// 一次状态流转的留痕
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    pub status: AgentStatus,
    pub timestamp: DateTime<Utc>,
    pub details: HashMap<String, Value>,
}

/// 执行历史事件
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEvent {
    pub agent: String,
    pub status: AgentStatus,
    pub timestamp: DateTime<Utc>,
}

/// 进展摘要（按状态分桶）
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub current_phase: String,
    pub overall_progress: f64,
    pub completed_phases: Vec<String>,
    pub pending_agents: Vec<String>,
    pub active_agents: Vec<String>,
    pub completed_agents: Vec<String>,
    pub failed_agents: Vec<String>,
}

/// 跨 Agent 的项目进展跟踪器
pub struct ProgressTracker {
    start_time: DateTime<Utc>,
    current_phase: String,
    completed_phases: Vec<String>,
    agent_status: HashMap<String, StatusRecord>,
    /// 保持注册顺序，摘要分桶按此序输出
    agent_order: Vec<String>,
    execution_history: Vec<HistoryEvent>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Utc::now(),
            current_phase: "初始化".to_string(),
            completed_phases: Vec::new(),
            agent_status: HashMap::new(),
            agent_order: Vec::new(),
            execution_history: Vec::new(),
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// 更新 Agent 状态并记入执行历史
    pub fn update_agent_status(
        &mut self,
        agent: &str,
        status: AgentStatus,
        details: HashMap<String, Value>,
    ) {
        let now = Utc::now();
        if !self.agent_order.iter().any(|n| n == agent) {
            self.agent_order.push(agent.to_string());
        }
        self.agent_status.insert(
            agent.to_string(),
            StatusRecord {
                status,
                timestamp: now,
                details,
            },
        );
        self.execution_history.push(HistoryEvent {
            agent: agent.to_string(),
            status,
            timestamp: now,
        });
    }

    pub fn status_of(&self, agent: &str) -> Option<AgentStatus> {
        self.agent_status.get(agent).map(|r| r.status)
    }

    pub fn set_current_phase(&mut self, phase: impl Into<String>) {
        self.current_phase = phase.into();
    }

    /// 完成一个阶段并刷新整体进度
    pub fn complete_phase(&mut self, phase: impl Into<String>) {
        let phase = phase.into();
        if !self.completed_phases.contains(&phase) {
            self.completed_phases.push(phase);
        }
    }

    pub fn execution_history(&self) -> &[HistoryEvent] {
        &self.execution_history
    }

    pub fn get_progress_summary(&self) -> ProgressSummary {
        let mut pending = Vec::new();
        let mut active = Vec::new();
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for name in &self.agent_order {
            match self.agent_status[name].status {
                AgentStatus::Pending => pending.push(name.clone()),
                AgentStatus::Running => active.push(name.clone()),
                AgentStatus::Completed => completed.push(name.clone()),
                AgentStatus::Failed => failed.push(name.clone()),
            }
        }

        let total = self.agent_order.len();
        let finished = completed.len() + failed.len();
        let overall_progress = if total == 0 {
            0.0
        } else {
            finished as f64 / total as f64
        };

        ProgressSummary {
            current_phase: self.current_phase.clone(),
            overall_progress,
            completed_phases: self.completed_phases.clone(),
            pending_agents: pending,
            active_agents: active,
            completed_agents: completed,
            failed_agents: failed,
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_buckets_follow_latest_status() {
        let mut tracker = ProgressTracker::new();
        tracker.update_agent_status("DataAgent", AgentStatus::Pending, HashMap::new());
        tracker.update_agent_status("AnalysisAgent", AgentStatus::Pending, HashMap::new());
        tracker.update_agent_status("DataAgent", AgentStatus::Running, HashMap::new());
        tracker.update_agent_status("DataAgent", AgentStatus::Completed, HashMap::new());

        let summary = tracker.get_progress_summary();
        assert_eq!(summary.completed_agents, vec!["DataAgent"]);
        assert_eq!(summary.pending_agents, vec!["AnalysisAgent"]);
        assert!(summary.active_agents.is_empty());
        assert!((summary.overall_progress - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn history_records_every_transition() {
        let mut tracker = ProgressTracker::new();
        tracker.update_agent_status("A", AgentStatus::Running, HashMap::new());
        tracker.update_agent_status("A", AgentStatus::Failed, HashMap::new());
        assert_eq!(tracker.execution_history().len(), 2);
        assert_eq!(tracker.status_of("A"), Some(AgentStatus::Failed));
    }

    #[test]
    fn phases_are_deduplicated() {
        let mut tracker = ProgressTracker::new();
        tracker.complete_phase("数据采集");
        tracker.complete_phase("数据采集");
        assert_eq!(tracker.get_progress_summary().completed_phases.len(), 1);
    }
}
