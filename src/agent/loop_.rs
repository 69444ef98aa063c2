//! Agent 执行循环
//!
//! 反复向 Planner 询问下一步 → 查注册表 → 执行动作 → 结果并入共享上下文，
//! 直到 Planner 返回 done 或迭代数触顶。单个动作的失败只记账不终止：
//! 长流程里任何一步都有不小的失败概率，尽力而为的部分产出优于整体报错。
//!
//! 同名动作每次运行至多执行一次（completed/failed 去重），避免重复的昂贵采集。
//! Planner 反复建议已执行步骤时循环会空转，max_steps 上限保证这种空转必然终止。

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::agent::memory::{AgentMemory, MemorySnapshot};
use crate::agent::planner::{AgentPlanner, DONE};
use crate::agent::profile::AgentProfile;
use crate::agent::toolset::{ActionRegistry, Context};
use crate::config::AgentSection;

/// 执行循环参数
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// 最大迭代数（含重复步骤的空转），触顶按正常完成结束
    pub max_steps: usize,
    /// 单个动作的超时；None 表示不限。超时等价于动作失败
    pub action_timeout: Option<Duration>,
    /// 相邻迭代之间的间隔，对外部数据源与 LLM 限流
    pub step_delay: Option<Duration>,
    /// 同行收集动作名：该动作的列表结果会并入 Agent 自身的实体记录
    pub peer_collection_action: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 32,
            action_timeout: None,
            step_delay: None,
            peer_collection_action: None,
        }
    }
}

impl From<&AgentSection> for LoopConfig {
    fn from(section: &AgentSection) -> Self {
        Self {
            max_steps: section.max_steps,
            action_timeout: (section.action_timeout_secs > 0)
                .then(|| Duration::from_secs(section.action_timeout_secs)),
            step_delay: (section.step_delay_ms > 0)
                .then(|| Duration::from_millis(section.step_delay_ms)),
            peer_collection_action: None,
        }
    }
}

/// 单次运行结果：上下文与执行记录
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub context: Context,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
}

/// Agent：画像 + 记忆 + Planner + 动作注册表 + 执行循环
pub struct Agent {
    profile: AgentProfile,
    memory: AgentMemory,
    planner: AgentPlanner,
    actions: ActionRegistry,
    config: LoopConfig,
    cancel_token: CancellationToken,
}

impl Agent {
    pub fn new(
        profile: AgentProfile,
        memory: AgentMemory,
        planner: AgentPlanner,
        actions: ActionRegistry,
    ) -> Self {
        Self {
            profile,
            memory,
            planner,
            actions,
            config: LoopConfig::default(),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut AgentProfile {
        &mut self.profile
    }

    pub fn memory(&self) -> &AgentMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut AgentMemory {
        &mut self.memory
    }

    /// 导出记忆只读快照（Coordinator 聚合用）
    pub fn snapshot(&mut self) -> MemorySnapshot {
        self.memory.snapshot()
    }

    /// 以空上下文运行
    pub async fn run(&mut self) -> RunOutcome {
        self.run_with_context(Context::new()).await
    }

    /// 以给定初始上下文运行（如评价 Agent 预置待评报告路径）
    pub async fn run_with_context(&mut self, initial: Context) -> RunOutcome {
        let mut context = initial;
        let mut completed: Vec<String> = Vec::new();
        let mut failed: Vec<String> = Vec::new();
        let allowed = self.profile.capabilities.clone();

        self.memory.context_set("status", json!("running"));

        let mut step = 0usize;
        loop {
            if step >= self.config.max_steps {
                tracing::warn!(
                    agent = self.profile.name(),
                    max_steps = self.config.max_steps,
                    "达到最大迭代数，按完成结束"
                );
                break;
            }
            step += 1;

            if self.cancel_token.is_cancelled() {
                tracing::info!(agent = self.profile.name(), "收到取消信号，提前结束");
                break;
            }

            let next = self
                .planner
                .decide_next_step(&context, &completed, &failed, &allowed)
                .await;
            if next == DONE {
                break;
            }

            if completed.contains(&next) || failed.contains(&next) {
                tracing::warn!(step = %next, "重复步骤，跳过执行");
                continue;
            }

            tracing::info!(step = %next, "LLM 决定执行");
            let Some(action) = self.actions.get(&next) else {
                tracing::warn!(step = %next, "无效步骤：动作未注册");
                failed.push(next);
                continue;
            };

            let started = Instant::now();
            let result = match self.config.action_timeout {
                Some(limit) => match tokio::time::timeout(limit, action.execute(&context)).await {
                    Ok(result) => result,
                    Err(_) => Err(format!("动作超时（{}s）", limit.as_secs())),
                },
                None => action.execute(&context).await,
            };

            let audit = json!({
                "event": "action_audit",
                "agent": self.profile.name(),
                "action": next,
                "ok": result.is_ok(),
                "duration_ms": started.elapsed().as_millis() as u64,
            });
            tracing::info!(audit = %audit.to_string(), "action");

            match result {
                Ok(mut value) => {
                    if self.config.peer_collection_action.as_deref() == Some(next.as_str()) {
                        // 同行列表必须包含目标公司自身
                        if let Value::Array(ref mut items) = value {
                            items.push(self.profile.profile_record());
                        }
                    }
                    context.insert(next.clone(), value);
                    completed.push(next);
                }
                Err(e) => {
                    tracing::warn!(step = %next, error = %e, "动作执行失败");
                    failed.push(next);
                }
            }

            if let Some(delay) = self.config.step_delay {
                tokio::time::sleep(delay).await;
            }
        }

        // 执行记录写入短期记忆，供 Coordinator 的进展查询使用
        self.memory.context_set("completed_tasks", json!(completed));
        self.memory.context_set("failed_tasks", json!(failed));
        self.memory.context_set("status", json!("completed"));

        RunOutcome {
            context,
            completed,
            failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::toolset::FnAction;
    use crate::llm::MockLlmClient;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn test_profile(capabilities: &[&str]) -> AgentProfile {
        AgentProfile::new("DataAgent", "数据采集")
            .with_capabilities(capabilities.to_vec())
            .with_config("company", json!("商汤科技"))
            .with_config("code", json!("00020"))
            .with_config("market", json!("HK"))
    }

    fn test_agent(replies: Vec<&str>, capabilities: &[&str], actions: ActionRegistry) -> (tempfile::TempDir, Agent) {
        let dir = tempfile::tempdir().unwrap();
        let memory = AgentMemory::new(dir.path(), None).unwrap();
        let profile = test_profile(capabilities);
        let planner = AgentPlanner::new(
            profile.clone(),
            Arc::new(MockLlmClient::with_replies(replies)),
        );
        (dir, Agent::new(profile, memory, planner, actions))
    }

    #[tokio::test]
    async fn two_actions_complete_in_order() {
        let mut actions = ActionRegistry::new();
        actions.register(FnAction::new("fetch_a", |_| Ok(json!("A"))));
        actions.register(FnAction::new("fetch_b", |_| Ok(json!("B"))));

        let (_dir, mut agent) = test_agent(
            vec!["fetch_a", "fetch_b", "done"],
            &["fetch_a", "fetch_b"],
            actions,
        );
        let outcome = agent.run().await;

        assert_eq!(outcome.completed, vec!["fetch_a", "fetch_b"]);
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.context.len(), 2);
        assert_eq!(outcome.context["fetch_a"], json!("A"));
        assert_eq!(outcome.context["fetch_b"], json!("B"));
    }

    #[tokio::test]
    async fn failed_action_is_contained() {
        let mut actions = ActionRegistry::new();
        actions.register(FnAction::new("fetch_a", |_| Ok(json!("A"))));
        actions.register(FnAction::new("fetch_b", |_| {
            Err("connection refused".to_string())
        }));

        let (_dir, mut agent) = test_agent(
            vec!["fetch_a", "fetch_b", "done"],
            &["fetch_a", "fetch_b"],
            actions,
        );
        let outcome = agent.run().await;

        // 之前成功的结果保留，失败的动作只进 failed，不进上下文
        assert_eq!(outcome.completed, vec!["fetch_a"]);
        assert_eq!(outcome.failed, vec!["fetch_b"]);
        assert_eq!(outcome.context.len(), 1);
        assert!(outcome.context.contains_key("fetch_a"));
    }

    #[tokio::test]
    async fn hallucinated_action_ends_run_via_fail_closed_planner() {
        let mut actions = ActionRegistry::new();
        actions.register(FnAction::new("fetch_a", |_| Ok(json!("A"))));

        // Planner 封闭校验把 fetch_c 映射为 done，循环立即结束
        let (_dir, mut agent) = test_agent(vec!["fetch_c"], &["fetch_a"], actions);
        let outcome = agent.run().await;

        assert!(outcome.context.is_empty());
        assert!(outcome.completed.is_empty());
        assert!(outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn unregistered_capability_is_recorded_as_failed() {
        // 能力集声明了 ghost，但注册表里没有对应实现
        let (_dir, mut agent) = test_agent(
            vec!["ghost", "done"],
            &["ghost"],
            ActionRegistry::new(),
        );
        let outcome = agent.run().await;

        assert_eq!(outcome.failed, vec!["ghost"]);
        assert!(outcome.context.is_empty());
    }

    #[tokio::test]
    async fn duplicate_step_is_skipped_without_reexecution() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let mut actions = ActionRegistry::new();
        actions.register(FnAction::new("fetch_a", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(json!("A"))
        }));

        let (_dir, mut agent) = test_agent(
            vec!["fetch_a", "fetch_a", "fetch_a", "done"],
            &["fetch_a"],
            actions,
        );
        let outcome = agent.run().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.completed, vec!["fetch_a"]);
        assert_eq!(outcome.context["fetch_a"], json!("A"));
    }

    #[tokio::test]
    async fn max_steps_caps_a_planner_that_never_says_done() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let mut actions = ActionRegistry::new();
        actions.register(FnAction::new("fetch_a", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(json!("A"))
        }));

        let dir = tempfile::tempdir().unwrap();
        let memory = AgentMemory::new(dir.path(), None).unwrap();
        let profile = test_profile(&["fetch_a"]);
        // Planner 永远建议同一个已完成步骤：循环空转，由 max_steps 兜底终止
        let planner = AgentPlanner::new(
            profile.clone(),
            Arc::new(MockLlmClient::repeating("fetch_a")),
        );
        let mut agent = Agent::new(profile, memory, planner, actions).with_config(LoopConfig {
            max_steps: 5,
            ..LoopConfig::default()
        });

        let outcome = agent.run().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.completed, vec!["fetch_a"]);
    }

    #[tokio::test]
    async fn peer_collection_appends_own_profile_record() {
        let mut actions = ActionRegistry::new();
        actions.register(FnAction::new("get_competitor_listed_companies", |_| {
            Ok(json!([
                {"name": "旷视科技", "code": "02517", "market": "HK"},
                {"name": "云从科技", "code": "688327", "market": "A"},
            ]))
        }));

        let dir = tempfile::tempdir().unwrap();
        let memory = AgentMemory::new(dir.path(), None).unwrap();
        let profile = test_profile(&["get_competitor_listed_companies"]);
        let planner = AgentPlanner::new(
            profile.clone(),
            Arc::new(MockLlmClient::with_replies(vec![
                "get_competitor_listed_companies",
                "done",
            ])),
        );
        let mut agent = Agent::new(profile, memory, planner, actions).with_config(LoopConfig {
            peer_collection_action: Some("get_competitor_listed_companies".to_string()),
            ..LoopConfig::default()
        });

        let outcome = agent.run().await;
        let companies = outcome.context["get_competitor_listed_companies"]
            .as_array()
            .unwrap();
        assert_eq!(companies.len(), 3);
        assert_eq!(companies[2]["name"], "商汤科技");
    }

    #[tokio::test(start_paused = true)]
    async fn action_timeout_counts_as_failure() {
        struct SlowAction;

        #[async_trait::async_trait]
        impl crate::agent::toolset::Action for SlowAction {
            fn name(&self) -> &str {
                "slow_fetch"
            }

            async fn execute(&self, _context: &Context) -> Result<Value, String> {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(json!("late"))
            }
        }

        let mut actions = ActionRegistry::new();
        actions.register(SlowAction);

        let dir = tempfile::tempdir().unwrap();
        let memory = AgentMemory::new(dir.path(), None).unwrap();
        let profile = test_profile(&["slow_fetch"]);
        let planner = AgentPlanner::new(
            profile.clone(),
            Arc::new(MockLlmClient::with_replies(vec!["slow_fetch", "done"])),
        );
        let mut agent = Agent::new(profile, memory, planner, actions).with_config(LoopConfig {
            action_timeout: Some(Duration::from_secs(1)),
            ..LoopConfig::default()
        });

        let outcome = agent.run().await;
        assert_eq!(outcome.failed, vec!["slow_fetch"]);
        assert!(outcome.context.is_empty());
    }

    #[tokio::test]
    async fn execution_records_land_in_memory_context() {
        let mut actions = ActionRegistry::new();
        actions.register(FnAction::new("fetch_a", |_| Ok(json!("A"))));
        actions.register(FnAction::new("fetch_b", |_| Err("boom".to_string())));

        let (_dir, mut agent) = test_agent(
            vec!["fetch_a", "fetch_b", "done"],
            &["fetch_a", "fetch_b"],
            actions,
        );
        agent.run().await;

        let memory = agent.memory();
        assert_eq!(
            memory.context_get("completed_tasks"),
            Some(&json!(["fetch_a"]))
        );
        assert_eq!(memory.context_get("failed_tasks"), Some(&json!(["fetch_b"])));
        assert_eq!(memory.context_get("status"), Some(&json!("completed")));
    }
}
