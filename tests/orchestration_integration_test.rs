//! 多 Agent 编排集成测试
//!
//! 用脚本化 Mock LLM 驱动完整链路：数据 Agent（含同行收集特例）→ 分析 Agent，
//! 验证依赖门控、结果聚合、全局记忆落盘与部分失败的收尾行为。

use std::sync::Arc;

use serde_json::json;

use yanbao::actions::{IdentifyCompetitorsAction, IDENTIFY_COMPETITORS};
use yanbao::agent::{
    ActionRegistry, Agent, AgentMemory, AgentPlanner, AgentProfile, FnAction, LoopConfig,
};
use yanbao::coordinator::{AgentScheduler, AgentStatus, GlobalMemoryManager};
use yanbao::llm::MockLlmClient;
use yanbao::report::ReportType;

fn entity_profile(name: &str, role: &str, capabilities: &[&str]) -> AgentProfile {
    AgentProfile::new(name, role)
        .with_capabilities(capabilities.to_vec())
        .with_config("company", json!("商汤科技"))
        .with_config("code", json!("00020"))
        .with_config("market", json!("HK"))
}

#[tokio::test]
async fn full_workflow_with_peer_collection_and_dependency() {
    let dir = tempfile::tempdir().unwrap();

    // 数据 Agent：Planner 脚本依次给出 同行收集 → 搜索 → done；
    // 同行收集走真实的 IdentifyCompetitorsAction + YAML 解析
    let data_profile = entity_profile(
        "DataAgent",
        "数据采集",
        &[IDENTIFY_COMPETITORS, "get_company_search_info"],
    );
    let data_llm = Arc::new(MockLlmClient::with_replies(vec![
        IDENTIFY_COMPETITORS,
        "```yaml\n- name: 旷视科技\n  code: \"02517\"\n  market: HK\n```",
        "get_company_search_info",
        "done",
    ]));
    let mut data_actions = ActionRegistry::new();
    data_actions.register_arc(Arc::new(IdentifyCompetitorsAction::new(
        data_llm.clone(),
        data_profile.clone(),
    )));
    data_actions.register(FnAction::new("get_company_search_info", |ctx| {
        // 依赖同一次运行里先行步骤的产出
        let companies = ctx
            .get(IDENTIFY_COMPETITORS)
            .and_then(|v| v.as_array())
            .ok_or("缺少竞争者列表")?;
        Ok(json!(format!("已检索 {} 家公司的行业信息", companies.len())))
    }));
    let data_agent = Agent::new(
        data_profile.clone(),
        AgentMemory::new(dir.path().join("data_agent"), None).unwrap(),
        AgentPlanner::new(data_profile, data_llm),
        data_actions,
    )
    .with_config(LoopConfig {
        peer_collection_action: Some(IDENTIFY_COMPETITORS.to_string()),
        ..LoopConfig::default()
    });

    // 分析 Agent：依赖 DataAgent
    let analysis_profile = entity_profile("AnalysisAgent", "数据分析", &["merge_reports"]);
    let analysis_llm = Arc::new(MockLlmClient::with_replies(vec!["merge_reports", "done"]));
    let mut analysis_actions = ActionRegistry::new();
    analysis_actions.register(FnAction::new("merge_reports", |_| {
        Ok(json!("# 合并研报\n..."))
    }));
    let analysis_agent = Agent::new(
        analysis_profile.clone(),
        AgentMemory::new(dir.path().join("analysis_agent"), None).unwrap(),
        AgentPlanner::new(analysis_profile, analysis_llm),
        analysis_actions,
    );

    let base = AgentMemory::new(dir.path().join("coordinator"), None).unwrap();
    let mut scheduler = AgentScheduler::new(GlobalMemoryManager::new(base), ReportType::Company);
    scheduler.register(data_agent, vec![]);
    scheduler.register(analysis_agent, vec!["DataAgent".to_string()]);

    // 注册后分析 Agent 被依赖门控住
    assert_eq!(scheduler.next_ready(), Some("DataAgent".to_string()));
    assert!(!scheduler.can_execute("AnalysisAgent"));

    let results = scheduler.run_all().await.clone();

    // 两个 Agent 都完成
    let summary = scheduler.progress().get_progress_summary();
    assert_eq!(summary.completed_agents, vec!["DataAgent", "AnalysisAgent"]);
    assert!(summary.failed_agents.is_empty());
    assert!((summary.overall_progress - 1.0).abs() < f64::EPSILON);

    // 同行收集特例：结果包含竞争者 + 目标公司自身
    let companies = results["DataAgent"].context[IDENTIFY_COMPETITORS]
        .as_array()
        .unwrap();
    assert_eq!(companies.len(), 2);
    assert_eq!(companies[0]["name"], "旷视科技");
    assert_eq!(companies[1]["name"], "商汤科技");

    // 下游步骤读到了上游产出
    assert_eq!(
        results["DataAgent"].context["get_company_search_info"],
        json!("已检索 2 家公司的行业信息")
    );

    // 全局聚合：每个 Agent 的产出都以 <name>_result 落盘到 coordinator 的持久记忆
    let global = scheduler.memory_manager().global_context().clone();
    assert!(global.contains_key("DataAgent_result"));
    assert!(global.contains_key("AnalysisAgent_result"));
    let persisted = scheduler
        .memory_manager()
        .base_memory_mut()
        .persist_load("DataAgent_result");
    assert!(persisted
        .as_object()
        .unwrap()
        .contains_key(IDENTIFY_COMPETITORS));

    // Agent 的执行记录可通过快照还原
    let progress = scheduler
        .memory_manager()
        .get_agent_progress("DataAgent")
        .unwrap();
    assert_eq!(
        progress.completed_tasks,
        vec![IDENTIFY_COMPETITORS, "get_company_search_info"]
    );
    assert_eq!(progress.status, "completed");
}

#[tokio::test]
async fn failed_data_agent_leaves_analysis_pending() {
    let dir = tempfile::tempdir().unwrap();

    // 数据 Agent 的唯一动作总是失败 → 整轮无产出 → Agent 记为 failed
    let data_profile = entity_profile("DataAgent", "数据采集", &["get_all_financial_data"]);
    let data_llm = Arc::new(MockLlmClient::with_replies(vec![
        "get_all_financial_data",
        "done",
    ]));
    let mut data_actions = ActionRegistry::new();
    data_actions.register(FnAction::new("get_all_financial_data", |_| {
        Err("上游接口超时".to_string())
    }));
    let data_agent = Agent::new(
        data_profile.clone(),
        AgentMemory::new(dir.path().join("data_agent"), None).unwrap(),
        AgentPlanner::new(data_profile, data_llm),
        data_actions,
    );

    let analysis_profile = entity_profile("AnalysisAgent", "数据分析", &["merge_reports"]);
    let analysis_llm = Arc::new(MockLlmClient::with_replies(vec!["merge_reports", "done"]));
    let mut analysis_actions = ActionRegistry::new();
    analysis_actions.register(FnAction::new("merge_reports", |_| Ok(json!("md"))));
    let analysis_agent = Agent::new(
        analysis_profile.clone(),
        AgentMemory::new(dir.path().join("analysis_agent"), None).unwrap(),
        AgentPlanner::new(analysis_profile, analysis_llm),
        analysis_actions,
    );

    let base = AgentMemory::new(dir.path().join("coordinator"), None).unwrap();
    let mut scheduler = AgentScheduler::new(GlobalMemoryManager::new(base), ReportType::Company);
    scheduler.register(data_agent, vec![]);
    scheduler.register(analysis_agent, vec!["DataAgent".to_string()]);

    scheduler.run_all().await;

    assert_eq!(
        scheduler.progress().status_of("DataAgent"),
        Some(AgentStatus::Failed)
    );
    // 依赖失败的 Agent 永不就绪，run_all 以部分完成收尾
    assert_eq!(
        scheduler.progress().status_of("AnalysisAgent"),
        Some(AgentStatus::Pending)
    );
    assert!(scheduler.next_ready().is_none());
    assert!(!scheduler.results().contains_key("AnalysisAgent"));

    // 失败 Agent 的产出（空上下文 + 失败清单）仍然进入全局聚合
    assert!(scheduler
        .memory_manager()
        .global_context()
        .contains_key("DataAgent_result"));
    assert_eq!(
        scheduler.results()["DataAgent"].failed,
        vec!["get_all_financial_data"]
    );
}

#[tokio::test]
async fn status_report_reflects_final_state() {
    let dir = tempfile::tempdir().unwrap();

    // 非 DataAgent/AnalysisAgent 命名，能力集不会被研报类型调整
    let profile = entity_profile("ReportAgent", "研报产出", &["fetch"]);
    let llm = Arc::new(MockLlmClient::with_replies(vec!["fetch", "done"]));
    let mut actions = ActionRegistry::new();
    actions.register(FnAction::new("fetch", |_| Ok(json!("ok"))));
    let agent = Agent::new(
        profile.clone(),
        AgentMemory::new(dir.path().join("a"), None).unwrap(),
        AgentPlanner::new(profile, llm),
        actions,
    );

    let base = AgentMemory::new(dir.path().join("coordinator"), None).unwrap();
    let mut scheduler = AgentScheduler::new(GlobalMemoryManager::new(base), ReportType::Company);
    scheduler.register(agent, vec![]);
    scheduler.run_all().await;

    let report = scheduler.status_report();
    assert!(report.contains("多Agent系统状态报告"));
    assert!(report.contains("公司研报"));
    assert!(report.contains("已完成: 1 agents"));
    assert!(report.contains("失败: 0 agents"));
}
