//! 入口：构建多 Agent 研报系统并执行完整工作流
//!
//! 用法：`yanbao [指令]`，如 `yanbao 请生成商汤科技的公司研报`。
//! 指令决定研报类型（公司 / 行业 / 宏观），进而决定各 Agent 的工具集。
//! 数据抓取类动作由外部适配器注册，这里默认只挂载 LLM 生成类参考动作。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};

use yanbao::actions::{
    DeepReportAction, EvaluationAction, IdentifyCompetitorsAction, IDENTIFY_COMPETITORS,
};
use yanbao::agent::{
    ActionRegistry, Agent, AgentMemory, AgentPlanner, AgentProfile, LoopConfig,
};
use yanbao::config::{load_config, AppConfig};
use yanbao::coordinator::{AgentScheduler, GlobalMemoryManager};
use yanbao::llm::{create_embedder_from_config, EmbeddingProvider, LlmClient, OpenAiClient};
use yanbao::observability;
use yanbao::report::{ReportType, ReportTypeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let instruction: String = {
        let args: Vec<String> = std::env::args().skip(1).collect();
        if args.is_empty() {
            "请生成商汤科技的公司研报".to_string()
        } else {
            args.join(" ")
        }
    };

    let cfg = load_config(None)?;
    let report_config = ReportTypeConfig::new();
    let report_type = report_config.identify_report_type(&instruction);
    println!(
        "🎯 检测到研报类型: {}",
        report_config.get_spec(report_type).name
    );
    println!("📝 指令内容: {}", instruction);

    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::from_config(&cfg.llm, None));
    let embedder = create_embedder_from_config(&cfg.embedding, None);
    let memory_root = cfg
        .app
        .memory_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("./data/memory"));

    let mut scheduler = build_scheduler(
        &cfg,
        &instruction,
        report_type,
        llm,
        embedder,
        &memory_root,
    )?;

    println!("🚀 开始执行工作流程...\n");
    let results = scheduler.run_all().await.clone();

    println!("\n{}", "=".repeat(50));
    println!("📋 工作流程执行完成");
    println!("{}", "=".repeat(50));
    for (agent_name, outcome) in &results {
        println!("\n🔍 {} 执行结果:", agent_name);
        for (key, value) in &outcome.context {
            match value {
                Value::String(s) => {
                    let preview: String = s.chars().take(120).collect();
                    println!("  [{}] {}", key, preview);
                }
                _ => println!("  [{}] [结构化数据]", key),
            }
        }
        if !outcome.failed.is_empty() {
            println!("  ⚠️ 失败步骤: {}", outcome.failed.join(", "));
        }
    }

    println!("\n{}", "=".repeat(50));
    println!("📊 系统执行摘要");
    println!("{}", "=".repeat(50));
    println!("{}", scheduler.status_report());

    Ok(())
}

/// 组装 数据 → 分析 两级 Agent 的调度器；评价动作挂在分析 Agent 的工具集里
fn build_scheduler(
    cfg: &AppConfig,
    instruction: &str,
    report_type: ReportType,
    llm: Arc<dyn LlmClient>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    memory_root: &Path,
) -> anyhow::Result<AgentScheduler> {
    let report_config = ReportTypeConfig::new();
    let entity_config: Vec<(&str, Value)> = vec![
        ("company", json!("商汤科技")),
        ("code", json!("00020")),
        ("market", json!("HK")),
        ("report_type", json!(report_type)),
        ("instruction", json!(instruction)),
    ];

    // 数据采集 Agent
    let mut data_profile = AgentProfile::new(
        "DataAgent",
        "负责数据采集与清洗，涵盖财务报表、公司信息、行业情报等",
    )
    .with_objectives([
        "采集目标公司财务三大表数据",
        "收集主要竞争对手名单及其财务数据",
        "获取公司基本介绍和行业信息",
    ])
    .with_capabilities(report_config.data_tools(report_type));
    for (key, value) in &entity_config {
        data_profile = data_profile.with_config(*key, value.clone());
    }

    let mut data_actions = ActionRegistry::new();
    data_actions.register(IdentifyCompetitorsAction::new(
        llm.clone(),
        data_profile.clone(),
    ));

    let data_memory = AgentMemory::new(memory_root.join("data_agent"), embedder.clone())?
        .with_thresholds(cfg.memory.clone());
    let data_agent = Agent::new(
        data_profile.clone(),
        data_memory,
        AgentPlanner::new(data_profile, llm.clone()),
        data_actions,
    )
    .with_config(LoopConfig {
        peer_collection_action: Some(IDENTIFY_COMPETITORS.to_string()),
        ..LoopConfig::from(&cfg.agent)
    });

    // 分析 Agent
    let mut analysis_profile = AgentProfile::new(
        "AnalysisAgent",
        "负责数据分析、研报撰写与质量评价",
    )
    .with_objectives([
        "对公司财务数据进行分析，生成报告",
        "完成公司之间的对比分析",
        "评价研报质量并给出改进意见",
    ])
    .with_capabilities(report_config.analysis_tools(report_type));
    for (key, value) in &entity_config {
        analysis_profile = analysis_profile.with_config(*key, value.clone());
    }

    let mut analysis_actions = ActionRegistry::new();
    analysis_actions.register(DeepReportAction::new(
        llm.clone(),
        analysis_profile.clone(),
        report_config.output_sections(report_type),
        memory_root.join("reports"),
    ));
    analysis_actions.register(EvaluationAction::new(llm.clone()));

    let analysis_memory = AgentMemory::new(memory_root.join("analysis_agent"), embedder.clone())?
        .with_thresholds(cfg.memory.clone());
    let analysis_agent = Agent::new(
        analysis_profile.clone(),
        analysis_memory,
        AgentPlanner::new(analysis_profile, llm.clone()),
        analysis_actions,
    )
    .with_config(LoopConfig::from(&cfg.agent));

    // Coordinator：全局记忆 + 调度
    let base_memory = AgentMemory::new(memory_root.join("coordinator"), embedder)?;
    let mut scheduler = AgentScheduler::new(GlobalMemoryManager::new(base_memory), report_type);
    scheduler.register(data_agent, vec![]);
    scheduler.register(analysis_agent, vec!["DataAgent".to_string()]);
    println!("📊 Agent依赖关系: DataAgent -> AnalysisAgent");

    Ok(scheduler)
}
