//! 参考动作集（LLM 生成类）
//!
//! 具体的数据抓取适配器（财报接口、网页表格解析、搜索引擎）由外部实现并注册，
//! 这里只提供纯 LLM 生成的动作：竞争者识别、深度研报生成、研报质量评价。
//! 动作从共享上下文取上游产出，缺少上游数据时返回 Err 交给循环记账。

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::{Action, AgentProfile, Context};
use crate::llm::{parse_yaml_reply, LlmClient};

/// 竞争者识别动作名（同行收集步骤，循环会把目标公司自身并入结果）
pub const IDENTIFY_COMPETITORS: &str = "get_competitor_listed_companies";
/// 深度研报生成动作名
pub const DEEP_REPORT_GENERATION: &str = "deep_report_generation";
/// 研报评价动作名
pub const EVALUATION: &str = "evaluation";

/// 上下文中字符串值的摘要（长文本截断），供生成类动作拼提示词
fn context_digest(context: &Context, max_chars: usize) -> String {
    let mut keys: Vec<&String> = context.keys().collect();
    keys.sort();
    let mut digest = String::new();
    for key in keys {
        match &context[key] {
            Value::String(s) => {
                let prefix: String = s.chars().take(max_chars).collect();
                digest.push_str(&format!("【{}】{}\n", key, prefix));
            }
            other => {
                digest.push_str(&format!("【{}】{}\n", key, other));
            }
        }
    }
    digest
}

/// 用 LLM 识别目标公司的上市竞争对手，返回 [{name, code, market}] 列表（过滤未上市）
pub struct IdentifyCompetitorsAction {
    llm: Arc<dyn LlmClient>,
    profile: AgentProfile,
}

impl IdentifyCompetitorsAction {
    pub fn new(llm: Arc<dyn LlmClient>, profile: AgentProfile) -> Self {
        Self { llm, profile }
    }
}

#[async_trait]
impl Action for IdentifyCompetitorsAction {
    fn name(&self) -> &str {
        IDENTIFY_COMPETITORS
    }

    fn description(&self) -> &str {
        "识别目标公司的主要上市竞争对手（含代码与市场）"
    }

    async fn execute(&self, _context: &Context) -> Result<Value, String> {
        let prompt = format!(
            "请列出 {} 的主要上市竞争对手（3-5 家），以 YAML 列表返回，\
             每项包含 name、code、market 三个字段；未上市公司的 market 写 \"未上市\"。\
             只返回 ```yaml 围栏内的列表，不要其他内容。",
            self.profile.identity()
        );
        let reply = self
            .llm
            .call(&prompt, Some("你是一个专业的行业竞争格局分析师。"))
            .await?;

        let parsed = parse_yaml_reply(&reply);
        let serde_yaml::Value::Sequence(items) = parsed else {
            return Err(format!("竞争者识别结果不是列表: {}", reply));
        };

        let competitors: Vec<Value> = items
            .into_iter()
            .filter_map(|item| serde_json::to_value(item).ok())
            .filter(|item| item.get("market").and_then(|m| m.as_str()) != Some("未上市"))
            .collect();
        if competitors.is_empty() {
            return Err("未识别到任何上市竞争对手".to_string());
        }
        Ok(Value::Array(competitors))
    }
}

/// 按研报章节逐节生成 Markdown 深度研报，落盘后把文件路径写回上下文
pub struct DeepReportAction {
    llm: Arc<dyn LlmClient>,
    profile: AgentProfile,
    sections: Vec<String>,
    output_dir: PathBuf,
}

impl DeepReportAction {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        profile: AgentProfile,
        sections: Vec<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            llm,
            profile,
            sections,
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl Action for DeepReportAction {
    fn name(&self) -> &str {
        DEEP_REPORT_GENERATION
    }

    fn description(&self) -> &str {
        "基于已采集数据逐节生成深度研报并导出 Markdown"
    }

    async fn execute(&self, context: &Context) -> Result<Value, String> {
        let digest = context_digest(context, 2000);
        let mut report = format!("# {} 深度研报\n\n", self.profile.identity());

        for section in &self.sections {
            let prompt = format!(
                "基于以下已采集信息，撰写研报章节「{}」，输出 Markdown 正文（不含一级标题）：\n\n{}",
                section, digest
            );
            let body = self
                .llm
                .call(&prompt, Some("你是一个专业的证券分析师，文风严谨。"))
                .await?;
            report.push_str(&format!("## {}\n\n{}\n\n", section, body.trim()));
        }

        std::fs::create_dir_all(&self.output_dir).map_err(|e| e.to_string())?;
        let path = self.output_dir.join("report.md");
        std::fs::write(&path, &report).map_err(|e| e.to_string())?;
        tracing::info!(path = %path.display(), "研报已生成");
        Ok(json!(path.to_string_lossy()))
    }
}

/// 研报质量评价：读取上游生成的报告文件，请 LLM 打分并给出意见（YAML）
pub struct EvaluationAction {
    llm: Arc<dyn LlmClient>,
}

impl EvaluationAction {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Action for EvaluationAction {
    fn name(&self) -> &str {
        EVALUATION
    }

    fn description(&self) -> &str {
        "评价已生成研报的完整性、深度与专业性"
    }

    async fn execute(&self, context: &Context) -> Result<Value, String> {
        // 报告路径来自 deep_report_generation 的产出，或调用方预置的 report_path
        let path = context
            .get(DEEP_REPORT_GENERATION)
            .or_else(|| context.get("report_path"))
            .and_then(|v| v.as_str())
            .ok_or("缺少上游研报路径")?;
        let report = std::fs::read_to_string(path).map_err(|e| format!("读取研报失败: {}", e))?;

        let preview: String = report.chars().take(6000).collect();
        let prompt = format!(
            "请从内容完整性、分析深度、逻辑连贯、专业质量四个维度评价以下研报，\
             以 ```yaml 围栏返回 score（0-100 整数）与 comments（一句话意见）：\n\n{}",
            preview
        );
        let reply = self
            .llm
            .call(&prompt, Some("你是一个严格的研报质量评审员。"))
            .await?;

        let parsed = parse_yaml_reply(&reply);
        let score = parsed
            .get("score")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| format!("评价结果缺少 score: {}", reply))?;
        let comments = parsed
            .get("comments")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        Ok(json!({"score": score, "comments": comments}))
    }
}
