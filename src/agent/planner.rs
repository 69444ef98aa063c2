//! Planner：向 LLM 询问下一步动作名
//!
//! 上下文摘要里长文本截断到有界前缀，结构化值以不透明标记替代；
//! 回复校验是封闭式的：trim 后不在允许集合内的任何回复一律视为 done，
//! 保证 LLM 幻觉永远不会触发未注册动作。单条畸形回复不重试，按正常完成结束运行。

use std::sync::Arc;

use crate::agent::profile::AgentProfile;
use crate::agent::toolset::Context;
use crate::llm::LlmClient;

/// 终止标记：Planner 返回它表示任务完成
pub const DONE: &str = "done";

/// 字符串值在摘要中的最大前缀长度（字符）
const SUMMARY_VALUE_CHARS: usize = 1000;

/// 结构化值在摘要中的占位标记
const STRUCTURED_MARKER: &str = "[结构化数据]";

/// 流程规划器：持有画像与 LLM，按当前上下文与执行记录决定下一步动作名
pub struct AgentPlanner {
    profile: AgentProfile,
    llm: Arc<dyn LlmClient>,
}

impl AgentPlanner {
    pub fn new(profile: AgentProfile, llm: Arc<dyn LlmClient>) -> Self {
        Self { profile, llm }
    }

    /// 决定下一步：返回 allowed 中的某个动作名，或 DONE
    pub async fn decide_next_step(
        &self,
        context: &Context,
        completed: &[String],
        failed: &[String],
        allowed: &[String],
    ) -> String {
        let prompt = self.build_prompt(context, completed, failed, allowed);
        let system_prompt = "你是一个金融分析流程规划器，只返回一个函数名；若任务已完成，返回 done。";

        // LLM 调用失败等价于空回复，走封闭校验后按 done 结束
        let reply = self
            .llm
            .call(&prompt, Some(system_prompt))
            .await
            .unwrap_or_default();

        validate_reply(&reply, allowed)
    }

    fn build_prompt(
        &self,
        context: &Context,
        completed: &[String],
        failed: &[String],
        allowed: &[String],
    ) -> String {
        format!(
            "你是一个金融分析流程规划 Agent。\n\
             目标对象：{identity}\n\
             角色：{role}\n\
             目标：{objectives}\n\
             当前已完成步骤：{completed}。\n\
             失败步骤：{failed}。\n\
             可调用工具函数有：{allowed}。\n\n\
             以下是当前上下文：\n{summary}\n\
             请决定下一步要调用哪个函数（只返回函数名），若任务已完成请返回 'done'。",
            identity = self.profile.identity(),
            role = self.profile.role,
            objectives = join_or(&self.profile.objectives, "无"),
            completed = join_or(completed, "无"),
            failed = join_or(failed, "无"),
            allowed = join_or(allowed, "无"),
            summary = summarize_context(context),
        )
    }
}

fn join_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

/// 上下文摘要：字符串值截断前 SUMMARY_VALUE_CHARS 字符，其余值以标记替代
fn summarize_context(context: &Context) -> String {
    let mut keys: Vec<&String> = context.keys().collect();
    keys.sort();

    let mut summary = String::new();
    for key in keys {
        match &context[key] {
            serde_json::Value::String(s) => {
                let prefix: String = s.chars().take(SUMMARY_VALUE_CHARS).collect();
                summary.push_str(&format!("【{}】{}\n", key, prefix));
            }
            _ => {
                summary.push_str(&format!("【{}】{}\n", key, STRUCTURED_MARKER));
            }
        }
    }
    summary
}

/// 封闭校验：trim 后必须精确等于某个允许的动作名，否则一律 done
fn validate_reply(reply: &str, allowed: &[String]) -> String {
    let trimmed = reply.trim();
    if allowed.iter().any(|a| a == trimmed) {
        trimmed.to_string()
    } else {
        DONE.to_string()
    }
}
