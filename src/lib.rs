//! Yanbao - Rust 多智能体金融研报系统（编排核心）
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **observability**: tracing 日志初始化
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）、嵌入、结构化回复解析
//! - **agent**: 单 Agent 内核（Profile、分层记忆、Planner、动作注册表、执行循环）
//! - **coordinator**: 多 Agent 调度（依赖门控、进展跟踪、全局记忆快照）
//! - **report**: 研报类型配置（公司 / 行业 / 宏观）与工具集映射
//! - **actions**: 参考动作集（LLM 生成类：竞争者识别、章节生成、报告汇总）

pub mod actions;
pub mod agent;
pub mod config;
pub mod coordinator;
pub mod llm;
pub mod observability;
pub mod report;
