//! Agent 静态画像
//!
//! name 构造后不可变，作为调度、记忆注册与结果聚合的联结键；
//! 运行期只允许改动 configuration / capabilities（如按研报类型更新工具集）。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Agent 画像：身份、目标、能力集与自由配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    name: String,
    pub role: String,
    pub objectives: Vec<String>,
    /// 允许调用的动作名，须为注册表实现集合的子集
    pub capabilities: Vec<String>,
    /// 任意配置项：目标实体（company/code/market）、研报类型、自由指令等
    pub configuration: HashMap<String, Value>,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            objectives: Vec::new(),
            capabilities: Vec::new(),
            configuration: HashMap::new(),
        }
    }

    pub fn with_objectives<I, S>(mut self, objectives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.objectives = objectives.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.configuration.insert(key.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 配置中的字符串项
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).and_then(|v| v.as_str())
    }

    /// 整体替换能力集（调度器按研报类型调整工具集时使用）
    pub fn set_capabilities(&mut self, capabilities: Vec<String>) {
        self.capabilities = capabilities;
    }

    /// 目标实体标识，如 商汤科技（HK:00020）；未配置实体时退化为 Agent 名
    pub fn identity(&self) -> String {
        match (
            self.config_str("company"),
            self.config_str("market"),
            self.config_str("code"),
        ) {
            (Some(company), Some(market), Some(code)) => {
                format!("{}（{}:{}）", company, market, code)
            }
            (Some(company), _, _) => company.to_string(),
            _ => self.name.clone(),
        }
    }

    /// 以配置生成一条实体记录；同行收集动作会把这条记录并入竞争者列表，
    /// 保证后续步骤的公司集合始终包含目标公司自身
    pub fn profile_record(&self) -> Value {
        json!({
            "name": self.config_str("company").unwrap_or(&self.name),
            "code": self.config_str("code").unwrap_or_default(),
            "market": self.config_str("market").unwrap_or_default(),
        })
    }
}
