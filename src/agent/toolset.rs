//! 动作注册表
//!
//! 所有动作实现 Action trait（name / description / execute），由 ActionRegistry 在构造期
//! 按名建表，执行循环查表分发。动作失败必须返回 Err 而非哨兵值：循环的失败记账以 Err 为准。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// 单次运行的共享上下文：动作名（或调用方自定键）→ 动作结果
pub type Context = HashMap<String, Value>;

/// 动作 trait：名称、描述（供 Planner 提示词）、异步执行（以共享上下文为唯一入参）
#[async_trait]
pub trait Action: Send + Sync {
    /// 动作名称（Planner 回复与能力集中使用的标识）
    fn name(&self) -> &str;

    /// 动作描述（供 LLM 理解功能）
    fn description(&self) -> &str {
        ""
    }

    /// 执行动作，结果为任意可序列化值
    async fn execute(&self, context: &Context) -> Result<Value, String>;
}

/// 动作注册表：按名称存储 Arc<dyn Action>，支持 register / get / contains / action_names
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: impl Action + 'static) {
        let name = action.name().to_string();
        self.actions.insert(name, Arc::new(action));
    }

    pub fn register_arc(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.name().to_string(), action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn action_names(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    /// 返回 (name, description) 列表，用于生成 Planner 提示词中的工具段落
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.actions
            .iter()
            .map(|(name, action)| (name.clone(), action.description().to_string()))
            .collect()
    }
}

/// 由同步闭包构造的轻量动作（测试与简单工具使用）
pub struct FnAction<F>
where
    F: Fn(&Context) -> Result<Value, String> + Send + Sync,
{
    name: String,
    description: String,
    f: F,
}

impl<F> FnAction<F>
where
    F: Fn(&Context) -> Result<Value, String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            f,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl<F> Action for FnAction<F>
where
    F: Fn(&Context) -> Result<Value, String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, context: &Context) -> Result<Value, String> {
        (self.f)(context)
    }
}
