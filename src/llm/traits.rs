//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete 接收完整请求（消息 + 采样参数），
//! call 是单条 prompt 的便捷入口。后端必须优雅失败（返回 Err 字符串），不得让网络错误击穿执行循环。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 一次补全请求：消息序列与可选采样参数（未设置时用客户端默认值）
#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            max_tokens: None,
            temperature: None,
        }
    }

    /// 由单条 prompt 与可选 system prompt 构造
    pub fn from_prompt(prompt: &str, system_prompt: Option<&str>) -> Self {
        let mut messages = Vec::new();
        if let Some(sys) = system_prompt {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(prompt));
        Self::new(messages)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// LLM 客户端 trait：complete（完整请求）与 call（单 prompt 便捷入口）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式补全，返回首条回复文本
    async fn complete(&self, request: ChatRequest) -> Result<String, String>;

    /// 便捷调用：prompt + 可选 system prompt
    async fn call(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String, String> {
        self.complete(ChatRequest::from_prompt(prompt, system_prompt))
            .await
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
