//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本顺序返回预置回复；脚本耗尽后返回兜底回复（默认 "done"，与 Planner 的终止约定一致）。
//! 同时记录收到的 user prompt，便于测试断言提示词内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ChatRequest, LlmClient, Role};

/// 脚本化 Mock 客户端
pub struct MockLlmClient {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    /// 依次返回给定回复，耗尽后返回 "done"
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fallback: "done".to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 每次调用都返回同一条回复（用于验证循环的迭代上限）
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 收到过的全部 user prompt
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::with_replies(Vec::<String>::new())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, String> {
        if let Some(user) = request
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
        {
            self.prompts.lock().unwrap().push(user.content.clone());
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(reply)
    }
}
