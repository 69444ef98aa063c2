//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）、嵌入提供方、结构化回复解析

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod parser;
pub mod traits;

pub use embedding::{create_embedder_from_config, EmbeddingProvider, OpenAiEmbedder};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use parser::{extract_fenced_block, parse_yaml_reply};
pub use traits::{ChatRequest, LlmClient, Message, Role};
