//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `YANBAO__*` 覆盖（双下划线表示嵌套，如 `YANBAO__LLM__MODEL=gpt-4o`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub embedding: EmbeddingSection,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub agent: AgentSection,
}

/// [app] 段：应用名、记忆根目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 各 Agent 记忆目录的根，未设置时用 ./data/memory
    pub memory_root: Option<PathBuf>,
}

/// [llm] 段：OpenAI 兼容端点与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 默认采样温度；单次调用可覆盖
    pub temperature: Option<f32>,
    /// 默认最大生成 token 数；单次调用可覆盖
    pub max_tokens: Option<u32>,
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            temperature: None,
            max_tokens: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_model() -> String {
    "gpt-4-turbo-preview".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

/// [embedding] 段：嵌入模型（与 LLM 可用不同端点，如 Qwen 兼容接口）
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSection {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            base_url: None,
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-v1".to_string()
}

/// [memory] 段：smart_set 的分层路由阈值与缓存默认 TTL
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    /// 短文本上限（字符数）：低于此值的字符串走缓存层
    #[serde(default = "default_small_text_chars")]
    pub small_text_chars: usize,
    /// 大文档下限（序列化字节数）：达到此值的结构化数据走持久层
    #[serde(default = "default_large_doc_bytes")]
    pub large_doc_bytes: usize,
    /// 缓存默认 TTL（秒）
    #[serde(default = "default_cache_ttl_secs")]
    pub default_cache_ttl_secs: u64,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            small_text_chars: default_small_text_chars(),
            large_doc_bytes: default_large_doc_bytes(),
            default_cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_small_text_chars() -> usize {
    256
}

fn default_large_doc_bytes() -> usize {
    4096
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

/// [agent] 段：执行循环参数
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 单次运行的最大迭代数（含重复步骤的空转），防止 Planner 反复建议已执行步骤时死循环
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// 单个动作的超时（秒）；0 表示不限
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
    /// 相邻动作之间的间隔（毫秒），对外部数据源与 LLM 限流
    #[serde(default)]
    pub step_delay_ms: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            action_timeout_secs: default_action_timeout_secs(),
            step_delay_ms: 0,
        }
    }
}

fn default_max_steps() -> usize {
    32
}

fn default_action_timeout_secs() -> u64 {
    300
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            embedding: EmbeddingSection::default(),
            memory: MemorySection::default(),
            agent: AgentSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 YANBAO__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 YANBAO__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("YANBAO")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
