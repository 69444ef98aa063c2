//! 分层记忆：短期上下文、TTL 缓存、持久化 JSON 文档、向量语义检索
//!
//! 每个 Agent 独占一个 AgentMemory；跨 Agent 只能通过 snapshot() 导出的只读值类型访问。
//! 持久层与向量层在构造时从磁盘加载，每次变更写即落盘（无批量、无 WAL）。
//! 读侧 I/O 失败一律降级为空文档；写侧失败向上传播（静默丢写比中止更糟）。

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::MemorySection;
use crate::llm::EmbeddingProvider;

/// 向量表的落盘文件名；持久层键扫描会跳过它
const VECTOR_FILE: &str = "_vectors";

/// smart_set 的存储层选择；Auto 按决策表路由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Auto,
    Cache,
    Context,
    Persistent,
}

/// 向量条目：原文、嵌入与元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub key: String,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// 语义检索结果
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub key: String,
    pub text: String,
    pub similarity: f32,
    pub metadata: HashMap<String, Value>,
}

/// 各层规模统计
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub context_size: usize,
    pub cache_size: usize,
    pub persistent_size: usize,
    pub vector_size: usize,
    pub context_keys: Vec<String>,
    pub cache_keys: Vec<String>,
    pub persistent_keys: Vec<String>,
    pub has_embedding_model: bool,
}

/// 只读快照：Coordinator 聚合跨 Agent 视图时持有的值类型，不含任何活引用
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    pub context: HashMap<String, Value>,
    pub persistent_keys: Vec<String>,
    pub vectors: Vec<VectorEntry>,
    pub stats: MemoryStats,
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// 四层记忆的聚合体
pub struct AgentMemory {
    memory_dir: PathBuf,
    thresholds: MemorySection,
    context: HashMap<String, Value>,
    cache: HashMap<String, CacheEntry>,
    persistent_keys: BTreeSet<String>,
    vectors: Vec<VectorEntry>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl AgentMemory {
    /// 创建记忆目录并加载持久层键索引与向量表
    pub fn new(
        memory_dir: impl AsRef<Path>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self> {
        let memory_dir = memory_dir.as_ref().to_path_buf();
        fs::create_dir_all(&memory_dir)
            .with_context(|| format!("创建记忆目录失败: {}", memory_dir.display()))?;

        let persistent_keys = scan_persistent_keys(&memory_dir);
        let vectors = load_vector_table(&memory_dir);

        Ok(Self {
            memory_dir,
            thresholds: MemorySection::default(),
            context: HashMap::new(),
            cache: HashMap::new(),
            persistent_keys,
            vectors,
            embedder,
        })
    }

    /// 覆盖 smart_set 的路由阈值（测试与配置热调）
    pub fn with_thresholds(mut self, thresholds: MemorySection) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn memory_dir(&self) -> &Path {
        &self.memory_dir
    }

    // === 短期上下文 ===

    pub fn context_get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn context_set(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
    }

    pub fn context_all(&self) -> &HashMap<String, Value> {
        &self.context
    }

    pub fn context_clear(&mut self) {
        self.context.clear();
    }

    // === TTL 缓存 ===

    /// 写缓存；ttl 为 None 时用配置的默认 TTL。ttl 为零表示立即过期
    pub fn cache_set(&mut self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let ttl =
            ttl.unwrap_or_else(|| Duration::from_secs(self.thresholds.default_cache_ttl_secs));
        self.cache.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// 读缓存；过期条目视为不存在并顺手驱逐
    pub fn cache_get(&mut self, key: &str) -> Option<Value> {
        let expired = match self.cache.get(key) {
            Some(entry) => Instant::now() >= entry.expires_at,
            None => return None,
        };
        if expired {
            self.cache.remove(key);
            return None;
        }
        self.cache.get(key).map(|e| e.value.clone())
    }

    fn evict_expired(&mut self) {
        let now = Instant::now();
        self.cache.retain(|_, entry| now < entry.expires_at);
    }

    // === 持久层（每键一个 JSON 文件）===

    /// 持久化文档：更新键索引并落盘后才返回；写失败向上传播
    pub fn persist_save(&mut self, key: &str, document: &Value) -> Result<()> {
        let path = self.persistent_path(key);
        let text = serde_json::to_string_pretty(document)?;
        fs::write(&path, text).with_context(|| format!("写入持久记忆失败: {}", path.display()))?;
        self.persistent_keys.insert(key.to_string());
        Ok(())
    }

    /// 加载文档；未知键或读取/解析失败时返回空文档
    pub fn persist_load(&self, key: &str) -> Value {
        let path = self.persistent_path(key);
        match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(key, error = %e, "持久记忆解析失败，返回空文档");
                empty_document()
            }),
            Err(_) => empty_document(),
        }
    }

    pub fn list_persistent_keys(&self) -> Vec<String> {
        self.persistent_keys.iter().cloned().collect()
    }

    fn persistent_path(&self, key: &str) -> PathBuf {
        self.memory_dir.join(format!("{}.json", key))
    }

    // === 向量层 ===

    /// 计算文本嵌入；无后端或后端失败时返回 None（语义能力缺失不得阻塞流水线）
    pub fn create_embedding(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(text) {
            Ok(v) if !v.is_empty() => Some(v),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "嵌入计算失败");
                None
            }
        }
    }

    /// 保存向量记忆并整表落盘；返回是否实际写入（无嵌入后端时为 false）。
    /// 仅向量表写盘失败会返回 Err
    pub fn save_embedding(
        &mut self,
        key: impl Into<String>,
        text: impl Into<String>,
        metadata: HashMap<String, Value>,
    ) -> Result<bool> {
        let key = key.into();
        let text = text.into();
        let Some(embedding) = self.create_embedding(&text) else {
            tracing::warn!(key = %key, "向量检索模块未启用或嵌入失败，未保存");
            return Ok(false);
        };

        self.vectors.retain(|e| e.key != key);
        self.vectors.push(VectorEntry {
            key,
            text,
            embedding,
            metadata,
        });
        self.flush_vector_table()?;
        Ok(true)
    }

    /// 语义检索：余弦相似度 ≥ threshold 的条目按相似度降序取前 top_k；
    /// 无嵌入后端或向量表为空时返回空序列
    pub fn semantic_search(&self, query: &str, top_k: usize, threshold: f32) -> Vec<SearchHit> {
        if self.vectors.is_empty() {
            return Vec::new();
        }
        let Some(query_embedding) = self.create_embedding(query) else {
            return Vec::new();
        };

        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .map(|entry| SearchHit {
                key: entry.key.clone(),
                text: entry.text.clone(),
                similarity: cosine_similarity(&query_embedding, &entry.embedding),
                metadata: entry.metadata.clone(),
            })
            .filter(|hit| hit.similarity >= threshold)
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        hits
    }

    fn flush_vector_table(&self) -> Result<()> {
        let path = self.persistent_path(VECTOR_FILE);
        let text = serde_json::to_string_pretty(&self.vectors)?;
        fs::write(&path, text).with_context(|| format!("写入向量表失败: {}", path.display()))?;
        Ok(())
    }

    // === smart 存取 ===

    /// 按存储层写入；Auto 路由规则：标量与短文本走缓存，大文档走持久层，其余走上下文
    pub fn smart_set(&mut self, key: &str, value: Value, class: StorageClass) -> Result<()> {
        let class = match class {
            StorageClass::Auto => self.auto_route(&value),
            explicit => explicit,
        };
        match class {
            StorageClass::Cache => {
                self.cache_set(key, value, None);
                Ok(())
            }
            StorageClass::Context => {
                self.context_set(key, value);
                Ok(())
            }
            StorageClass::Persistent => self.persist_save(key, &value),
            StorageClass::Auto => unreachable!("Auto 已在上方消解"),
        }
    }

    /// 按 缓存 → 上下文 → 持久层 的优先序读取；都未命中时返回 default
    pub fn smart_get(&mut self, key: &str, default: Value) -> Value {
        if let Some(value) = self.cache_get(key) {
            return value;
        }
        if let Some(value) = self.context.get(key) {
            return value.clone();
        }
        if self.persistent_keys.contains(key) {
            return self.persist_load(key);
        }
        default
    }

    fn auto_route(&self, value: &Value) -> StorageClass {
        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) => StorageClass::Cache,
            Value::String(s) => {
                if s.chars().count() < self.thresholds.small_text_chars {
                    StorageClass::Cache
                } else if s.len() >= self.thresholds.large_doc_bytes {
                    StorageClass::Persistent
                } else {
                    StorageClass::Context
                }
            }
            Value::Array(_) | Value::Object(_) => {
                let serialized_len = serde_json::to_string(value).map(|s| s.len()).unwrap_or(0);
                if serialized_len >= self.thresholds.large_doc_bytes {
                    StorageClass::Persistent
                } else {
                    StorageClass::Context
                }
            }
        }
    }

    // === 统计与快照 ===

    /// 各层统计；计数前先驱逐过期缓存
    pub fn stats(&mut self) -> MemoryStats {
        self.evict_expired();
        MemoryStats {
            context_size: self.context.len(),
            cache_size: self.cache.len(),
            persistent_size: self.persistent_keys.len(),
            vector_size: self.vectors.len(),
            context_keys: self.context.keys().cloned().collect(),
            cache_keys: self.cache.keys().cloned().collect(),
            persistent_keys: self.list_persistent_keys(),
            has_embedding_model: self.embedder.is_some(),
        }
    }

    /// 导出只读快照（全部为 owned 克隆），供 Coordinator 聚合
    pub fn snapshot(&mut self) -> MemorySnapshot {
        let stats = self.stats();
        MemorySnapshot {
            context: self.context.clone(),
            persistent_keys: self.list_persistent_keys(),
            vectors: self.vectors.clone(),
            stats,
        }
    }
}

fn empty_document() -> Value {
    Value::Object(serde_json::Map::new())
}

fn scan_persistent_keys(dir: &Path) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return keys;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if stem != VECTOR_FILE {
                keys.insert(stem.to_string());
            }
        }
    }
    keys
}

fn load_vector_table(dir: &Path) -> Vec<VectorEntry> {
    let path = dir.join(format!("{}.json", VECTOR_FILE));
    match fs::read_to_string(&path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "向量表解析失败，按空表处理");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    }
}

/// 余弦相似度；维度不一致或零向量时为 0
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
