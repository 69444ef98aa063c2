//! 全局记忆管理
//!
//! Coordinator 侧的跨 Agent 记忆视图：只持有各 Agent 导出的 MemorySnapshot 值类型，
//! 从不持有指向 Agent 私有记忆的活引用；写操作只落在自己的 base 记忆与全局上下文里。

use std::collections::HashMap;

use anyhow::Result;
use serde_json::Value;

use crate::agent::memory::{cosine_similarity, AgentMemory, MemorySnapshot, MemoryStats, SearchHit};

/// 跨 Agent 检索命中：来源为 base 或 agent_<name>
#[derive(Debug, Clone)]
pub struct CrossAgentHit {
    pub source: String,
    pub hit: SearchHit,
}

/// 全局记忆快照（供状态报告与诊断）
#[derive(Debug, Clone)]
pub struct GlobalSnapshot {
    pub global_context: HashMap<String, Value>,
    pub base_stats: MemoryStats,
    pub agents: HashMap<String, MemorySnapshot>,
}

/// 某个 Agent 的进展视图（从其快照的短期上下文还原）
#[derive(Debug, Clone)]
pub struct AgentProgress {
    pub completed_tasks: Vec<String>,
    pub failed_tasks: Vec<String>,
    pub status: String,
}

/// 全局记忆管理器
pub struct GlobalMemoryManager {
    base_memory: AgentMemory,
    snapshots: HashMap<String, MemorySnapshot>,
    global_context: HashMap<String, Value>,
}

impl GlobalMemoryManager {
    pub fn new(base_memory: AgentMemory) -> Self {
        Self {
            base_memory,
            snapshots: HashMap::new(),
            global_context: HashMap::new(),
        }
    }

    /// 注册或刷新某个 Agent 的记忆快照
    pub fn register_snapshot(&mut self, agent_name: &str, snapshot: MemorySnapshot) {
        self.snapshots.insert(agent_name.to_string(), snapshot);
    }

    pub fn snapshot_of(&self, agent_name: &str) -> Option<&MemorySnapshot> {
        self.snapshots.get(agent_name)
    }

    /// 更新全局上下文，并在 base 记忆里留一份 global_ 前缀的副本
    pub fn update_global_context(&mut self, key: &str, value: Value) {
        self.base_memory
            .context_set(format!("global_{}", key), value.clone());
        self.global_context.insert(key.to_string(), value);
    }

    pub fn global_context(&self) -> &HashMap<String, Value> {
        &self.global_context
    }

    pub fn base_memory_mut(&mut self) -> &mut AgentMemory {
        &mut self.base_memory
    }

    /// 全局记忆快照：全局上下文 + base 统计 + 各 Agent 快照
    pub fn get_global_memory_snapshot(&mut self) -> GlobalSnapshot {
        GlobalSnapshot {
            global_context: self.global_context.clone(),
            base_stats: self.base_memory.stats(),
            agents: self.snapshots.clone(),
        }
    }

    /// 跨 Agent 语义检索：用 base 记忆的嵌入后端编码查询，
    /// 对 base 向量层与每个快照的向量条目统一打分，按相似度降序取前 top_k
    pub fn cross_agent_search(
        &mut self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Vec<CrossAgentHit> {
        let mut results: Vec<CrossAgentHit> = self
            .base_memory
            .semantic_search(query, top_k, threshold)
            .into_iter()
            .map(|hit| CrossAgentHit {
                source: "base".to_string(),
                hit,
            })
            .collect();

        if let Some(query_embedding) = self.base_memory.create_embedding(query) {
            for (agent_name, snapshot) in &self.snapshots {
                for entry in &snapshot.vectors {
                    let similarity = cosine_similarity(&query_embedding, &entry.embedding);
                    if similarity >= threshold {
                        results.push(CrossAgentHit {
                            source: format!("agent_{}", agent_name),
                            hit: SearchHit {
                                key: entry.key.clone(),
                                text: entry.text.clone(),
                                similarity,
                                metadata: entry.metadata.clone(),
                            },
                        });
                    }
                }
            }
        }

        results.sort_by(|a, b| {
            b.hit
                .similarity
                .partial_cmp(&a.hit.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);
        results
    }

    /// 从快照还原某个 Agent 的执行进展
    pub fn get_agent_progress(&self, agent_name: &str) -> Option<AgentProgress> {
        let snapshot = self.snapshots.get(agent_name)?;
        let string_list = |key: &str| -> Vec<String> {
            snapshot
                .context
                .get(key)
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default()
        };
        Some(AgentProgress {
            completed_tasks: string_list("completed_tasks"),
            failed_tasks: string_list("failed_tasks"),
            status: snapshot
                .context
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
        })
    }

    /// 将某个 Agent 的运行结果记入全局聚合（base 记忆持久层 + 全局上下文）
    pub fn record_agent_result(&mut self, agent_name: &str, result: &Value) -> Result<()> {
        let key = format!("{}_result", agent_name);
        self.base_memory.persist_save(&key, result)?;
        self.update_global_context(&key, result.clone());
        Ok(())
    }
}
