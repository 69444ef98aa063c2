//! 多 Agent 调度层：依赖门控调度、进展跟踪与全局记忆快照聚合

pub mod global_memory;
pub mod progress;
pub mod scheduler;

pub use global_memory::{CrossAgentHit, GlobalMemoryManager, GlobalSnapshot};
pub use progress::{AgentStatus, ProgressSummary, ProgressTracker};
pub use scheduler::{AgentScheduler, SchedulerError};
