//! # Exam Autosave
//!
//! 限时在线考试的客户端作答核心：本地状态、自动保存投递队列、计时与提交
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `storage/` - 持久化键值存储（`DurableStore`），文件与内存两种实现
//! - `network` - 在线/离线状态（`NetworkMonitor`）
//! - `api/` - 考试后端能力（`ExamApi`），HTTP 与脚本化两种实现
//!
//! ### ② 业务能力层（Queue）
//! - `queue/` - 自动保存投递队列与重试循环，保证答案最终送达
//!
//! ### ③ 流程层（Session）
//! - `session/` - 本地作答状态、倒计时、自动保存节流、提交流程
//!
//! ### ④ 外壳（App）
//! - `app` - 组装配置、后端、存储，开始作答会话
//!
//! ## 模块结构

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod network;
pub mod queue;
pub mod session;
pub mod storage;
pub mod utils;

// 重新导出常用类型
pub use api::{ExamApi, HttpExamApi, ScriptedApi};
pub use app::App;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{AnswerPayload, AttemptState, Question, QuestionId, SavePayload, SubmitResult};
pub use network::NetworkMonitor;
pub use queue::{AutosaveQueue, FlushReport, RetryState};
pub use session::{AttemptSession, AttemptStore, Direction, SessionDeps, SyncStatus};
pub use storage::{DurableStore, FileStore, MemoryStore};
pub use utils::Clock;
