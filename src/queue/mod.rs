//! 自动保存队列
//!
//! - `autosave_queue` - 持久化的 FIFO 投递队列
//! - `retry_loop` - 周期刷新与网络恢复时的立即刷新

pub mod autosave_queue;
pub mod retry_loop;

pub use autosave_queue::{AutosaveQueue, DrainedCallback, FlushReport};
pub use retry_loop::RetryState;
