//! 作答会话 - 流程编排层
//!
//! - `state_store`: 本地作答状态（恢复、变更、持久化镜像）
//! - `countdown` / `throttle`: 倒计时与自动保存节流
//! - `attempt_session`: 把以上部分与投递队列、后端能力组合起来

pub mod attempt_session;
pub mod countdown;
pub mod state_store;
pub mod status;
pub mod throttle;

pub use attempt_session::{AttemptSession, AutosaveOutcome, SessionDeps, TickOutcome};
pub use countdown::{Countdown, CountdownTick};
pub use state_store::{AttemptStore, Direction};
pub use status::SyncStatus;
pub use throttle::AutosaveThrottle;
