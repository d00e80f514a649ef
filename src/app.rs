use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::api::{ExamApi, HttpExamApi};
use crate::config::Config;
use crate::logger;
use crate::network::NetworkMonitor;
use crate::session::{AttemptSession, SessionDeps};
use crate::storage::{DurableStore, FileStore};

/// 应用外壳
///
/// 持有配置、HTTP 后端、文件存储和网络状态，负责开始作答会话。
pub struct App {
    config: Config,
    api: Arc<dyn ExamApi>,
    store: Arc<dyn DurableStore>,
    network: NetworkMonitor,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        logger::init_with_verbosity(config.verbose_logging);
        config.validate().context("配置校验失败")?;

        log_startup(&config);

        let api = HttpExamApi::new(&config).context("创建HTTP客户端失败")?;
        let store = FileStore::new(&config.storage_dir)
            .with_context(|| format!("无法创建本地存储目录: {}", config.storage_dir))?;

        Ok(Self {
            config,
            api: Arc::new(api),
            store: Arc::new(store),
            network: NetworkMonitor::online(),
        })
    }

    /// 使用自定义后端和存储（离线演示或测试）
    pub fn with_adapters(config: Config, api: Arc<dyn ExamApi>, store: Arc<dyn DurableStore>) -> Self {
        Self {
            config,
            api,
            store,
            network: NetworkMonitor::online(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 网络状态，外部连通性探测通过它上报在线/离线
    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// 开始作答并启动计时器
    pub async fn start_attempt(&self, exam_id: &str) -> Result<Arc<AttemptSession>> {
        let deps = SessionDeps::new(self.api.clone(), self.store.clone()).with_network(self.network.clone());
        let session = AttemptSession::start(exam_id, &self.config, deps)
            .await
            .with_context(|| format!("开始考试 {} 失败", exam_id))?;
        session.run_timers();
        Ok(session)
    }
}

/// 记录启动信息
fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 考试作答客户端启动");
    info!("🌐 后端地址: {}", config.base_api_url);
    info!("📁 本地存储: {}", config.storage_dir);
    info!(
        "⏱ 计时间隔 {}ms / 自动保存窗口 {}s / 重试周期 {}s",
        config.tick_interval_ms, config.autosave_window_secs, config.retry_interval_secs
    );
    info!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ScriptedApi;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_start_attempt_runs_timers() {
        let app = App::with_adapters(
            Config::default(),
            Arc::new(ScriptedApi::new()),
            Arc::new(MemoryStore::new()),
        );

        let session = app.start_attempt("exam-1").await.unwrap();
        assert_eq!(session.attempt_id(), "attempt-1");
        assert!(!session.run_timers());
        session.shutdown().await;
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        let config = Config {
            tick_interval_ms: 0,
            ..Config::default()
        };
        assert!(App::initialize(config).is_err());
    }
}
