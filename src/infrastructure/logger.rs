//! 日志基础设施

use anyhow::Result;
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

pub struct Logger;

impl Logger {
    /// 初始化日志系统
    ///
    /// 文件日志按日期滚动，控制台输出可关闭。`RUST_LOG` 优先于配置中的级别。
    /// 返回的 guard 必须在进程生命周期内保持存活，否则缓冲中的日志会丢失。
    pub fn init(config: &LoggingConfig) -> Result<WorkerGuard> {
        std::fs::create_dir_all(&config.log_dir)?;

        let file_appender = rolling::daily(&config.log_dir, &config.file_prefix);
        let (writer, guard) = non_blocking(file_appender);

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.level)));

        let console = config
            .console_output
            .then(|| fmt::layer().with_writer(io::stdout).with_ansi(true));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                // 文件中不使用颜色
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_names(true),
            )
            .with(console)
            .try_init()?;

        Ok(guard)
    }
}
