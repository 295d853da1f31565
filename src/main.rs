use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use agenda::infrastructure::{DatabaseManager, Logger};
use agenda::{build_router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    let _log_guard = Logger::init(&config.logging)?;

    info!("🚀 启动 agenda 服务...");

    let db = DatabaseManager::new(&config.database)
        .await
        .with_context(|| format!("无法连接数据库: {}", config.database.url))?;
    db.migrate().await.context("数据库初始化失败")?;
    info!("✅ 数据库连接成功");

    let state = AppState::new(db.into_pool(), config.clone());

    match (&config.superadmin.email, &config.superadmin.password) {
        (Some(email), Some(password)) => state
            .accounts
            .ensure_superadmin(email, password)
            .await
            .context("创建超级管理员失败")?,
        (Some(_), None) | (None, Some(_)) => {
            warn!("superadmin.email 与 superadmin.password 需同时配置，已跳过超级管理员引导")
        }
        (None, None) => {}
    }

    let app = build_router(state);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法绑定到 {}", addr))?;

    info!("🌐 服务运行在 http://{}", addr);
    info!("📖 接口前缀: /api，健康检查: /health");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务运行失败")?;

    info!("👋 服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("无法监听退出信号: {}", e);
        std::future::pending::<()>().await;
    }
    info!("收到退出信号，正在关闭...");
}
