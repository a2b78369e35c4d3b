use heads_up_server::api::{AppState, create_router};
use heads_up_server::config::ServerConfig;
use heads_up_server::{logging, spawn_idle_reaper};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 载入 .env 文件（如果存在）
    let _ = dotenvy::dotenv();
    logging::init();

    let config = ServerConfig::from_env()?;
    match &config.snapshot_dir {
        Some(dir) => info!("快照保存在 {}", dir.display()),
        None => info!("未设置 SNAPSHOT_DIR，快照只保存在内存中"),
    }

    let state = AppState::from_config(config.clone());
    spawn_idle_reaper(state.broadcaster.clone(), config.keepalive, config.idle_timeout);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!("服务器正在监听 {}", config.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
