//! 认证授权服务主入口

use authz_server::{
    config::AppConfig,
    handlers::health,
    middleware::AppState,
    repository::{IdentityStore, InMemoryIdentityStore, PgIdentityStore},
    routes,
    services::{spawn_policy_refresh, BootstrapSeeder},
    telemetry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let mut in_memory = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" => {
                println!("authz-server {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            "--in-memory" => in_memory = true,
            other => {
                eprintln!("未知参数: {}", other);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    dotenv::from_filename(".env.local").ok();
    dotenv::dotenv().ok();

    health::set_start_time();

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config.logging);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), in_memory, "authz-server starting");

    // 3. 身份存储
    let store: Arc<dyn IdentityStore> = if in_memory {
        tracing::warn!("Using in-memory identity store, state is lost on exit");
        Arc::new(InMemoryIdentityStore::new())
    } else {
        let store = PgIdentityStore::connect(&config.database).await?;
        store.migrate().await?;
        Arc::new(store)
    };

    // 4. 初始化基础 RBAC 数据，失败则不启动
    BootstrapSeeder::new(store.clone(), config.bootstrap.clone())
        .run()
        .await?;

    // 5. 构建应用状态
    let state = Arc::new(AppState::new(config.clone(), store)?);

    // 6. 后台策略刷新
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_job = spawn_policy_refresh(
        state.policy_cache.clone(),
        Duration::from_secs(config.policy_refresh.interval_secs),
        shutdown_rx.clone(),
    );

    // 7. 启动服务器
    let app = routes::create_router(state);
    let addr = &config.server.addr;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(addr = %addr, "Server listening");

    let mut server_shutdown = shutdown_rx;
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut server => {
            result??;
            return Ok(());
        }
    }

    // 8. 优雅关闭：通知所有任务，超时后强制退出
    let _ = shutdown_tx.send(true);

    let grace = Duration::from_secs(config.server.graceful_shutdown_timeout_secs);
    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => result??,
        Err(_) => {
            tracing::warn!("Graceful shutdown timeout reached, forcing exit");
            server.abort();
        }
    }

    if tokio::time::timeout(grace, refresh_job).await.is_err() {
        tracing::warn!("Policy refresh job did not stop in time");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }
}

/// 打印帮助信息
fn print_help() {
    println!("authz-server {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: authz-server [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!("  --in-memory   使用内存身份存储（开发用）");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 AUTHZ_ 前缀的环境变量完成，例如 AUTHZ_SECURITY__JWT_SECRET");
}
