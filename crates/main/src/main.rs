//! 主应用程序入口
//!
//! 装配存储、会话注册表、频道目录与分发器，启动 Axum 服务。

use std::sync::Arc;

use application::{
    services::{AuthService, AuthServiceDependencies, ChatService, ChatServiceDependencies},
    sweeper, ChannelDirectory, Dispatcher, DispatcherDependencies, SessionRegistry, SystemClock,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, BcryptPasswordHasher, PostgresChannelRepository, PostgresMessageRepository,
    PostgresUserRepository,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );
    let pool = Arc::new(create_pg_pool(&config.database).await?);

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&*pool).await?;

    let user_repository = Arc::new(PostgresUserRepository::new(pool.clone()));
    let channel_repository = Arc::new(PostgresChannelRepository::new(pool.clone()));
    let message_repository = Arc::new(PostgresMessageRepository::new(pool));

    let clock = Arc::new(SystemClock);
    let password_hasher = Arc::new(BcryptPasswordHasher::new(config.auth.bcrypt_cost));

    let registry = Arc::new(SessionRegistry::new(clock.clone(), &config.auth));
    let directory = Arc::new(ChannelDirectory::new(
        channel_repository,
        message_repository,
        user_repository.clone(),
        &config.channels,
    ));

    let auth_service = Arc::new(AuthService::new(AuthServiceDependencies {
        user_repository,
        password_hasher,
        registry: registry.clone(),
        directory: directory.clone(),
        revoke_sessions_on_password_change: config.auth.revoke_sessions_on_password_change,
    }));

    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        registry: registry.clone(),
        directory: directory.clone(),
        clock,
    }));

    let dispatcher = Arc::new(Dispatcher::new(DispatcherDependencies {
        clients: config.clients.clone(),
        registry: registry.clone(),
        auth_service,
        chat_service,
    }));

    // 会话清扫后台任务
    sweeper::spawn(registry, directory, config.sweep.clone());

    let app = router(AppState::new(dispatcher));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("消息服务启动在 http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
