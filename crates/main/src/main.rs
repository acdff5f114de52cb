//! 主应用程序入口
//!
//! 加载配置，装配仓储与服务，启动后台任务与 Axum 服务。

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    escalation_rule, observe_session_count, AdmissionPolicy, AutoUnblockSweeper, ChatService,
    ChatServiceDependencies, Clock, DeliveryPolicy, MessageDispatcher, RateLimitGateway,
    SessionBroadcaster, SessionRegistry, SystemClock,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

const LIMITER_PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "配置已加载");
    if config.uses_dev_secret() {
        tracing::warn!("正在使用开发环境 JWT 密钥，请勿用于生产");
    }

    let infra = Infrastructure::connect(&config).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sessions = Arc::new(SessionRegistry::new());
    let admission = Arc::new(AdmissionPolicy::new(
        infra.users.clone(),
        infra.blocks.clone(),
        clock.clone(),
        escalation_rule(&config.blocking),
    ));

    // 创建应用层服务
    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        user_repository: infra.users.clone(),
        channel_repository: infra.channels.clone(),
        message_repository: infra.messages.clone(),
        object_store: infra.object_store.clone(),
        clock: clock.clone(),
        sessions: sessions.clone(),
        admission,
    }));
    let broadcaster = SessionBroadcaster::new(
        sessions.clone(),
        DeliveryPolicy {
            write_timeout: config.session.write_timeout(),
            write_retries: config.session.write_retries,
        },
    );
    let dispatcher = Arc::new(MessageDispatcher::new(chat_service, broadcaster));
    let gateway = Arc::new(RateLimitGateway::from_config(&config.rate_limit));
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    // 后台任务共享同一个取消令牌
    let cancel = CancellationToken::new();
    let sweeper = AutoUnblockSweeper::new(
        infra.users.clone(),
        clock,
        config.blocking.sweep_interval(),
    );
    let sweeper_task = tokio::spawn(sweeper.run(cancel.child_token()));
    let observer_task = tokio::spawn(observe_session_count(
        sessions,
        config.session.sample_interval(),
        cancel.child_token(),
    ));
    let purge_task = tokio::spawn({
        let gateway = gateway.clone();
        let cancel = cancel.child_token();
        async move {
            let mut interval = tokio::time::interval(LIMITER_PURGE_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => gateway.retain_recent(),
                }
            }
        }
    });

    let state = AppState::new(dispatcher, gateway, jwt_service, config.session.clone());
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("聊天服务启动在 http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    cancel.cancel();
    let _ = tokio::join!(sweeper_task, observer_task, purge_task);
    tracing::info!("聊天服务已停止");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听 Ctrl+C 信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("接收到 Ctrl+C 信号，开始优雅停机...");
}
