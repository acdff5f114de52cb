use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    escalation_rule, AdmissionPolicy, ChatService, ChatServiceDependencies, Clock,
    DeliveryPolicy, MemoryChatStore, MemoryObjectStore, MessageDispatcher, RateLimitGateway,
    SessionBroadcaster, SessionRegistry, SystemClock,
};
use config::AppConfig;
use domain::{User, UserId};
use futures_util::{SinkExt, StreamExt};
use infrastructure::Infrastructure;
use serde_json::Value;
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub store: MemoryChatStore,
    pub sessions: Arc<SessionRegistry>,
    pub jwt: Arc<JwtService>,
    pub http: reqwest::Client,
    _shutdown: oneshot::Sender<()>,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.jwt.secret = "test-secret-key".to_string();
    config.rate_limit.authenticated.burst = 100;
    config.rate_limit.public.burst = 100;
    config
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(test_config()).await
    }

    pub async fn start_with(config: AppConfig) -> Self {
        let store = MemoryChatStore::new();
        let infra = Infrastructure::in_memory(store.clone(), Arc::new(MemoryObjectStore::new()));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let sessions = Arc::new(SessionRegistry::new());

        let admission = Arc::new(AdmissionPolicy::new(
            infra.users.clone(),
            infra.blocks.clone(),
            clock.clone(),
            escalation_rule(&config.blocking),
        ));
        let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
            user_repository: infra.users.clone(),
            channel_repository: infra.channels.clone(),
            message_repository: infra.messages.clone(),
            object_store: infra.object_store.clone(),
            clock,
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
        let jwt = Arc::new(JwtService::new(config.jwt.clone()));
        let gateway = Arc::new(RateLimitGateway::from_config(&config.rate_limit));

        let state = AppState::new(dispatcher, gateway, jwt.clone(), config.session.clone());
        let app = router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
        });

        Self {
            addr,
            store,
            sessions,
            jwt,
            http: reqwest::Client::new(),
            _shutdown: shutdown_tx,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn user(&self, name: &str) -> (User, String) {
        let user = self.store.add_user(name, chrono::Utc::now()).await;
        let token = self.jwt.generate_token(user.id).expect("token");
        (user, token)
    }

    pub async fn connect(&self, token: &str) -> WsClient {
        let url = format!("ws://{}/ws?token={}", self.addr, token);
        let (socket, _) = connect_async(url).await.expect("ws connect");
        socket
    }

    /// 等待会话注册完成
    pub async fn wait_online(&self, user_id: UserId) {
        for _ in 0..50 {
            if self.sessions.is_online(user_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("user {user_id} never came online");
    }

    pub async fn wait_offline(&self, user_id: UserId) {
        for _ in 0..50 {
            if !self.sessions.is_online(user_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("user {user_id} never went offline");
    }
}

pub async fn send_json(socket: &mut WsClient, value: Value) {
    socket
        .send(TungsteniteMessage::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

pub async fn next_json(socket: &mut WsClient) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("ws error");
        if let TungsteniteMessage::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("json frame");
        }
    }
}

pub async fn expect_silence(socket: &mut WsClient) {
    let result = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(result.is_err(), "unexpected frame: {result:?}");
}
