use std::sync::Arc;

use application::{ChatService, MessageDispatcher, RateLimitGateway, SessionRegistry};
use config::SessionConfig;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<MessageDispatcher>,
    pub chat_service: Arc<ChatService>,
    pub sessions: Arc<SessionRegistry>,
    pub gateway: Arc<RateLimitGateway>,
    pub jwt_service: Arc<JwtService>,
    pub session_config: SessionConfig,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<MessageDispatcher>,
        gateway: Arc<RateLimitGateway>,
        jwt_service: Arc<JwtService>,
        session_config: SessionConfig,
    ) -> Self {
        let chat_service = dispatcher.chat().clone();
        let sessions = chat_service.sessions().clone();
        Self {
            dispatcher,
            chat_service,
            sessions,
            gateway,
            jwt_service,
            session_config,
        }
    }
}
