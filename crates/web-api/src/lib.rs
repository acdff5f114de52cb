//! Web API 层。
//!
//! 提供 Axum 路由：入口网关（认证、封禁检查、限流）、WebSocket 会话，
//! 以及拉黑和在线状态的 HTTP 接口。

mod auth;
mod error;
mod gateway;
mod routes;
mod state;
mod ws_connection;

pub use auth::{extract_token, Claims, JwtService, TOKEN_COOKIE};
pub use config::JwtConfig;
pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
