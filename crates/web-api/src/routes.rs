use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::Response,
    routing::{get, post, put},
    Extension, Json, Router,
};
use application::{dto::ProfileInfo, ApplicationError, LooseId};
use chrono::{DateTime, Utc};
use domain::{ChannelId, ProfileUpdate, UserId};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    error::ApiError, gateway::gateway_middleware, state::AppState,
    ws_connection::WebSocketConnection,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetUserPayload {
    user_id: LooseId,
}

impl TargetUserPayload {
    fn target(self) -> Result<UserId, ApiError> {
        self.user_id
            .parse()
            .map(UserId::new)
            .map_err(ApiError::bad_request)
    }
}

/// 资料修改请求体，沿用客户端的大写字段名
#[derive(Debug, Deserialize)]
struct ProfilePayload {
    #[serde(rename = "Mail")]
    mail: String,
    #[serde(rename = "UserName")]
    username: String,
    #[serde(rename = "Biom", alias = "Bio", default)]
    bio: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatQuery {
    chat_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStatus {
    pub is_blocked: bool,
}

/// `isBlocked` 为账号级封禁状态，`blockedByCaller` 为调用者是否拉黑了对方
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetBlockStatus {
    pub is_blocked: bool,
    pub blocked_until: Option<DateTime<Utc>>,
    pub blocked_by_caller: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockResult {
    pub is_blocked: bool,
    pub blocker_count: u64,
    pub account_blocked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutualBlockStatus {
    pub is_mutually_blocked: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineStatusBody {
    pub is_online: bool,
    pub last_online: DateTime<Utc>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    gateway_middleware,
                )),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/block", post(block_user))
        .route("/unblock", post(unblock_user))
        .route("/block-status", get(block_status))
        .route("/mutual-block", get(mutual_block))
        .route("/online-status", get(online_status))
        .route("/profile", put(update_profile))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Response {
    ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state, user_id).run())
}

async fn block_user(
    State(state): State<AppState>,
    Extension(actor): Extension<UserId>,
    Json(payload): Json<TargetUserPayload>,
) -> Result<Json<BlockResult>, ApiError> {
    let outcome = state
        .chat_service
        .admission()
        .block(actor, payload.target()?)
        .await?;

    Ok(Json(BlockResult {
        is_blocked: true,
        blocker_count: outcome.blocker_count,
        account_blocked_until: outcome.account_blocked_until,
    }))
}

async fn unblock_user(
    State(state): State<AppState>,
    Extension(actor): Extension<UserId>,
    Json(payload): Json<TargetUserPayload>,
) -> Result<Json<BlockStatus>, ApiError> {
    state
        .chat_service
        .admission()
        .unblock(actor, payload.target()?)
        .await?;

    Ok(Json(BlockStatus { is_blocked: false }))
}

async fn block_status(
    State(state): State<AppState>,
    Extension(actor): Extension<UserId>,
    Query(query): Query<UserQuery>,
) -> Result<Json<TargetBlockStatus>, ApiError> {
    let target = UserId::new(query.user_id);
    let user = state
        .chat_service
        .find_user(target)
        .await?
        .ok_or(ApplicationError::UserNotFound)?;
    let blocked_by_caller = state
        .chat_service
        .admission()
        .is_blocked(actor, target)
        .await?;
    Ok(Json(TargetBlockStatus {
        is_blocked: user.is_blocked,
        blocked_until: user.blocked_until,
        blocked_by_caller,
    }))
}

async fn mutual_block(
    State(state): State<AppState>,
    Extension(actor): Extension<UserId>,
    Query(query): Query<ChatQuery>,
) -> Result<Json<MutualBlockStatus>, ApiError> {
    let is_mutually_blocked = state
        .chat_service
        .is_chat_mutually_blocked(actor, ChannelId::new(query.chat_id))
        .await?;
    Ok(Json(MutualBlockStatus {
        is_mutually_blocked,
    }))
}

async fn online_status(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<OnlineStatusBody>, ApiError> {
    let status = state
        .chat_service
        .online_status(UserId::new(query.user_id))
        .await?;
    Ok(Json(OnlineStatusBody {
        is_online: status.is_online,
        last_online: status.last_online,
    }))
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(actor): Extension<UserId>,
    Json(payload): Json<ProfilePayload>,
) -> Result<Json<ProfileInfo>, ApiError> {
    let update = ProfileUpdate::new(payload.mail, payload.username, payload.bio)
        .map_err(ApplicationError::from)?;
    let profile = state.chat_service.update_profile(actor, update).await?;
    Ok(Json(profile))
}
