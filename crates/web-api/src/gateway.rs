//! 入口网关
//!
//! 公开路径按客户端 IP 限流；其余路径先认证，再检查账号封禁，最后按用户限流。
//! 认证得到的 `UserId` 写入请求扩展供后续处理器使用。

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::{error::ApiError, state::AppState};

const PUBLIC_PATHS: &[&str] = &["/health"];

pub async fn gateway_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if PUBLIC_PATHS.contains(&req.uri().path()) {
        let ip = client_ip(&req).unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        if let Err(err) = state.gateway.check_public(ip) {
            tracing::warn!(ip = %ip, path = %req.uri().path(), "Rate limit exceeded");
            return Err(err.into());
        }
        return Ok(next.run(req).await);
    }

    let user_id = state
        .jwt_service
        .authenticate(req.headers(), req.uri())
        .inspect_err(|err| tracing::debug!(path = %req.uri().path(), error = ?err, "authentication failed"))?;

    let user = state
        .chat_service
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Unknown user"))?;
    if user.is_blocked {
        tracing::info!(user_id = %user_id, "blocked account rejected at gateway");
        return Err(ApiError::forbidden("Account is blocked"));
    }

    if let Err(err) = state.gateway.check_user(user_id) {
        tracing::warn!(user_id = %user_id, path = %req.uri().path(), "Rate limit exceeded");
        return Err(err.into());
    }

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

/// 先取 ConnectInfo，再取 X-Forwarded-For 第一跳
fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip());
    }

    req.headers()
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}
