use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::{api::state::AppState, domain::User, error::AppError};

#[derive(Clone)]
pub struct CurrentUser {
    pub user: User,
}

pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session_cookie = jar.get("session").ok_or(AppError::Unauthorized)?;

    let auth_service = &state.service_context.auth_service;

    let session = auth_service
        .validate_session(session_cookie.value())
        .await?
        .ok_or(AppError::Unauthorized)?;

    let user = state
        .service_context
        .user_repo
        .find_by_id(session.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    // Insert current user into request extensions
    request.extensions_mut().insert(CurrentUser { user });

    Ok(next.run(request).await)
}
