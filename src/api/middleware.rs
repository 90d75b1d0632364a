use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::{
    error::{AppError, AppResult},
    services::{auth::Claims, policies::RequestContext},
    AppState,
};

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(authorization) = bearer.ok_or(AppError::Unauthorized)?;

    let claims = state.tokens.validate_token(authorization.token())?;

    // Insert claims into request extensions
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Like [`auth_middleware`], but lets anonymous requests through.
///
/// A token that is present but invalid is still rejected.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(TypedHeader(authorization)) = bearer {
        let claims = state.tokens.validate_token(authorization.token())?;
        request.extensions_mut().insert(claims);
    }

    Ok(next.run(request).await)
}

/// Build the request context from the method and any validated claims.
pub fn request_context(parts: &Parts) -> AppResult<RequestContext> {
    let principal = parts
        .extensions
        .get::<Claims>()
        .map(Claims::user_id)
        .transpose()?;

    Ok(RequestContext::new(parts.method.clone(), principal))
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        request_context(parts)
    }
}
