//! Request middleware.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use gatehouse_types::Address;

/// Header carrying the calling account.
pub const CALLER_HEADER: &str = "X-Gatehouse-Caller";

/// The account on whose behalf a request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Address);

/// Resolves the caller from the `X-Gatehouse-Caller` header.
///
/// The header is trusted as-is. Authenticating the transport is left to
/// whatever fronts the server; the engine itself decides what the caller
/// may do.
pub async fn caller_middleware(mut req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let caller = req
        .headers()
        .get(CALLER_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::UNAUTHORIZED)?
        .trim()
        .parse::<Address>()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(Caller(caller));
    Ok(next.run(req).await)
}
