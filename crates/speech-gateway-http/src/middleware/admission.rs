//! Admission middleware for the speech routes.
//!
//! Resolves the caller, runs the allow-list and quota checks, and either
//! rejects the request or stores the resolved [`Caller`] in the request
//! extensions for the handler.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use speech_gateway_service::ServiceError;
use speech_gateway_service::admission::{Decision, Route};
use speech_gateway_service::identity::Caller;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn admission_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(route) = req
        .extensions()
        .get::<MatchedPath>()
        .and_then(|p| Route::from_path(p.as_str()))
    else {
        // Not a gated route; nothing to account for.
        return Ok(next.run(req).await);
    };

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let caller: Caller = state.identity().resolve(
        |name| req.headers().get(name).and_then(|v| v.to_str().ok()),
        peer,
    );

    let decision = state
        .admission()
        .admit(route, &caller.identity, caller.access_key.as_deref());
    state.metrics().record_decision(&decision);

    match decision {
        Decision::Rejected {
            reason,
            retry_after,
        } => {
            tracing::warn!(
                identity = %caller.identity,
                key = caller.redacted_key().as_deref().unwrap_or("-"),
                route = route.label(),
                reason = reason.code(),
                "request rejected"
            );
            Err(ServiceError::Forbidden {
                reason,
                retry_after,
            }
            .into())
        }
        Decision::Bypassed => {
            tracing::debug!(identity = %caller.identity, route = route.label(), "allow-listed key");
            req.extensions_mut().insert(caller);
            Ok(next.run(req).await)
        }
        Decision::Admitted { remaining } => {
            tracing::debug!(
                identity = %caller.identity,
                route = route.label(),
                remaining,
                "admitted"
            );
            req.extensions_mut().insert(caller);
            Ok(next.run(req).await)
        }
    }
}
