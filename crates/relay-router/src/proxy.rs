use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::Response;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use relay_common::{ProxyError, new_trace_id};
use relay_core::engine::EngineResponse;
use relay_core::{Engine, classify_path};

#[derive(Clone)]
pub struct ProxyState {
    pub engine: Arc<Engine>,
}

/// Any method, any path: inbound paths arrive with arbitrary prefixes and
/// are normalized by the core, so everything funnels through the fallback.
pub fn proxy_router(engine: Arc<Engine>) -> Router {
    Router::new()
        .fallback(proxy_entry)
        .with_state(ProxyState { engine })
}

async fn proxy_entry(
    State(state): State<ProxyState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = new_trace_id();
    let started_at = Instant::now();

    let Some(key) = extract_bearer_key(&headers) else {
        return error_response(ProxyError::unauthorized(), &trace_id);
    };
    if !state.engine.authenticate_user_key(&key) {
        return error_response(ProxyError::unauthorized(), &trace_id);
    }

    let Some(inbound) = classify_path(uri.path()) else {
        return error_response(ProxyError::not_found("unknown path"), &trace_id);
    };

    info!(
        trace_id = %trace_id,
        method = %method,
        path = %uri.path(),
        dialect = ?inbound.dialect,
        "request received"
    );

    let result = state.engine.handle(&trace_id, &inbound, body).await;
    let response = match result {
        Ok(engine_response) => engine_response_to_axum(engine_response, &trace_id),
        Err(err) => error_response(err, &trace_id),
    };

    info!(
        trace_id = %trace_id,
        status = response.status().as_u16(),
        elapsed_ms = started_at.elapsed().as_millis(),
        "request finished"
    );
    response
}

fn extract_bearer_key(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let prefix = "Bearer ";
    if value.len() > prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix) {
        let token = value[prefix.len()..].trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    None
}

fn engine_response_to_axum(response: EngineResponse, trace_id: &str) -> Response {
    match response {
        EngineResponse::Json {
            status,
            content_type,
            body,
        } => {
            let mut resp = Response::new(Body::from(body));
            *resp.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            resp.headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            insert_trace_id(&mut resp, trace_id);
            resp
        }
        EngineResponse::Stream {
            status,
            content_type,
            body,
        } => {
            let stream = ReceiverStream::new(body).map(Ok::<_, Infallible>);
            let mut resp = Response::new(Body::from_stream(stream));
            *resp.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            resp.headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            // Hint reverse proxies not to buffer SSE.
            resp.headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            resp.headers_mut().insert(
                axum::http::HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            );
            insert_trace_id(&mut resp, trace_id);
            resp
        }
    }
}

fn error_response(err: ProxyError, trace_id: &str) -> Response {
    let mut resp = Response::new(Body::from(err.body));
    *resp.status_mut() =
        StatusCode::from_u16(err.status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    insert_trace_id(&mut resp, trace_id);
    resp
}

fn insert_trace_id(resp: &mut Response, trace_id: &str) {
    if let Ok(value) = HeaderValue::from_str(trace_id) {
        resp.headers_mut()
            .insert(axum::http::HeaderName::from_static("x-relay-request-id"), value);
    }
}
