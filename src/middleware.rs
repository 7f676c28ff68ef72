use crate::key_generator::KeyGenerator;
use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tracing::{info, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = get_client_ip(&request);
    let request_id = Uuid::new_v4().to_string();

    let span = tracing::info_span!("request", request_id = %request_id);

    async move {
        info!(
            target: "image_proxy::middleware",
            method = %method,
            uri = %uri,
            client_ip = %client_ip,
            "Incoming request"
        );

        let mut response = next.run(request).await;

        let status = response.status();
        info!(
            target: "image_proxy::middleware",
            method = %method,
            uri = %uri,
            status = %status,
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

fn get_client_ip(request: &Request) -> String {
    if let Some(ip) = KeyGenerator::extract_forwarded_ip(request.headers()) {
        return ip;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .or_else(|| request.extensions().get::<SocketAddr>().copied());

    KeyGenerator::client_identity(request.headers(), peer, false)
}
