use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use image_proxy::{
    build_state,
    config::{Config, StoreDriver, ThrottlerConfig},
    create_app,
};
use std::io::Cursor;
use std::net::SocketAddr;
use tower::ServiceExt;

/// Red top third, green middle, blue bottom third.
fn banded(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, y| match y * 3 / height {
        0 => Rgb([255, 0, 0]),
        1 => Rgb([0, 255, 0]),
        _ => Rgb([0, 0, 255]),
    }))
}

fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Local origin serving fixtures on an ephemeral port.
async fn spawn_origin() -> SocketAddr {
    let landscape = png_bytes(&banded(1000, 600));
    let portrait = png_bytes(&banded(600, 1000));

    let app = Router::new()
        .route(
            "/landscape.png",
            get(move || {
                let bytes = landscape.clone();
                async move { ([(header::CONTENT_TYPE, "image/png")], bytes) }
            }),
        )
        .route(
            "/portrait.png",
            get(move || {
                let bytes = portrait.clone();
                async move { ([(header::CONTENT_TYPE, "image/png")], bytes) }
            }),
        )
        .route("/text", get(|| async { "definitely not an image" }))
        .route("/missing.png", get(|| async { StatusCode::NOT_FOUND }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn app_with(config: Config) -> Router {
    create_app(build_state(config).unwrap())
}

async fn get_from(app: &Router, uri: &str, peer: Option<SocketAddr>) -> Response {
    let mut request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    if let Some(peer) = peer {
        request.extensions_mut().insert(ConnectInfo(peer));
    }
    app.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn decoded(response: Response) -> DynamicImage {
    image::load_from_memory(&body_bytes(response).await).unwrap()
}

fn throttled_config(allowed_requests: u64, whitelist: Vec<String>) -> Config {
    Config {
        throttler: Some(ThrottlerConfig {
            driver: StoreDriver::Memory,
            allowed_requests,
            whitelist,
            ..ThrottlerConfig::default()
        }),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_square_top_crop() {
    let origin = spawn_origin().await;
    let app = app_with(Config::default());

    let uri = format!("/?url={}/portrait.png&w=300&h=300&t=square&a=top", origin);
    let response = get_from(&app, &uri, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "max-age=31536000");
    let image = decoded(response).await.to_rgb8();
    assert_eq!(image.dimensions(), (300, 300));
    // 300x500 after the resize; the top window shows red then green, never blue
    let top = image.get_pixel(150, 10).0;
    assert!(top[0] > 240 && top[1] < 15 && top[2] < 15, "{:?}", top);
    let bottom = image.get_pixel(150, 290).0;
    assert!(bottom[1] > 240 && bottom[2] < 15, "{:?}", bottom);
}

#[tokio::test]
async fn test_focal_crop_differs_from_centre() {
    let origin = spawn_origin().await;
    let app = app_with(Config::default());

    let focal = format!("/?url={}/portrait.png&w=300&h=300&t=square&a=crop-0-20", origin);
    let centre = format!("/?url={}/portrait.png&w=300&h=300&t=square", origin);
    let focal = decoded(get_from(&app, &focal, None).await).await;
    let centre = decoded(get_from(&app, &centre, None).await).await;

    assert_eq!((focal.width(), focal.height()), (300, 300));
    assert_ne!(focal.to_rgb8(), centre.to_rgb8());
    // The focal window starts at the red top band
    assert!(focal.to_rgb8().get_pixel(150, 10)[0] > 200);
}

#[tokio::test]
async fn test_no_op_params_keep_pixels() {
    let origin = spawn_origin().await;
    let app = app_with(Config::default());

    let response = get_from(&app, &format!("/?url={}/landscape.png", origin), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let image = decoded(response).await;
    assert_eq!(image.to_rgb8(), banded(1000, 600).to_rgb8());
}

#[tokio::test]
async fn test_output_format_and_filename() {
    let origin = spawn_origin().await;
    let app = app_with(Config::default());

    let uri = format!("/?url={}/landscape.png&w=100&output=jpg&q=60&filename=banner", origin);
    let response = get_from(&app, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "inline; filename=banner.jpg"
    );
    let image = decoded(response).await;
    assert_eq!((image.width(), image.height()), (100, 60));
}

#[tokio::test]
async fn test_base64_encoding() {
    let origin = spawn_origin().await;
    let app = app_with(Config::default());

    let uri = format!("/?url={}/landscape.png&w=50&encoding=base64", origin);
    let response = get_from(&app, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_missing_url() {
    let app = app_with(Config::default());
    let response = get_from(&app, "/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("because it isn't a valid url"));
}

#[tokio::test]
async fn test_origin_not_found() {
    let origin = spawn_origin().await;
    let app = app_with(Config::default());

    let response = get_from(&app, &format!("/?url={}/missing.png", origin), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("The requested URL returned error: 404 Not Found"));
}

#[tokio::test]
async fn test_origin_error_redirects_without_nested_redirect() {
    let origin = spawn_origin().await;
    let app = app_with(Config::default());

    let uri = format!(
        "/?url={}/missing.png&errorredirect=example.com%2Ffallback.png%3Ferrorredirect%3Dloop",
        origin
    );
    let response = get_from(&app, &uri, None).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "http://example.com/fallback.png"
    );
}

#[tokio::test]
async fn test_dns_failure_never_redirects() {
    let app = app_with(Config::default());

    let uri = "/?url=image-proxy-test.invalid/a.jpg&errorredirect=example.com%2Ffallback.png";
    let response = get_from(&app, uri, None).await;
    assert_eq!(response.status(), StatusCode::GONE);
    assert!(response.headers().get(header::LOCATION).is_none());
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.starts_with("Error 410"));
}

#[tokio::test]
async fn test_non_image_body_is_invalid_image() {
    let origin = spawn_origin().await;
    let app = app_with(Config::default());

    let response = get_from(&app, &format!("/?url={}/text", origin), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_size_ceiling() {
    let origin = spawn_origin().await;
    let mut config = Config::default();
    config.client.max_image_size = 1024;
    let app = app_with(config);

    let response = get_from(&app, &format!("/?url={}/landscape.png", origin), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.starts_with("The image is too big to be downloaded."));
    assert!(body.contains("Max image size: 1 KB"));
}

#[tokio::test]
async fn test_throttle_rejects_request_over_limit() {
    let origin = spawn_origin().await;
    let app = app_with(throttled_config(2, Vec::new()));
    let peer = SocketAddr::from(([203, 0, 113, 5], 50000));
    let uri = format!("/?url={}/landscape.png&w=10", origin);

    for _ in 0..2 {
        let response = get_from(&app, &uri, Some(peer)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = get_from(&app, &uri, Some(peer)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Another client is unaffected
    let other = SocketAddr::from(([203, 0, 113, 6], 50000));
    let response = get_from(&app, &uri, Some(other)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_whitelisted_client_never_throttled() {
    let origin = spawn_origin().await;
    let app = app_with(throttled_config(1, vec!["198.51.100.7".to_string()]));
    let peer = SocketAddr::from(([198, 51, 100, 7], 41000));
    let uri = format!("/?url={}/landscape.png&w=10", origin);

    for _ in 0..5 {
        let response = get_from(&app, &uri, Some(peer)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = app_with(throttled_config(10, Vec::new()));
    let response = get_from(&app, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dependencies"]["throttle_store"]["backend"], "memory");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = app_with(Config::default());
    get_from(&app, "/", None).await;

    let response = get_from(&app, "/metrics", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["total_requests"], 1);
    assert_eq!(body["failures"]["invalid_url"], 1);
}
