use crate::error::{Error, ErrorResponse};
use crate::imaging::encode::{to_data_url, EncodeOptions};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::Url;

/// Edge caches keep transformed images for a year.
pub const CACHE_CONTROL_VALUE: &str = "max-age=31536000";

/// A successfully encoded image, ready to be written to the client.
#[derive(Debug)]
pub struct ImageResponse {
    pub bytes: Vec<u8>,
    pub options: EncodeOptions,
    pub filename: String,
}

impl ImageResponse {
    pub fn content_disposition(&self) -> String {
        format!(
            "inline; filename={}.{}",
            self.filename,
            self.options.format.extension()
        )
    }
}

impl IntoResponse for ImageResponse {
    fn into_response(self) -> Response {
        let disposition = self.content_disposition();
        let (content_type, body) = if self.options.base64 {
            (
                "text/plain",
                to_data_url(&self.bytes, self.options.format).into_bytes(),
            )
        } else {
            (self.options.format.mime_type(), self.bytes)
        };

        let mut response = (StatusCode::OK, body).into_response();
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_VALUE));
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(CONTENT_DISPOSITION, value);
        }
        response
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_error(&self);
        let content_type = format!("{}; charset=utf-8", body.content_type);

        let mut response = (self.status(), body.message).into_response();
        if let Ok(value) = HeaderValue::from_str(&content_type) {
            response.headers_mut().insert(CONTENT_TYPE, value);
        }
        response
    }
}

/// `302 Found` to a sanitised `errorredirect` target.
pub fn redirect_response(target: &Url) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    if let Ok(value) = HeaderValue::from_str(target.as_str()) {
        response.headers_mut().insert(LOCATION, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::OutputFormat;

    fn options(base64: bool) -> EncodeOptions {
        EncodeOptions {
            format: OutputFormat::Png,
            quality: 85,
            interlace: false,
            base64,
        }
    }

    #[test]
    fn test_image_headers() {
        let response = ImageResponse {
            bytes: vec![1, 2, 3],
            options: options(false),
            filename: "cat".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[CONTENT_TYPE], "image/png");
        assert_eq!(headers[CACHE_CONTROL], CACHE_CONTROL_VALUE);
        assert_eq!(headers[CONTENT_DISPOSITION], "inline; filename=cat.png");
    }

    #[test]
    fn test_base64_is_plain_text() {
        let response = ImageResponse {
            bytes: vec![1, 2, 3],
            options: options(true),
            filename: "image".to_string(),
        }
        .into_response();
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_error_status_and_type() {
        let response = Error::Dns("nxdomain".into()).into_response();
        assert_eq!(response.status(), StatusCode::GONE);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");

        let response = Error::Origin {
            status: Some(500),
            reason: "Internal Server Error".into(),
        }
        .into_response();
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
    }

    #[test]
    fn test_redirect() {
        let target = Url::parse("http://example.com/fallback.png").unwrap();
        let response = redirect_response(&target);
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "http://example.com/fallback.png");
    }
}
