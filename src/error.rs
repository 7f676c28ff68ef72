use axum::http::StatusCode;
use serde::Serialize;
use std::fmt;

/// Client-visible failure taxonomy.
///
/// Every component classifies its own failures into exactly one of these
/// variants before handing them back to the request orchestrator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("invalid url")]
    InvalidUrl,

    #[error("invalid redirect url")]
    InvalidRedirectUrl,

    #[error("{0}")]
    InvalidImage(String),

    #[error("image too big: received {received} bytes, limit {limit} bytes")]
    ImageTooBig { received: u64, limit: u64 },

    #[error("Image is too large for processing. Width x Height should be less than {} megapixels.", .max_pixels / 1_000_000)]
    ImageTooLarge { width: u32, height: u32, max_pixels: u64 },

    #[error("{0}")]
    ImageNotReadable(String),

    #[error("{0}")]
    Transform(String),

    #[error("dns error: {0}")]
    Dns(String),

    #[error("origin error: {}", origin_message(.status, .reason))]
    Origin { status: Option<u16>, reason: String },

    #[error("There are an unusual number of requests coming from this IP address.")]
    RateExceeded,

    #[error("{message}")]
    Unknown { message: String, source_type: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fieldless discriminant of [`Error`], used for metrics labels and templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    InvalidRedirectUrl,
    InvalidImage,
    ImageTooBig,
    ImageTooLarge,
    ImageNotReadable,
    Transform,
    Dns,
    Origin,
    RateExceeded,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::InvalidRedirectUrl => "invalid_redirect_url",
            ErrorKind::InvalidImage => "invalid_image",
            ErrorKind::ImageTooBig => "image_too_big",
            ErrorKind::ImageTooLarge => "image_too_large",
            ErrorKind::ImageNotReadable => "image_not_readable",
            ErrorKind::Transform => "transform_error",
            ErrorKind::Dns => "dns_error",
            ErrorKind::Origin => "origin_error",
            ErrorKind::RateExceeded => "rate_exceeded",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidUrl => ErrorKind::InvalidUrl,
            Error::InvalidRedirectUrl => ErrorKind::InvalidRedirectUrl,
            Error::InvalidImage(_) => ErrorKind::InvalidImage,
            Error::ImageTooBig { .. } => ErrorKind::ImageTooBig,
            Error::ImageTooLarge { .. } => ErrorKind::ImageTooLarge,
            Error::ImageNotReadable(_) => ErrorKind::ImageNotReadable,
            Error::Transform(_) => ErrorKind::Transform,
            Error::Dns(_) => ErrorKind::Dns,
            Error::Origin { .. } => ErrorKind::Origin,
            Error::RateExceeded => ErrorKind::RateExceeded,
            Error::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    pub fn unknown(message: impl Into<String>, source_type: &'static str) -> Self {
        Error::Unknown {
            message: message.into(),
            source_type,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::InvalidUrl | ErrorKind::InvalidRedirectUrl | ErrorKind::Origin => {
                StatusCode::NOT_FOUND
            }
            ErrorKind::InvalidImage
            | ErrorKind::ImageTooBig
            | ErrorKind::ImageTooLarge
            | ErrorKind::ImageNotReadable
            | ErrorKind::Transform => StatusCode::BAD_REQUEST,
            ErrorKind::Dns => StatusCode::GONE,
            ErrorKind::RateExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Only reachable-but-failing origins may be answered with a fallback redirect.
    pub fn allows_error_redirect(&self) -> bool {
        matches!(self, Error::Origin { .. })
    }
}

/// Rendered error body: status, content type and message text.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    pub code: u16,
    pub content_type: &'static str,
}

impl ErrorResponse {
    fn new(kind: ErrorKind, status: StatusCode, content_type: &'static str, message: String) -> Self {
        Self {
            error: kind.as_str(),
            message,
            code: status.as_u16(),
            content_type,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        let status = err.status();
        let status_line = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        );
        let kind = err.kind();

        match err {
            Error::InvalidUrl => Self::new(
                kind,
                status,
                "text/plain",
                "Error 404: Server couldn't parse the ?url= that you were looking for, because it isn't a valid url.".to_string(),
            ),
            Error::InvalidRedirectUrl => Self::new(
                kind,
                status,
                "text/plain",
                "Error 404: Unable to parse the redirection URL.".to_string(),
            ),
            Error::InvalidImage(msg) => Self::new(kind, status, "text/plain", msg.clone()),
            Error::ImageTooBig { received, limit } => Self::new(
                kind,
                status,
                "text/plain",
                format!(
                    "The image is too big to be downloaded.\nImage size {}\nMax image size: {}",
                    format_bytes(*received),
                    format_bytes(*limit)
                ),
            ),
            Error::ImageTooLarge { .. }
            | Error::ImageNotReadable(_)
            | Error::Transform(_)
            | Error::RateExceeded => {
                Self::new(kind, status, "text/plain", format!("{} - {}", status_line, err))
            }
            Error::Dns(_) => Self::new(
                kind,
                status,
                "text/plain",
                "Error 410: Server couldn't parse the ?url= that you were looking for, because the hostname of the origin is unresolvable (DNS) or blocked by policy.".to_string(),
            ),
            Error::Origin { status: origin_status, reason } => Self::new(
                kind,
                status,
                "text/html",
                escape_html(&format!(
                    "Error 404: Server couldn't parse the ?url= that you were looking for, error it got: The requested URL returned error: {}",
                    origin_message(origin_status, reason)
                )),
            ),
            Error::Unknown { .. } => Self::new(
                kind,
                status,
                "text/plain",
                "Something's wrong!\nIt looks as though we've broken something on our system.\nDon't panic, we are fixing it! Please come back in a while.. ".to_string(),
            ),
        }
    }
}

fn origin_message(status: &Option<u16>, reason: &str) -> String {
    match status {
        Some(code) => format!("{} {}", code, reason),
        None => reason.to_string(),
    }
}

/// Formats a byte count with binary units and two decimals, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}
