//! Request orchestration: one image request from query parameters to bytes.
//!
//! A request moves strictly forward through [`Stage`]s. The first failure
//! stops it, carrying exactly one [`Error`] kind; the orchestrator only ever
//! matches on that kind.

use crate::config::{Config, ImageConfig};
use crate::error::{Error, ErrorKind};
use crate::fetch::{FetchError, OriginFetcher};
use crate::imaging::{encode, EncodeOptions, Pipeline, RasterBuffer};
use crate::params::Params;
use crate::response::{redirect_response, ImageResponse};
use crate::throttler::Throttler;
use crate::uri::{parse_error_redirect, parse_url};
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Admitting,
    Fetching,
    Decoding,
    Transforming,
    Encoding,
    Responding,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Admitting => "admitting",
            Stage::Fetching => "fetching",
            Stage::Decoding => "decoding",
            Stage::Transforming => "transforming",
            Stage::Encoding => "encoding",
            Stage::Responding => "responding",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a request, with the stage it happened in.
#[derive(Debug)]
pub struct Failure {
    pub stage: Stage,
    pub error: Error,
}

impl Failure {
    fn at(stage: Stage) -> impl FnOnce(Error) -> Failure {
        move |error| Failure { stage, error }
    }
}

/// Final answer for one request plus the kind it failed with, if any.
pub struct Outcome {
    pub response: Response,
    pub failure: Option<ErrorKind>,
}

pub struct ImageApi {
    fetcher: OriginFetcher,
    throttler: Option<Arc<Throttler>>,
    pipeline: Pipeline,
    image: ImageConfig,
}

impl ImageApi {
    pub fn new(config: &Config, throttler: Option<Arc<Throttler>>) -> Result<Self, FetchError> {
        Ok(Self {
            fetcher: OriginFetcher::new(config.client.clone())?,
            throttler,
            pipeline: Pipeline::standard(&config.image),
            image: config.image.clone(),
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn throttler(&self) -> Option<&Arc<Throttler>> {
        self.throttler.as_ref()
    }

    /// Run a request and render its response, honouring `errorredirect`
    /// for origin failures.
    pub async fn handle(&self, params: &Params, identity: &str) -> Outcome {
        match self.process(params, identity).await {
            Ok(image) => Outcome {
                response: image.into_response(),
                failure: None,
            },
            Err(failure) => {
                let kind = failure.error.kind();
                log_failure(&failure, params.get("url"), identity);
                Outcome {
                    response: self.failure_response(failure.error, params),
                    failure: Some(kind),
                }
            }
        }
    }

    fn failure_response(&self, error: Error, params: &Params) -> Response {
        if error.allows_error_redirect() {
            if let Some(raw) = params.get("errorredirect") {
                match parse_error_redirect(raw) {
                    Ok(target) => {
                        debug!(target = %target, "Redirecting origin failure");
                        return redirect_response(&target);
                    }
                    Err(e) => debug!(error = %e, "Unusable errorredirect, sending error body"),
                }
            }
        }
        error.into_response()
    }

    pub async fn process(&self, params: &Params, identity: &str) -> Result<ImageResponse, Failure> {
        let raw_url = params
            .get("url")
            .filter(|raw| !raw.trim().is_empty())
            .ok_or(Error::InvalidUrl)
            .map_err(Failure::at(Stage::Validating))?;
        let url = parse_url(raw_url).map_err(Failure::at(Stage::Validating))?;

        if let Some(throttler) = &self.throttler {
            if !throttler.admit(identity).await.is_allowed() {
                return Err(Failure::at(Stage::Admitting)(Error::RateExceeded));
            }
        }

        let fetched = self
            .fetcher
            .fetch(&url)
            .await
            .map_err(|e| Failure::at(Stage::Fetching)(e.into()))?;
        debug!(url = %fetched.url, size = fetched.size, mime = ?fetched.mime, "Fetched origin image");

        let bytes = tokio::fs::read(fetched.path())
            .await
            .map_err(|e| Failure::at(Stage::Decoding)(Error::unknown(e.to_string(), "std::io::Error")))?;
        // The temporary file goes away here, before any pixel work
        drop(fetched);

        let image = self.transform(bytes, params.clone()).await?;

        debug!(stage = %Stage::Responding, bytes = image.bytes.len(), "Image ready");
        Ok(image)
    }

    /// Decode, run the pipeline and encode on the blocking pool, bounded by
    /// the transform timeout.
    async fn transform(&self, bytes: Vec<u8>, params: Params) -> Result<ImageResponse, Failure> {
        let pipeline = self.pipeline.clone();
        let config = self.image.clone();
        let timeout = config.transform_timeout;

        let task = tokio::task::spawn_blocking(move || render(&bytes, &params, &pipeline, &config));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(Failure::at(Stage::Transforming)(Error::unknown(
                join_error.to_string(),
                "tokio::task::JoinError",
            ))),
            // The blocking thread runs to completion but its result is dropped
            Err(_) => Err(Failure::at(Stage::Transforming)(Error::Transform(format!(
                "transform did not finish within {:?}",
                timeout
            )))),
        }
    }
}

fn render(
    bytes: &[u8],
    params: &Params,
    pipeline: &Pipeline,
    config: &ImageConfig,
) -> Result<ImageResponse, Failure> {
    let mut raster =
        RasterBuffer::decode(bytes, params.page(), config).map_err(Failure::at(Stage::Decoding))?;

    pipeline
        .run(&mut raster, params)
        .map_err(Failure::at(Stage::Transforming))?;

    let options = EncodeOptions::from_params(params, &raster, config.default_quality);
    let bytes = encode::encode(&raster, &options).map_err(Failure::at(Stage::Encoding))?;

    Ok(ImageResponse {
        bytes,
        options,
        filename: params.filename().to_string(),
    })
}

fn log_failure(failure: &Failure, url: Option<&str>, identity: &str) {
    let Failure { stage, error } = failure;
    let url = url.unwrap_or_default();

    match error.kind() {
        ErrorKind::Unknown => {
            let source_type = match error {
                Error::Unknown { source_type, .. } => *source_type,
                _ => "unknown",
            };
            error!(stage = %stage, url = %url, error = %error, source_type, "Unhandled failure");
        }
        ErrorKind::Transform => {
            warn!(stage = %stage, url = %url, error = %error, "Transform failed");
        }
        ErrorKind::InvalidImage | ErrorKind::ImageTooBig => {
            warn!(stage = %stage, url = %url, error = %error, "Rejected origin image");
        }
        ErrorKind::ImageTooLarge | ErrorKind::ImageNotReadable => {
            info!(stage = %stage, url = %url, error = %error, "Image could not be processed");
        }
        ErrorKind::Dns | ErrorKind::Origin => {
            info!(stage = %stage, url = %url, error = %error, "Origin unavailable");
        }
        ErrorKind::RateExceeded => {
            info!(identity = %identity, "Request throttled");
        }
        ErrorKind::InvalidUrl | ErrorKind::InvalidRedirectUrl => {
            debug!(url = %url, error = %error, "Invalid request url");
        }
    }
}
