pub mod api;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod fetch;
pub mod firewall;
pub mod handlers;
pub mod health;
pub mod imaging;
pub mod key_generator;
pub mod metrics;
pub mod middleware;
pub mod params;
pub mod response;
pub mod server;
pub mod store;
pub mod throttler;
pub mod uri;

pub use config::Config;
pub use error::{Error, Result};
pub use response::ImageResponse;
pub use server::{build_state, create_app};
