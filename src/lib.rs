#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

pub mod ceiling;
pub mod config;
pub mod domain;
pub mod error;
pub mod growth;
pub mod http;
pub mod metrics;
pub mod pass;
pub mod region;
pub mod sampler;
pub mod service;
pub mod session;
pub mod validation;

pub use config::EngineConfig;
pub use domain::{AppState, RunController, RunStatus, SessionEvent, StartRequest};
pub use error::EngineError;
pub use http::serve;
pub use http::{healthz, scrape_metrics, start, status, stop};
pub use metrics::Metrics;
pub use service::SpeedTestRunner;
pub use session::{InterruptAction, Session, SessionConfig, SessionControl};
pub use validation::validate_start;
