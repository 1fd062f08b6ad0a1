//! Common utilities and shared types for courier.
//!
//! This crate provides foundational components used across all courier crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Cryptography**: RSA key parsing for HTTP Signatures
//! - **HTTP Signatures**: Signing of outbound deliveries
//! - **Metrics**: Delivery counters via [`DeliveryMetrics`]
//!
//! # Example
//!
//! ```no_run
//! use courier_common::{Config, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     println!("Running {} delivery workers", config.delivery.workers);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod http_signature;
pub mod metrics;

pub use config::{Config, DeliveryConfig, LogFormat, LoggingConfig};
pub use crypto::{RsaKeypair, generate_rsa_keypair};
pub use error::{AppError, AppResult};
pub use http_signature::{
    HttpSignature, SignedHeaders, build_signature_string, calculate_digest, sign_post,
    sign_request, verify_signature,
};
pub use metrics::{DeliveryMetrics, MetricsSnapshot, Timer, get_metrics};
