pub mod client;
pub mod error;
pub mod types;

use std::future::Future;
use std::path::Path;

pub use client::HttpCollector;
pub use error::DeliveryError;

/// Pushes a saved result record to a remote collector.
pub trait Deliver {
    /// Deliver the record at `path`, returning the collector's confirmation.
    fn deliver(&self, path: &Path) -> impl Future<Output = Result<String, DeliveryError>> + Send;
}
