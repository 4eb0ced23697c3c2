pub mod access_key;
pub mod metrics;

pub use access_key::AccessKey;
pub use metrics::MetricsMiddleware;
