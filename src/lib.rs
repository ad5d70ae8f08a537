//! OGC security proxy.
//!
//! Sits in front of WMS, WFS and CSW services, decides every call against
//! the access rules published by the catalogue, restricts responses to the
//! permitted area, hides origin URLs and logs each decision.

pub mod admin;
pub mod audit;
pub mod catalogue;
pub mod config;
pub mod geometry;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod ogc;
pub mod policy;
pub mod proxy;
pub mod resilience;
pub mod response;
pub mod spatial;
pub mod upstream;

pub use config::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::ProxyOrchestrator;
