//! HTTP surface: the submit endpoint, health probe and edge limits.

pub mod rate_limit;
pub mod routes;

pub use rate_limit::ClientRateLimiter;
pub use routes::{
    AppState, ResponseStatus, SubmissionResponse, WebSettings, client_addr, forwarded_ip,
    relay_routes,
};
