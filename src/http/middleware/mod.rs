// HTTP middleware
pub mod client_ip;
pub mod cors;
pub mod rate_limit;

pub use client_ip::*;
pub use cors::*;
pub use rate_limit::*;
