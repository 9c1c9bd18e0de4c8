//! Endpoint connection management

mod endpoint;
mod manager;

pub use endpoint::Endpoint;
pub use manager::EndpointConnectionManager;
