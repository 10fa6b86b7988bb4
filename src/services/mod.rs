//! Typed wrappers over the REST endpoints. No business rules live here: each method maps
//! to one call through the shared [`RequestPipeline`](crate::pipeline::RequestPipeline).

mod auth;
mod products;

pub use auth::AuthService;
pub use products::ProductService;
