//!
//! pantry-client
//! -------------
//! Async client for the SmartPantry inventory REST API. The interesting part is the
//! authenticated request pipeline in [`pipeline`]: every call gets the current bearer
//! credential attached, a 401 triggers one shared credential refresh no matter how many
//! requests hit it at once, and failures come back as a stable [`error::NormalizedError`].
//!
//! ```ignore
//! let session = Arc::new(SessionStore::new(Arc::new(MemoryStorage::default()), Arc::new(SystemClock)));
//! let pipeline = RequestPipeline::builder()
//!     .transport(Arc::new(ReqwestTransport::new(&cfg)?))
//!     .session(session.clone())
//!     .build()?;
//! let auth = AuthService::new(pipeline.clone());
//! auth.login(&LoginRequest { username: "alice".into(), password: "secret".into() }).await?;
//! let products = ProductService::new(pipeline).get_products().await?;
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod pipeline;
pub mod services;

pub use config::ClientConfig;
pub use error::{ErrorKind, Failure, NormalizedError, TransportError};
pub use pipeline::{ApiRequest, ApiResponse, PipelineBuilder, RequestPipeline};
pub use services::{AuthService, ProductService};
pub use session::{Credential, Identity, SessionStore};

// Test-only printing helper: expands to eprintln! during tests and debug builds and is absent otherwise.
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}
