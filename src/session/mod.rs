//! Durable session state for the client: credential, identity, expiry.
//! Pure local logic; nothing in here talks to the network.

pub mod clock;
pub mod credential;
mod identity;
pub mod storage;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credential::{decode_claims, is_expired, Credential, TokenClaims, TokenError};
pub use identity::Identity;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use store::{SessionStore, TOKEN_KEY, USER_KEY};
