//! Error handling for the catalog service
//!
//! The store reports [`RepositoryError`] and the image generation client
//! reports [`IdenticonError`]. The web layer maps both onto HTTP responses
//! in `web::responses`.

pub mod types;

pub use types::*;

/// Result type for store operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result type for identicon generation
pub type IdenticonResult<T> = Result<T, IdenticonError>;
