mod contest;
mod entropy;
mod error;
mod frame_buffer;
mod mint;
mod outcard;
mod pagination;
mod score;

pub mod model;
pub mod util;

pub use contest::*;
pub use entropy::*;
pub use error::DomainError;
pub use frame_buffer::*;
pub use mint::*;
pub use model::*;
pub use outcard::*;
pub use pagination::*;
pub use score::*;

/// Seconds since the Unix epoch, as used by rule windows and backend timestamps.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
