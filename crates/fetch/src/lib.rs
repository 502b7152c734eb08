pub mod fetcher;
pub mod placeholder;

pub use fetcher::{FetchError, FetchOutcome, Fetcher};
pub use placeholder::placeholder_jpeg;
