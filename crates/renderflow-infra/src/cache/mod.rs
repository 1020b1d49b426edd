//! Cache storage backends.

pub mod fs;

pub use fs::FsCacheBackend;
