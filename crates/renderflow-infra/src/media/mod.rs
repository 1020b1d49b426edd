//! Media service implementations.

pub mod http;

pub use http::{HttpMediaService, MediaEndpoints};
