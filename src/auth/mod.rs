//! Bearer token verification for the realtime endpoint.

pub mod token;

pub use token::{Claims, JwtVerifier, TokenVerifier};
