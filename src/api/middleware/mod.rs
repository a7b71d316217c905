//! HTTP middleware

pub mod correlation;

pub use correlation::{correlation_middleware, CorrelationId, CORRELATION_ID_HEADER};
