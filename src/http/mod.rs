//! HTTP/1.x request framing.
//!
//! The proxy never interprets requests beyond finding where one ends: the
//! framer locates the header terminator and the declared body length, and the
//! framed bytes are forwarded untouched.

pub mod framing;

pub use framing::{Framing, FramingError, FramingLimits, RequestFrame, RequestFramer};
