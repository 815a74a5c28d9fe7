//! HTTP layer module
//!
//! Form body decoding and the response envelope the host reads back.

pub mod form;
pub mod response;

// Re-export commonly used items
pub use response::{body_output, output, redirect_output, Envelope};
