#![allow(unreachable_pub)]

mod error;
mod method;
mod request;
mod response;

pub use error::ErrorKind;
pub use method::Method;
pub use request::LogicalRequest;
pub use response::{BatchResponse, Outcome, PartialFailure, Payload};

/// The fastbio `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
