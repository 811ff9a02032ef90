//! Generation: the control loop that drives model calls through extraction
//! and self-correction.

mod asserts;
mod controller;
mod options;

pub use asserts::{check_assertions, check_streaming_assertions, Assertion, StreamingAssertion};
pub use controller::Generator;
pub use options::{ForwardOptions, GenOptions, DEFAULT_MAX_RETRIES, DEFAULT_MAX_STEPS};
