//! Message definitions shared by the producer and consumer sides.
//!
//! - `headers`: the string-keyed metadata carried next to every record;
//!   retry and delay bookkeeping lives here, not in the body.
//! - `payload`: the JSON body describing the task to run.

pub mod headers;
pub mod payload;

pub use headers::Headers;
pub use payload::Payload;
