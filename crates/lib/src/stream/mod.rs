//! Hot multicast subjects and the reactive operator set.
//!
//! Every hot stream in the crate is an unbounded FIFO channel: the producer pushes
//! without blocking, the async consumer suspends on empty and resumes on push or
//! close. "Convert to an async sequence" is therefore the identity — the streams
//! handed out by models, collections, and subjects already are async sequences.

pub mod errors;
mod ops;
mod subject;
#[cfg(test)]
mod tests;

pub use errors::StreamError;
pub use ops::{combine_latest, dedupe, first_value, first_value_or_cancel, interval};
pub use subject::{BehaviorSubject, Subject, Terminal};
