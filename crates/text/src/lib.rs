//! Sentence splitting
//!
//! Turns one `speak` input into the ordered sentence list a session plays
//! through. Splitting is a deterministic total function: the same input
//! always yields the same output, and empty input yields an empty list.

mod splitter;

pub use splitter::{split_sentences, SplitStrategy};
