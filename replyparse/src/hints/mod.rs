//! Persistent, self-scoring format hints.
//!
//! A [`FormatHint`] remembers where the answer text lives for one provider
//! (optionally one model). The [`FormatHintStore`] hands out the best active
//! hint and keeps the success/failure counters that decide retirement.
//! Storage itself sits behind [`HintBackend`], so the substrate can be an
//! in-memory map, a JSON file, or anything the host application provides.

mod backend;
mod hint;
mod store;

pub use backend::{HintBackend, JsonFileBackend, MemoryBackend};
pub use hint::{FormatHint, HintKey, NEUTRAL_RELIABILITY, RETIRE_FAILURE_THRESHOLD, RETIRE_RELIABILITY};
pub use store::FormatHintStore;
