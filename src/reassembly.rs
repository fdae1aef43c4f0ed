//! Fragment reassembly.
//!
//! Splice events may be delivered in pieces: an attribute-bearing fragment
//! followed by any number of descriptor fragments, the last one flagged
//! `end`. The accumulator holds the in-progress batch and decides, per
//! fragment, whether the event is complete.
//!
//! A fragment flagged `start` while the accumulator is non-empty means the
//! previous event was never terminated; the caller must flush the old batch
//! first (forced flush) before accumulating the new fragment.

use crate::event::SpliceInput;

/// Accumulator for the fragments of one in-progress event.
#[derive(Debug, Default)]
pub struct Reassembly {
    fragments: Vec<SpliceInput>,
}

impl Reassembly {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no fragment is being held.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Returns true if `input` would force a flush of the current batch.
    pub fn forces_flush(&self, input: &SpliceInput) -> bool {
        input.start && !self.fragments.is_empty()
    }

    /// Appends a fragment and reports whether the event is now complete.
    ///
    /// The event completes when the fragment is flagged `end`, or when a
    /// flagless fragment arrives on an empty accumulator (a self-contained
    /// record).
    pub fn push(&mut self, input: SpliceInput) -> bool {
        let was_empty = self.fragments.is_empty();
        let complete = input.end || (was_empty && !input.start);
        self.fragments.push(input);
        complete
    }

    /// Takes the accumulated batch, leaving the accumulator empty.
    pub fn take(&mut self) -> Vec<SpliceInput> {
        std::mem::take(&mut self.fragments)
    }
}
