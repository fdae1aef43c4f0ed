//! Byte-block allocation boundary.
//!
//! Section payloads live in [`Block`]s handed out by a [`BufferProvider`].
//! Every block is exclusively owned; duplication for emission goes back
//! through the provider's accounting so a test harness can verify that no
//! block outlives the generator. [`HeapProvider`] is the default
//! implementation and can be capacity-limited to exercise allocation
//! failure paths.

use std::error::Error;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Error returned when a block allocation or duplication fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocError {
    /// Requested capacity in bytes.
    pub requested: usize,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block allocation of {} bytes failed", self.requested)
    }
}

impl Error for AllocError {}

/// Shared accounting for blocks handed out by one provider.
#[derive(Debug)]
struct Ledger {
    outstanding: AtomicUsize,
    limit: Option<usize>,
}

impl Ledger {
    fn charge(&self, requested: usize) -> Result<(), AllocError> {
        let mut current = self.outstanding.load(Ordering::Acquire);
        loop {
            if let Some(limit) = self.limit {
                if current >= limit {
                    return Err(AllocError { requested });
                }
            }
            match self.outstanding.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    fn release(&self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An exclusively owned byte block.
///
/// Dereferences to its payload bytes. Dropping the block releases its
/// ledger charge.
#[derive(Debug)]
pub struct Block {
    data: Vec<u8>,
    ledger: Arc<Ledger>,
}

impl Block {
    /// Mutable access to the underlying buffer, for the section encoder.
    pub(crate) fn buf_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Duplicates this block, charging the duplicate to the same ledger.
    pub fn duplicate(&self) -> Result<Block, AllocError> {
        self.ledger.charge(self.data.len())?;
        Ok(Block {
            data: self.data.clone(),
            ledger: Arc::clone(&self.ledger),
        })
    }
}

impl Deref for Block {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        self.ledger.release();
    }
}

/// Allocates byte blocks for section synthesis.
pub trait BufferProvider {
    /// Allocates an empty block able to hold at least `capacity` bytes.
    fn alloc(&self, capacity: usize) -> Result<Block, AllocError>;
}

/// Heap-backed provider with drop-accounting.
#[derive(Debug, Clone)]
pub struct HeapProvider {
    ledger: Arc<Ledger>,
}

impl HeapProvider {
    /// Creates an unbounded provider.
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(Ledger {
                outstanding: AtomicUsize::new(0),
                limit: None,
            }),
        }
    }

    /// Creates a provider that fails once `limit` blocks are outstanding.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            ledger: Arc::new(Ledger {
                outstanding: AtomicUsize::new(0),
                limit: Some(limit),
            }),
        }
    }

    /// Number of blocks currently alive from this provider.
    pub fn outstanding(&self) -> usize {
        self.ledger.outstanding.load(Ordering::Acquire)
    }
}

impl Default for HeapProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferProvider for HeapProvider {
    fn alloc(&self, capacity: usize) -> Result<Block, AllocError> {
        self.ledger.charge(capacity)?;
        Ok(Block {
            data: Vec::with_capacity(capacity),
            ledger: Arc::clone(&self.ledger),
        })
    }
}
