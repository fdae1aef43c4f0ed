//! Binary encoding of SCTE-35 sections.
//!
//! Produces the bit-exact on-wire layout mandated by ANSI/SCTE 35 and
//! ISO/IEC 13818-1: a typed bit writer, the splice command encoders, and
//! the section framing with length fixup and CRC stamping.

/// Error types for encoding operations.
pub mod error;

/// Section framing and splice command encoders.
pub mod section;

/// Trait definitions for encodable types.
pub mod traits;

/// Bit-level writer for encoding binary data.
pub mod writer;

pub use error::{EncodingError, EncodingResult};
pub use section::{
    BreakDuration, InsertCommand, SpliceCommand, SpliceSection, SpliceTime, TimeSignalCommand,
    PSI_CRC_SIZE, PSI_HEADER_SIZE, PSI_MAX_SIZE, TABLE_ID,
};
pub use traits::Encodable;
pub use writer::BitWriter;
