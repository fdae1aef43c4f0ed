//! Trait definitions for encodable types.

use super::error::EncodingResult;
use super::writer::BitWriter;

/// Types that can encode themselves into the SCTE-35 wire format.
///
/// `encoded_size` must return exactly the number of bytes `encode` will
/// write; the section encoder verifies the two against the writer cursor
/// and fails the encode if they diverge.
pub trait Encodable {
    /// Encodes this structure into the bit writer.
    fn encode(&self, writer: &mut BitWriter<'_>) -> EncodingResult<()>;

    /// Size of the encoded structure in bytes.
    fn encoded_size(&self) -> usize;
}
