//! Section framing and splice command encoders.
//!
//! Builds complete splice information sections: the fixed PSI header, one
//! splice command, the descriptor loop, and the trailing CRC-32. All sizes
//! are computed before writing, so the 12-bit `section_length` and
//! `splice_command_length` fields are exact on the first pass; after the
//! command body is written the cursor is checked against the computed size.

use crate::event::DescriptorFragment;

use super::error::{EncodingError, EncodingResult};
use super::traits::Encodable;
use super::writer::BitWriter;

/// Maximum value of the 12-bit section_length field for PSI tables.
pub const PSI_MAX_SIZE: usize = 1021;

/// Bytes preceding the section_length field.
pub const PSI_HEADER_SIZE: usize = 3;

/// Size of the trailing CRC-32 field.
pub const PSI_CRC_SIZE: usize = 4;

/// Table identifier of SCTE-35 sections.
pub const TABLE_ID: u8 = 0xFC;

/// Fixed bytes from table_id through splice_command_type.
const SECTION_FIXED_SIZE: usize = 14;

/// A splice_time() structure.
///
/// Carries an optional 33-bit 90 kHz PTS; absence means the time is not
/// specified (the immediate form).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceTime {
    /// PTS in 90 kHz ticks, already wrapped modulo 2^33.
    pub pts_time: Option<u64>,
}

impl Encodable for SpliceTime {
    fn encode(&self, writer: &mut BitWriter<'_>) -> EncodingResult<()> {
        match self.pts_time {
            Some(pts_time) => {
                // time_specified_flag (1 bit)
                writer.write_bit(true)?;
                // reserved (6 bits), all ones
                writer.write_bits(0x3F, 6)?;
                // pts_time (33 bits)
                writer.write_bits(pts_time & 0x1_FFFF_FFFF, 33)?;
            }
            None => {
                writer.write_bit(false)?;
                // reserved (7 bits), all ones
                writer.write_bits(0x7F, 7)?;
            }
        }
        Ok(())
    }

    fn encoded_size(&self) -> usize {
        if self.pts_time.is_some() {
            5
        } else {
            1
        }
    }
}

/// A break_duration() structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakDuration {
    /// Return to the network automatically when the duration elapses.
    pub auto_return: bool,
    /// Duration in 90 kHz ticks, already wrapped modulo 2^33.
    pub duration: u64,
}

impl Encodable for BreakDuration {
    fn encode(&self, writer: &mut BitWriter<'_>) -> EncodingResult<()> {
        // auto_return (1 bit)
        writer.write_bit(self.auto_return)?;
        // reserved (6 bits), all ones
        writer.write_bits(0x3F, 6)?;
        // duration (33 bits)
        writer.write_bits(self.duration & 0x1_FFFF_FFFF, 33)?;
        Ok(())
    }

    fn encoded_size(&self) -> usize {
        5
    }
}

/// A splice_insert command body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertCommand {
    /// Splice event identifier.
    pub event_id: u32,
    /// Event cancellation indicator.
    pub cancel: bool,
    /// Out-of-network indicator.
    pub out_of_network: bool,
    /// Splice point PTS; absent encodes splice_immediate_flag = 1.
    pub pts_time: Option<u64>,
    /// Break duration, when the event carries one.
    pub break_duration: Option<BreakDuration>,
    /// Unique program identifier.
    pub unique_program_id: u16,
}

impl Encodable for InsertCommand {
    fn encode(&self, writer: &mut BitWriter<'_>) -> EncodingResult<()> {
        // splice_event_id (32 bits)
        writer.write_bits(self.event_id as u64, 32)?;
        // splice_event_cancel_indicator (1 bit), reserved (7 bits)
        writer.write_bit(self.cancel)?;
        writer.write_bits(0x7F, 7)?;

        if self.cancel {
            return Ok(());
        }

        // out_of_network_indicator (1 bit)
        writer.write_bit(self.out_of_network)?;
        // program_splice_flag (1 bit), always program-level splicing
        writer.write_bit(true)?;
        // duration_flag (1 bit)
        writer.write_bit(self.break_duration.is_some())?;
        // splice_immediate_flag (1 bit)
        writer.write_bit(self.pts_time.is_none())?;
        // reserved (4 bits), all ones
        writer.write_bits(0x0F, 4)?;

        if self.pts_time.is_some() {
            SpliceTime {
                pts_time: self.pts_time,
            }
            .encode(writer)?;
        }

        if let Some(break_duration) = self.break_duration {
            break_duration.encode(writer)?;
        }

        // unique_program_id (16 bits)
        writer.write_bits(self.unique_program_id as u64, 16)?;
        // avail_num (8 bits), avails_expected (8 bits)
        writer.write_bits(0, 8)?;
        writer.write_bits(0, 8)?;

        Ok(())
    }

    fn encoded_size(&self) -> usize {
        let mut size = 5; // splice_event_id + cancel/reserved byte
        if !self.cancel {
            size += 1; // flags byte
            if self.pts_time.is_some() {
                size += 5;
            }
            if self.break_duration.is_some() {
                size += 5;
            }
            size += 4; // unique_program_id + avail_num + avails_expected
        }
        size
    }
}

/// A time_signal command body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignalCommand {
    /// Signalled PTS; absent encodes time_specified_flag = 0.
    pub pts_time: Option<u64>,
}

impl Encodable for TimeSignalCommand {
    fn encode(&self, writer: &mut BitWriter<'_>) -> EncodingResult<()> {
        SpliceTime {
            pts_time: self.pts_time,
        }
        .encode(writer)
    }

    fn encoded_size(&self) -> usize {
        SpliceTime {
            pts_time: self.pts_time,
        }
        .encoded_size()
    }
}

/// The splice commands this generator synthesizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceCommand {
    /// splice_null, empty body.
    Null,
    /// splice_insert.
    Insert(InsertCommand),
    /// time_signal.
    TimeSignal(TimeSignalCommand),
}

impl SpliceCommand {
    /// Wire value of splice_command_type.
    pub fn command_type(&self) -> u8 {
        match self {
            SpliceCommand::Null => 0x00,
            SpliceCommand::Insert(_) => 0x05,
            SpliceCommand::TimeSignal(_) => 0x06,
        }
    }
}

impl Encodable for SpliceCommand {
    fn encode(&self, writer: &mut BitWriter<'_>) -> EncodingResult<()> {
        match self {
            SpliceCommand::Null => Ok(()),
            SpliceCommand::Insert(insert) => insert.encode(writer),
            SpliceCommand::TimeSignal(signal) => signal.encode(writer),
        }
    }

    fn encoded_size(&self) -> usize {
        match self {
            SpliceCommand::Null => 0,
            SpliceCommand::Insert(insert) => insert.encoded_size(),
            SpliceCommand::TimeSignal(signal) => signal.encoded_size(),
        }
    }
}

/// A complete splice information section ready to encode.
#[derive(Debug)]
pub struct SpliceSection<'a> {
    /// The splice command.
    pub command: SpliceCommand,
    /// Descriptors appended after the command, in order.
    pub descriptors: &'a [DescriptorFragment],
}

impl<'a> SpliceSection<'a> {
    /// Creates a section with no descriptors.
    pub fn new(command: SpliceCommand) -> Self {
        Self {
            command,
            descriptors: &[],
        }
    }

    fn descriptor_loop_length(&self) -> usize {
        self.descriptors.iter().map(|d| d.wire_len()).sum()
    }

    /// Total encoded size in bytes, CRC included.
    pub fn encoded_size(&self) -> usize {
        SECTION_FIXED_SIZE + self.command.encoded_size() + 2 + self.descriptor_loop_length()
            + PSI_CRC_SIZE
    }

    /// Encodes the section into `buf`, appending the CRC-32.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> EncodingResult<()> {
        let command_size = self.command.encoded_size();
        let descriptor_loop_length = self.descriptor_loop_length();
        let section_length = self.encoded_size() - PSI_HEADER_SIZE;
        if section_length > PSI_MAX_SIZE {
            return Err(EncodingError::SectionOverflow {
                section_length,
                max: PSI_MAX_SIZE,
            });
        }

        let start = buf.len();
        let mut writer = BitWriter::new(buf);
        // table_id (8 bits)
        writer.write_bits(TABLE_ID as u64, 8)?;
        // section_syntax_indicator (1 bit), private_indicator (1 bit)
        writer.write_bit(false)?;
        writer.write_bit(false)?;
        // reserved (2 bits), all ones
        writer.write_bits(0b11, 2)?;
        // section_length (12 bits)
        writer.write_bits(section_length as u64, 12)?;
        // protocol_version (8 bits)
        writer.write_bits(0, 8)?;
        // encrypted_packet (1 bit), encryption_algorithm (6 bits)
        writer.write_bit(false)?;
        writer.write_bits(0, 6)?;
        // pts_adjustment (33 bits), host timestamps are already program-aligned
        writer.write_bits(0, 33)?;
        // cw_index (8 bits)
        writer.write_bits(0, 8)?;
        // tier (12 bits)
        writer.write_bits(0xFFF, 12)?;
        // splice_command_length (12 bits), splice_command_type (8 bits)
        writer.write_bits(command_size as u64, 12)?;
        writer.write_bits(self.command.command_type() as u64, 8)?;

        let before_command = writer.len();
        self.command.encode(&mut writer)?;
        let actual = writer.len() - before_command;
        if actual != command_size {
            return Err(EncodingError::CommandLengthMismatch {
                expected: command_size,
                actual,
            });
        }

        // descriptor_loop_length (16 bits)
        writer.write_bits(descriptor_loop_length as u64, 16)?;
        for descriptor in self.descriptors {
            writer.write_bytes(descriptor.wire())?;
        }
        writer.finish();

        let crc = crate::crc::calculate_crc(&buf[start..]);
        buf.extend_from_slice(&crc.to_be_bytes());
        Ok(())
    }

    /// Encodes the section into a fresh byte vector.
    pub fn to_bytes(&self) -> EncodingResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::validate_section_crc;

    #[test]
    fn test_null_section_bytes() {
        let section = SpliceSection::new(SpliceCommand::Null);
        let bytes = section.to_bytes().unwrap();
        assert_eq!(bytes.len(), 20);
        assert_eq!(
            &bytes[..16],
            &[
                0xFC, 0x30, 0x11, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xF0, 0x00,
                0x00, 0x00, 0x00
            ]
        );
        assert!(validate_section_crc(&bytes));
    }

    #[test]
    fn test_section_length_matches_byte_count() {
        let section = SpliceSection::new(SpliceCommand::Insert(InsertCommand {
            event_id: 7,
            cancel: false,
            out_of_network: true,
            pts_time: Some(30_000),
            break_duration: Some(BreakDuration {
                auto_return: true,
                duration: 9_000,
            }),
            unique_program_id: 1,
        }));
        let bytes = section.to_bytes().unwrap();
        let section_length = (((bytes[1] & 0x0F) as usize) << 8) | bytes[2] as usize;
        assert_eq!(section_length, bytes.len() - PSI_HEADER_SIZE);
        assert!(validate_section_crc(&bytes));
    }

    #[test]
    fn test_insert_command_length_field() {
        let command = InsertCommand {
            event_id: 0x12345678,
            cancel: false,
            out_of_network: true,
            pts_time: None,
            break_duration: None,
            unique_program_id: 0x42,
        };
        let size = command.encoded_size();
        assert_eq!(size, 10);
        let section = SpliceSection::new(SpliceCommand::Insert(command));
        let bytes = section.to_bytes().unwrap();
        let command_length = (((bytes[11] & 0x0F) as usize) << 8) | bytes[12] as usize;
        assert_eq!(command_length, size);
        assert_eq!(bytes[13], 0x05);
        // command body starts with the event id
        assert_eq!(&bytes[14..18], &[0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_cancelled_insert_is_minimal() {
        let command = InsertCommand {
            event_id: 1,
            cancel: true,
            out_of_network: false,
            pts_time: None,
            break_duration: None,
            unique_program_id: 0,
        };
        assert_eq!(command.encoded_size(), 5);
        let bytes = SpliceSection::new(SpliceCommand::Insert(command))
            .to_bytes()
            .unwrap();
        // cancel bit set, 7 reserved ones
        assert_eq!(bytes[18], 0xFF);
        assert!(validate_section_crc(&bytes));
    }

    #[test]
    fn test_time_signal_without_pts_is_one_byte() {
        let command = TimeSignalCommand { pts_time: None };
        assert_eq!(command.encoded_size(), 1);
        let bytes = SpliceSection::new(SpliceCommand::TimeSignal(command))
            .to_bytes()
            .unwrap();
        assert_eq!(bytes[13], 0x06);
        assert_eq!(bytes[14], 0x7F);
    }

    #[test]
    fn test_descriptor_loop_is_appended() {
        let descriptors =
            vec![crate::event::DescriptorFragment::try_from(vec![0x02, 0x02, 0xAA, 0xBB]).unwrap()];
        let section = SpliceSection {
            command: SpliceCommand::TimeSignal(TimeSignalCommand {
                pts_time: Some(300_000),
            }),
            descriptors: &descriptors,
        };
        let bytes = section.to_bytes().unwrap();
        // descriptor_loop_length sits right after the 5-byte splice_time
        let loop_length = ((bytes[19] as usize) << 8) | bytes[20] as usize;
        assert_eq!(loop_length, 4);
        assert_eq!(&bytes[21..25], &[0x02, 0x02, 0xAA, 0xBB]);
        assert!(validate_section_crc(&bytes));
    }

    #[test]
    fn test_oversized_descriptor_loop_overflows() {
        let big = vec![
            crate::event::DescriptorFragment::try_from({
                let mut run = vec![0x02, 0xFF];
                run.extend(std::iter::repeat(0).take(0xFF));
                run
            })
            .unwrap();
            5
        ];
        let section = SpliceSection {
            command: SpliceCommand::Null,
            descriptors: &big,
        };
        assert!(matches!(
            section.encode_into(&mut Vec::new()),
            Err(EncodingError::SectionOverflow { .. })
        ));
    }

    #[test]
    fn test_pts_time_wraps_to_33_bits() {
        let section = SpliceSection::new(SpliceCommand::TimeSignal(TimeSignalCommand {
            pts_time: Some(0x1_FFFF_FFFF),
        }));
        let bytes = section.to_bytes().unwrap();
        // time_specified(1) + reserved(6) + pts bit 32
        assert_eq!(bytes[14], 0xFF);
        assert_eq!(&bytes[15..19], &[0xFF, 0xFF, 0xFF, 0xFF]);
    }
}
