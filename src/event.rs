//! Splice event model.
//!
//! Events arrive from the demux side as one or more [`SpliceInput`]
//! fragments: the first fragment carries the event attributes, later
//! fragments carry raw splice descriptors. The reassembly layer collects
//! fragments into a batch, and [`SpliceEvent::assemble`] turns a complete
//! batch into the logical event consumed by the section synthesizer.

use std::error::Error;
use std::fmt;

use tracing::warn;

/// Splice command types supported by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SpliceCommandType {
    /// splice_null (0x00)
    Null,
    /// splice_insert (0x05)
    Insert,
    /// time_signal (0x06)
    TimeSignal,
}

impl SpliceCommandType {
    /// Wire value of the command type.
    pub fn as_u8(self) -> u8 {
        match self {
            SpliceCommandType::Null => 0x00,
            SpliceCommandType::Insert => 0x05,
            SpliceCommandType::TimeSignal => 0x06,
        }
    }
}

impl TryFrom<u8> for SpliceCommandType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x00 => Ok(SpliceCommandType::Null),
            0x05 => Ok(SpliceCommandType::Insert),
            0x06 => Ok(SpliceCommandType::TimeSignal),
            other => Err(other),
        }
    }
}

/// One input fragment of a splice event.
///
/// All attributes are optional except the framing flags; a fragment without
/// a command type is rejected on entry. Timestamps are in 27 MHz host-clock
/// ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SpliceInput {
    /// Raw command type carried by the fragment.
    pub command_type: Option<u8>,
    /// First fragment of an event.
    pub start: bool,
    /// Last fragment of an event.
    pub end: bool,
    /// Splice event identifier.
    pub event_id: Option<u32>,
    /// Unique program identifier.
    pub unique_program_id: Option<u16>,
    /// Event cancellation indicator.
    pub cancel: bool,
    /// Out-of-network indicator.
    pub out_of_network: bool,
    /// Automatic return at the end of the break.
    pub auto_return: bool,
    /// Program time of the splice point, host clock.
    pub pts_prog: Option<u64>,
    /// Duration of the break, host clock.
    pub duration: Option<u64>,
    /// System time of the event, host clock; becomes the message deadline.
    pub pts_sys: Option<u64>,
    /// Raw splice descriptor bytes (continuation fragments).
    pub descriptor: Option<Vec<u8>>,
}

impl SpliceInput {
    /// Creates a single-fragment event record for the given command type.
    pub fn event(command_type: SpliceCommandType) -> Self {
        Self {
            command_type: Some(command_type.as_u8()),
            start: true,
            end: true,
            ..Self::default()
        }
    }

    /// Creates a descriptor continuation fragment.
    pub fn descriptor(command_type: SpliceCommandType, bytes: Vec<u8>) -> Self {
        Self {
            command_type: Some(command_type.as_u8()),
            descriptor: Some(bytes),
            ..Self::default()
        }
    }
}

/// An opaque, validated splice descriptor byte run.
///
/// The wire layout is `splice_descriptor_tag` (8 bits), `descriptor_length`
/// (8 bits), then `descriptor_length` payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DescriptorFragment {
    bytes: Vec<u8>,
}

impl DescriptorFragment {
    /// Descriptor tag.
    pub fn tag(&self) -> u8 {
        self.bytes[0]
    }

    /// Complete wire bytes, tag and length included.
    pub fn wire(&self) -> &[u8] {
        &self.bytes
    }

    /// Wire length in bytes.
    pub fn wire_len(&self) -> usize {
        self.bytes.len()
    }
}

impl TryFrom<Vec<u8>> for DescriptorFragment {
    type Error = Vec<u8>;

    /// Validates the tag/length framing; returns the bytes back on failure.
    fn try_from(bytes: Vec<u8>) -> Result<Self, Vec<u8>> {
        if bytes.len() < 2 || bytes.len() != 2 + bytes[1] as usize {
            return Err(bytes);
        }
        Ok(Self { bytes })
    }
}

/// Errors produced while assembling an event from its fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    /// The first fragment carries no command type.
    MissingCommandType,
    /// The command type is not one the generator synthesizes.
    UnknownCommandType(u8),
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssembleError::MissingCommandType => write!(f, "no command type found"),
            AssembleError::UnknownCommandType(raw) => {
                write!(f, "unimplemented command type {raw}")
            }
        }
    }
}

impl Error for AssembleError {}

/// A logical splice event, assembled from a complete fragment batch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SpliceEvent {
    /// Command this event maps to on the wire.
    pub command_type: SpliceCommandType,
    /// Splice event identifier.
    pub event_id: u32,
    /// Unique program identifier.
    pub unique_program_id: u16,
    /// Event cancellation indicator.
    pub cancel: bool,
    /// Out-of-network indicator.
    pub out_of_network: bool,
    /// Automatic return at the end of the break.
    pub auto_return: bool,
    /// Program time of the splice point, host clock.
    pub pts_prog: Option<u64>,
    /// Duration of the break, host clock.
    pub duration: Option<u64>,
    /// Deadline of the event, host clock.
    pub cr_sys: u64,
    /// Validated descriptors from continuation fragments.
    pub descriptors: Vec<DescriptorFragment>,
}

impl SpliceEvent {
    /// Assembles an event from a complete fragment batch.
    ///
    /// Attributes come from the first fragment; descriptors come from the
    /// remaining fragments. A descriptor whose framing does not validate is
    /// skipped with a warning.
    pub fn assemble(batch: Vec<SpliceInput>) -> Result<Self, AssembleError> {
        let mut fragments = batch.into_iter();
        let first = fragments.next().ok_or(AssembleError::MissingCommandType)?;
        let raw = first
            .command_type
            .ok_or(AssembleError::MissingCommandType)?;
        let command_type =
            SpliceCommandType::try_from(raw).map_err(AssembleError::UnknownCommandType)?;

        let mut descriptors = Vec::new();
        for fragment in fragments {
            let Some(bytes) = fragment.descriptor else {
                continue;
            };
            match DescriptorFragment::try_from(bytes) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(_) => warn!("fail to export descriptor"),
            }
        }

        Ok(Self {
            command_type,
            event_id: first.event_id.unwrap_or(0),
            unique_program_id: first.unique_program_id.unwrap_or(0),
            cancel: first.cancel,
            out_of_network: first.out_of_network,
            auto_return: first.auto_return,
            pts_prog: first.pts_prog,
            duration: first.duration,
            cr_sys: first.pts_sys.unwrap_or(0),
            descriptors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_type_round_trip() {
        for raw in [0x00, 0x05, 0x06] {
            let command_type = SpliceCommandType::try_from(raw).unwrap();
            assert_eq!(command_type.as_u8(), raw);
        }
        assert_eq!(SpliceCommandType::try_from(0x04), Err(0x04));
    }

    #[test]
    fn test_descriptor_framing_validation() {
        assert!(DescriptorFragment::try_from(vec![0x02, 0x02, 0xAA, 0xBB]).is_ok());
        // declared length does not match the run
        assert!(DescriptorFragment::try_from(vec![0x02, 0x05, 0xAA]).is_err());
        assert!(DescriptorFragment::try_from(vec![0x02]).is_err());
        assert!(DescriptorFragment::try_from(vec![]).is_err());
    }

    #[test]
    fn test_assemble_reads_first_fragment_only() {
        let mut first = SpliceInput::event(SpliceCommandType::Insert);
        first.event_id = Some(42);
        first.pts_sys = Some(1_000);
        let mut stray = SpliceInput::event(SpliceCommandType::Insert);
        stray.event_id = Some(99);

        let event = SpliceEvent::assemble(vec![first, stray]).unwrap();
        assert_eq!(event.event_id, 42);
        assert_eq!(event.cr_sys, 1_000);
        assert!(event.descriptors.is_empty());
    }

    #[test]
    fn test_assemble_collects_valid_descriptors() {
        let first = SpliceInput::event(SpliceCommandType::TimeSignal);
        let good = SpliceInput::descriptor(SpliceCommandType::TimeSignal, vec![0x02, 0x01, 0xAA]);
        let bad = SpliceInput::descriptor(SpliceCommandType::TimeSignal, vec![0x02, 0x09]);

        let event = SpliceEvent::assemble(vec![first, good, bad]).unwrap();
        assert_eq!(event.descriptors.len(), 1);
        assert_eq!(event.descriptors[0].wire(), &[0x02, 0x01, 0xAA]);
    }

    #[test]
    fn test_assemble_rejects_unknown_command() {
        let mut input = SpliceInput::event(SpliceCommandType::Insert);
        input.command_type = Some(0x07);
        assert_eq!(
            SpliceEvent::assemble(vec![input]),
            Err(AssembleError::UnknownCommandType(0x07))
        );
    }

    #[test]
    fn test_assemble_requires_command_type() {
        let input = SpliceInput::default();
        assert_eq!(
            SpliceEvent::assemble(vec![input]),
            Err(AssembleError::MissingCommandType)
        );
    }
}
