//! The splice information generator.
//!
//! [`SpliceInfoGenerator`] accepts splice event fragments from the demux
//! side, synthesizes SCTE-35 sections in their scheduled and immediate
//! forms, and emits one section per qualifying clock tick: scheduled forms
//! while an event's deadline lies ahead, the immediate catch-up form once
//! it has passed, and the cached splice_null section otherwise.
//!
//! The generator is single-threaded and cooperative: every operation runs
//! to completion, and state only advances inside those calls.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;

use tracing::{debug, info, trace, warn};

use crate::block::{AllocError, Block, BufferProvider};
use crate::clock::{host_to_pts, UCLOCK_FREQ};
use crate::encoding::{
    BreakDuration, EncodingError, InsertCommand, SpliceCommand, SpliceSection, TimeSignalCommand,
    PSI_HEADER_SIZE, PSI_MAX_SIZE,
};
use crate::event::{SpliceCommandType, SpliceEvent, SpliceInput};
use crate::flow::{FlowDef, EVENT_FLOW_DEF, SECTION_FLOW_DEF, TB_RATE_PSI, TS_HEADER_SIZE, TS_SIZE};
use crate::output::{Emitter, SectionFlowDef, SectionRecord};
use crate::reassembly::Reassembly;

/// Errors surfaced to the collaborator framework.
#[derive(Debug)]
pub enum GeneratorError {
    /// A block allocation or duplication failed.
    Alloc(AllocError),
    /// Section encoding failed.
    Encoding(EncodingError),
    /// The input flow definition does not carry the required format.
    InvalidFlowDef(String),
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorError::Alloc(err) => write!(f, "{err}"),
            GeneratorError::Encoding(err) => write!(f, "{err}"),
            GeneratorError::InvalidFlowDef(def) => {
                write!(f, "invalid flow definition: {def}")
            }
        }
    }
}

impl Error for GeneratorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GeneratorError::Alloc(err) => Some(err),
            GeneratorError::Encoding(err) => Some(err),
            GeneratorError::InvalidFlowDef(_) => None,
        }
    }
}

impl From<AllocError> for GeneratorError {
    fn from(err: AllocError) -> Self {
        GeneratorError::Alloc(err)
    }
}

impl From<EncodingError> for GeneratorError {
    fn from(err: EncodingError) -> Self {
        GeneratorError::Encoding(err)
    }
}

/// A synthesized event awaiting emission.
#[derive(Debug)]
struct SectionMessage {
    /// Deadline, host clock.
    cr_sys: u64,
    /// PTS-stamped form, sent while the deadline lies ahead.
    scheduled: Option<Block>,
    /// Immediate form, the catch-up once the deadline has passed.
    immediate: Option<Block>,
}

impl SectionMessage {
    fn new(cr_sys: u64) -> Self {
        Self {
            cr_sys,
            scheduled: None,
            immediate: None,
        }
    }
}

/// SCTE-35 splice information table generator.
///
/// Collaborators are injected at construction: a [`BufferProvider`] for
/// section blocks and an [`Emitter`] receiving flow definitions and
/// sections. The multiplexer drives emission by calling [`prepare`] with
/// the current system clock.
///
/// [`prepare`]: SpliceInfoGenerator::prepare
#[derive(Debug)]
pub struct SpliceInfoGenerator<P, E> {
    // Field order is teardown order: pending messages, the null section,
    // the reassembly list, the flow definition, then the collaborators.
    /// Synthesized messages awaiting emission, in creation order.
    pending: VecDeque<SectionMessage>,
    /// Cached splice_null section.
    null_section: Option<Block>,
    /// Fragments of the in-progress event.
    reassembly: Reassembly,
    /// Input flow definition; required before any section can be built.
    flow_def: Option<FlowDef>,
    /// Minimum emission period, host clock. Zero disables the generator.
    interval: u64,
    /// Date of the last emission; zero forces the next tick to emit.
    last_emit_cr_sys: u64,
    provider: P,
    emitter: E,
}

impl<P: BufferProvider, E: Emitter> SpliceInfoGenerator<P, E> {
    /// Creates a generator with the given collaborators.
    ///
    /// The generator stays inert until a flow definition is set and a
    /// non-zero interval is configured.
    pub fn new(provider: P, emitter: E) -> Self {
        Self {
            pending: VecDeque::new(),
            null_section: None,
            reassembly: Reassembly::new(),
            flow_def: None,
            interval: 0,
            last_emit_cr_sys: 0,
            provider,
            emitter,
        }
    }

    /// Shared access to the emitter.
    pub fn emitter(&self) -> &E {
        &self.emitter
    }

    /// Mutable access to the emitter.
    pub fn emitter_mut(&mut self) -> &mut E {
        &mut self.emitter
    }

    /// Consumes the generator, returning the emitter.
    pub fn into_emitter(self) -> E {
        self.emitter
    }

    /// Number of messages in the pending queue.
    pub fn pending_sections(&self) -> usize {
        self.pending.len()
    }

    /// Sets the input flow definition.
    ///
    /// The format must start with `void.scte35.`. On the first successful
    /// set, the null section is built and the output flow definition is
    /// published.
    pub fn set_flow_def(&mut self, flow_def: FlowDef) -> Result<(), GeneratorError> {
        if !flow_def.matches(EVENT_FLOW_DEF) {
            return Err(GeneratorError::InvalidFlowDef(flow_def.def().to_string()));
        }

        let first_set = self.flow_def.is_none();
        self.flow_def = Some(flow_def);

        if first_set {
            self.build_null_section()?;
            self.publish_flow_def();
        }
        Ok(())
    }

    /// Current minimum emission interval, host clock.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Sets the minimum emission interval and republishes the output flow
    /// definition. Zero disables emission.
    pub fn set_interval(&mut self, interval: u64) {
        self.interval = interval;
        self.publish_flow_def();
    }

    /// Pushes one event fragment.
    ///
    /// Fragments without a command type are dropped with a warning. A
    /// fragment starting a new event while another is accumulating forces
    /// a best-effort flush of the old one. When a fragment completes an
    /// event, the event is synthesized and queued for emission.
    pub fn push(&mut self, input: SpliceInput) -> Result<(), GeneratorError> {
        if input.command_type.is_none() {
            warn!("no command type in packet");
            return Ok(());
        }

        if self.reassembly.forces_flush(&input) {
            warn!("force last event flush");
            let batch = self.reassembly.take();
            self.flush_batch(batch)?;
        }

        if !self.reassembly.push(input) {
            trace!("wait for next descriptor");
            return Ok(());
        }
        let batch = self.reassembly.take();
        self.flush_batch(batch)
    }

    /// Clears the scheduled form of every pending message.
    ///
    /// Upcoming PTS-stamped sends are cancelled; immediate catch-up forms
    /// are kept so past-deadline events can still be signalled.
    pub fn clear_scheduled(&mut self) {
        info!("now using splice_null command due to empty event");
        for message in &mut self.pending {
            message.scheduled = None;
        }
    }

    /// Prepares the next section for the given muxing date.
    ///
    /// `latency` is reserved for consumer alignment; the decision only
    /// uses `cr_sys`. At most one section is emitted per pending message
    /// plus, when nothing else produced output, one null section.
    pub fn prepare(&mut self, cr_sys: u64, _latency: u64) -> Result<(), GeneratorError> {
        if self.flow_def.is_none()
            || self.null_section.is_none()
            || self.interval == 0
            || self.last_emit_cr_sys + self.interval > cr_sys
        {
            return Ok(());
        }

        let mut handled = false;
        let mut index = 0;
        while index < self.pending.len() {
            if self.pending[index].cr_sys < cr_sys {
                if let Some(message) = self.pending.remove(index) {
                    if let Some(immediate) = message.immediate {
                        info!("sending an immediate event");
                        let dup = immediate.duplicate()?;
                        self.emit_record(dup, cr_sys);
                        handled = true;
                    } else {
                        info!("event expired");
                    }
                }
                continue;
            }

            debug!("sending an event");
            self.pending[index].immediate = None;
            if let Some(scheduled) = &self.pending[index].scheduled {
                let dup = scheduled.duplicate()?;
                self.emit_record(dup, cr_sys);
                handled = true;
            }
            index += 1;
        }

        if !handled {
            if let Some(null_section) = &self.null_section {
                let dup = null_section.duplicate()?;
                self.emit_record(dup, cr_sys);
            }
        }
        Ok(())
    }

    /// Wraps a duplicated section into a transport record and emits it.
    fn emit_record(&mut self, payload: Block, cr_sys: u64) {
        self.emitter.emit(SectionRecord {
            payload,
            cr_sys,
            start: true,
            end: true,
        });
        self.last_emit_cr_sys = cr_sys;
    }

    /// Publishes the output flow definition for the current interval.
    fn publish_flow_def(&mut self) {
        if self.interval == 0 {
            return;
        }
        self.emitter.publish_flow_def(SectionFlowDef {
            def: SECTION_FLOW_DEF.to_string(),
            psi_section_interval: self.interval,
            octet_rate: (TS_SIZE - TS_HEADER_SIZE - 1) * UCLOCK_FREQ / self.interval,
            tb_rate: TB_RATE_PSI,
        });
    }

    /// Synthesizes a complete fragment batch, draining it in all cases.
    fn flush_batch(&mut self, batch: Vec<SpliceInput>) -> Result<(), GeneratorError> {
        match SpliceEvent::assemble(batch) {
            Ok(event) => match event.command_type {
                SpliceCommandType::Null => self.build_null_section(),
                SpliceCommandType::Insert => self.synthesize_insert(event),
                SpliceCommandType::TimeSignal => self.synthesize_time_signal(event),
            },
            Err(err) => {
                warn!("{err}");
                Ok(())
            }
        }
    }

    /// Encodes a section into a freshly allocated block.
    fn encode_section(&self, section: &SpliceSection<'_>) -> Result<Block, GeneratorError> {
        let mut block = self.provider.alloc(PSI_MAX_SIZE + PSI_HEADER_SIZE)?;
        section.encode_into(block.buf_mut())?;
        Ok(block)
    }

    /// Rebuilds the cached splice_null section.
    fn build_null_section(&mut self) -> Result<(), GeneratorError> {
        if self.flow_def.is_none() {
            return Ok(());
        }
        let block = self.encode_section(&SpliceSection::new(SpliceCommand::Null))?;
        self.null_section = Some(block);
        Ok(())
    }

    /// Synthesizes both forms of a splice_insert event.
    fn synthesize_insert(&mut self, event: SpliceEvent) -> Result<(), GeneratorError> {
        let command = |pts_time: Option<u64>| {
            SpliceCommand::Insert(InsertCommand {
                event_id: event.event_id,
                cancel: event.cancel,
                out_of_network: event.out_of_network,
                pts_time,
                break_duration: event.duration.map(|duration| BreakDuration {
                    auto_return: event.auto_return,
                    duration: host_to_pts(duration),
                }),
                unique_program_id: event.unique_program_id,
            })
        };

        let mut message = SectionMessage::new(event.cr_sys);
        if let Some(pts_prog) = event.pts_prog {
            let section = SpliceSection::new(command(Some(host_to_pts(pts_prog))));
            message.scheduled = Some(self.encode_section(&section)?);
        }
        let section = SpliceSection::new(command(None));
        message.immediate = Some(self.encode_section(&section)?);

        self.pending.push_back(message);
        // Force sending the table immediately.
        self.last_emit_cr_sys = 0;
        info!("now using splice_insert command for event {}", event.event_id);
        Ok(())
    }

    /// Synthesizes both forms of a time_signal event with its descriptors.
    fn synthesize_time_signal(&mut self, event: SpliceEvent) -> Result<(), GeneratorError> {
        let mut message = SectionMessage::new(event.cr_sys);
        if let Some(pts_prog) = event.pts_prog {
            let section = SpliceSection {
                command: SpliceCommand::TimeSignal(TimeSignalCommand {
                    pts_time: Some(host_to_pts(pts_prog)),
                }),
                descriptors: &event.descriptors,
            };
            message.scheduled = Some(self.encode_section(&section)?);
        }
        let section = SpliceSection {
            command: SpliceCommand::TimeSignal(TimeSignalCommand { pts_time: None }),
            descriptors: &event.descriptors,
        };
        message.immediate = Some(self.encode_section(&section)?);

        self.pending.push_back(message);
        // Force sending the table immediately.
        self.last_emit_cr_sys = 0;
        info!("now using time signal command");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::HeapProvider;
    use crate::output::MemoryEmitter;

    const INTERVAL: u64 = 1_350_000;

    fn configured() -> SpliceInfoGenerator<HeapProvider, MemoryEmitter> {
        let mut generator = SpliceInfoGenerator::new(HeapProvider::new(), MemoryEmitter::new());
        generator
            .set_flow_def(FlowDef::new("void.scte35."))
            .unwrap();
        generator.set_interval(INTERVAL);
        generator
    }

    #[test]
    fn test_rejects_foreign_flow_def() {
        let mut generator = SpliceInfoGenerator::new(HeapProvider::new(), MemoryEmitter::new());
        let err = generator
            .set_flow_def(FlowDef::new("void.teletext."))
            .unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidFlowDef(_)));
    }

    #[test]
    fn test_flow_def_published_once_interval_known() {
        let mut generator = SpliceInfoGenerator::new(HeapProvider::new(), MemoryEmitter::new());
        generator
            .set_flow_def(FlowDef::new("void.scte35."))
            .unwrap();
        // interval still zero: nothing published yet
        assert!(generator.emitter().flow_defs.is_empty());

        generator.set_interval(INTERVAL);
        let flow_def = generator.emitter().last_flow_def().unwrap();
        assert_eq!(flow_def.def, SECTION_FLOW_DEF);
        assert_eq!(flow_def.psi_section_interval, INTERVAL);
        assert_eq!(flow_def.octet_rate, 183 * UCLOCK_FREQ / INTERVAL);
        assert_eq!(flow_def.tb_rate, TB_RATE_PSI);
    }

    #[test]
    fn test_idle_without_flow_def() {
        let mut generator = SpliceInfoGenerator::new(HeapProvider::new(), MemoryEmitter::new());
        generator.set_interval(INTERVAL);
        generator.prepare(10 * INTERVAL, 0).unwrap();
        assert!(generator.emitter().records.is_empty());
    }

    #[test]
    fn test_idle_with_zero_interval() {
        let mut generator = SpliceInfoGenerator::new(HeapProvider::new(), MemoryEmitter::new());
        generator
            .set_flow_def(FlowDef::new("void.scte35."))
            .unwrap();
        generator.prepare(10 * INTERVAL, 0).unwrap();
        assert!(generator.emitter().records.is_empty());
    }

    #[test]
    fn test_interval_gates_emission() {
        let mut generator = configured();
        generator.prepare(INTERVAL, 0).unwrap();
        assert_eq!(generator.emitter().records.len(), 1);
        // too soon: last + interval > now
        generator.prepare(INTERVAL + 1, 0).unwrap();
        assert_eq!(generator.emitter().records.len(), 1);
        generator.prepare(2 * INTERVAL, 0).unwrap();
        assert_eq!(generator.emitter().records.len(), 2);
    }

    #[test]
    fn test_fragment_without_command_type_dropped() {
        let mut generator = configured();
        generator.push(SpliceInput::default()).unwrap();
        assert_eq!(generator.pending_sections(), 0);
    }

    #[test]
    fn test_unknown_command_type_drains_accumulator() {
        let mut generator = configured();
        let mut input = SpliceInput::event(SpliceCommandType::Insert);
        input.command_type = Some(0x07);
        generator.push(input).unwrap();
        assert_eq!(generator.pending_sections(), 0);
        // a well-formed event still goes through afterwards
        let mut insert = SpliceInput::event(SpliceCommandType::Insert);
        insert.pts_sys = Some(1);
        generator.push(insert).unwrap();
        assert_eq!(generator.pending_sections(), 1);
    }

    #[test]
    fn test_synthesis_forces_next_tick() {
        let mut generator = configured();
        generator.prepare(INTERVAL, 0).unwrap();
        assert_eq!(generator.emitter().records.len(), 1);

        let mut insert = SpliceInput::event(SpliceCommandType::Insert);
        insert.pts_sys = Some(INTERVAL);
        generator.push(insert).unwrap();
        // last emission was at INTERVAL, but synthesis reset the clock:
        // the very next tick emits without waiting a full interval
        generator.prepare(INTERVAL + 1, 0).unwrap();
        assert_eq!(generator.emitter().records.len(), 2);
    }

    #[test]
    fn test_allocation_failure_is_fatal_and_clean() {
        // enough for the null section only
        let provider = HeapProvider::with_limit(1);
        let mut generator = SpliceInfoGenerator::new(provider.clone(), MemoryEmitter::new());
        generator
            .set_flow_def(FlowDef::new("void.scte35."))
            .unwrap();
        generator.set_interval(INTERVAL);

        let mut insert = SpliceInput::event(SpliceCommandType::Insert);
        insert.pts_sys = Some(1);
        let err = generator.push(insert).unwrap_err();
        assert!(matches!(err, GeneratorError::Alloc(_)));
        // no partial message lingers
        assert_eq!(generator.pending_sections(), 0);
        assert_eq!(provider.outstanding(), 1);
    }

    #[test]
    fn test_teardown_releases_all_blocks() {
        let provider = HeapProvider::new();
        let mut generator = SpliceInfoGenerator::new(provider.clone(), MemoryEmitter::new());
        generator
            .set_flow_def(FlowDef::new("void.scte35."))
            .unwrap();
        generator.set_interval(INTERVAL);

        let mut insert = SpliceInput::event(SpliceCommandType::Insert);
        insert.pts_prog = Some(9_000_000);
        insert.pts_sys = Some(9_000_000);
        generator.push(insert).unwrap();
        generator.prepare(INTERVAL, 0).unwrap();
        assert!(provider.outstanding() > 0);

        drop(generator);
        assert_eq!(provider.outstanding(), 0);
    }
}
