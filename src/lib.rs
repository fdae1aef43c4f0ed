#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]
#![warn(missing_docs)]

// Collaborator boundaries
pub mod block;
pub mod output;

// Core modules
pub mod clock;
pub mod crc;
pub mod encoding;
pub mod event;
pub mod flow;
pub mod generator;
pub mod reassembly;

// Re-export the main types for ease of use
pub use block::{AllocError, Block, BufferProvider, HeapProvider};
pub use event::{DescriptorFragment, SpliceCommandType, SpliceEvent, SpliceInput};
pub use flow::FlowDef;
pub use generator::{GeneratorError, SpliceInfoGenerator};
pub use output::{Emitter, MemoryEmitter, SectionFlowDef, SectionRecord};
