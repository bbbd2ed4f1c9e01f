//! Incremental transcript assembly.
//!
//! The transcription backend streams its structured analysis as free text
//! that only becomes valid JSON once the final fragment arrives. The
//! [`IncrementalJsonAssembler`] collects those fragments and offers a
//! best-effort read of individual string fields before the document is
//! complete.

mod assembler;
mod partial;


pub use assembler::{IncrementalJsonAssembler, TRANSCRIPTION_FIELD};
pub use partial::{parse_partial, strip_code_fence};
