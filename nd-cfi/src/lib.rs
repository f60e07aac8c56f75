//! A hand-rolled Call Frame Information unwinder.
//!
//! Parses CIEs and FDEs out of `.eh_frame` or `.debug_frame`, runs the CFA
//! table machine, and walks a live stack one frame at a time, falling back
//! to a frame-pointer walk where CFI is absent or incomplete. This is
//! component C9 of the debug engine (`spec.md` §4.9).

mod cie;
mod error;
mod fde;
mod pointer;
mod table;
mod unwind;

pub use cie::Cie;
pub use error::{CfiError, CfiErrorKind, Result};
pub use fde::{Fde, FdeIndex};
pub use pointer::{read_encoded_pointer, PointerBases};
pub use table::{row_for_pc, CfaRule, RegisterRule, Row};
pub use unwind::{
    pick_better_trace, unwind_one_frame, walk_frame_pointers, Arch, Trace, UnwindContext,
    UnwoundFrame, MAX_FRAME_DEPTH,
};
