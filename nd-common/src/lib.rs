//! Common primitives for the native debug engine.
//!
//! This crate exposes:
//!
//!  - [`ByteView`]: uniform access to binary data, whether mmapped, owned,
//!    or borrowed.
//!  - [`Arch`] / [`CpuFamily`]: architecture metadata (register layout, trap
//!    instructions) for x86-64 and AArch64.

#![warn(missing_docs)]

mod arch;
mod byteview;

pub use crate::arch::*;
pub use crate::byteview::*;
