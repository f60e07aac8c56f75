//! `nd` is a native source-level debugger engine. It consists of several
//! largely independent crates bundled together into one dependency so a
//! host application (a CLI front-end, an IDE plugin, a test harness) only
//! needs to pull in one crate name.
//!
//! # What's in the package
//!
//! - Mach-O and ELF64 binary loading, including `dSYM` bundles and
//!   GNU/`SHF_COMPRESSED` section decompression (always available, via
//!   [`object`]).
//! - A hand-rolled DWARF 4/5 reader: abbreviation tables, line programs,
//!   DIE/type graphs, range/location lists, the location expression VM,
//!   and the `.debug_names`/`.debug_aranges` acceleration indices (the
//!   **`dwarf`** feature, via [`dwarf`]).
//! - Call Frame Information unwinding, including a frame-pointer-walk
//!   fallback (the **`cfi`** feature, via [`cfi`]).
//! - A full debug engine driver: breakpoint management, a process-control
//!   trait host applications implement against their own OS backend, and
//!   a type-aware variable inspector (the **`engine`** feature, via
//!   [`engine`]).
//!
//! # Usage
//!
//! All three optional components are enabled by default. Disable
//! `default-features` and pick only what's needed, e.g. a symbol-table
//! tool that only needs binary loading can depend on `nd` with
//! `default-features = false`.

#![warn(missing_docs)]

#[doc(inline)]
pub use nd_common as common;
#[doc(inline)]
pub use nd_object as object;
#[doc(inline)]
#[cfg(feature = "dwarf")]
pub use nd_dwarf as dwarf;
#[doc(inline)]
#[cfg(feature = "cfi")]
pub use nd_cfi as cfi;
#[doc(inline)]
#[cfg(feature = "engine")]
pub use nd_engine as engine;
