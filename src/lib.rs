//! Read-only, zero-copy accessors for Dalvik Executable (dex) images:
//! header validation, bounds-checked views over the fixed identifier
//! tables, decoders for the variable-length data items, and fast
//! descriptor-based class definition lookup.

use std::result;

pub mod error;
pub mod file;
pub mod leb128;
pub mod utf;

pub type Result<T> = result::Result<T, error::DexError>;
