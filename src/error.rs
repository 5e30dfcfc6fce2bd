use std::fmt::Debug;

use thiserror::Error;

use crate::leb128::VarIntErrorKind;

#[derive(Error)]
pub enum DexError {
    #[error("Empty or truncated file")]
    TruncatedFile,

    #[error("Bad file magic")]
    BadFileMagic,

    #[error("Unknown dex version: {version}")]
    UnknownDexVersion { version: u32 },

    #[error("Bad file size ({actual}, expected at least {expected})")]
    FileSizeAtLeast { actual: usize, expected: usize },

    #[error("Bad file size ({actual}, expected at most {expected})")]
    FileSizeAtMost { actual: usize, expected: usize },

    #[error("Bad header size: {size}, expected at least {expected}")]
    BadHeaderSize { size: u32, expected: u32 },

    #[error("Unexpected endian tag: {0:#x}")]
    UnexpectedEndianess(u32),

    #[error("Bad checksum: {actual:#010x}, expected {expected:#010x}")]
    BadChecksum { actual: u32, expected: u32 },

    #[error("Bad signature: {actual}, expected {expected}")]
    BadSignature { actual: String, expected: String },

    #[error("Offset({offset}) should be within file size {size} for {section}")]
    BadOffsetTooLarge {
        offset: u32,
        size: usize,
        section: &'static str,
    },

    #[error("Offset({offset}) should be after header({header_size}) for {section}")]
    BadOffsetInHeader {
        offset: u32,
        header_size: usize,
        section: &'static str,
    },

    #[error("Offset({offset}) should be zero when size is zero for {section}")]
    BadOffsetNoSize { offset: u32, section: &'static str },

    #[error("Section end({offset}) should be within file size {size} for {section}")]
    BadSection {
        offset: u32,
        size: usize,
        section: &'static str,
    },

    #[error("Offset({offset}) should be 4-byte aligned for {section}")]
    BadAlignment { offset: u32, section: &'static str },

    #[error("Too many items in {section}: {size}, at most {max} are allowed")]
    TooManyItems {
        size: u32,
        max: u32,
        section: &'static str,
    },

    #[error("{0}")]
    DexFileError(String),

    #[error("Index({index}) to {item_ty} should be less than {max}")]
    DexIndexError {
        index: u32,
        max: usize,
        item_ty: &'static str,
    },

    #[error("Bad string data at offset {offset}: {kind}")]
    BadStringData {
        offset: usize,
        kind: VarIntErrorKind,
    },

    #[error("Bad string data({0}) does not end with a null byte!")]
    BadStringDataMissingNullByte(usize),

    #[error("{0}")]
    Mutf8DecodeError(#[from] std::string::FromUtf16Error),

    #[error("Failed to read {location}: {item_ty} at offset {offset} (array_len={array_len}) overflows with file size({file_size})")]
    DexLayoutError {
        location: String,
        offset: u32,
        item_ty: &'static str,
        array_len: usize,
        file_size: usize,
    },

    #[error("LEB128 decode failed: {0}")]
    VarIntError(#[from] VarIntErrorKind),

    #[error("Duplicate class definition for descriptor {descriptor:?}")]
    DuplicateClassDef { descriptor: String },

    #[error("Bad encoded value type: {0:#04x}")]
    BadEncodedValueType(u8),

    #[error("Bad encoded value size({size}) for value type {value_type:#04x}, at most {max} bytes are allowed")]
    BadEncodedValueSize {
        value_type: u8,
        size: usize,
        max: usize,
    },

    #[error("Invalid encoded value of type {value_type:#04x}: payload at offset {offset} overflows data size({size})")]
    InvalidEncodedValue {
        value_type: u8,
        offset: usize,
        size: usize,
    },

    #[error("Bad encoded array of type {value_type:#04x}: {length} items at offset {offset} overflow data size({size})")]
    BadEncodedArrayLength {
        value_type: u8,
        length: u32,
        offset: usize,
        size: usize,
    },

    #[error("Empty encoded value")]
    EmptyEncodedValue,

    #[error("Debug info stream ends without DBG_END_SEQUENCE (offset {offset})")]
    BadDebugInfo { offset: usize },

    #[error("Debug info register({register}) should be less than registers_size({registers_size})")]
    BadLocalRegister { register: u32, registers_size: u32 },

    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ArchiveError(#[from] zip::result::ZipError),
}

#[macro_export]
macro_rules! dex_err {
    ($name:ident) => {
        Err(DexError::$name)
    };
    ($name:ident, $arg1:literal, $($arg:tt)*) => {
        Err(DexError::$name(format!($arg1, $($arg)*)))
    };
    (DexLayoutError, $dex:ident, $off:expr, $item_ty:expr, $array_len:expr) => {
        Err(DexError::DexLayoutError {
            location: $dex.get_location().to_string(),
            offset: $off,
            item_ty: $item_ty,
            array_len: $array_len,
            file_size: $dex.file_size(),
        })
    };
    ($name:ident { $($arg:tt)* }) => {
        Err(DexError::$name { $($arg)* })
    };
    ($name:ident, $($arg:tt)*) => {
        Err(DexError::$name($($arg)*))
    };
}

impl Debug for DexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
