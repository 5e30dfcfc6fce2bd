#[repr(C)]
#[derive(Debug, Clone)]
pub struct Header {
    /// magic value: `"dex\n"` followed by three ASCII version digits and a
    /// NUL terminator
    magic: [u8; 8],

    /// Adler32 checksum of the rest of the file (everything but `magic` and
    /// this field); used to detect file corruption.
    pub checksum: u32,

    /// SHA-1 signature (hash) of the rest of the file (everything but
    /// `magic`, `checksum`, and this field); used to uniquely identify files.
    signature: [u8; 20],

    /// Size of the entire file including the header.
    pub file_size: u32,

    /// Size of the header (this struct), in bytes. It is always 0x70.
    pub header_size: u32,

    /// Endian constant - only the native byte order is supported.
    pub endian_tag: u32,

    /// size of the link section, or 0 if this file isn't statically linked
    pub link_size: u32,

    /// offset from the start of the file to the link section, or `0` if
    /// `link_size == 0`
    pub link_off: u32,

    /// offset from the start of the file to the map item; parsed but never
    /// consumed by the accessors
    pub map_off: u32,

    /// count of strings in the string identifiers list
    pub string_ids_size: u32,

    /// offset from the start of the file to the string identifiers list, or
    /// `0` if `string_ids_size == 0`.
    pub string_ids_off: u32,

    /// count of elements in the type identifiers list, at most `65536`
    pub type_ids_size: u32,

    /// offset from the start of the file to the type identifiers list, or
    /// `0` if `type_ids_size == 0`.
    pub type_ids_off: u32,

    /// count of elements in the proto identifiers list, at most `65536`
    pub proto_ids_size: u32,

    /// offset from the start of the file to the proto identifiers list, or
    /// `0` if `proto_ids_size == 0`.
    pub proto_ids_off: u32,

    /// count of elements in the field identifiers list
    pub field_ids_size: u32,

    /// offset from the start of the file to the field identifiers list, or
    /// `0` if `field_ids_size == 0`.
    pub field_ids_off: u32,

    /// count of elements in the method identifiers list
    pub method_ids_size: u32,

    /// offset from the start of the file to the method identifiers list, or
    /// `0` if `method_ids_size == 0`.
    pub method_ids_off: u32,

    /// count of elements in the class definitions list
    pub class_defs_size: u32,

    /// offset from the start of the file to the class definitions list, or
    /// `0` if `class_defs_size == 0`.
    pub class_defs_off: u32,

    /// size of the data section (in bytes)
    pub data_size: u32,

    /// offset from the start of the file to the data section
    pub data_off: u32,
}

unsafe impl plain::Plain for Header {}

impl Header {
    pub fn get_magic(&self) -> &[u8; 8] {
        &self.magic
    }

    pub fn get_signature(&self) -> &[u8; 20] {
        &self.signature
    }

    /// Decodes the numeric dex version from the magic, or 0 when the version
    /// bytes are not three ASCII digits.
    pub fn get_version(&self) -> u32 {
        let version_raw = &self.magic[4..7];
        if !version_raw.iter().all(u8::is_ascii_digit) {
            return 0;
        }
        String::from_utf8_lossy(version_raw).parse().unwrap_or_default()
    }
}
