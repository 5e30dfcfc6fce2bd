use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use plain::Plain;

use crate::{dex_err, error::DexError, leb128, utf, Result};

macro_rules! check_lt_result {
    ($idx:expr, $count:expr, $item_ty:expr) => {
        if ($idx as usize) >= ($count as usize) {
            return dex_err!(DexIndexError {
                index: $idx as u32,
                item_ty: $item_ty,
                max: $count as usize,
            });
        }
    };
}

pub mod structs;
pub use structs::*;
pub mod header;
pub use header::*;
pub mod container;
pub use container::*;
pub mod verifier;
pub mod modifiers;
pub use modifiers::*;
pub mod class_accessor;
pub use class_accessor::*;
pub mod code_item_accessors;
pub use code_item_accessors::*;
pub mod encoded_values;
pub use encoded_values::*;
pub mod debug;
pub use debug::*;
pub mod annotations;
pub use annotations::*;

use self::verifier::VerifyPreset;

pub const DEX_MAGIC: &[u8] = b"dex\n";

pub const DEX_ENDIAN_CONSTANT: u32 = 0x12345678;

/// The value of an invalid index.
pub const DEX_NO_INDEX: u32 = 0xFFFF_FFFF;

/// The value of an invalid index in a 16-bit field.
pub const DEX_NO_INDEX_16: u16 = 0xFFFF;

/// Type and proto ids are referenced through 16-bit indices, capping both
/// tables at this many entries.
pub const DEX_INDEX_16_LIMIT: u32 = 1 << 16;

#[derive(Debug)]
pub enum DexLocation {
    InMemory,
    Path(String),
}

impl From<&'static str> for DexLocation {
    fn from(s: &'static str) -> Self {
        DexLocation::Path(s.to_string())
    }
}

impl fmt::Display for DexLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DexLocation::InMemory => write!(f, "[in-memory]"),
            DexLocation::Path(path) => write!(f, "{}", path),
        }
    }
}

pub type ContainerDexFile<'a> = DexFile<'a, ImageBuffer>;
pub type InMemoryDexFile<'a> = DexFile<'a, InMemoryDexContainer<'a>>;

/// A read-only view over one dex image.
///
/// All accessors borrow from the backing container: records, string bytes
/// and iterators stay valid for as long as the container does, and nothing
/// is copied out of the image. The file is immutable once constructed, so
/// any number of threads may use the accessors concurrently.
pub struct DexFile<'a, C: DexContainer<'a> = ImageBuffer> {
    image: &'a C,
    header: &'a Header,

    string_ids: &'a [StringId],
    type_ids: &'a [TypeId],
    field_ids: &'a [FieldId],
    proto_ids: &'a [ProtoId],
    method_ids: &'a [MethodId],
    class_defs: &'a [ClassDef],

    /// class descriptor -> class_def index, built once at construction
    class_def_index: HashMap<String, ClassDefIndex>,

    /// write-once slot for the external runtime bridge
    runtime_handle: OnceLock<usize>,

    location: DexLocation,
}

impl<'a> DexFile<'a, ImageBuffer> {
    pub fn open(container: &'a DexFileContainer) -> Result<ContainerDexFile<'a>> {
        let dex = DexFile::from_raw_parts(
            container.data(),
            DexLocation::Path(container.get_location().to_string()),
        )?;
        if container.verify {
            let preset = if container.verify_checksum {
                VerifyPreset::All
            } else {
                VerifyPreset::Structure
            };
            DexFile::verify(&dex, preset)?;
        }
        Ok(dex)
    }
}

impl<'a, C: DexContainer<'a>> DexFile<'a, C> {
    /// Interprets `base` as a dex image and validates its header: magic,
    /// version digits, endian tag, header and file sizes, and the offset,
    /// size and alignment of every fixed table. The descriptor index is
    /// built before the image is returned.
    pub fn from_raw_parts(base: &'a C, location: DexLocation) -> Result<DexFile<'a, C>> {
        let bytes = container_bytes(base);
        if bytes.len() < std::mem::size_of::<Header>() {
            return dex_err!(TruncatedFile);
        }

        let header = match Header::from_bytes(bytes) {
            Ok(header) => header,
            Err(plain::Error::TooShort) => return dex_err!(TruncatedFile),
            Err(_) => {
                return dex_err!(BadAlignment {
                    offset: 0,
                    section: "header"
                })
            }
        };

        let mut dex = Self {
            image: base,
            header,
            string_ids: DexFile::get_section(base, header.string_ids_off, header.string_ids_size),
            type_ids: DexFile::get_section(base, header.type_ids_off, header.type_ids_size),
            field_ids: DexFile::get_section(base, header.field_ids_off, header.field_ids_size),
            proto_ids: DexFile::get_section(base, header.proto_ids_off, header.proto_ids_size),
            method_ids: DexFile::get_section(base, header.method_ids_off, header.method_ids_size),
            class_defs: DexFile::get_section(base, header.class_defs_off, header.class_defs_size),
            class_def_index: HashMap::new(),
            runtime_handle: OnceLock::new(),
            location,
        };

        verifier::check_header_structure(&dex)?;
        dex.init_class_def_index()?;
        Ok(dex)
    }

    /// Returns the typed view of one fixed table, or an empty slice when the
    /// declared bounds fall outside the image.
    pub fn get_section<T: Plain>(base: &'a C, offset: u32, len: u32) -> &'a [T] {
        if len == 0 {
            return &[];
        }

        let bytes = container_bytes(base);
        let section_size = match (len as usize).checked_mul(std::mem::size_of::<T>()) {
            Some(size) => size,
            None => return &[],
        };
        match (offset as usize).checked_add(section_size) {
            Some(end) if end <= bytes.len() => {}
            _ => return &[],
        }

        match T::slice_from_bytes_len(&bytes[offset as usize..], len as usize) {
            Ok(slice) => slice,
            Err(_) => &[],
        }
    }

    fn init_class_def_index(&mut self) -> Result<()> {
        let mut index = HashMap::with_capacity(self.class_defs.len());
        for (i, class_def) in self.class_defs.iter().enumerate() {
            // unresolvable descriptors are left for the verifier to report
            let Ok(type_id) = self.get_type_id(class_def.class_idx) else {
                continue;
            };
            let Ok(string_id) = self.get_string_id(type_id.descriptor_idx) else {
                continue;
            };
            let Ok((_, data)) = self.get_string_data(string_id) else {
                continue;
            };
            let Ok(descriptor) = utf::mutf8_to_str(data) else {
                continue;
            };
            match index.entry(descriptor) {
                Entry::Occupied(entry) => {
                    return dex_err!(DuplicateClassDef {
                        descriptor: entry.key().clone()
                    })
                }
                Entry::Vacant(entry) => {
                    entry.insert(i as ClassDefIndex);
                }
            }
        }
        self.class_def_index = index;
        Ok(())
    }

    #[inline(always)]
    pub(crate) fn image_bytes(&self) -> &'a [u8] {
        container_bytes(self.image)
    }

    pub fn get_header(&self) -> &'a Header {
        self.header
    }

    pub fn get_location(&self) -> &DexLocation {
        &self.location
    }

    /// Numeric dex version decoded from the magic.
    pub fn version(&self) -> u32 {
        self.header.get_version()
    }

    /// Size of the backing buffer in bytes.
    #[inline(always)]
    pub fn file_size(&self) -> usize {
        self.image_bytes().len()
    }

    //------------------------------------------------------------------------------
    // Runtime bridge handle
    //------------------------------------------------------------------------------

    /// Publishes the opaque runtime-bridge handle. The first successful call
    /// wins; later calls return false and leave the stored value untouched.
    pub fn set_runtime_handle(&self, handle: usize) -> bool {
        self.runtime_handle.set(handle).is_ok()
    }

    pub fn runtime_handle(&self) -> Option<usize> {
        self.runtime_handle.get().copied()
    }

    //------------------------------------------------------------------------------
    // Strings
    //------------------------------------------------------------------------------

    #[inline(always)]
    pub fn get_string_id(&self, idx: StringIndex) -> Result<&'a StringId> {
        check_lt_result!(idx, self.num_string_ids(), "StringId");
        Ok(&self.string_ids[idx as usize])
    }

    #[inline(always)]
    pub fn string_ids(&self) -> &'a [StringId] {
        self.string_ids
    }

    #[inline(always)]
    pub fn num_string_ids(&self) -> u32 {
        self.header.string_ids_size
    }

    pub fn get_index_for_string_id(&self, string_id: &StringId) -> StringIndex {
        index_in_table(self.string_ids, string_id, "StringId")
    }

    /// Resolves a string id to its declared UTF-16 length and the MUTF-8
    /// bytes including the trailing NUL. No decoding happens here.
    #[inline]
    pub fn get_string_data(&self, string_id: &StringId) -> Result<(u32, &'a [u8])> {
        check_lt_result!(string_id.offset(), self.file_size(), "string data offset");
        let bytes = self.image_bytes();
        let (utf16_len, size) = match leb128::decode_leb128(&bytes[string_id.offset()..]) {
            Ok(decoded) => decoded,
            Err(DexError::VarIntError(kind)) => {
                return dex_err!(BadStringData {
                    offset: string_id.offset(),
                    kind
                });
            }
            Err(err) => return Err(err),
        };

        let start = string_id.offset() + size;
        check_lt_result!(start, self.file_size(), "string data");
        match bytes[start..].iter().position(|x| *x == 0) {
            Some(pos) => Ok((utf16_len, &bytes[start..start + pos + 1])),
            None => dex_err!(BadStringDataMissingNullByte, start),
        }
    }

    /// As [`Self::get_string_data`], with `None` for the no-index sentinel.
    pub fn string_data_by_idx(&self, idx: StringIndex) -> Result<Option<(u32, &'a [u8])>> {
        if idx == DEX_NO_INDEX {
            return Ok(None);
        }
        Ok(Some(self.get_string_data(self.get_string_id(idx)?)?))
    }

    #[inline(always)]
    pub fn get_utf16_str(&self, string_id: &StringId) -> Result<String> {
        let (_, data) = self.get_string_data(string_id)?;
        utf::mutf8_to_str(data)
    }

    #[inline(always)]
    pub fn get_utf16_str_at(&self, idx: StringIndex) -> Result<String> {
        self.get_utf16_str(self.get_string_id(idx)?)
    }

    #[inline(always)]
    pub fn get_utf16_str_lossy(&self, string_id: &StringId) -> Result<String> {
        let (_, data) = self.get_string_data(string_id)?;
        Ok(utf::mutf8_to_str_lossy(data))
    }

    #[inline(always)]
    pub fn get_utf16_str_lossy_at(&self, idx: StringIndex) -> Result<String> {
        self.get_utf16_str_lossy(self.get_string_id(idx)?)
    }

    /// Decoded string for `idx`, with `None` for the no-index sentinel.
    pub fn string_by_idx(&self, idx: StringIndex) -> Result<Option<String>> {
        if idx == DEX_NO_INDEX {
            return Ok(None);
        }
        Ok(Some(self.get_utf16_str_lossy_at(idx)?))
    }

    /// Binary search over the string ids in UTF-16 code-unit order.
    pub fn find_string_id(&self, string: &str) -> Result<Option<&'a StringId>> {
        let needle = utf::str_to_mutf8(string);
        let (mut lo, mut hi) = (0usize, self.string_ids.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let string_id = &self.string_ids[mid];
            let (_, data) = self.get_string_data(string_id)?;
            match utf::compare_mutf8_utf16(data, &needle) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Some(string_id)),
            }
        }
        Ok(None)
    }

    //------------------------------------------------------------------------------
    // Types
    //------------------------------------------------------------------------------

    #[inline(always)]
    pub fn get_type_id(&self, idx: TypeIndex) -> Result<&'a TypeId> {
        check_lt_result!(idx, self.num_type_ids(), "TypeId");
        Ok(&self.type_ids[idx as usize])
    }

    #[inline(always)]
    pub fn type_ids(&self) -> &'a [TypeId] {
        self.type_ids
    }

    #[inline(always)]
    pub fn num_type_ids(&self) -> u32 {
        self.header.type_ids_size
    }

    pub fn get_index_for_type_id(&self, type_id: &TypeId) -> TypeIndex {
        index_in_table(self.type_ids, type_id, "TypeId") as TypeIndex
    }

    #[inline(always)]
    pub fn get_type_desc_utf16(&self, type_id: &TypeId) -> Result<String> {
        self.get_utf16_str_at(type_id.descriptor_idx)
    }

    #[inline(always)]
    pub fn get_type_desc_utf16_lossy(&self, type_id: &TypeId) -> Result<String> {
        self.get_utf16_str_lossy_at(type_id.descriptor_idx)
    }

    #[inline(always)]
    pub fn get_type_desc_utf16_at(&self, idx: TypeIndex) -> Result<String> {
        self.get_type_desc_utf16(self.get_type_id(idx)?)
    }

    #[inline(always)]
    pub fn get_type_desc_utf16_lossy_at(&self, idx: TypeIndex) -> Result<String> {
        self.get_type_desc_utf16_lossy(self.get_type_id(idx)?)
    }

    /// Raw MUTF-8 bytes of a type descriptor, including the trailing NUL.
    pub fn get_type_desc_data(&self, type_id: &TypeId) -> Result<&'a [u8]> {
        let (_, data) = self.get_string_data(self.get_string_id(type_id.descriptor_idx)?)?;
        Ok(data)
    }

    /// Binary search over the type ids by descriptor string index.
    pub fn find_type_id(&self, string_idx: StringIndex) -> Option<&'a TypeId> {
        match self
            .type_ids
            .binary_search_by_key(&string_idx, |type_id| type_id.descriptor_idx)
        {
            Ok(idx) => Some(&self.type_ids[idx]),
            Err(_) => None,
        }
    }

    //------------------------------------------------------------------------------
    // Protos
    //------------------------------------------------------------------------------

    #[inline(always)]
    pub fn get_proto_id(&self, idx: ProtoIndex) -> Result<&'a ProtoId> {
        check_lt_result!(idx, self.num_proto_ids(), "ProtoId");
        Ok(&self.proto_ids[idx as usize])
    }

    #[inline(always)]
    pub fn proto_ids(&self) -> &'a [ProtoId] {
        self.proto_ids
    }

    #[inline(always)]
    pub fn num_proto_ids(&self) -> u32 {
        self.header.proto_ids_size
    }

    pub fn get_index_for_proto_id(&self, proto_id: &ProtoId) -> ProtoIndex {
        index_in_table(self.proto_ids, proto_id, "ProtoId") as ProtoIndex
    }

    pub fn get_shorty(&self, proto_id: &ProtoId) -> Result<String> {
        self.get_utf16_str_at(proto_id.shorty_idx)
    }

    pub fn get_shorty_lossy(&self, proto_id: &ProtoId) -> Result<String> {
        self.get_utf16_str_lossy_at(proto_id.shorty_idx)
    }

    pub fn get_shorty_at(&self, idx: ProtoIndex) -> Result<String> {
        self.get_shorty(self.get_proto_id(idx)?)
    }

    pub fn get_return_type_descriptor(&self, proto_id: &ProtoId) -> Result<String> {
        self.get_type_desc_utf16_at(proto_id.return_type_idx)
    }

    /// The parameter type list, or `None` for a proto without parameters.
    #[inline]
    pub fn get_proto_parameters(&self, proto_id: &ProtoId) -> Result<Option<TypeList<'a>>> {
        self.get_type_list(proto_id.parameters_off)
    }

    /// Iterates the parameter type indices of a proto.
    pub fn get_proto_parameter_types(
        &self,
        proto_id: &ProtoId,
    ) -> Result<impl Iterator<Item = TypeIndex> + 'a> {
        let params = self.get_proto_parameters(proto_id)?.unwrap_or(&[]);
        Ok(params.iter().map(|item| item.type_idx))
    }

    /// Binary search ordered by return type, then the parameter list.
    pub fn find_proto_id(
        &self,
        return_type_idx: TypeIndex,
        signature_type_idxs: &[TypeIndex],
    ) -> Result<Option<&'a ProtoId>> {
        let (mut lo, mut hi) = (0usize, self.proto_ids.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let proto_id = &self.proto_ids[mid];
            let mut cmp = proto_id.return_type_idx.cmp(&return_type_idx);
            if cmp == Ordering::Equal {
                let params = self.get_proto_parameters(proto_id)?.unwrap_or(&[]);
                cmp = compare_type_lists(params, signature_type_idxs);
            }
            match cmp {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Some(proto_id)),
            }
        }
        Ok(None)
    }

    //------------------------------------------------------------------------------
    // Fields
    //------------------------------------------------------------------------------

    #[inline(always)]
    pub fn get_field_id(&self, idx: FieldIndex) -> Result<&'a FieldId> {
        check_lt_result!(idx, self.num_field_ids(), "FieldId");
        Ok(&self.field_ids[idx as usize])
    }

    #[inline(always)]
    pub fn field_ids(&self) -> &'a [FieldId] {
        self.field_ids
    }

    #[inline(always)]
    pub fn num_field_ids(&self) -> u32 {
        self.header.field_ids_size
    }

    pub fn get_index_for_field_id(&self, field_id: &FieldId) -> FieldIndex {
        index_in_table(self.field_ids, field_id, "FieldId")
    }

    pub fn get_field_name(&self, field_id: &FieldId) -> Result<String> {
        self.get_utf16_str_lossy_at(field_id.name_idx)
    }

    pub fn get_field_type_descriptor(&self, field_id: &FieldId) -> Result<String> {
        self.get_type_desc_utf16_at(field_id.type_idx)
    }

    pub fn get_field_declaring_class_descriptor(&self, field_id: &FieldId) -> Result<String> {
        self.get_type_desc_utf16_at(field_id.class_idx)
    }

    /// Binary search by declaring class, name and field type, in that order.
    pub fn find_field_id(
        &self,
        class_idx: TypeIndex,
        name_idx: StringIndex,
        type_idx: TypeIndex,
    ) -> Option<&'a FieldId> {
        match self
            .field_ids
            .binary_search_by_key(&(class_idx, name_idx, type_idx), |field_id| {
                (field_id.class_idx, field_id.name_idx, field_id.type_idx)
            }) {
            Ok(idx) => Some(&self.field_ids[idx]),
            Err(_) => None,
        }
    }

    //------------------------------------------------------------------------------
    // Methods
    //------------------------------------------------------------------------------

    #[inline(always)]
    pub fn get_method_id(&self, idx: MethodIndex) -> Result<&'a MethodId> {
        check_lt_result!(idx, self.num_method_ids(), "MethodId");
        Ok(&self.method_ids[idx as usize])
    }

    #[inline(always)]
    pub fn method_ids(&self) -> &'a [MethodId] {
        self.method_ids
    }

    #[inline(always)]
    pub fn num_method_ids(&self) -> u32 {
        self.header.method_ids_size
    }

    pub fn get_index_for_method_id(&self, method_id: &MethodId) -> MethodIndex {
        index_in_table(self.method_ids, method_id, "MethodId")
    }

    pub fn get_method_name(&self, method_id: &MethodId) -> Result<String> {
        self.get_utf16_str_lossy_at(method_id.name_idx)
    }

    pub fn get_method_prototype(&self, method_id: &MethodId) -> Result<&'a ProtoId> {
        self.get_proto_id(method_id.proto_idx)
    }

    pub fn get_method_shorty(&self, method_id: &MethodId) -> Result<String> {
        self.get_shorty(self.get_proto_id(method_id.proto_idx)?)
    }

    pub fn get_method_declaring_class_descriptor(&self, method_id: &MethodId) -> Result<String> {
        self.get_type_desc_utf16_at(method_id.class_idx)
    }

    /// Descriptor-form signature of a method, e.g. `(II)V`.
    pub fn get_method_signature(&self, method_id: &MethodId) -> Result<String> {
        let proto_id = self.get_proto_id(method_id.proto_idx)?;
        let mut signature = String::from("(");
        if let Some(params) = self.get_proto_parameters(proto_id)? {
            for item in params {
                signature.push_str(&self.get_type_desc_utf16_at(item.type_idx)?);
            }
        }
        signature.push(')');
        signature.push_str(&self.get_return_type_descriptor(proto_id)?);
        Ok(signature)
    }

    /// Binary search by declaring class, name and proto, in that order.
    pub fn find_method_id(
        &self,
        class_idx: TypeIndex,
        name_idx: StringIndex,
        proto_idx: ProtoIndex,
    ) -> Option<&'a MethodId> {
        match self
            .method_ids
            .binary_search_by_key(&(class_idx, name_idx, proto_idx), |method_id| {
                (method_id.class_idx, method_id.name_idx, method_id.proto_idx)
            }) {
            Ok(idx) => Some(&self.method_ids[idx]),
            Err(_) => None,
        }
    }

    //------------------------------------------------------------------------------
    // ClassDefs
    //------------------------------------------------------------------------------

    #[inline(always)]
    pub fn get_class_def(&self, idx: ClassDefIndex) -> Result<&'a ClassDef> {
        check_lt_result!(idx, self.num_class_defs(), "ClassDef");
        Ok(&self.class_defs[idx as usize])
    }

    #[inline(always)]
    pub fn class_defs(&self) -> &'a [ClassDef] {
        self.class_defs
    }

    #[inline(always)]
    pub fn num_class_defs(&self) -> u32 {
        self.header.class_defs_size
    }

    pub fn get_index_for_class_def(&self, class_def: &ClassDef) -> ClassDefIndex {
        index_in_table(self.class_defs, class_def, "ClassDef")
    }

    #[inline]
    pub fn get_class_descriptor(&self, class_def: &ClassDef) -> Result<String> {
        self.get_type_desc_utf16_at(class_def.class_idx)
    }

    /// Source file name, or `None` when the class carries the no-index
    /// sentinel. Index 0 is a legal string id and is resolved normally.
    pub fn get_source_file(&self, class_def: &ClassDef) -> Result<Option<String>> {
        self.string_by_idx(class_def.source_file_idx)
    }

    #[inline]
    pub fn get_interfaces_list(&self, class_def: &ClassDef) -> Result<Option<TypeList<'a>>> {
        self.get_type_list(class_def.interfaces_off)
    }

    /// Raw class_data_item bytes, or `None` when the class has no members.
    pub fn get_class_data(&self, class_def: &ClassDef) -> Result<Option<&'a [u8]>> {
        match class_def.class_data_off {
            0 => Ok(None),
            offset => {
                check_lt_result!(offset, self.file_size(), "class data offset");
                Ok(Some(&self.image_bytes()[offset as usize..]))
            }
        }
    }

    /// Descriptor-keyed class definition lookup.
    pub fn find_class_def(&self, descriptor: &str) -> Option<&'a ClassDef> {
        self.find_class_def_index(descriptor)
            .map(|idx| &self.class_defs[idx as usize])
    }

    pub fn find_class_def_index(&self, descriptor: &str) -> Option<ClassDefIndex> {
        self.class_def_index.get(descriptor).copied()
    }

    //------------------------------------------------------------------------------
    // Type lists
    //------------------------------------------------------------------------------

    #[inline]
    pub fn get_type_list(&self, offset: u32) -> Result<Option<TypeList<'a>>> {
        if offset == 0 {
            return Ok(None);
        }

        check_lt_result!(offset, self.file_size(), "TypeList");
        let bytes = self.image_bytes();
        let length = match u32::from_bytes(&bytes[offset as usize..]) {
            Ok(length) => *length,
            Err(plain::Error::TooShort) => {
                return dex_err!(DexLayoutError, self, offset, "TypeList", 0)
            }
            Err(_) => {
                return dex_err!(BadAlignment {
                    offset,
                    section: "type list"
                })
            }
        };

        let data_off = offset + std::mem::size_of::<u32>() as u32;
        Ok(Some(self.non_null_array_data_ptr(data_off, length as usize)?))
    }

    //------------------------------------------------------------------------------
    // Code items
    //------------------------------------------------------------------------------

    /// The code item at `offset`; 0 means a native or abstract method.
    #[inline]
    pub fn get_code_item(&self, offset: u32) -> Result<Option<&'a CodeItem>> {
        if offset == 0 {
            return Ok(None);
        }
        check_lt_result!(offset, self.file_size(), "code item offset");
        Ok(Some(self.non_null_data_ptr(offset)?))
    }

    #[inline]
    pub fn get_code_item_accessor(&self, offset: u32) -> Result<CodeItemAccessor<'a>> {
        check_lt_result!(offset, self.file_size(), "code item offset");
        let code_item = self.non_null_data_ptr::<CodeItem>(offset)?;
        CodeItemAccessor::from_code_item(
            self,
            code_item,
            offset + std::mem::size_of::<CodeItem>() as u32,
        )
    }

    #[inline]
    pub fn get_insns_raw(&self, code_off: u32, size_in_code_units: u32) -> Result<&'a [u16]> {
        check_lt_result!(code_off, self.file_size(), "code stream offset");
        self.non_null_array_data_ptr(code_off, size_in_code_units as usize)
    }

    //------------------------------------------------------------------------------
    // Raw data pointers
    //------------------------------------------------------------------------------

    #[inline]
    pub(crate) fn data_ptr<T: Plain>(&self, offset: u32) -> Result<Option<&'a T>> {
        match offset {
            0 => Ok(None),
            _ => Ok(Some(self.non_null_data_ptr(offset)?)),
        }
    }

    #[inline]
    pub(crate) fn non_null_data_ptr<T: Plain>(&self, offset: u32) -> Result<&'a T> {
        debug_assert!(offset != 0, "null offset for {}", std::any::type_name::<T>());
        if offset as usize >= self.file_size() {
            return dex_err!(DexLayoutError, self, offset, std::any::type_name::<T>(), 0);
        }
        match T::from_bytes(&self.image_bytes()[offset as usize..]) {
            Ok(value) => Ok(value),
            Err(plain::Error::TooShort) => {
                dex_err!(DexLayoutError, self, offset, std::any::type_name::<T>(), 0)
            }
            Err(_) => dex_err!(BadAlignment {
                offset,
                section: std::any::type_name::<T>()
            }),
        }
    }

    #[inline]
    pub(crate) fn non_null_array_data_ptr<T: Plain>(
        &self,
        offset: u32,
        len: usize,
    ) -> Result<&'a [T]> {
        debug_assert!(offset != 0, "null offset for {}", std::any::type_name::<T>());
        if offset as usize > self.file_size() {
            return dex_err!(DexLayoutError, self, offset, std::any::type_name::<T>(), len);
        }
        match T::slice_from_bytes_len(&self.image_bytes()[offset as usize..], len) {
            Ok(slice) => Ok(slice),
            Err(plain::Error::TooShort) => {
                dex_err!(DexLayoutError, self, offset, std::any::type_name::<T>(), len)
            }
            Err(_) => dex_err!(BadAlignment {
                offset,
                section: std::any::type_name::<T>()
            }),
        }
    }
}

#[inline(always)]
fn container_bytes<'a, C: DexContainer<'a>>(base: &'a C) -> &'a [u8] {
    base.as_ref()
}

/// Index of `record` within `table`, computed from its address. Callers must
/// pass a record borrowed from this very table; debug builds assert it.
fn index_in_table<T>(table: &[T], record: &T, item_ty: &'static str) -> u32 {
    let base = table.as_ptr() as usize;
    let addr = record as *const T as usize;
    debug_assert!(
        addr >= base && addr < base + table.len() * std::mem::size_of::<T>(),
        "record outside of the {} table",
        item_ty
    );
    debug_assert_eq!((addr - base) % std::mem::size_of::<T>(), 0);
    ((addr - base) / std::mem::size_of::<T>()) as u32
}

fn compare_type_lists(params: TypeList<'_>, needle: &[TypeIndex]) -> Ordering {
    for (item, needle_idx) in params.iter().zip(needle.iter()) {
        match item.type_idx.cmp(needle_idx) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    params.len().cmp(&needle.len())
}
