//! Raw records of the six fixed identifier tables and the variable data
//! items they point at. Every record is interpreted in place from the image
//! bytes; nothing here owns memory.

// --------------------------------------------------------------------
// StringId
// --------------------------------------------------------------------
pub type StringIndex = u32;

#[repr(C)]
#[derive(Debug, Clone)]
pub struct StringId {
    /// offset in bytes from the image base to the string_data_item
    pub string_data_off: u32,
}

unsafe impl plain::Plain for StringId {}

impl StringId {
    #[inline]
    pub const fn offset(&self) -> usize {
        self.string_data_off as usize
    }
}

// --------------------------------------------------------------------
// TypeId
// --------------------------------------------------------------------
pub type TypeIndex = u16;

#[repr(C)]
#[derive(Debug, Clone)]
pub struct TypeId {
    pub descriptor_idx: StringIndex, // index into string_ids
}

unsafe impl plain::Plain for TypeId {}

// --------------------------------------------------------------------
// FieldId
// --------------------------------------------------------------------
pub type FieldIndex = u32;

#[repr(C)]
#[derive(Debug, Clone)]
pub struct FieldId {
    pub class_idx: TypeIndex,  // index into type_ids for defining class
    pub type_idx: TypeIndex,   // index into type_ids for field type
    pub name_idx: StringIndex, // index into string_ids for field name
}

unsafe impl plain::Plain for FieldId {}

// --------------------------------------------------------------------
// ProtoId
// --------------------------------------------------------------------
pub type ProtoIndex = u16;

#[repr(C)]
#[derive(Debug, Clone)]
pub struct ProtoId {
    pub shorty_idx: StringIndex, // index into string_ids for shorty descriptor
    pub return_type_idx: TypeIndex, // index into type_ids for return type
    pad_: u16,                   // padding = 0
    pub parameters_off: u32,     // file offset to type_list for parameter types
}

unsafe impl plain::Plain for ProtoId {}

// --------------------------------------------------------------------
// MethodId
// --------------------------------------------------------------------
pub type MethodIndex = u32;

#[repr(C)]
#[derive(Debug, Clone)]
pub struct MethodId {
    pub class_idx: TypeIndex,  // index into type_ids for defining class
    pub proto_idx: ProtoIndex, // index into proto_ids for method signature
    pub name_idx: StringIndex, // index into string_ids for method name
}

unsafe impl plain::Plain for MethodId {}

// --------------------------------------------------------------------
// ClassDef
// --------------------------------------------------------------------
pub type ClassDefIndex = u32;

#[repr(C)]
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub class_idx: TypeIndex, // index into type_ids for this class
    pad1_: u16,               // padding = 0
    pub access_flags: u32,
    pub superclass_idx: TypeIndex, // index into type_ids for superclass
    pad2_: u16,                    // padding = 0
    pub interfaces_off: u32,       // file offset to TypeList
    pub source_file_idx: StringIndex, // index into string_ids for source file name
    pub annotations_off: u32,      // file offset to annotations_directory_item
    pub class_data_off: u32,       // file offset to class_data_item
    pub static_values_off: u32,    // file offset to the static values EncodedArray
}

unsafe impl plain::Plain for ClassDef {}

// --------------------------------------------------------------------
// TypeItem
// --------------------------------------------------------------------
#[repr(C)]
#[derive(Debug, Clone)]
pub struct TypeItem {
    pub type_idx: TypeIndex, // index into type_ids section
}

unsafe impl plain::Plain for TypeItem {}

pub type TypeList<'a> = &'a [TypeItem];

// --------------------------------------------------------------------
// CodeItem
// --------------------------------------------------------------------
#[repr(C)]
#[derive(Debug, Clone)]
pub struct CodeItem {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub tries_size: u16,
    pub debug_info_off: u32,
    /// size of the instruction array, in 2-byte code units
    pub insns_size: u32,
}

unsafe impl plain::Plain for CodeItem {}

// --------------------------------------------------------------------
// TryItem
// --------------------------------------------------------------------
#[repr(C)]
#[derive(Debug, Clone)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    /// offset into the encoded_catch_handler_list of the handlers covering
    /// this range
    pub handler_off: u16,
}

unsafe impl plain::Plain for TryItem {}

// --------------------------------------------------------------------
// CatchHandlerData
// --------------------------------------------------------------------
/// One decoded entry of an encoded_catch_handler. The catch-all entry
/// carries `type_idx == 0xFFFF`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CatchHandlerData {
    pub type_idx: TypeIndex,
    pub address: u32,
    pub is_catch_all: bool,
}

// --------------------------------------------------------------------
// AnnotationsDirectoryItem
// --------------------------------------------------------------------
#[repr(C)]
#[derive(Debug, Clone)]
pub struct AnnotationsDirectoryItem {
    pub class_annotations_off: u32,
    pub fields_size: u32,
    pub methods_size: u32,
    pub parameters_size: u32,
}

unsafe impl plain::Plain for AnnotationsDirectoryItem {}

#[repr(C)]
#[derive(Debug, Clone)]
pub struct FieldAnnotationsItem {
    pub field_idx: u32,
    pub annotations_off: u32,
}

unsafe impl plain::Plain for FieldAnnotationsItem {}

#[repr(C)]
#[derive(Debug, Clone)]
pub struct MethodAnnotationsItem {
    pub method_idx: u32,
    pub annotations_off: u32,
}

unsafe impl plain::Plain for MethodAnnotationsItem {}

#[repr(C)]
#[derive(Debug, Clone)]
pub struct ParameterAnnotationsItem {
    pub method_idx: u32,
    pub annotations_off: u32,
}

unsafe impl plain::Plain for ParameterAnnotationsItem {}

/// Entries are file offsets to annotation_items.
pub type AnnotationSetItem<'a> = &'a [u32];
