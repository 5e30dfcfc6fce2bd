//! Assembles small dex images in memory for the integration tests. Tables
//! must be supplied in their required sort orders; offsets, checksum and
//! signature are computed here.
#![allow(dead_code)]

use std::collections::HashMap;

use sha1::{Digest, Sha1};

pub const HEADER_SIZE: usize = 0x70;

#[derive(Default)]
pub struct ProtoDef {
    pub shorty_idx: u32,
    pub return_type_idx: u16,
    pub params: Vec<u16>,
}

#[derive(Default)]
pub struct CodeDef {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub insns: Vec<u16>,
    /// (start_addr, insn_count, handler_off)
    pub tries: Vec<(u32, u16, u16)>,
    /// raw encoded_catch_handler_list, including the leading list size
    pub handlers: Vec<u8>,
    pub debug_info: Option<Vec<u8>>,
}

pub struct MethodDef {
    pub method_idx: u32,
    pub access_flags: u32,
    pub code: Option<CodeDef>,
}

pub struct FieldDef {
    pub field_idx: u32,
    pub access_flags: u32,
}

#[derive(Default)]
pub struct ClassDataDef {
    pub static_fields: Vec<FieldDef>,
    pub instance_fields: Vec<FieldDef>,
    pub direct_methods: Vec<MethodDef>,
    pub virtual_methods: Vec<MethodDef>,
}

/// Raw annotation_item byte sequences forming one class' annotations
/// directory. Parameter annotations are not emitted.
#[derive(Default)]
pub struct AnnotationsDef {
    pub class_annotations: Vec<Vec<u8>>,
    /// (field_idx, annotation_items)
    pub field_annotations: Vec<(u32, Vec<Vec<u8>>)>,
    /// (method_idx, annotation_items)
    pub method_annotations: Vec<(u32, Vec<Vec<u8>>)>,
}

pub struct ClassDefDef {
    pub class_idx: u16,
    pub access_flags: u32,
    pub superclass_idx: u16,
    pub interfaces: Vec<u16>,
    pub source_file_idx: u32,
    pub annotations: Option<AnnotationsDef>,
    pub class_data: Option<ClassDataDef>,
    pub static_values: Option<Vec<u8>>,
}

impl Default for ClassDefDef {
    fn default() -> Self {
        Self {
            class_idx: 0,
            access_flags: 0,
            superclass_idx: 0xFFFF,
            interfaces: Vec::new(),
            source_file_idx: 0xFFFF_FFFF,
            annotations: None,
            class_data: None,
            static_values: None,
        }
    }
}

#[derive(Default)]
pub struct DexBuilder {
    strings: Vec<String>,
    types: Vec<u32>,
    protos: Vec<ProtoDef>,
    fields: Vec<(u16, u16, u32)>,
    methods: Vec<(u16, u16, u32)>,
    classes: Vec<ClassDefDef>,
}

impl DexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a string; strings must arrive in UTF-16 code-unit order.
    pub fn string(&mut self, value: &str) -> u32 {
        self.strings.push(value.to_string());
        (self.strings.len() - 1) as u32
    }

    pub fn type_id(&mut self, descriptor_idx: u32) -> u16 {
        self.types.push(descriptor_idx);
        (self.types.len() - 1) as u16
    }

    pub fn proto(&mut self, shorty_idx: u32, return_type_idx: u16, params: &[u16]) -> u16 {
        self.protos.push(ProtoDef {
            shorty_idx,
            return_type_idx,
            params: params.to_vec(),
        });
        (self.protos.len() - 1) as u16
    }

    pub fn field(&mut self, class_idx: u16, type_idx: u16, name_idx: u32) -> u32 {
        self.fields.push((class_idx, type_idx, name_idx));
        (self.fields.len() - 1) as u32
    }

    pub fn method(&mut self, class_idx: u16, proto_idx: u16, name_idx: u32) -> u32 {
        self.methods.push((class_idx, proto_idx, name_idx));
        (self.methods.len() - 1) as u32
    }

    pub fn class(&mut self, class_def: ClassDefDef) -> u32 {
        self.classes.push(class_def);
        (self.classes.len() - 1) as u32
    }

    pub fn build(&self) -> Vec<u8> {
        let string_ids_off = HEADER_SIZE;
        let type_ids_off = string_ids_off + 4 * self.strings.len();
        let proto_ids_off = type_ids_off + 4 * self.types.len();
        let field_ids_off = proto_ids_off + 12 * self.protos.len();
        let method_ids_off = field_ids_off + 8 * self.fields.len();
        let class_defs_off = method_ids_off + 8 * self.methods.len();
        let data_off = class_defs_off + 32 * self.classes.len();

        let mut data: Vec<u8> = Vec::new();

        // parameter type lists
        let mut proto_params_off = vec![0u32; self.protos.len()];
        for (i, proto) in self.protos.iter().enumerate() {
            if proto.params.is_empty() {
                continue;
            }
            align4(&mut data);
            proto_params_off[i] = (data_off + data.len()) as u32;
            push_u32(&mut data, proto.params.len() as u32);
            for &type_idx in &proto.params {
                push_u16(&mut data, type_idx);
            }
        }

        // interface lists
        let mut interfaces_off = vec![0u32; self.classes.len()];
        for (i, class) in self.classes.iter().enumerate() {
            if class.interfaces.is_empty() {
                continue;
            }
            align4(&mut data);
            interfaces_off[i] = (data_off + data.len()) as u32;
            push_u32(&mut data, class.interfaces.len() as u32);
            for &type_idx in &class.interfaces {
                push_u16(&mut data, type_idx);
            }
        }

        // debug streams and code items, keyed by (class, kind, position)
        let mut code_offs: HashMap<(usize, usize, usize), u32> = HashMap::new();
        for (ci, class) in self.classes.iter().enumerate() {
            let Some(class_data) = &class.class_data else {
                continue;
            };
            for (kind, methods) in [
                (0usize, &class_data.direct_methods),
                (1usize, &class_data.virtual_methods),
            ] {
                for (mi, method) in methods.iter().enumerate() {
                    let Some(code) = &method.code else {
                        continue;
                    };
                    let debug_info_off = match &code.debug_info {
                        Some(stream) => {
                            let off = (data_off + data.len()) as u32;
                            data.extend_from_slice(stream);
                            off
                        }
                        None => 0,
                    };

                    align4(&mut data);
                    code_offs.insert((ci, kind, mi), (data_off + data.len()) as u32);
                    push_u16(&mut data, code.registers_size);
                    push_u16(&mut data, code.ins_size);
                    push_u16(&mut data, code.outs_size);
                    push_u16(&mut data, code.tries.len() as u16);
                    push_u32(&mut data, debug_info_off);
                    push_u32(&mut data, code.insns.len() as u32);
                    for &unit in &code.insns {
                        push_u16(&mut data, unit);
                    }
                    if !code.tries.is_empty() {
                        if code.insns.len() % 2 == 1 {
                            push_u16(&mut data, 0); // pad tries to 4 bytes
                        }
                        for &(start_addr, insn_count, handler_off) in &code.tries {
                            push_u32(&mut data, start_addr);
                            push_u16(&mut data, insn_count);
                            push_u16(&mut data, handler_off);
                        }
                        data.extend_from_slice(&code.handlers);
                    }
                }
            }
        }

        // class_data_items
        let mut class_data_off = vec![0u32; self.classes.len()];
        for (ci, class) in self.classes.iter().enumerate() {
            let Some(class_data) = &class.class_data else {
                continue;
            };
            class_data_off[ci] = (data_off + data.len()) as u32;
            push_uleb(&mut data, class_data.static_fields.len() as u32);
            push_uleb(&mut data, class_data.instance_fields.len() as u32);
            push_uleb(&mut data, class_data.direct_methods.len() as u32);
            push_uleb(&mut data, class_data.virtual_methods.len() as u32);

            for fields in [&class_data.static_fields, &class_data.instance_fields] {
                let mut last_idx = 0;
                for field in fields.iter() {
                    push_uleb(&mut data, field.field_idx - last_idx);
                    push_uleb(&mut data, field.access_flags);
                    last_idx = field.field_idx;
                }
            }
            for (kind, methods) in [
                (0usize, &class_data.direct_methods),
                (1usize, &class_data.virtual_methods),
            ] {
                let mut last_idx = 0;
                for (mi, method) in methods.iter().enumerate() {
                    push_uleb(&mut data, method.method_idx - last_idx);
                    push_uleb(&mut data, method.access_flags);
                    push_uleb(
                        &mut data,
                        code_offs.get(&(ci, kind, mi)).copied().unwrap_or(0),
                    );
                    last_idx = method.method_idx;
                }
            }
        }

        // annotation sets and directories
        let mut annotations_off = vec![0u32; self.classes.len()];
        for (ci, class) in self.classes.iter().enumerate() {
            let Some(annotations) = &class.annotations else {
                continue;
            };
            let class_set_off =
                write_annotation_set(&mut data, data_off, &annotations.class_annotations);
            let field_entries: Vec<(u32, u32)> = annotations
                .field_annotations
                .iter()
                .map(|(idx, items)| (*idx, write_annotation_set(&mut data, data_off, items)))
                .collect();
            let method_entries: Vec<(u32, u32)> = annotations
                .method_annotations
                .iter()
                .map(|(idx, items)| (*idx, write_annotation_set(&mut data, data_off, items)))
                .collect();

            align4(&mut data);
            annotations_off[ci] = (data_off + data.len()) as u32;
            push_u32(&mut data, class_set_off);
            push_u32(&mut data, field_entries.len() as u32);
            push_u32(&mut data, method_entries.len() as u32);
            push_u32(&mut data, 0); // no parameter annotations
            for (field_idx, set_off) in field_entries {
                push_u32(&mut data, field_idx);
                push_u32(&mut data, set_off);
            }
            for (method_idx, set_off) in method_entries {
                push_u32(&mut data, method_idx);
                push_u32(&mut data, set_off);
            }
        }

        // static value arrays
        let mut static_values_off = vec![0u32; self.classes.len()];
        for (ci, class) in self.classes.iter().enumerate() {
            if let Some(values) = &class.static_values {
                static_values_off[ci] = (data_off + data.len()) as u32;
                data.extend_from_slice(values);
            }
        }

        // string data
        let mut string_data_off = vec![0u32; self.strings.len()];
        for (i, string) in self.strings.iter().enumerate() {
            string_data_off[i] = (data_off + data.len()) as u32;
            push_uleb(&mut data, string.encode_utf16().count() as u32);
            data.extend_from_slice(&dexview::utf::str_to_mutf8(string));
        }

        let file_size = data_off + data.len();

        let mut out = Vec::with_capacity(file_size);
        out.extend_from_slice(b"dex\n035\0");
        push_u32(&mut out, 0); // checksum, filled below
        out.extend_from_slice(&[0u8; 20]); // signature, filled below
        push_u32(&mut out, file_size as u32);
        push_u32(&mut out, HEADER_SIZE as u32);
        push_u32(&mut out, 0x12345678);
        push_u32(&mut out, 0); // link_size
        push_u32(&mut out, 0); // link_off
        push_u32(&mut out, 0); // map_off
        push_table(&mut out, self.strings.len(), string_ids_off);
        push_table(&mut out, self.types.len(), type_ids_off);
        push_table(&mut out, self.protos.len(), proto_ids_off);
        push_table(&mut out, self.fields.len(), field_ids_off);
        push_table(&mut out, self.methods.len(), method_ids_off);
        push_table(&mut out, self.classes.len(), class_defs_off);
        push_u32(&mut out, data.len() as u32);
        push_u32(&mut out, if data.is_empty() { 0 } else { data_off as u32 });
        assert_eq!(out.len(), HEADER_SIZE);

        for &off in &string_data_off {
            push_u32(&mut out, off);
        }
        for &descriptor_idx in &self.types {
            push_u32(&mut out, descriptor_idx);
        }
        for (i, proto) in self.protos.iter().enumerate() {
            push_u32(&mut out, proto.shorty_idx);
            push_u16(&mut out, proto.return_type_idx);
            push_u16(&mut out, 0);
            push_u32(&mut out, proto_params_off[i]);
        }
        for &(class_idx, type_idx, name_idx) in &self.fields {
            push_u16(&mut out, class_idx);
            push_u16(&mut out, type_idx);
            push_u32(&mut out, name_idx);
        }
        for &(class_idx, proto_idx, name_idx) in &self.methods {
            push_u16(&mut out, class_idx);
            push_u16(&mut out, proto_idx);
            push_u32(&mut out, name_idx);
        }
        for (ci, class) in self.classes.iter().enumerate() {
            push_u16(&mut out, class.class_idx);
            push_u16(&mut out, 0);
            push_u32(&mut out, class.access_flags);
            push_u16(&mut out, class.superclass_idx);
            push_u16(&mut out, 0);
            push_u32(&mut out, interfaces_off[ci]);
            push_u32(&mut out, class.source_file_idx);
            push_u32(&mut out, annotations_off[ci]);
            push_u32(&mut out, class_data_off[ci]);
            push_u32(&mut out, static_values_off[ci]);
        }
        assert_eq!(out.len(), data_off);
        out.extend_from_slice(&data);
        assert_eq!(out.len(), file_size);

        let signature: [u8; 20] = Sha1::digest(&out[32..]).into();
        out[12..32].copy_from_slice(&signature);
        let checksum = adler32::adler32(&out[12..]).unwrap();
        out[8..12].copy_from_slice(&checksum.to_le_bytes());
        out
    }
}

pub fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn push_uleb(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn push_table(out: &mut Vec<u8>, count: usize, offset: usize) {
    push_u32(out, count as u32);
    push_u32(out, if count == 0 { 0 } else { offset as u32 });
}

fn align4(data: &mut Vec<u8>) {
    while data.len() % 4 != 0 {
        data.push(0);
    }
}

/// Writes `items` followed by the annotation_set_item addressing them.
/// Returns the set's file offset, or 0 for an empty set.
fn write_annotation_set(data: &mut Vec<u8>, data_off: usize, items: &[Vec<u8>]) -> u32 {
    if items.is_empty() {
        return 0;
    }
    let item_offs: Vec<u32> = items
        .iter()
        .map(|item| {
            let off = (data_off + data.len()) as u32;
            data.extend_from_slice(item);
            off
        })
        .collect();
    align4(data);
    let set_off = (data_off + data.len()) as u32;
    push_u32(data, item_offs.len() as u32);
    for off in item_offs {
        push_u32(data, off);
    }
    set_off
}

/// Fixes up the checksum and signature after a test mutated image bytes.
pub fn reseal(image: &mut [u8]) {
    let signature: [u8; 20] = Sha1::digest(&image[32..]).into();
    image[12..32].copy_from_slice(&signature);
    let checksum = adler32::adler32(&image[12..]).unwrap();
    image[8..12].copy_from_slice(&checksum.to_le_bytes());
}
