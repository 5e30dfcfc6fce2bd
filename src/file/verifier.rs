use sha1::{Digest, Sha1};

use crate::{dex_err, error::DexError, Result};

use super::{
    DexContainer, DexFile, Header, StringIndex, DEX_ENDIAN_CONSTANT, DEX_INDEX_16_LIMIT,
    DEX_MAGIC, DEX_NO_INDEX, DEX_NO_INDEX_16,
};

pub enum VerifyPreset {
    /// No verification beyond the structural checks every open performs.
    None,
    /// Walk every table and validate all embedded indices and offsets.
    Structure,
    /// Adler32 checksum only.
    ChecksumOnly,
    /// Structure walk plus checksum and SHA-1 signature.
    All,
}

impl<'a, C: DexContainer<'a>> DexFile<'a, C> {
    pub fn is_magic_valid(&self) -> bool {
        &self.header.get_magic()[..4] == DEX_MAGIC
    }

    /// The version bytes must be three ASCII digits plus a NUL terminator.
    /// Any numeric version is accepted.
    pub fn is_version_valid(&self) -> bool {
        let version_raw = &self.header.get_magic()[4..];
        version_raw[..3].iter().all(u8::is_ascii_digit) && version_raw[3] == 0
    }

    pub fn verify(dex: &DexFile<'a, C>, preset: VerifyPreset) -> Result<()> {
        match preset {
            VerifyPreset::None => Ok(()),
            VerifyPreset::Structure => check_tables(dex),
            VerifyPreset::ChecksumOnly => check_checksum(dex),
            VerifyPreset::All => {
                check_checksum(dex)?;
                check_signature(dex)?;
                check_tables(dex)
            }
        }
    }

    /// Adler32 over everything after the magic and checksum fields.
    pub fn calculate_checksum(&self) -> Result<u32> {
        let end = (self.header.file_size as usize).min(self.file_size());
        Ok(adler32::adler32(&self.image_bytes()[12..end])?)
    }

    /// SHA-1 over everything after the signature field.
    pub fn calculate_signature(&self) -> [u8; 20] {
        let end = (self.header.file_size as usize).min(self.file_size());
        let mut hasher = Sha1::new();
        hasher.update(&self.image_bytes()[32..end]);
        hasher.finalize().into()
    }
}

/// Header checks run by every open: magic, version, endian tag, sizes, and
/// the bounds and alignment of each fixed table.
pub(crate) fn check_header_structure<'a, C>(dex: &DexFile<'a, C>) -> Result<()>
where
    C: DexContainer<'a>,
{
    let size = dex.file_size();
    if size < std::mem::size_of::<Header>() {
        return dex_err!(TruncatedFile);
    }

    if !dex.is_magic_valid() {
        return dex_err!(BadFileMagic);
    }

    if !dex.is_version_valid() {
        return dex_err!(UnknownDexVersion {
            version: dex.header.get_version()
        });
    }

    let header = dex.header;
    let header_size = std::mem::size_of::<Header>() as u32;
    if header.header_size < header_size {
        return dex_err!(BadHeaderSize {
            size: header.header_size,
            expected: header_size
        });
    }

    let file_size = header.file_size as usize;
    if file_size < header_size as usize {
        return dex_err!(FileSizeAtLeast {
            actual: file_size,
            expected: header_size as usize
        });
    }
    if file_size > size {
        return dex_err!(FileSizeAtMost {
            actual: file_size,
            expected: size
        });
    }

    if header.endian_tag != DEX_ENDIAN_CONSTANT {
        return dex_err!(UnexpectedEndianess, header.endian_tag);
    }

    if header.type_ids_size > DEX_INDEX_16_LIMIT {
        return dex_err!(TooManyItems {
            size: header.type_ids_size,
            max: DEX_INDEX_16_LIMIT,
            section: "type-ids"
        });
    }
    if header.proto_ids_size > DEX_INDEX_16_LIMIT {
        return dex_err!(TooManyItems {
            size: header.proto_ids_size,
            max: DEX_INDEX_16_LIMIT,
            section: "proto-ids"
        });
    }

    check_section(
        dex,
        header.string_ids_off,
        record_bytes::<super::StringId>(header.string_ids_size),
        true,
        "string-ids",
    )?;
    check_section(
        dex,
        header.type_ids_off,
        record_bytes::<super::TypeId>(header.type_ids_size),
        true,
        "type-ids",
    )?;
    check_section(
        dex,
        header.proto_ids_off,
        record_bytes::<super::ProtoId>(header.proto_ids_size),
        true,
        "proto-ids",
    )?;
    check_section(
        dex,
        header.field_ids_off,
        record_bytes::<super::FieldId>(header.field_ids_size),
        true,
        "field-ids",
    )?;
    check_section(
        dex,
        header.method_ids_off,
        record_bytes::<super::MethodId>(header.method_ids_size),
        true,
        "method-ids",
    )?;
    check_section(
        dex,
        header.class_defs_off,
        record_bytes::<super::ClassDef>(header.class_defs_size),
        true,
        "class-defs",
    )?;
    check_section(dex, header.link_off, header.link_size as u64, false, "link")?;
    check_section(dex, header.data_off, header.data_size as u64, false, "data")?;
    if header.map_off != 0 {
        check_section(dex, header.map_off, std::mem::size_of::<u32>() as u64, true, "map")?;
    }
    Ok(())
}

#[inline]
fn record_bytes<T>(count: u32) -> u64 {
    count as u64 * std::mem::size_of::<T>() as u64
}

fn check_section<'a, C>(
    dex: &DexFile<'a, C>,
    offset: u32,
    byte_size: u64,
    require_alignment: bool,
    label: &'static str,
) -> Result<()>
where
    C: DexContainer<'a>,
{
    if byte_size == 0 {
        if offset != 0 {
            return dex_err!(BadOffsetNoSize {
                offset,
                section: label
            });
        }
        return Ok(());
    }

    let file_size = dex.file_size();
    let header_offset = std::mem::size_of::<Header>() as u32;
    if offset < header_offset {
        return dex_err!(BadOffsetInHeader {
            offset,
            header_size: header_offset as usize,
            section: label
        });
    }
    if offset as usize > file_size {
        return dex_err!(BadOffsetTooLarge {
            offset,
            size: file_size,
            section: label
        });
    }
    if require_alignment && offset % 4 != 0 {
        return dex_err!(BadAlignment {
            offset,
            section: label
        });
    }

    let end = offset as u64 + byte_size;
    if end > file_size as u64 {
        return dex_err!(BadSection {
            offset: end.min(u32::MAX as u64) as u32,
            size: file_size,
            section: label
        });
    }
    Ok(())
}

fn check_checksum<'a, C>(dex: &DexFile<'a, C>) -> Result<()>
where
    C: DexContainer<'a>,
{
    let checksum = dex.calculate_checksum()?;
    if checksum != dex.header.checksum {
        return dex_err!(BadChecksum {
            actual: checksum,
            expected: dex.header.checksum
        });
    }
    Ok(())
}

fn check_signature<'a, C>(dex: &DexFile<'a, C>) -> Result<()>
where
    C: DexContainer<'a>,
{
    let signature = dex.calculate_signature();
    if &signature != dex.header.get_signature() {
        return dex_err!(BadSignature {
            actual: hex(&signature),
            expected: hex(dex.header.get_signature())
        });
    }
    Ok(())
}

/// Walks every table verifying that each embedded index lies within its
/// target table and that every referenced offset resolves.
fn check_tables<'a, C>(dex: &DexFile<'a, C>) -> Result<()>
where
    C: DexContainer<'a>,
{
    for string_id in dex.string_ids {
        dex.get_string_data(string_id)?;
    }

    for type_id in dex.type_ids {
        check_index(type_id.descriptor_idx, dex.num_string_ids(), "StringId")?;
    }

    for proto_id in dex.proto_ids {
        check_index(proto_id.shorty_idx, dex.num_string_ids(), "StringId")?;
        check_index(proto_id.return_type_idx as u32, dex.num_type_ids(), "TypeId")?;
        if let Some(params) = dex.get_proto_parameters(proto_id)? {
            for item in params {
                check_index(item.type_idx as u32, dex.num_type_ids(), "TypeId")?;
            }
        }
    }

    for field_id in dex.field_ids {
        check_index(field_id.class_idx as u32, dex.num_type_ids(), "TypeId")?;
        check_index(field_id.type_idx as u32, dex.num_type_ids(), "TypeId")?;
        check_index(field_id.name_idx, dex.num_string_ids(), "StringId")?;
    }

    for method_id in dex.method_ids {
        check_index(method_id.class_idx as u32, dex.num_type_ids(), "TypeId")?;
        check_index(method_id.proto_idx as u32, dex.num_proto_ids(), "ProtoId")?;
        check_index(method_id.name_idx, dex.num_string_ids(), "StringId")?;
    }

    for class_def in dex.class_defs {
        check_index(class_def.class_idx as u32, dex.num_type_ids(), "TypeId")?;
        if class_def.superclass_idx != DEX_NO_INDEX_16 {
            check_index(class_def.superclass_idx as u32, dex.num_type_ids(), "TypeId")?;
        }
        if class_def.source_file_idx != DEX_NO_INDEX {
            check_index(
                class_def.source_file_idx as StringIndex,
                dex.num_string_ids(),
                "StringId",
            )?;
        }
        dex.get_interfaces_list(class_def)?;
        check_data_offset(dex, class_def.annotations_off, "annotations offset")?;
        check_data_offset(dex, class_def.class_data_off, "class data offset")?;
        check_data_offset(dex, class_def.static_values_off, "static values offset")?;
    }
    Ok(())
}

#[inline]
fn check_index(index: u32, max: u32, item_ty: &'static str) -> Result<()> {
    if index >= max {
        return dex_err!(DexIndexError {
            index,
            item_ty,
            max: max as usize,
        });
    }
    Ok(())
}

#[inline]
fn check_data_offset<'a, C>(dex: &DexFile<'a, C>, offset: u32, label: &'static str) -> Result<()>
where
    C: DexContainer<'a>,
{
    if offset != 0 && offset as usize >= dex.file_size() {
        return dex_err!(BadOffsetTooLarge {
            offset,
            size: dex.file_size(),
            section: label
        });
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}
