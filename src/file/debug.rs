//! Debug info: a small bytecode stream per code item encoding source
//! positions and local variable lifetimes. A linear state machine walks the
//! stream and reports events through caller-supplied callbacks.

use crate::{
    dex_err,
    error::DexError,
    leb128::{decode_leb128_off, decode_leb128p1_off, decode_sleb128_off},
    Result,
};

use super::{
    CodeItem, CodeItemAccessor, DexContainer, DexFile, TypeIndex, DEX_NO_INDEX,
};

#[rustfmt::skip]
pub mod code {
    pub const DBG_END_SEQUENCE: u8         = 0x00;
    pub const DBG_ADVANCE_PC: u8           = 0x01;
    pub const DBG_ADVANCE_LINE: u8         = 0x02;
    pub const DBG_START_LOCAL: u8          = 0x03;
    pub const DBG_START_LOCAL_EXTENDED: u8 = 0x04;
    pub const DBG_END_LOCAL: u8            = 0x05;
    pub const DBG_RESTART_LOCAL: u8        = 0x06;
    pub const DBG_SET_PROLOGUE_END: u8     = 0x07;
    pub const DBG_SET_EPILOGUE_BEGIN: u8   = 0x08;
    pub const DBG_SET_FILE: u8             = 0x09;

    pub const DBG_FIRST_SPECIAL: u8        = 0x0A;
    pub const DBG_LINE_BASE: i32           = -4;
    pub const DBG_LINE_RANGE: u32          = 15;
}

/// Source file a position refers to: the class' own file unless a
/// `DBG_SET_FILE` opcode switched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFile {
    This,
    Other(u32), // string index of the file name
}

/// One entry of the positions table, handed to the position callback.
#[derive(Debug, Clone)]
pub struct PositionInfo {
    pub address: u32,
    pub line: u32,
    pub file: SourceFile,
    pub prologue_end: bool,
    pub epilogue_begin: bool,
}

impl PositionInfo {
    fn new(line_start: u32) -> Self {
        Self {
            address: 0,
            line: line_start,
            file: SourceFile::This,
            prologue_end: false,
            epilogue_begin: false,
        }
    }
}

/// One local variable lifetime, handed to the local callback when the
/// variable goes out of scope. `name` and `descriptor` stay `None` when the
/// stream carried no-index sentinels; an absent signature is the empty
/// string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInfo {
    pub reg: u32,
    pub start_address: u32,
    pub end_address: u32,
    pub name: Option<String>,
    pub descriptor: Option<String>,
    pub signature: String,
}

/// Per-register decoder slot.
#[derive(Debug, Default, Clone)]
struct LocalSlot {
    name: Option<String>,
    descriptor: Option<String>,
    signature: Option<String>,
    start_address: u32,
    is_live: bool,
}

fn emit_if_live<F>(slot: &LocalSlot, reg: u32, end_address: u32, local_cb: &mut F)
where
    F: FnMut(&LocalInfo),
{
    if slot.is_live {
        local_cb(&LocalInfo {
            reg,
            start_address: slot.start_address,
            end_address,
            name: slot.name.clone(),
            descriptor: slot.descriptor.clone(),
            signature: slot.signature.clone().unwrap_or_default(),
        });
    }
}

/// Iterates the ULEB128p1-encoded parameter name indices of a debug info
/// stream header.
pub struct DebugInfoParameterNamesIterator<'a> {
    stream: &'a [u8],
    offset: usize,
    idx: usize,
    size: usize,
}

impl<'a> DebugInfoParameterNamesIterator<'a> {
    pub fn new(stream: &'a [u8]) -> Result<Self> {
        let mut offset = 0;
        let _line_start = decode_leb128_off(stream, &mut offset)?;
        let size = decode_leb128_off(stream, &mut offset)? as usize;
        Ok(Self {
            stream,
            offset,
            idx: 0,
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Iterator for DebugInfoParameterNamesIterator<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.idx >= self.size {
            return None;
        }
        self.idx += 1;
        decode_leb128p1_off(self.stream, &mut self.offset).ok()
    }
}

impl<'a, C: DexContainer<'a>> DexFile<'a, C> {
    /// The raw debug info stream of a code item, or `None` when the method
    /// was compiled without debug data.
    pub fn get_debug_info_stream(&self, code_item: &CodeItem) -> Result<Option<&'a [u8]>> {
        match code_item.debug_info_off {
            0 => Ok(None),
            offset => {
                check_lt_result!(offset, self.file_size(), "debug info offset");
                Ok(Some(&self.image_bytes()[offset as usize..]))
            }
        }
    }

    /// Iterator over the parameter name string indices declared in the
    /// debug info header; no-index entries yield `DEX_NO_INDEX`.
    pub fn get_parameter_names_iterator(
        &self,
        code_item: &CodeItem,
    ) -> Result<Option<DebugInfoParameterNamesIterator<'a>>> {
        match self.get_debug_info_stream(code_item)? {
            None => Ok(None),
            Some(stream) => Ok(Some(DebugInfoParameterNamesIterator::new(stream)?)),
        }
    }

    /// Walks the positions table, invoking `position_cb` for every entry.
    /// The callback returns true to stop the walk early.
    pub fn decode_position_info<F>(&self, code_item: &CodeItem, mut position_cb: F) -> Result<()>
    where
        F: FnMut(&PositionInfo) -> bool,
    {
        use code::*;

        let Some(stream) = self.get_debug_info_stream(code_item)? else {
            return Ok(());
        };

        let mut offset = 0;
        let line_start = decode_leb128_off(stream, &mut offset)?;
        let parameters_size = decode_leb128_off(stream, &mut offset)?;
        for _ in 0..parameters_size {
            decode_leb128p1_off(stream, &mut offset)?;
        }

        let mut entry = PositionInfo::new(line_start);
        loop {
            let Some(&opcode) = stream.get(offset) else {
                return dex_err!(BadDebugInfo { offset });
            };
            offset += 1;

            match opcode {
                DBG_END_SEQUENCE => break,
                DBG_ADVANCE_PC => {
                    entry.address =
                        entry.address.wrapping_add(decode_leb128_off(stream, &mut offset)?);
                }
                DBG_ADVANCE_LINE => {
                    entry.line = entry
                        .line
                        .wrapping_add(decode_sleb128_off(stream, &mut offset)? as u32);
                }
                DBG_START_LOCAL => {
                    decode_leb128_off(stream, &mut offset)?; // register
                    decode_leb128p1_off(stream, &mut offset)?; // name
                    decode_leb128p1_off(stream, &mut offset)?; // descriptor
                }
                DBG_START_LOCAL_EXTENDED => {
                    decode_leb128_off(stream, &mut offset)?; // register
                    decode_leb128p1_off(stream, &mut offset)?; // name
                    decode_leb128p1_off(stream, &mut offset)?; // descriptor
                    decode_leb128p1_off(stream, &mut offset)?; // signature
                }
                DBG_END_LOCAL | DBG_RESTART_LOCAL => {
                    decode_leb128_off(stream, &mut offset)?; // register
                }
                DBG_SET_PROLOGUE_END => entry.prologue_end = true,
                DBG_SET_EPILOGUE_BEGIN => entry.epilogue_begin = true,
                DBG_SET_FILE => {
                    entry.file = SourceFile::Other(decode_leb128p1_off(stream, &mut offset)?);
                }
                _ => {
                    let adjusted = (opcode - DBG_FIRST_SPECIAL) as u32;
                    entry.address = entry.address.wrapping_add(adjusted / DBG_LINE_RANGE);
                    entry.line = entry
                        .line
                        .wrapping_add((DBG_LINE_BASE + (adjusted % DBG_LINE_RANGE) as i32) as u32);
                    let stop = position_cb(&entry);
                    entry.prologue_end = false;
                    entry.epilogue_begin = false;
                    if stop {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Walks the local variable lifetimes of a method, invoking `local_cb`
    /// once per lifetime as it closes. The implicit `this` argument (for
    /// non-static methods) and the declared parameters become live at
    /// address 0; wide parameters occupy two registers.
    pub fn decode_local_info<F>(
        &self,
        accessor: &CodeItemAccessor<'a>,
        is_static: bool,
        method_idx: u32,
        mut local_cb: F,
    ) -> Result<()>
    where
        F: FnMut(&LocalInfo),
    {
        use code::*;

        let Some(stream) = self.get_debug_info_stream(accessor.code_item())? else {
            return Ok(());
        };

        let registers_size = accessor.registers_size() as u32;
        let ins_size = accessor.ins_size() as u32;
        if ins_size > registers_size {
            return dex_err!(BadLocalRegister {
                register: ins_size,
                registers_size
            });
        }

        let mut slots: Vec<LocalSlot> = vec![LocalSlot::default(); registers_size as usize];
        let mut offset = 0;
        let _line_start = decode_leb128_off(stream, &mut offset)?;
        let parameters_size = decode_leb128_off(stream, &mut offset)?;

        let method_id = self.get_method_id(method_idx)?;
        let mut arg_reg = registers_size - ins_size;

        if !is_static {
            if arg_reg >= registers_size {
                return dex_err!(BadLocalRegister {
                    register: arg_reg,
                    registers_size
                });
            }
            slots[arg_reg as usize] = LocalSlot {
                name: Some("this".to_string()),
                descriptor: Some(self.get_type_desc_utf16_lossy_at(method_id.class_idx)?),
                signature: None,
                start_address: 0,
                is_live: true,
            };
            arg_reg += 1;
        }

        let proto_id = self.get_proto_id(method_id.proto_idx)?;
        let params = self.get_proto_parameters(proto_id)?.unwrap_or(&[]);
        let mut param_iter = params.iter();
        // The header stores exactly parameters_size names; consume them all
        // even when the count disagrees with the prototype.
        for i in 0..parameters_size.max(params.len() as u32) {
            let name_idx = if i < parameters_size {
                decode_leb128p1_off(stream, &mut offset)?
            } else {
                DEX_NO_INDEX
            };
            let Some(item) = param_iter.next() else {
                continue;
            };
            if arg_reg >= registers_size {
                return dex_err!(BadLocalRegister {
                    register: arg_reg,
                    registers_size
                });
            }
            let descriptor = self.get_type_desc_utf16_lossy_at(item.type_idx)?;
            let is_wide = matches!(descriptor.as_bytes().first(), Some(b'J') | Some(b'D'));
            slots[arg_reg as usize] = LocalSlot {
                name: self.string_by_idx(name_idx)?,
                descriptor: Some(descriptor),
                signature: None,
                start_address: 0,
                is_live: true,
            };
            arg_reg += if is_wide { 2 } else { 1 };
        }

        let mut address = 0u32;
        loop {
            let Some(&opcode) = stream.get(offset) else {
                return dex_err!(BadDebugInfo { offset });
            };
            offset += 1;

            match opcode {
                DBG_END_SEQUENCE => break,
                DBG_ADVANCE_PC => {
                    address = address.wrapping_add(decode_leb128_off(stream, &mut offset)?);
                }
                DBG_ADVANCE_LINE => {
                    decode_sleb128_off(stream, &mut offset)?;
                }
                DBG_START_LOCAL | DBG_START_LOCAL_EXTENDED => {
                    let reg = decode_leb128_off(stream, &mut offset)?;
                    let name_idx = decode_leb128p1_off(stream, &mut offset)?;
                    let type_idx = decode_leb128p1_off(stream, &mut offset)?;
                    let signature_idx = if opcode == DBG_START_LOCAL_EXTENDED {
                        decode_leb128p1_off(stream, &mut offset)?
                    } else {
                        DEX_NO_INDEX
                    };
                    if reg >= registers_size {
                        return dex_err!(BadLocalRegister {
                            register: reg,
                            registers_size
                        });
                    }

                    // a new local in an occupied slot ends the previous one
                    emit_if_live(&slots[reg as usize], reg, address, &mut local_cb);
                    slots[reg as usize] = LocalSlot {
                        name: self.string_by_idx(name_idx)?,
                        descriptor: self.type_desc_by_idx(type_idx)?,
                        signature: self.string_by_idx(signature_idx)?,
                        start_address: address,
                        is_live: true,
                    };
                }
                DBG_END_LOCAL => {
                    let reg = decode_leb128_off(stream, &mut offset)?;
                    if reg >= registers_size {
                        return dex_err!(BadLocalRegister {
                            register: reg,
                            registers_size
                        });
                    }
                    emit_if_live(&slots[reg as usize], reg, address, &mut local_cb);
                    // descriptors stay in place for a later restart
                    slots[reg as usize].is_live = false;
                }
                DBG_RESTART_LOCAL => {
                    let reg = decode_leb128_off(stream, &mut offset)?;
                    if reg >= registers_size {
                        return dex_err!(BadLocalRegister {
                            register: reg,
                            registers_size
                        });
                    }
                    let slot = &mut slots[reg as usize];
                    if !slot.is_live {
                        slot.start_address = address;
                        slot.is_live = true;
                    }
                }
                DBG_SET_PROLOGUE_END | DBG_SET_EPILOGUE_BEGIN => {}
                DBG_SET_FILE => {
                    decode_leb128p1_off(stream, &mut offset)?;
                }
                _ => {
                    let adjusted = (opcode - DBG_FIRST_SPECIAL) as u32;
                    address = address.wrapping_add(adjusted / DBG_LINE_RANGE);
                }
            }
        }

        // locals still live at the end of the sequence close here
        for (reg, slot) in slots.iter().enumerate() {
            emit_if_live(slot, reg as u32, address, &mut local_cb);
        }
        Ok(())
    }

    /// Source line for the instruction at `rel_pc` (in code units from the
    /// start of the method). Returns -1 when no debug info matches and -2
    /// for native methods (no code item).
    pub fn get_line_num_from_pc(
        &self,
        code_item: Option<&CodeItem>,
        rel_pc: u32,
    ) -> Result<i32> {
        // native or abstract methods have no code item and no line table
        let Some(code_item) = code_item else {
            return Ok(-2);
        };
        if code_item.debug_info_off == 0 {
            return Ok(-1);
        }

        let mut line = -1i32;
        self.decode_position_info(code_item, |entry| {
            if entry.address > rel_pc {
                return true;
            }
            line = entry.line as i32;
            false
        })?;
        Ok(line)
    }

    fn type_desc_by_idx(&self, idx: u32) -> Result<Option<String>> {
        if idx == DEX_NO_INDEX {
            return Ok(None);
        }
        check_lt_result!(idx, self.num_type_ids(), "TypeId");
        Ok(Some(self.get_type_desc_utf16_lossy_at(idx as TypeIndex)?))
    }
}
