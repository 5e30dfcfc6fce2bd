use crate::{dex_err, error::DexError, leb128, Result};

use super::{
    CatchHandlerData, CodeItem, DexContainer, DexFile, TryItem, TypeIndex,
    DEX_NO_INDEX_16,
};

// ----------------------------------------------------------------------------
// CodeItemAccessor
// ----------------------------------------------------------------------------
/// A code item together with its resolved instruction array.
#[derive(Debug, Clone)]
pub struct CodeItemAccessor<'a> {
    /// file offset of the instruction array
    code_off: u32,
    code_item: &'a CodeItem,
    insns: &'a [u16],
}

impl<'a> CodeItemAccessor<'a> {
    pub fn from_code_item<C>(
        dex: &DexFile<'a, C>,
        code_item: &'a CodeItem,
        code_off: u32,
    ) -> Result<CodeItemAccessor<'a>>
    where
        C: DexContainer<'a>,
    {
        let insns = match code_item.insns_size {
            0 => &[],
            size => dex.get_insns_raw(code_off, size)?,
        };
        Ok(CodeItemAccessor {
            code_off,
            code_item,
            insns,
        })
    }

    #[inline]
    pub fn insns_size_in_code_units(&self) -> u32 {
        self.insns.len() as u32
    }

    #[inline]
    pub fn insns_size_in_bytes(&self) -> u32 {
        self.insns.len() as u32 * 2
    }

    #[inline(always)]
    pub fn insns(&self) -> &'a [u16] {
        self.insns
    }

    #[inline]
    pub fn has_code(&self) -> bool {
        !self.insns.is_empty()
    }

    /// File offset of the instruction array.
    pub fn insns_off(&self) -> u32 {
        self.code_off
    }

    /// File offset of the code item itself.
    pub fn code_item_off(&self) -> u32 {
        self.code_off - std::mem::size_of::<CodeItem>() as u32
    }

    pub fn code_item(&self) -> &'a CodeItem {
        self.code_item
    }

    pub fn registers_size(&self) -> u16 {
        self.code_item.registers_size
    }

    pub fn ins_size(&self) -> u16 {
        self.code_item.ins_size
    }

    pub fn outs_size(&self) -> u16 {
        self.code_item.outs_size
    }

    pub fn tries_size(&self) -> u16 {
        self.code_item.tries_size
    }

    pub fn debug_info_off(&self) -> u32 {
        self.code_item.debug_info_off
    }

    /// Offset of the try_item table relative to the instruction array: the
    /// end of the instructions rounded up to 4-byte alignment. `None` when
    /// the code has no tries.
    #[inline]
    pub fn get_tries_off(&self) -> Option<usize> {
        if self.tries_size() == 0 {
            return None;
        }

        let offset = self.insns_size_in_bytes() as usize;
        let padding = if self.insns.len() % 2 == 1 { 2 } else { 0 };
        Some(offset + padding)
    }

    #[inline]
    pub fn get_tries_abs_off(&self) -> Option<usize> {
        self.get_tries_off()
            .map(|tries_off| tries_off + self.insns_off() as usize)
    }

    /// Offset of the encoded_catch_handler_list relative to the instruction
    /// array; the handler data directly follows the try_item table.
    #[inline]
    pub fn get_catch_handler_data_off(&self) -> Option<usize> {
        self.get_tries_off()
            .map(|tries_off| tries_off + self.tries_size() as usize * std::mem::size_of::<TryItem>())
    }

    #[inline]
    pub fn get_catch_handler_data_abs_off(&self) -> Option<usize> {
        self.get_catch_handler_data_off()
            .map(|data_off| data_off + self.insns_off() as usize)
    }
}

impl<'a, C: DexContainer<'a>> DexFile<'a, C> {
    /// The try_item table of a code item; empty when it has no tries.
    pub fn get_try_items(&self, accessor: &CodeItemAccessor<'a>) -> Result<&'a [TryItem]> {
        match accessor.get_tries_abs_off() {
            None => Ok(&[]),
            Some(tries_off) => {
                check_lt_result!(tries_off, self.file_size(), "TryItem");
                self.non_null_array_data_ptr(tries_off as u32, accessor.tries_size() as usize)
            }
        }
    }

    /// Catch handler bytes at `offset` within the code item's
    /// encoded_catch_handler_list.
    pub fn get_catch_handler_data(
        &self,
        accessor: &CodeItemAccessor<'a>,
        offset: u32,
    ) -> Result<&'a [u8]> {
        let Some(base) = accessor.get_catch_handler_data_abs_off() else {
            return dex_err!(DexLayoutError, self, accessor.insns_off(), "catch handler data", 0);
        };
        let start = base + offset as usize;
        check_lt_result!(start, self.file_size(), "catch handler data");
        Ok(&self.image_bytes()[start..])
    }

    /// Linear scan over the try items for the first range covering
    /// `address`. Returns the handler offset, or -1 when no try covers it.
    pub fn find_catch_handler_offset(
        &self,
        accessor: &CodeItemAccessor<'a>,
        address: u32,
    ) -> Result<i32> {
        for try_item in self.get_try_items(accessor)? {
            let start = try_item.start_addr;
            if address >= start && address - start < try_item.insn_count as u32 {
                return Ok(try_item.handler_off as i32);
            }
        }
        Ok(-1)
    }

    /// Iterator over the handlers covering `address`, or `None` when no try
    /// range contains it.
    pub fn get_catch_handler_iterator(
        &self,
        accessor: &CodeItemAccessor<'a>,
        address: u32,
    ) -> Result<Option<EncodedCatchHandlerIterator<'a>>> {
        let offset = self.find_catch_handler_offset(accessor, address)?;
        if offset < 0 {
            return Ok(None);
        }
        let data = self.get_catch_handler_data(accessor, offset as u32)?;
        Ok(Some(EncodedCatchHandlerIterator::new(data)?))
    }
}

// ----------------------------------------------------------------------------
// EncodedCatchHandler Iterator
// ----------------------------------------------------------------------------
/// Decodes one encoded_catch_handler: a signed size, that many typed
/// handlers, and a trailing catch-all when the size was non-positive.
pub struct EncodedCatchHandlerIterator<'a> {
    data: &'a [u8],
    offset: usize,
    has_catch_all: bool,
    /// typed handlers not yet read; -1 is the terminal state
    remaining: i32,
}

impl<'a> EncodedCatchHandlerIterator<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut pos = 0;
        let size = leb128::decode_sleb128_off(data, &mut pos)?;
        // A non-positive size is the negative of the typed handler count,
        // and the handlers are followed by one catch-all.
        Ok(Self {
            data,
            offset: pos,
            has_catch_all: size <= 0,
            remaining: size.saturating_abs(),
        })
    }

    fn leb128(&mut self) -> Option<u32> {
        leb128::decode_leb128_off(self.data, &mut self.offset).ok()
    }
}

impl<'a> Iterator for EncodedCatchHandlerIterator<'a> {
    type Item = CatchHandlerData;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == -1 && !self.has_catch_all {
            return None;
        }

        let mut handler = CatchHandlerData::default();
        if self.remaining > 0 {
            handler.type_idx = self.leb128()? as TypeIndex;
            handler.address = self.leb128()?;
            self.remaining -= 1;
            return Some(handler);
        }

        self.remaining = -1;
        if self.has_catch_all {
            handler.is_catch_all = true;
            handler.type_idx = DEX_NO_INDEX_16;
            handler.address = self.leb128()?;
            self.has_catch_all = false;
            return Some(handler);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_all_only() {
        // size 0: no typed handlers, one catch-all at address 5
        let handlers: Vec<_> = EncodedCatchHandlerIterator::new(&[0x00, 0x05])
            .unwrap()
            .collect();
        assert_eq!(handlers.len(), 1);
        assert!(handlers[0].is_catch_all);
        assert_eq!(handlers[0].type_idx, DEX_NO_INDEX_16);
        assert_eq!(handlers[0].address, 5);
    }

    #[test]
    fn test_typed_handlers_without_catch_all() {
        // size 2: two (type_idx, address) pairs
        let handlers: Vec<_> = EncodedCatchHandlerIterator::new(&[0x02, 0x01, 0x0A, 0x03, 0x10])
            .unwrap()
            .collect();
        assert_eq!(handlers.len(), 2);
        assert_eq!((handlers[0].type_idx, handlers[0].address), (1, 10));
        assert_eq!((handlers[1].type_idx, handlers[1].address), (3, 16));
        assert!(handlers.iter().all(|handler| !handler.is_catch_all));
    }

    #[test]
    fn test_typed_handler_with_catch_all() {
        // size -1: one typed handler, then a catch-all
        let handlers: Vec<_> = EncodedCatchHandlerIterator::new(&[0x7F, 0x02, 0x04, 0x08])
            .unwrap()
            .collect();
        assert_eq!(handlers.len(), 2);
        assert!(!handlers[0].is_catch_all);
        assert_eq!((handlers[0].type_idx, handlers[0].address), (2, 4));
        assert!(handlers[1].is_catch_all);
        assert_eq!(handlers[1].address, 8);
    }

    #[test]
    fn test_iterator_is_fused_after_end() {
        let mut iter = EncodedCatchHandlerIterator::new(&[0x01, 0x01, 0x02]).unwrap();
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }
}
