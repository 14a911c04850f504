//! Flat byte store. Cells are two bytes, little-endian, with no alignment rule.
//!
//! Every access is bounds checked: the machine has no memory protection, but a
//! reach past the end becomes [`VmError::Address`] instead of wrapping.

use crate::errors::VmError;
use crate::image::Image;
use crate::MEMORY_SIZE;

#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    bytes: Box<[u8]>,
}

impl Memory {
    /// Zero-filled memory.
    pub fn new() -> Self {
        Self {
            bytes: vec![0; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    pub(crate) fn from_image(image: &Image) -> Self {
        Self {
            bytes: image.as_bytes().into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn span(&self, addr: u16, width: u8) -> Result<usize, VmError> {
        let start = addr as usize;
        if start + width as usize > self.bytes.len() {
            return Err(VmError::Address { addr, width });
        }
        Ok(start)
    }

    pub fn read_byte(&self, addr: u16) -> Result<u8, VmError> {
        let at = self.span(addr, 1)?;
        Ok(self.bytes[at])
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), VmError> {
        let at = self.span(addr, 1)?;
        self.bytes[at] = value;
        Ok(())
    }

    pub fn read_cell(&self, addr: u16) -> Result<u16, VmError> {
        let at = self.span(addr, 2)?;
        Ok(u16::from_le_bytes([self.bytes[at], self.bytes[at + 1]]))
    }

    pub fn write_cell(&mut self, addr: u16, value: u16) -> Result<(), VmError> {
        let at = self.span(addr, 2)?;
        self.bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("size", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn cell_round_trip(addr in 0u16..(MEMORY_SIZE as u16 - 1), value in any::<u16>()) {
            let mut mem = Memory::new();
            mem.write_cell(addr, value).unwrap();
            prop_assert_eq!(mem.read_cell(addr).unwrap(), value);
        }
    }

    #[test]
    fn cells_are_little_endian() {
        let mut mem = Memory::new();
        mem.write_cell(0x200, 0xBEEF).unwrap();
        assert_eq!(mem.read_byte(0x200).unwrap(), 0xEF);
        assert_eq!(mem.read_byte(0x201).unwrap(), 0xBE);
    }

    #[test]
    fn unaligned_cells_are_allowed() {
        let mut mem = Memory::new();
        mem.write_cell(0x301, 0x1234).unwrap();
        assert_eq!(mem.read_cell(0x301).unwrap(), 0x1234);
        assert_eq!(mem.read_byte(0x301).unwrap(), 0x34);
    }

    #[test]
    fn last_byte_is_addressable_but_last_cell_straddles_the_end() {
        let mut mem = Memory::new();
        let last = MEMORY_SIZE as u16 - 1;
        mem.write_byte(last, 9).unwrap();
        assert_eq!(mem.read_byte(last).unwrap(), 9);

        let err = mem.read_cell(last).unwrap_err();
        assert!(matches!(err, VmError::Address { addr, width: 2 } if addr == last));
    }

    #[test]
    fn addresses_past_the_end_fault() {
        let mut mem = Memory::new();
        assert!(matches!(
            mem.write_byte(0x4000, 1),
            Err(VmError::Address { addr: 0x4000, width: 1 })
        ));
        assert!(mem.read_cell(0xFFFF).is_err());
    }
}
