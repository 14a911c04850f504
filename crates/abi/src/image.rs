//! Memory images: loading a dump from disk and building one in code.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::ops::Index;
use std::path::Path;

use tracing::debug;

use crate::errors::ImageError;
use crate::isa::Opcode;
use crate::vm::Registers;
use crate::{CELL, CODE_START, MEMORY_SIZE};

/// A full memory dump, exactly `MEMORY_SIZE` bytes. Cells 0..8 carry the
/// boot registers.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    bytes: Box<[u8]>,
}

impl Image {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < MEMORY_SIZE {
            return Err(ImageError::Short {
                expected: MEMORY_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes.len() > MEMORY_SIZE {
            return Err(ImageError::Oversized {
                expected: MEMORY_SIZE,
            });
        }
        Ok(Self {
            bytes: bytes.into(),
        })
    }

    pub fn from_reader(mut reader: impl Read) -> Result<Self, ImageError> {
        let mut bytes = Vec::with_capacity(MEMORY_SIZE);
        reader
            .by_ref()
            .take(MEMORY_SIZE as u64)
            .read_to_end(&mut bytes)?;
        if bytes.len() < MEMORY_SIZE {
            return Err(ImageError::Short {
                expected: MEMORY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut extra = [0u8; 1];
        if reader.read(&mut extra)? != 0 {
            return Err(ImageError::Oversized {
                expected: MEMORY_SIZE,
            });
        }
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let image = Self::from_reader(BufReader::new(File::open(path)?))?;
        debug!(path = %path.display(), boot = ?image.registers(), "image loaded");
        Ok(image)
    }

    pub(crate) fn from_memory(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Registers as stored in the boot block.
    pub fn registers(&self) -> Registers {
        Registers::from_boot_block(&self.bytes)
    }

    pub fn save(&self, mut writer: impl Write) -> Result<(), ImageError> {
        writer.write_all(&self.bytes)?;
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("boot", &self.registers())
            .finish()
    }
}

/// Code-field addresses of every primitive, as laid down by
/// [`ImageBuilder::primitives`].
#[derive(Debug, Clone, Copy)]
pub struct CodeTable {
    cfa: [u16; Opcode::COUNT as usize],
}

impl Index<Opcode> for CodeTable {
    type Output = u16;

    fn index(&self, op: Opcode) -> &u16 {
        &self.cfa[op.code() as usize]
    }
}

/// Lays cells down at a moving cursor, the way a dictionary grows.
///
/// Writes past the end of memory panic: a builder is a host-side tool and an
/// image that does not fit is a bug in the caller.
pub struct ImageBuilder {
    bytes: Vec<u8>,
    here: u16,
    registers: Registers,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self {
            bytes: vec![0; MEMORY_SIZE],
            here: CODE_START,
            registers: Registers::boot(CODE_START),
        }
    }

    pub fn here(&self) -> u16 {
        self.here
    }

    /// Writes a cell anywhere without moving the cursor.
    pub fn set_cell(&mut self, addr: u16, value: u16) -> &mut Self {
        let at = addr as usize;
        self.bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
        self
    }

    /// Appends one cell, returning its address.
    pub fn cell(&mut self, value: u16) -> u16 {
        let at = self.here;
        self.set_cell(at, value);
        self.here = at + CELL;
        at
    }

    pub fn cells(&mut self, values: &[u16]) -> u16 {
        let start = self.here;
        for &v in values {
            self.cell(v);
        }
        start
    }

    /// A code cell holding a primitive.
    pub fn code(&mut self, op: Opcode) -> u16 {
        self.cell(op.code())
    }

    /// One code cell per primitive, in opcode order.
    pub fn primitives(&mut self) -> CodeTable {
        let mut cfa = [0; Opcode::COUNT as usize];
        for op in Opcode::all() {
            cfa[op.code() as usize] = self.code(op);
        }
        CodeTable { cfa }
    }

    /// Starts a colon definition; the body follows at `here()`.
    pub fn begin_colon(&mut self) -> u16 {
        self.code(Opcode::DoList)
    }

    /// doLIST followed by `body`. Returns the code-field address.
    pub fn colon(&mut self, body: &[u16]) -> u16 {
        let cfa = self.begin_colon();
        self.cells(body);
        cfa
    }

    /// Sets PC so the first step runs the code cell at `cfa`.
    pub fn entry(&mut self, cfa: u16) -> &mut Self {
        self.registers.pc = cfa;
        self
    }

    pub fn boot(&mut self, registers: Registers) -> &mut Self {
        self.registers = registers;
        self
    }

    pub fn build(&self) -> Image {
        let mut bytes = self.bytes.clone();
        self.registers.write_boot_block(&mut bytes);
        Image::from_memory(bytes)
    }
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RPP, SPP};

    #[test]
    fn short_image_is_rejected() {
        let err = Image::from_bytes(&[0; 100]).unwrap_err();
        assert!(matches!(
            err,
            ImageError::Short { expected: MEMORY_SIZE, actual: 100 }
        ));

        let err = Image::from_reader(&[0u8; MEMORY_SIZE - 1][..]).unwrap_err();
        assert!(matches!(err, ImageError::Short { actual, .. } if actual == MEMORY_SIZE - 1));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let bytes = vec![0u8; MEMORY_SIZE + 1];
        assert!(matches!(
            Image::from_bytes(&bytes),
            Err(ImageError::Oversized { .. })
        ));
        assert!(matches!(
            Image::from_reader(&bytes[..]),
            Err(ImageError::Oversized { .. })
        ));
    }

    #[test]
    fn boot_block_is_read_little_endian() {
        let mut bytes = vec![0u8; MEMORY_SIZE];
        bytes[..8].copy_from_slice(&[0x00, 0x01, 0x34, 0x12, 0x60, 0x3F, 0xF0, 0x3F]);
        let image = Image::from_reader(&bytes[..]).unwrap();
        assert_eq!(
            image.registers(),
            Registers { pc: 0x100, ip: 0x1234, sp: 0x3F60, rp: 0x3FF0 }
        );
    }

    #[test]
    fn builder_lays_out_colon_definitions() {
        let mut b = ImageBuilder::new();
        let prims = b.primitives();
        assert_eq!(prims[Opcode::Halt], CODE_START);
        assert_eq!(prims[Opcode::DoList], CODE_START + 29 * CELL);

        let cfa = b.colon(&[prims[Opcode::Halt]]);
        b.entry(cfa);
        let image = b.build();

        let cell = |addr: u16| {
            let at = addr as usize;
            u16::from_le_bytes([image.as_bytes()[at], image.as_bytes()[at + 1]])
        };
        assert_eq!(cell(cfa), Opcode::DoList.code());
        assert_eq!(cell(cfa + CELL), prims[Opcode::Halt]);
        assert_eq!(image.registers(), Registers { pc: cfa, ip: 0, sp: SPP, rp: RPP });
    }

    #[test]
    fn saved_image_loads_back() {
        let mut b = ImageBuilder::new();
        b.cell(0xCAFE);
        let image = b.build();

        let mut file = Vec::new();
        image.save(&mut file).unwrap();
        assert_eq!(Image::from_bytes(&file).unwrap(), image);
    }
}
