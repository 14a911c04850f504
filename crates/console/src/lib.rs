// Console
// The only door between the machine and the outside world.
// KEY reads one byte, EMIT writes one byte. Nothing else crosses.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("console io: {0}")]
    Io(#[from] io::Error),
}

pub trait Console {
    /// Blocks until a byte is available. `None` means the input is exhausted.
    fn key(&mut self) -> Result<Option<u8>, ConsoleError>;
    fn emit(&mut self, byte: u8) -> Result<(), ConsoleError>;

    fn flush(&mut self) -> Result<(), ConsoleError> {
        Ok(())
    }
}

impl<C: Console + ?Sized> Console for &mut C {
    fn key(&mut self) -> Result<Option<u8>, ConsoleError> {
        (**self).key()
    }

    fn emit(&mut self, byte: u8) -> Result<(), ConsoleError> {
        (**self).emit(byte)
    }

    fn flush(&mut self) -> Result<(), ConsoleError> {
        (**self).flush()
    }
}

/// In-memory console: scripted input, captured output.
#[derive(Debug, Default, Clone)]
pub struct BufferConsole {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: impl AsRef<[u8]>) -> Self {
        Self {
            input: input.as_ref().iter().copied().collect(),
            output: Vec::new(),
        }
    }

    pub fn feed(&mut self, bytes: impl AsRef<[u8]>) {
        self.input.extend(bytes.as_ref());
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    pub fn into_output(self) -> Vec<u8> {
        self.output
    }
}

impl Console for BufferConsole {
    fn key(&mut self) -> Result<Option<u8>, ConsoleError> {
        Ok(self.input.pop_front())
    }

    fn emit(&mut self, byte: u8) -> Result<(), ConsoleError> {
        self.output.push(byte);
        Ok(())
    }
}

/// Console over any reader/writer pair, e.g. locked stdin/stdout.
/// Output is flushed at every newline and whenever the host asks.
pub struct StreamConsole<R, W> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> StreamConsole<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: Read, W: Write> Console for StreamConsole<R, W> {
    fn key(&mut self) -> Result<Option<u8>, ConsoleError> {
        // Prompt text written before KEY must be visible while we block.
        self.writer.flush()?;
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn emit(&mut self, byte: u8) -> Result<(), ConsoleError> {
        self.writer.write_all(&[byte])?;
        if byte == b'\n' {
            self.writer.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ConsoleError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_console_preserves_order() {
        let mut console = BufferConsole::with_input(b"ab");
        assert_eq!(console.key().unwrap(), Some(b'a'));
        assert_eq!(console.key().unwrap(), Some(b'b'));
        assert_eq!(console.key().unwrap(), None);

        console.emit(b'x').unwrap();
        console.emit(b'y').unwrap();
        assert_eq!(console.output(), b"xy");
    }

    #[test]
    fn feed_appends_after_existing_input() {
        let mut console = BufferConsole::with_input(b"1");
        console.feed(b"23");
        assert_eq!(console.pending_input(), 3);
        assert_eq!(console.key().unwrap(), Some(b'1'));
        assert_eq!(console.key().unwrap(), Some(b'2'));
    }

    #[test]
    fn stream_console_reads_until_eof() {
        let input: &[u8] = b"Q";
        let mut console = StreamConsole::new(input, Vec::new());
        assert_eq!(console.key().unwrap(), Some(b'Q'));
        assert_eq!(console.key().unwrap(), None);

        console.emit(b'h').unwrap();
        console.emit(b'\n').unwrap();
        let (_, written) = console.into_inner();
        assert_eq!(written, b"h\n");
    }

    #[test]
    fn mutable_reference_is_a_console() {
        fn drive<C: Console>(mut console: C) {
            console.emit(7).unwrap();
        }

        let mut inner = BufferConsole::new();
        drive(&mut inner);
        assert_eq!(inner.into_output(), vec![7]);
    }
}
