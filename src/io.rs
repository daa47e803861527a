use std::collections::VecDeque;

use crate::error::VmError;

/// Character devices the machine talks to.
///
/// The core never touches the operating system directly; keyboard polling, blocking reads and
/// the output sink are all supplied by the host through this trait.
pub trait Console {
    /// Whether a key can be read right now without blocking.
    ///
    /// Polled on every read of the keyboard status register, so implementations must not cache
    /// the answer.
    fn key_available(&mut self) -> Result<bool, VmError>;

    /// Read one byte of input. May block until one is available.
    fn read_key(&mut self) -> Result<u8, VmError>;

    fn put_byte(&mut self, byte: u8) -> Result<(), VmError>;

    fn flush(&mut self) -> Result<(), VmError> {
        Ok(())
    }
}

/// In-memory console with injectable keystrokes and captured output.
///
/// Reading with no input left yields `0` rather than blocking.
#[derive(Debug, Default, Clone)]
pub struct BufferedConsole {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl BufferedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: impl AsRef<[u8]>) -> Self {
        let mut console = Self::new();
        console.push_input(input);
        console
    }

    /// Queue a single keystroke.
    pub fn inject_key(&mut self, key: u8) {
        self.input.push_back(key);
    }

    pub fn push_input(&mut self, input: impl AsRef<[u8]>) {
        self.input.extend(input.as_ref());
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Captured output, lossily decoded.
    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}

impl Console for BufferedConsole {
    fn key_available(&mut self) -> Result<bool, VmError> {
        Ok(!self.input.is_empty())
    }

    fn read_key(&mut self) -> Result<u8, VmError> {
        Ok(self.input.pop_front().unwrap_or(0))
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), VmError> {
        self.output.push(byte);
        Ok(())
    }
}
