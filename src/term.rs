use std::collections::VecDeque;
use std::io::{self, stdin, stdout, IsTerminal, Read, Stdout, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyEvent},
    terminal,
};

use crate::error::VmError;
use crate::io::Console;

/// Similar to [`crossterm::event::KeyCode`] but only contains what the machine can receive.
#[derive(Debug, PartialEq, Eq)]
pub enum Key {
    Enter,
    Backspace,
    Tab,
    Esc,
    Char(char),
    /// `Ctrl+C`
    Interrupt,
}

/// Console attached to the process's own stdin and stdout.
///
/// On an interactive terminal, stdin is switched to raw mode for as long as the console lives,
/// so single keystrokes reach the machine without waiting for a newline. Piped stdin is read a
/// byte at a time by a [`PipedInput`].
pub struct TermConsole {
    out: Stdout,
    /// `None` when stdin is an interactive terminal.
    piped: Option<PipedInput>,
    /// Bytes of a multi-byte character.
    pending: VecDeque<u8>,
}

impl TermConsole {
    pub fn new() -> Result<Self, VmError> {
        let interactive = stdin().is_terminal();
        if interactive {
            enable_raw_mode()?;
        }
        Ok(Self {
            out: stdout(),
            piped: (!interactive).then(|| PipedInput::spawn(stdin())),
            pending: VecDeque::new(),
        })
    }

    /// Whether stdin is a terminal in raw mode, rather than a pipe or file.
    pub fn is_interactive(&self) -> bool {
        self.piped.is_none()
    }

    /// Queue a key's bytes, encoded as UTF-8.
    fn push_key(&mut self, key: Key) -> Result<(), VmError> {
        let ch = match key {
            Key::Enter => '\n',
            Key::Backspace => '\x08',
            Key::Tab => '\t',
            Key::Esc => '\x1b',
            Key::Char(ch) => ch,
            Key::Interrupt => return Err(VmError::Interrupted),
        };
        let mut bytes = [0u8; 4];
        self.pending.extend(ch.encode_utf8(&mut bytes).bytes());
        Ok(())
    }
}

/// Bytes from a non-interactive reader, pumped through a channel by a background thread.
///
/// The machine can then ask whether input has arrived without blocking on the reader.
pub struct PipedInput {
    rx: Receiver<io::Result<u8>>,
    /// Byte received by `key_available` but not yet read.
    peeked: Option<u8>,
    /// The reader reached end of file, or failed.
    eof: bool,
}

impl PipedInput {
    pub fn spawn<R>(mut reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = [0; 1];
            loop {
                let byte = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(_) => Ok(buf[0]),
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => Err(err),
                };
                let failed = byte.is_err();
                // Receiver is gone: console was dropped
                if tx.send(byte).is_err() || failed {
                    break;
                }
            }
        });
        Self {
            rx,
            peeked: None,
            eof: false,
        }
    }

    /// Never blocks.
    pub fn key_available(&mut self) -> Result<bool, VmError> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        if self.eof {
            return Ok(false);
        }
        match self.rx.try_recv() {
            Ok(byte) => {
                self.peeked = Some(self.received(byte)?);
                Ok(true)
            }
            Err(TryRecvError::Empty) => Ok(false),
            Err(TryRecvError::Disconnected) => {
                self.eof = true;
                Ok(false)
            }
        }
    }

    /// Block until the next byte arrives. Returns `None` at end of input.
    pub fn read_byte(&mut self) -> Result<Option<u8>, VmError> {
        if let Some(byte) = self.peeked.take() {
            return Ok(Some(byte));
        }
        if self.eof {
            return Ok(None);
        }
        match self.rx.recv() {
            Ok(byte) => self.received(byte).map(Some),
            Err(_) => {
                self.eof = true;
                Ok(None)
            }
        }
    }

    fn received(&mut self, byte: io::Result<u8>) -> Result<u8, VmError> {
        byte.map_err(|err| {
            self.eof = true;
            VmError::from(err)
        })
    }
}

impl Console for TermConsole {
    fn key_available(&mut self) -> Result<bool, VmError> {
        if !self.pending.is_empty() {
            return Ok(true);
        }
        if let Some(piped) = self.piped.as_mut() {
            return piped.key_available();
        }
        // Drain whatever is queued without blocking, keeping the first real key
        while event::poll(Duration::ZERO)? {
            if let Ok(key) = Key::try_from(event::read()?) {
                self.push_key(key)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn read_key(&mut self) -> Result<u8, VmError> {
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return Ok(byte);
            }
            if let Some(piped) = self.piped.as_mut() {
                // Nothing left to read: ASCII NUL
                return Ok(piped.read_byte()?.unwrap_or(0));
            }
            if let Ok(key) = Key::try_from(event::read()?) {
                self.push_key(key)?;
            }
        }
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), VmError> {
        // Raw mode does not return the carriage on newline
        if self.is_interactive() && byte == b'\n' {
            self.out.write_all(b"\r")?;
        }
        self.out.write_all(&[byte])?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), VmError> {
        self.out.flush()?;
        Ok(())
    }
}

impl Drop for TermConsole {
    fn drop(&mut self) {
        let _ = self.out.flush();
        if self.is_interactive() {
            let _ = terminal::disable_raw_mode();
        }
    }
}

/// Must only be called if terminal is NOT in raw mode.
fn enable_raw_mode() -> Result<(), VmError> {
    debug_assert!(
        !terminal::is_raw_mode_enabled().is_ok_and(|is| is),
        "terminal should not be in raw mode to enable raw mode",
    );
    terminal::enable_raw_mode()?;
    Ok(())
}

impl TryFrom<Event> for Key {
    type Error = ();
    fn try_from(event: Event) -> Result<Self, Self::Error> {
        if let Event::Key(event) = event {
            if let Ok(key) = event.try_into() {
                return Ok(key);
            }
        }
        Err(())
    }
}

impl TryFrom<KeyEvent> for Key {
    type Error = ();
    fn try_from(event: KeyEvent) -> Result<Self, Self::Error> {
        use event::{KeyCode, KeyEventKind, KeyModifiers as Mod};

        if matches!(event.kind, KeyEventKind::Release) {
            return Err(());
        }

        let key = match (event.modifiers, event.code) {
            (Mod::CONTROL, KeyCode::Char('c')) => Key::Interrupt,

            (_, KeyCode::Backspace) => Key::Backspace,
            (_, KeyCode::Enter) | (_, KeyCode::Char('\n')) => Key::Enter,
            (_, KeyCode::Tab) => Key::Tab,
            (_, KeyCode::Esc) => Key::Esc,

            // Normal character
            (Mod::NONE | Mod::SHIFT, KeyCode::Char(ch)) => Key::Char(ch),

            _ => return Err(()),
        };

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEventKind, KeyModifiers};

    fn press(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent::new(code, modifiers))
    }

    #[test]
    fn keys_from_events() {
        assert_eq!(
            Key::try_from(press(KeyCode::Char('a'), KeyModifiers::NONE)),
            Ok(Key::Char('a'))
        );
        assert_eq!(
            Key::try_from(press(KeyCode::Char('A'), KeyModifiers::SHIFT)),
            Ok(Key::Char('A'))
        );
        assert_eq!(
            Key::try_from(press(KeyCode::Enter, KeyModifiers::NONE)),
            Ok(Key::Enter)
        );
        assert_eq!(
            Key::try_from(press(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Ok(Key::Interrupt)
        );
        assert!(Key::try_from(press(KeyCode::Left, KeyModifiers::NONE)).is_err());
        assert!(Key::try_from(Event::FocusGained).is_err());

        let mut release = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert!(Key::try_from(release).is_err());
    }

    /// Reader that hands out its bytes only once `gate` is dropped.
    struct Gated {
        gate: Receiver<()>,
        bytes: std::vec::IntoIter<u8>,
    }

    impl Read for Gated {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            // Blocks until the sender side is dropped
            let _ = self.gate.recv();
            match self.bytes.next() {
                Some(byte) => {
                    buf[0] = byte;
                    Ok(1)
                }
                None => Ok(0),
            }
        }
    }

    #[test]
    fn piped_poll_does_not_block() {
        let (open, gate) = mpsc::channel();
        let mut input = PipedInput::spawn(Gated {
            gate,
            bytes: b"ok".to_vec().into_iter(),
        });
        // Reader is stuck, yet polling returns straight away
        assert!(!input.key_available().unwrap());
        assert!(!input.key_available().unwrap());

        drop(open);
        assert_eq!(input.read_byte().unwrap(), Some(b'o'));
        assert_eq!(input.read_byte().unwrap(), Some(b'k'));
        assert_eq!(input.read_byte().unwrap(), None);
        assert!(!input.key_available().unwrap());
    }

    #[test]
    fn piped_poll_keeps_byte() {
        let mut input = PipedInput::spawn(io::Cursor::new(b"x".to_vec()));
        while !input.key_available().unwrap() {
            thread::yield_now();
        }
        // Polling twice does not consume it
        assert!(input.key_available().unwrap());
        assert_eq!(input.read_byte().unwrap(), Some(b'x'));
        assert_eq!(input.read_byte().unwrap(), None);
    }
}
