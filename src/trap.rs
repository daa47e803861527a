use std::fmt;

use log::debug;

use crate::error::VmError;
use crate::io::Console;
use crate::state::{RunState, MEMORY_MAX};

pub const GETC: u8 = 0x20;
pub const OUT: u8 = 0x21;
pub const PUTS: u8 = 0x22;
pub const IN: u8 = 0x23;
pub const PUTSP: u8 = 0x24;
pub const HALT: u8 = 0x25;
/// Read an unsigned decimal number into `R0`.
pub const INU16: u8 = 0x26;
/// Write `R0` as an unsigned decimal number, followed by a newline.
pub const OUTU16: u8 = 0x27;

/// A host-native system call.
///
/// Handlers may read and write registers and memory, but the program counter is restored from
/// `R7` once they return.
pub type TrapHandler = Box<dyn FnMut(&mut RunState, &mut dyn Console) -> Result<(), VmError>>;

/// Handlers for each of the 256 trap vectors, owned by a single machine.
pub struct TrapTable {
    handlers: Box<[Option<TrapHandler>; 256]>,
}

impl TrapTable {
    /// Table with no vectors bound.
    pub fn new() -> Self {
        Self {
            handlers: Box::new(std::array::from_fn(|_| None)),
        }
    }

    /// Architected routines `0x20..=0x25`, plus numeric I/O on `0x26` and `0x27`.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register(GETC, getc);
        table.register(OUT, out);
        table.register(PUTS, puts);
        table.register(IN, input);
        table.register(PUTSP, putsp);
        table.register(HALT, halt);
        table.register(INU16, inu16);
        table.register(OUTU16, outu16);
        table
    }

    /// Bind `vector`, returning whichever handler it replaced.
    pub fn register<F>(&mut self, vector: u8, handler: F) -> Option<TrapHandler>
    where
        F: FnMut(&mut RunState, &mut dyn Console) -> Result<(), VmError> + 'static,
    {
        debug!("binding trap vector 0x{vector:02x}");
        self.handlers[vector as usize].replace(Box::new(handler))
    }

    pub fn unregister(&mut self, vector: u8) -> Option<TrapHandler> {
        self.handlers[vector as usize].take()
    }

    pub fn is_bound(&self, vector: u8) -> bool {
        self.handlers[vector as usize].is_some()
    }

    pub fn get_mut(&mut self, vector: u8) -> Option<&mut TrapHandler> {
        self.handlers[vector as usize].as_mut()
    }
}

impl Default for TrapTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for TrapTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = (0..=u8::MAX).filter(|vector| self.is_bound(*vector));
        f.debug_set()
            .entries(bound.map(|vector| format!("0x{vector:02x}")))
            .finish()
    }
}

/// Addresses from `start` onwards, wrapping once around memory at most.
fn string_addrs(start: u16) -> impl Iterator<Item = u16> {
    (0..MEMORY_MAX).map(move |i| start.wrapping_add(i as u16))
}

fn getc(state: &mut RunState, console: &mut dyn Console) -> Result<(), VmError> {
    let key = console.read_key()? as u16;
    state.set_reg(0, key);
    state.set_flags(key);
    Ok(())
}

fn out(state: &mut RunState, console: &mut dyn Console) -> Result<(), VmError> {
    console.put_byte((state.reg(0) & 0xFF) as u8)?;
    console.flush()
}

fn puts(state: &mut RunState, console: &mut dyn Console) -> Result<(), VmError> {
    // One character per word
    for addr in string_addrs(state.reg(0)) {
        let chr = state.mem(addr);
        if chr == 0 {
            break;
        }
        console.put_byte((chr & 0xFF) as u8)?;
    }
    console.flush()
}

fn input(state: &mut RunState, console: &mut dyn Console) -> Result<(), VmError> {
    let key = console.read_key()?;
    state.set_reg(0, key as u16);
    state.set_flags(key as u16);
    console.put_byte(key)?;
    console.flush()
}

fn putsp(state: &mut RunState, console: &mut dyn Console) -> Result<(), VmError> {
    // Two characters per word, low byte first
    'string: for addr in string_addrs(state.reg(0)) {
        let chr_raw = state.mem(addr);
        for chr in [chr_raw & 0xFF, chr_raw >> 8] {
            if chr == 0 {
                break 'string;
            }
            console.put_byte(chr as u8)?;
        }
    }
    console.flush()
}

fn halt(state: &mut RunState, console: &mut dyn Console) -> Result<(), VmError> {
    state.set_running(false);
    console.flush()
}

fn inu16(state: &mut RunState, console: &mut dyn Console) -> Result<(), VmError> {
    let mut digits = String::new();
    loop {
        let key = console.read_key()?;
        match key {
            // Skip leading whitespace
            b' ' | b'\t' | b'\r' | b'\n' if digits.is_empty() => continue,
            0 | b' ' | b'\t' | b'\r' | b'\n' => break,
            _ => digits.push(key as char),
        }
    }
    let val = digits
        .parse::<u16>()
        .map_err(|_| VmError::InvalidNumber { found: digits })?;
    state.set_reg(0, val);
    Ok(())
}

fn outu16(state: &mut RunState, console: &mut dyn Console) -> Result<(), VmError> {
    for byte in format!("{}\n", state.reg(0)).bytes() {
        console.put_byte(byte)?;
    }
    console.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::BufferedConsole;
    use crate::state::Flag;

    fn call(vector: u8, state: &mut RunState, console: &mut BufferedConsole) {
        let mut table = TrapTable::standard();
        let handler = table.get_mut(vector).expect("vector should be bound");
        handler(state, console as &mut dyn Console).unwrap();
    }

    fn store_str(state: &mut RunState, addr: u16, words: &[u16]) {
        for (i, word) in words.iter().enumerate() {
            state.set_mem(addr + i as u16, *word);
        }
    }

    #[test]
    fn standard_vectors() {
        let table = TrapTable::standard();
        for vector in 0x20..=0x27 {
            assert!(table.is_bound(vector));
        }
        assert!(!table.is_bound(0x1F));
        assert!(!table.is_bound(0x28));
        assert!(!TrapTable::new().is_bound(HALT));
    }

    #[test]
    fn register_and_override() {
        let mut table = TrapTable::new();
        let first = table.register(0x30, |state, _| {
            state.set_reg(1, 1);
            Ok(())
        });
        assert!(first.is_none());
        let second = table.register(0x30, |state, _| {
            state.set_reg(1, 2);
            Ok(())
        });
        assert!(second.is_some());

        let mut state = RunState::default();
        let mut console = BufferedConsole::new();
        table.get_mut(0x30).unwrap()(&mut state, &mut console as &mut dyn Console).unwrap();
        assert_eq!(state.reg(1), 2);

        assert!(table.unregister(0x30).is_some());
        assert!(!table.is_bound(0x30));
    }

    #[test]
    fn puts_stops_at_zero_word() {
        let mut state = RunState::default();
        let mut console = BufferedConsole::new();
        store_str(&mut state, 0x4000, &[b'H' as u16, b'i' as u16, 0, b'!' as u16]);
        state.set_reg(0, 0x4000);
        call(PUTS, &mut state, &mut console);
        assert_eq!(console.output_str(), "Hi");
    }

    #[test]
    fn putsp_low_byte_first() {
        let mut state = RunState::default();
        let mut console = BufferedConsole::new();
        // "Hey" packed two per word
        store_str(&mut state, 0x4000, &[0x6548, 0x0079, 0x4141]);
        state.set_reg(0, 0x4000);
        call(PUTSP, &mut state, &mut console);
        assert_eq!(console.output_str(), "Hey");
    }

    #[test]
    fn out_writes_low_byte() {
        let mut state = RunState::default();
        let mut console = BufferedConsole::new();
        state.set_reg(0, 0x1241);
        call(OUT, &mut state, &mut console);
        assert_eq!(console.output(), b"A");
    }

    #[test]
    fn getc_and_in() {
        let mut state = RunState::default();
        let mut console = BufferedConsole::with_input("ab");

        call(GETC, &mut state, &mut console);
        assert_eq!(state.reg(0), b'a' as u16);
        assert_eq!(state.flag(), Flag::P);
        assert!(console.output().is_empty());

        call(IN, &mut state, &mut console);
        assert_eq!(state.reg(0), b'b' as u16);
        assert_eq!(console.output(), b"b");
    }

    #[test]
    fn halt_stops_running() {
        let mut state = RunState::default();
        state.set_running(true);
        call(HALT, &mut state, &mut BufferedConsole::new());
        assert!(!state.is_running());
    }

    #[test]
    fn numeric_io() {
        let mut state = RunState::default();
        let mut console = BufferedConsole::with_input("  1234\n");
        call(INU16, &mut state, &mut console);
        assert_eq!(state.reg(0), 1234);

        state.set_reg(0, 65535);
        call(OUTU16, &mut state, &mut console);
        assert_eq!(console.output_str(), "65535\n");

        let mut table = TrapTable::standard();
        let mut console = BufferedConsole::with_input("70000\n");
        let result = table.get_mut(INU16).unwrap()(&mut state, &mut console as &mut dyn Console);
        assert!(matches!(result, Err(VmError::InvalidNumber { .. })));
    }
}
