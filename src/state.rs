use std::cmp::Ordering;

use crate::error::VmError;
use crate::io::Console;

/// LC3 can address 128KB of memory.
pub const MEMORY_MAX: usize = 0x10000;

/// Architectural default for the initial program counter.
pub const PC_START: u16 = 0x3000;

/// Keyboard status register. Bit 15 is set while a key is ready.
pub const KBSR: u16 = 0xFE00;
/// Keyboard data register. Holds the last key made ready through `KBSR`.
pub const KBDR: u16 = 0xFE02;

/// Condition code. Exactly one is set at any time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    N = 0b100,
    Z = 0b010,
    P = 0b001,
}

impl Flag {
    pub fn from_value(val: u16) -> Self {
        match (val as i16).cmp(&0) {
            Ordering::Less => Flag::N,
            Ordering::Equal => Flag::Z,
            Ordering::Greater => Flag::P,
        }
    }

    /// Bit mask, in the layout of the `n`, `z`, `p` bits of `BR`.
    pub fn mask(self) -> u16 {
        self as u16
    }
}

/// Registers and memory of one machine.
pub struct RunState {
    /// System memory - 128KB in size.
    mem: Box<[u16; MEMORY_MAX]>,
    /// Program counter
    pc: u16,
    /// 8x 16-bit registers
    reg: [u16; 8],
    /// Condition code
    flag: Flag,
    /// Cleared by `HALT`.
    running: bool,
}

impl RunState {
    pub fn new(start: u16) -> Self {
        // Allocate through a `Vec` so the 128KB never lives on the stack
        let mem: Box<[u16; MEMORY_MAX]> = vec![0; MEMORY_MAX]
            .into_boxed_slice()
            .try_into()
            .unwrap_or_else(|_| unreachable!("vector has exactly MEMORY_MAX elements"));
        Self {
            mem,
            pc: start,
            reg: [0; 8],
            flag: Flag::Z,
            running: false,
        }
    }

    /// Zero every register and memory cell, set `Z` and move PC to `start`.
    pub fn reset(&mut self, start: u16) {
        self.mem.fill(0);
        self.reg = [0; 8];
        self.pc = start;
        self.flag = Flag::Z;
        self.running = false;
    }

    #[inline]
    pub fn pc(&self) -> u16 {
        self.pc
    }

    #[inline]
    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    #[inline]
    pub fn reg(&self, reg: u16) -> u16 {
        self.reg[(reg & 0b111) as usize]
    }

    #[inline]
    pub fn set_reg(&mut self, reg: u16, val: u16) {
        self.reg[(reg & 0b111) as usize] = val;
    }

    pub fn registers(&self) -> &[u16; 8] {
        &self.reg
    }

    #[inline]
    pub fn flag(&self) -> Flag {
        self.flag
    }

    #[inline]
    pub fn set_flags(&mut self, val: u16) {
        self.flag = Flag::from_value(val);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Raw memory cell, bypassing devices.
    #[inline]
    pub fn mem(&self, addr: u16) -> u16 {
        self.mem[addr as usize]
    }

    #[inline]
    pub fn set_mem(&mut self, addr: u16, val: u16) {
        self.mem[addr as usize] = val;
    }

    /// Read memory as the CPU sees it.
    ///
    /// Reading `KBSR` asks the console for a key every time: if one is ready, `KBSR` gets bit 15
    /// and the key is latched into `KBDR`; otherwise `KBSR` is cleared.
    pub fn read(&mut self, addr: u16, console: &mut dyn Console) -> Result<u16, VmError> {
        if addr == KBSR {
            if console.key_available()? {
                let key = console.read_key()?;
                self.set_mem(KBSR, 1 << 15);
                self.set_mem(KBDR, key as u16);
            } else {
                self.set_mem(KBSR, 0);
            }
        }
        Ok(self.mem(addr))
    }

    #[inline]
    pub fn write(&mut self, addr: u16, val: u16) {
        self.set_mem(addr, val);
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(PC_START)
    }
}
