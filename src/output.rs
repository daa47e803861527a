use std::fmt::Write;
use std::path::Path;

use colored::Colorize;

use crate::decode::Instruction;
use crate::state::RunState;

#[derive(Clone, Copy, Debug)]
pub enum MsgColor {
    Green,
    Cyan,
    Red,
}

/// Status lines printed around the program's own output.
///
/// In minimal mode status lines are dropped and the register dump is plain text, suited for
/// blackbox tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct Output {
    minimal: bool,
}

impl Output {
    pub fn new(minimal: bool) -> Self {
        if minimal {
            colored::control::set_override(false);
        }
        Self { minimal }
    }

    pub fn is_minimal(&self) -> bool {
        self.minimal
    }

    pub fn message(&self, color: MsgColor, left: &str, right: &str) {
        if self.minimal {
            return;
        }
        let left = match color {
            MsgColor::Green => left.green(),
            MsgColor::Cyan => left.cyan(),
            MsgColor::Red => left.red(),
        };
        println!("{left:>12} {right}");
    }

    pub fn file_message(&self, color: MsgColor, left: &str, path: &Path) {
        self.message(color, left, &format!("target {}", path.display()));
    }

    /// Register dump, boxed and coloured unless minimal.
    pub fn format_registers(&self, state: &RunState) -> String {
        let mut out = String::new();
        if self.minimal {
            for (i, reg) in state.registers().iter().enumerate() {
                let _ = writeln!(out, "R{i} {reg}");
            }
            let _ = writeln!(out, "PC {}", state.pc());
            let _ = writeln!(out, "CC {:03b}", state.flag().mask());
            return out;
        }

        out.push_str("\x1b[2m┌──────────────────────────────┐\x1b[0m\n");
        out.push_str("\x1b[2m│        \x1b[3mhex     uint     int\x1b[0m\x1b[2m │\x1b[0m\n");
        for (i, reg) in state.registers().iter().enumerate() {
            let _ = writeln!(
                out,
                "\x1b[2m│\x1b[0m \x1b[1mR{i}\x1b[0m  0x{reg:04x}  {reg:-6}  {:-6} \x1b[2m│\x1b[0m",
                *reg as i16
            );
        }
        let _ = writeln!(
            out,
            "\x1b[2m│\x1b[0m \x1b[1mPC\x1b[0m  0x{:04x}        \x1b[1mCC\x1b[0m  {:03b} \x1b[2m│\x1b[0m",
            state.pc(),
            state.flag().mask()
        );
        out.push_str("\x1b[2m└──────────────────────────────┘\x1b[0m\n");
        out
    }
}

/// One line of instruction trace, as seen by the hook (PC already advanced).
pub fn trace_line(state: &RunState, instr: Instruction) -> String {
    let mut line = format!("0x{:04x}  {instr}", state.pc().wrapping_sub(1));
    for (i, reg) in state.registers().iter().enumerate() {
        let _ = write!(line, "  R{i}={reg:04x}");
    }
    let _ = write!(line, "  CC={:03b}", state.flag().mask());
    line
}
