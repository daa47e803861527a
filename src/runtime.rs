use log::{debug, warn};

use crate::config::{Policy, VmConfig};
use crate::decode::Instruction;
use crate::error::VmError;
use crate::io::Console;
use crate::loader::{self, LoadedImage};
use crate::state::RunState;
use crate::trap::TrapTable;

/// Outcome of a single [`Machine::step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// The instruction executed and the machine is still running.
    Continued,
    /// The instruction cleared the running flag (`HALT`).
    Halted,
    /// The hook refused the instruction; it was not executed.
    Cancelled,
}

/// Returned by the per-instruction hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    Cancel,
}

/// Called after every fetch, before the instruction is executed.
///
/// PC has already been advanced past `Instruction` when the hook sees the state.
pub type Hook = Box<dyn FnMut(&RunState, Instruction) -> HookAction>;

/// One emulated machine: registers, memory, trap routines and the console they talk to.
pub struct Machine<C> {
    state: RunState,
    traps: TrapTable,
    console: C,
    hook: Option<Hook>,
    config: VmConfig,
    /// Instructions executed since the last reset.
    executed: u64,
}

impl<C: Console> Machine<C> {
    pub fn new(console: C) -> Self {
        Self::with_config(console, VmConfig::default())
    }

    pub fn with_config(console: C, config: VmConfig) -> Self {
        Self {
            state: RunState::new(config.start),
            traps: TrapTable::standard(),
            console,
            hook: None,
            config,
            executed: 0,
        }
    }

    /// Clear registers and memory and move PC back to the configured start address.
    ///
    /// Trap handlers, the hook and the console are kept.
    pub fn reset(&mut self) {
        self.state.reset(self.config.start);
        self.executed = 0;
    }

    /// Load a program image and point PC at its origin.
    pub fn load_image(&mut self, image: &[u8]) -> Result<LoadedImage, VmError> {
        let loaded = loader::load_image(&mut self.state, image)?;
        self.state.set_pc(loaded.origin);
        Ok(loaded)
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RunState {
        &mut self.state
    }

    pub fn traps_mut(&mut self) -> &mut TrapTable {
        &mut self.traps
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn into_console(self) -> C {
        self.console
    }

    pub fn set_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&RunState, Instruction) -> HookAction + 'static,
    {
        self.hook = Some(Box::new(hook));
    }

    pub fn clear_hook(&mut self) -> Option<Hook> {
        self.hook.take()
    }

    pub fn policy(&self) -> Policy {
        self.config.policy
    }

    pub fn set_policy(&mut self, policy: Policy) {
        self.config.policy = policy;
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Read memory through the keyboard registers.
    pub fn read(&mut self, addr: u16) -> Result<u16, VmError> {
        self.state.read(addr, &mut self.console)
    }

    const OP_TABLE: [fn(&mut Self, Instruction) -> Result<(), VmError>; 16] = [
        Self::br,    // 0x0
        Self::add,   // 0x1
        Self::ld,    // 0x2
        Self::st,    // 0x3
        Self::jsr,   // 0x4
        Self::and,   // 0x5
        Self::ldr,   // 0x6
        Self::str,   // 0x7
        Self::rti,   // 0x8
        Self::not,   // 0x9
        Self::ldi,   // 0xA
        Self::sti,   // 0xB
        Self::jmp,   // 0xC
        Self::res,   // 0xD
        Self::lea,   // 0xE
        Self::trap,  // 0xF
    ];

    /// Run until `HALT`, cancellation by the hook, or an error.
    pub fn run(&mut self) -> Result<Step, VmError> {
        self.state.set_running(true);
        loop {
            match self.step()? {
                Step::Continued => continue,
                Step::Halted => return Ok(Step::Halted),
                Step::Cancelled => {
                    self.state.set_running(false);
                    return Ok(Step::Cancelled);
                }
            }
        }
    }

    /// Like [`Machine::run`], but gives up after `max_steps` instructions, returning
    /// [`Step::Continued`].
    pub fn run_with_limit(&mut self, max_steps: u64) -> Result<Step, VmError> {
        self.state.set_running(true);
        for _ in 0..max_steps {
            match self.step()? {
                Step::Continued => {}
                Step::Halted => return Ok(Step::Halted),
                Step::Cancelled => {
                    self.state.set_running(false);
                    return Ok(Step::Cancelled);
                }
            }
        }
        Ok(Step::Continued)
    }

    /// Fetch, decode and execute a single instruction.
    ///
    /// A cancelled instruction leaves PC pointing at it, so it is fetched again next time.
    /// An error stops the machine.
    pub fn step(&mut self) -> Result<Step, VmError> {
        let addr = self.state.pc();
        let instr = Instruction(self.read(addr)?);
        // PC incremented before instruction is performed
        self.state.set_pc(addr.wrapping_add(1));

        if let Some(hook) = self.hook.as_mut() {
            if hook(&self.state, instr) == HookAction::Cancel {
                debug!("hook cancelled {instr} at 0x{addr:04x}");
                self.state.set_pc(addr);
                return Ok(Step::Cancelled);
            }
        }

        self.state.set_running(true);
        if let Err(err) = Self::OP_TABLE[instr.opcode() as usize](self, instr) {
            self.state.set_running(false);
            return Err(err);
        }
        self.executed += 1;

        if self.state.is_running() {
            Ok(Step::Continued)
        } else {
            Ok(Step::Halted)
        }
    }

    /// Address of the instruction currently executing.
    fn current_addr(&self) -> u16 {
        self.state.pc().wrapping_sub(1)
    }

    /// Skip or fail on an instruction the machine cannot perform, depending on policy.
    fn refuse(&self, err: VmError) -> Result<(), VmError> {
        match self.config.policy {
            Policy::Lenient => {
                warn!("{err}; skipping");
                Ok(())
            }
            Policy::Strict => Err(err),
        }
    }

    fn add(&mut self, instr: Instruction) -> Result<(), VmError> {
        let val1 = self.state.reg(instr.sr1());
        let val2 = if instr.is_imm() {
            instr.imm5()
        } else {
            self.state.reg(instr.sr2())
        };
        let res = val1.wrapping_add(val2);
        self.state.set_reg(instr.dr(), res);
        self.state.set_flags(res);
        Ok(())
    }

    fn and(&mut self, instr: Instruction) -> Result<(), VmError> {
        let val1 = self.state.reg(instr.sr1());
        let val2 = if instr.is_imm() {
            instr.imm5()
        } else {
            self.state.reg(instr.sr2())
        };
        let res = val1 & val2;
        self.state.set_reg(instr.dr(), res);
        self.state.set_flags(res);
        Ok(())
    }

    fn not(&mut self, instr: Instruction) -> Result<(), VmError> {
        let val = !self.state.reg(instr.sr1());
        self.state.set_reg(instr.dr(), val);
        self.state.set_flags(val);
        Ok(())
    }

    fn br(&mut self, instr: Instruction) -> Result<(), VmError> {
        if self.state.flag().mask() & instr.cond() != 0 {
            let pc = self.state.pc().wrapping_add(instr.offset9());
            self.state.set_pc(pc);
        }
        Ok(())
    }

    fn jmp(&mut self, instr: Instruction) -> Result<(), VmError> {
        // `RET` is `JMP R7`
        let pc = self.state.reg(instr.base());
        self.state.set_pc(pc);
        Ok(())
    }

    fn jsr(&mut self, instr: Instruction) -> Result<(), VmError> {
        let pc = self.state.pc();
        // Target is resolved first so `JSRR R7` jumps to the old R7
        let target = if instr.is_long() {
            pc.wrapping_add(instr.offset11())
        } else {
            self.state.reg(instr.base())
        };
        self.state.set_reg(7, pc);
        self.state.set_pc(target);
        Ok(())
    }

    fn ld(&mut self, instr: Instruction) -> Result<(), VmError> {
        let val = self.read(self.state.pc().wrapping_add(instr.offset9()))?;
        self.state.set_reg(instr.dr(), val);
        self.state.set_flags(val);
        Ok(())
    }

    fn ldi(&mut self, instr: Instruction) -> Result<(), VmError> {
        let ptr = self.read(self.state.pc().wrapping_add(instr.offset9()))?;
        let val = self.read(ptr)?;
        self.state.set_reg(instr.dr(), val);
        self.state.set_flags(val);
        Ok(())
    }

    fn ldr(&mut self, instr: Instruction) -> Result<(), VmError> {
        let ptr = self.state.reg(instr.base());
        let val = self.read(ptr.wrapping_add(instr.offset6()))?;
        self.state.set_reg(instr.dr(), val);
        self.state.set_flags(val);
        Ok(())
    }

    fn lea(&mut self, instr: Instruction) -> Result<(), VmError> {
        let val = self.state.pc().wrapping_add(instr.offset9());
        self.state.set_reg(instr.dr(), val);
        self.state.set_flags(val);
        Ok(())
    }

    fn st(&mut self, instr: Instruction) -> Result<(), VmError> {
        let val = self.state.reg(instr.dr());
        self.state
            .write(self.state.pc().wrapping_add(instr.offset9()), val);
        Ok(())
    }

    fn sti(&mut self, instr: Instruction) -> Result<(), VmError> {
        let val = self.state.reg(instr.dr());
        let ptr = self.read(self.state.pc().wrapping_add(instr.offset9()))?;
        self.state.write(ptr, val);
        Ok(())
    }

    fn str(&mut self, instr: Instruction) -> Result<(), VmError> {
        let ptr = self.state.reg(instr.base());
        let val = self.state.reg(instr.dr());
        self.state.write(ptr.wrapping_add(instr.offset6()), val);
        Ok(())
    }

    fn rti(&mut self, instr: Instruction) -> Result<(), VmError> {
        self.reserved(instr)
    }

    fn res(&mut self, instr: Instruction) -> Result<(), VmError> {
        self.reserved(instr)
    }

    fn reserved(&self, instr: Instruction) -> Result<(), VmError> {
        self.refuse(VmError::ReservedOpcode {
            opcode: instr.opcode().mnemonic(),
            instr: instr.0,
            addr: self.current_addr(),
        })
    }

    fn trap(&mut self, instr: Instruction) -> Result<(), VmError> {
        let vector = instr.trap_vector();
        self.state.set_reg(7, self.state.pc());

        let Some(handler) = self.traps.get_mut(vector) else {
            return self.refuse(VmError::UnboundTrapVector {
                vector,
                addr: self.current_addr(),
            });
        };
        debug!("trap 0x{vector:02x} at 0x{:04x}", self.state.pc().wrapping_sub(1));

        let console: &mut dyn Console = &mut self.console;
        handler(&mut self.state, console)?;

        let ret = self.state.reg(7);
        self.state.set_pc(ret);
        Ok(())
    }
}
