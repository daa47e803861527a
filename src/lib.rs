// Machine
mod decode;
pub use decode::{sign_extend, Instruction, Opcode};
mod state;
pub use state::{Flag, RunState, KBDR, KBSR, MEMORY_MAX, PC_START};

// Running
mod runtime;
pub use runtime::{Hook, HookAction, Machine, Step};
pub mod trap;
pub use trap::{TrapHandler, TrapTable};
mod loader;
pub use loader::{load_image, LoadedImage};

// Host
pub mod io;
pub use io::{BufferedConsole, Console};
pub mod term;
pub mod output;

mod config;
pub use config::{Policy, VmConfig};
mod error;
pub use error::VmError;

pub mod env;
