use std::fmt;
use std::str::FromStr;

use crate::state::PC_START;

/// What to do with reserved opcodes (`RES`, `RTI`) and traps to unbound vectors.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Log a warning and carry on as if the instruction were a no-op.
    #[default]
    Lenient,
    /// Stop the machine and report the instruction as an error.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Program counter after reset, before any image is loaded.
    pub start: u16,
    pub policy: Policy,
}

impl VmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self, start: u16) -> Self {
        self.start = start;
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn strict(self, strict: bool) -> Self {
        self.policy(if strict { Policy::Strict } else { Policy::Lenient })
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            start: PC_START,
            policy: Policy::default(),
        }
    }
}

impl FromStr for Policy {
    type Err = String;
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            _ => Err(format!("Unknown policy '{}'", string)),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lenient => write!(f, "lenient"),
            Self::Strict => write!(f, "strict"),
        }
    }
}
