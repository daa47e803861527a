use miette::Diagnostic;
use thiserror::Error;

/// Every way loading or running a program can fail.
#[derive(Debug, Error, Diagnostic)]
pub enum VmError {
    // Loader errors
    #[error("Program image is too short to contain an origin ({len} bytes)")]
    #[diagnostic(
        code(load::missing_origin),
        help("an image starts with a 2-byte big-endian origin address")
    )]
    MissingOrigin { len: usize },

    #[error("Program image of {words} words at origin 0x{origin:04x} does not fit in memory")]
    #[diagnostic(
        code(load::overflow),
        help("the image would write past address 0xffff, lower the origin or shorten the program")
    )]
    ImageOverflow { origin: u16, words: usize },

    // Runtime errors
    #[error("Called a trap with an unknown vector of 0x{vector:02x} at 0x{addr:04x}")]
    #[diagnostic(
        code(run::unbound_trap),
        help("register a handler for this vector, or run without `--strict`")
    )]
    UnboundTrapVector { vector: u8, addr: u16 },

    #[error("Encountered reserved opcode {opcode} (0x{instr:04x}) at 0x{addr:04x}")]
    #[diagnostic(
        code(run::reserved_opcode),
        help("RES and RTI are not implemented, run without `--strict` to skip them")
    )]
    ReservedOpcode {
        opcode: &'static str,
        instr: u16,
        addr: u16,
    },

    #[error("Expected an unsigned 16-bit decimal number, found {found:?}")]
    #[diagnostic(code(run::bad_number), help("values range from 0 to 65,535"))]
    InvalidNumber { found: String },

    #[error("Console I/O failed: {0}")]
    #[diagnostic(code(run::io))]
    Io(#[from] std::io::Error),

    #[error("Execution interrupted from the keyboard")]
    #[diagnostic(code(run::interrupted))]
    Interrupted,
}
