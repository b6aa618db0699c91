use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmulationError {
    #[error("invalid opcode {opcode:#04X} at {cs:04X}:{ip:04X}")]
    InvalidOpcode { opcode: u8, cs: u16, ip: u16 },

    /// The CPU is halted (HLT or a DOS exit). Not a failure.
    #[error("cpu halted")]
    Halt,

    #[error("cannot read {}: {source}", path.display())]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("image of {size} bytes does not fit in the {available} bytes above the load address")]
    FileTooLarge { size: usize, available: usize },
}
