use super::code::Label;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// A `void` value kind was used where a local variable slot is needed
    VoidLocal,

    /// Local slots were allocated directly on the terminal builder while a block was open over it
    ///
    /// `expected` is the terminal's next free slot when the block was opened, `found` is the next
    /// free slot when it was closed. This always indicates a bug in how builders were composed.
    LocalSlotInterference { expected: u16, found: u16 },

    /// Local variable slots no longer fit in 16 bits
    LocalsOverflow,

    /// A label is referenced but was never placed
    UnboundLabel(Label),

    /// A label is placed twice
    LabelAlreadyBound(Label),

    /// A branch is too far from its target to be encoded
    BranchOffsetOverflow { label: Label, offset: isize },

    /// The method code is longer than the 65535 bytes the class file format allows
    MethodCodeOverflow(usize),

    /// A local variable scope ends before it starts
    InvalidLocalScope { start: Label, end: Label },

    /// A `tableswitch` has no targets, or its highest key does not fit in 32 bits
    InvalidSwitch { low: i32, count: usize },

    /// Failed to parse a descriptor or signature
    BadDescriptor(String),

    /// Name is not valid for the JVM
    MalformedName(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::VoidLocal => f.write_str("illegal local of void type"),
            Error::LocalSlotInterference { expected, found } => write!(
                f,
                "interference in local variable slot management (expected top local {}, found {})",
                expected, found
            ),
            Error::LocalsOverflow => f.write_str("local variable slots overflow 16 bits"),
            Error::UnboundLabel(label) => write!(f, "label {:?} is referenced but not placed", label),
            Error::LabelAlreadyBound(label) => write!(f, "label {:?} is placed twice", label),
            Error::BranchOffsetOverflow { label, offset } => write!(
                f,
                "branch to {:?} has offset {} which does not fit in 16 bits",
                label, offset
            ),
            Error::MethodCodeOverflow(length) => {
                write!(f, "method code is {} bytes long (max is 65535)", length)
            }
            Error::InvalidLocalScope { start, end } => {
                write!(f, "local variable scope {:?}..{:?} is inverted", start, end)
            }
            Error::InvalidSwitch { low, count } => write!(
                f,
                "tableswitch starting at {} cannot have {} targets",
                low, count
            ),
            Error::BadDescriptor(msg) => write!(f, "bad descriptor: {}", msg),
            Error::MalformedName(msg) => write!(f, "malformed name: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
