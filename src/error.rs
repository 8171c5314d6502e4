use thiserror::Error;

use crate::{
    ir::{BlockId, BlockState},
    translator::UnitId,
};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Invariant {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Invariant {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Translation of a function either fully succeeds or reports the first violated invariant.
/// Expected failures (no handler for a mnemonic, a lifter rejecting an operand combination)
/// never surface here: they are absorbed by the native passthrough fallback.
///
/// # Error Categories
///
/// ## Invariant Violations
/// - [`Error::Invariant`] - A pipeline invariant did not hold (logic error, not bad input)
/// - [`Error::IllegalCommand`] - A command kind was placed in a block state that forbids it
///
/// ## Input Errors
/// - [`Error::Malformed`] - Disassembler input that cannot form a function (overlapping or empty blocks)
///
/// ## Lookup Errors
/// - [`Error::UnknownBlock`] - A block handle does not resolve to a live block
/// - [`Error::UnknownUnit`] - A unit handle does not resolve to a translation unit
///
/// # Examples
///
/// ```rust
/// use vmir::Error;
///
/// fn report(err: &Error) -> String {
///     match err {
///         Error::Invariant { message, file, line } => format!("{file}:{line}: {message}"),
///         other => other.to_string(),
///     }
/// }
/// # let _ = report;
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A translation or optimization invariant was violated.
    ///
    /// This is a hard stop for the whole pipeline run: continuing would silently emit
    /// incorrect code. The message names the violated invariant and the offending
    /// unit or block, and the source location where the check fired is recorded.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the violated invariant
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("Invariant violated - {file}:{line}: {message}")]
    Invariant {
        /// The message to be printed for the Invariant error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The instructions or blocks handed to the disassembler do not describe a function.
    ///
    /// Raised for overlapping instructions, overlapping blocks, and empty blocks.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A command was pushed into a block whose state does not allow it.
    ///
    /// Native blocks only hold passthrough instructions, branches and VM transitions;
    /// virtual blocks hold everything except passthrough instructions.
    #[error("Command '{command}' is not legal inside a {state} block")]
    IllegalCommand {
        /// Name of the rejected command kind
        command: &'static str,
        /// State of the block that rejected it
        state: BlockState,
    },

    /// A block handle did not resolve to a live block in the arena.
    #[error("Block {0} does not exist")]
    UnknownBlock(BlockId),

    /// A unit handle did not resolve to a translation unit.
    #[error("Translation unit {0} does not exist")]
    UnknownUnit(UnitId),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
