//! Error taxonomy for the analysis pipeline.
//!
//! Every fallible library API returns [`Result`]. The binary maps any
//! [`Error`] to an `error: <message>` line on stderr and exit code 1; parse
//! errors additionally carry a byte span so the CLI can render a source
//! report before the summary line.

/// A half-open byte range into a source file, used for rendered reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required CLI option is missing. Raised before any I/O.
    #[error("please specify `{option}' properly")]
    Configuration { option: String },

    /// A path could not be opened or read.
    #[error("failed to open file \"{path}\"")]
    File { path: String },

    /// Lexical or syntactic error in a dlib/bench file.
    #[error("{message} at line {line} of file \"{file}\"")]
    Parse {
        file: String,
        line: u32,
        message: String,
        span: Span,
    },

    /// The bench references a gate type absent from the dlib.
    #[error("unknown gate \"{gate}\" at line {line} of file \"{file}\"")]
    UnknownGate {
        gate: String,
        file: String,
        line: u32,
        span: Span,
    },

    /// An instance requested a pin the gate's delay table does not wire.
    #[error("delay from pin \"{input}\" to pin \"{output}\" is not set on gate \"{gate}\"")]
    UnknownGatePin {
        gate: String,
        input: String,
        output: String,
    },

    /// A signal name was defined more than once.
    #[error("{head} \"{signal}\" is multiply defined in file \"{file}\"")]
    DuplicateSignal {
        head: &'static str,
        signal: String,
        file: String,
    },

    /// One or more nets never became resolvable.
    #[error("following node is floating\n{}", .outputs.join("\n"))]
    FloatingNet { outputs: Vec<String> },

    /// Division by zero, log of a non-positive value, 0^0, negative variance.
    #[error("{message}")]
    MathDomain { message: String },

    /// A moment or covariance drifted outside tolerable bounds.
    #[error("{message}")]
    NumericInstability { message: String },

    /// An expression variable was evaluated before being bound.
    #[error("expression variable has no value")]
    ValueUnset,

    /// An unreachable state; a bug indicator, never user error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn math(message: impl Into<String>) -> Self {
        Error::MathDomain {
            message: message.into(),
        }
    }

    pub fn unstable(message: impl Into<String>) -> Self {
        Error::NumericInstability {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
