//! Compiler error types
//!
//! Every error that can carry a source location does; `source_excerpt`
//! renders the offending line with a caret span for diagnostics.

use cairn_spec::{Location, ScopedName};
use thiserror::Error;

fn loc_prefix(loc: &Option<Location>) -> String {
    match loc {
        Some(l) => format!("{l}: "),
        None => String::new(),
    }
}

/// Malformed syntax; carries a precise location and an expectation message
#[derive(Debug, Error, PartialEq)]
pub enum ParserError {
    #[error("{location}: Unexpected token '{found}', expected {expected}")]
    UnexpectedToken {
        location: Location,
        found: String,
        expected: String,
    },

    #[error("{location}: Unexpected end of input, expected {expected}")]
    UnexpectedEof {
        location: Location,
        expected: String,
    },

    #[error("{location}: Unrecognized character")]
    InvalidToken { location: Location },

    #[error("{location}: Invalid numeric literal")]
    InvalidNumber { location: Location },

    #[error("{location}: Unterminated hint block")]
    UnterminatedHint { location: Location },
}

impl ParserError {
    pub fn location(&self) -> &Location {
        match self {
            ParserError::UnexpectedToken { location, .. }
            | ParserError::UnexpectedEof { location, .. }
            | ParserError::InvalidToken { location }
            | ParserError::InvalidNumber { location }
            | ParserError::UnterminatedHint { location } => location,
        }
    }
}

/// Identifier resolution failures
#[derive(Debug, Error, PartialEq)]
pub enum IdentifierError {
    #[error("Unknown identifier '{name}'. Searched scopes: {}", .searched_scopes.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", "))]
    Missing {
        name: ScopedName,
        searched_scopes: Vec<ScopedName>,
    },

    #[error("Identifier '{name}' is not a struct; cannot access member '{member}'")]
    NotAStruct { name: ScopedName, member: String },

    #[error("Struct '{name}' has no member '{member}'")]
    NoSuchMember { name: ScopedName, member: String },

    #[error("Alias cycle while resolving '{name}'")]
    AliasCycle { name: ScopedName },

    #[error("Expected '{name}' to be {expected}, found {found}")]
    UnexpectedKind {
        name: ScopedName,
        expected: &'static str,
        found: &'static str,
    },
}

/// A reference was evaluated across incompatible control-flow paths
#[derive(Debug, Error, PartialEq)]
#[error("Reference '{name}' was defined in an incompatible control-flow path (tracking group {def_group}, used in group {use_group}); it cannot be used here without reconciliation")]
pub struct FlowTrackingError {
    pub name: ScopedName,
    pub def_group: usize,
    pub use_group: usize,
}

/// Preprocessing failures: redefinitions, unsupported constructs, directive
/// misuse, constructs that cannot lower to a single instruction.
#[derive(Debug, Error, PartialEq)]
pub enum PreprocessorError {
    #[error("{}Redefinition of '{name}'", loc_prefix(.location))]
    Redefinition {
        name: ScopedName,
        location: Option<Location>,
    },

    #[error("{}The %builtins directive may appear at most once", loc_prefix(.location))]
    DuplicateBuiltinsDirective { location: Option<Location> },

    #[error("{}Builtin '{name}' appears twice in the %builtins directive", loc_prefix(.location))]
    DuplicateBuiltin {
        name: String,
        location: Option<Location>,
    },

    #[error("{}Unknown builtin '{name}'", loc_prefix(.location))]
    UnknownBuiltin {
        name: String,
        location: Option<Location>,
    },

    #[error("Module '{module}' could not be located")]
    ModuleNotFound { module: ScopedName },

    #[error("In module '{module}': {message}")]
    ModuleParse { module: ScopedName, message: String },

    #[error("Cyclic module import involving '{module}'")]
    CyclicImport { module: ScopedName },

    #[error("{}'if' conditions joined with 'and' cannot carry an 'else' clause", loc_prefix(.location))]
    AndWithElse { location: Option<Location> },

    #[error("{}{message}", loc_prefix(.location))]
    NotInstructionExpressible {
        message: String,
        location: Option<Location>,
    },

    #[error("{}Cannot cast '{src}' to '{dest}' in this position", loc_prefix(.location))]
    IllegalCast {
        src: String,
        dest: String,
        location: Option<Location>,
    },

    #[error("{}Operation not allowed between '{lhs}' and '{rhs}'", loc_prefix(.location))]
    IllegalTypeOp {
        lhs: String,
        rhs: String,
        location: Option<Location>,
    },

    #[error("{}Expected a constant expression", loc_prefix(.location))]
    ExpectedConstant { location: Option<Location> },

    #[error("{}Unknown label '{name}'", loc_prefix(.location))]
    UnknownLabel {
        name: ScopedName,
        location: Option<Location>,
    },

    #[error("{}Jump offset does not fit the instruction offset range", loc_prefix(.location))]
    OffsetOutOfRange { location: Option<Location> },

    #[error("Function 'main' not found in scope '{0}'")]
    MainNotFound(ScopedName),

    #[error("{0}")]
    Identifier(#[from] IdentifierError),

    #[error("{0}")]
    FlowTracking(#[from] FlowTrackingError),
}

/// Umbrella error for the whole compilation pipeline
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0}")]
    Parser(#[from] ParserError),

    #[error("{0}")]
    Preprocessor(#[from] PreprocessorError),
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Render the source line a location points at, with a caret span under the
/// offending columns.
pub fn source_excerpt(source: &str, loc: &Location) -> String {
    let Some(line) = source.lines().nth(loc.start_line.saturating_sub(1) as usize) else {
        return String::new();
    };
    let start = loc.start_col.saturating_sub(1) as usize;
    let width = if loc.end_line == loc.start_line && loc.end_col > loc.start_col {
        (loc.end_col - loc.start_col) as usize
    } else {
        1
    };
    let caret = " ".repeat(start) + &"^".repeat(width.max(1));
    format!("{line}\n{caret}")
}
