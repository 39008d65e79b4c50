//! # Cairn compiler
//!
//! Compile Cairn source into a flat felt-word program.
//!
//! The pipeline: a logos lexer and recursive-descent parser produce an
//! immutable AST; a [`passes::PassManager`] runs the staged preprocessor
//! (module collection, directive collection, identifier collection,
//! boolean lowering, unique-label assignment, code generation); the encoder
//! packs the lowered instructions into their binary word form.
//!
//! ## Example
//!
//! ```rust
//! use cairn_compiler::compile_str;
//!
//! let program = compile_str(
//!     "func main():\n    [ap] = 7; ap++\n    ret\nend\n",
//! )
//! .unwrap();
//! assert!(program.main.is_some());
//! ```

pub mod ast;
pub mod compile;
pub mod encoder;
pub mod error;
pub mod flow;
pub mod format;
pub mod identifiers;
pub mod instruction_builder;
pub mod lexer;
pub mod parser;
pub mod passes;
pub mod types;
pub mod unique_names;

pub use compile::{compile_main, compile_source, compile_str, MAIN_SCOPE};
pub use encoder::encode;
pub use error::{
    CompileError, FlowTrackingError, IdentifierError, ParserError, PreprocessorError,
};
pub use format::{format_elements, format_expr};
pub use parser::{parse_expr, parse_file, parse_statement};
pub use passes::modules::{DirModuleReader, MapModuleReader, ModuleReader};
pub use unique_names::{NameKind, UniqueNameProvider, GENERATED_PREFIX};
