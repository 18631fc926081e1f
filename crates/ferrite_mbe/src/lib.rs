//! Declarative macro expansion.
//!
//! A `macro_rules!` body is parsed once into a [`MacroDef`]. Expanding an
//! invocation tries its cases in order with the [`matcher`], and the first
//! case that consumes the whole input has its template filled in from the
//! resulting [`MacroSubstitution`]. Builtins (`env!`, `option_env!`,
//! `concat!`, `include!`, `stringify!`) are evaluated directly.
//!
//! The output is plain text; reparsing it is up to the caller.

mod builtin;
mod expander;
mod macro_def;
pub mod matcher;
mod subst;

pub use builtin::BuiltinMacro;
pub use expander::{DEFAULT_EXPANSION_DEPTH, EmptyHost, ExpansionHost, Expander, MacroLookup};
pub use macro_def::{
    MacroCase, MacroDef, MacroDefError, PatternElem, PatternGroup, RepeatKind, TemplateElem, TemplateRepeat,
    normalize_crate_name,
};
pub use subst::{MacroGroup, MacroSubstitution, SubstitutionChain};

use ferrite_syntax::{Cancelled, LexError};
use thiserror::Error;

/// Why an invocation produced no expansion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("no rules of macro '{name}' matched the input")]
    NoMatchingRule { name: String },
    #[error("metavariable '${name}' is not bound")]
    UnboundVariable { name: String },
    #[error("no repetition group matches the template repetition")]
    NoRepetitionGroup,
    #[error("cannot find macro '{path}'")]
    UnresolvedMacro { path: String },
    #[error("{name}! argument is not a literal")]
    BuiltinArgument { name: &'static str },
    #[error("{name}! could not be evaluated")]
    BuiltinFailed { name: &'static str },
    #[error("macro expansion nested deeper than {limit}")]
    DepthExceeded { limit: usize },
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}
