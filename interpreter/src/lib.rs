pub mod ast;
pub mod blocks;
pub mod builtins;
pub mod compute;
pub mod error;
pub mod evaluator;
pub mod library;
pub mod parser;

pub use compute::{compute, evaluate_source};
pub use error::{Error, EvalError, ParseError};
pub use library::{RootBlock, root_block, standard_library};
