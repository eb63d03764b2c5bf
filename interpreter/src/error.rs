use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use thiserror::Error;

/// Parse errors with source location information.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Range<usize>,
    pub notes: Vec<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Range<usize>) -> Self {
        ParseError {
            message: message.into(),
            span,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        Diagnostic::error()
            .with_message(&self.message)
            .with_labels(vec![Label::primary(file_id, self.span.clone())])
            .with_notes(self.notes.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String, span: Range<usize> },

    #[error("{name} failed: {message}")]
    Upstream {
        name: String,
        message: String,
        span: Range<usize>,
    },

    #[error("type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("unknown function: {name}")]
    UnknownFunction { name: String, span: Range<usize> },

    #[error("{name}() expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("{type_name} has no field {field:?}")]
    MissingField { field: String, type_name: String },

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("expression nests too deeply")]
    TooDeep,
}

impl EvalError {
    pub fn type_error(expected: impl Into<String>, got: impl Into<String>) -> Self {
        EvalError::TypeError {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn span(&self) -> Option<Range<usize>> {
        match self {
            EvalError::UndefinedVariable { span, .. }
            | EvalError::Upstream { span, .. }
            | EvalError::UnknownFunction { span, .. } => Some(span.clone()),
            _ => None,
        }
    }

    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        let diagnostic = Diagnostic::error().with_message(self.to_string());
        match self.span() {
            Some(span) => diagnostic.with_labels(vec![Label::primary(file_id, span)]),
            None => diagnostic,
        }
    }
}

/// Either stage of evaluating source text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl Error {
    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        match self {
            Error::Parse(err) => err.to_diagnostic(file_id),
            Error::Eval(err) => err.to_diagnostic(file_id),
        }
    }
}
