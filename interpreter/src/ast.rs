use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    /// Arithmetic negation: -x
    Negation,
    /// Logical not: !x
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Modulo,
    LogicalAnd,
    LogicalOr,
    Equality,
    Inequality,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

/// An expression AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Literals
    Null,
    Number(f64),
    Text(String),
    Boolean(bool),
    List(Vec<Expr>),
    Record(Vec<(String, Expr)>),

    // References
    Variable(String, Range<usize>),
    /// record.field
    Member {
        object: Box<Expr>,
        field: String,
    },
    /// list[index] or record["field"]
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    /// Built-in function call: name(args)
    Call {
        name: String,
        args: Vec<Expr>,
        span: Range<usize>,
    },

    // Operations
    Unary {
        operator: UnaryOperator,
        operand: Box<Expr>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// cond ? expr (falsy -> null)
    /// cond ? expr : expr
    Conditional {
        condition: Box<Expr>,
        true_branch: Box<Expr>,
        false_branch: Option<Box<Expr>>,
    },
}
