use std::ops::Range;

use crate::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::error::ParseError;

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Literals
    Number(f64),
    StringLit(String),
    True,
    False,
    Null,
    Unit,

    Ident(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,     // ==
    BangEq,   // !=
    Gt,
    Lt,
    GtEq,
    LtEq,
    AmpAmp,   // &&
    PipePipe, // ||
    Bang,     // !
    Question, // ?
    Colon,    // :
    Comma,
    Dot,

    // Grouping
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
}

type Spanned = (Token, Range<usize>);

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse one expression. The whole input must be consumed.
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = ExprParser::new(tokens, source.len());
    let expr = parser.parse_expr(0)?;
    if let Some((token, span)) = parser.peek() {
        return Err(ParseError::new(
            format!("unexpected {} after expression", describe(token)),
            span.clone(),
        ));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Tokenizer: source text -> Token stream
// ---------------------------------------------------------------------------

fn tokenize(text: &str) -> Result<Vec<Spanned>, ParseError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let len = chars.len();
    let byte_at = |i: usize| chars.get(i).map_or(text.len(), |(offset, _)| *offset);
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let start = i;
        let c = chars[i].1;
        let next = chars.get(i + 1).map(|(_, c)| *c);
        let token = match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
                continue;
            }

            // String literal
            '"' | '\'' => {
                i += 1;
                let mut s = String::new();
                let mut closed = false;
                while i < len {
                    match chars[i].1 {
                        ch if ch == c => {
                            closed = true;
                            i += 1;
                            break;
                        }
                        '\\' if i + 1 < len => {
                            s.push(match chars[i + 1].1 {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                            i += 2;
                        }
                        ch => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                if !closed {
                    return Err(ParseError::new("unterminated string literal", byte_at(start)..text.len())
                        .with_note(format!("add a closing {}", c)));
                }
                Token::StringLit(s)
            }

            // Numbers
            '0'..='9' => {
                while i < len && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                let num_str = &text[byte_at(start)..byte_at(i)];
                match num_str.parse::<f64>() {
                    Ok(n) => Token::Number(n),
                    Err(_) => {
                        return Err(ParseError::new(
                            format!("invalid number {:?}", num_str),
                            byte_at(start)..byte_at(i),
                        ));
                    }
                }
            }

            // Identifiers and keywords
            c if c.is_alphabetic() || c == '_' => {
                while i < len && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                match &text[byte_at(start)..byte_at(i)] {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    ident => Token::Ident(ident.to_string()),
                }
            }

            // Two-character operators
            '=' if next == Some('=') => {
                i += 2;
                Token::EqEq
            }
            '!' if next == Some('=') => {
                i += 2;
                Token::BangEq
            }
            '>' if next == Some('=') => {
                i += 2;
                Token::GtEq
            }
            '<' if next == Some('=') => {
                i += 2;
                Token::LtEq
            }
            '&' if next == Some('&') => {
                i += 2;
                Token::AmpAmp
            }
            '|' if next == Some('|') => {
                i += 2;
                Token::PipePipe
            }
            '(' if next == Some(')') => {
                i += 2;
                Token::Unit
            }

            // Single-character operators
            _ => {
                i += 1;
                match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '>' => Token::Gt,
                    '<' => Token::Lt,
                    '!' => Token::Bang,
                    '?' => Token::Question,
                    ':' => Token::Colon,
                    ',' => Token::Comma,
                    '.' => Token::Dot,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    '=' => {
                        return Err(ParseError::new("unexpected `=`", byte_at(start)..byte_at(i))
                            .with_note("use `==` to compare values"));
                    }
                    other => {
                        return Err(ParseError::new(
                            format!("unexpected character {:?}", other),
                            byte_at(start)..byte_at(i),
                        ));
                    }
                }
            }
        };
        tokens.push((token, byte_at(start)..byte_at(i)));
    }

    Ok(tokens)
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("number {}", n),
        Token::StringLit(s) => format!("string {:?}", s),
        Token::Ident(name) => format!("identifier `{}`", name),
        other => format!("{:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Pratt parser
// ---------------------------------------------------------------------------

struct ExprParser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    /// Open sub-expressions plus chained operators on the current spine.
    depth: usize,
}

/// Deepest expression the parser builds; matches the evaluator's limit.
const MAX_NESTING: usize = 256;

// Binding powers (precedence). Higher = tighter binding.
// Left bp, right bp. For left-assoc: right = left + 1. For right-assoc: right = left.
const BP_CONDITIONAL: u8 = 2;     // ? :
const BP_OR: u8 = 4;              // ||
const BP_AND: u8 = 6;             // &&
const BP_EQUALITY: u8 = 8;        // == !=
const BP_COMPARISON: u8 = 10;     // < > <= >=
const BP_ADDITIVE: u8 = 12;       // + -
const BP_MULTIPLICATIVE: u8 = 14; // * / %
const BP_UNARY: u8 = 16;          // ! -
const BP_POSTFIX: u8 = 18;        // . []

impl ExprParser {
    fn new(tokens: Vec<Spanned>, end: usize) -> Self {
        ExprParser {
            tokens,
            pos: 0,
            end,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|(token, _)| token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let next = self.tokens.get(self.pos).cloned();
        if next.is_some() {
            self.pos += 1;
        }
        next
    }

    fn eof_span(&self) -> Range<usize> {
        self.end..self.end
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<Range<usize>, ParseError> {
        match self.advance() {
            Some((token, span)) if token == expected => Ok(span),
            Some((token, span)) => Err(ParseError::new(
                format!("expected {}, found {}", what, describe(&token)),
                span,
            )),
            None => Err(ParseError::new(format!("expected {}, found end of input", what), self.eof_span())),
        }
    }

    // ------------------------------------------------------------------
    // Pratt parser core
    // ------------------------------------------------------------------

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let entry = self.depth;
        let parsed = self.parse_expr_at(min_bp);
        self.depth = entry;
        parsed
    }

    /// Count one more level of nesting, failing past [`MAX_NESTING`].
    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            let span = self.peek().map_or_else(|| self.eof_span(), |(_, span)| span.clone());
            return Err(ParseError::new("expression nests too deeply", span)
                .with_note(format!("at most {} levels are allowed", MAX_NESTING)));
        }
        Ok(())
    }

    fn parse_expr_at(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        self.descend()?;
        let mut left = self.parse_prefix()?;

        while let Some(token) = self.peek_token() {
            // Postfix: member access and indexing
            if matches!(token, Token::Dot | Token::LBracket) {
                if BP_POSTFIX < min_bp {
                    break;
                }
                self.descend()?;
                left = self.parse_postfix(left)?;
                continue;
            }

            let Some((l_bp, r_bp)) = infix_bp(token) else { break };
            if l_bp < min_bp {
                break;
            }

            let conditional = *token == Token::Question;
            self.descend()?;

            // Special case: conditional operator (?)
            if conditional {
                self.advance();
                let true_branch = self.parse_expr(0)?;
                let false_branch = if self.peek_token() == Some(&Token::Colon) {
                    self.advance();
                    Some(Box::new(self.parse_expr(r_bp)?))
                } else {
                    None
                };
                left = Expr::Conditional {
                    condition: Box::new(left),
                    true_branch: Box::new(true_branch),
                    false_branch,
                };
                continue;
            }

            let Some((op, span)) = self.advance() else { break };
            let operator = match op {
                Token::Plus => BinaryOperator::Addition,
                Token::Minus => BinaryOperator::Subtraction,
                Token::Star => BinaryOperator::Multiplication,
                Token::Slash => BinaryOperator::Division,
                Token::Percent => BinaryOperator::Modulo,
                Token::EqEq => BinaryOperator::Equality,
                Token::BangEq => BinaryOperator::Inequality,
                Token::Gt => BinaryOperator::GreaterThan,
                Token::Lt => BinaryOperator::LessThan,
                Token::GtEq => BinaryOperator::GreaterThanOrEqual,
                Token::LtEq => BinaryOperator::LessThanOrEqual,
                Token::AmpAmp => BinaryOperator::LogicalAnd,
                Token::PipePipe => BinaryOperator::LogicalOr,
                other => return Err(ParseError::new(format!("unexpected {}", describe(&other)), span)),
            };
            let right = self.parse_expr(r_bp)?;

            left = Expr::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        let Some((token, span)) = self.advance() else {
            return Err(ParseError::new("unexpected end of expression", self.eof_span()));
        };

        match token {
            // Literals
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::StringLit(s) => Ok(Expr::Text(s)),
            Token::True => Ok(Expr::Boolean(true)),
            Token::False => Ok(Expr::Boolean(false)),
            Token::Null | Token::Unit => Ok(Expr::Null),

            // References and calls
            Token::Ident(name) => match self.peek_token() {
                Some(Token::Unit) => {
                    let (_, close) = self.advance().unwrap_or((Token::Unit, span.clone()));
                    Ok(Expr::Call {
                        name,
                        args: Vec::new(),
                        span: span.start..close.end,
                    })
                }
                Some(Token::LParen) => {
                    self.advance();
                    let args = self.parse_sequence(Token::RParen, "`)`")?;
                    Ok(Expr::Call {
                        name,
                        args,
                        span: span.start..self.previous_end(),
                    })
                }
                _ => Ok(Expr::Variable(name, span)),
            },

            // Unary operators
            Token::Bang => {
                let operand = self.parse_expr(BP_UNARY)?;
                Ok(Expr::Unary {
                    operator: UnaryOperator::LogicalNot,
                    operand: Box::new(operand),
                })
            }
            Token::Minus => {
                let operand = self.parse_expr(BP_UNARY)?;
                Ok(Expr::Unary {
                    operator: UnaryOperator::Negation,
                    operand: Box::new(operand),
                })
            }

            // Parenthesized expression
            Token::LParen => {
                let expr = self.parse_expr(0)?;
                self.expect(Token::RParen, "`)`")?;
                Ok(expr)
            }

            Token::LBracket => Ok(Expr::List(self.parse_sequence(Token::RBracket, "`]`")?)),

            Token::LBrace => self.parse_record(),

            other => Err(ParseError::new(format!("unexpected {}", describe(&other)), span)),
        }
    }

    fn parse_postfix(&mut self, object: Expr) -> Result<Expr, ParseError> {
        match self.advance() {
            Some((Token::Dot, dot)) => match self.advance() {
                Some((Token::Ident(field), _)) => Ok(Expr::Member {
                    object: Box::new(object),
                    field,
                }),
                Some((_, span)) => Err(ParseError::new("expected field name after `.`", span)),
                None => Err(ParseError::new("expected field name after `.`", dot.end..dot.end)),
            },
            Some((Token::LBracket, _)) => {
                let index = self.parse_expr(0)?;
                self.expect(Token::RBracket, "`]`")?;
                Ok(Expr::Index {
                    object: Box::new(object),
                    index: Box::new(index),
                })
            }
            _ => Ok(object),
        }
    }

    /// Comma-separated expressions up to `close`. A trailing comma is allowed.
    fn parse_sequence(&mut self, close: Token, what: &str) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        loop {
            if self.peek_token() == Some(&close) {
                self.advance();
                return Ok(items);
            }
            items.push(self.parse_expr(0)?);
            match self.peek_token() {
                Some(Token::Comma) => {
                    self.advance();
                }
                _ => {
                    self.expect(close, what)?;
                    return Ok(items);
                }
            }
        }
    }

    fn parse_record(&mut self) -> Result<Expr, ParseError> {
        let mut fields = Vec::new();
        loop {
            let key = match self.advance() {
                Some((Token::RBrace, _)) => return Ok(Expr::Record(fields)),
                Some((Token::Ident(key), _)) | Some((Token::StringLit(key), _)) => key,
                Some((token, span)) => {
                    return Err(ParseError::new(
                        format!("expected field name, found {}", describe(&token)),
                        span,
                    ));
                }
                None => return Err(ParseError::new("unterminated record", self.eof_span())),
            };
            self.expect(Token::Colon, "`:`")?;
            fields.push((key, self.parse_expr(0)?));
            match self.peek_token() {
                Some(Token::Comma) => {
                    self.advance();
                }
                _ => {
                    self.expect(Token::RBrace, "`}`")?;
                    return Ok(Expr::Record(fields));
                }
            }
        }
    }

    fn previous_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|index| self.tokens.get(index))
            .map_or(self.end, |(_, span)| span.end)
    }
}

/// Infix binding powers: returns (left_bp, right_bp) or None if not infix.
fn infix_bp(token: &Token) -> Option<(u8, u8)> {
    match token {
        Token::Question => Some((BP_CONDITIONAL, BP_CONDITIONAL)),
        Token::PipePipe => Some((BP_OR, BP_OR + 1)),
        Token::AmpAmp => Some((BP_AND, BP_AND + 1)),
        Token::EqEq | Token::BangEq => Some((BP_EQUALITY, BP_EQUALITY + 1)),
        Token::Gt | Token::Lt | Token::GtEq | Token::LtEq => Some((BP_COMPARISON, BP_COMPARISON + 1)),
        Token::Plus | Token::Minus => Some((BP_ADDITIVE, BP_ADDITIVE + 1)),
        Token::Star | Token::Slash | Token::Percent => Some((BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1)),
        _ => None,
    }
}
