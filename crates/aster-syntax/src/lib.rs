//! Lexer-free recursive descent parser for Aster source code.
//!
//! This crate takes source text and produces an AST defined in `aster-ast`.
//! There is no token stream: the grammar's ambiguous prefixes (record literal
//! vs. block, lambda parameter vs. identifier, type application vs. adjacent
//! atoms) are resolved by ordered alternatives over a rewindable character
//! cursor, with Pratt-style precedence climbing for infix operators.
//!
//! The entry point is [`parse_module`]; [`parse_expr`], [`parse_type`], and
//! [`parse_pattern`] run the corresponding sub-grammars against a whole
//! input, for tooling and tests.

mod cursor;
mod error;
mod parser;

pub use cursor::{is_keyword, KEYWORDS, RESERVED_TYPE_NAMES};
pub use error::{Context, ParseError, ParseErrorKind};

use aster_ast::{Expr, Module, Pattern, Type};

/// Parse a complete source module: imports, then declarations, then
/// end-of-input.
pub fn parse_module(name: &str, source: &str) -> Result<Module, ParseError> {
    parser::parse_module(name, source)
}

/// Parse a standalone expression. The entire input must be consumed.
pub fn parse_expr(source: &str) -> Result<Expr, ParseError> {
    parser::parse_expr(source)
}

/// Parse a standalone type. The entire input must be consumed.
pub fn parse_type(source: &str) -> Result<Type, ParseError> {
    parser::parse_type(source)
}

/// Parse a standalone pattern. The entire input must be consumed.
pub fn parse_pattern(source: &str) -> Result<Pattern, ParseError> {
    parser::parse_pattern(source)
}
