//! Structured parse errors.
//!
//! Every failure carries what was expected, the position at which the
//! mismatch was detected, and the stack of enclosing constructs. Inside the
//! parser a failure also carries a `committed` flag: once an alternative has
//! consumed its uniquely-identifying prefix, its failures must propagate
//! instead of being rewound away.

use std::fmt;

use aster_ast::Position;
use aster_diag::{Category, Diagnostic, SourceLocation};

/// What the parser was expecting when it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    ExpectingSymbol(String),
    ExpectingKeyword(String),
    ExpectingOperator(String),
    ExpectingCamelCase,
    ExpectingCapitalCase,
    ExpectingNumber,
    ExpectingChar,
    ExpectingType,
    ExpectingEof,
    UnexpectedChar(char),
    /// A state the parser believes impossible; indicates a parser bug.
    Internal(String),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::ExpectingSymbol(s) => write!(f, "expected '{s}'"),
            ParseErrorKind::ExpectingKeyword(s) => write!(f, "expected keyword '{s}'"),
            ParseErrorKind::ExpectingOperator(s) => write!(f, "expected operator '{s}'"),
            ParseErrorKind::ExpectingCamelCase => write!(f, "expected a lower-case name"),
            ParseErrorKind::ExpectingCapitalCase => write!(f, "expected an upper-case name"),
            ParseErrorKind::ExpectingNumber => write!(f, "expected a number"),
            ParseErrorKind::ExpectingChar => write!(f, "expected a character"),
            ParseErrorKind::ExpectingType => write!(f, "expected a type"),
            ParseErrorKind::ExpectingEof => write!(f, "expected end of input"),
            ParseErrorKind::UnexpectedChar(c) => write!(f, "unexpected character '{c}'"),
            ParseErrorKind::Internal(msg) => write!(f, "internal parser error: {msg}"),
        }
    }
}

/// An enclosing construct at the time of failure, innermost last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    InImport,
    InDeclaration,
    InExpr,
}

impl Context {
    pub fn describe(self) -> &'static str {
        match self {
            Context::InImport => "while parsing an import",
            Context::InDeclaration => "while parsing a declaration",
            Context::InExpr => "while parsing an expression",
        }
    }
}

/// A structured parse failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Where the mismatch was detected, 1-indexed.
    pub position: Position,
    /// Enclosing constructs, outermost first.
    pub contexts: Vec<Context>,
}

impl ParseError {
    /// Convert into a rendered diagnostic. Context frames become help text.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let category = match self.kind {
            ParseErrorKind::Internal(_) => Category::Internal,
            _ => Category::Syntax,
        };
        let mut diag = Diagnostic::error(category, self.kind.to_string()).at(SourceLocation {
            line: self.position.line,
            column: self.position.column,
        });
        if let Some(innermost) = self.contexts.last() {
            diag = diag.with_help(innermost.describe());
        }
        diag
    }
}

impl From<ParseError> for aster_diag::DiagnosticError {
    fn from(err: ParseError) -> Self {
        aster_diag::DiagnosticError::single(err.to_diagnostic())
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.position)?;
        if let Some(innermost) = self.contexts.last() {
            write!(f, " {}", innermost.describe())?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// In-flight failure: a [`ParseError`] plus whether the failing alternative
/// had already committed. Soft failures are rewound by alternation; committed
/// failures propagate to the caller of the parse.
#[derive(Debug, Clone)]
pub(crate) struct Failure {
    pub error: ParseError,
    pub committed: bool,
}

impl Failure {
    pub fn soft(error: ParseError) -> Self {
        Self {
            error,
            committed: false,
        }
    }
}

pub(crate) type Parse<T> = Result<T, Failure>;

/// Marks the failure of an already-identified construct as non-recoverable.
pub(crate) trait Commit {
    fn commit(self) -> Self;
}

impl<T> Commit for Parse<T> {
    fn commit(self) -> Self {
        self.map_err(|mut failure| {
            failure.committed = true;
            failure
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_position_and_context() {
        let err = ParseError {
            kind: ParseErrorKind::ExpectingSymbol("}".into()),
            position: Position::new(3, 7),
            contexts: vec![Context::InDeclaration, Context::InExpr],
        };
        assert_eq!(
            err.to_string(),
            "expected '}' at 3:7 while parsing an expression"
        );
    }

    #[test]
    fn diagnostic_conversion_carries_location() {
        let err = ParseError {
            kind: ParseErrorKind::UnexpectedChar('!'),
            position: Position::new(1, 4),
            contexts: vec![Context::InExpr],
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.category, Category::Syntax);
        assert_eq!(diag.location, Some(SourceLocation { line: 1, column: 4 }));

        let internal = ParseError {
            kind: ParseErrorKind::Internal("bad state".into()),
            position: Position::new(1, 1),
            contexts: vec![],
        };
        assert_eq!(internal.to_diagnostic().category, Category::Internal);
    }

    #[test]
    fn wraps_into_a_diagnostic_error() {
        let err = ParseError {
            kind: ParseErrorKind::ExpectingEof,
            position: Position::new(2, 1),
            contexts: vec![],
        };
        let wrapped = aster_diag::DiagnosticError::from(err);
        assert_eq!(wrapped.diagnostics().len(), 1);
    }
}
