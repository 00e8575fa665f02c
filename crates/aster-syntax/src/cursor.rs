//! Character cursor over Aster source text.
//!
//! The grammar interleaves lexical and syntactic decisions (a `{` may open a
//! block or a record literal, a lower-case name may open a lambda), so there
//! is no separate token stream: the parser reads characters through this
//! cursor and rewinds it to try alternatives. Rewinding restores the position
//! exactly, which keeps backtracking a pure operation.

use aster_ast::Position;

/// Keywords, rejected wherever a lower-case name is required.
pub const KEYWORDS: &[&str] = &[
    "import", "as", "exposing", "ext", "pkg", "pub", "extern", "run", "fun", "let", "ret", "if",
    "then", "else", "where", "is", "true", "false",
];

/// Type constructor names reserved by the prelude; rejected as user-declared
/// type names.
pub const RESERVED_TYPE_NAMES: &[&str] = &["Array", "Boolean", "Number", "String"];

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

pub(crate) fn is_lower_start(c: char) -> bool {
    c.is_ascii_lowercase() || c == '_'
}

pub(crate) fn is_upper_start(c: char) -> bool {
    c.is_ascii_uppercase()
}

pub(crate) fn is_name_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A saved cursor state. Restoring one is the backtracking primitive.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    pos: usize,
    line: u32,
    column: u32,
}

pub(crate) struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

impl Cursor {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// The position of the next unconsumed character, 1-indexed.
    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    pub fn rewind(&mut self, checkpoint: Checkpoint) {
        self.pos = checkpoint.pos;
        self.line = checkpoint.line;
        self.column = checkpoint.column;
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Consume and return the next character, tracking line/column.
    pub fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    pub fn eat_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Consume `expected` exactly, or consume nothing.
    pub fn eat_str(&mut self, expected: &str) -> bool {
        let checkpoint = self.checkpoint();
        for c in expected.chars() {
            if !self.eat_char(c) {
                self.rewind(checkpoint);
                return false;
            }
        }
        true
    }

    /// Consume `keyword` exactly, provided it is not a prefix of a longer
    /// name (`let` must not match inside `letter`).
    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        let checkpoint = self.checkpoint();
        if !self.eat_str(keyword) {
            return false;
        }
        if self.peek().is_some_and(is_name_continue) {
            self.rewind(checkpoint);
            return false;
        }
        true
    }

    /// Read a lower-case name: `[a-z_][A-Za-z0-9_]*`. Consumes nothing on a
    /// failed start. Keyword rejection is the caller's concern.
    pub fn lower_name(&mut self) -> Option<String> {
        if !self.peek().is_some_and(is_lower_start) {
            return None;
        }
        Some(self.name_run())
    }

    /// Read an upper-case name: `[A-Z][A-Za-z0-9_]*`. Consumes nothing on a
    /// failed start.
    pub fn upper_name(&mut self) -> Option<String> {
        if !self.peek().is_some_and(is_upper_start) {
            return None;
        }
        Some(self.name_run())
    }

    fn name_run(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if !is_name_continue(c) {
                break;
            }
            name.push(c);
            self.bump();
        }
        name
    }

    /// Skip any mixture of whitespace and `//` line comments. Never fails.
    pub fn skip_ignorables(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r' | '\n') => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// Skip inline whitespace only. Used between the tokens of a single
    /// logical form, where a newline terminates the form.
    pub fn skip_inline_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_tracks_lines_and_columns() {
        let mut cursor = Cursor::new("ab\nc");
        assert_eq!(cursor.position(), Position::new(1, 1));
        cursor.bump();
        cursor.bump();
        assert_eq!(cursor.position(), Position::new(1, 3));
        cursor.bump(); // newline
        assert_eq!(cursor.position(), Position::new(2, 1));
    }

    #[test]
    fn rewind_restores_position_exactly() {
        let mut cursor = Cursor::new("one\ntwo");
        let checkpoint = cursor.checkpoint();
        for _ in 0..5 {
            cursor.bump();
        }
        assert_eq!(cursor.position(), Position::new(2, 2));
        cursor.rewind(checkpoint);
        assert_eq!(cursor.position(), Position::new(1, 1));
        assert_eq!(cursor.peek(), Some('o'));
    }

    #[test]
    fn eat_keyword_respects_name_boundaries() {
        let mut cursor = Cursor::new("letter");
        assert!(!cursor.eat_keyword("let"));
        assert_eq!(cursor.position(), Position::new(1, 1));

        let mut cursor = Cursor::new("let x");
        assert!(cursor.eat_keyword("let"));
        assert_eq!(cursor.peek(), Some(' '));
    }

    #[test]
    fn eat_str_is_all_or_nothing() {
        let mut cursor = Cursor::new("|=");
        assert!(!cursor.eat_str("|>"));
        assert_eq!(cursor.peek(), Some('|'));
        assert!(cursor.eat_str("|="));
    }

    #[test]
    fn names_follow_case_rules() {
        let mut cursor = Cursor::new("_fooBar9 Baz");
        assert_eq!(cursor.lower_name().as_deref(), Some("_fooBar9"));
        cursor.skip_inline_whitespace();
        assert_eq!(cursor.lower_name(), None);
        assert_eq!(cursor.upper_name().as_deref(), Some("Baz"));
    }

    #[test]
    fn ignorables_skip_comments_but_inline_whitespace_stops_at_newline() {
        let mut cursor = Cursor::new("  // note\n\t x");
        cursor.skip_ignorables();
        assert_eq!(cursor.peek(), Some('x'));

        let mut cursor = Cursor::new("  \n x");
        cursor.skip_inline_whitespace();
        assert_eq!(cursor.peek(), Some('\n'));
    }
}
