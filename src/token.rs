//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the pcpp project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Preprocessing tokens - kinds, values, punctuator codes
//

use std::fmt;

// ============================================================================
// Token Kinds
// ============================================================================

/// Kinds of preprocessing tokens.
///
/// `MacroArg`, `MacroPaste` and `MacroString` only ever appear inside a
/// stored macro replacement list, never in driver output. `Hash` is a `#`
/// that opens a logical line; any other `#` is `Punct` with code `b'#'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Integer,
    Character,
    StringLit,
    Header,
    Whitespace,
    CComment,
    CppComment,
    Newline,
    Hash,
    Punct,
    MacroArg,
    MacroPaste,
    MacroString,
    LineMarker,
    Invalid,
    Eof,
}

// ============================================================================
// Punctuator Codes
// ============================================================================

/// Multi-character punctuators.
/// Single-character punctuators are stored as their byte value; codes for
/// multi-character punctuators start at 256.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Punct {
    AndAssign = 256, // &=
    Arrow,           // ->
    Decrement,       // --
    DivAssign,       // /=
    Ellipsis,        // ...
    Equal,           // ==
    Gte,             // >=
    Increment,       // ++
    LogicalAnd,      // &&
    AndAndAssign,    // &&=
    Lte,             // <=
    LogicalOr,       // ||
    OrOrAssign,      // ||=
    LeftShift,       // <<
    ShlAssign,       // <<=
    ModAssign,       // %=
    MulAssign,       // *=
    NotEqual,        // !=
    OrAssign,        // |=
    HashHash,        // ##
    AddAssign,       // +=
    DotDot,          // ..
    RightShift,      // >>
    ShrAssign,       // >>=
    SubAssign,       // -=
    XorAssign,       // ^=
}

impl Punct {
    pub const BASE: u32 = 256;

    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Canonical spelling of a punctuator code.
pub fn punct_text(code: u32) -> String {
    if code < Punct::BASE {
        return (code as u8 as char).to_string();
    }

    match code {
        x if x == Punct::AndAssign as u32 => "&=".to_string(),
        x if x == Punct::Arrow as u32 => "->".to_string(),
        x if x == Punct::Decrement as u32 => "--".to_string(),
        x if x == Punct::DivAssign as u32 => "/=".to_string(),
        x if x == Punct::Ellipsis as u32 => "...".to_string(),
        x if x == Punct::Equal as u32 => "==".to_string(),
        x if x == Punct::Gte as u32 => ">=".to_string(),
        x if x == Punct::Increment as u32 => "++".to_string(),
        x if x == Punct::LogicalAnd as u32 => "&&".to_string(),
        x if x == Punct::AndAndAssign as u32 => "&&=".to_string(),
        x if x == Punct::Lte as u32 => "<=".to_string(),
        x if x == Punct::LogicalOr as u32 => "||".to_string(),
        x if x == Punct::OrOrAssign as u32 => "||=".to_string(),
        x if x == Punct::LeftShift as u32 => "<<".to_string(),
        x if x == Punct::ShlAssign as u32 => "<<=".to_string(),
        x if x == Punct::ModAssign as u32 => "%=".to_string(),
        x if x == Punct::MulAssign as u32 => "*=".to_string(),
        x if x == Punct::NotEqual as u32 => "!=".to_string(),
        x if x == Punct::OrAssign as u32 => "|=".to_string(),
        x if x == Punct::HashHash as u32 => "##".to_string(),
        x if x == Punct::AddAssign as u32 => "+=".to_string(),
        x if x == Punct::DotDot as u32 => "..".to_string(),
        x if x == Punct::RightShift as u32 => ">>".to_string(),
        x if x == Punct::ShrAssign as u32 => ">>=".to_string(),
        x if x == Punct::SubAssign as u32 => "-=".to_string(),
        x if x == Punct::XorAssign as u32 => "^=".to_string(),
        _ => format!("<punct:{}>", code),
    }
}

// ============================================================================
// Token Value
// ============================================================================

/// Type-specific payload of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    /// Decoded integer constant
    Int(i64),
    /// Decoded string/character contents (escapes resolved)
    Text(String),
    /// Punctuator code
    Code(u32),
    /// Argument index for `MacroArg`/`MacroString`
    Arg(usize),
    /// Explanation for an `Invalid` token
    Reason(String),
}

// ============================================================================
// Token
// ============================================================================

/// A preprocessing token. Immutable after creation.
///
/// `text` holds the raw source spelling; re-lexing it in isolation
/// reproduces the token. `line` is 1-based and `col` 0-based, or both -1
/// for synthetic tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: i32,
    pub col: i32,
    pub text: String,
    pub value: TokenValue,
}

impl Token {
    pub fn new(kind: TokenKind, line: i32, col: i32, text: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            col,
            text: text.into(),
            value: TokenValue::None,
        }
    }

    pub fn with_value(
        kind: TokenKind,
        line: i32,
        col: i32,
        text: impl Into<String>,
        value: TokenValue,
    ) -> Self {
        Self {
            kind,
            line,
            col,
            text: text.into(),
            value,
        }
    }

    /// A token with no source location.
    pub fn synthetic(kind: TokenKind, text: impl Into<String>, value: TokenValue) -> Self {
        Self::with_value(kind, -1, -1, text, value)
    }

    pub fn eof() -> Self {
        Self::synthetic(TokenKind::Eof, "", TokenValue::None)
    }

    /// A punctuator with canonical spelling.
    pub fn punct(line: i32, col: i32, code: u32) -> Self {
        Self::with_value(
            TokenKind::Punct,
            line,
            col,
            punct_text(code),
            TokenValue::Code(code),
        )
    }

    pub fn is_punct(&self, code: u32) -> bool {
        self.kind == TokenKind::Punct && self.value == TokenValue::Code(code)
    }

    pub fn punct_code(&self) -> Option<u32> {
        match (self.kind, &self.value) {
            (TokenKind::Punct, TokenValue::Code(c)) => Some(*c),
            _ => None,
        }
    }

    pub fn int_value(&self) -> Option<i64> {
        match &self.value {
            TokenValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn arg_index(&self) -> Option<usize> {
        match &self.value {
            TokenValue::Arg(i) => Some(*i),
            _ => None,
        }
    }

    /// True for whitespace, newlines and comments.
    pub fn is_space(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace
                | TokenKind::Newline
                | TokenKind::CComment
                | TokenKind::CppComment
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Format token kind name for diagnostics.
pub fn token_kind_name(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Identifier => "IDENTIFIER",
        TokenKind::Integer => "INTEGER",
        TokenKind::Character => "CHARACTER",
        TokenKind::StringLit => "STRING",
        TokenKind::Header => "HEADER",
        TokenKind::Whitespace => "WHITESPACE",
        TokenKind::CComment => "CCOMMENT",
        TokenKind::CppComment => "CPPCOMMENT",
        TokenKind::Newline => "NL",
        TokenKind::Hash => "HASH",
        TokenKind::Punct => "PUNCT",
        TokenKind::MacroArg => "M_ARG",
        TokenKind::MacroPaste => "M_PASTE",
        TokenKind::MacroString => "M_STRING",
        TokenKind::LineMarker => "P_LINE",
        TokenKind::Invalid => "INVALID",
        TokenKind::Eof => "EOF",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_punct_text_round_trip() {
        for code in [
            Punct::AndAssign,
            Punct::Arrow,
            Punct::Ellipsis,
            Punct::HashHash,
            Punct::ShlAssign,
            Punct::OrOrAssign,
        ] {
            let tok = Token::punct(1, 0, code.code());
            assert_eq!(tok.text, punct_text(code.code()));
            assert!(tok.is_punct(code.code()));
        }
        assert_eq!(punct_text(b'+' as u32), "+");
        assert_eq!(punct_text(Punct::Ellipsis.code()), "...");
    }

    #[test]
    fn test_synthetic_location() {
        let tok = Token::synthetic(TokenKind::Integer, "7", TokenValue::Int(7));
        assert_eq!(tok.line, -1);
        assert_eq!(tok.col, -1);
        assert_eq!(tok.int_value(), Some(7));
    }

    #[test]
    fn test_is_space() {
        assert!(Token::new(TokenKind::Whitespace, 1, 0, "  ").is_space());
        assert!(Token::new(TokenKind::CComment, 1, 0, "/* c */").is_space());
        assert!(!Token::new(TokenKind::Identifier, 1, 0, "x").is_space());
    }
}
