//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the pcpp project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Token sources and the source-stack frame
//

use crate::error::{Error, Reporter};
use crate::lexer::LexerSource;
use crate::macros::MacroTokenSource;
use crate::token::Token;

// ============================================================================
// FixedTokenSource
// ============================================================================

/// Plays back an in-memory token list, then reports `Eof` forever.
pub struct FixedTokenSource {
    name: String,
    tokens: Vec<Token>,
    idx: usize,
}

impl FixedTokenSource {
    pub fn new(name: impl Into<String>, tokens: Vec<Token>) -> Self {
        Self {
            name: name.into(),
            tokens,
            idx: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn token(&mut self) -> Token {
        match self.tokens.get(self.idx) {
            Some(t) => {
                self.idx += 1;
                t.clone()
            }
            None => Token::eof(),
        }
    }
}

// ============================================================================
// Source
// ============================================================================

/// The polymorphic token producers the driver stacks up.
pub(crate) enum Source {
    /// A lexed input (file- or string-backed)
    Lexer(LexerSource),
    /// Fixed playback (builtin expansions, argument pre-expansion, …)
    Fixed(FixedTokenSource),
    /// A macro replacement-list walk
    Macro(MacroTokenSource),
}

impl Source {
    pub fn token(&mut self, reports: &mut Reporter) -> Result<Token, Error> {
        match self {
            Source::Lexer(l) => l.token(reports),
            Source::Fixed(f) => Ok(f.token()),
            Source::Macro(m) => m.token(reports),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Source::Lexer(l) => l.name(),
            Source::Fixed(f) => f.name(),
            Source::Macro(m) => m.macro_name(),
        }
    }

    /// True for a lexer over a real file; only these get line markers.
    pub fn is_file_lexer(&self) -> bool {
        matches!(self, Source::Lexer(l) if l.is_file())
    }

    pub fn as_lexer_mut(&mut self) -> Option<&mut LexerSource> {
        match self {
            Source::Lexer(l) => Some(l),
            _ => None,
        }
    }
}

/// Stack entry: a source plus its driver bookkeeping.
pub(crate) struct SourceFrame {
    pub source: Source,
    /// Pop transparently when the source reports `Eof`; false for sources
    /// the driver drains by hand (argument pre-expansion, `#if` lines)
    pub auto_pop: bool,
}

impl SourceFrame {
    pub fn new(source: Source, auto_pop: bool) -> Self {
        Self { source, auto_pop }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{TokenKind, TokenValue};

    #[test]
    fn test_fixed_playback() {
        let toks = vec![
            Token::synthetic(TokenKind::Identifier, "a", TokenValue::None),
            Token::synthetic(TokenKind::Integer, "1", TokenValue::Int(1)),
        ];
        let mut src = FixedTokenSource::new("<test>", toks);
        assert_eq!(src.token().text, "a");
        assert_eq!(src.token().text, "1");
        assert_eq!(src.token().kind, TokenKind::Eof);
        // EOF is sticky
        assert_eq!(src.token().kind, TokenKind::Eof);
    }
}
