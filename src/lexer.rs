//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the pcpp project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Lexer - produces one preprocessing token per call
//

use crate::error::{Error, Reporter};
use crate::input::{JoinReader, EOF};
use crate::token::{Punct, Token, TokenKind, TokenValue};

// ============================================================================
// Character Classification
// ============================================================================

fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_ascii_alphabetic() || (!c.is_ascii() && c.is_alphabetic())
}

fn is_ident_cont(c: char) -> bool {
    c == '_'
        || c == '$'
        || c.is_ascii_alphanumeric()
        || (!c.is_ascii() && c.is_alphanumeric())
}

/// Format characters silently skipped inside identifiers.
fn is_ignorable(c: char) -> bool {
    matches!(c, '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}')
}

fn is_hspace(c: char) -> bool {
    c == ' ' || c == '\t'
}

// ============================================================================
// LexerSource
// ============================================================================

/// Tokenizer over one logical-character input.
///
/// Emits exactly one token per `token` call, including whitespace, comments
/// and newlines; the driver decides what survives. A missing final newline
/// is synthesized before `Eof`.
pub struct LexerSource {
    name: String,
    reader: JoinReader,
    /// Only whitespace/comments seen since the last newline
    bol: bool,
    /// Lexing the operand of an `#include` directive
    include: bool,
    digraphs: bool,
    /// Backed by a real file (drives line markers and quoted-include search)
    file: bool,
    emitted_eof: bool,
    last_nl: bool,
    /// Index into the system search path list this file was found at,
    /// for `#include_next`
    pub(crate) origin_index: Option<usize>,
}

impl LexerSource {
    pub fn new(name: impl Into<String>, text: &str, file: bool) -> Self {
        Self {
            name: name.into(),
            reader: JoinReader::new(text),
            bol: true,
            include: false,
            digraphs: false,
            file,
            emitted_eof: false,
            last_nl: true,
            origin_index: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 1-based line of the next character.
    pub fn line(&self) -> u32 {
        self.reader.line()
    }

    /// 0-based column of the next character.
    pub fn col(&self) -> u32 {
        self.reader.col()
    }

    pub fn is_file(&self) -> bool {
        self.file
    }

    pub(crate) fn set_include(&mut self, on: bool) {
        self.include = on;
    }

    pub(crate) fn set_digraphs(&mut self, on: bool) {
        self.digraphs = on;
    }

    /// Produce the next preprocessing token.
    pub(crate) fn token(&mut self, reports: &mut Reporter) -> Result<Token, Error> {
        let line = self.reader.line() as i32;
        let col = self.reader.col() as i32;
        let c = self.reader.next();

        if c == EOF {
            if !self.last_nl && !self.emitted_eof {
                // Input did not end with a newline
                self.last_nl = true;
                self.bol = true;
                return Ok(Token::new(TokenKind::Newline, line, col, "\n"));
            }
            self.emitted_eof = true;
            return Ok(Token::new(TokenKind::Eof, line, col, ""));
        }

        let ch = char::from_u32(c as u32).unwrap_or('\u{FFFD}');
        let tok = match ch {
            '\n' => self.newline_run(line, col),
            c if is_hspace(c) => self.whitespace_run(line, col, c),
            '/' => self.slash(line, col)?,
            '\'' => self.char_literal(line, col, reports)?,
            '"' => self.string_literal(line, col, reports)?,
            '<' if self.include => self.header_name(line, col),
            c if c.is_ascii_digit() => self.number(line, col, c),
            c if is_ident_start(c) => self.identifier(line, col, c),
            c => self.punctuator(line, col, c),
        };

        match tok.kind {
            TokenKind::Newline => self.bol = true,
            TokenKind::Whitespace | TokenKind::CComment | TokenKind::CppComment => {}
            _ => self.bol = false,
        }
        self.last_nl = tok.kind == TokenKind::Newline;
        Ok(tok)
    }

    /// At start of line outside `#include`, blank lines collapse into one
    /// token whose text carries the newline count.
    fn newline_run(&mut self, line: i32, col: i32) -> Token {
        let mut text = String::from("\n");
        if self.bol && !self.include {
            loop {
                let c = self.reader.next();
                if c == '\n' as i32 {
                    text.push('\n');
                } else {
                    self.reader.unread(c);
                    break;
                }
            }
        }
        Token::new(TokenKind::Newline, line, col, text)
    }

    fn whitespace_run(&mut self, line: i32, col: i32, first: char) -> Token {
        let mut text = String::new();
        text.push(first);
        loop {
            let c = self.reader.next();
            let ch = char::from_u32(c as u32).unwrap_or('\0');
            if c != EOF && is_hspace(ch) {
                text.push(ch);
            } else {
                self.reader.unread(c);
                break;
            }
        }
        Token::new(TokenKind::Whitespace, line, col, text)
    }

    fn slash(&mut self, line: i32, col: i32) -> Result<Token, Error> {
        let c = self.reader.next();
        match c {
            x if x == '/' as i32 => Ok(self.cpp_comment(line, col)),
            x if x == '*' as i32 => Ok(self.c_comment(line, col)),
            x if x == '=' as i32 => Ok(Token::punct(line, col, Punct::DivAssign.code())),
            _ => {
                self.reader.unread(c);
                Ok(Token::punct(line, col, '/' as u32))
            }
        }
    }

    fn cpp_comment(&mut self, line: i32, col: i32) -> Token {
        let mut text = String::from("//");
        loop {
            let c = self.reader.next();
            if c == EOF || c == '\n' as i32 {
                self.reader.unread(c);
                break;
            }
            text.push(char::from_u32(c as u32).unwrap_or('\u{FFFD}'));
        }
        Token::new(TokenKind::CppComment, line, col, text)
    }

    fn c_comment(&mut self, line: i32, col: i32) -> Token {
        let mut text = String::from("/*");
        let mut star = false;
        loop {
            let c = self.reader.next();
            if c == EOF {
                return Token::with_value(
                    TokenKind::Invalid,
                    line,
                    col,
                    text,
                    TokenValue::Reason("unterminated comment".to_string()),
                );
            }
            let ch = char::from_u32(c as u32).unwrap_or('\u{FFFD}');
            text.push(ch);
            if star && ch == '/' {
                break;
            }
            star = ch == '*';
        }
        Token::new(TokenKind::CComment, line, col, text)
    }

    fn identifier(&mut self, line: i32, col: i32, first: char) -> Token {
        let mut text = String::new();
        text.push(first);
        loop {
            let c = self.reader.next();
            if c == EOF {
                self.reader.unread(c);
                break;
            }
            let ch = char::from_u32(c as u32).unwrap_or('\0');
            if is_ignorable(ch) {
                continue;
            }
            if is_ident_cont(ch) {
                text.push(ch);
            } else {
                self.reader.unread(c);
                break;
            }
        }
        Token::new(TokenKind::Identifier, line, col, text)
    }

    fn number(&mut self, line: i32, col: i32, first: char) -> Token {
        let mut text = String::new();
        text.push(first);
        let mut value: u64 = 0;
        let mut bad: Option<String> = None;

        if first == '0' {
            let c = self.reader.next();
            if c == 'x' as i32 || c == 'X' as i32 {
                text.push(char::from_u32(c as u32).unwrap());
                let mut digits = 0;
                loop {
                    let d = self.reader.next();
                    let dh = char::from_u32(d as u32).unwrap_or('\0');
                    if d != EOF && dh.is_ascii_hexdigit() {
                        text.push(dh);
                        value = value
                            .wrapping_mul(16)
                            .wrapping_add(dh.to_digit(16).unwrap() as u64);
                        digits += 1;
                    } else {
                        self.reader.unread(d);
                        break;
                    }
                }
                if digits == 0 {
                    bad = Some("hexadecimal constant has no digits".to_string());
                }
            } else {
                // Octal (or a lone zero)
                self.reader.unread(c);
                loop {
                    let d = self.reader.next();
                    let dh = char::from_u32(d as u32).unwrap_or('\0');
                    if d != EOF && dh.is_ascii_digit() {
                        text.push(dh);
                        if dh > '7' && bad.is_none() {
                            bad = Some(format!("bad digit '{}' in octal constant", dh));
                        }
                        value = value
                            .wrapping_mul(8)
                            .wrapping_add(dh.to_digit(10).unwrap() as u64);
                    } else {
                        self.reader.unread(d);
                        break;
                    }
                }
            }
        } else {
            value = first.to_digit(10).unwrap() as u64;
            loop {
                let d = self.reader.next();
                let dh = char::from_u32(d as u32).unwrap_or('\0');
                if d != EOF && dh.is_ascii_digit() {
                    text.push(dh);
                    value = value
                        .wrapping_mul(10)
                        .wrapping_add(dh.to_digit(10).unwrap() as u64);
                } else {
                    self.reader.unread(d);
                    break;
                }
            }
        }

        // Suffix letters; anything alphabetic outside uUlLiI is an error
        loop {
            let d = self.reader.next();
            if d == EOF {
                self.reader.unread(d);
                break;
            }
            let dh = char::from_u32(d as u32).unwrap_or('\0');
            if is_ident_cont(dh) {
                text.push(dh);
                if !matches!(dh, 'u' | 'U' | 'l' | 'L' | 'i' | 'I') && bad.is_none() {
                    bad = Some(format!("invalid suffix '{}' on integer constant", dh));
                }
            } else {
                self.reader.unread(d);
                break;
            }
        }

        match bad {
            Some(reason) => {
                Token::with_value(TokenKind::Invalid, line, col, text, TokenValue::Reason(reason))
            }
            None => {
                Token::with_value(TokenKind::Integer, line, col, text, TokenValue::Int(value as i64))
            }
        }
    }

    /// Decode one escape sequence after a consumed backslash. Raw source
    /// characters are appended to `text`, the decoded result to `out`.
    fn escape(
        &mut self,
        text: &mut String,
        out: &mut String,
        line: i32,
        col: i32,
        reports: &mut Reporter,
    ) -> Result<(), Error> {
        let c = self.reader.next();
        if c == EOF {
            return Ok(());
        }
        let ch = char::from_u32(c as u32).unwrap_or('\u{FFFD}');
        match ch {
            'a' => {
                text.push(ch);
                out.push('\u{0007}');
            }
            'b' => {
                text.push(ch);
                out.push('\u{0008}');
            }
            'f' => {
                text.push(ch);
                out.push('\u{000C}');
            }
            'n' => {
                text.push(ch);
                out.push('\n');
            }
            'r' => {
                text.push(ch);
                out.push('\r');
            }
            't' => {
                text.push(ch);
                out.push('\t');
            }
            'v' => {
                text.push(ch);
                out.push('\u{000B}');
            }
            '\\' | '\'' | '"' => {
                text.push(ch);
                out.push(ch);
            }
            '0'..='7' => {
                let mut v = ch.to_digit(8).unwrap();
                text.push(ch);
                for _ in 0..2 {
                    let d = self.reader.next();
                    let dh = char::from_u32(d as u32).unwrap_or('\0');
                    if d != EOF && ('0'..='7').contains(&dh) {
                        text.push(dh);
                        v = v * 8 + dh.to_digit(8).unwrap();
                    } else {
                        self.reader.unread(d);
                        break;
                    }
                }
                out.push(char::from_u32(v).unwrap_or('\u{FFFD}'));
            }
            'x' => {
                text.push(ch);
                let mut v = 0u32;
                let mut digits = 0;
                for _ in 0..2 {
                    let d = self.reader.next();
                    let dh = char::from_u32(d as u32).unwrap_or('\0');
                    if d != EOF && dh.is_ascii_hexdigit() {
                        text.push(dh);
                        v = v * 16 + dh.to_digit(16).unwrap();
                        digits += 1;
                    } else {
                        self.reader.unread(d);
                        break;
                    }
                }
                if digits == 0 {
                    reports.warning(
                        &self.name,
                        line.max(0) as u32,
                        col.max(0) as u32,
                        "\\x used with no following hex digits",
                    )?;
                }
                out.push(char::from_u32(v).unwrap_or('\u{FFFD}'));
            }
            _ => {
                reports.warning(
                    &self.name,
                    line.max(0) as u32,
                    col.max(0) as u32,
                    &format!("unknown escape sequence '\\{}'", ch),
                )?;
                text.push(ch);
                out.push(ch);
            }
        }
        Ok(())
    }

    fn char_literal(
        &mut self,
        line: i32,
        col: i32,
        reports: &mut Reporter,
    ) -> Result<Token, Error> {
        let mut text = String::from("'");
        let mut value = String::new();
        loop {
            let c = self.reader.next();
            if c == EOF || c == '\n' as i32 {
                self.reader.unread(c);
                return Ok(Token::with_value(
                    TokenKind::Invalid,
                    line,
                    col,
                    text,
                    TokenValue::Reason("unterminated character literal".to_string()),
                ));
            }
            let ch = char::from_u32(c as u32).unwrap_or('\u{FFFD}');
            if ch == '\'' {
                text.push('\'');
                break;
            }
            if ch == '\\' {
                text.push('\\');
                self.escape(&mut text, &mut value, line, col, reports)?;
            } else {
                text.push(ch);
                value.push(ch);
            }
        }
        if value.is_empty() {
            return Ok(Token::with_value(
                TokenKind::Invalid,
                line,
                col,
                text,
                TokenValue::Reason("empty character literal".to_string()),
            ));
        }
        Ok(Token::with_value(
            TokenKind::Character,
            line,
            col,
            text,
            TokenValue::Text(value),
        ))
    }

    fn string_literal(
        &mut self,
        line: i32,
        col: i32,
        reports: &mut Reporter,
    ) -> Result<Token, Error> {
        let mut text = String::from("\"");
        let mut value = String::new();
        loop {
            let c = self.reader.next();
            if c == EOF || c == '\n' as i32 {
                self.reader.unread(c);
                return Ok(Token::with_value(
                    TokenKind::Invalid,
                    line,
                    col,
                    text,
                    TokenValue::Reason("unterminated string literal".to_string()),
                ));
            }
            let ch = char::from_u32(c as u32).unwrap_or('\u{FFFD}');
            if ch == '"' {
                text.push('"');
                break;
            }
            if ch == '\\' && !self.include {
                text.push('\\');
                self.escape(&mut text, &mut value, line, col, reports)?;
            } else {
                // Inside #include, backslashes are path characters
                text.push(ch);
                value.push(ch);
            }
        }
        Ok(Token::with_value(
            TokenKind::StringLit,
            line,
            col,
            text,
            TokenValue::Text(value),
        ))
    }

    fn header_name(&mut self, line: i32, col: i32) -> Token {
        let mut text = String::from("<");
        let mut value = String::new();
        loop {
            let c = self.reader.next();
            if c == EOF || c == '\n' as i32 {
                self.reader.unread(c);
                return Token::with_value(
                    TokenKind::Invalid,
                    line,
                    col,
                    text,
                    TokenValue::Reason("unterminated header name".to_string()),
                );
            }
            let ch = char::from_u32(c as u32).unwrap_or('\u{FFFD}');
            text.push(ch);
            if ch == '>' {
                break;
            }
            value.push(ch);
        }
        Token::with_value(TokenKind::Header, line, col, text, TokenValue::Text(value))
    }

    /// Longest-match punctuator scan, with digraph mapping when enabled.
    fn punctuator(&mut self, line: i32, col: i32, first: char) -> Token {
        let punct = |code: u32| Token::punct(line, col, code);

        match first {
            '&' => {
                if self.accept('&') {
                    if self.accept('=') {
                        punct(Punct::AndAndAssign.code())
                    } else {
                        punct(Punct::LogicalAnd.code())
                    }
                } else if self.accept('=') {
                    punct(Punct::AndAssign.code())
                } else {
                    punct('&' as u32)
                }
            }
            '|' => {
                if self.accept('|') {
                    if self.accept('=') {
                        punct(Punct::OrOrAssign.code())
                    } else {
                        punct(Punct::LogicalOr.code())
                    }
                } else if self.accept('=') {
                    punct(Punct::OrAssign.code())
                } else {
                    punct('|' as u32)
                }
            }
            '+' => {
                if self.accept('+') {
                    punct(Punct::Increment.code())
                } else if self.accept('=') {
                    punct(Punct::AddAssign.code())
                } else {
                    punct('+' as u32)
                }
            }
            '-' => {
                if self.accept('-') {
                    punct(Punct::Decrement.code())
                } else if self.accept('=') {
                    punct(Punct::SubAssign.code())
                } else if self.accept('>') {
                    punct(Punct::Arrow.code())
                } else {
                    punct('-' as u32)
                }
            }
            '*' => {
                if self.accept('=') {
                    punct(Punct::MulAssign.code())
                } else {
                    punct('*' as u32)
                }
            }
            '=' => {
                if self.accept('=') {
                    punct(Punct::Equal.code())
                } else {
                    punct('=' as u32)
                }
            }
            '!' => {
                if self.accept('=') {
                    punct(Punct::NotEqual.code())
                } else {
                    punct('!' as u32)
                }
            }
            '^' => {
                if self.accept('=') {
                    punct(Punct::XorAssign.code())
                } else {
                    punct('^' as u32)
                }
            }
            '%' => {
                if self.accept('=') {
                    punct(Punct::ModAssign.code())
                } else if self.digraphs && self.accept('>') {
                    punct('}' as u32)
                } else if self.digraphs && self.accept(':') {
                    // %: is #, %:%: is ##
                    if self.accept_seq2('%', ':') {
                        punct(Punct::HashHash.code())
                    } else {
                        self.hash_token(line, col)
                    }
                } else {
                    punct('%' as u32)
                }
            }
            '<' => {
                if self.accept('=') {
                    punct(Punct::Lte.code())
                } else if self.accept('<') {
                    if self.accept('=') {
                        punct(Punct::ShlAssign.code())
                    } else {
                        punct(Punct::LeftShift.code())
                    }
                } else if self.digraphs && self.accept(':') {
                    punct('[' as u32)
                } else if self.digraphs && self.accept('%') {
                    punct('{' as u32)
                } else {
                    punct('<' as u32)
                }
            }
            '>' => {
                if self.accept('=') {
                    punct(Punct::Gte.code())
                } else if self.accept('>') {
                    if self.accept('=') {
                        punct(Punct::ShrAssign.code())
                    } else {
                        punct(Punct::RightShift.code())
                    }
                } else {
                    punct('>' as u32)
                }
            }
            ':' => {
                if self.digraphs && self.accept('>') {
                    punct(']' as u32)
                } else {
                    punct(':' as u32)
                }
            }
            '.' => {
                if self.accept('.') {
                    if self.accept('.') {
                        punct(Punct::Ellipsis.code())
                    } else {
                        punct(Punct::DotDot.code())
                    }
                } else {
                    punct('.' as u32)
                }
            }
            '#' => {
                if self.bol {
                    self.hash_token(line, col)
                } else if self.accept('#') {
                    punct(Punct::HashHash.code())
                } else {
                    punct('#' as u32)
                }
            }
            c if c.is_ascii() && !c.is_ascii_control() => punct(c as u32),
            c if c.is_ascii_control() => Token::with_value(
                TokenKind::Invalid,
                line,
                col,
                c.to_string(),
                TokenValue::Reason(format!("illegal control character 0x{:02x}", c as u32)),
            ),
            c => Token::with_value(
                TokenKind::Invalid,
                line,
                col,
                c.to_string(),
                TokenValue::Reason(format!("illegal character U+{:04X}", c as u32)),
            ),
        }
    }

    /// A `#` (or `%:`) opening a logical line starts a directive.
    fn hash_token(&self, line: i32, col: i32) -> Token {
        if self.bol {
            Token::new(TokenKind::Hash, line, col, "#")
        } else {
            Token::punct(line, col, '#' as u32)
        }
    }

    /// Consume the next character if it equals `want`.
    fn accept(&mut self, want: char) -> bool {
        let c = self.reader.next();
        if c == want as i32 {
            true
        } else {
            self.reader.unread(c);
            false
        }
    }

    /// Consume the two-character sequence `a b` if both match; on partial
    /// match everything is unread.
    fn accept_seq2(&mut self, a: char, b: char) -> bool {
        let c = self.reader.next();
        if c != a as i32 {
            self.reader.unread(c);
            return false;
        }
        let d = self.reader.next();
        if d != b as i32 {
            self.reader.unread(d);
            self.reader.unread(c);
            return false;
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(input: &str) -> Vec<Token> {
        let mut reports = Reporter::new();
        reports.listener = Some(Box::new(crate::error::LogListener));
        let mut lexer = LexerSource::new("<test>", input, false);
        let mut out = Vec::new();
        loop {
            let tok = lexer.token(&mut reports).unwrap();
            let done = tok.kind == TokenKind::Eof;
            out.push(tok);
            if done {
                return out;
            }
        }
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    fn nonspace(input: &str) -> Vec<Token> {
        lex_all(input)
            .into_iter()
            .filter(|t| !t.is_space() && t.kind != TokenKind::Eof)
            .collect()
    }

    #[test]
    fn test_identifiers_and_whitespace() {
        let toks = lex_all("int  main\n");
        assert_eq!(
            kinds(&toks),
            vec![
                TokenKind::Identifier,
                TokenKind::Whitespace,
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
        assert_eq!(toks[0].text, "int");
        assert_eq!(toks[1].text, "  ");
        assert_eq!(toks[2].text, "main");
    }

    #[test]
    fn test_dollar_identifier() {
        let toks = nonspace("$foo a$b\n");
        assert_eq!(toks[0].text, "$foo");
        assert_eq!(toks[1].text, "a$b");
    }

    #[test]
    fn test_numbers() {
        let toks = nonspace("42 0x2a 052 0 42ul\n");
        for t in &toks {
            assert_eq!(t.kind, TokenKind::Integer, "{:?}", t);
            if t.text != "0" {
                assert_eq!(t.int_value(), Some(42), "{:?}", t);
            }
        }
        assert_eq!(toks[4].text, "42ul");
    }

    #[test]
    fn test_bad_number_suffix() {
        let toks = nonspace("42q\n");
        assert_eq!(toks[0].kind, TokenKind::Invalid);
        assert_eq!(toks[0].text, "42q");
    }

    #[test]
    fn test_bad_octal_digit() {
        let toks = nonspace("09\n");
        assert_eq!(toks[0].kind, TokenKind::Invalid);
    }

    #[test]
    fn test_string_escapes() {
        let toks = nonspace(r#""a\tb" "\x41" "\101""#);
        assert_eq!(toks[0].value, TokenValue::Text("a\tb".to_string()));
        assert_eq!(toks[1].value, TokenValue::Text("A".to_string()));
        assert_eq!(toks[2].value, TokenValue::Text("A".to_string()));
        assert_eq!(toks[0].text, r#""a\tb""#);
    }

    #[test]
    fn test_char_literal() {
        let toks = nonspace(r"'a' '\n' '\''");
        assert_eq!(toks[0].value, TokenValue::Text("a".to_string()));
        assert_eq!(toks[1].value, TokenValue::Text("\n".to_string()));
        assert_eq!(toks[2].value, TokenValue::Text("'".to_string()));
    }

    #[test]
    fn test_empty_char_is_invalid() {
        let toks = nonspace("''");
        assert_eq!(toks[0].kind, TokenKind::Invalid);
    }

    #[test]
    fn test_unterminated_string() {
        let toks = nonspace("\"abc\nx");
        assert_eq!(toks[0].kind, TokenKind::Invalid);
        // The newline is preserved so line accounting survives
        assert_eq!(toks[1].text, "x");
        assert_eq!(toks[1].line, 2);
    }

    #[test]
    fn test_comments() {
        let toks = lex_all("a /* b */ // c\n");
        let kindv = kinds(&toks);
        assert!(kindv.contains(&TokenKind::CComment));
        assert!(kindv.contains(&TokenKind::CppComment));
        let cc = toks.iter().find(|t| t.kind == TokenKind::CComment).unwrap();
        assert_eq!(cc.text, "/* b */");
        let cpp = toks.iter().find(|t| t.kind == TokenKind::CppComment).unwrap();
        assert_eq!(cpp.text, "// c");
    }

    #[test]
    fn test_unterminated_comment() {
        let toks = nonspace("/* never ends");
        assert_eq!(toks[0].kind, TokenKind::Invalid);
    }

    #[test]
    fn test_punctuators_longest_match() {
        let toks = nonspace("<<= >>= ... .. -> ++ && &&= || ||= ## <= >=\n");
        let codes: Vec<u32> = toks.iter().map(|t| t.punct_code().unwrap()).collect();
        assert_eq!(
            codes,
            vec![
                Punct::ShlAssign.code(),
                Punct::ShrAssign.code(),
                Punct::Ellipsis.code(),
                Punct::DotDot.code(),
                Punct::Arrow.code(),
                Punct::Increment.code(),
                Punct::LogicalAnd.code(),
                Punct::AndAndAssign.code(),
                Punct::LogicalOr.code(),
                Punct::OrOrAssign.code(),
                Punct::HashHash.code(),
                Punct::Lte.code(),
                Punct::Gte.code(),
            ]
        );
    }

    #[test]
    fn test_punct_text_is_canonical() {
        for t in nonspace("<<= && ... ->\n") {
            assert_eq!(t.text, crate::token::punct_text(t.punct_code().unwrap()));
        }
    }

    #[test]
    fn test_digraphs() {
        let mut reports = Reporter::new();
        let mut lexer = LexerSource::new("<test>", "<: :> <% %> x %:%: y\n", false);
        lexer.set_digraphs(true);
        // Skip the leading-hash case: first token is at start of line
        let mut toks = Vec::new();
        loop {
            let t = lexer.token(&mut reports).unwrap();
            if t.kind == TokenKind::Eof {
                break;
            }
            if !t.is_space() {
                toks.push(t);
            }
        }
        assert_eq!(toks[0].text, "[");
        assert_eq!(toks[1].text, "]");
        assert_eq!(toks[2].text, "{");
        assert_eq!(toks[3].text, "}");
        assert!(toks[5].is_punct(Punct::HashHash.code()));
    }

    #[test]
    fn test_digraphs_disabled() {
        let toks = nonspace("a<:b\n");
        assert_eq!(toks[1].text, "<");
        assert_eq!(toks[2].text, ":");
    }

    #[test]
    fn test_hash_at_line_start() {
        let toks = nonspace("#define x\ny # z\n");
        assert_eq!(toks[0].kind, TokenKind::Hash);
        // A hash in the middle of a line is an ordinary punctuator
        let mid = &toks[4];
        assert!(mid.is_punct('#' as u32));
    }

    #[test]
    fn test_hash_after_leading_space() {
        let toks = nonspace("  #if\n");
        assert_eq!(toks[0].kind, TokenKind::Hash);
    }

    #[test]
    fn test_newline_collapse() {
        let toks = lex_all("a\n\n\nb\n");
        let nls: Vec<&Token> = toks.iter().filter(|t| t.kind == TokenKind::Newline).collect();
        // One NL after `a` starting the run is not at BOL, so: a, NL, NL(x2), b, NL
        assert_eq!(nls[0].text, "\n");
        assert_eq!(nls[1].text, "\n\n");
    }

    #[test]
    fn test_line_splice_in_identifier() {
        let toks = nonspace("fo\\\no\n");
        assert_eq!(toks[0].text, "foo");
    }

    #[test]
    fn test_missing_final_newline() {
        let toks = lex_all("x");
        assert_eq!(
            kinds(&toks),
            vec![TokenKind::Identifier, TokenKind::Newline, TokenKind::Eof]
        );
    }

    #[test]
    fn test_header_name_mode() {
        let mut reports = Reporter::new();
        let mut lexer = LexerSource::new("<test>", "<stdio.h> \"my\\dir\"\n", false);
        lexer.set_include(true);
        let h = lexer.token(&mut reports).unwrap();
        assert_eq!(h.kind, TokenKind::Header);
        assert_eq!(h.value, TokenValue::Text("stdio.h".to_string()));
        let _sp = lexer.token(&mut reports).unwrap();
        let s = lexer.token(&mut reports).unwrap();
        assert_eq!(s.kind, TokenKind::StringLit);
        // Backslash is a path character, not an escape
        assert_eq!(s.value, TokenValue::Text("my\\dir".to_string()));
    }

    #[test]
    fn test_token_locations() {
        let toks = lex_all("ab cd\nef\n");
        assert_eq!((toks[0].line, toks[0].col), (1, 0));
        assert_eq!((toks[2].line, toks[2].col), (1, 3));
        let ef = toks.iter().find(|t| t.text == "ef").unwrap();
        assert_eq!((ef.line, ef.col), (2, 0));
    }

    #[test]
    fn test_control_character() {
        let toks = nonspace("\u{1}\n");
        assert_eq!(toks[0].kind, TokenKind::Invalid);
    }
}
