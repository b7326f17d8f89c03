//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the pcpp project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Macro definitions and replacement-list playback
//

use crate::error::{Error, Reporter};
use crate::lexer::LexerSource;
use crate::token::{Punct, Token, TokenKind, TokenValue};

// ============================================================================
// Macro Definition
// ============================================================================

/// Built-in pseudo-macros with synthesized expansions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinMacro {
    Line,
    File,
    Counter,
}

/// A stored macro.
///
/// The replacement list may contain `MacroArg(i)`, `MacroString(i)` and
/// `MacroPaste` marker tokens. Paste is a prefix marker: `a##b` is stored
/// `PASTE a b` and `a##b##c` as `PASTE a PASTE b c`, so playback never
/// needs look-back.
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    /// `Some` marks a function-like macro. For variadic macros the list
    /// ends with the synthetic parameter `__VA_ARGS__`.
    pub params: Option<Vec<String>>,
    pub variadic: bool,
    pub body: Vec<Token>,
    pub builtin: Option<BuiltinMacro>,
}

impl MacroDef {
    pub fn object(name: impl Into<String>, body: Vec<Token>) -> Self {
        Self {
            name: name.into(),
            params: None,
            variadic: false,
            body,
            builtin: None,
        }
    }

    pub fn function(
        name: impl Into<String>,
        params: Vec<String>,
        variadic: bool,
        body: Vec<Token>,
    ) -> Self {
        Self {
            name: name.into(),
            params: Some(params),
            variadic,
            body,
            builtin: None,
        }
    }

    pub fn builtin(name: impl Into<String>, builtin: BuiltinMacro) -> Self {
        Self {
            name: name.into(),
            params: None,
            variadic: false,
            body: Vec::new(),
            builtin: Some(builtin),
        }
    }

    pub fn is_function(&self) -> bool {
        self.params.is_some()
    }

    /// Number of arguments a call must supply, counting `__VA_ARGS__`.
    pub fn arity(&self) -> usize {
        self.params.as_ref().map(|p| p.len()).unwrap_or(0)
    }
}

// ============================================================================
// Replacement-List Construction
// ============================================================================

/// Rewrite collected `#define` body tokens into a replacement list:
/// parameter identifiers become `MacroArg(i)`, `#`-parameter becomes
/// `MacroString(i)`, `##` becomes a prefix `MacroPaste` inserted before the
/// preceding element. Whitespace is trimmed at the ends and coalesced to a
/// single space inside.
pub(crate) fn build_replacement_list(
    tokens: &[Token],
    params: Option<&[String]>,
) -> Result<Vec<Token>, String> {
    let param_index = |name: &str| -> Option<usize> {
        params.and_then(|ps| ps.iter().position(|p| p == name))
    };

    let mut out: Vec<Token> = Vec::new();
    let mut i = 0;

    // Skip leading whitespace
    while i < tokens.len() && tokens[i].is_space() {
        i += 1;
    }

    while i < tokens.len() {
        let tok = &tokens[i];

        if tok.is_space() {
            // Coalesce a run into one space
            while i < tokens.len() && tokens[i].is_space() {
                i += 1;
            }
            if i < tokens.len() {
                out.push(Token::synthetic(
                    TokenKind::Whitespace,
                    " ",
                    TokenValue::None,
                ));
            }
            continue;
        }

        if tok.is_punct(Punct::HashHash.code()) {
            while out.last().map(|t| t.is_space()).unwrap_or(false) {
                out.pop();
            }
            if out.is_empty() {
                return Err("'##' cannot appear at the start of a replacement list".to_string());
            }
            let paste = Token::synthetic(TokenKind::MacroPaste, "##", TokenValue::None);
            out.insert(out.len() - 1, paste);
            i += 1;
            // The next operand attaches directly
            while i < tokens.len() && tokens[i].is_space() {
                i += 1;
            }
            if i >= tokens.len() {
                return Err("'##' cannot appear at the end of a replacement list".to_string());
            }
            continue;
        }

        if params.is_some() && (tok.kind == TokenKind::Hash || tok.is_punct('#' as u32)) {
            // Stringify: '#' must be followed by a parameter name
            let mut j = i + 1;
            while j < tokens.len() && tokens[j].is_space() {
                j += 1;
            }
            match tokens.get(j) {
                Some(t) if t.kind == TokenKind::Identifier => match param_index(&t.text) {
                    Some(idx) => {
                        out.push(Token::synthetic(
                            TokenKind::MacroString,
                            format!("#{}", t.text),
                            TokenValue::Arg(idx),
                        ));
                        i = j + 1;
                        continue;
                    }
                    None => {
                        return Err(format!(
                            "'#' is not followed by a macro parameter ('{}')",
                            t.text
                        ));
                    }
                },
                _ => {
                    return Err("'#' is not followed by a macro parameter".to_string());
                }
            }
        }

        if tok.kind == TokenKind::Identifier {
            if let Some(idx) = param_index(&tok.text) {
                out.push(Token::synthetic(
                    TokenKind::MacroArg,
                    tok.text.clone(),
                    TokenValue::Arg(idx),
                ));
                i += 1;
                continue;
            }
        }

        out.push(tok.clone());
        i += 1;
    }

    Ok(out)
}

// ============================================================================
// Macro Arguments
// ============================================================================

/// One actual argument of a function-like macro call: the raw tokens as
/// delimited at the call site, and their expansion, computed once before
/// the replacement walk and reused for every `MacroArg` reference.
/// Stringification always reads the raw form.
#[derive(Debug, Clone)]
pub(crate) struct MacroArg {
    pub raw: Vec<Token>,
    pub expanded: Vec<Token>,
}

// ============================================================================
// MacroTokenSource
// ============================================================================

/// Plays back a macro's replacement list with argument substitution,
/// stringification, and paste re-lexing.
pub(crate) struct MacroTokenSource {
    name: String,
    body: Vec<Token>,
    idx: usize,
    args: Vec<MacroArg>,
    /// Tokens produced by re-lexing a paste buffer, delivered in place
    queue: std::collections::VecDeque<Token>,
    /// Active argument sub-iterator: (argument index, position)
    arg_iter: Option<(usize, usize)>,
}

impl MacroTokenSource {
    pub fn new(def: &MacroDef, args: Vec<MacroArg>) -> Self {
        Self {
            name: def.name.clone(),
            body: def.body.clone(),
            idx: 0,
            args,
            queue: std::collections::VecDeque::new(),
            arg_iter: None,
        }
    }

    pub fn macro_name(&self) -> &str {
        &self.name
    }

    /// Recursion guard: this source expands `name` unless it is currently
    /// inside an argument sub-iterator, whose contents may legitimately
    /// mention the macro again.
    pub fn is_expanding(&self, name: &str) -> bool {
        self.name == name && self.arg_iter.is_none()
    }

    pub fn token(&mut self, reports: &mut Reporter) -> Result<Token, Error> {
        loop {
            if let Some(t) = self.queue.pop_front() {
                return Ok(t);
            }

            if let Some((ai, pos)) = self.arg_iter {
                match self.args[ai].expanded.get(pos) {
                    Some(t) => {
                        let t = t.clone();
                        self.arg_iter = Some((ai, pos + 1));
                        return Ok(t);
                    }
                    None => self.arg_iter = None,
                }
                continue;
            }

            let Some(tok) = self.body.get(self.idx) else {
                return Ok(Token::eof());
            };
            let tok = tok.clone();
            self.idx += 1;

            match tok.kind {
                TokenKind::MacroArg => {
                    let ai = tok.arg_index().expect("MacroArg carries its index");
                    self.arg_iter = Some((ai, 0));
                }
                TokenKind::MacroString => {
                    let ai = tok.arg_index().expect("MacroString carries its index");
                    return Ok(self.stringify(ai));
                }
                TokenKind::MacroPaste => {
                    self.paste(reports)?;
                }
                _ => return Ok(tok),
            }
        }
    }

    /// Convert argument `ai`'s raw tokens to one string literal, escaping
    /// backslashes and double quotes.
    fn stringify(&self, ai: usize) -> Token {
        let mut raw = String::new();
        if let Some(arg) = self.args.get(ai) {
            for t in &arg.raw {
                raw.push_str(&t.text);
            }
        }
        let mut text = String::from("\"");
        for ch in raw.chars() {
            match ch {
                '\\' => text.push_str("\\\\"),
                '"' => text.push_str("\\\""),
                _ => text.push(ch),
            }
        }
        text.push('"');
        Token::synthetic(TokenKind::StringLit, text, TokenValue::Text(raw))
    }

    /// Concatenate paste operands into a buffer and re-lex it, queueing the
    /// produced tokens. A nested `MacroPaste` among the operands extends the
    /// chain by one more operand. Whitespace and comments among operands are
    /// skipped.
    fn paste(&mut self, reports: &mut Reporter) -> Result<(), Error> {
        let mut buf = String::new();
        let mut need = 2;

        while need > 0 {
            // Find the next non-space element
            let tok = loop {
                match self.body.get(self.idx) {
                    Some(t) if t.is_space() => self.idx += 1,
                    Some(t) => break Some(t.clone()),
                    None => break None,
                }
            };

            let Some(tok) = tok else {
                reports.warning(
                    &self.name,
                    0,
                    0,
                    "'##' at the end of a replacement list has no operand",
                )?;
                self.queue
                    .push_back(Token::synthetic(TokenKind::Punct, "##", TokenValue::Code(Punct::HashHash.code())));
                return Ok(());
            };
            self.idx += 1;

            match tok.kind {
                TokenKind::MacroPaste => {
                    // One operand slot becomes two
                    need += 1;
                }
                TokenKind::MacroArg => {
                    let ai = tok.arg_index().expect("MacroArg carries its index");
                    if let Some(arg) = self.args.get(ai) {
                        for t in &arg.raw {
                            buf.push_str(&t.text);
                        }
                    }
                    need -= 1;
                }
                _ => {
                    buf.push_str(&tok.text);
                    need -= 1;
                }
            }
        }

        let mut lexer = LexerSource::new("<paste>", &buf, false);
        loop {
            let t = lexer.token(reports)?;
            match t.kind {
                TokenKind::Eof => break,
                // The synthesized final newline is not part of the paste
                TokenKind::Newline => continue,
                _ => self.queue.push_back(t),
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        let mut reports = Reporter::new();
        reports.listener = Some(Box::new(crate::error::LogListener));
        let mut lexer = LexerSource::new("<test>", input, false);
        let mut out = Vec::new();
        loop {
            let t = lexer.token(&mut reports).unwrap();
            match t.kind {
                TokenKind::Eof => return out,
                TokenKind::Newline => continue,
                _ => out.push(t),
            }
        }
    }

    fn drain(src: &mut MacroTokenSource) -> Vec<Token> {
        let mut reports = Reporter::new();
        reports.listener = Some(Box::new(crate::error::LogListener));
        let mut out = Vec::new();
        loop {
            let t = src.token(&mut reports).unwrap();
            if t.kind == TokenKind::Eof {
                return out;
            }
            out.push(t);
        }
    }

    fn texts(tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .filter(|t| !t.is_space())
            .map(|t| t.text.clone())
            .collect()
    }

    fn arg(raw: &str) -> MacroArg {
        let raw = lex(raw);
        MacroArg {
            expanded: raw.clone(),
            raw,
        }
    }

    #[test]
    fn test_build_simple_body() {
        let body = build_replacement_list(&lex("1 + 2"), None).unwrap();
        assert_eq!(texts(&body), vec!["1", "+", "2"]);
    }

    #[test]
    fn test_build_param_rewrite() {
        let params = vec!["x".to_string(), "y".to_string()];
        let body = build_replacement_list(&lex("x + y + x"), Some(&params)).unwrap();
        let kinds: Vec<TokenKind> = body.iter().filter(|t| !t.is_space()).map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::MacroArg,
                TokenKind::Punct,
                TokenKind::MacroArg,
                TokenKind::Punct,
                TokenKind::MacroArg,
            ]
        );
        let indices: Vec<usize> = body.iter().filter_map(|t| t.arg_index()).collect();
        assert_eq!(indices, vec![0, 1, 0]);
    }

    #[test]
    fn test_build_stringify() {
        let params = vec!["x".to_string()];
        let body = build_replacement_list(&lex("#x"), Some(&params)).unwrap();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].kind, TokenKind::MacroString);
        assert_eq!(body[0].arg_index(), Some(0));
    }

    #[test]
    fn test_build_stringify_non_param_fails() {
        let params = vec!["x".to_string()];
        assert!(build_replacement_list(&lex("#z"), Some(&params)).is_err());
    }

    #[test]
    fn test_build_paste_prefix_encoding() {
        let params = vec!["a".to_string(), "b".to_string()];
        let body = build_replacement_list(&lex("a##b"), Some(&params)).unwrap();
        let kinds: Vec<TokenKind> = body.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::MacroPaste, TokenKind::MacroArg, TokenKind::MacroArg]
        );
    }

    #[test]
    fn test_build_paste_chain() {
        let body = build_replacement_list(&lex("a##b##c"), None).unwrap();
        let kinds: Vec<TokenKind> = body.iter().map(|t| t.kind).collect();
        // a##b##c => PASTE a PASTE b c
        assert_eq!(
            kinds,
            vec![
                TokenKind::MacroPaste,
                TokenKind::Identifier,
                TokenKind::MacroPaste,
                TokenKind::Identifier,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn test_build_paste_at_edges_fails() {
        // Drop the leading token so the '##' is not at start of line,
        // where the lexer would read the first '#' as a directive hash
        let toks = lex("q ##x");
        assert!(build_replacement_list(&toks[1..], None).is_err());
        assert!(build_replacement_list(&lex("x##"), None).is_err());
    }

    #[test]
    fn test_whitespace_trim_and_coalesce() {
        let body = build_replacement_list(&lex("  a   b  "), None).unwrap();
        let shape: Vec<(TokenKind, String)> =
            body.iter().map(|t| (t.kind, t.text.clone())).collect();
        assert_eq!(
            shape,
            vec![
                (TokenKind::Identifier, "a".to_string()),
                (TokenKind::Whitespace, " ".to_string()),
                (TokenKind::Identifier, "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_playback_object_body() {
        let def = MacroDef::object("X", build_replacement_list(&lex("1 + 2"), None).unwrap());
        let mut src = MacroTokenSource::new(&def, Vec::new());
        assert_eq!(texts(&drain(&mut src)), vec!["1", "+", "2"]);
    }

    #[test]
    fn test_playback_argument_substitution() {
        let params = vec!["x".to_string()];
        let body = build_replacement_list(&lex("x + x"), Some(&params)).unwrap();
        let def = MacroDef::function("D", params, false, body);
        let mut src = MacroTokenSource::new(&def, vec![arg("7")]);
        assert_eq!(texts(&drain(&mut src)), vec!["7", "+", "7"]);
    }

    #[test]
    fn test_playback_stringify() {
        let params = vec!["x".to_string()];
        let body = build_replacement_list(&lex("#x"), Some(&params)).unwrap();
        let def = MacroDef::function("S", params, false, body);
        let mut src = MacroTokenSource::new(&def, vec![arg("a b")]);
        let out = drain(&mut src);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, TokenKind::StringLit);
        assert_eq!(out[0].text, "\"a b\"");
        assert_eq!(out[0].value, TokenValue::Text("a b".to_string()));
    }

    #[test]
    fn test_stringify_escapes() {
        let params = vec!["x".to_string()];
        let body = build_replacement_list(&lex("#x"), Some(&params)).unwrap();
        let def = MacroDef::function("S", params, false, body);
        let mut src = MacroTokenSource::new(&def, vec![arg(r#""q\n""#)]);
        let out = drain(&mut src);
        assert_eq!(out[0].text, r#""\"q\\n\"""#);
    }

    #[test]
    fn test_playback_paste_relex() {
        let params = vec!["a".to_string(), "b".to_string()];
        let body = build_replacement_list(&lex("a##b"), Some(&params)).unwrap();
        let def = MacroDef::function("P", params, false, body);
        let mut src = MacroTokenSource::new(&def, vec![arg("foo"), arg("42")]);
        let out = drain(&mut src);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, TokenKind::Identifier);
        assert_eq!(out[0].text, "foo42");
    }

    #[test]
    fn test_paste_chain_three() {
        let body = build_replacement_list(&lex("do##ne##ss"), None).unwrap();
        let def = MacroDef::object("T", body);
        let mut src = MacroTokenSource::new(&def, Vec::new());
        let out = drain(&mut src);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "doness");
    }

    #[test]
    fn test_paste_forms_number() {
        let params = vec!["a".to_string(), "b".to_string()];
        let body = build_replacement_list(&lex("a##b"), Some(&params)).unwrap();
        let def = MacroDef::function("P", params, false, body);
        let mut src = MacroTokenSource::new(&def, vec![arg("4"), arg("2")]);
        let out = drain(&mut src);
        assert_eq!(out[0].kind, TokenKind::Integer);
        assert_eq!(out[0].int_value(), Some(42));
    }

    #[test]
    fn test_is_expanding_inside_argument() {
        let params = vec!["x".to_string()];
        let body = build_replacement_list(&lex("x"), Some(&params)).unwrap();
        let def = MacroDef::function("M", params, false, body);
        let mut src = MacroTokenSource::new(&def, vec![arg("M")]);
        assert!(src.is_expanding("M"));
        let mut reports = Reporter::new();
        // First pull switches to the argument sub-iterator
        let t = src.token(&mut reports).unwrap();
        assert_eq!(t.text, "M");
        assert!(!src.is_expanding("M"));
    }
}
