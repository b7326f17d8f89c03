//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the pcpp project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Preprocessor driver - source stack, directives, macro expansion,
// include resolution, line markers
//

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use crate::error::{Error, Listener, Reporter, SourceEvent};
use crate::expr::{parse_include_name, ExprEvaluator};
use crate::features::{Feature, FeatureSet, Warning};
use crate::lexer::LexerSource;
use crate::macros::{build_replacement_list, BuiltinMacro, MacroArg, MacroDef, MacroTokenSource};
use crate::source::{FixedTokenSource, Source, SourceFrame};
use crate::state::ConditionalStack;
use crate::token::{Token, TokenKind, TokenValue};
use crate::vfs::{LocalFileSystem, VirtualFile, VirtualFileSystem};

// ============================================================================
// Pragma Hook
// ============================================================================

/// Receiver for `#pragma` directives. Return true when the pragma was
/// handled; unhandled pragmas produce an "unknown pragma" warning.
pub trait PragmaHandler {
    fn pragma(&mut self, name: &str, args: &[Token]) -> bool;
}

// ============================================================================
// Preprocessor
// ============================================================================

/// The streaming preprocessor driver.
///
/// Callers queue inputs, then pull tokens one at a time with [`token`].
/// `Eof` is a terminal sentinel and may be returned repeatedly.
///
/// [`token`]: Preprocessor::token
pub struct Preprocessor {
    /// Pending top-level inputs, dequeued as the stack drains
    inputs: VecDeque<LexerSource>,
    /// Active source stack, top last
    stack: Vec<SourceFrame>,
    /// Synthesized tokens (line markers) delivered before source reads
    pending: VecDeque<Token>,
    /// Driver-level unread stack
    pushback: Vec<Token>,
    macros: HashMap<String, MacroDef>,
    states: ConditionalStack,
    features: FeatureSet,
    pub(crate) reports: Reporter,
    vfs: Box<dyn VirtualFileSystem>,
    quote_paths: Vec<String>,
    system_paths: Vec<String>,
    framework_paths: Vec<String>,
    /// Canonical paths already pulled in via `#import`
    imported: HashSet<String>,
    counter: i64,
    pragma_handler: Option<Box<dyn PragmaHandler>>,
    reached_eof: bool,
    last_source_name: String,
}

impl Preprocessor {
    pub fn new() -> Self {
        let mut pp = Self {
            inputs: VecDeque::new(),
            stack: Vec::new(),
            pending: VecDeque::new(),
            pushback: Vec::new(),
            macros: HashMap::new(),
            states: ConditionalStack::new(),
            features: FeatureSet::new(),
            reports: Reporter::new(),
            vfs: Box::new(LocalFileSystem),
            quote_paths: Vec::new(),
            system_paths: Vec::new(),
            framework_paths: Vec::new(),
            imported: HashSet::new(),
            counter: 0,
            pragma_handler: None,
            reached_eof: false,
            last_source_name: "<input>".to_string(),
        };
        pp.macros.insert(
            "__LINE__".to_string(),
            MacroDef::builtin("__LINE__", BuiltinMacro::Line),
        );
        pp.macros.insert(
            "__FILE__".to_string(),
            MacroDef::builtin("__FILE__", BuiltinMacro::File),
        );
        pp.macros.insert(
            "__COUNTER__".to_string(),
            MacroDef::builtin("__COUNTER__", BuiltinMacro::Counter),
        );
        pp
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn add_input(&mut self, source: LexerSource) {
        self.inputs.push_back(source);
    }

    pub fn add_input_file(&mut self, path: &str) -> Result<(), Error> {
        let source = self.vfs.get_file(path).open_as_source()?;
        self.inputs.push_back(source);
        Ok(())
    }

    pub fn add_input_text(&mut self, name: &str, text: &str) {
        self.inputs.push_back(LexerSource::new(name, text, true));
    }

    pub fn set_listener(&mut self, listener: Box<dyn Listener>) {
        self.reports.listener = Some(listener);
    }

    pub fn set_file_system(&mut self, vfs: Box<dyn VirtualFileSystem>) {
        self.vfs = vfs;
    }

    pub fn set_pragma_handler(&mut self, handler: Box<dyn PragmaHandler>) {
        self.pragma_handler = Some(handler);
    }

    pub fn add_feature(&mut self, feature: Feature) {
        self.features.add(feature);
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(feature)
    }

    pub fn add_warning(&mut self, warning: Warning) {
        self.reports.warnings.add(warning);
    }

    pub fn add_quote_include_path(&mut self, dir: impl Into<String>) {
        self.quote_paths.push(dir.into());
    }

    pub fn add_system_include_path(&mut self, dir: impl Into<String>) {
        self.system_paths.push(dir.into());
    }

    pub fn add_framework_path(&mut self, dir: impl Into<String>) {
        self.framework_paths.push(dir.into());
    }

    /// Install an object-like macro, lexing `value` as its replacement.
    pub fn define(&mut self, name: &str, value: &str) -> Result<(), Error> {
        if !is_macro_name(name) {
            return Err(Error::Unhandled {
                source_name: "<command-line>".to_string(),
                line: 0,
                col: 0,
                message: format!("bad macro name '{}'", name),
            });
        }
        if name == "defined" || self.is_builtin(name) {
            return Err(Error::Unhandled {
                source_name: "<command-line>".to_string(),
                line: 0,
                col: 0,
                message: format!("cannot define reserved name '{}'", name),
            });
        }

        let mut lexer = LexerSource::new("<command-line>", value, false);
        let mut tokens = Vec::new();
        loop {
            let t = lexer.token(&mut self.reports)?;
            match t.kind {
                TokenKind::Eof => break,
                TokenKind::Newline => continue,
                _ => tokens.push(t),
            }
        }
        let body = build_replacement_list(&tokens, None).map_err(|msg| Error::Unhandled {
            source_name: "<command-line>".to_string(),
            line: 0,
            col: 0,
            message: msg,
        })?;
        log::debug!("define {} = {}", name, value);
        self.macros.insert(name.to_string(), MacroDef::object(name, body));
        Ok(())
    }

    /// `-D`-style definition: `NAME=value` or bare `NAME` (defined to 1).
    pub fn add_cmdline_define(&mut self, def: &str) -> Result<(), Error> {
        match def.split_once('=') {
            Some((name, value)) => self.define(name, value),
            None => self.define(def, "1"),
        }
    }

    /// `-U`-style removal. Built-in pseudo-macros are retained.
    pub fn undefine(&mut self, name: &str) {
        if !self.is_builtin(name) {
            self.macros.remove(name);
        }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    fn is_builtin(&self, name: &str) -> bool {
        self.macros
            .get(name)
            .map(|m| m.builtin.is_some())
            .unwrap_or(false)
    }

    pub(crate) fn has_feature_named(&self, name: &str) -> bool {
        Feature::from_name(name)
            .map(|f| self.features.contains(f))
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Source stack
    // ------------------------------------------------------------------

    fn push_source(&mut self, mut source: Source, auto_pop: bool) {
        if let Some(l) = source.as_lexer_mut() {
            l.set_digraphs(self.features.contains(Feature::Digraphs));
        }
        let name = source.name().to_string();
        if let Some(top) = self.stack.last() {
            let top_name = top.source.name().to_string();
            self.reports.source_change(&top_name, SourceEvent::Suspend);
        }
        self.reports.source_change(&name, SourceEvent::Push);
        log::debug!("push source {}", name);
        if source.is_file_lexer() && self.features.contains(Feature::LineMarkers) {
            let marker = line_marker(1, &name, 1);
            self.pending.push_back(marker);
        }
        self.stack.push(SourceFrame::new(source, auto_pop));
    }

    fn pop_source(&mut self) {
        let frame = self.stack.pop().expect("pop of empty source stack");
        let name = frame.source.name().to_string();
        self.reports.source_change(&name, SourceEvent::Pop);
        log::debug!("pop source {}", name);
        self.last_source_name = name;

        let mut marker = None;
        if let Some(top) = self.stack.last() {
            let top_name = top.source.name().to_string();
            self.reports.source_change(&top_name, SourceEvent::Resume);
            if frame.source.is_file_lexer()
                && top.source.is_file_lexer()
                && self.features.contains(Feature::LineMarkers)
            {
                if let Source::Lexer(l) = &top.source {
                    marker = Some(line_marker(l.line(), l.name(), 2));
                }
            }
        }
        if let Some(m) = marker {
            self.pending.push_back(m);
        }
    }

    fn unget(&mut self, tok: Token) {
        self.pushback.push(tok);
    }

    /// Raw pull: push-back, pending markers, top of stack, auto-pop,
    /// pending top-level inputs, final EOF sentinel.
    fn source_token(&mut self) -> Result<Token, Error> {
        if let Some(t) = self.pushback.pop() {
            return Ok(t);
        }
        loop {
            if let Some(t) = self.pending.pop_front() {
                return Ok(t);
            }
            let Some(frame) = self.stack.last_mut() else {
                match self.inputs.pop_front() {
                    Some(lexer) => {
                        self.push_source(Source::Lexer(lexer), true);
                        continue;
                    }
                    None => {
                        if !self.reached_eof {
                            self.reached_eof = true;
                            if !self.states.at_base() {
                                let name = self.last_source_name.clone();
                                let msg = format!(
                                    "unterminated conditional directive at end of input ({} open)",
                                    self.states.depth() - 1
                                );
                                self.reports.error(&name, 0, 0, &msg)?;
                            }
                        }
                        return Ok(Token::eof());
                    }
                }
            };
            let auto_pop = frame.auto_pop;
            let t = frame.source.token(&mut self.reports)?;
            if t.kind == TokenKind::Eof {
                if auto_pop {
                    self.pop_source();
                    continue;
                }
                return Ok(t);
            }
            return Ok(t);
        }
    }

    fn top_is_lexer(&self) -> bool {
        matches!(
            self.stack.last(),
            Some(SourceFrame {
                source: Source::Lexer(_),
                ..
            })
        )
    }

    /// Name of the innermost lexed source, for `__FILE__` and diagnostics.
    fn current_file_name(&self) -> String {
        for frame in self.stack.iter().rev() {
            if let Source::Lexer(l) = &frame.source {
                return l.name().to_string();
            }
        }
        self.last_source_name.clone()
    }

    fn current_line(&self) -> u32 {
        for frame in self.stack.iter().rev() {
            if let Source::Lexer(l) = &frame.source {
                return l.line();
            }
        }
        0
    }

    /// Directory of the innermost file-backed source, for quoted includes.
    fn current_dir(&self) -> String {
        for frame in self.stack.iter().rev() {
            if let Source::Lexer(l) = &frame.source {
                if l.is_file() {
                    return Path::new(l.name())
                        .parent()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_default();
                }
            }
        }
        String::new()
    }

    /// Origin search-path index of the innermost file, for `#include_next`.
    fn current_origin_index(&self) -> Option<usize> {
        for frame in self.stack.iter().rev() {
            if let Source::Lexer(l) = &frame.source {
                if l.is_file() {
                    return l.origin_index;
                }
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    fn report_error_at(&mut self, tok: &Token, msg: &str) -> Result<(), Error> {
        let name = self.current_file_name();
        self.reports
            .error(&name, tok.line.max(0) as u32, tok.col.max(0) as u32, msg)
    }

    fn report_warning_at(&mut self, tok: &Token, msg: &str) -> Result<(), Error> {
        let name = self.current_file_name();
        self.reports
            .warning(&name, tok.line.max(0) as u32, tok.col.max(0) as u32, msg)
    }

    // ------------------------------------------------------------------
    // Token delivery
    // ------------------------------------------------------------------

    /// Pull the next fully preprocessed token.
    pub fn token(&mut self) -> Result<Token, Error> {
        loop {
            let tok = self.source_token()?;
            if self.features.contains(Feature::Debug) {
                log::trace!("pulled {:?} {:?}", tok.kind, tok.text);
            }

            if !self.states.is_active() {
                // Inside a dead conditional branch: only directives that
                // affect conditional state act; line structure survives.
                match tok.kind {
                    TokenKind::Hash if self.top_is_lexer() => {
                        if let Some(t) = self.directive(tok)? {
                            return Ok(t);
                        }
                    }
                    TokenKind::Newline
                    | TokenKind::Whitespace
                    | TokenKind::LineMarker
                    | TokenKind::Eof => return Ok(tok),
                    TokenKind::CComment | TokenKind::CppComment => {
                        return Ok(if self.features.contains(Feature::KeepAllComments) {
                            tok
                        } else {
                            comment_to_whitespace(&tok)
                        });
                    }
                    _ => {}
                }
                continue;
            }

            match tok.kind {
                TokenKind::Hash if self.top_is_lexer() => {
                    if let Some(t) = self.directive(tok)? {
                        return Ok(t);
                    }
                }
                TokenKind::Identifier => {
                    if self.maybe_expand(&tok)? {
                        continue;
                    }
                    return Ok(tok);
                }
                TokenKind::CComment | TokenKind::CppComment => {
                    let keep = self.features.contains(Feature::KeepComments)
                        || self.features.contains(Feature::KeepAllComments);
                    return Ok(if keep { tok } else { comment_to_whitespace(&tok) });
                }
                TokenKind::Invalid => {
                    if self.features.contains(Feature::CSyntax) {
                        let msg = match &tok.value {
                            TokenValue::Reason(r) => r.clone(),
                            _ => "invalid token".to_string(),
                        };
                        self.report_error_at(&tok, &msg)?;
                    }
                    return Ok(tok);
                }
                _ => return Ok(tok),
            }
        }
    }

    // ------------------------------------------------------------------
    // Macro expansion
    // ------------------------------------------------------------------

    /// True if some macro source on the stack is already expanding `name`.
    fn is_expanding(&self, name: &str) -> bool {
        self.stack.iter().any(|f| match &f.source {
            Source::Macro(m) => m.is_expanding(name),
            _ => false,
        })
    }

    /// Expand `tok` if it names a macro not already being expanded.
    /// Returns true when sources were pushed (or the invocation was
    /// abandoned after an error) and the caller should pull again.
    fn maybe_expand(&mut self, tok: &Token) -> Result<bool, Error> {
        if tok.kind != TokenKind::Identifier {
            return Ok(false);
        }
        let Some(def) = self.macros.get(&tok.text) else {
            return Ok(false);
        };
        if self.is_expanding(&tok.text) {
            return Ok(false);
        }
        let def = def.clone();
        self.expand(&def, tok)
    }

    fn expand(&mut self, def: &MacroDef, ident: &Token) -> Result<bool, Error> {
        if let Some(builtin) = def.builtin {
            let tok = self.expand_builtin(builtin, ident);
            self.push_source(
                Source::Fixed(FixedTokenSource::new("<builtin>", vec![tok])),
                true,
            );
            return Ok(true);
        }

        if !def.is_function() {
            log::trace!("expanding object-like macro {}", def.name);
            self.push_source(Source::Macro(MacroTokenSource::new(def, Vec::new())), true);
            return Ok(true);
        }

        // A function-like macro name not followed by '(' is an ordinary
        // identifier; whitespace, comments and newlines may intervene.
        let mut skipped = Vec::new();
        let t = loop {
            let t = self.source_token()?;
            if t.is_space() {
                skipped.push(t);
                continue;
            }
            break t;
        };
        if !t.is_punct('(' as u32) {
            self.unget(t);
            for s in skipped.into_iter().rev() {
                self.unget(s);
            }
            return Ok(false);
        }

        let Some(raw_args) = self.collect_args(def, ident)? else {
            // Invocation abandoned; call material already consumed
            return Ok(true);
        };

        let mut args = Vec::with_capacity(raw_args.len());
        for raw in raw_args {
            let expanded = self.expand_token_list(raw.clone())?;
            args.push(MacroArg { raw, expanded });
        }

        log::trace!("expanding macro {} with {} argument(s)", def.name, args.len());
        self.push_source(Source::Macro(MacroTokenSource::new(def, args)), true);
        Ok(true)
    }

    fn expand_builtin(&mut self, builtin: BuiltinMacro, ident: &Token) -> Token {
        match builtin {
            BuiltinMacro::Line => {
                // The lexer has not yet passed the invocation's newline, so
                // its current line is the invocation line even when the
                // identifier came out of another macro's body.
                let _ = ident;
                let line = self.current_line() as i64;
                Token::synthetic(TokenKind::Integer, line.to_string(), TokenValue::Int(line))
            }
            BuiltinMacro::File => {
                let name = self.current_file_name();
                let text = format!("\"{}\"", escape_path(&name));
                Token::synthetic(TokenKind::StringLit, text, TokenValue::Text(name))
            }
            BuiltinMacro::Counter => {
                let value = self.counter;
                self.counter += 1;
                Token::synthetic(TokenKind::Integer, value.to_string(), TokenValue::Int(value))
            }
        }
    }

    /// Scan a call's argument list. The opening parenthesis has already
    /// been consumed. Returns None when the invocation was abandoned.
    fn collect_args(
        &mut self,
        def: &MacroDef,
        ident: &Token,
    ) -> Result<Option<Vec<Vec<Token>>>, Error> {
        let mut args: Vec<Vec<Token>> = Vec::new();
        let mut cur: Vec<Token> = Vec::new();
        let mut depth = 1;

        loop {
            let t = self.source_token()?;
            match t.kind {
                TokenKind::Eof => {
                    self.report_error_at(
                        ident,
                        &format!("unterminated argument list for macro '{}'", def.name),
                    )?;
                    return Ok(None);
                }
                TokenKind::Newline | TokenKind::CComment | TokenKind::CppComment => {
                    cur.push(Token::synthetic(
                        TokenKind::Whitespace,
                        " ",
                        TokenValue::None,
                    ));
                }
                _ if t.is_punct('(' as u32) => {
                    depth += 1;
                    cur.push(t);
                }
                _ if t.is_punct(')' as u32) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    cur.push(t);
                }
                _ if t.is_punct(',' as u32) && depth == 1 => {
                    if def.variadic && args.len() + 1 == def.arity() {
                        // Trailing commas belong to __VA_ARGS__
                        cur.push(t);
                    } else {
                        args.push(std::mem::take(&mut cur));
                    }
                }
                _ => cur.push(t),
            }
        }
        args.push(cur);

        for arg in &mut args {
            trim_space(arg);
        }

        if def.arity() == 0 && args.len() == 1 && args[0].is_empty() {
            args.clear();
        }
        if def.variadic && args.len() + 1 == def.arity() {
            args.push(Vec::new());
        }
        if args.len() != def.arity() {
            self.report_error_at(
                ident,
                &format!(
                    "macro '{}' requires {} argument(s), but {} given",
                    def.name,
                    def.arity(),
                    args.len()
                ),
            )?;
            return Ok(None);
        }
        Ok(Some(args))
    }

    /// Expand a token list to exhaustion over a private fixed source.
    fn expand_token_list(&mut self, tokens: Vec<Token>) -> Result<Vec<Token>, Error> {
        let stack_mark = self.stack.len();
        let pushback_mark = self.pushback.len();
        self.stack.push(SourceFrame::new(
            Source::Fixed(FixedTokenSource::new("<expansion>", tokens)),
            false,
        ));
        let mut out = Vec::new();
        loop {
            let t = self.expand_token()?;
            if t.kind == TokenKind::Eof {
                break;
            }
            out.push(t);
        }
        self.stack.truncate(stack_mark);
        self.pushback.truncate(pushback_mark);
        Ok(out)
    }

    /// One token with macro expansion but no directive processing.
    fn expand_token(&mut self) -> Result<Token, Error> {
        loop {
            let t = self.source_token()?;
            if self.maybe_expand(&t)? {
                continue;
            }
            return Ok(t);
        }
    }

    /// Expanded non-whitespace token, for the expression evaluator.
    pub(crate) fn expr_token(&mut self) -> Result<Token, Error> {
        loop {
            let t = self.expand_token()?;
            if t.is_space() {
                continue;
            }
            return Ok(t);
        }
    }

    /// Raw non-whitespace token: operands of `defined` and `__has_*`.
    pub(crate) fn expr_token_raw(&mut self) -> Result<Token, Error> {
        loop {
            let t = self.source_token()?;
            if t.is_space() {
                continue;
            }
            return Ok(t);
        }
    }

    pub(crate) fn is_macro_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    // ------------------------------------------------------------------
    // Directive dispatch
    // ------------------------------------------------------------------

    /// Skip whitespace and comments within a directive line.
    fn dir_nonwhite(&mut self) -> Result<Token, Error> {
        loop {
            let t = self.source_token()?;
            match t.kind {
                TokenKind::Whitespace | TokenKind::CComment | TokenKind::CppComment => {}
                _ => return Ok(t),
            }
        }
    }

    /// Consume the rest of the line, returning its terminator.
    fn skip_line(&mut self) -> Result<Token, Error> {
        loop {
            let t = self.source_token()?;
            if matches!(t.kind, TokenKind::Newline | TokenKind::Eof) {
                return Ok(t);
            }
        }
    }

    /// If `tok` already terminates the line, keep it; otherwise skip on.
    fn finish_line(&mut self, tok: Token) -> Result<Token, Error> {
        if matches!(tok.kind, TokenKind::Newline | TokenKind::Eof) {
            Ok(tok)
        } else {
            self.skip_line()
        }
    }

    /// Collect the rest of the line (comments as whitespace), plus its
    /// terminator.
    fn collect_line(&mut self) -> Result<(Vec<Token>, Token), Error> {
        let mut out = Vec::new();
        loop {
            let t = self.source_token()?;
            match t.kind {
                TokenKind::Newline | TokenKind::Eof => return Ok((out, t)),
                TokenKind::CComment | TokenKind::CppComment => {
                    out.push(comment_to_whitespace(&t))
                }
                _ => out.push(t),
            }
        }
    }

    /// Dispatch a `#` that opened a logical line. Returns the token to
    /// deliver, normally the directive line's terminating newline.
    fn directive(&mut self, hash: Token) -> Result<Option<Token>, Error> {
        let t = self.dir_nonwhite()?;
        let active = self.states.is_active();

        match t.kind {
            // A '#' on its own line is a null directive
            TokenKind::Newline | TokenKind::Eof => Ok(Some(t)),
            TokenKind::Identifier => match t.text.as_str() {
                "define" => self.dir_define(active).map(Some),
                "undef" => self.dir_undef(active).map(Some),
                "include" => self.dir_include(active, false, false, &hash).map(Some),
                "include_next" if self.features.contains(Feature::IncludeNext) => {
                    self.dir_include(active, true, false, &hash).map(Some)
                }
                "include_next" => {
                    if active {
                        self.report_error_at(&hash, "#include_next is not enabled")?;
                    }
                    self.skip_line().map(Some)
                }
                "import" => self.dir_include(active, false, true, &hash).map(Some),
                "if" => self.dir_if(active, &hash).map(Some),
                "ifdef" => self.dir_ifdef(active, false).map(Some),
                "ifndef" => self.dir_ifdef(active, true).map(Some),
                "elif" => self.dir_elif(&hash).map(Some),
                "else" => self.dir_else(&hash).map(Some),
                "endif" => self.dir_endif(&hash).map(Some),
                "line" => self.dir_line(active).map(Some),
                "pragma" => self.dir_pragma(active).map(Some),
                "warning" => self.dir_diagnostic(active, &hash, false).map(Some),
                "error" => self.dir_diagnostic(active, &hash, true).map(Some),
                name => {
                    if active {
                        let msg = format!("unknown preprocessing directive #{}", name);
                        self.report_error_at(&hash, &msg)?;
                    }
                    self.skip_line().map(Some)
                }
            },
            _ => {
                if active {
                    self.report_error_at(&hash, "preprocessing directive expected after '#'")?;
                }
                self.finish_line(t).map(Some)
            }
        }
    }

    // ------------------------------------------------------------------
    // #define / #undef
    // ------------------------------------------------------------------

    fn dir_define(&mut self, active: bool) -> Result<Token, Error> {
        if !active {
            return self.skip_line();
        }

        let name_tok = self.dir_nonwhite()?;
        if name_tok.kind != TokenKind::Identifier {
            self.report_error_at(&name_tok, "macro name must be an identifier")?;
            return self.finish_line(name_tok);
        }
        let name = name_tok.text.clone();
        if name == "defined" || self.is_builtin(&name) {
            let msg = format!("'{}' cannot be used as a macro name", name);
            self.report_error_at(&name_tok, &msg)?;
            return self.skip_line();
        }

        // Function-like only when '(' immediately follows the name
        let after = self.source_token()?;
        let params = if after.is_punct('(' as u32) {
            match self.parse_macro_params()? {
                Some(parsed) => Some(parsed),
                None => return self.skip_line(),
            }
        } else {
            self.unget(after);
            None
        };

        let (body_tokens, nl) = self.collect_line()?;
        let built = match &params {
            Some((names, _)) => build_replacement_list(&body_tokens, Some(names)),
            None => build_replacement_list(&body_tokens, None),
        };
        match built {
            Ok(body) => {
                let def = match params {
                    Some((names, variadic)) => MacroDef::function(name, names, variadic, body),
                    None => MacroDef::object(name, body),
                };
                self.install(def);
            }
            Err(msg) => self.report_error_at(&name_tok, &msg)?,
        }
        Ok(nl)
    }

    fn install(&mut self, def: MacroDef) {
        log::debug!("#define {}", def.name);
        self.macros.insert(def.name.clone(), def);
    }

    /// Parse a parameter list after the opening parenthesis. Returns
    /// None after reporting a malformed list.
    fn parse_macro_params(&mut self) -> Result<Option<(Vec<String>, bool)>, Error> {
        let mut params: Vec<String> = Vec::new();
        let mut variadic = false;
        loop {
            let t = self.dir_nonwhite()?;
            match t.kind {
                TokenKind::Newline | TokenKind::Eof => {
                    self.report_error_at(&t, "unterminated macro parameter list")?;
                    self.unget(t);
                    return Ok(None);
                }
                TokenKind::Identifier => {
                    if variadic {
                        self.report_error_at(&t, "parameter after '...'")?;
                        return Ok(None);
                    }
                    if params.iter().any(|p| p == &t.text) {
                        let msg = format!("duplicate macro parameter '{}'", t.text);
                        self.report_error_at(&t, &msg)?;
                        return Ok(None);
                    }
                    params.push(t.text);
                }
                _ if t.is_punct(',' as u32) => {}
                _ if t.is_punct(crate::token::Punct::Ellipsis.code()) => {
                    if variadic {
                        self.report_error_at(&t, "'...' may appear only once")?;
                        return Ok(None);
                    }
                    variadic = true;
                    params.push("__VA_ARGS__".to_string());
                }
                _ if t.is_punct(')' as u32) => return Ok(Some((params, variadic))),
                _ => {
                    let msg = format!("bad token in macro parameter list: '{}'", t.text);
                    self.report_error_at(&t, &msg)?;
                    return Ok(None);
                }
            }
        }
    }

    fn dir_undef(&mut self, active: bool) -> Result<Token, Error> {
        if !active {
            return self.skip_line();
        }
        let t = self.dir_nonwhite()?;
        if t.kind != TokenKind::Identifier {
            self.report_error_at(&t, "macro name must be an identifier")?;
            return self.finish_line(t);
        }
        if t.text == "defined" || self.is_builtin(&t.text) {
            let msg = format!("'{}' cannot be undefined", t.text);
            self.report_error_at(&t, &msg)?;
        } else {
            log::debug!("#undef {}", t.text);
            self.macros.remove(&t.text);
        }
        self.skip_line()
    }

    // ------------------------------------------------------------------
    // #include / #include_next / #import
    // ------------------------------------------------------------------

    fn dir_include(
        &mut self,
        active: bool,
        next: bool,
        import: bool,
        hash: &Token,
    ) -> Result<Token, Error> {
        if !active {
            return self.skip_line();
        }

        // Header-name lexing only applies on the include line itself
        if let Some(frame) = self.stack.last_mut() {
            if let Some(l) = frame.source.as_lexer_mut() {
                l.set_include(true);
            }
        }
        let t = self.dir_nonwhite()?;

        let (parsed, nl) = match t.kind {
            TokenKind::Header => {
                let name = match &t.value {
                    TokenValue::Text(n) => n.clone(),
                    _ => String::new(),
                };
                (Some((name, false)), self.skip_line()?)
            }
            TokenKind::StringLit => {
                let name = match &t.value {
                    TokenValue::Text(n) => n.clone(),
                    _ => String::new(),
                };
                (Some((name, true)), self.skip_line()?)
            }
            TokenKind::Newline | TokenKind::Eof => (None, t),
            _ => {
                // Macro-expanded operand form
                self.unget(t);
                let (tokens, nl) = self.collect_line()?;
                let expanded = self.expand_token_list(tokens)?;
                (parse_include_name(&expanded), nl)
            }
        };

        if let Some(frame) = self.stack.last_mut() {
            if let Some(l) = frame.source.as_lexer_mut() {
                l.set_include(false);
            }
        }

        match parsed {
            Some((name, quoted)) if !name.is_empty() => {
                self.do_include(&name, quoted, next, import, hash)?;
            }
            _ => {
                self.report_error_at(hash, "bad #include operand")?;
            }
        }
        Ok(nl)
    }

    fn do_include(
        &mut self,
        name: &str,
        quoted: bool,
        next: bool,
        import: bool,
        hash: &Token,
    ) -> Result<(), Error> {
        let (found, searched) = self.resolve_include(name, quoted, next);
        let Some((file, origin_index)) = found else {
            let msg = format!(
                "file not found: {}{}{} (searched: {})",
                if quoted { "\"" } else { "<" },
                name,
                if quoted { "\"" } else { ">" },
                if searched.is_empty() {
                    "no directories".to_string()
                } else {
                    searched.join(", ")
                }
            );
            return self.report_error_at(hash, &msg);
        };

        let canonical = file.path();
        if import {
            if self.imported.contains(&canonical) {
                log::debug!("#import {}: already imported", canonical);
                return Ok(());
            }
            self.imported.insert(canonical.clone());
        }

        match file.open_as_source() {
            Ok(mut source) => {
                source.origin_index = origin_index;
                self.push_source(Source::Lexer(source), true);
                Ok(())
            }
            Err(e) => {
                let msg = format!("cannot open {}: {}", canonical, e);
                self.report_error_at(hash, &msg)
            }
        }
    }

    /// Walk the search order of §include resolution. Returns the winning
    /// file with its system-path index, plus every directory tried.
    #[allow(clippy::type_complexity)]
    fn resolve_include(
        &self,
        name: &str,
        quoted: bool,
        next: bool,
    ) -> (Option<(Box<dyn VirtualFile>, Option<usize>)>, Vec<String>) {
        let mut searched = Vec::new();

        if name.starts_with('/') {
            let file = self.vfs.get_file(name);
            if file.is_file() {
                return (Some((file, None)), searched);
            }
            return (None, searched);
        }

        if quoted && !next {
            let dir = self.current_dir();
            searched.push(if dir.is_empty() { ".".to_string() } else { dir.clone() });
            let file = self.vfs.get_file_in(&dir, name);
            if file.is_file() {
                return (Some((file, None)), searched);
            }
            for dir in &self.quote_paths {
                searched.push(dir.clone());
                let file = self.vfs.get_file_in(dir, name);
                if file.is_file() {
                    return (Some((file, None)), searched);
                }
            }
        }

        let start = if next {
            self.current_origin_index().map(|i| i + 1).unwrap_or(0)
        } else {
            0
        };
        for (idx, dir) in self.system_paths.iter().enumerate().skip(start) {
            searched.push(dir.clone());
            let file = self.vfs.get_file_in(dir, name);
            if file.is_file() {
                return (Some((file, Some(idx))), searched);
            }
        }

        // Foo/Bar.h resolves as Foo.framework/Headers/Bar.h
        if let Some((fw, rest)) = name.split_once('/') {
            for dir in &self.framework_paths {
                let path = format!("{}/{}.framework/Headers/{}", dir, fw, rest);
                searched.push(path.clone());
                let file = self.vfs.get_file(&path);
                if file.is_file() {
                    return (Some((file, None)), searched);
                }
            }
        }

        (None, searched)
    }

    /// `__has_include` support: resolution without pushing.
    pub(crate) fn resolve_include_check(&self, name: &str, quoted: bool, next: bool) -> bool {
        self.resolve_include(name, quoted, next).0.is_some()
    }

    // ------------------------------------------------------------------
    // Conditionals
    // ------------------------------------------------------------------

    /// Evaluate a controlling expression from collected line tokens.
    fn eval_expr_tokens(&mut self, tokens: Vec<Token>, hash: &Token) -> Result<bool, Error> {
        let stack_mark = self.stack.len();
        let pushback_mark = self.pushback.len();
        self.stack.push(SourceFrame::new(
            Source::Fixed(FixedTokenSource::new("<expression>", tokens)),
            false,
        ));
        let name = self.current_file_name();
        let line = hash.line.max(0) as u32;
        let mut evaluator = ExprEvaluator::new(self, name, line);
        let value = evaluator.evaluate();
        self.stack.truncate(stack_mark);
        self.pushback.truncate(pushback_mark);
        Ok(value? != 0)
    }

    fn dir_if(&mut self, active: bool, hash: &Token) -> Result<Token, Error> {
        if !active {
            self.states.push(false);
            return self.skip_line();
        }
        let (tokens, nl) = self.collect_line()?;
        let value = self.eval_expr_tokens(tokens, hash)?;
        self.states.push(value);
        Ok(nl)
    }

    fn dir_ifdef(&mut self, active: bool, negate: bool) -> Result<Token, Error> {
        if !active {
            self.states.push(false);
            return self.skip_line();
        }
        let t = self.dir_nonwhite()?;
        if t.kind != TokenKind::Identifier {
            self.report_error_at(&t, "macro name must be an identifier")?;
            self.states.push(false);
            return self.finish_line(t);
        }
        let defined = self.macros.contains_key(&t.text);
        self.states.push(defined != negate);
        self.skip_line()
    }

    fn dir_elif(&mut self, hash: &Token) -> Result<Token, Error> {
        if self.states.at_base() {
            self.report_error_at(hash, "#elif without #if")?;
            return self.skip_line();
        }
        let top = *self.states.top();
        if top.saw_else {
            self.report_error_at(hash, "#elif after #else")?;
            self.skip_line()
        } else if !top.parent_active {
            self.skip_line()
        } else if top.active {
            // A branch was taken; poison the level so no later branch fires
            let state = self.states.top_mut();
            state.active = false;
            state.parent_active = false;
            self.skip_line()
        } else {
            let (tokens, nl) = self.collect_line()?;
            let value = self.eval_expr_tokens(tokens, hash)?;
            self.states.top_mut().active = value;
            Ok(nl)
        }
    }

    fn dir_else(&mut self, hash: &Token) -> Result<Token, Error> {
        if self.states.at_base() {
            self.report_error_at(hash, "#else without #if")?;
            return self.skip_line();
        }
        if self.states.top().saw_else {
            self.report_error_at(hash, "#else after #else")?;
            return self.skip_line();
        }
        let state = self.states.top_mut();
        if state.parent_active {
            state.active = !state.active;
        }
        state.saw_else = true;
        self.check_trailing_tokens("#else")
    }

    fn dir_endif(&mut self, hash: &Token) -> Result<Token, Error> {
        if !self.states.pop() {
            self.report_error_at(hash, "#endif without #if")?;
        }
        self.check_trailing_tokens("#endif")
    }

    /// Consume the rest of an `#else`/`#endif` line, warning about
    /// trailing tokens under `Warning::EndifLabels`.
    fn check_trailing_tokens(&mut self, directive: &str) -> Result<Token, Error> {
        let (tokens, nl) = self.collect_line()?;
        if self.reports.warnings.contains(Warning::EndifLabels) {
            if let Some(t) = tokens.iter().find(|t| !t.is_space()) {
                let msg = format!("trailing tokens after {}: '{}'", directive, t.text);
                let t = t.clone();
                self.report_warning_at(&t, &msg)?;
            }
        }
        Ok(nl)
    }

    // ------------------------------------------------------------------
    // #line / #pragma / #warning / #error
    // ------------------------------------------------------------------

    /// `#line` semantics are delegated to the consumer; the directive is
    /// consumed without adjusting locations.
    fn dir_line(&mut self, active: bool) -> Result<Token, Error> {
        let _ = active;
        self.skip_line()
    }

    fn dir_pragma(&mut self, active: bool) -> Result<Token, Error> {
        if !active {
            return self.skip_line();
        }
        let t = self.dir_nonwhite()?;
        if t.kind != TokenKind::Identifier {
            self.report_error_at(&t, "#pragma requires an identifier")?;
            return self.finish_line(t);
        }
        let (args, nl) = self.collect_line()?;
        let args: Vec<Token> = {
            let mut args = args;
            trim_space(&mut args);
            args
        };
        let handled = match &mut self.pragma_handler {
            Some(h) => h.pragma(&t.text, &args),
            None => false,
        };
        if !handled {
            let msg = format!("unknown pragma: {}", t.text);
            self.report_warning_at(&t, &msg)?;
        }
        Ok(nl)
    }

    fn dir_diagnostic(&mut self, active: bool, hash: &Token, is_error: bool) -> Result<Token, Error> {
        if !active {
            return self.skip_line();
        }
        let (tokens, nl) = self.collect_line()?;
        let text: String = tokens.iter().map(|t| t.text.as_str()).collect();
        let text = text.trim().to_string();
        if is_error {
            self.report_error_at(hash, &format!("#error {}", text))?;
        } else {
            self.report_warning_at(hash, &format!("#warning {}", text))?;
        }
        Ok(nl)
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn is_macro_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c == '$' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c == '$' || c.is_alphanumeric())
}

/// Comments not kept in the output become whitespace with the same line
/// count, so line numbering downstream stays stable.
fn comment_to_whitespace(tok: &Token) -> Token {
    let text: String = tok
        .text
        .chars()
        .map(|c| if c == '\n' { '\n' } else { ' ' })
        .collect();
    Token::with_value(
        TokenKind::Whitespace,
        tok.line,
        tok.col,
        text,
        TokenValue::None,
    )
}

fn trim_space(tokens: &mut Vec<Token>) {
    while tokens.last().map(|t| t.is_space()).unwrap_or(false) {
        tokens.pop();
    }
    while tokens.first().map(|t| t.is_space()).unwrap_or(false) {
        tokens.remove(0);
    }
}

/// Escape a path for a line marker or `__FILE__` string.
fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// `# <line> "<path>" <flag>` markers, flag 1 on entry and 2 on return.
fn line_marker(line: u32, path: &str, flag: u8) -> Token {
    let text = format!("# {} \"{}\" {}\n", line, escape_path(path), flag);
    Token::synthetic(TokenKind::LineMarker, text, TokenValue::None)
}

// ============================================================================
// Tests
// ============================================================================
