//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the pcpp project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Constant-expression evaluation for #if / #elif
//

use crate::error::Error;
use crate::features::Warning;
use crate::preprocessor::Preprocessor;
use crate::token::{Punct, Token, TokenKind, TokenValue};

// ============================================================================
// ExprEvaluator
// ============================================================================

/// Evaluates a `#if`/`#elif` controlling expression.
///
/// Pulls from the driver's expanded token stream with one token of
/// look-back. `defined`, `__has_include`, `__has_include_next` and
/// `__has_feature` read their operands from the *raw* stream so macro
/// expansion cannot disturb them. Arithmetic is signed 64-bit, wrapping.
/// Division or modulus by zero is reported and evaluates to 0.
pub(crate) struct ExprEvaluator<'a> {
    pp: &'a mut Preprocessor,
    peek: Option<Token>,
    /// Diagnostic anchor: the directive's source and line
    source_name: String,
    line: u32,
}

impl<'a> ExprEvaluator<'a> {
    pub fn new(pp: &'a mut Preprocessor, source_name: impl Into<String>, line: u32) -> Self {
        Self {
            pp,
            peek: None,
            source_name: source_name.into(),
            line,
        }
    }

    pub fn evaluate(&mut self) -> Result<i64, Error> {
        let first = self.next()?;
        if first.kind == TokenKind::Eof {
            self.error("expression expected")?;
            return Ok(0);
        }
        self.unread(first);
        self.expr_ternary()
    }

    fn next(&mut self) -> Result<Token, Error> {
        match self.peek.take() {
            Some(t) => Ok(t),
            None => self.pp.expr_token(),
        }
    }

    fn unread(&mut self, tok: Token) {
        debug_assert!(self.peek.is_none());
        self.peek = Some(tok);
    }

    /// Consume the next token if it is punctuator `code`.
    fn accept(&mut self, code: u32) -> Result<bool, Error> {
        let t = self.next()?;
        if t.is_punct(code) {
            Ok(true)
        } else {
            self.unread(t);
            Ok(false)
        }
    }

    fn error(&mut self, msg: &str) -> Result<(), Error> {
        let name = self.source_name.clone();
        self.pp.reports.error(&name, self.line, 0, msg)
    }

    fn warning(&mut self, msg: &str) -> Result<(), Error> {
        let name = self.source_name.clone();
        self.pp.reports.warning(&name, self.line, 0, msg)
    }

    /// Ternary is right-associative and lowest precedence.
    fn expr_ternary(&mut self) -> Result<i64, Error> {
        let cond = self.expr_or()?;
        if !self.accept('?' as u32)? {
            return Ok(cond);
        }
        let true_val = self.expr_ternary()?;
        if !self.accept(':' as u32)? {
            self.error("expected ':' in conditional expression")?;
        }
        let false_val = self.expr_ternary()?;
        Ok(if cond != 0 { true_val } else { false_val })
    }

    fn expr_or(&mut self) -> Result<i64, Error> {
        let mut left = self.expr_and()?;
        while self.accept(Punct::LogicalOr.code())? {
            let right = self.expr_and()?;
            left = i64::from(left != 0 || right != 0);
        }
        Ok(left)
    }

    fn expr_and(&mut self) -> Result<i64, Error> {
        let mut left = self.expr_bitor()?;
        while self.accept(Punct::LogicalAnd.code())? {
            let right = self.expr_bitor()?;
            left = i64::from(left != 0 && right != 0);
        }
        Ok(left)
    }

    fn expr_bitor(&mut self) -> Result<i64, Error> {
        let mut left = self.expr_bitxor()?;
        while self.accept('|' as u32)? {
            left |= self.expr_bitxor()?;
        }
        Ok(left)
    }

    fn expr_bitxor(&mut self) -> Result<i64, Error> {
        let mut left = self.expr_bitand()?;
        while self.accept('^' as u32)? {
            left ^= self.expr_bitand()?;
        }
        Ok(left)
    }

    fn expr_bitand(&mut self) -> Result<i64, Error> {
        let mut left = self.expr_equality()?;
        while self.accept('&' as u32)? {
            left &= self.expr_equality()?;
        }
        Ok(left)
    }

    fn expr_equality(&mut self) -> Result<i64, Error> {
        let mut left = self.expr_relational()?;
        loop {
            if self.accept(Punct::Equal.code())? {
                let right = self.expr_relational()?;
                left = i64::from(left == right);
            } else if self.accept(Punct::NotEqual.code())? {
                let right = self.expr_relational()?;
                left = i64::from(left != right);
            } else {
                return Ok(left);
            }
        }
    }

    fn expr_relational(&mut self) -> Result<i64, Error> {
        let mut left = self.expr_shift()?;
        loop {
            if self.accept('<' as u32)? {
                let right = self.expr_shift()?;
                left = i64::from(left < right);
            } else if self.accept('>' as u32)? {
                let right = self.expr_shift()?;
                left = i64::from(left > right);
            } else if self.accept(Punct::Lte.code())? {
                let right = self.expr_shift()?;
                left = i64::from(left <= right);
            } else if self.accept(Punct::Gte.code())? {
                let right = self.expr_shift()?;
                left = i64::from(left >= right);
            } else {
                return Ok(left);
            }
        }
    }

    fn expr_shift(&mut self) -> Result<i64, Error> {
        let mut left = self.expr_additive()?;
        loop {
            if self.accept(Punct::LeftShift.code())? {
                let right = self.expr_additive()?;
                left = left.wrapping_shl(right as u32);
            } else if self.accept(Punct::RightShift.code())? {
                let right = self.expr_additive()?;
                left = left.wrapping_shr(right as u32);
            } else {
                return Ok(left);
            }
        }
    }

    fn expr_additive(&mut self) -> Result<i64, Error> {
        let mut left = self.expr_multiplicative()?;
        loop {
            if self.accept('+' as u32)? {
                let right = self.expr_multiplicative()?;
                left = left.wrapping_add(right);
            } else if self.accept('-' as u32)? {
                let right = self.expr_multiplicative()?;
                left = left.wrapping_sub(right);
            } else {
                return Ok(left);
            }
        }
    }

    fn expr_multiplicative(&mut self) -> Result<i64, Error> {
        let mut left = self.expr_unary()?;
        loop {
            if self.accept('*' as u32)? {
                let right = self.expr_unary()?;
                left = left.wrapping_mul(right);
            } else if self.accept('/' as u32)? {
                let right = self.expr_unary()?;
                if right == 0 {
                    self.error("division by zero in preprocessor expression")?;
                    left = 0;
                } else {
                    left = left.wrapping_div(right);
                }
            } else if self.accept('%' as u32)? {
                let right = self.expr_unary()?;
                if right == 0 {
                    self.error("modulus by zero in preprocessor expression")?;
                    left = 0;
                } else {
                    left = left.wrapping_rem(right);
                }
            } else {
                return Ok(left);
            }
        }
    }

    fn expr_unary(&mut self) -> Result<i64, Error> {
        if self.accept('!' as u32)? {
            return Ok(i64::from(self.expr_unary()? == 0));
        }
        if self.accept('~' as u32)? {
            return Ok(!self.expr_unary()?);
        }
        if self.accept('-' as u32)? {
            return Ok(self.expr_unary()?.wrapping_neg());
        }
        if self.accept('+' as u32)? {
            return self.expr_unary();
        }
        self.expr_primary()
    }

    fn expr_primary(&mut self) -> Result<i64, Error> {
        let tok = self.next()?;

        if tok.is_punct('(' as u32) {
            let val = self.expr_ternary()?;
            if !self.accept(')' as u32)? {
                self.error("missing ')' in preprocessor expression")?;
            }
            return Ok(val);
        }

        match tok.kind {
            TokenKind::Integer => Ok(tok.int_value().unwrap_or(0)),
            TokenKind::Character => {
                // A character constant is the value of its first character
                if let TokenValue::Text(s) = &tok.value {
                    Ok(s.chars().next().map(|c| c as i64).unwrap_or(0))
                } else {
                    Ok(0)
                }
            }
            TokenKind::Identifier => match tok.text.as_str() {
                "defined" => self.eval_defined(),
                "__has_include" => self.eval_has_include(false),
                "__has_include_next" => self.eval_has_include(true),
                "__has_feature" => self.eval_has_feature(),
                _ => {
                    if self.pp.reports.warnings.contains(Warning::Undef) {
                        self.warning(&format!("undefined identifier '{}' evaluates to 0", tok.text))?;
                    }
                    Ok(0)
                }
            },
            TokenKind::Eof => {
                self.error("unexpected end of preprocessor expression")?;
                Ok(0)
            }
            _ => {
                self.error(&format!("bad token in preprocessor expression: '{}'", tok.text))?;
                Ok(0)
            }
        }
    }

    /// `defined NAME` or `defined(NAME)`, reading the operand from the raw
    /// stream so the name is not macro-expanded first.
    fn eval_defined(&mut self) -> Result<i64, Error> {
        let mut t = self.pp.expr_token_raw()?;
        let parens = t.is_punct('(' as u32);
        if parens {
            t = self.pp.expr_token_raw()?;
        }

        let result = if t.kind == TokenKind::Identifier {
            i64::from(self.pp.is_macro_defined(&t.text))
        } else {
            self.error("'defined' requires an identifier operand")?;
            0
        };

        if parens {
            let close = self.pp.expr_token_raw()?;
            if !close.is_punct(')' as u32) {
                self.error("missing ')' after 'defined'")?;
            }
        }
        Ok(result)
    }

    /// `__has_include(<name>)` / `__has_include("name")`, operand raw.
    fn eval_has_include(&mut self, next: bool) -> Result<i64, Error> {
        let open = self.pp.expr_token_raw()?;
        if !open.is_punct('(' as u32) {
            self.error("missing '(' after '__has_include'")?;
            return Ok(0);
        }

        // Collect operand tokens up to the matching ')'
        let mut depth = 1;
        let mut operand: Vec<Token> = Vec::new();
        loop {
            let t = self.pp.expr_token_raw()?;
            match t.kind {
                TokenKind::Eof => {
                    self.error("missing ')' after '__has_include'")?;
                    break;
                }
                _ if t.is_punct('(' as u32) => {
                    depth += 1;
                    operand.push(t);
                }
                _ if t.is_punct(')' as u32) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    operand.push(t);
                }
                _ => operand.push(t),
            }
        }

        match parse_include_name(&operand) {
            Some((name, quoted)) => Ok(i64::from(self.pp.resolve_include_check(
                &name, quoted, next,
            ))),
            None => {
                self.error("bad '__has_include' operand")?;
                Ok(0)
            }
        }
    }

    fn eval_has_feature(&mut self) -> Result<i64, Error> {
        let open = self.pp.expr_token_raw()?;
        if !open.is_punct('(' as u32) {
            self.error("missing '(' after '__has_feature'")?;
            return Ok(0);
        }
        let name = self.pp.expr_token_raw()?;
        let result = if name.kind == TokenKind::Identifier {
            i64::from(self.pp.has_feature_named(&name.text))
        } else {
            self.error("'__has_feature' requires an identifier operand")?;
            0
        };
        let close = self.pp.expr_token_raw()?;
        if !close.is_punct(')' as u32) {
            self.error("missing ')' after '__has_feature'")?;
        }
        Ok(result)
    }
}

/// Interpret `<a/b.h>` (as punctuator soup or a `Header` token) or
/// `"a/b.h"` operand forms. Returns (name, quoted).
pub(crate) fn parse_include_name(tokens: &[Token]) -> Option<(String, bool)> {
    let tokens: Vec<&Token> = tokens.iter().filter(|t| !t.is_space()).collect();
    let first = tokens.first()?;

    if first.kind == TokenKind::Header {
        if let TokenValue::Text(name) = &first.value {
            return Some((name.clone(), false));
        }
    }
    if first.kind == TokenKind::StringLit {
        if let TokenValue::Text(name) = &first.value {
            return Some((name.clone(), true));
        }
    }
    if first.is_punct('<' as u32) {
        let mut name = String::new();
        for t in &tokens[1..] {
            if t.is_punct('>' as u32) {
                return Some((name, false));
            }
            name.push_str(&t.text);
        }
    }
    None
}
