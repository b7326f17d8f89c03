//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the pcpp project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Streaming C/Objective-C preprocessor.
//!
//! Queue one or more inputs on a [`Preprocessor`], then pull preprocessing
//! tokens one at a time:
//!
//! ```
//! use pcpp::{Preprocessor, LogListener, TokenKind};
//!
//! let mut pp = Preprocessor::new();
//! pp.set_listener(Box::new(LogListener));
//! pp.add_input_text("<stdin>", "#define GREETING 42\nGREETING\n");
//!
//! let mut out = Vec::new();
//! loop {
//!     let tok = pp.token().unwrap();
//!     if tok.kind == TokenKind::Eof {
//!         break;
//!     }
//!     out.push(tok);
//! }
//! let text: String = out.iter().map(|t| t.text.as_str()).collect();
//! assert_eq!(text, "\n42\n");
//! ```
//!
//! Macro replacement (object-like, function-like, variadic, `#`/`##`),
//! conditional compilation, `#include` resolution through a pluggable
//! [`VirtualFileSystem`], and optional line markers are performed in the
//! correct order by the driver. Diagnostics go to a registered
//! [`Listener`]; without one, any diagnostic is fatal.

mod error;
mod expr;
mod features;
mod input;
mod lexer;
mod macros;
mod preprocessor;
mod source;
mod state;
mod token;
mod vfs;

pub use error::{Error, Listener, LogListener, SourceEvent};
pub use features::{Feature, FeatureSet, Warning, WarningSet};
pub use lexer::LexerSource;
pub use macros::{BuiltinMacro, MacroDef};
pub use preprocessor::{PragmaHandler, Preprocessor};
pub use source::FixedTokenSource;
pub use token::{punct_text, token_kind_name, Punct, Token, TokenKind, TokenValue};
pub use vfs::{LocalFileSystem, MemoryFileSystem, VirtualFile, VirtualFileSystem};
