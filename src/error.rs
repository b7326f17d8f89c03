//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the pcpp project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Errors, the diagnostic listener interface, and diagnostic routing
//

use thiserror::Error;

use crate::features::{Warning, WarningSet};

// ============================================================================
// Error
// ============================================================================

/// Fatal preprocessor failures.
///
/// Recoverable diagnostics go through the [`Listener`]; a diagnostic raised
/// with no listener registered terminates preprocessing with `Unhandled`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{source_name}:{line}:{col}: {message}")]
    Unhandled {
        source_name: String,
        line: u32,
        col: u32,
        message: String,
    },
}

// ============================================================================
// Listener
// ============================================================================

/// Source-stack transitions reported to the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    /// A new source was pushed
    Push,
    /// A source reached EOF and was popped
    Pop,
    /// The current source was set aside for a nested one
    Suspend,
    /// A suspended source became current again
    Resume,
}

/// Receiver for warnings, errors, and source-change notifications.
///
/// Line/column are the 1-based line and 0-based column of the offending
/// token, or 0/0 when no position applies.
pub trait Listener {
    fn handle_warning(&mut self, source: &str, line: u32, col: u32, msg: &str);

    fn handle_error(&mut self, source: &str, line: u32, col: u32, msg: &str);

    fn handle_source_change(&mut self, _source: &str, _event: SourceEvent) {}
}

/// Listener that forwards diagnostics to the `log` facade.
#[derive(Debug, Default)]
pub struct LogListener;

impl Listener for LogListener {
    fn handle_warning(&mut self, source: &str, line: u32, col: u32, msg: &str) {
        log::warn!("{}:{}:{}: {}", source, line, col, msg);
    }

    fn handle_error(&mut self, source: &str, line: u32, col: u32, msg: &str) {
        log::error!("{}:{}:{}: {}", source, line, col, msg);
    }

    fn handle_source_change(&mut self, source: &str, event: SourceEvent) {
        log::debug!("{}: source {:?}", source, event);
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Diagnostic routing shared by the driver and the token sources.
///
/// Owns the registered listener and the warning flag set so that any layer
/// producing a diagnostic applies the same promotion and no-listener policy.
pub(crate) struct Reporter {
    pub listener: Option<Box<dyn Listener>>,
    pub warnings: WarningSet,
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            listener: None,
            warnings: WarningSet::new(),
        }
    }

    pub fn warning(&mut self, source: &str, line: u32, col: u32, msg: &str) -> Result<(), Error> {
        if self.warnings.contains(Warning::Error) {
            return self.error(source, line, col, msg);
        }
        match &mut self.listener {
            Some(l) => {
                l.handle_warning(source, line, col, msg);
                Ok(())
            }
            None => Err(Error::Unhandled {
                source_name: source.to_string(),
                line,
                col,
                message: format!("warning: {}", msg),
            }),
        }
    }

    pub fn error(&mut self, source: &str, line: u32, col: u32, msg: &str) -> Result<(), Error> {
        match &mut self.listener {
            Some(l) => {
                l.handle_error(source, line, col, msg);
                Ok(())
            }
            None => Err(Error::Unhandled {
                source_name: source.to_string(),
                line,
                col,
                message: msg.to_string(),
            }),
        }
    }

    pub fn source_change(&mut self, source: &str, event: SourceEvent) {
        if let Some(l) = &mut self.listener {
            l.handle_source_change(source, event);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        warnings: Vec<String>,
        errors: Vec<String>,
    }

    struct Collect(Rc<RefCell<Log>>);

    impl Listener for Collect {
        fn handle_warning(&mut self, _s: &str, _l: u32, _c: u32, msg: &str) {
            self.0.borrow_mut().warnings.push(msg.to_string());
        }
        fn handle_error(&mut self, _s: &str, _l: u32, _c: u32, msg: &str) {
            self.0.borrow_mut().errors.push(msg.to_string());
        }
    }

    #[test]
    fn test_no_listener_is_fatal() {
        let mut r = Reporter::new();
        assert!(r.error("t.c", 1, 0, "boom").is_err());
        assert!(r.warning("t.c", 1, 0, "meh").is_err());
    }

    #[test]
    fn test_warning_promotion() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut r = Reporter::new();
        r.listener = Some(Box::new(Collect(log.clone())));

        r.warning("t.c", 3, 1, "plain").unwrap();
        assert_eq!(log.borrow().warnings, vec!["plain"]);
        assert!(log.borrow().errors.is_empty());

        r.warnings.add(Warning::Error);
        r.warning("t.c", 3, 1, "promoted").unwrap();
        assert_eq!(log.borrow().errors, vec!["promoted"]);
    }
}
