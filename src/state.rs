//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the pcpp project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Conditional compilation state
//

// ============================================================================
// State
// ============================================================================

/// One nested `#if`/`#ifdef`/`#ifndef` level.
///
/// When a branch has been taken and an `#elif` follows, the level is
/// poisoned by clearing `parent_active` so no later branch can activate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct State {
    /// False while nested inside a dead branch of an outer conditional
    pub parent_active: bool,
    /// Did the current branch evaluate true?
    pub active: bool,
    /// Has `#else` been seen at this level?
    pub saw_else: bool,
}

/// Stack of conditional levels. Never empties; the bottom entry represents
/// unconditional text and is all-true.
#[derive(Debug)]
pub(crate) struct ConditionalStack {
    states: Vec<State>,
}

impl ConditionalStack {
    pub fn new() -> Self {
        Self {
            states: vec![State {
                parent_active: true,
                active: true,
                saw_else: false,
            }],
        }
    }

    /// Number of entries, including the base state.
    pub fn depth(&self) -> usize {
        self.states.len()
    }

    /// Is text at the current nesting level live?
    pub fn is_active(&self) -> bool {
        let top = self.top();
        top.parent_active && top.active
    }

    pub fn push(&mut self, active: bool) {
        let parent_active = self.is_active();
        self.states.push(State {
            parent_active,
            active,
            saw_else: false,
        });
    }

    /// Pop one level; false if only the base state remains.
    pub fn pop(&mut self) -> bool {
        if self.states.len() <= 1 {
            return false;
        }
        self.states.pop();
        true
    }

    /// True when the base state is on top (no open conditional).
    pub fn at_base(&self) -> bool {
        self.states.len() == 1
    }

    pub fn top(&self) -> &State {
        self.states.last().expect("conditional stack never empties")
    }

    pub fn top_mut(&mut self) -> &mut State {
        self.states.last_mut().expect("conditional stack never empties")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_state() {
        let s = ConditionalStack::new();
        assert_eq!(s.depth(), 1);
        assert!(s.is_active());
        assert!(s.at_base());
    }

    #[test]
    fn test_push_pop() {
        let mut s = ConditionalStack::new();
        s.push(false);
        assert!(!s.is_active());
        s.push(true);
        // Nested in a dead branch: still inactive
        assert!(!s.is_active());
        assert!(s.pop());
        assert!(s.pop());
        assert!(!s.pop());
        assert!(s.is_active());
    }

    #[test]
    fn test_else_flip() {
        let mut s = ConditionalStack::new();
        s.push(false);
        let top = s.top_mut();
        top.active = !top.active;
        top.saw_else = true;
        assert!(s.is_active());
        assert!(s.top().saw_else);
    }

    #[test]
    fn test_elif_poison() {
        let mut s = ConditionalStack::new();
        s.push(true);
        // First branch taken; #elif poisons the level
        let top = s.top_mut();
        top.active = false;
        top.parent_active = false;
        assert!(!s.is_active());
        // #else cannot re-activate a poisoned level
        let top = s.top_mut();
        if top.parent_active {
            top.active = !top.active;
        }
        top.saw_else = true;
        assert!(!s.is_active());
    }
}
