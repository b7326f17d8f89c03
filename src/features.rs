//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the pcpp project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Feature and warning flag sets
//

// ============================================================================
// Features
// ============================================================================

/// Optional preprocessor behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Feature {
    /// Recognize `<:` `:>` `<%` `%>` `%:` `%:%:`
    Digraphs,
    /// Emit `# line "file" flags` markers on file entry/exit
    LineMarkers,
    /// Recognize `#include_next`
    IncludeNext,
    /// Pass comments through in active text
    KeepComments,
    /// Pass comments through everywhere, even in directives
    KeepAllComments,
    /// Extra driver debug output
    Debug,
    /// Report lexical `INVALID` tokens to the listener
    CSyntax,
}

impl Feature {
    fn bit(self) -> u32 {
        1 << self as u32
    }

    /// Name recognized by `__has_feature`.
    pub fn name(self) -> &'static str {
        match self {
            Feature::Digraphs => "digraphs",
            Feature::LineMarkers => "linemarkers",
            Feature::IncludeNext => "includenext",
            Feature::KeepComments => "keepcomments",
            Feature::KeepAllComments => "keepallcomments",
            Feature::Debug => "debug",
            Feature::CSyntax => "csyntax",
        }
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        const ALL: [Feature; 7] = [
            Feature::Digraphs,
            Feature::LineMarkers,
            Feature::IncludeNext,
            Feature::KeepComments,
            Feature::KeepAllComments,
            Feature::Debug,
            Feature::CSyntax,
        ];
        ALL.iter().copied().find(|f| f.name() == name)
    }
}

/// Bitset of enabled features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureSet(u32);

impl FeatureSet {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn add(&mut self, f: Feature) {
        self.0 |= f.bit();
    }

    pub fn remove(&mut self, f: Feature) {
        self.0 &= !f.bit();
    }

    pub fn contains(&self, f: Feature) -> bool {
        self.0 & f.bit() != 0
    }
}

// ============================================================================
// Warnings
// ============================================================================

/// Warning classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Warning {
    /// Promote every warning to an error
    Error,
    /// Warn about trailing tokens after `#endif`/`#else`
    EndifLabels,
    /// Warn when an undefined identifier is evaluated in `#if`
    Undef,
}

impl Warning {
    fn bit(self) -> u32 {
        1 << self as u32
    }
}

/// Bitset of enabled warning classes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarningSet(u32);

impl WarningSet {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn add(&mut self, w: Warning) {
        self.0 |= w.bit();
    }

    pub fn remove(&mut self, w: Warning) {
        self.0 &= !w.bit();
    }

    pub fn contains(&self, w: Warning) -> bool {
        self.0 & w.bit() != 0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_set() {
        let mut set = FeatureSet::new();
        assert!(!set.contains(Feature::Digraphs));
        set.add(Feature::Digraphs);
        set.add(Feature::LineMarkers);
        assert!(set.contains(Feature::Digraphs));
        assert!(set.contains(Feature::LineMarkers));
        assert!(!set.contains(Feature::Debug));
        set.remove(Feature::Digraphs);
        assert!(!set.contains(Feature::Digraphs));
    }

    #[test]
    fn test_feature_names() {
        assert_eq!(Feature::Digraphs.name(), "digraphs");
        assert_eq!(Feature::from_name("linemarkers"), Some(Feature::LineMarkers));
        assert_eq!(Feature::from_name("nonesuch"), None);
    }

    #[test]
    fn test_warning_set() {
        let mut set = WarningSet::new();
        set.add(Warning::Undef);
        assert!(set.contains(Warning::Undef));
        assert!(!set.contains(Warning::Error));
    }
}
