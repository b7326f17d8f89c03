//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the pcpp project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// Virtual file system - path resolution for #include
//

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::lexer::LexerSource;

// ============================================================================
// Traits
// ============================================================================

/// A resolvable path in a [`VirtualFileSystem`].
pub trait VirtualFile {
    fn is_file(&self) -> bool;

    /// Full path, used for display, `__FILE__` and the `#import` once-set.
    fn path(&self) -> String;

    /// Final path component.
    fn name(&self) -> String;

    fn parent(&self) -> Box<dyn VirtualFile>;

    fn child(&self, name: &str) -> Box<dyn VirtualFile>;

    /// Open the file contents as a token source.
    fn open_as_source(&self) -> io::Result<LexerSource>;
}

/// Path resolver used by `#include` processing.
pub trait VirtualFileSystem {
    fn get_file(&self, path: &str) -> Box<dyn VirtualFile>;

    fn get_file_in(&self, dir: &str, name: &str) -> Box<dyn VirtualFile> {
        if dir.is_empty() {
            return self.get_file(name);
        }
        let joined = format!("{}/{}", dir.trim_end_matches('/'), name);
        self.get_file(&joined)
    }
}

// ============================================================================
// LocalFileSystem
// ============================================================================

/// The default implementation, mapping onto real filesystem paths.
#[derive(Debug, Default)]
pub struct LocalFileSystem;

struct LocalFile {
    path: PathBuf,
}

impl VirtualFileSystem for LocalFileSystem {
    fn get_file(&self, path: &str) -> Box<dyn VirtualFile> {
        Box::new(LocalFile {
            path: PathBuf::from(path),
        })
    }
}

impl VirtualFile for LocalFile {
    fn is_file(&self) -> bool {
        self.path.is_file()
    }

    fn path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn parent(&self) -> Box<dyn VirtualFile> {
        Box::new(LocalFile {
            path: self
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }

    fn child(&self, name: &str) -> Box<dyn VirtualFile> {
        Box::new(LocalFile {
            path: self.path.join(name),
        })
    }

    fn open_as_source(&self) -> io::Result<LexerSource> {
        let text = fs::read_to_string(&self.path)?;
        Ok(LexerSource::new(self.path(), &text, true))
    }
}

// ============================================================================
// MemoryFileSystem
// ============================================================================

/// An in-process file system mapping paths to contents. The test vehicle
/// for include resolution, and useful for embedding header sets.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileSystem {
    files: Rc<HashMap<String, String>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: &str, contents: &str) {
        Rc::make_mut(&mut self.files).insert(normalize(path), contents.to_string());
    }
}

/// Resolve `.` and `..` components and duplicate slashes.
fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() && !absolute {
                    parts.push("..");
                }
            }
            p => parts.push(p),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

struct MemoryFile {
    files: Rc<HashMap<String, String>>,
    path: String,
}

impl VirtualFileSystem for MemoryFileSystem {
    fn get_file(&self, path: &str) -> Box<dyn VirtualFile> {
        Box::new(MemoryFile {
            files: self.files.clone(),
            path: normalize(path),
        })
    }
}

impl VirtualFile for MemoryFile {
    fn is_file(&self) -> bool {
        self.files.contains_key(&self.path)
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    fn name(&self) -> String {
        self.path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    fn parent(&self) -> Box<dyn VirtualFile> {
        let parent = match self.path.rfind('/') {
            Some(0) => "/".to_string(),
            Some(idx) => self.path[..idx].to_string(),
            None => String::new(),
        };
        Box::new(MemoryFile {
            files: self.files.clone(),
            path: parent,
        })
    }

    fn child(&self, name: &str) -> Box<dyn VirtualFile> {
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path.trim_end_matches('/'), name)
        };
        Box::new(MemoryFile {
            files: self.files.clone(),
            path: normalize(&path),
        })
    }

    fn open_as_source(&self) -> io::Result<LexerSource> {
        match self.files.get(&self.path) {
            Some(text) => Ok(LexerSource::new(self.path.clone(), text, true)),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", self.path),
            )),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a/b/../c"), "a/c");
        assert_eq!(normalize("./a//b/."), "a/b");
        assert_eq!(normalize("/usr/include/../lib"), "/usr/lib");
        assert_eq!(normalize("../x"), "../x");
    }

    #[test]
    fn test_memory_fs_lookup() {
        let mut fs = MemoryFileSystem::new();
        fs.add_file("/inc/foo.h", "int x;\n");
        assert!(fs.get_file("/inc/foo.h").is_file());
        assert!(fs.get_file_in("/inc", "foo.h").is_file());
        assert!(!fs.get_file("/inc/bar.h").is_file());
        assert_eq!(fs.get_file("/inc/foo.h").name(), "foo.h");
        assert_eq!(fs.get_file("/inc/foo.h").parent().path(), "/inc");
    }

    #[test]
    fn test_memory_fs_child() {
        let mut fs = MemoryFileSystem::new();
        fs.add_file("/inc/sys/foo.h", "x\n");
        let dir = fs.get_file("/inc");
        assert!(dir.child("sys").child("foo.h").is_file());
    }

    #[test]
    fn test_memory_fs_open() {
        let mut fs = MemoryFileSystem::new();
        fs.add_file("/a.h", "token\n");
        let src = fs.get_file("/a.h").open_as_source().unwrap();
        assert!(src.is_file());
        assert_eq!(src.name(), "/a.h");
        assert!(fs.get_file("/missing.h").open_as_source().is_err());
    }

    #[test]
    fn test_local_fs_paths() {
        let fs = LocalFileSystem;
        let f = fs.get_file("/tmp/x/y.h");
        assert_eq!(f.name(), "y.h");
        assert_eq!(f.parent().path(), "/tmp/x");
        assert_eq!(f.child("z.h").path(), "/tmp/x/y.h/z.h");
    }
}
