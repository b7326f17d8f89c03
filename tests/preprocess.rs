//
// Copyright (c) 2025-2026 Jeff Garzik
//
// This file is part of the pcpp project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//
// End-to-end preprocessing over real and in-memory file systems
//

use similar_asserts::assert_eq;
use std::fs;
use test_log::test;

use pcpp::{
    Feature, LogListener, MemoryFileSystem, Preprocessor, Token, TokenKind, Warning,
};

fn drain(pp: &mut Preprocessor) -> Vec<Token> {
    let mut out = Vec::new();
    loop {
        let tok = pp.token().unwrap();
        if tok.kind == TokenKind::Eof {
            return out;
        }
        out.push(tok);
    }
}

fn reconstruct(pp: &mut Preprocessor) -> String {
    drain(pp).iter().map(|t| t.text.as_str()).collect()
}

fn nonspace_texts(pp: &mut Preprocessor) -> Vec<String> {
    drain(pp)
        .into_iter()
        .filter(|t| !t.is_space())
        .map(|t| t.text)
        .collect()
}

#[test]
fn preprocess_program_text() {
    let mut pp = Preprocessor::new();
    pp.set_listener(Box::new(LogListener));
    pp.add_input_text(
        "<prog>",
        "#define MAX(a,b) ((a) > (b) ? (a) : (b))\n\
         #define LIMIT 100\n\
         int x = MAX(LIMIT, 7);\n",
    );
    let out = reconstruct(&mut pp);
    assert_eq!(out, "\n\nint x = ((100) > (7) ? (100) : (7));\n");
}

#[test]
fn include_tree_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir(root.join("sys")).unwrap();
    fs::write(root.join("main.c"), "#include \"defs.h\"\n#include <util.h>\nVALUE util\n").unwrap();
    fs::write(root.join("defs.h"), "#define VALUE 3\n").unwrap();
    fs::write(root.join("sys/util.h"), "#define util work\n").unwrap();

    let mut pp = Preprocessor::new();
    pp.set_listener(Box::new(LogListener));
    pp.add_system_include_path(root.join("sys").to_string_lossy().into_owned());
    pp.add_input_file(&root.join("main.c").to_string_lossy()).unwrap();

    let toks = nonspace_texts(&mut pp);
    assert_eq!(toks, vec!["3", "work"]);
}

#[test]
fn nested_quoted_includes_resolve_relative_to_includer() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir(root.join("inc")).unwrap();
    fs::write(root.join("main.c"), "#include \"inc/outer.h\"\n").unwrap();
    fs::write(root.join("inc/outer.h"), "#include \"inner.h\"\nouter\n").unwrap();
    fs::write(root.join("inc/inner.h"), "inner\n").unwrap();

    let mut pp = Preprocessor::new();
    pp.set_listener(Box::new(LogListener));
    pp.add_input_file(&root.join("main.c").to_string_lossy()).unwrap();

    let toks = nonspace_texts(&mut pp);
    assert_eq!(toks, vec!["inner", "outer"]);
}

#[test]
fn import_is_idempotent_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("once.h"), "once\n").unwrap();
    fs::write(
        root.join("main.c"),
        "#import \"once.h\"\n#import \"once.h\"\n#include \"once.h\"\n",
    )
    .unwrap();

    let mut pp = Preprocessor::new();
    pp.set_listener(Box::new(LogListener));
    pp.add_input_file(&root.join("main.c").to_string_lossy()).unwrap();

    // #import once, plus the plain #include which is not deduplicated
    let toks = nonspace_texts(&mut pp);
    assert_eq!(toks, vec!["once", "once"]);
}

#[test]
fn line_markers_match_token_lines() {
    let mut fs = MemoryFileSystem::new();
    fs.add_file("/sys/dep.h", "dep1\ndep2\n");
    let mut pp = Preprocessor::new();
    pp.set_listener(Box::new(LogListener));
    pp.set_file_system(Box::new(fs));
    pp.add_feature(Feature::LineMarkers);
    pp.add_system_include_path("/sys");
    pp.add_input_text("<main>", "top\n#include <dep.h>\nafter\n");

    let toks = drain(&mut pp);
    let marker_texts: Vec<&str> = toks
        .iter()
        .filter(|t| t.kind == TokenKind::LineMarker)
        .map(|t| t.text.as_str())
        .collect();
    assert_eq!(
        marker_texts,
        vec!["# 1 \"<main>\" 1\n", "# 1 \"/sys/dep.h\" 1\n", "# 3 \"<main>\" 2\n"]
    );

    // The return marker's line matches the next real token's line
    let after = toks.iter().find(|t| t.text == "after").unwrap();
    assert_eq!(after.line, 3);
}

#[test]
fn conditional_architecture_split() {
    let source = "#define ARCH 64\n\
                  #if ARCH == 32\n\
                  small\n\
                  #elif ARCH == 64\n\
                  wide\n\
                  #else\n\
                  unknown\n\
                  #endif\n";
    let mut pp = Preprocessor::new();
    pp.set_listener(Box::new(LogListener));
    pp.add_input_text("<arch>", source);
    assert_eq!(nonspace_texts(&mut pp), vec!["wide"]);
}

#[test]
fn header_guard_pattern() {
    let mut fs = MemoryFileSystem::new();
    fs.add_file(
        "/sys/guarded.h",
        "#ifndef GUARD_H\n#define GUARD_H\nguarded\n#endif\n",
    );
    let mut pp = Preprocessor::new();
    pp.set_listener(Box::new(LogListener));
    pp.set_file_system(Box::new(fs));
    pp.add_system_include_path("/sys");
    pp.add_input_text("<main>", "#include <guarded.h>\n#include <guarded.h>\n");

    // The second inclusion is emptied by the guard
    assert_eq!(nonspace_texts(&mut pp), vec!["guarded"]);
}

#[test]
fn has_include_and_feature_probes() {
    let mut fs = MemoryFileSystem::new();
    fs.add_file("/sys/real.h", "\n");
    let source = "#if __has_include(<real.h>) && !__has_include(<fake.h>)\nprobed\n#endif\n\
                  #if __has_feature(linemarkers)\nmarkers\n#endif\n";
    let mut pp = Preprocessor::new();
    pp.set_listener(Box::new(LogListener));
    pp.set_file_system(Box::new(fs));
    pp.add_feature(Feature::LineMarkers);
    pp.add_system_include_path("/sys");
    pp.add_input_text("<main>", source);
    assert_eq!(nonspace_texts(&mut pp), vec!["probed", "markers"]);
}

#[test]
fn token_text_reconstructs_lines() {
    let source = "a b  c\n\nd /* gone */ e\n";
    let mut pp = Preprocessor::new();
    pp.set_listener(Box::new(LogListener));
    pp.add_input_text("<t>", source);
    let out = reconstruct(&mut pp);
    // Comments collapse to equally wide spaces; everything else round-trips
    let expected = format!("a b  c\n\nd {} e\n", " ".repeat("/* gone */".len()));
    assert_eq!(out, expected);
}

#[test]
fn warnings_can_be_promoted() {
    let mut pp = Preprocessor::new();
    pp.add_warning(Warning::Error);
    pp.add_input_text("<t>", "#warning fail hard\n");
    let mut saw_error = false;
    loop {
        match pp.token() {
            Ok(t) if t.kind == TokenKind::Eof => break,
            Ok(_) => {}
            Err(_) => {
                saw_error = true;
                break;
            }
        }
    }
    // No listener registered: the promoted diagnostic is fatal
    assert!(saw_error);
}

#[test]
fn deep_macro_composition() {
    let source = "#define CAT(a,b) a##b\n\
                  #define NAME(n) CAT(var_, n)\n\
                  #define STR(x) #x\n\
                  #define SHOW(x) STR(x)\n\
                  NAME(7) SHOW(NAME(7))\n";
    let mut pp = Preprocessor::new();
    pp.set_listener(Box::new(LogListener));
    pp.add_input_text("<t>", source);
    let toks = nonspace_texts(&mut pp);
    assert_eq!(toks, vec!["var_7", "\"var_7\""]);
}
