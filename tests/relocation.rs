// tests/relocation.rs

//! Relocation of binaries through the planner and a recording link editor.

mod common;

use common::{link_info, BuildArea, FakeEditor};
use postbuild::report::FindingKind;
use postbuild::{PathResolver, PostProcessor, RelocationPlanner, RelocationSession, RewriteOp};
use std::path::Path;

#[test]
fn test_elf_executable_gets_origin_relative_search_path() {
    let area = BuildArea::new();
    let tool = area.write_elf("bin/tool");
    area.write_elf("lib/libfoo.so.1");

    let editor = FakeEditor::new();
    let prefix_lib = area.path("lib").display().to_string();
    editor.register(
        &tool,
        link_info(&["libfoo.so.1", "libc.so.6"], &[&prefix_lib, "/usr/lib64"], None),
    );

    let report = PostProcessor::new(area.config()).run(&area.manifest(), &editor);

    assert!(report.success(), "{:?}", report.errors);
    assert_eq!(
        editor.ops_for(&tool),
        vec![RewriteOp::SetSearchPaths(vec![
            "$ORIGIN/../lib".to_string(),
            "/usr/lib64".to_string(),
        ])]
    );
    assert_eq!(report.rewritten_files, 1);
}

#[test]
fn test_shared_library_identity_is_made_relocatable() {
    let area = BuildArea::new();
    let lib = area.write_macho("lib/libbar.dylib");
    area.write_macho("lib/libfoo.dylib");

    let editor = FakeEditor::new();
    let absolute_id = lib.display().to_string();
    let absolute_dep = area.path("lib/libfoo.dylib").display().to_string();
    editor.register(&lib, link_info(&[&absolute_dep, "/usr/lib/libSystem.B.dylib"], &[], Some(&absolute_id)));

    let report = PostProcessor::new(area.config()).run(&area.manifest(), &editor);
    assert!(report.success(), "{:?}", report.errors);

    let info = editor.info(&lib);
    assert_eq!(info.identity.as_deref(), Some("@rpath/libbar.dylib"));
    assert_eq!(info.search_paths, vec!["@loader_path".to_string()]);
    assert_eq!(
        info.dependencies,
        vec!["@rpath/libfoo.dylib".to_string(), "/usr/lib/libSystem.B.dylib".to_string()]
    );
}

#[test]
fn test_symlinked_binary_is_relocated_once() {
    let area = BuildArea::new();
    let real = area.write_elf("lib/libfoo.so.1.2");
    area.symlink("lib/libfoo.so.1", "libfoo.so.1.2");
    area.symlink("lib/libfoo.so", "libfoo.so.1.2");
    area.write_elf("lib/libdep.so");

    let editor = FakeEditor::new();
    editor.register(&real, link_info(&["libdep.so"], &[], None));

    let manifest = area.manifest();
    let resolver = PathResolver::new(&area.prefix, &manifest);
    let planner = RelocationPlanner::new(resolver);
    let mut session = RelocationSession::new();

    let mut relocated = 0;
    for entry in &manifest {
        if let Some(outcome) = planner.relocate(entry, &editor, &mut session).unwrap()
            && outcome.rewritten()
        {
            relocated += 1;
        }
    }

    assert_eq!(relocated, 1);
    assert_eq!(editor.ops_for(&real).len(), 1);
    assert!(session.is_processed(&real));
}

#[test]
fn test_missing_dependency_fails_only_that_binary() {
    let area = BuildArea::new();
    let broken = area.write_macho("bin/broken");
    let fine = area.write_elf("bin/fine");
    area.write_elf("lib/libok.so");

    let editor = FakeEditor::new();
    editor.register(&broken, link_info(&["libmissing.dylib"], &[], None));
    editor.register(&fine, link_info(&["libok.so"], &[], None));

    let report = PostProcessor::new(area.config()).run(&area.manifest(), &editor);

    assert!(!report.success());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, FindingKind::NotFound);
    assert!(report.errors[0].message.contains("libmissing.dylib"));
    assert!(editor.ops_for(&broken).is_empty());
    assert_eq!(
        editor.ops_for(&fine),
        vec![RewriteOp::SetSearchPaths(vec!["$ORIGIN/../lib".to_string()])]
    );
}

#[test]
fn test_ambiguous_dependency_lists_candidates() {
    let area = BuildArea::new();
    let tool = area.write_elf("bin/tool");
    area.write("lib/a/libdup.so", b"\x7fELF first");
    area.write("lib/b/libdup.so", b"\x7fELF second");

    let editor = FakeEditor::new();
    editor.register(&tool, link_info(&["libdup.so"], &[], None));

    let report = PostProcessor::new(area.config()).run(&area.manifest(), &editor);

    assert_eq!(report.errors.len(), 1);
    let error = &report.errors[0];
    assert_eq!(error.kind, FindingKind::AmbiguousDependency);
    assert!(error.message.contains("lib/a/libdup.so"));
    assert!(error.message.contains("lib/b/libdup.so"));
}

#[test]
fn test_identical_duplicates_resolve_to_last() {
    let area = BuildArea::new();
    let tool = area.write_elf("bin/tool");
    area.write("lib/a/libdup.so", b"\x7fELF same");
    area.write("lib/b/libdup.so", b"\x7fELF same");

    let editor = FakeEditor::new();
    editor.register(&tool, link_info(&["libdup.so"], &[], None));

    let report = PostProcessor::new(area.config()).run(&area.manifest(), &editor);

    assert!(report.success(), "{:?}", report.errors);
    assert_eq!(
        editor.ops_for(&tool),
        vec![RewriteOp::SetSearchPaths(vec!["$ORIGIN/../lib/b".to_string()])]
    );
}

#[test]
fn test_override_bypasses_ambiguity() {
    let area = BuildArea::new();
    let tool = area.write_elf("bin/tool");
    area.write("lib/a/libdup.so", b"\x7fELF first");
    area.write("lib/b/libdup.so", b"\x7fELF second");

    let editor = FakeEditor::new();
    editor.register(&tool, link_info(&["libdup.so"], &[], None));

    let config = area.config().with_override("libdup.so", "lib/a/libdup.so");
    let report = PostProcessor::new(config).run(&area.manifest(), &editor);

    assert!(report.success(), "{:?}", report.errors);
    assert_eq!(
        editor.ops_for(&tool),
        vec![RewriteOp::SetSearchPaths(vec!["$ORIGIN/../lib/a".to_string()])]
    );
}

#[test]
fn test_link_editor_failure_is_per_binary() {
    let area = BuildArea::new();
    let first = area.write_elf("bin/first");
    let second = area.write_elf("bin/second");
    area.write_elf("lib/libx.so");

    let editor = FakeEditor::new();
    editor.register(&first, link_info(&["libx.so"], &[], None));
    editor.register(&second, link_info(&["libx.so"], &[], None));
    editor.fail_on(&first);

    let report = PostProcessor::new(area.config()).run(&area.manifest(), &editor);

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, FindingKind::LinkEditorFailure);
    assert_eq!(report.errors[0].paths, vec![first.clone()]);
    assert_eq!(editor.ops_for(&second).len(), 1);
}

#[test]
fn test_unresolved_relative_reference_is_a_warning() {
    let area = BuildArea::new();
    let tool = area.write_macho("bin/tool");

    let editor = FakeEditor::new();
    editor.register(&tool, link_info(&["relative/name", "@rpath/libz.dylib"], &[], None));

    let report = PostProcessor::new(area.config()).run(&area.manifest(), &editor);

    assert!(report.success(), "{:?}", report.errors);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, FindingKind::UnresolvedSkip);
    assert_eq!(report.warnings[0].paths, vec![Path::new("bin/tool").to_path_buf()]);
    assert!(editor.ops_for(&tool).is_empty());
}

#[test]
fn test_build_prefix_leak() {
    let area = BuildArea::new();
    let tool = area.write_elf("bin/tool");
    let build_prefix = area.build_root.join("pkg/_build_env");

    let editor = FakeEditor::new();
    let leaked = build_prefix.join("lib/libgcc_s.so.1").display().to_string();
    editor.register(&tool, link_info(&[&leaked], &[], None));

    let config = area.config().with_build_prefix(&build_prefix);
    let report = PostProcessor::new(config).run(&area.manifest(), &editor);

    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0]
        .message
        .contains("Compiler runtime library in build prefix not found in host prefix"));
}

#[test]
fn test_symlink_to_absent_system_file_is_skipped() {
    let area = BuildArea::new();
    area.symlink("ssl/cert.pem", "/nonexistent-system-dir/ssl/cert.pem");
    area.write("share/data", "x");

    let report = PostProcessor::new(area.config()).run(&area.manifest(), &FakeEditor::new());

    assert!(report.success(), "{:?}", report.errors);
    assert!(report.stages.iter().any(|s| s == "relocation"));
    assert_eq!(report.stages.last().map(String::as_str), Some("metadata"));
    assert_eq!(
        std::fs::read_link(area.path("ssl/cert.pem")).unwrap(),
        Path::new("/nonexistent-system-dir/ssl/cert.pem")
    );
}

#[test]
fn test_macho_non_absolute_internal_references_go_through_rpath() {
    let area = BuildArea::new();
    let tool = area.write_macho("bin/tool");
    area.write_macho("lib/libfoo.dylib");
    area.write_macho("lib/libbar.dylib");

    let editor = FakeEditor::new();
    editor.register(
        &tool,
        link_info(
            &["libfoo.dylib", "@executable_path/../lib/libbar.dylib", "/usr/lib/libSystem.B.dylib"],
            &[],
            None,
        ),
    );

    let report = PostProcessor::new(area.config()).run(&area.manifest(), &editor);

    assert!(report.success(), "{:?}", report.errors);
    assert_eq!(
        editor.ops_for(&tool),
        vec![
            RewriteOp::SetSearchPaths(vec!["@loader_path/../lib".to_string()]),
            RewriteOp::ChangeDependency {
                old: "libfoo.dylib".to_string(),
                new: "@rpath/libfoo.dylib".to_string(),
            },
            RewriteOp::ChangeDependency {
                old: "@executable_path/../lib/libbar.dylib".to_string(),
                new: "@rpath/libbar.dylib".to_string(),
            },
        ]
    );
    assert_eq!(
        editor.info(&tool).dependencies,
        vec!["@rpath/libfoo.dylib", "@rpath/libbar.dylib", "/usr/lib/libSystem.B.dylib"]
    );
}
