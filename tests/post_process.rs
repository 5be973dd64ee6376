// tests/post_process.rs

//! End-to-end runs of the post-processing stage chain.

mod common;

use common::{link_info, BuildArea, FakeEditor};
use postbuild::report::{FindingKind, OutputReportSummary};
use postbuild::{FileManifest, PostConfig, PostProcessor};
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

#[test]
fn test_clean_tree_runs_every_stage() {
    let area = BuildArea::new();
    area.write("share/doc/README", "hello\n");

    let report = PostProcessor::new(area.config()).run(&area.manifest(), &FakeEditor::new());

    assert!(report.success());
    assert_eq!(
        report.stages,
        vec!["hardlinks", "shebangs", "symlinks", "relocation", "metadata"]
    );
    assert_eq!(report.rewritten_files, 0);
}

#[test]
fn test_hardlinks_are_broken_before_shebangs_are_fixed() {
    let area = BuildArea::new();
    let body = format!("#!{}/bin/python -E\nprint('x')\n", area.prefix.display());
    let script = area.write("bin/script", &body);
    let twin = area.path("bin/script-twin");
    fs::hard_link(&script, &twin).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let config = area.config().with_interpreter("/opt/final/bin/python");
    let report = PostProcessor::new(config).run(&area.manifest(), &FakeEditor::new());

    assert!(report.success(), "{:?}", report.errors);
    assert_eq!(fs::metadata(&script).unwrap().nlink(), 1);
    assert_eq!(fs::metadata(&twin).unwrap().nlink(), 1);
    for path in [&script, &twin] {
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "#!/opt/final/bin/python -E\nprint('x')\n"
        );
        assert_eq!(fs::metadata(path).unwrap().permissions().mode() & 0o7777, 0o755);
    }
    // one hardlink copy plus two shebang rewrites
    assert_eq!(report.rewritten_files, 3);
}

#[test]
fn test_dangling_symlinks_stop_before_relocation() {
    let area = BuildArea::new();
    let work = area.build_root.join("pkg/work");
    fs::create_dir_all(&work).unwrap();
    fs::write(work.join("real"), "").unwrap();
    area.symlink("link", work.join("real"));
    area.symlink("link2", work.join("real"));

    let tool = area.write_elf("bin/tool");
    let editor = FakeEditor::new();
    editor.register(&tool, link_info(&["libmissing.so.1"], &["/somewhere"], None));

    let report = PostProcessor::new(area.config()).run(&area.manifest(), &editor);

    assert!(!report.success());
    assert_eq!(report.stages, vec!["hardlinks", "shebangs", "symlinks"]);
    assert_eq!(report.errors.len(), 1);
    let error = &report.errors[0];
    assert_eq!(error.kind, FindingKind::DanglingSymlink);
    assert_eq!(error.paths, vec![PathBuf::from("link"), PathBuf::from("link2")]);
    let real = work.join("real");
    assert!(error.message.ends_with(&format!(
        "  link → {real}\n  link2 → {real}",
        real = real.display()
    )));
    assert!(editor.ops().is_empty());
}

#[test]
fn test_absolute_symlinks_inside_prefix_become_relative() {
    let area = BuildArea::new();
    area.write("lib/libz.so.1.3", "z");
    area.symlink("lib/libz.so", area.path("lib/libz.so.1.3"));

    let report = PostProcessor::new(area.config()).run(&area.manifest(), &FakeEditor::new());

    assert!(report.success(), "{:?}", report.errors);
    assert_eq!(
        fs::read_link(area.path("lib/libz.so")).unwrap(),
        PathBuf::from("libz.so.1.3")
    );
    assert_eq!(report.rewritten_files, 1);
}

#[test]
fn test_version_mismatch_is_fatal() {
    let area = BuildArea::new();
    area.write("lib/python3.12/site-packages/name-1.0.0.dist-info/METADATA", "Name: name\n");

    let config = area.config().with_declared_version("name", "1.2.3");
    let report = PostProcessor::new(config).run(&area.manifest(), &FakeEditor::new());

    assert!(!report.success());
    assert_eq!(report.errors[0].kind, FindingKind::MetadataMismatch);
    assert!(report.errors[0].message.contains("1.2.3"));
    assert!(report.errors[0].message.contains("1.0.0"));
}

#[test]
fn test_menu_problems_are_warnings() {
    let area = BuildArea::new();
    area.write("Menu/broken.json", "{ not json");
    area.write("Menu/wrong.json", r#"{"menu_name": "x", "menu_items": [], "extra": 1}"#);

    let report = PostProcessor::new(area.config()).run(&area.manifest(), &FakeEditor::new());

    assert!(report.success());
    let kinds: Vec<_> = report.warnings.iter().map(|w| w.kind).collect();
    assert_eq!(kinds, vec![FindingKind::FormatWarning, FindingKind::SchemaWarning]);
    assert_eq!(report.warnings[0].paths, vec![PathBuf::from("Menu/broken.json")]);
}

#[test]
fn test_long_shebang_is_reported() {
    let area = BuildArea::new();
    let long_prefix = format!("/opt/{}", "deep/".repeat(30));
    let body = format!("#!{}/bin/python3 -s\n", area.prefix.display());
    area.write("bin/tool", body);

    let config = area
        .config()
        .with_interpreter(format!("{}bin/python3", long_prefix));
    let report = PostProcessor::new(config).run(&area.manifest(), &FakeEditor::new());

    assert!(report.success());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, FindingKind::LongShebang);
    assert_eq!(
        fs::read_to_string(area.path("bin/tool")).unwrap(),
        "#!/usr/bin/env python3 -s\n"
    );
}

#[test]
fn test_outputs_run_independently_in_parallel() {
    let good = BuildArea::new();
    good.write("share/ok", "ok");
    let bad = BuildArea::new();
    bad.write("name-2.0.dist-info/METADATA", "");

    let outputs: Vec<(PostConfig, FileManifest)> = vec![
        (good.config().with_output("good"), good.manifest()),
        (
            bad.config().with_output("bad").with_declared_version("name", "1.0"),
            bad.manifest(),
        ),
    ];

    let reports = PostProcessor::run_outputs(&outputs, &FakeEditor::new());

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].output, "good");
    assert!(reports[0].success());
    assert_eq!(reports[1].output, "bad");
    assert!(!reports[1].success());

    let json = serde_json::to_value(OutputReportSummary(&reports[1])).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["errors"][0]["kind"], "metadata_mismatch");
}

#[test]
fn test_config_from_toml_drives_the_run() {
    let area = BuildArea::new();
    area.write("bin/run", format!("#!{}/bin/bash\necho\n", area.prefix.display()));

    let toml = format!(
        r#"
output = "from-toml"
prefix = "{prefix}"
build_root = "{root}"
hardlinks = false

[relocation]
enabled = false

[shebang]
interpreter = "/bin/bash"
"#,
        prefix = area.prefix.display(),
        root = area.build_root.display()
    );
    let config = PostConfig::from_toml_str(&toml).unwrap();
    let report = PostProcessor::new(config).run(&area.manifest(), &FakeEditor::new());

    assert_eq!(report.output, "from-toml");
    assert_eq!(report.stages, vec!["shebangs", "symlinks", "metadata"]);
    assert_eq!(
        fs::read_to_string(area.path("bin/run")).unwrap(),
        "#!/bin/bash\necho\n"
    );
}

#[test]
fn test_stage_io_failure_names_the_file() {
    let area = BuildArea::new();
    let manifest = FileManifest::new(["bin/missing"]).unwrap();

    let report = PostProcessor::new(area.config()).run(&manifest, &FakeEditor::new());

    assert!(!report.success());
    assert_eq!(report.stages, vec!["hardlinks"]);
    let error = &report.errors[0];
    assert_eq!(error.kind, FindingKind::Internal);
    assert_eq!(error.paths, vec![area.path("bin/missing")]);
    assert!(error.message.starts_with("hardlinks: I/O error on "));
    assert!(error.message.contains("bin/missing"));
}

#[test]
fn test_each_output_gets_an_editor_for_its_own_config() {
    let fast = BuildArea::new();
    let slow = BuildArea::new();
    let outputs: Vec<(PostConfig, FileManifest)> = vec![
        (
            fast.config().with_output("fast").with_timeout(Duration::from_secs(3)),
            fast.manifest(),
        ),
        (
            slow.config().with_output("slow").with_timeout(Duration::from_secs(90)),
            slow.manifest(),
        ),
    ];

    let seen = Mutex::new(Vec::new());
    let reports = PostProcessor::run_outputs_with(&outputs, |config| {
        seen.lock()
            .unwrap()
            .push((config.output.clone(), config.relocation.timeout()));
        FakeEditor::new()
    });

    assert!(reports.iter().all(|r| r.success()));
    let mut seen = seen.into_inner().unwrap();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("fast".to_string(), Duration::from_secs(3)),
            ("slow".to_string(), Duration::from_secs(90)),
        ]
    );
}
