//! End-to-end tests for the kiln CLI binary.

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Runs the binary against a throwaway kiln home.
struct TestContext {
    temp_dir: TempDir,
    kiln_home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let kiln_home = temp_dir.path().join(".kiln");
        std::fs::create_dir_all(&kiln_home).expect("failed to create kiln home");
        Self {
            temp_dir,
            kiln_home,
        }
    }

    fn kiln(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_kiln"))
            .args(args)
            .env("HOME", self.temp_dir.path())
            .env("KILN_HOME", &self.kiln_home)
            .env_remove("KILN_RECIPES_DIR")
            .env_remove("KILN_WORK_DIR")
            .env("KILN_SYSREQUIRES_MODE", "disabled")
            .output()
            .expect("failed to run kiln")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const LINUX_GCC: &[&str] = &[
    "-s",
    "os=Linux",
    "-s",
    "arch=x86_64",
    "-s",
    "compiler=gcc",
    "-s",
    "compiler.version=9",
];

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.kiln(&["--help"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Usage:"));
    assert!(out.contains("create"));
}

#[test]
fn test_list_shows_both_recipes() {
    let ctx = TestContext::new();
    let output = ctx.kiln(&["list"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("protoc"));
    assert!(out.contains("3.11.4"));
    assert!(out.contains("sentry-native"));
    assert!(out.contains("0.4.1"));
}

#[test]
fn test_list_merges_local_sources() {
    let ctx = TestContext::new();
    let local = ctx.kiln_home.join("recipes/protoc");
    std::fs::create_dir_all(&local).unwrap();
    std::fs::write(
        local.join("sources.toml"),
        r#"[sources."3.11.2"]
url = "https://github.com/protocolbuffers/protobuf/archive/v3.11.2.tar.gz"
sha256 = "e8c7601439dbd4489fe5069c33d374804990a56c2f710e00227ee5d8fd650e67"
format = "tar.gz"
"#,
    )
    .unwrap();

    let output = ctx.kiln(&["list"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("3.11.2, 3.11.4"));
}

#[test]
fn test_inspect_options() {
    let ctx = TestContext::new();
    let output = ctx.kiln(&["inspect", "sentry-native"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("MIT"));
    assert!(out.contains("backend"));
    assert!(out.contains("none, inproc, crashpad, breakpad"));
    assert!(out.contains("transport"));
}

#[test]
fn test_inspect_unknown_recipe() {
    let ctx = TestContext::new();
    let output = ctx.kiln(&["inspect", "zlib"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unknown recipe 'zlib'"));
}

#[test]
fn test_resolve_protoc() {
    let ctx = TestContext::new();
    let mut args = vec!["resolve", "protoc"];
    args.extend_from_slice(LINUX_GCC);
    let output = ctx.kiln(&args);
    assert!(output.status.success(), "{}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("protobuf/3.11.4@shift5/stable (public)"));
    assert!(out.contains("fPIC=True"));
    assert!(out.contains("-Dprotobuf_BUILD_TESTS=OFF"));
    assert!(out.contains("protoc.patch (Build, -p1)"));
}

#[test]
fn test_resolve_rejects_old_visual_studio() {
    let ctx = TestContext::new();
    let output = ctx.kiln(&[
        "resolve",
        "protoc",
        "-s",
        "os=Windows",
        "-s",
        "compiler=Visual Studio",
        "-s",
        "compiler.version=12",
    ]);
    assert!(!output.status.success());
    assert!(
        stderr(&output)
            .contains("On Windows Protobuf can only be built with Visual Studio 2015 or higher.")
    );
}

#[test]
fn test_resolve_unavailable_backend() {
    let ctx = TestContext::new();
    let mut args = vec!["resolve", "sentry-native", "-o", "backend=crashpad"];
    args.extend_from_slice(LINUX_GCC);
    let output = ctx.kiln(&args);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("crashpad"));
}

#[test]
fn test_resolve_with_profile() {
    let ctx = TestContext::new();
    let profile = ctx.temp_dir.path().join("linux.toml");
    std::fs::write(
        &profile,
        r#"[settings]
os = "Linux"
arch = "x86_64"
compiler = "gcc"
"compiler.version" = "9"

[options]
"sentry-native:transport" = "none"
"protoc:lite" = true
"#,
    )
    .unwrap();

    let output = ctx.kiln(&[
        "resolve",
        "sentry-native",
        "--profile",
        profile.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("transport=none"));
    assert!(out.contains("-DSENTRY_TRANSPORT=none"));
    assert!(!out.contains("libcurl"));
}

#[test]
fn test_resolve_unknown_option() {
    let ctx = TestContext::new();
    let mut args = vec!["resolve", "protoc", "-o", "with_openssl=True"];
    args.extend_from_slice(LINUX_GCC);
    let output = ctx.kiln(&args);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("with_openssl"));
}

#[test]
fn test_resolve_unknown_version() {
    let ctx = TestContext::new();
    let mut args = vec!["resolve", "protoc", "--version", "3.9.0"];
    args.extend_from_slice(LINUX_GCC);
    let output = ctx.kiln(&args);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("3.11.4"));
}
