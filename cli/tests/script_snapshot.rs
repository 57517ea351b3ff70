//! Snapshot coverage of the CLI's debug dump path, exercised against real
//! temp-directory scripts (no mock `Fs` here — this is the real driver).

use expect_test::expect;
use zbuild_cli::driver;

fn write_temp_script(name: &str, contents: &str) -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("zbuild-cli-test-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("zeptux.zbuild");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn dump_shows_default_and_command() {
    let path = write_temp_script(
        "dump_basic",
        "set special default = hello\ncommand hello {\n  shell echo hi\n}\n",
    );
    let out = driver::dump(&path).unwrap();
    expect![[r#"
        default: Some("hello")
        rule hello: deps=[] file_deps=[] multi=false
          $ echo hi
    "#]]
    .assert_eq(&out);
}

#[test]
fn dump_shows_rule_dependency() {
    let path = write_temp_script(
        "dump_deps",
        "set special default = top\ncommand bottom {\n  shell echo bottom\n}\ncommand top needs bottom {\n  shell echo top\n}\n",
    );
    let out = driver::dump(&path).unwrap();
    expect![[r#"
        default: Some("top")
        rule bottom: deps=[] file_deps=[] multi=false
          $ echo bottom
        rule top: deps=["bottom"] file_deps=[] multi=false
          $ echo top
    "#]]
    .assert_eq(&out);
}

#[test]
fn dump_reports_parse_error() {
    let path = write_temp_script("dump_bad", "nonsense\n");
    let err = driver::dump(&path).unwrap_err();
    assert!(matches!(err, driver::DriverError::Zbuild(_)));
}
