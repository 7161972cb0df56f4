use std::fs;
use std::process::Command;

fn jmmc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_jmmc"))
}

#[test]
fn compile_writes_one_listing_per_class() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("Main.java");
    fs::write(
        &input,
        r#"
package demo;

public class Main {
    public static void main(String[] args) {
        System.out.println(new Counter().next());
    }
}

class Counter {
    int value;
    int next() { return ++value; }
}
"#,
    )
    .expect("write source");
    let out = dir.path().join("out");

    let status = jmmc()
        .arg("compile")
        .arg(&input)
        .arg("-o")
        .arg(&out)
        .status()
        .expect("run jmmc");
    assert!(status.success());

    let main = fs::read_to_string(out.join("Main.jasm")).expect("Main.jasm");
    assert!(main.starts_with(".class public super demo/Main"));
    assert!(main.contains(".method public static main ([Ljava/lang/String;)V"));
    assert!(main.contains("getstatic java/lang/System.out:Ljava/io/PrintStream;"));
    assert!(main.contains("invokevirtual java/io/PrintStream.println:(I)V"));

    let counter = fs::read_to_string(out.join("Counter.jasm")).expect("Counter.jasm");
    assert!(counter.contains("putfield demo/Counter.value:I"));
}

#[test]
fn compile_reports_diagnostics_and_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("Bad.java");
    fs::write(&input, "class Bad {\n  void m() {\n    int x = \"no\";\n  }\n}\n").expect("write source");
    let out = dir.path().join("out");

    let output = jmmc()
        .arg("compile")
        .arg(&input)
        .arg("-o")
        .arg(&out)
        .output()
        .expect("run jmmc");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let expected = format!("{}:3: ", input.display());
    assert!(stderr.contains(&expected), "stderr: {}", stderr);
    assert!(!out.join("Bad.jasm").exists());
}

#[test]
fn lex_prints_tokens_with_locations() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("A.java");
    fs::write(&input, "class A {\n}\n").expect("write source");

    let output = jmmc().arg("lex").arg(&input).arg("-l").output().expect("run jmmc");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().next().map_or(false, |line| line.ends_with(" at 1:1")), "{}", stdout);
    assert!(stdout.contains(" at 2:1"));
}

#[test]
fn parse_fails_on_syntax_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("A.java");
    fs::write(&input, "class A { void m() { int x } }").expect("write source");

    let output = jmmc().arg("parse").arg(&input).output().expect("run jmmc");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("CompilationUnit"));
}

#[test]
fn missing_input_is_an_error() {
    let output = jmmc().arg("compile").arg("/nonexistent/None.java").output().expect("run jmmc");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("cannot read"));
}
