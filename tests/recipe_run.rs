use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

// Compile recipes in these tests are plain shell commands that fabricate a
// protocol-writing script as the "executable", so no C++ toolchain is needed
// to exercise the whole pipeline.

fn run_recipe(dir: &Path, recipe: &str) -> Output {
    fs::write(dir.join("recipe.txt"), recipe).unwrap();
    Command::new(env!("CARGO_BIN_EXE_emperfect"))
        .arg("recipe.txt")
        .current_dir(dir)
        .output()
        .unwrap()
}

fn read(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap_or_default()
}

#[test]
fn passing_check_earns_full_points() {
    let tmp = TempDir::new().unwrap();
    let recipe = r#":Init
:Compile
printf '#!/bin/sh\nprintf ":CHECK: 0\\n:TEST: t\\n:RESULT: 1\\n:LHS: 2\\n:RHS: 2\\n:MSG: ok\\nSCORE 5\\n" > ${result}\n' > ${exe}
chmod +x ${exe}
:Output filename="grade.txt", detail=percent
:Output filename="score.txt", detail=score
:Output filename="summary.txt", detail=summary
:Output filename="report.html", detail=student
:TestCase name="Simple math", points=5
  CHECK(1 + 1 == 2);
"#;
    let output = run_recipe(tmp.path(), recipe);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    assert_eq!(read(tmp.path(), "grade.txt"), "100%\n");
    assert_eq!(read(tmp.path(), "score.txt"), "5 of 5");

    let summary = read(tmp.path(), "summary.txt");
    assert!(summary.starts_with("Autograde Summary\n\n"));
    assert!(summary.contains("0 : Simple math : passed 1 of 1 checks; 5 points."));
    assert!(summary.contains("Final Score: 100"));

    let report = read(tmp.path(), "report.html");
    assert!(report.starts_with("<h1>Autograde Results</h1>"));
    assert!(report.contains("Test Case 0: Simple math"));
    assert!(report.contains("PASSED!"));
    assert!(report.contains("<h1>Summary</h1>"));

    // The generated source and the log land in the working directory.
    assert!(tmp.path().join(".emperfect").join("Test0.cpp").exists());
    let log = read(tmp.path(), ".emperfect/Log.txt");
    assert!(log.starts_with("== EMPERFECT TEST LOG =="));
    assert!(log.contains("Test 0: Passing"));
}

#[test]
fn failing_check_reports_message_and_values() {
    let tmp = TempDir::new().unwrap();
    let recipe = r#":Init
:Compile
printf '#!/bin/sh\nprintf ":CHECK: 0\\n:TEST: t\\n:RESULT: 0\\n:LHS: a\\n:RHS: b\\n:MSG: got a\\nSCORE 0\\n" > ${result}\n' > ${exe}
chmod +x ${exe}
:Output filename="grade.txt", detail=percent
:Output filename="report.html", detail=student
:TestCase name="String compare", points=5
  std::string s = "a";
  CHECK(s == "b", "got ", s);
"#;
    let output = run_recipe(tmp.path(), recipe);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    assert_eq!(read(tmp.path(), "grade.txt"), "0%\n");

    let report = read(tmp.path(), "report.html");
    assert!(report.contains("FAILED due to unsuccessful check."));
    assert!(report.contains("Error Message: got a"));
    assert!(report.contains("Left side:"));
    assert!(report.contains("<code>a</code>"));
    assert!(report.contains("<code>b</code>"));
    // Failed tests show their source code.
    assert!(report.contains("CHECK(s == &quot;b&quot;, &quot;got &quot;, s);")
            || report.contains("CHECK(s == \"b\", \"got \", s);"));
}

#[test]
fn boolean_combinators_abort_the_run() {
    let tmp = TempDir::new().unwrap();
    let recipe = r#":Init
:Compile
true
:TestCase name="Bad check", points=5
  CHECK(x && y);
"#;
    let output = run_recipe(tmp.path(), recipe);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("checks do not allow"));
    assert!(stderr.contains("Testcase #0"));
}

#[test]
fn timeouts_are_detected_and_fail_the_test() {
    let tmp = TempDir::new().unwrap();
    let recipe = r#":Init
:Compile
printf '#!/bin/sh\nsleep 3\n' > ${exe}
chmod +x ${exe}
:Output filename="grade.txt", detail=percent
:TestCase name="Spin", points=5, timeout=1
  while (true) { }
"#;
    let output = run_recipe(tmp.path(), recipe);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    assert_eq!(read(tmp.path(), "grade.txt"), "0%\n");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("...Halted due to timeout."));
    assert!(read(tmp.path(), ".emperfect/Log.txt").contains("Timed Out"));
}

#[test]
fn expected_exit_codes_flip_run_failures() {
    let tmp = TempDir::new().unwrap();
    let recipe = r#":Init
:Compile
printf '#!/bin/sh\nexit 1\n' > ${exe}
chmod +x ${exe}
:Output filename="grade.txt", detail=percent
:TestCase name="Wants failure", points=1, exit_code=1
  int x = 1;
:TestCase name="Wants success", points=1
  int x = 1;
"#;
    let output = run_recipe(tmp.path(), recipe);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    assert_eq!(read(tmp.path(), "grade.txt"), "50%\n");
    let log = read(tmp.path(), ".emperfect/Log.txt");
    assert!(log.contains("Test 0: Passing"));
    assert!(log.contains("Test 1: Error During Run"));
}

#[test]
fn output_comparison_honors_match_case() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("expected.txt"), "hello\n").unwrap();
    let recipe = r#":Init
:Compile
printf '#!/bin/sh\nprintf "HELLO\\n"\n' > ${exe}
chmod +x ${exe}
:Output filename="grade.txt", detail=percent
:Output filename="report.html", detail=student
:TestCase name="Loose", points=1, expect="expected.txt", match_case=false
  int x = 1;
:TestCase name="Strict", points=1, expect="expected.txt"
  int x = 1;
"#;
    let output = run_recipe(tmp.path(), recipe);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    assert_eq!(read(tmp.path(), "grade.txt"), "50%\n");

    let report = read(tmp.path(), "report.html");
    assert!(report.contains("FAILED due to mis-matched output."));
    // The mismatch renders a character diff.
    assert!(report.contains("Diff"));
    assert!(report.contains("LightCoral"));
    assert!(report.contains("Expected Output"));
}

#[test]
fn hidden_tests_withhold_details_from_students() {
    let tmp = TempDir::new().unwrap();
    let recipe = r#":Init
:Compile
printf '#!/bin/sh\nprintf ":CHECK: 0\\n:TEST: t\\n:RESULT: 0\\n:LHS: 1\\n:RHS: 2\\n:MSG: wrong\\nSCORE 0\\n" > ${result}\n' > ${exe}
chmod +x ${exe}
:Output filename="student.html", detail=student
:Output filename="teacher.html", detail=teacher
:TestCase name="Secret", points=2, hidden=true
  int secret = 1;
  CHECK(secret == 2);
"#;
    let output = run_recipe(tmp.path(), recipe);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let student = read(tmp.path(), "student.html");
    assert!(student.contains("[HIDDEN]"));
    assert!(student.contains("FAILED due to unsuccessful check."));
    assert!(!student.contains("int secret = 1;"));

    let teacher = read(tmp.path(), "teacher.html");
    assert!(teacher.starts_with("<h1>Autograde Results (Instructor Eyes Only)</h1>"));
    assert!(teacher.contains("int secret = 1;"));
    assert!(teacher.contains("wrong"));
}

#[test]
fn missing_recipe_argument_prints_usage() {
    let output = Command::new(env!("CARGO_BIN_EXE_emperfect")).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Format:"));
}

#[test]
fn unreadable_recipe_is_a_harness_error() {
    let tmp = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_emperfect"))
        .arg("no-such-recipe.txt")
        .current_dir(tmp.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("cannot read recipe file"));
}
