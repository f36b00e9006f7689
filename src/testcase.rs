use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;

use crate::checks::check::CheckInfo;
use crate::emperfect::EmperfectError;
use crate::output::{escape_html, make_escaped};
use crate::output::diff::diff_to_html;
use crate::output::sink::OutputInfo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    FailedCompile, // Compilation failed.
    FailedCheck,   // Failed one of the CHECK statements.
    FailedTime,    // Took too long and had a timeout.
    FailedRun,     // Had an error output during run.
    FailedOutput,  // Output didn't match expected.
    MissedError,   // Wrong error code was returned.
}

/// One test case: configuration from the recipe, the code block, the checks
/// discovered by the rewriter, and the results filled in by the pipeline.
#[derive(Debug)]
pub struct Testcase {
    // -- Configured from args --
    pub id: usize,
    pub name: String,
    pub points: f64,
    pub args: String,

    pub input_filename: String,  // Fed as standard input, if any.
    pub expect_filename: String, // Compared against standard output.
    pub code_filename: String,   // File with code to test (instead of a block).
    pub expect_exit_code: i32,

    // Names for generated files.
    pub cpp_filename: String,
    pub compile_filename: String,
    pub exe_filename: String,
    pub output_filename: String,
    pub error_filename: String,
    pub result_filename: String,

    pub call_main: bool,
    pub hidden: bool,
    pub match_case: bool,
    pub match_space: bool,
    pub timeout: u64,

    // -- Configured elsewhere --
    pub code: Vec<String>,
    pub checks: Vec<CheckInfo>,

    // -- Results --
    pub compile_exit_code: i32,
    pub run_exit_code: i32,
    pub output_match: bool,
    pub hit_timeout: bool,
    pub score: f64,
    pub warnings: HashMap<String, i32>,
}

impl Testcase {
    pub fn new(id: usize) -> Self {
        Testcase {
            id,
            name: format!("Test #{}", id),
            points: 0.0,
            args: String::new(),
            input_filename: String::new(),
            expect_filename: String::new(),
            code_filename: String::new(),
            expect_exit_code: 0,
            cpp_filename: String::new(),
            compile_filename: String::new(),
            exe_filename: String::new(),
            output_filename: String::new(),
            error_filename: String::new(),
            result_filename: String::new(),
            call_main: true,
            hidden: false,
            match_case: true,
            match_space: true,
            timeout: 5,
            code: Vec::new(),
            checks: Vec::new(),
            compile_exit_code: -1,
            run_exit_code: -1,
            output_match: true,
            hit_timeout: false,
            score: 0.0,
            warnings: HashMap::new(),
        }
    }

    pub fn num_checks(&self) -> usize {
        self.checks.len()
    }

    pub fn count_passed(&self) -> usize {
        self.checks.iter().filter(|check| check.passed()).count()
    }

    pub fn count_failed(&self) -> usize {
        self.checks.iter().filter(|check| !check.passed()).count()
    }

    /// Derived status; the first matching row wins.
    pub fn status(&self) -> TestStatus {
        if self.compile_exit_code != 0 {
            return TestStatus::FailedCompile;
        }
        if self.hit_timeout {
            return TestStatus::FailedTime;
        }
        if self.run_exit_code != self.expect_exit_code && self.expect_exit_code != 0 {
            return TestStatus::MissedError;
        }
        if self.run_exit_code != 0 && self.expect_exit_code == 0 {
            return TestStatus::FailedRun;
        }
        if self.checks.iter().any(|check| !check.passed()) {
            return TestStatus::FailedCheck;
        }
        if !self.output_match {
            return TestStatus::FailedOutput;
        }
        TestStatus::Passed
    }

    pub fn status_string(&self) -> String {
        match self.status() {
            TestStatus::Passed => "Passing".to_string(),
            TestStatus::FailedCheck => "Checks Failing".to_string(),
            TestStatus::FailedCompile => "Compilation Error".to_string(),
            TestStatus::FailedTime => "Timed Out".to_string(),
            TestStatus::FailedRun => "Error During Run".to_string(),
            TestStatus::FailedOutput => "Incorrect Output".to_string(),
            TestStatus::MissedError => format!("Wrong exit code (expected {} received {})",
                                               self.expect_exit_code, self.run_exit_code),
        }
    }

    pub fn passed(&self) -> bool {
        self.status() == TestStatus::Passed
    }

    pub fn failed(&self) -> bool {
        !self.passed()
    }

    pub fn earned_points(&self) -> f64 {
        if self.passed() { self.points } else { 0.0 }
    }

    /// Render this test into one sink, honoring its detail level.
    pub fn print_result(&self, output: &mut OutputInfo) -> Result<(), EmperfectError> {
        if !output.has_results() {
            return Ok(());
        }

        self.print_title(output)?;
        self.print_success(output)?;

        // Hidden tests reveal nothing more to student-level sinks.
        if self.hidden && !output.has_hidden_details() {
            return Ok(());
        }

        if output.has_debug() {
            self.print_debug(output)?;
        }

        let status = self.status();
        let print_checks = status == TestStatus::FailedCheck || output.has_passed_details();
        let print_code = self.failed() || output.has_passed_details();
        let print_compile = status == TestStatus::FailedCompile;
        let print_error = status == TestStatus::FailedRun;
        let print_input = status == TestStatus::MissedError
            || status == TestStatus::FailedOutput
            || output.has_passed_details();
        let print_diff = status == TestStatus::FailedRun || status == TestStatus::FailedOutput;

        if print_checks {
            for check in &self.checks {
                check.print_results(output)?;
            }
        }
        if print_code {
            self.print_code(output)?;
        }
        if print_compile {
            self.print_compile_results(output)?;
        }
        if print_error {
            self.print_error_results(output)?;
        }
        if print_input {
            self.print_args(output)?;
            self.print_input_file(output)?;
        }
        if print_diff {
            self.print_output_diff(output)?;
        }
        Ok(())
    }

    fn print_title(&self, output: &mut OutputInfo) -> Result<(), EmperfectError> {
        let html = output.is_html();
        let file = output.file()?;
        if html {
            write!(file, "<h2 id=\"Test{}\">Test Case {}: {}", self.id, self.id,
                   escape_html(&self.name))?;
            if self.hidden {
                write!(file, " <small>[HIDDEN]</small>")?;
            }
            write!(file, "</h2>\n")?;
        } else {
            write!(file, "TEST CASE {}: {}", self.id, self.name)?;
            if self.hidden {
                write!(file, " [HIDDEN]")?;
            }
            write!(file, "\n")?;
        }
        Ok(())
    }

    fn print_success(&self, output: &mut OutputInfo) -> Result<(), EmperfectError> {
        let (color, message) = match self.status() {
            TestStatus::Passed => ("Green", "PASSED!".to_string()),
            TestStatus::FailedCheck => ("Red", "FAILED due to unsuccessful check.".to_string()),
            TestStatus::FailedCompile => ("DarkRed", "FAILED during compilation.".to_string()),
            TestStatus::FailedTime => ("Purple", "FAILED due to timeout.".to_string()),
            TestStatus::FailedRun => ("OrangeRed", "FAILED due to run-time error.".to_string()),
            TestStatus::FailedOutput => ("OrangeRed", "FAILED due to mis-matched output.".to_string()),
            TestStatus::MissedError => ("OrangeRed",
                format!("FAILED due to wrong error code (expected {}; received {}).",
                        self.expect_exit_code, self.run_exit_code)),
        };

        let html = output.is_html();
        let file = output.file()?;
        if html {
            write!(file, "<b>Result: <span style=\"color: {}\">{}</span></b><br><br>\n\n",
                   color, message)?;
        } else {
            write!(file, "Result: {}\n", message)?;
        }
        Ok(())
    }

    fn print_code(&self, output: &mut OutputInfo) -> Result<(), EmperfectError> {
        if self.code.is_empty() {
            return Ok(());
        }

        let html = output.is_html();
        let file = output.file()?;
        if html {
            let code_text = self.code.join("\n");
            let table = format!("{}", box_html! {
                table(style="background-color:#E3E0CF;") {
                    tr {
                        td {
                            pre { : format!("\n\n{}\n", code_text) }
                        }
                    }
                }
            });
            write!(file, "Sourcecode for Test:<br><br>\n{}\n", table)?;
        } else {
            write!(file, "Sourcecode for Test:\n\n")?;
            for line in &self.code {
                write!(file, "{}\n", line)?;
            }
        }
        Ok(())
    }

    fn print_compile_results(&self, output: &mut OutputInfo) -> Result<(), EmperfectError> {
        let content = fs::read_to_string(&self.compile_filename).unwrap_or_default();

        let html = output.is_html();
        let file = output.file()?;
        if html {
            let size_style = if content.lines().count() > 25 {
                "width:800px; height:400px; overflow-y:scroll; display:block;"
            } else {
                "width:800px; display:block;"
            };
            let table = format!("{}", box_html! {
                table(style="background-color:Lavender") {
                    tr {
                        td(style=size_style) {
                            pre { : format!("\n\n{}", content) }
                        }
                    }
                }
            });
            write!(file, "<p>Compile Results for Test:<br><br>\n{}\n", table)?;
        } else {
            write!(file, "Compile Results for Test:\n\n{}", content)?;
        }
        Ok(())
    }

    fn print_error_results(&self, output: &mut OutputInfo) -> Result<(), EmperfectError> {
        let content = fs::read_to_string(&self.error_filename).unwrap_or_default();

        let html = output.is_html();
        let file = output.file()?;
        if html {
            let table = format!("{}", box_html! {
                table {
                    tr { th { : "Run-time Error Messages:" } }
                    tr {
                        td(valign="top", style="background-color:LightGray") {
                            pre { : content.clone() }
                        }
                    }
                }
            });
            write!(file, "{}\n", table)?;
        } else {
            write!(file, "========== RUN-TIME ERRORS ==========\n{}", content)?;
        }
        Ok(())
    }

    fn print_args(&self, output: &mut OutputInfo) -> Result<(), EmperfectError> {
        if self.args.is_empty() {
            return Ok(());
        }

        let html = output.is_html();
        let file = output.file()?;
        if html {
            write!(file, "Command Line Arguments: <code>{}</code><br>\n", escape_html(&self.args))?;
        } else {
            write!(file, "Command Line Arguments: {}\n", self.args)?;
        }
        Ok(())
    }

    fn print_input_file(&self, output: &mut OutputInfo) -> Result<(), EmperfectError> {
        let html = output.is_html();

        if self.input_filename.is_empty() {
            let file = output.file()?;
            if html {
                write!(file, "No input for test.<br>\n")?;
            } else {
                write!(file, "No input for test.\n")?;
            }
            return Ok(());
        }

        let content = fs::read_to_string(&self.input_filename).unwrap_or_default();
        let file = output.file()?;
        if html {
            let table = format!("{}", box_html! {
                table {
                    tr { th { : "Input" } }
                    tr {
                        td(valign="top", style="background-color:LightGreen") {
                            pre { : content.clone() }
                        }
                    }
                }
            });
            write!(file, "{}\n", table)?;
        } else {
            write!(file, "========== INPUT ==========\n{}", content)?;
        }
        Ok(())
    }

    fn print_output_diff(&self, output: &mut OutputInfo) -> Result<(), EmperfectError> {
        let out_content = fs::read_to_string(&self.output_filename).unwrap_or_default();
        let exp_content = fs::read_to_string(&self.expect_filename).unwrap_or_default();

        let html = output.is_html();
        let file = output.file()?;
        if html {
            write!(file, "<table>\n<tr><th>Your Output<th> <th>Expected Output</tr>\n")?;
            write!(file, "<tr><td valign=\"top\" style=\"background-color:LightGoldenrodYellow\"><pre>\n")?;
            for line in out_content.lines() {
                write!(file, "{}\n", escape_html(&make_escaped(line)))?;
            }
            write!(file, "</pre>\n<td>&nbsp;<td valign=\"top\" style=\"background-color:LightBlue\"><pre>\n")?;
            for line in exp_content.lines() {
                write!(file, "{}\n", escape_html(&make_escaped(line)))?;
            }
            write!(file, "</pre></tr></table>\n")?;
            write!(file, "{}\n", diff_to_html(&out_content, &exp_content))?;
        } else {
            write!(file, "========== YOUR OUTPUT ==========\n")?;
            for line in out_content.lines() {
                write!(file, "{}\n", make_escaped(line))?;
            }
            write!(file, "\n========== EXPECTED OUTPUT ==========\n")?;
            for line in exp_content.lines() {
                write!(file, "{}\n", make_escaped(line))?;
            }
            write!(file, "\n========== END OUTPUT ==========\n")?;
        }
        Ok(())
    }

    fn print_debug(&self, output: &mut OutputInfo) -> Result<(), EmperfectError> {
        let none_if_empty = |name: &str| {
            if name.is_empty() { "(none)".to_string() } else { name.to_string() }
        };

        let mut dump = String::new();
        writeln!(dump, "Name..............: {}", self.name).unwrap();
        writeln!(dump, "Points............: {}", self.points).unwrap();
        writeln!(dump, "Hidden............: {}", self.hidden).unwrap();
        writeln!(dump, "match_case........: {}", self.match_case).unwrap();
        writeln!(dump, "match_space.......: {}", self.match_space).unwrap();
        writeln!(dump, "call_main.........: {}", self.call_main).unwrap();
        writeln!(dump, "Timeout...........: {} seconds", self.timeout).unwrap();
        writeln!(dump, "Command Line Args.: {}", none_if_empty(&self.args)).unwrap();
        writeln!(dump, "Expected exit code: {}", self.expect_exit_code).unwrap();
        writeln!(dump, "Input file........: {}", none_if_empty(&self.input_filename)).unwrap();
        writeln!(dump, "Expected output...: {}", none_if_empty(&self.expect_filename)).unwrap();
        writeln!(dump, "Code file.........: {}", none_if_empty(&self.code_filename)).unwrap();
        writeln!(dump, "Generated CPP.....: {}", none_if_empty(&self.cpp_filename)).unwrap();
        writeln!(dump, "Compiler results..: {}", none_if_empty(&self.compile_filename)).unwrap();
        writeln!(dump, "Executable........: {}", none_if_empty(&self.exe_filename)).unwrap();
        writeln!(dump, "Execution output..: {}", none_if_empty(&self.output_filename)).unwrap();
        writeln!(dump, "Execution errors..: {}", none_if_empty(&self.error_filename)).unwrap();
        writeln!(dump, "Result log........: {}", none_if_empty(&self.result_filename)).unwrap();
        for check in &self.checks {
            writeln!(dump, "Check.............: {} [{}]", check.expr.as_str(), check.location).unwrap();
        }
        if !self.warnings.is_empty() {
            let mut warns: Vec<_> = self.warnings.iter().collect();
            warns.sort();
            let listed = warns.iter()
                .map(|(warn, count)| format!("{}: {}", warn, count))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(dump, "Compiler warnings.: {}", listed).unwrap();
        }

        let html = output.is_html();
        let file = output.file()?;
        if html {
            write!(file, "<pre>\n{}</pre>\n", escape_html(&dump))?;
        } else {
            write!(file, "===============\n{}\n", dump)?;
        }
        Ok(())
    }
}

/// Load a file as a vector of lines; a missing file reads as empty.
pub(crate) fn load_lines(path: &str) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
