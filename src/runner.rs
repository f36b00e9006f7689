use std::fs::{self, OpenOptions};
use std::io::Write as _;

use regex::Regex;
use subprocess::{Exec, ExitStatus};

use crate::checks::{codegen, rewriter};
use crate::emperfect::{Emperfect, EmperfectError};
use crate::recipe::scanner::pop_word;
use crate::testcase::{load_lines, Testcase};

lazy_static! {
    static ref RE_WARNINGS: Regex =
        Regex::new(r"warning: .*? \[-W(?P<warn>[^\]]+)\]").unwrap();
}

impl Emperfect {
    /// Run one test case through the five pipeline phases. Per-test failures
    /// (compile, run, timeout, mismatch) are captured on the test record;
    /// only harness-internal problems surface as errors.
    pub(crate) fn run_test(&mut self, test: &mut Testcase) -> Result<(), EmperfectError> {
        self.vars.set("#test", test.id.to_string());
        self.vars.set("compile", test.compile_filename.clone());
        self.vars.set("cpp", test.cpp_filename.clone());
        self.vars.set("error", test.error_filename.clone());
        self.vars.set("exe", test.exe_filename.clone());
        self.vars.set("out", test.output_filename.clone());
        self.vars.set("result", test.result_filename.clone());

        // Phase 1: Generate the CPP file to be tested.
        self.generate_test_cpp(test)?;

        // Phase 2: Compile it, reporting back any errors.
        self.compile_test(test)?;

        if test.compile_exit_code == 0 {
            // Phase 3: Run the executable under the timeout wrapper.
            self.run_test_exe(test)?;

            // Phase 4: Compare any outputs produced.
            self.compare_test_results(test);
        }

        // Phase 5: Record point calculations and feedback.
        self.record_test_results(test)?;
        Ok(())
    }

    fn generate_test_cpp(&mut self, test: &mut Testcase) -> Result<(), EmperfectError> {
        if !test.code_filename.is_empty() {
            if !test.code.is_empty() {
                return Err(EmperfectError::CodeConflict(test.id));
            }
            let content = fs::read_to_string(&test.code_filename)
                .map_err(|err| EmperfectError::FileError(test.code_filename.clone(), err))?;
            test.code = content.lines().map(str::to_string).collect();
        }

        let processed_code = self.vars.apply(&test.code.join("\n"))?;

        let mut header = String::new();
        for line in &self.header {
            header.push_str(&self.vars.apply(line)?);
            header.push('\n');
        }

        let body = rewriter::process_checks(&processed_code, test.id, &mut test.checks)?;

        println!("Creating: {}", test.cpp_filename);
        codegen::write_test_cpp(test, &header, &body)
    }

    fn compile_test(&mut self, test: &mut Testcase) -> Result<(), EmperfectError> {
        for line in self.compile.clone() {
            let command = self.vars.apply(&line)?;
            println!("{}", command);
            test.compile_exit_code = shell_exit(&command)?;
            println!("Compile exit code: {}", test.compile_exit_code);
        }

        if test.compile_exit_code == 0 {
            let log = fs::read_to_string(&test.compile_filename).unwrap_or_default();
            for cap in RE_WARNINGS.captures_iter(&log) {
                *test.warnings.entry(cap["warn"].to_string()).or_insert(0) += 1;
            }
            if !test.warnings.is_empty() {
                println!("Detected compiler warnings:");
                for (warn, amount) in test.warnings.iter() {
                    println!("  {}: {}", warn, amount);
                }
            }
        }
        Ok(())
    }

    fn run_test_exe(&mut self, test: &mut Testcase) -> Result<bool, EmperfectError> {
        let mut run_command = format!("timeout {} ./{}", test.timeout, test.exe_filename);
        if !test.args.is_empty() {
            run_command.push_str(&format!(" {}", test.args));
        }
        if !test.input_filename.is_empty() {
            run_command.push_str(&format!(" < {}", test.input_filename));
        }
        run_command.push_str(&format!(" > {} 2> {}", test.output_filename, test.error_filename));

        println!("{}", run_command);
        test.run_exit_code = shell_exit(&run_command)?;

        // The timeout wrapper's 124 may land in either byte of the status.
        if test.run_exit_code % 256 == 124 || test.run_exit_code / 256 == 124 {
            test.hit_timeout = true;
            println!("...Halted due to timeout.");
        }
        println!("Executable exit code: {}", test.run_exit_code);
        Ok(test.run_exit_code == 0)
    }

    fn compare_test_results(&mut self, test: &mut Testcase) {
        if test.expect_filename.is_empty() {
            test.output_match = true; // No output to match...
            println!("No output to match.");
            return;
        }

        let expect = normalize_output(load_lines(&test.expect_filename),
                                      test.match_case, test.match_space);
        let output = normalize_output(load_lines(&test.output_filename),
                                      test.match_case, test.match_space);
        test.output_match = expect == output;
        if test.output_match {
            println!("Output match: Passed!");
        } else {
            println!("Output match: Failed.");
        }
    }

    fn record_test_results(&mut self, test: &mut Testcase) -> Result<(), EmperfectError> {
        // A test that never compiled or crashed early leaves no results file;
        // that reads as "no checks resolved".
        let content = fs::read_to_string(&test.result_filename).unwrap_or_default();
        parse_result_file(&content, test)?;

        for output in self.outputs.iter_mut() {
            test.print_result(output)?;
        }

        let log_path = self.log_path();
        let mut log = OpenOptions::new().append(true).create(true).open(&log_path)
            .map_err(|err| EmperfectError::FileError(log_path.clone(), err))?;
        writeln!(log, "Test {}: {} (compile exit {}, run exit {}, score {} of {})",
                 test.id, test.status_string(), test.compile_exit_code,
                 test.run_exit_code, test.score, test.points)?;
        Ok(())
    }
}

/// Run a command through the system shell and decode its exit status.
fn shell_exit(command: &str) -> Result<i32, EmperfectError> {
    let status = Exec::shell(command).join()?;
    Ok(match status {
        ExitStatus::Exited(code) => code as i32,
        ExitStatus::Signaled(signal) => 128 + i32::from(signal),
        ExitStatus::Other(code) => code,
        ExitStatus::Undetermined => -1,
    })
}

/// Apply the output-comparison policy: optional case folding, optional full
/// whitespace stripping, and removal of blank lines.
pub(crate) fn normalize_output(lines: Vec<String>, match_case: bool, match_space: bool)
    -> Vec<String>
{
    let mut lines = lines;
    if !match_case {
        lines = lines.iter().map(|line| line.to_ascii_lowercase()).collect();
    }
    if !match_space {
        lines = lines.iter()
            .map(|line| line.chars().filter(|c| !c.is_whitespace()).collect())
            .collect();
    }
    lines.retain(|line| !line.trim().is_empty());
    lines
}

/// Parse the line-oriented result protocol back into the test's check
/// records. The first whitespace token of each line selects the field.
pub(crate) fn parse_result_file(content: &str, test: &mut Testcase)
    -> Result<(), EmperfectError>
{
    let mut check_id = 0usize;
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let (field, rest) = pop_word(line);
        let value = rest.trim();
        match field {
            ":CHECK:" => {
                check_id = value.parse()
                    .map_err(|_| EmperfectError::BadResultLine(line.to_string()))?;
                if check_id >= test.checks.len() {
                    return Err(EmperfectError::UnknownCheckId(check_id));
                }
            }
            ":TEST:" => {} // We already have the expression.
            ":RESULT:" => {
                let check = test.checks.get_mut(check_id)
                    .ok_or(EmperfectError::UnknownCheckId(check_id))?;
                check.passed.push(value == "1");
            }
            ":LHS:" => {
                let check = test.checks.get_mut(check_id)
                    .ok_or(EmperfectError::UnknownCheckId(check_id))?;
                check.lhs_value.push(value.to_string());
            }
            ":RHS:" => {
                let check = test.checks.get_mut(check_id)
                    .ok_or(EmperfectError::UnknownCheckId(check_id))?;
                check.rhs_value.push(value.to_string());
            }
            ":MSG:" => {
                let check = test.checks.get_mut(check_id)
                    .ok_or(EmperfectError::UnknownCheckId(check_id))?;
                check.error_out.push(value.to_string());
            }
            "SCORE" => {
                test.score = value.parse()
                    .map_err(|_| EmperfectError::BadResultLine(line.to_string()))?;
                println!("Score = {} of {}", test.score, test.points);
            }
            _ => return Err(EmperfectError::UnknownResultField(field.to_string())),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::check::{CheckInfo, CheckKind};

    fn test_with_checks(count: usize) -> Testcase {
        let mut test = Testcase::new(0);
        for id in 0..count {
            test.checks.push(
                CheckInfo::new(CheckKind::Assert, "1 == 1", format!("loc{}", id), id).unwrap());
        }
        test
    }

    #[test]
    fn protocol_fills_parallel_result_vectors() {
        let mut test = test_with_checks(2);
        let content = "\
:CHECK: 0
:TEST: s == \"b\"
:RESULT: 0
:LHS: a
:RHS: b
:MSG: got a

:CHECK: 1
:TEST: 1 == 1
:RESULT: 1
:LHS: 1
:RHS: 1
:MSG: Success!

SCORE 0
";
        parse_result_file(content, &mut test).unwrap();
        assert_eq!(test.checks[0].passed, vec![false]);
        assert_eq!(test.checks[0].lhs_value, vec!["a".to_string()]);
        assert_eq!(test.checks[0].rhs_value, vec!["b".to_string()]);
        assert_eq!(test.checks[0].error_out, vec!["got a".to_string()]);
        assert!(test.checks[1].passed());
        assert_eq!(test.score, 0.0);
        assert_eq!(test.count_passed(), 1);
        assert_eq!(test.count_failed(), 1);
    }

    #[test]
    fn checks_in_loops_accumulate_executions() {
        let mut test = test_with_checks(1);
        let content = "\
:CHECK: 0
:TEST: i < 3
:RESULT: 1
:LHS: 0
:RHS: 3
:MSG: ok
:CHECK: 0
:TEST: i < 3
:RESULT: 1
:LHS: 1
:RHS: 3
:MSG: ok
SCORE 5
";
        parse_result_file(content, &mut test).unwrap();
        assert_eq!(test.checks[0].passed.len(), 2);
        assert!(test.checks[0].passed());
        assert_eq!(test.score, 5.0);
    }

    #[test]
    fn unknown_field_is_fatal() {
        let mut test = test_with_checks(1);
        let err = parse_result_file(":BOGUS: 1\n", &mut test).unwrap_err();
        assert!(matches!(err, EmperfectError::UnknownResultField(field) if field == ":BOGUS:"));
    }

    #[test]
    fn out_of_range_check_id_is_fatal() {
        let mut test = test_with_checks(1);
        let err = parse_result_file(":CHECK: 7\n", &mut test).unwrap_err();
        assert!(matches!(err, EmperfectError::UnknownCheckId(7)));
    }

    #[test]
    fn empty_result_file_resolves_nothing() {
        let mut test = test_with_checks(1);
        parse_result_file("", &mut test).unwrap();
        assert!(!test.checks[0].passed());
        assert_eq!(test.score, 0.0);
    }

    #[test]
    fn comparison_drops_blank_lines_by_default() {
        let left = vec!["hello".to_string(), "".to_string(), "world".to_string()];
        let right = vec!["hello".to_string(), "world".to_string()];
        assert_eq!(normalize_output(left, true, true), normalize_output(right, true, true));
    }

    #[test]
    fn case_folding_ignores_ascii_case_only() {
        let upper = vec!["HELLO".to_string()];
        let lower = vec!["hello".to_string()];
        assert_eq!(normalize_output(upper.clone(), false, true), normalize_output(lower.clone(), false, true));
        assert_ne!(normalize_output(upper, true, true), normalize_output(lower, true, true));
    }

    #[test]
    fn space_folding_equates_whitespace_runs() {
        let spaced = vec!["a  b\tc".to_string(), "   ".to_string()];
        let tight = vec!["a b c".to_string()];
        assert_eq!(normalize_output(spaced, true, false), normalize_output(tight, true, false));
    }
}
