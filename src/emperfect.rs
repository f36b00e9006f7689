use std::fs;
use std::io::Write as _;
use std::path::Path;

use thiserror::Error;

use crate::output::escape_html;
use crate::output::sink::OutputInfo;
use crate::recipe::scanner::{pop_word, RecipeScan};
use crate::recipe::vars::VarMap;
use crate::testcase::Testcase;

#[derive(Debug, Error)]
pub enum EmperfectError {
    #[error("cannot read recipe file: {0}")]
    RecipeNotFound(String),
    #[error("line {0} is not a directive: {1}")]
    ExpectedDirective(usize, String),
    #[error("unknown directive '{0}'")]
    UnknownDirective(String),
    #[error("unknown {0} argument '{1}'")]
    UnknownArgument(&'static str, String),
    #[error(":Init run twice")]
    DoubleInit,
    #[error("cannot set up testcase without compile rules")]
    MissingCompileRules,
    #[error("expected key=value assignment: {0}")]
    BadAssignment(String),
    #[error("no end to variable on line: {0}")]
    UnterminatedVariable(String),
    #[error("unknown variable '{0}' used on line: {1}")]
    UnknownVariable(String, String),
    #[error("unknown detail level '{0}'")]
    UnknownDetail(String),
    #[error("unknown '{setting}' value '{value}'")]
    BadSetting { setting: &'static str, value: String },
    #[error("{0}: checks do not allow \"&&\" or \"||\"")]
    BooleanCombinator(String),
    #[error("{0}: checks can have only one comparison")]
    DoubleComparison(String),
    #[error("{0}: CHECK cannot be empty")]
    EmptyCheck(String),
    #[error("{0}: CHECK_TYPE needs at least two args")]
    CheckTypeArgs(String),
    #[error("{0}: no matching ')' for check macro")]
    UnbalancedCheck(String),
    #[error("test case {0} cannot have both a code file and an inline code block")]
    CodeConflict(usize),
    #[error("cannot change filename once output file is used (new name={0})")]
    FilenameLocked(String),
    #[error("unknown field in result file: {0}")]
    UnknownResultField(String),
    #[error("result file references unknown check {0}")]
    UnknownCheckId(usize),
    #[error("malformed result line: {0}")]
    BadResultLine(String),
    #[error("cannot create directory '{0}': {1}")]
    CreateDirFailed(String, #[source] std::io::Error),
    #[error("cannot access file '{0}': {1}")]
    FileError(String, #[source] std::io::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    CommandError(#[from] subprocess::PopenError),
}

/// The harness driver: owns the recipe cursor, the variable store, the
/// compile/header blocks, the registered sinks, and every processed test.
pub struct Emperfect {
    scan: RecipeScan,
    is_init: bool,
    pub(crate) tests: Vec<Testcase>,
    pub(crate) outputs: Vec<OutputInfo>,
    pub(crate) compile: Vec<String>,
    pub(crate) header: Vec<String>,
    pub(crate) vars: VarMap,
}

impl Emperfect {
    pub fn new() -> Self {
        Emperfect {
            scan: RecipeScan::default(),
            is_init: false,
            tests: Vec::new(),
            outputs: Vec::new(),
            compile: Vec::new(),
            header: Vec::new(),
            vars: VarMap::default(),
        }
    }

    pub fn load_file(&mut self, path: &str) -> Result<(), EmperfectError> {
        let content = fs::read_to_string(path)
            .map_err(|_| EmperfectError::RecipeNotFound(path.to_string()))?;
        self.load(&content)
    }

    /// Process a whole recipe: dispatch every directive, running each test
    /// case as it is encountered, then emit the final summaries.
    pub fn load(&mut self, content: &str) -> Result<(), EmperfectError> {
        self.scan = RecipeScan::from_string(content);

        while let Some(raw_line) = self.scan.read() {
            let line = self.vars.apply(&raw_line)?;
            if line.trim().is_empty() {
                continue;
            }
            if !line.starts_with(':') {
                return Err(EmperfectError::ExpectedDirective(self.scan.line_number(), line));
            }

            let (word, args) = pop_word(&line);
            let command = word.to_lowercase();
            match command.as_str() {
                ":init" => self.init(args)?,
                ":compile" => {
                    self.ensure_init()?;
                    self.vars.load(args)?;
                    self.compile = self.scan.read_block(true);
                }
                ":header" => {
                    self.ensure_init()?;
                    self.vars.load(args)?;
                    self.header = self.scan.read_block(true);
                }
                ":output" => self.add_output(args)?,
                ":testcase" => self.add_testcase(args)?,
                _ => return Err(EmperfectError::UnknownDirective(command)),
            }
        }

        self.print_summary()?;
        for output in self.outputs.iter_mut() {
            output.flush();
        }
        Ok(())
    }

    fn init(&mut self, args: &str) -> Result<(), EmperfectError> {
        if self.is_init {
            return Err(EmperfectError::DoubleInit);
        }
        self.is_init = true;
        self.vars.load(args)?;

        let dir = self.vars.get("dir").unwrap_or("").to_string();
        if !Path::new(&dir).exists() {
            println!("CREATING: {}", dir);
            fs::create_dir_all(&dir)
                .map_err(|err| EmperfectError::CreateDirFailed(dir.clone(), err))?;
        }

        let log_path = self.log_path();
        fs::write(&log_path, "== EMPERFECT TEST LOG ==\n\n")
            .map_err(|err| EmperfectError::FileError(log_path.clone(), err))?;
        Ok(())
    }

    fn ensure_init(&mut self) -> Result<(), EmperfectError> {
        if !self.is_init {
            self.init("")?;
        }
        Ok(())
    }

    pub(crate) fn log_path(&self) -> String {
        format!("{}/{}",
                self.vars.get("dir").unwrap_or(""),
                self.vars.get("log").unwrap_or(""))
    }

    fn add_output(&mut self, args: &str) -> Result<(), EmperfectError> {
        self.ensure_init()?;

        let new_vars = self.vars.load(args)?;
        let mut output = OutputInfo::default();
        for (arg, value) in new_vars {
            match arg.as_str() {
                "detail" => output.set_detail(&value)?,
                "filename" => output.set_filename(&value)?,
                "type" => output.set_type(&value),
                _ => return Err(EmperfectError::UnknownArgument(":Output", arg)),
            }
        }
        self.outputs.push(output);
        Ok(())
    }

    fn add_testcase(&mut self, args: &str) -> Result<(), EmperfectError> {
        self.ensure_init()?;
        if self.compile.is_empty() {
            return Err(EmperfectError::MissingCompileRules);
        }

        let mut test = Testcase::new(self.tests.len());
        self.config_testcase(&mut test, args)?;
        test.code = self.scan.read_block(true);
        self.run_test(&mut test)?;
        self.tests.push(test);
        Ok(())
    }

    /// Configure a testcase from its argument tail. Generated filenames
    /// default to ${dir}/Test<id> plus a suffix; argument keys may override
    /// them through the variable store before they lock into the test.
    fn config_testcase(&mut self, test: &mut Testcase, args: &str) -> Result<(), EmperfectError> {
        let file_base = format!("{}/Test{}", self.vars.get("dir").unwrap_or(""), test.id);
        self.vars.set("compile", format!("{}-compile.txt", file_base));
        self.vars.set("cpp", format!("{}.cpp", file_base));
        self.vars.set("error", format!("{}-errors.txt", file_base));
        self.vars.set("exe", format!("{}.exe", file_base));
        self.vars.set("out", format!("{}-output.txt", file_base));
        self.vars.set("result", format!("{}-result.txt", file_base));

        let new_vars = self.vars.load(args)?;
        test.compile_filename = self.vars.get("compile").unwrap_or("").to_string();
        test.cpp_filename = self.vars.get("cpp").unwrap_or("").to_string();
        test.error_filename = self.vars.get("error").unwrap_or("").to_string();
        test.exe_filename = self.vars.get("exe").unwrap_or("").to_string();
        test.output_filename = self.vars.get("out").unwrap_or("").to_string();
        test.result_filename = self.vars.get("result").unwrap_or("").to_string();

        for (arg, value) in new_vars {
            match arg.as_str() {
                "args" => test.args = value,
                "code_file" => test.code_filename = value,
                "exit_code" => {
                    test.expect_exit_code = value.parse().map_err(|_| {
                        EmperfectError::BadSetting { setting: "exit_code", value }
                    })?;
                }
                "expect" => test.expect_filename = value,
                "hidden" => test.hidden = parse_bool(&value, "hidden")?,
                "input" => test.input_filename = value,
                "match_case" => test.match_case = parse_bool(&value, "match_case")?,
                "match_space" => test.match_space = parse_bool(&value, "match_space")?,
                "name" => test.name = value,
                "output" => test.output_filename = value,
                "points" => {
                    test.points = value.parse().map_err(|_| {
                        EmperfectError::BadSetting { setting: "points", value }
                    })?;
                }
                "result" => test.result_filename = value,
                "run_main" => test.call_main = parse_bool(&value, "run_main")?,
                "timeout" => {
                    test.timeout = value.parse().map_err(|_| {
                        EmperfectError::BadSetting { setting: "timeout", value }
                    })?;
                }
                // Already locked in through the variable store above.
                "compile" | "cpp" | "error" | "exe" => {}
                _ => return Err(EmperfectError::UnknownArgument(":TestCase", arg)),
            }
        }
        Ok(())
    }

    pub fn count_total_points(&self) -> f64 {
        self.tests.iter().map(|test| test.points).sum()
    }

    pub fn count_earned_points(&self) -> f64 {
        self.tests.iter().map(|test| test.earned_points()).sum()
    }

    pub fn percent_earned(&self) -> i64 {
        let total = self.count_total_points();
        if total == 0.0 {
            return 100;
        }
        (100.0 * self.count_earned_points() / total).round() as i64
    }

    fn summary_text(&self) -> String {
        let mut out = String::new();
        for test in &self.tests {
            out.push_str(&format!("{} : {} : passed {} of {} checks; {} points.\n",
                                  test.id, test.name, test.count_passed(),
                                  test.num_checks(), test.earned_points()));
        }
        out.push_str(&format!("\nFinal Score: {}\n", self.percent_earned()));
        out
    }

    fn summary_html(&self) -> String {
        let mut out = String::new();
        out.push_str("\n<hr>\n<h1>Summary</h1>\n\n");
        out.push_str("<table style=\"background-color:#3fc0FF;\" cellpadding=\"5px\" \
                      border=\"1px solid black\" cellspacing=\"0\">");
        out.push_str("<tr><th>Test Case<th>Status<th>Checks<th>Passed<th>Failed<th>Score</tr>\n");

        for test in &self.tests {
            out.push_str(&format!(
                "<tr><td>{}: {}<td>{}<td>{}<td>{}<td>{}<td>{} / {}</tr>\n",
                test.id, escape_html(&test.name), escape_html(&test.status_string()),
                test.num_checks(), test.count_passed(), test.count_failed(),
                test.earned_points(), test.points));
        }
        out.push_str(&format!(
            "<tr><th>TOTAL<td><td><td><td><td>{} / {}</tr>\n",
            self.count_earned_points(), self.count_total_points()));

        out.push_str(&format!(
            "</table>\n<h2>Final Score: <span style=\"color: blue\">{}%</span></h2>\n<br><br><br>\n\n",
            self.percent_earned()));
        out
    }

    /// Write the end-of-run report into each sink: the full summary where the
    /// detail level allows it, otherwise just the score or percentage.
    fn print_summary(&mut self) -> Result<(), EmperfectError> {
        let earned = self.count_earned_points();
        let total = self.count_total_points();
        let percent = self.percent_earned();
        let text = self.summary_text();
        let html = self.summary_html();

        for output in self.outputs.iter_mut() {
            if output.has_summary() {
                let content = if output.is_html() { &html } else { &text };
                output.file()?.write_all(content.as_bytes())?;
            } else if output.has_score() {
                write!(output.file()?, "{} of {}", earned, total)?;
            } else if output.has_percent() {
                writeln!(output.file()?, "{}%", percent)?;
            }
        }
        Ok(())
    }
}

fn parse_bool(value: &str, setting: &'static str) -> Result<bool, EmperfectError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(EmperfectError::BadSetting { setting, value: value.to_string() }),
    }
}
