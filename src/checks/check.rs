use std::fmt::Write as _;
use std::io::Write as _;

use crate::emperfect::EmperfectError;
use crate::output::escape_html;
use crate::output::sink::OutputInfo;
use crate::recipe::vars::slice_args;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckKind {
    Assert,
    TypeCompare,
}

/// A check expression split into its comparison parts.
#[derive(Debug, Default, Clone)]
pub struct CheckExpr {
    test: String,
    lhs: String,
    comparator: String,
    rhs: String,
}

impl CheckExpr {
    /// Parse a CHECK expression: reject boolean combinators, locate at most
    /// one relational operator, and split around it. Without an operator the
    /// whole expression is the left-hand side (tested for truthiness).
    pub fn parse_check(test: &str, location: &str) -> Result<Self, EmperfectError> {
        let test = test.trim().to_string();
        if test.contains("&&") || test.contains("||") {
            return Err(EmperfectError::BooleanCombinator(location.to_string()));
        }

        let comparators = scan_comparators(&test);
        if comparators.len() > 1 {
            return Err(EmperfectError::DoubleComparison(location.to_string()));
        }

        let mut expr = CheckExpr::default();
        if let Some(&(pos, len)) = comparators.first() {
            expr.lhs = test[..pos].trim().to_string();
            expr.comparator = test[pos..pos + len].to_string();
            expr.rhs = test[pos + len..].trim().to_string();
        } else {
            expr.lhs = test.clone();
        }
        expr.test = test;
        Ok(expr)
    }

    /// Build the synthetic expression used for CHECK_TYPE.
    pub fn type_compare(expression: &str, type_name: &str) -> Self {
        CheckExpr {
            test: format!("TYPE({}) == {}", expression, type_name),
            lhs: expression.to_string(),
            comparator: "TYPE".to_string(),
            rhs: type_name.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.test
    }

    pub fn lhs(&self) -> &str {
        &self.lhs
    }

    pub fn rhs(&self) -> &str {
        &self.rhs
    }

    pub fn comparator(&self) -> &str {
        &self.comparator
    }

    pub fn has_comparator(&self) -> bool {
        !self.comparator.is_empty()
    }
}

/// Find the relational operators at paren depth 0, outside string and char
/// literals. Two-character operators are recognized first; `<<`, `>>` and the
/// `>` of `->` are not comparators.
fn scan_comparators(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut in_string: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(quote) = in_string {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }
        let next = bytes.get(i + 1).copied();
        match c {
            b'"' | b'\'' => in_string = Some(c),
            b'(' | b'{' => depth += 1,
            b')' | b'}' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            b'=' | b'!' if next == Some(b'=') => {
                found.push((i, 2));
                i += 2;
                continue;
            }
            b'<' | b'>' if next == Some(b'=') => {
                found.push((i, 2));
                i += 2;
                continue;
            }
            b'<' if next == Some(b'<') => {
                i += 2;
                continue;
            }
            b'>' if next == Some(b'>') => {
                i += 2;
                continue;
            }
            b'>' if i > 0 && bytes[i - 1] == b'-' => {}
            b'<' | b'>' => found.push((i, 1)),
            _ => {}
        }
        i += 1;
    }
    found
}

/// One CHECK or CHECK_TYPE occurrence within a test body. A check may execute
/// many times in one run; the result vectors are parallel per execution.
#[derive(Debug, Clone)]
pub struct CheckInfo {
    pub expr: CheckExpr,
    pub location: String,
    pub id: usize,
    pub kind: CheckKind,
    pub error_msgs: Vec<String>,

    pub passed: Vec<bool>,
    pub lhs_value: Vec<String>,
    pub rhs_value: Vec<String>,
    pub error_out: Vec<String>,
}

impl CheckInfo {
    pub fn new(kind: CheckKind, body: &str, location: String, id: usize)
        -> Result<Self, EmperfectError>
    {
        let mut args: Vec<String> = slice_args(body)
            .into_iter()
            .map(|arg| arg.trim().to_string())
            .collect();
        // slice_args yields one empty part for an empty body.
        if args.len() == 1 && args[0].is_empty() {
            args.clear();
        }

        let expr = match kind {
            CheckKind::Assert => {
                if args.is_empty() || args[0].is_empty() {
                    return Err(EmperfectError::EmptyCheck(location));
                }
                CheckExpr::parse_check(&args.remove(0), &location)?
            }
            CheckKind::TypeCompare => {
                if args.len() < 2 {
                    return Err(EmperfectError::CheckTypeArgs(location));
                }
                let expression = args.remove(0);
                let type_name = args.remove(0);
                CheckExpr::type_compare(&expression, &type_name)
            }
        };

        Ok(CheckInfo {
            expr,
            location,
            id,
            kind,
            error_msgs: args,
            passed: Vec::new(),
            lhs_value: Vec::new(),
            rhs_value: Vec::new(),
            error_out: Vec::new(),
        })
    }

    /// A check passed if it executed at least once and never failed.
    pub fn passed(&self) -> bool {
        !self.passed.is_empty() && self.passed.iter().all(|success| *success)
    }

    /// Emit the instrumented replacement block for this check.
    pub fn to_cpp(&self) -> String {
        let mut out = String::new();
        match self.kind {
            CheckKind::Assert => self.to_cpp_check(&mut out),
            CheckKind::TypeCompare => self.to_cpp_check_type(&mut out),
        }

        out.push_str("    std::string _emperfect_msg = \"Success!\";\n");
        out.push_str("    if (!_emperfect_success) {\n");
        out.push_str("      _emperfect_error_count++;\n");
        out.push_str("      std::stringstream ss;\n");
        out.push_str("      ss << \"[ERROR] \";\n");
        for msg in &self.error_msgs {
            writeln!(out, "      ss << {};", msg).unwrap();
        }
        out.push_str("      _emperfect_msg = ss.str();\n");
        out.push_str("    }\n");
        writeln!(out, "    _emperfect_results << \":CHECK: {}\\n\"", self.id).unwrap();
        writeln!(out, "                       << \":TEST: \" << {} << \"\\n\"",
                 cpp_literal(self.expr.as_str())).unwrap();
        out.push_str("                       << \":RESULT: \" << _emperfect_success << \"\\n\"\n");
        out.push_str("                       << \":LHS: \" << to_literal(_emperfect_lhs) << \"\\n\"\n");
        out.push_str("                       << \":RHS: \" << to_literal(_emperfect_rhs) << \"\\n\"\n");
        out.push_str("                       << \":MSG: \" << _emperfect_msg << \"\\n\\n\";\n");
        out.push_str("    _emperfect_check_id++;\n");
        out.push_str("  }\n");
        out
    }

    fn to_cpp_check(&self, out: &mut String) {
        writeln!(out, "  // CHECK #{}", self.id).unwrap();
        out.push_str("  {\n");
        writeln!(out, "    auto _emperfect_lhs = {};", self.expr.lhs()).unwrap();
        if self.expr.has_comparator() {
            let rhs = self.expr.rhs();
            writeln!(out, "    auto _emperfect_rhs = {};", rhs).unwrap();
            if rhs.parse::<f64>().is_ok() {
                // Compare against the literal itself so integer literals do
                // not force a conversion through the bound auto variable.
                writeln!(out, "    bool _emperfect_success = (_emperfect_lhs {} {});",
                         self.expr.comparator(), rhs).unwrap();
            } else {
                writeln!(out, "    bool _emperfect_success = (_emperfect_lhs {} _emperfect_rhs);",
                         self.expr.comparator()).unwrap();
            }
        } else {
            out.push_str("    auto _emperfect_rhs = \"N/A\";\n");
            out.push_str("    bool _emperfect_success = bool(_emperfect_lhs);\n");
        }
    }

    fn to_cpp_check_type(&self, out: &mut String) {
        writeln!(out, "  // CHECK #{} (CHECK_TYPE)", self.id).unwrap();
        out.push_str("  {\n");
        writeln!(out, "    using _emperfect_type1 = decltype({});", self.expr.lhs()).unwrap();
        writeln!(out, "    using _emperfect_type2 = {};", self.expr.rhs()).unwrap();
        out.push_str("    std::string _emperfect_lhs = _EMP_GetTypeName<_emperfect_type1>();\n");
        writeln!(out, "    std::string _emperfect_rhs = {};", cpp_literal(self.expr.rhs())).unwrap();
        out.push_str("    bool _emperfect_success = std::is_same<_emperfect_type1, _emperfect_type2>();\n");
    }

    /// Render the result of every execution of this check into a sink.
    /// Passed executions only appear at passed-details level.
    pub fn print_results(&self, output: &mut OutputInfo) -> Result<(), EmperfectError> {
        if !output.has_failed_details() {
            return Ok(());
        }
        let html = output.is_html();
        let passed_details = output.has_passed_details();
        let file = output.file()?;

        for call_id in 0..self.passed.len() {
            if self.passed[call_id] && !passed_details {
                continue;
            }

            let (color, message) = if self.passed[call_id] {
                ("green", "Passed!")
            } else {
                ("red", "Failed.")
            };
            let error_msg = self.error_out.get(call_id).map(String::as_str).unwrap_or("");
            let lhs_value = self.lhs_value.get(call_id).map(String::as_str).unwrap_or("");
            let rhs_value = self.rhs_value.get(call_id).map(String::as_str).unwrap_or("");

            if html {
                write!(file, "\nTest: <b><code>{}</code></b>\n", escape_html(self.expr.as_str()))?;
                write!(file, "<p>Result: <span style=\"color: {}\"><b>{}</b></span><br>\n",
                       color, message)?;
                if !error_msg.is_empty() {
                    write!(file, "Error Message: {}<br>\n", escape_html(error_msg))?;
                }
                if self.expr.has_comparator() {
                    write!(file,
                           "<table><tr><td>Left side:<td><code>{}</code><td>&nbsp;&nbsp;==><td><code>{}</code></tr>\n",
                           escape_html(self.expr.lhs()), escape_html(lhs_value))?;
                    write!(file,
                           "<tr><td>Right side:<td><code>{}</code><td>&nbsp;&nbsp;==><td><code>{}</code></tr></table><br>\n",
                           escape_html(self.expr.rhs()), escape_html(rhs_value))?;
                }
            } else {
                write!(file, "\nTest: {}\n\n", self.expr.as_str())?;
                write!(file, "Result: {}\n", message)?;
                if !error_msg.is_empty() {
                    write!(file, "Error Message: {}\n", error_msg)?;
                }
                if self.expr.has_comparator() {
                    let width = self.expr.lhs().len().max(self.expr.rhs().len());
                    write!(file, "Left side : {:<width$}  ==>  {}\n",
                           self.expr.lhs(), lhs_value, width = width)?;
                    write!(file, "Right side: {:<width$}  ==>  {}\n",
                           self.expr.rhs(), rhs_value, width = width)?;
                }
            }
        }
        Ok(())
    }
}

/// Render a string as a C++ string literal.
pub fn cpp_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_check(body: &str) -> CheckInfo {
        CheckInfo::new(CheckKind::Assert, body, "here".to_string(), 0).unwrap()
    }

    #[test]
    fn splits_on_single_comparison() {
        let check = assert_check("1+1 == 2");
        assert_eq!(check.expr.lhs(), "1+1");
        assert_eq!(check.expr.comparator(), "==");
        assert_eq!(check.expr.rhs(), "2");
    }

    #[test]
    fn two_char_operators_win_over_one_char() {
        let check = assert_check("x <= 10");
        assert_eq!(check.expr.comparator(), "<=");
        assert_eq!(check.expr.rhs(), "10");
    }

    #[test]
    fn no_comparison_means_truthiness() {
        let check = assert_check("is_ready()");
        assert!(!check.expr.has_comparator());
        assert_eq!(check.expr.lhs(), "is_ready()");
    }

    #[test]
    fn boolean_combinators_are_fatal() {
        let err = CheckInfo::new(CheckKind::Assert, "x && y", "loc".to_string(), 0).unwrap_err();
        assert!(matches!(err, EmperfectError::BooleanCombinator(_)));
    }

    #[test]
    fn second_comparison_is_fatal() {
        let err = CheckInfo::new(CheckKind::Assert, "a < b < c", "loc".to_string(), 0).unwrap_err();
        assert!(matches!(err, EmperfectError::DoubleComparison(_)));
    }

    #[test]
    fn empty_check_is_fatal() {
        let err = CheckInfo::new(CheckKind::Assert, "", "loc".to_string(), 0).unwrap_err();
        assert!(matches!(err, EmperfectError::EmptyCheck(_)));
    }

    #[test]
    fn operators_inside_strings_and_groups_are_ignored() {
        let check = assert_check("find(v, \"a < b\") == npos");
        assert_eq!(check.expr.comparator(), "==");
        assert_eq!(check.expr.lhs(), "find(v, \"a < b\")");

        let check = assert_check("sum(a > 0 ? a : b, 2) == 4");
        assert_eq!(check.expr.lhs(), "sum(a > 0 ? a : b, 2)");
    }

    #[test]
    fn member_access_is_not_a_comparison() {
        let check = assert_check("ptr->valid");
        assert!(!check.expr.has_comparator());
    }

    #[test]
    fn stream_shifts_are_not_comparisons() {
        let check = assert_check("flags << 2 == 8");
        assert_eq!(check.expr.comparator(), "==");
        assert_eq!(check.expr.lhs(), "flags << 2");
    }

    #[test]
    fn message_fragments_are_kept_in_order() {
        let check = assert_check("s == \"b\", \"got \", s");
        assert_eq!(check.error_msgs, vec!["\"got \"".to_string(), "s".to_string()]);
    }

    #[test]
    fn check_type_needs_two_args() {
        let err = CheckInfo::new(CheckKind::TypeCompare, "x", "loc".to_string(), 0).unwrap_err();
        assert!(matches!(err, EmperfectError::CheckTypeArgs(_)));

        let check = CheckInfo::new(CheckKind::TypeCompare, "x + y, double", "loc".to_string(), 1).unwrap();
        assert_eq!(check.expr.as_str(), "TYPE(x + y) == double");
        assert_eq!(check.expr.comparator(), "TYPE");
    }

    #[test]
    fn numeric_rhs_is_compared_as_literal() {
        let cpp = assert_check("x == 42").to_cpp();
        assert!(cpp.contains("bool _emperfect_success = (_emperfect_lhs == 42);"));

        let cpp = assert_check("x == y").to_cpp();
        assert!(cpp.contains("bool _emperfect_success = (_emperfect_lhs == _emperfect_rhs);"));
    }

    #[test]
    fn emitted_block_writes_the_protocol() {
        let cpp = assert_check("1+1 == 2").to_cpp();
        assert!(cpp.contains(":CHECK: 0"));
        assert!(cpp.contains("<< \":TEST: \" << \"1+1 == 2\" << \"\\n\""));
        assert!(cpp.contains(":RESULT:"));
        assert!(cpp.contains("_emperfect_check_id++;"));
    }

    #[test]
    fn passed_requires_at_least_one_execution() {
        let mut check = assert_check("1 == 1");
        assert!(!check.passed());
        check.passed.push(true);
        assert!(check.passed());
        check.passed.push(false);
        assert!(!check.passed());
    }

    #[test]
    fn cpp_literal_escapes() {
        assert_eq!(cpp_literal("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
    }
}
