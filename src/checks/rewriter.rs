use crate::emperfect::EmperfectError;
use super::check::{CheckInfo, CheckKind};

/// Rewrite every CHECK / CHECK_TYPE macro in an interpolated test body into
/// its instrumented replacement block, appending one CheckInfo per occurrence
/// (ids are contiguous, in source order, shared across both macros).
/// Non-macro text is preserved byte-for-byte.
pub fn process_checks(code: &str, test_id: usize, checks: &mut Vec<CheckInfo>)
    -> Result<String, EmperfectError>
{
    let mut out = String::with_capacity(code.len());
    let mut copied = 0;
    let mut search = 0;

    while let Some(found) = code[search..].find("CHECK") {
        let name_start = search + found;
        let after_name = name_start + "CHECK".len();

        // Macro names only match at an identifier boundary.
        let bounded = name_start == 0
            || !code[..name_start].chars().rev().next()
                .map(|c| c.is_alphanumeric() || c == '_')
                .unwrap_or(false);
        if !bounded {
            search = after_name;
            continue;
        }

        let (kind, open) = if code[after_name..].starts_with('(') {
            (CheckKind::Assert, after_name)
        } else if code[after_name..].starts_with("_TYPE(") {
            (CheckKind::TypeCompare, after_name + "_TYPE".len())
        } else {
            search = after_name;
            continue;
        };

        let id = checks.len();
        let line = code[..name_start].matches('\n').count() + 1;
        let location = format!("Testcase #{}, line {} (check {})", test_id, line, id);

        let close = matching_paren(code, open)
            .ok_or_else(|| EmperfectError::UnbalancedCheck(location.clone()))?;
        let body = &code[open + 1..close];

        let info = CheckInfo::new(kind, body, location, id)?;
        out.push_str(&code[copied..name_start]);
        out.push_str(&info.to_cpp());
        checks.push(info);

        copied = close + 1;
        search = close + 1;
    }
    out.push_str(&code[copied..]);
    Ok(out)
}

/// Index of the ')' matching the '(' at `open`, honoring nested parens and
/// string/char literals. None if the parens never balance.
fn matching_paren(code: &str, open: usize) -> Option<usize> {
    let bytes = code.as_bytes();
    let mut depth = 1usize;
    let mut in_string: Option<u8> = None;
    let mut i = open + 1;
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
        } else {
            match c {
                b'"' | b'\'' => in_string = Some(c),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}
