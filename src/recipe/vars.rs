use std::collections::HashMap;

use crate::emperfect::EmperfectError;

/// Split a comma-separated list into its top-level parts. Commas inside
/// double-quoted strings, char literals, or any (){} group are literal.
pub fn slice_args(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            current.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                in_string = Some(c);
                current.push(c);
            }
            '(' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(current.clone());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// The global variable store for one recipe run.
///
/// Keys are stored lowercased; quoted values are unescaped before storage so
/// lookups always yield the literal value.
#[derive(Debug)]
pub struct VarMap {
    map: HashMap<String, String>,
}

impl Default for VarMap {
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert("dir".to_string(), ".emperfect".to_string());
        map.insert("debug".to_string(), "false".to_string());
        map.insert("log".to_string(), "Log.txt".to_string());
        VarMap { map }
    }
}

impl VarMap {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.map.insert(name.to_lowercase(), value.into());
    }

    /// Parse a comma-separated `key=value` argument tail, mutating the store.
    /// Returns just the pairs newly set by this call, in argument order.
    pub fn load(&mut self, args: &str) -> Result<Vec<(String, String)>, EmperfectError> {
        if args.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut new_vars = Vec::new();
        for part in slice_args(args) {
            if part.trim().is_empty() {
                continue;
            }
            let eq = part.find('=')
                .ok_or_else(|| EmperfectError::BadAssignment(part.trim().to_string()))?;
            let key = part[..eq].trim().to_lowercase();
            let raw_value = part[eq + 1..].trim();
            let value = if raw_value.starts_with('"') {
                unescape_literal(raw_value)
                    .ok_or_else(|| EmperfectError::BadAssignment(part.trim().to_string()))?
            } else {
                raw_value.to_string()
            };
            self.map.insert(key.clone(), value.clone());
            new_vars.push((key, value));
        }
        Ok(new_vars)
    }

    /// Expand every `${name}` in the line. Names are lowercased before
    /// lookup; an unterminated reference or unknown name is fatal.
    pub fn apply(&self, line: &str) -> Result<String, EmperfectError> {
        let mut out = String::with_capacity(line.len());
        let mut rest = line;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}')
                .ok_or_else(|| EmperfectError::UnterminatedVariable(line.to_string()))?;
            let name = after[..end].to_lowercase();
            let value = self.map.get(&name)
                .ok_or_else(|| EmperfectError::UnknownVariable(name.clone(), line.to_string()))?;
            out.push_str(value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Unescape a double-quoted literal. Returns None if the closing quote is
/// missing or followed by anything but whitespace.
fn unescape_literal(raw: &str) -> Option<String> {
    let mut out = String::new();
    let mut chars = raw[1..].chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if chars.as_str().trim().is_empty() {
                    return Some(out);
                }
                return None;
            }
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                other => out.push(other),
            },
            other => out.push(other),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_values_keep_commas() {
        let mut vars = VarMap::default();
        vars.load("k=\"v, w\"").unwrap();
        assert_eq!(vars.apply("${k}").unwrap(), "v, w");
    }

    #[test]
    fn load_returns_only_new_pairs_in_order() {
        let mut vars = VarMap::default();
        let new_vars = vars.load("name=\"Test A\", points=10").unwrap();
        assert_eq!(new_vars, vec![
            ("name".to_string(), "Test A".to_string()),
            ("points".to_string(), "10".to_string()),
        ]);
        assert_eq!(vars.get("points"), Some("10"));
    }

    #[test]
    fn interpolation_lowercases_names() {
        let mut vars = VarMap::default();
        vars.set("exe", "a.out");
        assert_eq!(vars.apply("run ${EXE} now").unwrap(), "run a.out now");
    }

    #[test]
    fn unknown_variable_is_fatal() {
        let vars = VarMap::default();
        assert!(matches!(vars.apply("${nope}"), Err(EmperfectError::UnknownVariable(..))));
    }

    #[test]
    fn unterminated_variable_is_fatal() {
        let vars = VarMap::default();
        assert!(matches!(vars.apply("${dir"), Err(EmperfectError::UnterminatedVariable(_))));
    }

    #[test]
    fn escapes_are_unquoted_at_parse_time() {
        let mut vars = VarMap::default();
        vars.load("msg=\"line1\\nline2\"").unwrap();
        assert_eq!(vars.get("msg"), Some("line1\nline2"));
    }

    #[test]
    fn slicing_honors_quotes_and_groups() {
        assert_eq!(slice_args("f(a, b), \"x, y\", z"),
                   vec!["f(a, b)".to_string(), " \"x, y\"".to_string(), " z".to_string()]);
    }
}
