/// Comment marker stripped from recipes before parsing. Overridable at build
/// time through the EMPERFECT_COMMENT environment variable.
pub const COMMENT_MARKER: &str = match option_env!("EMPERFECT_COMMENT") {
    Some(marker) => marker,
    None => "///",
};

/// A recipe loaded into memory, with a cursor for sequential reads.
///
/// Comments are deleted at load time; all other whitespace is preserved since
/// it may end up inside generated source code.
#[derive(Debug, Default)]
pub struct RecipeScan {
    lines: Vec<String>,
    cursor: usize,
}

impl RecipeScan {
    pub fn from_string(content: &str) -> Self {
        let lines = content
            .lines()
            .map(|line| match line.find(COMMENT_MARKER) {
                Some(pos) => line[..pos].to_string(),
                None => line.to_string(),
            })
            .collect();
        RecipeScan { lines, cursor: 0 }
    }

    /// Read one line, advancing the cursor. Returns None at end of input.
    pub fn read(&mut self) -> Option<String> {
        let line = self.lines.get(self.cursor).cloned();
        if line.is_some() {
            self.cursor += 1;
        }
        line
    }

    /// 1-based line number of the most recently read line.
    pub fn line_number(&self) -> usize {
        self.cursor
    }

    /// Read all lines up to (but not including) the next directive line, i.e.
    /// the next line whose first character is ':'. With `remove_blank`,
    /// all-whitespace lines are discarded from the block.
    pub fn read_block(&mut self, remove_blank: bool) -> Vec<String> {
        let mut block = Vec::new();
        while let Some(line) = self.lines.get(self.cursor) {
            if line.starts_with(':') {
                break;
            }
            if !remove_blank || !line.trim().is_empty() {
                block.push(line.clone());
            }
            self.cursor += 1;
        }
        block
    }
}

/// Split a line into its first whitespace-delimited word and the remainder.
pub fn pop_word(line: &str) -> (&str, &str) {
    let line = line.trim_start();
    match line.find(char::is_whitespace) {
        Some(pos) => (&line[..pos], line[pos..].trim_start()),
        None => (line, ""),
    }
}
