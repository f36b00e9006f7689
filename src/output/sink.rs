use std::fs::File;
use std::io::{self, BufWriter, Write};

use crate::emperfect::EmperfectError;

/// How much information a sink receives. The predicates below all derive
/// from this one total order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DetailLevel {
    None,    // No output.
    Percent, // Percentage of points earned overall (e.g., "60%").
    Score,   // Number of points earned overall (e.g., "70 of 100").
    Summary, // Pass/fail status for all (visible and hidden) test cases.
    Student, // Details about failed visible cases; pass/fail for hidden.
    Teacher, // Detailed information about all failed test cases.
    Full,    // Detailed information about all cases, including passed ones.
    Debug,   // Extra configuration details for all cases.
}

impl DetailLevel {
    pub fn from_name(name: &str) -> Result<Self, EmperfectError> {
        match name.to_lowercase().as_str() {
            "none" => Ok(DetailLevel::None),
            "percent" => Ok(DetailLevel::Percent),
            "score" => Ok(DetailLevel::Score),
            "summary" => Ok(DetailLevel::Summary),
            "student" => Ok(DetailLevel::Student),
            "teacher" => Ok(DetailLevel::Teacher),
            "full" => Ok(DetailLevel::Full),
            "debug" => Ok(DetailLevel::Debug),
            _ => Err(EmperfectError::UnknownDetail(name.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Text,
    Html,
}

/// One output target: a file (or stdout), an encoding, and a detail level.
/// The stream opens lazily on first write; a header is emitted once for
/// summary-level sinks and above.
pub struct OutputInfo {
    filename: Option<String>,
    detail: DetailLevel,
    encoding: Option<Encoding>,
    stream: Option<Box<dyn Write>>,
}

impl Default for OutputInfo {
    fn default() -> Self {
        OutputInfo {
            filename: None,
            detail: DetailLevel::Student,
            encoding: None,
            stream: None,
        }
    }
}

impl OutputInfo {
    pub fn is_html(&self) -> bool {
        self.encoding == Some(Encoding::Html)
    }

    pub fn has_percent(&self) -> bool {
        self.detail >= DetailLevel::Percent
    }

    pub fn has_score(&self) -> bool {
        self.detail >= DetailLevel::Score
    }

    pub fn has_summary(&self) -> bool {
        self.detail >= DetailLevel::Summary
    }

    pub fn has_results(&self) -> bool {
        self.detail >= DetailLevel::Student
    }

    pub fn has_failed_details(&self) -> bool {
        self.detail >= DetailLevel::Student
    }

    pub fn has_hidden_details(&self) -> bool {
        self.detail >= DetailLevel::Teacher
    }

    pub fn has_passed_details(&self) -> bool {
        self.detail >= DetailLevel::Full
    }

    pub fn has_debug(&self) -> bool {
        self.detail >= DetailLevel::Debug
    }

    pub fn set_detail(&mut self, level: &str) -> Result<(), EmperfectError> {
        self.detail = DetailLevel::from_name(level)?;
        Ok(())
    }

    /// The filename is locked once the stream has been opened.
    pub fn set_filename(&mut self, name: &str) -> Result<(), EmperfectError> {
        if self.stream.is_some() {
            return Err(EmperfectError::FilenameLocked(name.to_string()));
        }
        self.filename = Some(name.to_string());

        // Without an explicit type, derive one from the file extension.
        if self.encoding.is_none() {
            if let Some(dot) = name.rfind('.') {
                self.set_type(&name[dot + 1..]);
            }
        }
        Ok(())
    }

    pub fn set_type(&mut self, name: &str) {
        match name.to_lowercase().as_str() {
            "html" | "htm" => self.encoding = Some(Encoding::Html),
            "txt" | "text" => self.encoding = Some(Encoding::Text),
            other => {
                eprintln!("Warning: unknown output type '{}'; using text.", other);
                self.encoding = Some(Encoding::Text);
            }
        }
    }

    /// The sink's stream, opened on first use (writing the header if this
    /// sink carries at least a summary).
    pub fn file(&mut self) -> Result<&mut dyn Write, EmperfectError> {
        if self.stream.is_none() {
            if self.encoding.is_none() {
                self.encoding = Some(Encoding::Text);
            }
            let mut stream: Box<dyn Write> = match &self.filename {
                Some(name) => Box::new(BufWriter::new(File::create(name)
                    .map_err(|err| EmperfectError::FileError(name.clone(), err))?)),
                None => Box::new(io::stdout()),
            };

            let header = match self.detail {
                DetailLevel::Summary => "Autograde Summary",
                DetailLevel::Student => "Autograde Results",
                DetailLevel::Teacher => "Autograde Results (Instructor Eyes Only)",
                DetailLevel::Full => "Autograde Results (All details)",
                DetailLevel::Debug => "Autograde Results (DEBUG mode)",
                _ => "",
            };
            if !header.is_empty() {
                if self.is_html() {
                    write!(stream, "<h1>{}</h1>\n\n", header)?;
                } else {
                    write!(stream, "{}\n\n", header)?;
                }
            }
            self.stream = Some(stream);
        }
        Ok(self.stream.as_mut().unwrap().as_mut())
    }

    pub fn flush(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            let _ = stream.flush();
        }
    }
}
