//! Corpus readers yielding paragraphs lazily.
//!
//! A corpus is any iterator of `Result<Paragraph, MlmError>`; an `Err` item
//! marks one unreadable entry and does not end the iteration.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::vec;

use crate::errors::MlmError;
use crate::transport::fs::FileStream;
use crate::types::Paragraph;
use crate::utils::paragraphs;

/// JSON-lines corpus: every non-blank line is one JSON string holding a
/// paragraph whose units are separated by `\n`.
pub struct JsonLinesCorpus {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl JsonLinesCorpus {
    /// Open a JSON Lines corpus file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MlmError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }

    fn location(&self) -> String {
        format!("{}:{}", self.path.display(), self.line_no)
    }
}

impl Iterator for JsonLinesCorpus {
    type Item = Result<Paragraph, MlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    return Some(Err(MlmError::Corpus {
                        location: self.location(),
                        reason: err.to_string(),
                    }));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(
                parse_json_paragraph(&line).map_err(|reason| MlmError::Corpus {
                    location: self.location(),
                    reason,
                }),
            );
        }
    }
}

/// Parse one JSON string literal and split it into units on `\n`.
pub fn parse_json_paragraph(line: &str) -> Result<Paragraph, String> {
    let text: String = serde_json::from_str(line).map_err(|err| err.to_string())?;
    Ok(text
        .split('\n')
        .map(|unit| unit.trim_end_matches('\r'))
        .filter(|unit| !unit.trim().is_empty())
        .map(str::to_string)
        .collect())
}

/// Directory of `.txt` files: each blank-line separated block is one
/// paragraph and each sentence one unit.
///
/// Files are visited in path order and read one at a time.
pub struct TextDirCorpus {
    files: vec::IntoIter<PathBuf>,
    current: vec::IntoIter<Paragraph>,
}

impl TextDirCorpus {
    /// Walk `root` for text files, sorted by path.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, MlmError> {
        Self::from_stream(&FileStream::new(root))
    }

    /// Use a preconfigured [`FileStream`] (symlinks, extension filter).
    pub fn from_stream(stream: &FileStream) -> Result<Self, MlmError> {
        Ok(Self {
            files: stream.list_files()?.into_iter(),
            current: Vec::new().into_iter(),
        })
    }
}

impl Iterator for TextDirCorpus {
    type Item = Result<Paragraph, MlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(paragraph) = self.current.next() {
                return Some(Ok(paragraph));
            }
            let path = self.files.next()?;
            match std::fs::read_to_string(&path) {
                Ok(text) => self.current = paragraphs(&text).into_iter(),
                Err(err) => {
                    return Some(Err(MlmError::Corpus {
                        location: path.display().to_string(),
                        reason: err.to_string(),
                    }));
                }
            }
        }
    }
}
