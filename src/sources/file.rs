//! Line-oriented file source.

use super::Producer;
use crate::cancel::CancelToken;
use crate::error::MeduceError;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Reads a text file line by line: key = zero-based line index, value = the
/// line without its terminator.
pub struct FileSource {
    path: PathBuf,
    state: Mutex<LineCursor>,
}

struct LineCursor {
    next_index: usize,
    lines: Lines<BufReader<File>>,
}

/// Open `path` for reading. Fails right away if the file cannot be opened.
pub fn from_file(path: impl AsRef<Path>) -> Result<FileSource> {
    let path = path.as_ref();
    let f = File::open(path)
        .context(MeduceError::resource(format!("open {}", path.display())))?;
    Ok(FileSource {
        path: path.to_path_buf(),
        state: Mutex::new(LineCursor {
            next_index: 0,
            lines: BufReader::new(f).lines(),
        }),
    })
}

impl FileSource {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Producer<usize, String> for FileSource {
    fn recv(&self, cancel: &CancelToken) -> Result<Option<(usize, String)>> {
        if cancel.is_cancelled() {
            return Err(MeduceError::Cancelled.into());
        }
        let mut cursor = self.state.lock().unwrap();
        let index = cursor.next_index;
        match cursor.lines.next() {
            None => Ok(None),
            Some(line) => {
                let line = line.context(MeduceError::resource(format!(
                    "read line {} of {}",
                    index + 1,
                    self.path.display()
                )))?;
                cursor.next_index += 1;
                Ok(Some((index, line)))
            }
        }
    }
}
