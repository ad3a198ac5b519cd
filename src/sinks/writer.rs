//! Formatted line writers: files, standard output, or any `Write`.

use super::Sink;
use crate::error::MeduceError;
use anyhow::{Context, Result};
use std::fmt::Display;
use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Stdout, Write};
use std::path::Path;
use std::sync::{Condvar, Mutex};

/// Turns a pair into one output line (without the trailing newline).
pub type Formatter<K, V> = Box<dyn Fn(&K, &V) -> String + Send>;

/// Writes one line per delivered pair, `"key: value"` unless a custom
/// [`Formatter`] is set.
pub struct WriterSink<W, K, V> {
    out: W,
    label: String,
    format: Formatter<K, V>,
    lines: u64,
}

pub type FileSink<K, V> = WriterSink<BufWriter<File>, K, V>;

impl<W: Write, K, V> WriterSink<W, K, V> {
    /// `label` names the destination in error messages.
    pub fn new(out: W, label: impl Into<String>) -> Self
    where
        K: Display + 'static,
        V: Display + 'static,
    {
        Self {
            out,
            label: label.into(),
            format: Box::new(|k: &K, v: &V| format!("{k}: {v}")),
            lines: 0,
        }
    }

    #[must_use]
    pub fn with_formatter<F>(mut self, format: F) -> Self
    where
        F: Fn(&K, &V) -> String + Send + 'static,
    {
        self.format = Box::new(format);
        self
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, key: &K, value: &V) -> Result<()> {
        let mut line = (self.format)(key, value);
        line.push('\n');
        self.out
            .write_all(line.as_bytes())
            .context(MeduceError::resource(format!("write to {}", self.label)))?;
        self.lines += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out
            .flush()
            .context(MeduceError::resource(format!("flush {}", self.label)))
    }
}

impl<W, K, V> Sink<K, V> for WriterSink<W, K, V>
where
    W: Write + Send,
    K: Send,
    V: Send,
{
    fn collect(&mut self, key: K, value: V) -> Result<()> {
        self.write_line(&key, &value)
    }

    fn finalize(&mut self) -> Result<()> {
        self.flush()
    }
}

/// Create (or truncate) `path` and write one line per pair into it.
/// Parent directories are created as needed.
pub fn to_file<K, V>(path: impl AsRef<Path>) -> Result<FileSink<K, V>>
where
    K: Display + 'static,
    V: Display + 'static,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent)
            .context(MeduceError::resource(format!("mkdir -p {}", parent.display())))?;
    }
    let f = File::create(path)
        .context(MeduceError::resource(format!("create {}", path.display())))?;
    Ok(WriterSink::new(BufWriter::new(f), path.display().to_string()))
}

/// Gate shared by every [`StdoutSink`] in the process. A sink holds it from
/// `init` to `finalize`, so the output of two runs never interleaves.
struct ConsoleGate {
    busy: Mutex<bool>,
    freed: Condvar,
}

static CONSOLE: ConsoleGate = ConsoleGate {
    busy: Mutex::new(false),
    freed: Condvar::new(),
};

impl ConsoleGate {
    fn acquire(&self) {
        let mut busy = self.busy.lock().unwrap();
        while *busy {
            busy = self.freed.wait(busy).unwrap();
        }
        *busy = true;
    }

    fn release(&self) {
        *self.busy.lock().unwrap() = false;
        self.freed.notify_one();
    }
}

/// Writes formatted lines to standard output.
pub struct StdoutSink<K, V> {
    inner: WriterSink<Stdout, K, V>,
    holding_console: bool,
}

pub fn to_stdout<K: Display + 'static, V: Display + 'static>() -> StdoutSink<K, V> {
    StdoutSink {
        inner: WriterSink::new(std::io::stdout(), "stdout"),
        holding_console: false,
    }
}

impl<K, V> StdoutSink<K, V> {
    #[must_use]
    pub fn with_formatter<F>(mut self, format: F) -> Self
    where
        F: Fn(&K, &V) -> String + Send + 'static,
    {
        self.inner.format = Box::new(format);
        self
    }

    pub fn lines_written(&self) -> u64 {
        self.inner.lines_written()
    }

    fn release_console(&mut self) {
        if self.holding_console {
            self.holding_console = false;
            CONSOLE.release();
        }
    }
}

impl<K: Send, V: Send> Sink<K, V> for StdoutSink<K, V> {
    fn init(&mut self) -> Result<()> {
        if !self.holding_console {
            CONSOLE.acquire();
            self.holding_console = true;
        }
        Ok(())
    }

    fn collect(&mut self, key: K, value: V) -> Result<()> {
        self.inner.collect(key, value)
    }

    fn finalize(&mut self) -> Result<()> {
        let flushed = self.inner.finalize();
        self.release_console();
        flushed
    }
}

impl<K, V> Drop for StdoutSink<K, V> {
    fn drop(&mut self) {
        self.release_console();
    }
}
