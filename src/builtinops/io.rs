//! File handles and console input.
//!
//! A handle is opened for reading or for writing, never both. Closing is
//! explicit and final: every operation on a closed handle raises
//! `changing-closed-handle`, including closing it again.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::rc::Rc;

use super::{fixed_args, string_arg};
use crate::Error;
use crate::ast::Value;
use crate::exception::{CHANGING_CLOSED_HANDLE, FILE_NOT_FOUND};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
}

enum Stream {
    Reader(BufReader<File>),
    Writer(BufWriter<File>),
    Closed,
}

/// An open (or closed) file
pub struct FileHandle {
    path: String,
    mode: FileMode,
    stream: Stream,
}

fn io_error(path: &str, err: &io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::raise(&FILE_NOT_FOUND, format!("No such file: {path}"))
    } else {
        Error::value_error(format!("{path}: {err}"))
    }
}

impl FileHandle {
    /// Open `path`. Writing creates or truncates the file.
    pub fn open(path: &str, mode: FileMode) -> Result<Self, Error> {
        let stream = match mode {
            FileMode::Read => {
                Stream::Reader(BufReader::new(File::open(path).map_err(|err| io_error(path, &err))?))
            }
            FileMode::Write => Stream::Writer(BufWriter::new(
                File::create(path).map_err(|err| io_error(path, &err))?,
            )),
        };
        Ok(FileHandle {
            path: path.to_owned(),
            mode,
            stream,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.stream, Stream::Closed)
    }

    fn closed_error(&self) -> Error {
        Error::raise(
            &CHANGING_CLOSED_HANDLE,
            format!("File handle for {} is already closed", self.path),
        )
    }

    /// Everything not yet read
    pub fn read_to_end(&mut self) -> Result<Vec<u8>, Error> {
        match &mut self.stream {
            Stream::Reader(reader) => {
                let mut bytes = Vec::new();
                reader
                    .read_to_end(&mut bytes)
                    .map_err(|err| io_error(&self.path, &err))?;
                Ok(bytes)
            }
            Stream::Writer(_) => Err(Error::value_error(format!(
                "File handle for {} was opened for writing",
                self.path
            ))),
            Stream::Closed => Err(self.closed_error()),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        match &mut self.stream {
            Stream::Writer(writer) => writer
                .write_all(bytes)
                .map_err(|err| io_error(&self.path, &err)),
            Stream::Reader(_) => Err(Error::value_error(format!(
                "File handle for {} was opened for reading",
                self.path
            ))),
            Stream::Closed => Err(self.closed_error()),
        }
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        match &mut self.stream {
            Stream::Writer(writer) => writer.flush().map_err(|err| io_error(&self.path, &err)),
            Stream::Reader(_) => Ok(()),
            Stream::Closed => Err(self.closed_error()),
        }
    }

    /// Flush pending writes and release the file. The handle is closed
    /// afterwards even if the flush fails.
    pub fn close(&mut self) -> Result<(), Error> {
        match std::mem::replace(&mut self.stream, Stream::Closed) {
            Stream::Writer(mut writer) => writer.flush().map_err(|err| io_error(&self.path, &err)),
            Stream::Reader(_) => Ok(()),
            Stream::Closed => Err(self.closed_error()),
        }
    }
}

fn handle_arg<'a>(name: &str, value: &'a Value) -> Result<&'a Rc<RefCell<FileHandle>>, Error> {
    match value {
        Value::FileHandle(handle) => Ok(handle),
        other => Err(Error::wrong_type(format!(
            "{name} requires a file handle, but got: {other}"
        ))),
    }
}

pub(super) fn builtin_open(args: &[Value]) -> Result<Value, Error> {
    let [path, mode] = fixed_args("open", args)?;
    let path = string_arg("open", path)?;
    let mode = match mode {
        Value::Keyword(keyword) if keyword == "read" => FileMode::Read,
        Value::Keyword(keyword) if keyword == "write" => FileMode::Write,
        Value::Keyword(_) => {
            return Err(Error::value_error(format!(
                "open: mode must be :read or :write, but got: {mode}"
            )));
        }
        other => {
            return Err(Error::wrong_type(format!(
                "open requires a mode keyword, but got: {other}"
            )));
        }
    };
    let handle = FileHandle::open(&path, mode)?;
    tracing::debug!(path = %path, ?mode, "opened file");
    Ok(Value::FileHandle(Rc::new(RefCell::new(handle))))
}

pub(super) fn builtin_close(args: &[Value]) -> Result<Value, Error> {
    let [handle] = fixed_args("close!", args)?;
    handle_arg("close!", handle)?.borrow_mut().close()?;
    Ok(Value::Null)
}

pub(super) fn builtin_read(args: &[Value]) -> Result<Value, Error> {
    let [handle] = fixed_args("read", args)?;
    let bytes = handle_arg("read", handle)?.borrow_mut().read_to_end()?;
    Ok(Value::bytestring(bytes))
}

pub(super) fn builtin_write(args: &[Value]) -> Result<Value, Error> {
    let [handle, bytes] = fixed_args("write!", args)?;
    let handle = handle_arg("write!", handle)?;
    let Value::Bytestring(bytes) = bytes else {
        return Err(Error::wrong_type(format!(
            "write! requires a bytestring, but got: {bytes}"
        )));
    };
    handle.borrow_mut().write(&bytes.borrow())?;
    Ok(Value::Null)
}

pub(super) fn builtin_flush(args: &[Value]) -> Result<Value, Error> {
    let [handle] = fixed_args("flush!", args)?;
    handle_arg("flush!", handle)?.borrow_mut().flush()?;
    Ok(Value::Null)
}

/// Print the prompt, then read one line from standard input without its line
/// ending. End of input reads as the empty string.
pub(super) fn builtin_input(args: &[Value]) -> Result<Value, Error> {
    let [prompt] = fixed_args("input", args)?;
    let prompt = string_arg("input", prompt)?;

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(prompt.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|err| io_error("<stdout>", &err))?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|err| io_error("<stdin>", &err))?;
    let line = line.strip_suffix('\n').unwrap_or(&line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    Ok(Value::string(line))
}
