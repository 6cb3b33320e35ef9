//! Reading and writing export files.
//!
//! Every write goes to a sibling temp file that is then renamed over the
//! destination, so a failed write leaves the previous file untouched.

use std::fs;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use chatmirror_core::{FormatOptions, MemberDirectory, Message, MirrorError, MirrorResult};

use crate::document::ExportDocument;
use crate::header::{ExportHeader, HEADER_TERMINATOR};

/// Read only the header region of an export.
///
/// `Ok(None)` means the file does not exist (first run). A file without a
/// recognizable header is an error, so unrelated files are never clobbered.
pub fn read_header(path: &Path) -> MirrorResult<Option<ExportHeader>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(read_error(path, e)),
    };

    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| read_error(path, e))?;
        let done = line.trim() == HEADER_TERMINATOR;
        lines.push(line);
        if done {
            break;
        }
    }

    ExportHeader::parse(lines.iter().map(|l| l.as_str()))
        .map(Some)
        .ok_or_else(|| MirrorError::MissingHeader {
            path: path.to_path_buf(),
        })
}

/// Read and parse a whole export document.
pub fn read_document(path: &Path) -> MirrorResult<ExportDocument> {
    let text = fs::read_to_string(path).map_err(|e| read_error(path, e))?;
    ExportDocument::parse(&text).ok_or_else(|| MirrorError::MissingHeader {
        path: path.to_path_buf(),
    })
}

/// Append new messages to an existing export.
///
/// Returns the number of messages appended. With no messages nothing is
/// read or written and the file keeps its bytes and timestamp.
pub fn append(
    path: &Path,
    messages: &[Message],
    directory: &MemberDirectory,
    options: &FormatOptions,
    synced_at: DateTime<Utc>,
) -> MirrorResult<usize> {
    if messages.is_empty() {
        debug!("No new messages for {}; leaving it untouched", path.display());
        return Ok(0);
    }

    // The caller saw this file when it read the header; if it is gone now
    // the write cannot proceed.
    let text = fs::read_to_string(path).map_err(|e| write_error(path, e))?;
    let mut document = ExportDocument::parse(&text).ok_or_else(|| MirrorError::MissingHeader {
        path: path.to_path_buf(),
    })?;

    let previous = document.header.total_message_count;
    document.append_messages(messages, directory, options, synced_at);
    write_atomic(path, &document.to_text())?;

    info!(
        "Appended {} messages to {} ({} -> {} total)",
        messages.len(),
        path.display(),
        previous,
        document.header.total_message_count
    );
    Ok(messages.len())
}

/// Write a new export. Fails if the destination already exists.
pub fn write_new(path: &Path, document: &ExportDocument) -> MirrorResult<()> {
    if path.exists() {
        return Err(write_error(
            path,
            std::io::Error::new(ErrorKind::AlreadyExists, "export already exists"),
        ));
    }
    write_document(path, document)
}

/// Replace an export with a freshly assembled document (full refresh).
pub fn overwrite(path: &Path, document: &ExportDocument) -> MirrorResult<()> {
    write_document(path, document)
}

fn write_document(path: &Path, document: &ExportDocument) -> MirrorResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| write_error(path, e))?;
    }
    write_atomic(path, &document.to_text())?;
    info!(
        "Wrote {} ({} messages)",
        path.display(),
        document.header.total_message_count
    );
    Ok(())
}

fn write_atomic(path: &Path, contents: &str) -> MirrorResult<()> {
    let tmp = temp_path(path);
    if let Err(e) = fs::write(&tmp, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(write_error(path, e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(write_error(path, e));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

fn read_error(path: &Path, source: std::io::Error) -> MirrorError {
    MirrorError::ExportRead {
        path: path.to_path_buf(),
        source,
    }
}

fn write_error(path: &Path, source: std::io::Error) -> MirrorError {
    MirrorError::ExportWrite {
        path: path.to_path_buf(),
        source,
    }
}
