//! File-system handlers.

use super::HandlerResult;
use crate::normalize::{json_string_array, JsonEscaping};
use appshell_core::{Access, ErrorCode};
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, trace};

/// The only text encoding the handlers accept.
pub const UTF8: &str = "utf8";

fn read_error(err: io::Error) -> ErrorCode {
    ErrorCode::from_io_error(&err, Access::Read)
}

fn write_error(err: io::Error) -> ErrorCode {
    ErrorCode::from_io_error(&err, Access::Write)
}

fn check_encoding(encoding: &str) -> HandlerResult<()> {
    if encoding == UTF8 {
        Ok(())
    } else {
        debug!(encoding, "Unsupported encoding");
        Err(ErrorCode::UnsupportedEncoding)
    }
}

/// List a directory as a JSON array: directories first, then everything
/// else, each group in enumeration order.
pub fn read_directory(path: &Path, escaping: JsonEscaping) -> HandlerResult<String> {
    let entries = fs::read_dir(path).map_err(read_error)?;

    let mut directories = Vec::new();
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(read_error)?;
        let name = entry.file_name().to_string_lossy().into_owned();

        // Follow symlinks
        let is_dir = fs::metadata(entry.path())
            .map(|meta| meta.is_dir())
            .unwrap_or(false);

        if is_dir {
            directories.push(name);
        } else {
            files.push(name);
        }
    }

    trace!(
        path = %path.display(),
        directories = directories.len(),
        files = files.len(),
        "Read directory"
    );

    directories.extend(files);
    Ok(json_string_array(&directories, escaping))
}

pub fn is_directory(path: &Path) -> HandlerResult<bool> {
    fs::metadata(path)
        .map(|meta| meta.is_dir())
        .map_err(read_error)
}

/// Read a whole file as UTF-8.
pub fn read_file(path: &Path, encoding: &str) -> HandlerResult<String> {
    check_encoding(encoding)?;

    let meta = fs::metadata(path).map_err(read_error)?;
    if meta.is_dir() {
        return Err(ErrorCode::CantRead);
    }

    let bytes = fs::read(path).map_err(read_error)?;
    String::from_utf8(bytes).map_err(|_| ErrorCode::UnsupportedEncoding)
}

/// Create or replace a file with `data`.
pub fn write_file(path: &Path, data: &str, encoding: &str) -> HandlerResult<()> {
    check_encoding(encoding)?;
    fs::write(path, data).map_err(write_error)
}

/// Apply POSIX-style permission bits to a file. Directories are left
/// untouched.
pub fn set_permissions(path: &Path, mode: i32) -> HandlerResult<()> {
    let meta = fs::metadata(path).map_err(read_error)?;
    if meta.is_dir() {
        return Ok(());
    }

    apply_mode(path, meta, mode).map_err(write_error)
}

#[cfg(unix)]
fn apply_mode(path: &Path, _meta: fs::Metadata, mode: i32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode as u32 & 0o7777))
}

/// Only the owner write bit has a native equivalent (the read-only
/// attribute).
#[cfg(not(unix))]
fn apply_mode(path: &Path, meta: fs::Metadata, mode: i32) -> io::Result<()> {
    let mut permissions = meta.permissions();
    permissions.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, permissions)
}

pub fn modification_time(path: &Path) -> HandlerResult<SystemTime> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(read_error)
}

/// Remove a file or an empty directory.
pub fn delete(path: &Path) -> HandlerResult<()> {
    let meta = fs::symlink_metadata(path).map_err(read_error)?;
    let result = if meta.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(write_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let data = "héllo wörld ✓\n\ttabs \u{01} and \"quotes\"\r\n";

        write_file(&path, data, UTF8).unwrap();
        assert_eq!(read_file(&path, UTF8).unwrap(), data);
    }

    #[test]
    fn test_unsupported_encoding_does_no_io() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("never.txt");

        assert_eq!(
            write_file(&path, "data", "latin1"),
            Err(ErrorCode::UnsupportedEncoding)
        );
        assert!(!path.exists());

        // Missing file still reports the encoding first
        assert_eq!(read_file(&path, "latin1"), Err(ErrorCode::UnsupportedEncoding));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        assert_eq!(
            read_file(&dir.path().join("missing.txt"), UTF8),
            Err(ErrorCode::NotFound)
        );
    }

    #[test]
    fn test_read_directory_as_file_is_cant_read() {
        let dir = tempdir().unwrap();
        assert_eq!(read_file(dir.path(), UTF8), Err(ErrorCode::CantRead));
    }

    #[test]
    fn test_read_invalid_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("binary.bin");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x80]).unwrap();

        assert_eq!(read_file(&path, UTF8), Err(ErrorCode::UnsupportedEncoding));
    }

    #[test]
    fn test_write_into_missing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope").join("file.txt");
        assert_eq!(write_file(&path, "x", UTF8), Err(ErrorCode::NotFound));
    }

    #[test]
    fn test_read_directory_lists_directories_first() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();

        let json = read_directory(dir.path(), JsonEscaping::Standard).unwrap();
        assert_eq!(json, r#"["a","b.txt"]"#);
    }

    #[test]
    fn test_read_directory_groups_by_kind() {
        let dir = tempdir().unwrap();
        for name in ["one.txt", "two.txt", "three.txt"] {
            fs::write(dir.path().join(name), name).unwrap();
        }
        for name in ["x", "y"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }

        let json = read_directory(dir.path(), JsonEscaping::Standard).unwrap();
        let names: Vec<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(names.len(), 5);

        let (dirs, files) = names.split_at(2);
        let mut dirs = dirs.to_vec();
        dirs.sort();
        assert_eq!(dirs, vec!["x", "y"]);
        assert!(files.iter().all(|name| name.ends_with(".txt")));
    }

    #[test]
    fn test_read_directory_errors() {
        let dir = tempdir().unwrap();
        assert_eq!(
            read_directory(&dir.path().join("missing"), JsonEscaping::Standard),
            Err(ErrorCode::NotFound)
        );

        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert_eq!(
            read_directory(&file, JsonEscaping::Standard),
            Err(ErrorCode::NotDirectory)
        );
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempdir().unwrap();
        assert_eq!(read_directory(dir.path(), JsonEscaping::Standard).unwrap(), "[]");
    }

    #[test]
    fn test_is_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        assert_eq!(is_directory(dir.path()), Ok(true));
        assert_eq!(is_directory(&file), Ok(false));
        assert_eq!(
            is_directory(&dir.path().join("missing")),
            Err(ErrorCode::NotFound)
        );
    }

    #[test]
    fn test_set_permissions_on_directory_is_noop() {
        let dir = tempdir().unwrap();
        let before = fs::metadata(dir.path()).unwrap().permissions();

        assert_eq!(set_permissions(dir.path(), 0o444), Ok(()));
        assert_eq!(fs::metadata(dir.path()).unwrap().permissions(), before);
    }

    #[test]
    fn test_set_permissions_missing_file() {
        let dir = tempdir().unwrap();
        assert_eq!(
            set_permissions(&dir.path().join("missing"), 0o644),
            Err(ErrorCode::NotFound)
        );
    }

    #[test]
    fn test_set_permissions_read_only_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        set_permissions(&file, 0o444).unwrap();
        assert!(fs::metadata(&file).unwrap().permissions().readonly());

        set_permissions(&file, 0o644).unwrap();
        assert!(!fs::metadata(&file).unwrap().permissions().readonly());
    }

    #[test]
    #[cfg(unix)]
    fn test_set_permissions_applies_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let file = dir.path().join("script.sh");
        fs::write(&file, "#!/bin/sh\n").unwrap();

        set_permissions(&file, 0o750).unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_modification_time() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        let expected = fs::metadata(&file).unwrap().modified().unwrap();
        assert_eq!(modification_time(&file), Ok(expected));
        assert_eq!(
            modification_time(&dir.path().join("missing")),
            Err(ErrorCode::NotFound)
        );
    }

    #[test]
    fn test_delete_file_and_empty_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        let sub = dir.path().join("sub");
        fs::write(&file, "x").unwrap();
        fs::create_dir(&sub).unwrap();

        assert_eq!(delete(&file), Ok(()));
        assert_eq!(delete(&sub), Ok(()));
        assert!(!file.exists());
        assert!(!sub.exists());
        assert_eq!(delete(&file), Err(ErrorCode::NotFound));
    }

    #[test]
    fn test_delete_non_empty_directory_fails() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("keep.txt"), "x").unwrap();

        assert!(delete(&sub).is_err());
        assert!(sub.exists());
    }
}
