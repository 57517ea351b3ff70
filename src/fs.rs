//! The `Fs` capability trait the core consumes instead of touching
//! `std::fs`/`std::process` directly, plus its concrete default
//! implementation. Swappable for the in-memory mock used in tests.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

/// Filesystem and process-execution capabilities the build graph and
/// executor need. A single trait keeps every phase testable against an
/// in-memory double instead of the real disk and shell.
pub trait Fs {
    fn exists(&self, path: &Path) -> bool;
    fn mtime(&self, path: &Path) -> io::Result<SystemTime>;
    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>>;
    fn read_text(&self, path: &Path) -> io::Result<String>;
    fn touch(&self, path: &Path) -> io::Result<()>;
    fn mkfile(&self, path: &Path, contents: &str) -> io::Result<()>;
    /// Runs `bash -c <command>`, optionally inside `dir`, inheriting the
    /// parent's stdio. Returns the process exit code.
    fn run_shell(&self, command: &str, dir: Option<&Path>) -> io::Result<i32>;
}

/// The real filesystem and a real `bash` subprocess.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl Fs for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn mtime(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>> {
        let paths = glob::glob(pattern)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let mut out = Vec::new();
        for entry in paths {
            out.push(entry.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?);
        }
        Ok(out)
    }

    fn read_text(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn touch(&self, path: &Path) -> io::Result<()> {
        if path.exists() {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_modified(SystemTime::now())
        } else {
            OpenOptions::new().create(true).write(true).open(path)?;
            Ok(())
        }
    }

    fn mkfile(&self, path: &Path, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn run_shell(&self, command: &str, dir: Option<&Path>) -> io::Result<i32> {
        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(command);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        let status = cmd.status()?;
        Ok(status.code().unwrap_or(-1))
    }
}
