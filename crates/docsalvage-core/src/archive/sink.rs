/// Output sinks for recovered members
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::recovery::RecoveryError;

/// Destination for recovered members
pub trait OutputSink {
    /// Write a member under its relative name, returning where it landed
    fn write_member(&mut self, name: &str, data: &[u8]) -> Result<PathBuf, RecoveryError>;

    /// Create a directory entry
    fn create_directory(&mut self, name: &str) -> Result<PathBuf, RecoveryError>;
}

/// Turn an archive member name into a relative path that cannot leave the
/// output root. Rejects parent components, absolute paths and drive prefixes.
pub fn sanitize_member_path(name: &str) -> Result<PathBuf, RecoveryError> {
    let normalized = name.replace('\\', "/");
    let mut relative = PathBuf::new();

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => {
                // `C:` style prefixes only parse as such on Windows
                if part.to_string_lossy().contains(':') {
                    return Err(RecoveryError::UnsafePath(name.to_string()));
                }
                relative.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(RecoveryError::UnsafePath(name.to_string()));
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(RecoveryError::UnsafePath(name.to_string()));
    }

    Ok(relative)
}

/// Writes members below a directory, creating parents as needed
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl OutputSink for DirectorySink {
    fn write_member(&mut self, name: &str, data: &[u8]) -> Result<PathBuf, RecoveryError> {
        let path = self.root.join(sanitize_member_path(name)?);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        Ok(path)
    }

    fn create_directory(&mut self, name: &str) -> Result<PathBuf, RecoveryError> {
        let path = self.root.join(sanitize_member_path(name)?);
        fs::create_dir_all(&path)?;
        Ok(path)
    }
}

/// Keeps members in memory, keyed by sanitized relative path
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub files: BTreeMap<PathBuf, Vec<u8>>,
    pub directories: Vec<PathBuf>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(Path::new(name)).map(Vec::as_slice)
    }
}

impl OutputSink for MemorySink {
    fn write_member(&mut self, name: &str, data: &[u8]) -> Result<PathBuf, RecoveryError> {
        let path = sanitize_member_path(name)?;
        self.files.insert(path.clone(), data.to_vec());
        Ok(path)
    }

    fn create_directory(&mut self, name: &str) -> Result<PathBuf, RecoveryError> {
        let path = sanitize_member_path(name)?;
        if !self.directories.contains(&path) {
            self.directories.push(path.clone());
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_accepts_nested_paths() {
        assert_eq!(
            sanitize_member_path("docs/./report.txt").unwrap(),
            PathBuf::from("docs").join("report.txt")
        );
        assert_eq!(
            sanitize_member_path("docs\\report.txt").unwrap(),
            PathBuf::from("docs").join("report.txt")
        );
    }

    #[test]
    fn test_sanitize_rejects_escapes() {
        for name in ["../evil.txt", "a/../../evil", "/etc/passwd", "C:/evil", "", "./"] {
            assert!(
                matches!(sanitize_member_path(name), Err(RecoveryError::UnsafePath(_))),
                "accepted {:?}",
                name
            );
        }
    }

    #[test]
    fn test_directory_sink_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(temp_dir.path());

        let path = sink.write_member("a/b/c.txt", b"content").unwrap();
        assert_eq!(path, temp_dir.path().join("a").join("b").join("c.txt"));
        assert_eq!(fs::read(&path).unwrap(), b"content");

        let dir = sink.create_directory("empty/").unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.write_member("x/y.bin", &[1, 2, 3]).unwrap();
        assert_eq!(sink.get("x/y.bin"), Some(&[1u8, 2, 3][..]));
        assert!(sink.write_member("../z", &[]).is_err());
    }
}
