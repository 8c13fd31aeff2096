use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;

/// Writes and removes synced files inside a single target directory.
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates or fully replaces `filename` with exactly `bytes`.
    ///
    /// The content is staged in a temporary file in the same directory and
    /// renamed over the destination, so readers never observe a half-written
    /// file.
    pub fn write(&self, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.target(filename)?;
        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(bytes)?;
        staged.persist(&path).map_err(|err| err.error)?;
        Ok(path)
    }

    /// Removes `filename`. An already-absent file is success, reported as
    /// `Ok(None)`.
    pub fn delete(&self, filename: &str) -> io::Result<Option<PathBuf>> {
        let path = self.target(filename)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(Some(path)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    // Destination files are direct children of the sync directory; a key
    // that maps anywhere else is rejected before touching the filesystem.
    fn target(&self, filename: &str) -> io::Result<PathBuf> {
        let name = Path::new(filename);
        let mut components = name.components();
        let flat = matches!(components.next(), Some(Component::Normal(_)))
            && components.next().is_none();
        if !flat {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a plain file name: {filename:?}"),
            ));
        }
        Ok(self.dir.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_creates_the_file_with_exact_bytes() {
        let dir = tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path());

        let path = sink.write("tls.crt", b"ABC").expect("write should succeed");

        assert_eq!(path, dir.path().join("tls.crt"));
        assert_eq!(fs::read(&path).expect("file readable"), b"ABC");
    }

    #[test]
    fn write_replaces_previous_content_entirely() {
        let dir = tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path());

        sink.write("tls.crt", b"old content, much longer")
            .expect("first write");
        sink.write("tls.crt", b"new").expect("second write");

        assert_eq!(
            fs::read(dir.path().join("tls.crt")).expect("file readable"),
            b"new"
        );
    }

    #[test]
    fn write_leaves_no_stray_temp_files() {
        let dir = tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path());

        sink.write("tls.crt", b"ABC").expect("write should succeed");

        let entries = fs::read_dir(dir.path())
            .expect("dir readable")
            .collect::<Result<Vec<_>, _>>()
            .expect("entries readable");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name(), "tls.crt");
    }

    #[test]
    fn delete_removes_the_file() {
        let dir = tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path());

        sink.write("tls.crt", b"ABC").expect("write should succeed");
        let removed = sink.delete("tls.crt").expect("delete should succeed");

        assert_eq!(removed, Some(dir.path().join("tls.crt")));
        assert!(!dir.path().join("tls.crt").exists());
    }

    #[test]
    fn deleting_a_missing_file_is_success() {
        let dir = tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path());

        assert_eq!(sink.delete("tls.crt").expect("delete should succeed"), None);
    }

    #[test]
    fn nested_names_are_rejected() {
        let dir = tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path());

        for name in ["a/b", "../escape", "", ".", "/etc/passwd"] {
            let err = sink.write(name, b"x").expect_err("should be rejected");
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
            let err = sink.delete(name).expect_err("should be rejected");
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
    }
}
