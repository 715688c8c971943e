//! Filesystem-backed segment storage.
//!
//! [`SegmentStore`] is the only component that touches the segment
//! directory. It owns at most one open write handle at a time, the handle
//! of the segment most recently created or appended to.
//!
//! # Directory Layout
//!
//! ```text
//! logs/
//! ├── main-2022-01-18 23-59-58 017.log   <- oldest, first to rotate out
//! ├── main-2022-01-19 08-00-00 000.log
//! └── main-2022-01-19 10-22-31 123.log   <- latest, receives appends
//! ```
//!
//! Any other file found in the directory is treated as a corrupt segment
//! and removed the next time the directory is listed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::SegmentError;
use crate::events::{EventFeed, StoreEvent};
use crate::segment::{self, SegmentMeta, SegmentNaming};

/// The segment currently open for writing.
#[derive(Debug)]
struct OpenSegment {
    path: PathBuf,
    file: File,
}

/// Owner of the segment directory and of the single open write handle.
#[derive(Debug)]
pub struct SegmentStore {
    /// Directory holding the segment files.
    directory: PathBuf,
    /// Segment name format.
    naming: SegmentNaming,
    /// Handle of the segment last created or appended to.
    current: Option<OpenSegment>,
    /// Where self-healing removals are reported.
    events: Arc<EventFeed>,
}

impl SegmentStore {
    /// Creates a store over the directory named in `config`.
    ///
    /// Nothing is touched on disk until the first operation.
    pub fn new(config: &StoreConfig, events: Arc<EventFeed>) -> Self {
        Self {
            directory: config.directory.clone(),
            naming: SegmentNaming::from_config(config),
            current: None,
            events,
        }
    }

    /// The segment directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The naming scheme used for new segments.
    pub fn naming(&self) -> &SegmentNaming {
        &self.naming
    }

    /// Lists every segment in the directory, oldest first.
    ///
    /// Files whose names do not parse are deleted and left out of the
    /// result. A missing directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::DirectoryAccess`] if the directory exists
    /// but cannot be read.
    pub fn list_segments(&mut self) -> Result<Vec<SegmentMeta>, SegmentError> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SegmentError::DirectoryAccess {
                    path: self.directory.clone(),
                    source,
                });
            }
        };

        Ok(self.collect_segments(entries.map(|entry| entry.map(|entry| entry.path()))))
    }

    /// Parses `entries` into segments, oldest first.
    ///
    /// Entries that cannot be read are skipped; the rest of the listing
    /// still goes through.
    fn collect_segments(
        &mut self,
        entries: impl IntoIterator<Item = io::Result<PathBuf>>,
    ) -> Vec<SegmentMeta> {
        let mut segments = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::debug!(directory = %self.directory.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name() else {
                continue;
            };

            match self.naming.parse(file_name) {
                Ok(created) => segments.push(SegmentMeta::new(path, created, metadata.len())),
                Err(e) => self.remove_corrupt(path, &e),
            }
        }

        segment::chronological(&segments)
    }

    fn remove_corrupt(&mut self, path: PathBuf, reason: &SegmentError) {
        tracing::warn!(path = %path.display(), %reason, "removing file with unparseable name");
        self.release_if_current(&path);
        match fs::remove_file(&path) {
            Ok(()) => self
                .events
                .emit(StoreEvent::CorruptSegmentRemoved { path }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                let error = SegmentError::DeleteFailed { path, source };
                tracing::warn!(%error, "failed to remove corrupt segment");
                self.events.emit(StoreEvent::OperationFailed {
                    operation: "remove corrupt segment",
                    error: error.to_string(),
                });
            }
        }
    }

    /// Lists the paths of all directory entries, sorted by name.
    ///
    /// Names are not parsed and nothing is deleted.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::DirectoryAccess`] if the directory exists
    /// but cannot be read.
    pub fn list_files(&self) -> Result<Vec<PathBuf>, SegmentError> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SegmentError::DirectoryAccess {
                    path: self.directory.clone(),
                    source,
                });
            }
        };

        let mut paths = entries
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<io::Result<Vec<_>>>()
            .map_err(|source| SegmentError::DirectoryAccess {
                path: self.directory.clone(),
                source,
            })?;
        paths.sort();
        Ok(paths)
    }

    /// Appends `text` to `segment`.
    ///
    /// The open handle is reused when it points at `segment`; otherwise the
    /// segment is opened and becomes the open handle. Empty text is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::WriteFailed`] if the segment cannot be opened
    /// or written.
    pub fn append(&mut self, text: &str, segment: &SegmentMeta) -> Result<(), SegmentError> {
        if text.is_empty() {
            return Ok(());
        }

        let reuse = self
            .current
            .as_ref()
            .is_some_and(|open| open.path == segment.path());
        if !reuse {
            let file = OpenOptions::new()
                .append(true)
                .open(segment.path())
                .map_err(|source| SegmentError::WriteFailed {
                    path: segment.path().to_path_buf(),
                    source,
                })?;
            self.current = Some(OpenSegment {
                path: segment.path().to_path_buf(),
                file,
            });
        }

        let Some(open) = self.current.as_mut() else {
            return Ok(());
        };
        open.file
            .write_all(text.as_bytes())
            .map_err(|source| SegmentError::WriteFailed {
                path: open.path.clone(),
                source,
            })
    }

    /// Creates an empty segment named `name` and makes it the open handle.
    ///
    /// The directory is created first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::DirectoryAccess`] if the directory cannot be
    /// created, or [`SegmentError::CreateFailed`] if the file cannot be
    /// created or a file with that name already exists.
    pub fn create_segment(&mut self, name: &str) -> Result<SegmentMeta, SegmentError> {
        let created = self.naming.parse(name.as_ref())?;

        fs::create_dir_all(&self.directory).map_err(|source| SegmentError::DirectoryAccess {
            path: self.directory.clone(),
            source,
        })?;

        let path = self.directory.join(name);
        let file = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| SegmentError::CreateFailed {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), "created segment");
        self.current = Some(OpenSegment {
            path: path.clone(),
            file,
        });
        Ok(SegmentMeta::new(path, created, 0))
    }

    /// Deletes `segment`.
    ///
    /// A segment that is already gone is not an error. The open handle is
    /// released if it pointed at the segment.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::DeleteFailed`] if the file exists but cannot
    /// be removed.
    pub fn delete_segment(&mut self, segment: &SegmentMeta) -> Result<(), SegmentError> {
        self.release_if_current(segment.path());
        match fs::remove_file(segment.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SegmentError::DeleteFailed {
                path: segment.path().to_path_buf(),
                source,
            }),
        }
    }

    /// Replaces `drop` with a new empty segment named `name`.
    ///
    /// The old segment is deleted before the new one is created, so the
    /// segment count never exceeds its limit, even transiently. If the
    /// delete fails nothing is created.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever step failed.
    pub fn rotate(&mut self, drop: &SegmentMeta, name: &str) -> Result<SegmentMeta, SegmentError> {
        self.delete_segment(drop)?;
        self.create_segment(name)
    }

    /// Reads `segment` from byte `offset` to the end.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::ReadFailed`] if the file cannot be opened,
    /// positioned or read.
    pub fn read_from(&self, segment: &SegmentMeta, offset: u64) -> Result<String, SegmentError> {
        let read_failed = |source| SegmentError::ReadFailed {
            path: segment.path().to_path_buf(),
            offset,
            source,
        };

        let mut file = File::open(segment.path()).map_err(read_failed)?;
        file.seek(SeekFrom::Start(offset)).map_err(read_failed)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(read_failed)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Opens a line reader over `segment`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::ReadFailed`] if the file cannot be opened.
    pub fn reader_for(&self, segment: &SegmentMeta) -> Result<LineReader, SegmentError> {
        let file = File::open(segment.path()).map_err(|source| SegmentError::ReadFailed {
            path: segment.path().to_path_buf(),
            offset: 0,
            source,
        })?;
        Ok(LineReader::new(file))
    }

    /// Encoded size of `text` in bytes.
    pub fn size_in_bytes(text: &str) -> u64 {
        text.len() as u64
    }

    /// Metadata of the segment behind the open handle, if any.
    ///
    /// The size is read from the handle, so it includes every append.
    pub fn current_segment(&self) -> Option<SegmentMeta> {
        let open = self.current.as_ref()?;
        let name = open.path.file_name()?;
        let created = self.naming.parse(name).ok()?;
        let size = open.file.metadata().ok()?.len();
        Some(SegmentMeta::new(open.path.clone(), created, size))
    }

    fn release_if_current(&mut self, path: &Path) {
        if self.current.as_ref().is_some_and(|open| open.path == path) {
            self.current = None;
        }
    }
}

/// Iterator over the raw lines of a segment.
///
/// Every yielded line keeps its `\n` terminator, except possibly the last
/// one. Invalid UTF-8 is replaced. Iteration stops at the end of the file
/// or at the first read error.
#[derive(Debug)]
pub struct LineReader {
    reader: BufReader<File>,
    buf: Vec<u8>,
}

impl LineReader {
    fn new(file: File) -> Self {
        Self {
            reader: BufReader::new(file),
            buf: Vec::new(),
        }
    }
}

impl Iterator for LineReader {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => Some(String::from_utf8_lossy(&self.buf).into_owned()),
            Err(e) => {
                tracing::debug!(error = %e, "stopping line reader");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use tempfile::tempdir;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    fn store_in(dir: &Path) -> (SegmentStore, Arc<EventFeed>) {
        let events = Arc::new(EventFeed::new());
        let store = SegmentStore::new(&StoreConfig::new(dir), Arc::clone(&events));
        (store, events)
    }

    #[test]
    fn test_missing_directory_lists_empty() {
        let dir = tempdir().unwrap();
        let (mut store, _) = store_in(&dir.path().join("absent"));
        assert!(store.list_segments().unwrap().is_empty());
        assert!(store.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_create_append_and_list() {
        let dir = tempdir().unwrap();
        let (mut store, _) = store_in(&dir.path().join("logs"));

        let name = store.naming().name_for(at(1_642_587_751_123));
        let meta = store.create_segment(&name).unwrap();
        assert_eq!(meta.size(), 0);
        assert_eq!(meta.created(), at(1_642_587_751_123));

        store.append("hello\n", &meta).unwrap();
        store.append("", &meta).unwrap();
        store.append("world\n", &meta).unwrap();

        let listed = store.list_segments().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size(), 12);
        assert_eq!(store.current_segment().unwrap().size(), 12);
        assert_eq!(
            fs::read_to_string(meta.path()).unwrap(),
            "hello\nworld\n"
        );
    }

    #[test]
    fn test_create_refuses_existing_name() {
        let dir = tempdir().unwrap();
        let (mut store, _) = store_in(dir.path());
        let name = store.naming().name_for(at(1_000));

        let meta = store.create_segment(&name).unwrap();
        store.append("keep\n", &meta).unwrap();

        assert!(matches!(
            store.create_segment(&name),
            Err(SegmentError::CreateFailed { .. })
        ));
        assert_eq!(fs::read_to_string(meta.path()).unwrap(), "keep\n");
    }

    #[test]
    fn test_create_rejects_foreign_name() {
        let dir = tempdir().unwrap();
        let (mut store, _) = store_in(dir.path());
        assert!(matches!(
            store.create_segment("notes.txt"),
            Err(SegmentError::InvalidFileName { .. })
        ));
    }

    #[test]
    fn test_append_switches_handle() {
        let dir = tempdir().unwrap();
        let (mut store, _) = store_in(dir.path());
        let first = store
            .create_segment(&store.naming().name_for(at(1_000)))
            .unwrap();
        let second = store
            .create_segment(&store.naming().name_for(at(2_000)))
            .unwrap();

        store.append("a\n", &first).unwrap();
        assert!(store.current_segment().unwrap().same_file(&first));
        store.append("b\n", &second).unwrap();
        assert!(store.current_segment().unwrap().same_file(&second));

        assert_eq!(fs::read_to_string(first.path()).unwrap(), "a\n");
        assert_eq!(fs::read_to_string(second.path()).unwrap(), "b\n");
    }

    #[test]
    fn test_list_heals_corrupt_names() {
        let dir = tempdir().unwrap();
        let (mut store, events) = store_in(dir.path());
        let rx = events.subscribe();

        let good = store
            .create_segment(&store.naming().name_for(at(1_000)))
            .unwrap();
        fs::write(dir.path().join("garbage.log"), "x").unwrap();
        fs::write(dir.path().join("main-2022-99-99 00-00-00 000.log"), "y").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let listed = store.list_segments().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].same_file(&good));
        assert!(!dir.path().join("garbage.log").exists());
        assert!(dir.path().join("nested").exists());

        let removed: Vec<StoreEvent> = rx.try_iter().collect();
        assert_eq!(removed.len(), 2);

        // Listing again finds nothing more to heal.
        assert_eq!(store.list_segments().unwrap(), listed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unreadable_entry_does_not_abort_listing() {
        let dir = tempdir().unwrap();
        let (mut store, _) = store_in(dir.path());
        let name = store.naming().name_for(at(1_642_587_751_123));
        let meta = store.create_segment(&name).unwrap();

        let entries = vec![
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
            Ok(meta.path().to_path_buf()),
        ];
        let segments = store.collect_segments(entries);

        assert_eq!(segments.len(), 1);
        assert!(segments[0].same_file(&meta));
    }

    #[test]
    fn test_list_is_chronological() {
        let dir = tempdir().unwrap();
        let (mut store, _) = store_in(dir.path());
        for millis in [3_000, 1_000, 2_000] {
            store
                .create_segment(&store.naming().name_for(at(millis)))
                .unwrap();
        }
        let created: Vec<_> = store
            .list_segments()
            .unwrap()
            .iter()
            .map(SegmentMeta::created)
            .collect();
        assert_eq!(created, vec![at(1_000), at(2_000), at(3_000)]);
    }

    #[test]
    fn test_delete_is_idempotent_and_releases_handle() {
        let dir = tempdir().unwrap();
        let (mut store, _) = store_in(dir.path());
        let meta = store
            .create_segment(&store.naming().name_for(at(1_000)))
            .unwrap();

        store.delete_segment(&meta).unwrap();
        assert!(store.current_segment().is_none());
        assert!(!meta.path().exists());
        store.delete_segment(&meta).unwrap();
    }

    #[test]
    fn test_rotate_replaces_segment() {
        let dir = tempdir().unwrap();
        let (mut store, _) = store_in(dir.path());
        let old = store
            .create_segment(&store.naming().name_for(at(1_000)))
            .unwrap();
        store.append("old\n", &old).unwrap();

        let name = store.naming().name_for(at(2_000));
        let new = store.rotate(&old, &name).unwrap();

        assert!(!old.path().exists());
        assert!(new.path().exists());
        assert_eq!(store.list_segments().unwrap(), vec![new]);
    }

    #[test]
    fn test_read_from_offset() {
        let dir = tempdir().unwrap();
        let (mut store, _) = store_in(dir.path());
        let meta = store
            .create_segment(&store.naming().name_for(at(1_000)))
            .unwrap();
        store.append("header\nbody\n", &meta).unwrap();

        assert_eq!(store.read_from(&meta, 7).unwrap(), "body\n");
        assert_eq!(store.read_from(&meta, 100).unwrap(), "");

        store.delete_segment(&meta).unwrap();
        assert!(matches!(
            store.read_from(&meta, 0),
            Err(SegmentError::ReadFailed { offset: 0, .. })
        ));
    }

    #[test]
    fn test_line_reader_keeps_terminators() {
        let dir = tempdir().unwrap();
        let (mut store, _) = store_in(dir.path());
        let meta = store
            .create_segment(&store.naming().name_for(at(1_000)))
            .unwrap();
        store.append("one\n\nthree", &meta).unwrap();

        let lines: Vec<String> = store.reader_for(&meta).unwrap().collect();
        assert_eq!(lines, vec!["one\n", "\n", "three"]);

        fs::remove_file(meta.path()).unwrap();
        assert!(store.reader_for(&meta).is_err());
    }

    #[test]
    fn test_size_in_bytes_counts_utf8() {
        assert_eq!(SegmentStore::size_in_bytes("abc"), 3);
        assert_eq!(SegmentStore::size_in_bytes("é"), 2);
        assert_eq!(SegmentStore::size_in_bytes("✓\n"), 4);
    }
}
