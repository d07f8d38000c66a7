/*
 * vSMTP mail transfer agent
 * Copyright (C) 2022 viridIT SAS
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or any later version.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
 * FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * this program. If not, see https://www.gnu.org/licenses/.
 *
 */
use crate::{queue_id::create_exclusive, ControlFile, Error, QueueDirectory, Result};
use sendq_common::{libc_abstraction, QueueId};

/// Content of a data file.
pub enum DataSource {
    /// The body is already in memory.
    Bytes(Vec<u8>),
    /// The body is streamed into the file.
    Reader(Box<dyn std::io::Read + Send>),
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Reader(_) => f.debug_tuple("Reader").finish(),
        }
    }
}

impl From<Vec<u8>> for DataSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// Existing data file a new envelope shares its body with.
#[derive(Debug)]
pub enum LinkTarget<'a> {
    ///
    Path(std::path::PathBuf),
    ///
    DataFile(&'a DataFile),
}

/// The data file `df<id>` of one envelope, holding the body of the message.
///
/// A body is written once: the other envelopes of the same message are
/// hard links to the first data file.
#[derive(Debug)]
pub struct DataFile {
    directory: QueueDirectory,
    queue_id: Option<QueueId>,
    source: Option<DataSource>,
    file_mode: u32,
    linked: bool,
    created: bool,
}

impl DataFile {
    /// Data file without a queue id nor content.
    #[must_use]
    pub fn new(directory: QueueDirectory) -> Self {
        Self {
            directory,
            queue_id: None,
            source: None,
            file_mode: ControlFile::DEFAULT_FILE_MODE,
            linked: false,
            created: false,
        }
    }

    /// Data file sharing the queue id of `control`.
    #[must_use]
    pub fn for_control_file(control: &ControlFile) -> Self {
        Self {
            queue_id: control.queue_id().cloned(),
            file_mode: control.file_mode(),
            ..Self::new(control.directory().clone())
        }
    }

    ///
    pub fn set_queue_id(&mut self, queue_id: QueueId) -> &mut Self {
        self.queue_id = Some(queue_id);
        self
    }

    ///
    pub fn set_source(&mut self, source: impl Into<DataSource>) -> &mut Self {
        self.source = Some(source.into());
        self
    }

    ///
    pub fn set_file_mode(&mut self, file_mode: u32) -> &mut Self {
        self.file_mode = file_mode;
        self
    }

    ///
    #[must_use]
    pub const fn queue_id(&self) -> Option<&QueueId> {
        self.queue_id.as_ref()
    }

    /// Path of the data file, `None` until a queue id is set.
    #[must_use]
    pub fn queue_filename(&self) -> Option<std::path::PathBuf> {
        self.queue_id.as_ref().map(|id| self.directory.df_path(id))
    }

    /// This instance is a hard link to another data file.
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.linked
    }

    /// The directory entry was created by this instance, written or linked.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        self.created
    }

    fn path(&self) -> Result<std::path::PathBuf> {
        self.queue_filename()
            .ok_or_else(|| Error::Configuration("data file has no queue id".to_owned()))
    }

    /// Create the data file and write the body in it.
    ///
    /// Returns `false` without touching the disk if the file is a hard link.
    ///
    /// # Errors
    ///
    /// * no queue id is set
    /// * the file already exists, it is never overwritten
    /// * the creation, the lock, the write, the sync or the close failed
    pub fn write(&mut self) -> Result<bool> {
        if self.linked {
            return Ok(false);
        }
        let path = self.path()?;

        let mut file = match create_exclusive(&path, self.file_mode) {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::FileExists { path });
            }
            Err(source) => return Err(Error::QueueFileCreate { path, source }),
        };
        self.created = true;

        libc_abstraction::flock_exclusive(std::os::unix::io::AsRawFd::as_raw_fd(&file))
            .map_err(|source| Error::Lock {
                path: path.clone(),
                source,
            })?;

        let written = match self.source.take() {
            Some(DataSource::Bytes(bytes)) => {
                std::io::Write::write_all(&mut file, &bytes).map(|()| bytes.len() as u64)
            }
            Some(DataSource::Reader(mut reader)) => std::io::copy(&mut reader, &mut file),
            None => Ok(0),
        }
        .map_err(|source| Error::Write {
            path: path.clone(),
            source,
        })?;

        std::io::Write::flush(&mut file)
            .and_then(|()| file.sync_all())
            .map_err(|source| Error::Sync {
                path: path.clone(),
                source,
            })?;

        libc_abstraction::close(file).map_err(|source| Error::Close {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), bytes = written, "Data file written.");
        Ok(true)
    }

    /// Make this data file a new directory entry of an existing one, a later
    /// [`DataFile::write`] does nothing.
    ///
    /// # Errors
    ///
    /// * the target has no path, or does not exist
    /// * no queue id is set
    /// * link(2) failed
    pub fn hardlink_to(&mut self, target: LinkTarget<'_>) -> Result<()> {
        let from = match target {
            LinkTarget::Path(path) => path,
            LinkTarget::DataFile(other) => other.path()?,
        };
        if !from.exists() {
            return Err(Error::HardlinkTargetMissing { path: from });
        }
        let to = self.path()?;

        std::fs::hard_link(&from, &to).map_err(|source| Error::Hardlink {
            from: from.clone(),
            to: to.clone(),
            source,
        })?;
        self.linked = true;
        self.created = true;

        tracing::debug!(from = %from.display(), to = %to.display(), "Data file linked.");
        Ok(())
    }

    /// Remove this directory entry, the other links to the body remain.
    ///
    /// Returns `false` when there is nothing to remove, or when the removal
    /// failed.
    pub fn unlink(&mut self) -> bool {
        let Some(path) = self.queue_filename() else {
            return false;
        };
        if !path.exists() {
            return false;
        }

        if let Err(error) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), %error, "Cannot remove data file.");
            return false;
        }
        self.created = false;

        tracing::debug!(path = %path.display(), "Data file removed.");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn data_file(directory: &QueueDirectory, id: &str) -> DataFile {
        let mut data = DataFile::new(directory.clone());
        data.set_queue_id(id.parse().unwrap());
        data
    }

    #[test]
    fn write_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let queue = QueueDirectory::open(dir.path()).unwrap();
        let mut data = data_file(&queue, "n1DNVU00004242");
        data.set_source(b"hello\nworld\n".to_vec());

        assert!(data.write().unwrap());
        assert!(data.is_created());
        assert_eq!(
            std::fs::read(dir.path().join("dfn1DNVU00004242")).unwrap(),
            b"hello\nworld\n"
        );
    }

    #[test]
    fn write_reader() {
        let dir = tempfile::tempdir().unwrap();
        let queue = QueueDirectory::open(dir.path()).unwrap();
        let mut data = data_file(&queue, "n1DNVU00004242");
        data.set_source(DataSource::Reader(Box::new(std::io::Cursor::new(
            b"streamed".to_vec(),
        ))));

        assert!(data.write().unwrap());
        assert_eq!(
            std::fs::read(data.queue_filename().unwrap()).unwrap(),
            b"streamed"
        );
    }

    #[test]
    fn never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let queue = QueueDirectory::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("dfn1DNVU00004242"), "theirs").unwrap();

        let mut data = data_file(&queue, "n1DNVU00004242");
        data.set_source(b"ours".to_vec());

        assert!(matches!(data.write(), Err(Error::FileExists { .. })));
        assert!(!data.is_created());
        assert!(!data.is_linked());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("dfn1DNVU00004242")).unwrap(),
            "theirs"
        );
    }

    #[test]
    fn no_queue_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = DataFile::new(QueueDirectory::open(dir.path()).unwrap());

        assert!(matches!(data.write(), Err(Error::Configuration(_))));
        assert!(!data.unlink());
    }

    #[test]
    fn hardlink_survives_unlink() {
        let dir = tempfile::tempdir().unwrap();
        let queue = QueueDirectory::open(dir.path()).unwrap();

        let mut first = data_file(&queue, "n1DNVU00004242");
        first.set_source(b"body".to_vec());
        first.write().unwrap();

        let mut second = data_file(&queue, "n1DNVU01004242");
        second.hardlink_to(LinkTarget::DataFile(&first)).unwrap();
        assert!(second.is_linked());
        assert!(!second.write().unwrap());

        let first_ino = std::os::unix::fs::MetadataExt::ino(
            &std::fs::metadata(first.queue_filename().unwrap()).unwrap(),
        );
        let second_ino = std::os::unix::fs::MetadataExt::ino(
            &std::fs::metadata(second.queue_filename().unwrap()).unwrap(),
        );
        assert_eq!(first_ino, second_ino);

        assert!(first.unlink());
        assert!(!first.unlink());
        assert_eq!(
            std::fs::read(second.queue_filename().unwrap()).unwrap(),
            b"body"
        );
    }

    #[test]
    fn hardlink_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let queue = QueueDirectory::open(dir.path()).unwrap();
        let existing = dir.path().join("body");
        std::fs::write(&existing, "body").unwrap();

        let mut data = data_file(&queue, "n1DNVU00004242");
        data.hardlink_to(LinkTarget::Path(existing)).unwrap();

        assert_eq!(
            std::fs::read_to_string(data.queue_filename().unwrap()).unwrap(),
            "body"
        );
    }

    #[test]
    fn hardlink_target_missing() {
        let dir = tempfile::tempdir().unwrap();
        let queue = QueueDirectory::open(dir.path()).unwrap();
        let first = data_file(&queue, "n1DNVU00004242");

        let mut second = data_file(&queue, "n1DNVU01004242");
        match second.hardlink_to(LinkTarget::DataFile(&first)) {
            Err(Error::HardlinkTargetMissing { path }) => {
                assert_eq!(path, dir.path().join("dfn1DNVU00004242"));
            }
            otherwise => panic!("unexpected {otherwise:?}"),
        }
        assert!(!second.is_linked());
    }

    #[test]
    fn hardlink_onto_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let queue = QueueDirectory::open(dir.path()).unwrap();
        let existing = dir.path().join("body");
        std::fs::write(&existing, "body").unwrap();
        std::fs::write(dir.path().join("dfn1DNVU00004242"), "other").unwrap();

        let mut data = data_file(&queue, "n1DNVU00004242");
        match data.hardlink_to(LinkTarget::Path(existing.clone())) {
            Err(Error::Hardlink { from, source, .. }) => {
                assert_eq!(from, existing);
                assert_eq!(source.kind(), std::io::ErrorKind::AlreadyExists);
            }
            otherwise => panic!("unexpected {otherwise:?}"),
        }
    }

    #[test]
    fn split_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("qf")).unwrap();
        std::fs::create_dir(dir.path().join("df")).unwrap();
        let queue = QueueDirectory::open(dir.path()).unwrap();

        let mut data = data_file(&queue, "n1DNVU00004242");
        data.set_source(b"body".to_vec());
        data.write().unwrap();

        assert!(dir.path().join("df").join("dfn1DNVU00004242").exists());
    }
}
