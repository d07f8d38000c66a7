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
use sendq_common::{QueueId, QueueIdError};

/// Errors produced while writing in the queue.
///
/// Every variant is fatal for the current enqueue, the files created so far
/// are removed before the error reaches the caller. Benign conditions
/// (closing twice, removing a missing file) are reported as `false` instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required value is missing or invalid, detected before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The queue id cannot be built.
    #[error(transparent)]
    QueueId(#[from] QueueIdError),

    /// A queue file cannot be created, for another reason than a name collision.
    #[error("cannot create queue file `{}`: {source}", path.display())]
    QueueFileCreate {
        /// File to create.
        path: std::path::PathBuf,
        /// The source of the error
        source: std::io::Error,
    },

    /// Every sequence of the queue id is already used.
    #[error("no queue id available in `{}` after {attempts} attempts", directory.display())]
    QueueIdExhausted {
        /// Directory of the control files.
        directory: std::path::PathBuf,
        /// Number of names tried.
        attempts: u16,
    },

    /// A freshly created file is already locked.
    #[error("cannot lock `{}`: {source}", path.display())]
    Lock {
        ///
        path: std::path::PathBuf,
        /// The source of the error
        source: std::io::Error,
    },

    /// The control file has been closed or removed, or was never created.
    #[error("control file {} has no open handle", queue_id.as_ref().map_or("(no queue id)", QueueId::as_str))]
    WriteWithoutHandle {
        ///
        queue_id: Option<QueueId>,
    },

    /// Writing the content of a queue file failed.
    #[error("cannot write `{}`: {source}", path.display())]
    Write {
        ///
        path: std::path::PathBuf,
        /// The source of the error
        source: std::io::Error,
    },

    /// Flushing a queue file to the disk failed.
    #[error("cannot sync `{}`: {source}", path.display())]
    Sync {
        ///
        path: std::path::PathBuf,
        /// The source of the error
        source: std::io::Error,
    },

    /// Closing a queue file failed.
    #[error("cannot close `{}`: {source}", path.display())]
    Close {
        ///
        path: std::path::PathBuf,
        /// The source of the error
        source: std::io::Error,
    },

    /// The data file to link to does not exist.
    #[error("hard link target `{}` does not exist", path.display())]
    HardlinkTargetMissing {
        ///
        path: std::path::PathBuf,
    },

    /// The hard link cannot be created.
    #[error("cannot link `{}` to `{}`: {source}", to.display(), from.display())]
    Hardlink {
        /// Existing data file.
        from: std::path::PathBuf,
        /// New directory entry.
        to: std::path::PathBuf,
        /// The source of the error
        source: std::io::Error,
    },

    /// A data file is never overwritten.
    #[error("data file `{}` already exists", path.display())]
    FileExists {
        ///
        path: std::path::PathBuf,
    },

    /// The directory entries cannot be flushed to the disk.
    #[error("cannot sync directory `{}`: {source}", path.display())]
    DirectorySync {
        ///
        path: std::path::PathBuf,
        /// The source of the error
        source: std::io::Error,
    },

    /// One of the named envelopes failed, the whole batch was rolled back.
    #[error("envelope `{name}`: {source}")]
    Envelope {
        /// Name given by the caller.
        name: String,
        /// The source of the error
        source: Box<Error>,
    },
}

/// Result of the queue operations.
pub type Result<T> = std::result::Result<T, Error>;
