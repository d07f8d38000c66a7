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
use crate::{Error, Result};
use sendq_common::QueueId;

/// How the queue files are laid out in the queue directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Layout {
    /// `qf<id>` and `df<id>` side by side.
    Flat,
    /// `qf/qf<id>` and `df/df<id>`.
    Split,
}

/// A sendmail queue directory.
///
/// ```shell
/// $> tree /var/spool/mqueue        $> tree /var/spool/mqueue
/// /var/spool/mqueue                /var/spool/mqueue
/// ├── dfn1DNVU00004242             ├── df
/// └── qfn1DNVU00004242             │   └── dfn1DNVU00004242
///                                  └── qf
///                                      └── qfn1DNVU00004242
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDirectory {
    root: std::path::PathBuf,
    layout: Layout,
}

impl QueueDirectory {
    /// Bind an existing directory, detecting its layout: the queue is split
    /// when both `qf/` and `df/` exist.
    ///
    /// # Errors
    ///
    /// * `root` is not a directory
    pub fn open(root: impl Into<std::path::PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Configuration(format!(
                "queue directory `{}` does not exist",
                root.display()
            )));
        }

        let layout = if root.join("qf").is_dir() && root.join("df").is_dir() {
            Layout::Split
        } else {
            Layout::Flat
        };

        tracing::debug!(root = %root.display(), %layout, "Queue directory opened.");

        Ok(Self { root, layout })
    }

    /// Bind a directory without looking at the filesystem.
    #[must_use]
    pub fn with_layout(root: impl Into<std::path::PathBuf>, layout: Layout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    ///
    #[must_use]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    ///
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Directory of the control files.
    #[must_use]
    pub fn qf_dir(&self) -> std::path::PathBuf {
        match self.layout {
            Layout::Flat => self.root.clone(),
            Layout::Split => self.root.join("qf"),
        }
    }

    /// Directory of the data files.
    #[must_use]
    pub fn df_dir(&self) -> std::path::PathBuf {
        match self.layout {
            Layout::Flat => self.root.clone(),
            Layout::Split => self.root.join("df"),
        }
    }

    ///
    #[must_use]
    pub fn qf_path(&self, queue_id: &QueueId) -> std::path::PathBuf {
        self.qf_dir().join(format!("qf{queue_id}"))
    }

    ///
    #[must_use]
    pub fn df_path(&self, queue_id: &QueueId) -> std::path::PathBuf {
        self.df_dir().join(format!("df{queue_id}"))
    }

    /// Flush the entries of the directories holding the queue files.
    ///
    /// # Errors
    ///
    /// * see [`sync_directory`]
    pub fn sync(&self) -> Result<()> {
        match self.layout {
            Layout::Flat => sync_directory(&self.root),
            Layout::Split => {
                sync_directory(&self.qf_dir())?;
                sync_directory(&self.df_dir())
            }
        }
    }
}

/// Open `path` read-only and flush it to the disk, making the files created or
/// linked inside it durable.
///
/// # Errors
///
/// * the directory cannot be opened
/// * fsync(2) failed
pub fn sync_directory(path: &std::path::Path) -> Result<()> {
    std::fs::File::open(path)
        .and_then(|dir| dir.sync_all())
        .map_err(|source| Error::DirectorySync {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::trace!(directory = %path.display(), "Directory synced.");
    Ok(())
}
