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
use crate::{Error, QueueDirectory, Result};
use sendq_common::{Environment, QueueId, QueueIdTemplate, SEQUENCE_SPACE};

/// Create `path`, failing if it already exists.
pub(crate) fn create_exclusive(path: &std::path::Path, mode: u32) -> std::io::Result<std::fs::File> {
    std::os::unix::fs::OpenOptionsExt::mode(
        std::fs::OpenOptions::new().write(true).create_new(true),
        mode,
    )
    .open(path)
}

/// Find a queue id whose control file does not exist yet, and create it.
///
/// The sequence starts at [`Environment::initial_sequence`] and is
/// incremented on each collision, the control file is created with
/// `O_CREAT | O_EXCL` so two processes can never obtain the same id.
///
/// # Errors
///
/// * the timestamp cannot be encoded
/// * the creation failed for another reason than a collision
/// * the 3600 sequences are all taken
pub fn allocate_unique_in_directory(
    directory: &QueueDirectory,
    timestamp: i64,
    environment: &dyn Environment,
    mode: u32,
) -> Result<(QueueId, std::fs::File)> {
    let template = QueueIdTemplate::generate(timestamp, environment.pid())?;
    let mut sequence = environment.initial_sequence();

    for attempt in 0..SEQUENCE_SPACE {
        let queue_id = template.fill(sequence);
        let path = directory.qf_path(&queue_id);

        match create_exclusive(&path, mode) {
            Ok(file) => {
                tracing::debug!(%queue_id, attempt, "Queue id allocated.");
                return Ok((queue_id, file));
            }
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::trace!(%queue_id, "Queue id already used.");
                sequence = (sequence + 1) % SEQUENCE_SPACE;
            }
            Err(source) => return Err(Error::QueueFileCreate { path, source }),
        }
    }

    Err(Error::QueueIdExhausted {
        directory: directory.qf_dir(),
        attempts: SEQUENCE_SPACE,
    })
}
