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

//! sendq: write envelopes directly in a sendmail queue.
//!
//! An envelope is a pair of files sharing a queue id:
//!
//! * the control file `qf<id>`, holding the sender, the recipients and the
//!   headers, see [`ControlFile`],
//! * the data file `df<id>`, holding the body, see [`DataFile`].
//!
//! Several envelopes can share one body: their data files are hard links
//! to the same inode, see [`QueueManager::enqueue_many`].

#![doc(html_no_source)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
//
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
//
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
pub use error::{Error, Result};

mod directory;
pub use directory::{sync_directory, Layout, QueueDirectory};

mod queue_id;
pub use queue_id::allocate_unique_in_directory;

mod control_file {
    pub mod file;
    pub mod record;
}
pub use control_file::{file::ControlFile, record::Record};

mod data_file;
pub use data_file::{DataFile, DataSource, LinkTarget};

mod received;
pub use received::{received_header, rfc2822_date};

mod envelope;
pub use envelope::{Envelope, Message, MultiSubmission, RelayMetadata, Submission};

mod manager;
pub use manager::QueueManager;

pub use sendq_common::{Environment, Protocol, QfVersion, QueueId, SystemEnvironment};
