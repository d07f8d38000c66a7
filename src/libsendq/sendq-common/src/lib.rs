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

//! sendq common definition

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
//
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![warn(clippy::undocumented_unsafe_blocks)]
//
#![allow(clippy::missing_const_for_fn)] // see https://github.com/rust-lang/rust-clippy/issues/9271

/// Default priority of a freshly queued envelope.
pub const DEFAULT_PRIORITY: i64 = 30_000;

mod types {
    pub mod protocol;
    pub mod qf_version;
    pub mod queue_id;
}

pub use types::{
    protocol::Protocol,
    qf_version::QfVersion,
    queue_id::{QueueId, QueueIdError, QueueIdTemplate, BASE60, SEQUENCE_SPACE},
};

mod environment;
pub use environment::{Environment, SystemEnvironment};

#[cfg(feature = "testing")]
pub use environment::FixedEnvironment;

/// abstraction of the libc
pub mod libc_abstraction;
