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

/// Version of the control file format written to the queue.
///
/// `V6` is understood by sendmail 8.12 and later, `V8` by 8.13 and later.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum QfVersion {
    ///
    #[default]
    V6,
    ///
    V8,
}

impl QfVersion {
    /// Number written after the `V` record.
    #[must_use]
    pub const fn marker(self) -> u8 {
        match self {
            Self::V6 => 6,
            Self::V8 => 8,
        }
    }

    /// Content of the `F` record of a never processed envelope.
    #[must_use]
    pub const fn default_flags(self) -> &'static str {
        match self {
            Self::V6 => "",
            Self::V8 => "s",
        }
    }

    /// The `$_` macro (identity of the relay) is only part of the V8 format.
    #[must_use]
    pub const fn has_relay_identity(self) -> bool {
        matches!(self, Self::V8)
    }
}
