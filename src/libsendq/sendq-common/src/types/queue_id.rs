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

/// Symbols used by sendmail to encode the time and sequence parts of a queue id.
pub const BASE60: &[u8; 60] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwx";

/// Number of distinct sequence values, two base 60 digits.
pub const SEQUENCE_SPACE: u16 = 3600;

const TIME_LEN: usize = 6;
const SEQUENCE_LEN: usize = 2;
const PID_LEN: usize = 6;
const PID_MODULO: u32 = 1_000_000;

/// Errors produced while building or parsing a [`QueueId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueIdError {
    /// The timestamp cannot be represented as a calendar date.
    #[error("timestamp `{0}` is out of range")]
    InvalidTimestamp(i64),
    /// The string is not shaped like a queue id.
    #[error("`{0}` is not a valid queue id")]
    Malformed(String),
}

fn base60(value: u8) -> char {
    #[allow(clippy::indexing_slicing)] // value is always reduced modulo 60
    char::from(BASE60[usize::from(value % 60)])
}

fn base60_value(symbol: u8) -> Option<u8> {
    BASE60
        .iter()
        .position(|s| *s == symbol)
        .and_then(|i| u8::try_from(i).ok())
}

/// Time and process dependent part of a queue id, waiting for its sequence.
///
/// ```
/// # use sendq_common::QueueIdTemplate;
/// let template = QueueIdTemplate::generate(0, 1234).unwrap();
/// assert_eq!(template.fill(61).as_str(), "A0100011001234");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueIdTemplate {
    time: String,
    pid: String,
}

impl QueueIdTemplate {
    /// Encode `timestamp` (seconds since epoch, read in UTC) and `pid`.
    ///
    /// # Errors
    ///
    /// * the timestamp is out of the range supported by [`time`]
    pub fn generate(timestamp: i64, pid: u32) -> Result<Self, QueueIdError> {
        let date = time::OffsetDateTime::from_unix_timestamp(timestamp)
            .map_err(|_err| QueueIdError::InvalidTimestamp(timestamp))?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let year = (date.year() - 1900).rem_euclid(60) as u8;

        let time = [
            year,
            u8::from(date.month()) - 1,
            date.day(),
            date.hour(),
            date.minute(),
            date.second(),
        ]
        .into_iter()
        .map(base60)
        .collect::<String>();

        Ok(Self {
            time,
            pid: format!("{:0width$}", pid % PID_MODULO, width = PID_LEN),
        })
    }

    /// Substitute the two sequence symbols, high digit first.
    #[must_use]
    pub fn fill(&self, sequence: u16) -> QueueId {
        let sequence = sequence % SEQUENCE_SPACE;
        #[allow(clippy::cast_possible_truncation)]
        let (high, low) = ((sequence / 60) as u8, (sequence % 60) as u8);

        let mut out = String::with_capacity(TIME_LEN + SEQUENCE_LEN + PID_LEN);
        out.push_str(&self.time);
        out.push(base60(high));
        out.push(base60(low));
        out.push_str(&self.pid);
        QueueId(out)
    }
}

/// Identifier shared by the `qf` and `df` files of one envelope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct QueueId(String);

impl QueueId {
    /// Length of every queue id.
    pub const LEN: usize = TIME_LEN + SEQUENCE_LEN + PID_LEN;

    ///
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the sequence part of the id.
    #[must_use]
    pub fn sequence(&self) -> u16 {
        let bytes = self.0.as_bytes();
        let digit = |i: usize| {
            bytes
                .get(i)
                .copied()
                .and_then(base60_value)
                .map_or(0, u16::from)
        };
        digit(TIME_LEN) * 60 + digit(TIME_LEN + 1)
    }
}

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QueueId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for QueueId {
    type Err = QueueIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let well_formed = bytes.len() == Self::LEN
            && bytes
                .iter()
                .take(TIME_LEN + SEQUENCE_LEN)
                .all(|b| base60_value(*b).is_some())
            && bytes
                .iter()
                .skip(TIME_LEN + SEQUENCE_LEN)
                .all(u8::is_ascii_digit);

        if well_formed {
            Ok(Self(s.to_owned()))
        } else {
            Err(QueueIdError::Malformed(s.to_owned()))
        }
    }
}
