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
use crate::SEQUENCE_SPACE;

/// Inputs of the process environment the queue files depend on.
///
/// The queue id embeds the clock and the pid, its collision loop starts from a
/// random sequence, and the `Received` header names the local user and the
/// timezone offset.
pub trait Environment: std::fmt::Debug + Send + Sync {
    /// Current time, in seconds since epoch.
    fn now(&self) -> i64;

    /// Identifier of the process writing in the queue.
    fn pid(&self) -> u32;

    /// First sequence tried by the queue id allocation, in `[0, 3600)`.
    fn initial_sequence(&self) -> u16;

    /// Name of the user submitting the message.
    fn username(&self) -> String;

    /// Offset of the local timezone at `timestamp`.
    fn utc_offset(&self, timestamp: i64) -> time::UtcOffset;
}

/// The real environment of the running process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    #[inline]
    fn now(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
    }

    #[inline]
    fn pid(&self) -> u32 {
        std::process::id()
    }

    #[inline]
    fn initial_sequence(&self) -> u16 {
        fastrand::u16(..SEQUENCE_SPACE)
    }

    #[inline]
    fn username(&self) -> String {
        users::get_current_username().map_or_else(
            || users::get_current_uid().to_string(),
            |name| name.to_string_lossy().into_owned(),
        )
    }

    #[inline]
    fn utc_offset(&self, timestamp: i64) -> time::UtcOffset {
        crate::libc_abstraction::local_utc_offset(timestamp).unwrap_or(time::UtcOffset::UTC)
    }
}

/// Deterministic environment, for tests.
#[cfg(feature = "testing")]
#[derive(Debug, Clone)]
pub struct FixedEnvironment {
    ///
    pub now: i64,
    ///
    pub pid: u32,
    ///
    pub initial_sequence: u16,
    ///
    pub username: String,
    ///
    pub utc_offset: time::UtcOffset,
}

#[cfg(feature = "testing")]
impl Default for FixedEnvironment {
    fn default() -> Self {
        Self {
            now: 1_234_567_890,
            pid: 4242,
            initial_sequence: 0,
            username: "mailer".to_owned(),
            utc_offset: time::UtcOffset::UTC,
        }
    }
}

#[cfg(feature = "testing")]
impl Environment for FixedEnvironment {
    fn now(&self) -> i64 {
        self.now
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    fn initial_sequence(&self) -> u16 {
        self.initial_sequence % SEQUENCE_SPACE
    }

    fn username(&self) -> String {
        self.username.clone()
    }

    fn utc_offset(&self, _timestamp: i64) -> time::UtcOffset {
        self.utc_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_sequence_in_range() {
        for _ in 0..1000 {
            assert!(SystemEnvironment.initial_sequence() < SEQUENCE_SPACE);
        }
    }

    #[test]
    fn system_pid() {
        assert_eq!(SystemEnvironment.pid(), std::process::id());
    }

    #[test]
    fn system_clock_after_2020() {
        assert!(SystemEnvironment.now() > 1_577_836_800);
    }

    #[test]
    fn system_username_not_empty() {
        assert!(!SystemEnvironment.username().is_empty());
    }
}
