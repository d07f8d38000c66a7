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

/// Apply an exclusive advisory lock on an open file, without waiting.
///
/// # Errors
///
/// see flock(2) ERRORS, `EWOULDBLOCK` if another process holds a lock
#[inline]
pub fn flock_exclusive(fd: std::os::unix::io::RawFd) -> std::io::Result<()> {
    #[allow(unsafe_code)]
    // SAFETY: ffi call, an invalid fd is reported as EBADF
    match unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) } {
        0 => Ok(()),
        _ => Err(std::io::Error::last_os_error()),
    }
}

/// Close a file descriptor, reporting the error the standard library would
/// silently drop.
///
/// # Errors
///
/// see close(2) ERRORS
#[inline]
pub fn close(file: std::fs::File) -> std::io::Result<()> {
    let fd = std::os::unix::io::IntoRawFd::into_raw_fd(file);
    #[allow(unsafe_code)]
    // SAFETY: ffi call, `fd` is owned and closed exactly once
    match unsafe { libc::close(fd) } {
        0 => Ok(()),
        _ => Err(std::io::Error::last_os_error()),
    }
}

/// Fields of a `struct tm` needed to compare two breakdowns of the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarBreakdown {
    /// years since 1900
    pub year: i32,
    /// day of the year, 0 to 365
    pub yday: i32,
    /// 0 to 23
    pub hour: i32,
    /// 0 to 59
    pub minute: i32,
}

impl From<&libc::tm> for CalendarBreakdown {
    fn from(tm: &libc::tm) -> Self {
        Self {
            year: tm.tm_year,
            yday: tm.tm_yday,
            hour: tm.tm_hour,
            minute: tm.tm_min,
        }
    }
}

type ConvertFn = unsafe extern "C" fn(*const libc::time_t, *mut libc::tm) -> *mut libc::tm;

fn breakdown(timestamp: i64, convert: ConvertFn, name: &str) -> std::io::Result<CalendarBreakdown> {
    let time = libc::time_t::try_from(timestamp).map_err(|_err| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{name}: timestamp `{timestamp}` does not fit in time_t"),
        )
    })?;

    #[allow(unsafe_code)]
    // SAFETY: `tm` is plain old data, all zero is a valid value
    let mut tm = unsafe { std::mem::zeroed::<libc::tm>() };

    #[allow(unsafe_code)]
    // SAFETY: both pointers are valid for the duration of the call
    let result = unsafe { convert(&time, &mut tm) };

    if result.is_null() {
        return Err(std::io::Error::last_os_error());
    }
    Ok(CalendarBreakdown::from(&tm))
}

/// Breakdown of `timestamp` in the local timezone.
///
/// # Errors
///
/// see localtime(3) ERRORS
pub fn localtime(timestamp: i64) -> std::io::Result<CalendarBreakdown> {
    breakdown(timestamp, libc::localtime_r, "localtime_r")
}

/// Breakdown of `timestamp` in UTC.
///
/// # Errors
///
/// see gmtime(3) ERRORS
pub fn gmtime(timestamp: i64) -> std::io::Result<CalendarBreakdown> {
    breakdown(timestamp, libc::gmtime_r, "gmtime_r")
}

/// Offset in minutes between two breakdowns of the same instant.
///
/// Both breakdowns are at most one day apart, so a year change means the
/// local day is the last or first one of its year.
#[must_use]
pub fn offset_minutes(local: &CalendarBreakdown, utc: &CalendarBreakdown) -> i32 {
    let days = match local.year.cmp(&utc.year) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Greater => 1,
        std::cmp::Ordering::Equal => local.yday - utc.yday,
    };

    (days * 24 + local.hour - utc.hour) * 60 + local.minute - utc.minute
}

/// Offset of the local timezone at `timestamp`.
///
/// # Errors
///
/// * see [`localtime`] and [`gmtime`]
/// * the computed offset is out of range
pub fn local_utc_offset(timestamp: i64) -> std::io::Result<time::UtcOffset> {
    let minutes = offset_minutes(&localtime(timestamp)?, &gmtime(timestamp)?);

    time::UtcOffset::from_whole_seconds(minutes * 60)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
