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
use sendq_common::QfVersion;

/// One logical record of a control file.
///
/// Each record renders to one or more newline terminated lines, independently
/// of its neighbours. Header text is raw bytes, written without any decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record<'a> {
    /// `V<version>`
    Version(QfVersion),
    /// `T<seconds since epoch>`, creation time of the envelope.
    Timestamp(i64),
    /// `K0`, the envelope has never been processed.
    LastProcessed,
    /// `N0`, number of delivery attempts.
    TimesProcessed,
    /// `P<priority>`
    Priority(i64),
    /// `F<flags>`
    Flags(&'a str),
    /// `$<name><value>`, a macro definition.
    Macro {
        /// Single letter, or a long name enclosed in braces.
        name: &'static str,
        ///
        value: String,
    },
    /// `S<<sender>>`
    Sender(&'a str),
    /// `C:`, `r` and `R` lines of one recipient.
    Recipient(&'a str),
    /// `H??<line>`, or the line itself if it continues the previous header.
    Header(&'a [u8]),
    /// `.`
    Terminator,
}

impl Record<'_> {
    /// Append the lines of this record to `f`.
    ///
    /// # Errors
    ///
    /// * the underlying writer failed
    pub fn write_to(&self, f: &mut impl std::io::Write) -> std::io::Result<()> {
        match self {
            Self::Version(version) => writeln!(f, "V{}", version.marker()),
            Self::Timestamp(timestamp) => writeln!(f, "T{timestamp}"),
            Self::LastProcessed => writeln!(f, "K0"),
            Self::TimesProcessed => writeln!(f, "N0"),
            Self::Priority(priority) => writeln!(f, "P{priority}"),
            Self::Flags(flags) => writeln!(f, "F{flags}"),
            Self::Macro { name, value } => writeln!(f, "${name}{value}"),
            Self::Sender(sender) => writeln!(f, "S<{sender}>"),
            Self::Recipient(rcpt) => {
                writeln!(f, "C:<{rcpt}>")?;
                writeln!(f, "rRFC822; {rcpt}")?;
                writeln!(f, "RPFD:{rcpt}")
            }
            Self::Header(line) => {
                if !matches!(line.first(), Some(b' ' | b'\t')) {
                    f.write_all(b"H??")?;
                }
                f.write_all(line)?;
                f.write_all(b"\n")
            }
            Self::Terminator => writeln!(f, "."),
        }
    }
}
