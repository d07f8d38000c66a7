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

/// This structure contains all the field to configure where and how the
/// envelopes are queued.
///
/// This structure will be loaded from a configuration file `-c, --config`
/// argument of the program. See [`crate::Config::from_toml`].
///
/// All field are optional and defaulted if missing, except the version
/// requirement.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// sendq's version requirement to parse this configuration file.
    pub version_requirement: semver::VersionReq,
    /// see [`field::FieldQueue`]
    #[serde(default)]
    pub queue: field::FieldQueue,
    /// see [`field::FieldEnvelope`]
    #[serde(default)]
    pub envelope: field::FieldEnvelope,
    /// see [`field::FieldLogs`]
    #[serde(default)]
    pub logs: field::FieldLogs,
}

/// The inner field of the sendq's configuration.
#[allow(clippy::module_name_repetitions)]
pub mod field {
    use sendq_common::{Protocol, QfVersion};

    /// Location and format of the queue files.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldQueue {
        /// Queue directory of sendmail, either containing the `qf` and `df`
        /// files, or the `qf/` and `df/` subdirectories.
        #[serde(default = "FieldQueue::default_dirpath")]
        pub dirpath: std::path::PathBuf,
        /// Permission bits of the created files.
        #[serde(default = "FieldQueue::default_file_mode")]
        pub file_mode: u32,
        /// Version of the control file format.
        #[serde(default)]
        pub version: QfVersion,
        /// Priority of the queued envelopes, lower is delivered first.
        #[serde(default = "FieldQueue::default_priority")]
        pub priority: i64,
    }

    /// Values describing the submission in the queue files.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldEnvelope {
        /// Name written in the `Received` header, `None` to omit it.
        #[serde(default = "FieldEnvelope::default_product_name")]
        pub product_name: Option<String>,
        /// Name of this host in the `Received` header.
        #[serde(default = "FieldEnvelope::default_local_hostname")]
        pub local_hostname: String,
        /// Protocol used when the submission does not specify one.
        #[serde(default)]
        pub protocol: Option<Protocol>,
    }

    /// Logging of the program.
    #[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(deny_unknown_fields)]
    pub struct FieldLogs {
        /// File to append the logs to, standard error if missing.
        #[serde(default)]
        pub filepath: Option<std::path::PathBuf>,
        /// Filter directives.
        ///
        /// See <https://docs.rs/tracing-subscriber/0.3.15/tracing_subscriber/filter/struct.EnvFilter.html>
        #[serde(default = "FieldLogs::default_level")]
        pub level: String,
    }
}
