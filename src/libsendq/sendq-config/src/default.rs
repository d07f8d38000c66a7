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

use crate::{
    config::field::{FieldEnvelope, FieldLogs, FieldQueue},
    Config,
};

impl Default for Config {
    fn default() -> Self {
        Self {
            version_requirement: semver::VersionReq::STAR,
            queue: FieldQueue::default(),
            envelope: FieldEnvelope::default(),
            logs: FieldLogs::default(),
        }
    }
}

impl Default for FieldQueue {
    fn default() -> Self {
        Self {
            dirpath: Self::default_dirpath(),
            file_mode: Self::default_file_mode(),
            version: sendq_common::QfVersion::default(),
            priority: Self::default_priority(),
        }
    }
}

impl FieldQueue {
    pub(crate) fn default_dirpath() -> std::path::PathBuf {
        "/var/spool/mqueue".into()
    }

    pub(crate) const fn default_file_mode() -> u32 {
        0o660
    }

    pub(crate) const fn default_priority() -> i64 {
        sendq_common::DEFAULT_PRIORITY
    }
}

impl Default for FieldEnvelope {
    fn default() -> Self {
        Self {
            product_name: Self::default_product_name(),
            local_hostname: Self::default_local_hostname(),
            protocol: None,
        }
    }
}

impl FieldEnvelope {
    pub(crate) fn default_product_name() -> Option<String> {
        Some("sendq".to_owned())
    }

    pub(crate) fn default_local_hostname() -> String {
        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "localhost".to_owned())
    }
}

impl Default for FieldLogs {
    fn default() -> Self {
        Self {
            filepath: None,
            level: Self::default_level(),
        }
    }
}

impl FieldLogs {
    pub(crate) fn default_level() -> String {
        "warn".to_owned()
    }
}
