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
use crate::Config;

const WORLD_WRITABLE: u32 = 0o002;
const PERMISSION_BITS: u32 = 0o7777;

fn is_single_token(value: &str) -> bool {
    !value.is_empty() && !value.chars().any(char::is_whitespace)
}

impl Config {
    /// Validate the values the type system does not constrain.
    ///
    /// # Errors
    ///
    /// * the priority is negative
    /// * the file mode is not a permission mask, or lets anyone write the queue
    /// * the local hostname is empty or contains whitespace
    /// * the product name spans several lines
    /// * the log level is not a valid filter
    pub fn ensure(config: Self) -> anyhow::Result<Self> {
        anyhow::ensure!(
            config.queue.priority >= 0,
            "queue priority cannot be negative, got {}",
            config.queue.priority
        );

        anyhow::ensure!(
            config.queue.file_mode & !PERMISSION_BITS == 0,
            "queue file mode {:#o} is not a permission mask",
            config.queue.file_mode
        );

        anyhow::ensure!(
            config.queue.file_mode & WORLD_WRITABLE == 0,
            "queue file mode {:#o} must not be world writable",
            config.queue.file_mode
        );

        anyhow::ensure!(
            is_single_token(&config.envelope.local_hostname),
            "local hostname `{}` must be a single non-empty token",
            config.envelope.local_hostname
        );

        if let Some(product_name) = &config.envelope.product_name {
            anyhow::ensure!(
                !product_name.contains(|c: char| c == '\r' || c == '\n'),
                "product name cannot span several lines"
            );
        }

        tracing_subscriber::EnvFilter::try_new(&config.logs.level)
            .map_err(|e| anyhow::anyhow!("invalid log level `{}`: {e}", config.logs.level))?;

        Ok(config)
    }
}
