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
use crate::Args;
use sendq_config::Config;

#[cfg(debug_assertions)]
macro_rules! get_fmt {
    () => {
        tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_ansi(false)
    };
}

#[cfg(not(debug_assertions))]
macro_rules! get_fmt {
    () => {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_ansi(false)
    };
}

/// Filter directives of the run: the configured level, raised by each
/// `--verbose` flag.
#[must_use]
pub fn level(args: &Args, config: &Config) -> String {
    match args.verbose {
        0 => config.logs.level.clone(),
        1 => "info".to_owned(),
        2 => "debug".to_owned(),
        _ => "trace".to_owned(),
    }
}

/// Initialize the tracing subsystem.
///
/// The logs are appended to `logs.filepath` if set, written on the standard
/// error otherwise.
///
/// # Errors
///
/// * the filter directives are invalid
/// * the logs path in the configuration file is invalid
/// * failed to initialize the tracing subsystem
pub fn initialize(args: &Args, config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_new(level(args, config))?;
    let subscriber = tracing_subscriber::registry().with(filter);

    match &config.logs.filepath {
        Some(filepath) => {
            let writer = if let (Some(directory), Some(file_name)) = (
                filepath.parent(),
                filepath.file_name().and_then(std::ffi::OsStr::to_str),
            ) {
                tracing_appender::rolling::never(directory, file_name)
            } else {
                anyhow::bail!(
                    "filepath for logs at {filepath:?} does not have a parent or is not valid"
                )
            };

            subscriber.with(get_fmt!().with_writer(writer)).try_init()
        }
        None => subscriber
            .with(get_fmt!().with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|e| anyhow::anyhow!("{e}"))
}
