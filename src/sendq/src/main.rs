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
use anyhow::Context;
use sendq::Args;
use sendq_config::Config;

fn main() {
    if let Err(err) = try_main() {
        let error = format!("sendq terminating error: '{err}'");

        eprintln!("{error}");
        tracing::error!(error);
        err.chain().skip(1).for_each(|cause| {
            let reason = format!("because: {cause}");

            eprintln!("{reason}");
            tracing::error!(reason);
        });
        std::process::exit(1);
    }
}

fn try_main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();

    if args.version {
        println!(
            "{} v{}\ncommit: {}",
            clap::crate_name!(),
            clap::crate_version!(),
            env!("GIT_HASH")
        );
        return Ok(());
    }

    let config = args.config.as_ref().map_or_else(
        || Ok(Config::default()),
        |path| {
            Config::from_path(path)
                .with_context(|| format!("Cannot parse the configuration '{}'", path.display()))
        },
    )?;

    sendq::tracing_subscriber::initialize(&args, &config)?;

    let Some(command) = args.command else {
        anyhow::bail!("no commands where specified")
    };

    command.execute(
        std::sync::Arc::new(config),
        &mut std::io::stdin().lock(),
        &mut std::io::stdout().lock(),
    )
}
