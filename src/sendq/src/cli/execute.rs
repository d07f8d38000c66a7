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
use crate::cli::args::Commands;
use anyhow::Context;
use sendq_common::{Environment, QueueIdTemplate, SystemEnvironment};
use sendq_config::Config;
use sendq_core::{Message, MultiSubmission, QueueManager, Submission};

impl Commands {
    /// Execute the command, reading the message on `input` and printing the
    /// result on `output`.
    ///
    /// # Errors
    ///
    /// * the queue directory of the configuration cannot be used
    /// * the message cannot be read
    /// * the message cannot be queued
    pub fn execute(
        self,
        config: std::sync::Arc<Config>,
        input: &mut impl std::io::Read,
        output: &mut impl std::io::Write,
    ) -> anyhow::Result<()> {
        match self {
            Self::Submit {
                sender,
                recipients,
                relay,
            } => {
                let manager = init_manager(config)?;
                let message = read_message(input)?;

                let queue_id = manager
                    .submit(Submission {
                        sender,
                        recipients,
                        message,
                        metadata: relay.into(),
                    })
                    .context("Cannot queue the message")?;

                writeln!(output, "{queue_id}")?;
            }
            Self::SubmitMany {
                sender,
                envelopes,
                relay,
            } => {
                let mut named = std::collections::BTreeMap::new();
                for envelope in envelopes {
                    if named
                        .insert(envelope.name.clone(), envelope.envelope)
                        .is_some()
                    {
                        anyhow::bail!("envelope `{}` is given twice", envelope.name);
                    }
                }

                let manager = init_manager(config)?;
                let message = read_message(input)?;

                let queued = manager
                    .submit_many(MultiSubmission {
                        sender,
                        envelopes: named,
                        message,
                        metadata: relay.into(),
                    })
                    .context("Cannot queue the envelopes")?;

                writeln!(output, "{}", serde_json::to_string_pretty(&queued)?)?;
            }
            Self::QueueId {
                timestamp,
                sequence,
            } => {
                let environment = SystemEnvironment;
                let template = QueueIdTemplate::generate(
                    timestamp.unwrap_or_else(|| environment.now()),
                    environment.pid(),
                )?;

                writeln!(
                    output,
                    "{}",
                    template.fill(sequence.unwrap_or_else(|| environment.initial_sequence()))
                )?;
            }
            Self::ConfigShow => {
                writeln!(output, "{}", serde_json::to_string_pretty(config.as_ref())?)?;
            }
        }

        Ok(())
    }
}

fn init_manager(config: std::sync::Arc<Config>) -> anyhow::Result<std::sync::Arc<QueueManager>> {
    let dirpath = config.queue.dirpath.clone();
    QueueManager::init(config)
        .with_context(|| format!("Cannot use the queue directory '{}'", dirpath.display()))
}

fn read_message(input: &mut impl std::io::Read) -> anyhow::Result<Message> {
    let mut raw = vec![];
    input
        .read_to_end(&mut raw)
        .context("Cannot read the message")?;

    Ok(Message::parse(&raw))
}
