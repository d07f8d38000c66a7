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
use sendq_common::Protocol;
use sendq_core::{Envelope, RelayMetadata};

///
#[non_exhaustive]
#[derive(clap::Parser)]
#[cfg_attr(test, derive(Debug, PartialEq, Eq))]
#[clap(about, author)]
pub struct Args {
    /// Print the version and exit.
    #[clap(short = 'V', long, action)]
    pub version: bool,

    /// Path of the sendq configuration file (toml format)
    #[clap(short, long, action)]
    pub config: Option<std::path::PathBuf>,

    /// Increase the verbosity of the logs, written on the standard error.
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    ///
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

///
#[non_exhaustive]
#[derive(clap::Subcommand)]
#[cfg_attr(test, derive(Debug, PartialEq, Eq))]
pub enum Commands {
    /// Queue the message read on the standard input, and print its queue id
    Submit {
        /// Envelope sender
        #[clap(short = 'f', long = "from", action)]
        sender: String,
        /// Envelope recipients
        #[clap(required = true, value_parser)]
        recipients: Vec<String>,
        ///
        #[clap(flatten)]
        relay: RelayArgs,
    },
    /// Queue the message read on the standard input once per envelope, and
    /// print the queue ids as json
    SubmitMany {
        /// Sender of the envelopes without their own
        #[clap(short = 'f', long = "from", action)]
        sender: Option<String>,
        /// Envelope, as `name=rcpt[,rcpt...][:sender]`
        #[clap(short, long = "envelope", required = true, value_parser)]
        envelopes: Vec<NamedEnvelope>,
        ///
        #[clap(flatten)]
        relay: RelayArgs,
    },
    /// Print a queue id, without creating any file
    QueueId {
        /// Seconds since epoch, now by default
        #[clap(short, long, action)]
        timestamp: Option<i64>,
        /// Sequence in [0, 3600), random by default
        #[clap(short, long, value_parser = clap::value_parser!(u16).range(0..3600))]
        sequence: Option<u16>,
    },
    /// Show the loaded config (as serialized json format)
    ConfigShow,
}

/// How the message reached this host.
#[derive(Default, clap::Args)]
#[cfg_attr(test, derive(Debug, PartialEq, Eq))]
pub struct RelayArgs {
    /// Protocol the message was received with (smtp or esmtp)
    #[clap(short, long, value_parser)]
    pub protocol: Option<Protocol>,
    /// Name given by the client in HELO/EHLO
    #[clap(long, action)]
    pub helo: Option<String>,
    /// Address of the client
    #[clap(long, action)]
    pub relay_address: Option<String>,
    /// Resolved name of the client
    #[clap(long, action)]
    pub relay_hostname: Option<String>,
    /// Reception time in seconds since epoch, now by default
    #[clap(short, long, action)]
    pub timestamp: Option<i64>,
}

impl From<RelayArgs> for RelayMetadata {
    fn from(value: RelayArgs) -> Self {
        Self {
            timestamp: value.timestamp,
            protocol: value.protocol,
            helo: value.helo,
            relay_address: value.relay_address,
            relay_hostname: value.relay_hostname,
        }
    }
}

/// An envelope given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEnvelope {
    ///
    pub name: String,
    ///
    pub envelope: Envelope,
}

impl std::str::FromStr for NamedEnvelope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = s
            .split_once('=')
            .ok_or_else(|| format!("`{s}` is not `name=rcpt[,rcpt...][:sender]`"))?;
        if name.is_empty() {
            return Err(format!("`{s}` has an empty name"));
        }

        let (recipients, sender) = match rest.split_once(':') {
            Some((recipients, sender)) if !sender.is_empty() => {
                (recipients, Some(sender.to_owned()))
            }
            Some((recipients, _)) => (recipients, None),
            None => (rest, None),
        };

        let recipients = recipients
            .split(',')
            .map(str::trim)
            .filter(|rcpt| !rcpt.is_empty())
            .map(str::to_owned)
            .collect::<Vec<_>>();
        if recipients.is_empty() {
            return Err(format!("envelope `{name}` has no recipient"));
        }

        Ok(Self {
            name: name.to_owned(),
            envelope: Envelope { sender, recipients },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn arg_show_version() {
        assert_eq!(
            Args {
                version: true,
                config: None,
                verbose: 0,
                command: None,
            },
            <Args as clap::Parser>::try_parse_from(["", "--version"]).unwrap()
        );
    }

    #[test]
    fn arg_show_help() {
        assert_eq!(
            <Args as clap::Parser>::try_parse_from(["", "--help"])
                .unwrap_err()
                .kind(),
            clap::error::ErrorKind::DisplayHelp,
        );
    }

    #[test]
    fn arg_submit() {
        assert_eq!(
            Args {
                version: false,
                config: Some("/etc/sendq.toml".into()),
                verbose: 2,
                command: Some(Commands::Submit {
                    sender: "a@b".to_owned(),
                    recipients: vec!["c@d".to_owned(), "e@f".to_owned()],
                    relay: RelayArgs::default(),
                }),
            },
            <Args as clap::Parser>::try_parse_from([
                "",
                "-c",
                "/etc/sendq.toml",
                "-vv",
                "submit",
                "-f",
                "a@b",
                "c@d",
                "e@f"
            ])
            .unwrap()
        );
    }

    #[test]
    fn arg_submit_relayed() {
        assert_eq!(
            Args {
                version: false,
                config: None,
                verbose: 0,
                command: Some(Commands::Submit {
                    sender: "a@b".to_owned(),
                    recipients: vec!["c@d".to_owned()],
                    relay: RelayArgs {
                        protocol: Some(Protocol::Esmtp),
                        helo: Some("client".to_owned()),
                        relay_address: Some("192.0.2.1".to_owned()),
                        relay_hostname: Some("client.example".to_owned()),
                        timestamp: Some(1_234_567_890),
                    },
                }),
            },
            <Args as clap::Parser>::try_parse_from([
                "",
                "submit",
                "--from",
                "a@b",
                "--protocol",
                "ESMTP",
                "--helo",
                "client",
                "--relay-address",
                "192.0.2.1",
                "--relay-hostname",
                "client.example",
                "--timestamp",
                "1234567890",
                "c@d",
            ])
            .unwrap()
        );
    }

    #[test]
    fn arg_submit_without_recipient() {
        assert_eq!(
            <Args as clap::Parser>::try_parse_from(["", "submit", "-f", "a@b"])
                .unwrap_err()
                .kind(),
            clap::error::ErrorKind::MissingRequiredArgument,
        );
    }

    #[test]
    fn arg_submit_many() {
        assert_eq!(
            Args {
                version: false,
                config: None,
                verbose: 0,
                command: Some(Commands::SubmitMany {
                    sender: Some("a@b".to_owned()),
                    envelopes: vec![
                        "sales=s1@x,s2@x".parse().unwrap(),
                        "ops=o@x:bounce@b".parse().unwrap()
                    ],
                    relay: RelayArgs::default(),
                }),
            },
            <Args as clap::Parser>::try_parse_from([
                "",
                "submit-many",
                "-f",
                "a@b",
                "-e",
                "sales=s1@x,s2@x",
                "--envelope",
                "ops=o@x:bounce@b",
            ])
            .unwrap()
        );
    }

    #[test]
    fn arg_queue_id() {
        assert_eq!(
            Args {
                version: false,
                config: None,
                verbose: 0,
                command: Some(Commands::QueueId {
                    timestamp: Some(0),
                    sequence: Some(61),
                }),
            },
            <Args as clap::Parser>::try_parse_from(["", "queue-id", "-t", "0", "-s", "61"])
                .unwrap()
        );

        assert!(
            <Args as clap::Parser>::try_parse_from(["", "queue-id", "-s", "3600"]).is_err()
        );
    }

    #[test]
    fn arg_config_show() {
        assert_eq!(
            Args {
                version: false,
                config: None,
                verbose: 0,
                command: Some(Commands::ConfigShow),
            },
            <Args as clap::Parser>::try_parse_from(["", "config-show"]).unwrap()
        );
    }

    #[rstest::rstest]
    #[case("sales=s1@x", "sales", &["s1@x"], None)]
    #[case("sales=s1@x, s2@x", "sales", &["s1@x", "s2@x"], None)]
    #[case("ops=o@x:bounce@b", "ops", &["o@x"], Some("bounce@b"))]
    #[case("ops=o@x:", "ops", &["o@x"], None)]
    fn named_envelope(
        #[case] input: &str,
        #[case] name: &str,
        #[case] recipients: &[&str],
        #[case] sender: Option<&str>,
    ) {
        let parsed = input.parse::<NamedEnvelope>().unwrap();
        assert_eq!(parsed.name, name);
        assert_eq!(parsed.envelope.recipients, recipients);
        assert_eq!(parsed.envelope.sender.as_deref(), sender);
    }

    #[rstest::rstest]
    #[case("no-equal")]
    #[case("=c@d")]
    #[case("sales=")]
    #[case("sales=:a@b")]
    fn named_envelope_invalid(#[case] input: &str) {
        assert!(input.parse::<NamedEnvelope>().is_err());
    }
}
