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

/// How the message reached this host, shared by all its envelopes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayMetadata {
    /// Reception time, now if missing.
    pub timestamp: Option<i64>,
    /// Protocol of the reception, the configured one if missing.
    pub protocol: Option<Protocol>,
    /// Name given in the HELO/EHLO command.
    pub helo: Option<String>,
    /// Address of the client.
    pub relay_address: Option<String>,
    /// Resolved name of the client.
    pub relay_hostname: Option<String>,
}

/// A raw message, split in its header block and its body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Message {
    headers: Vec<u8>,
    body: Vec<u8>,
}

impl Message {
    ///
    #[must_use]
    pub fn new(headers: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: headers.into(),
            body: body.into(),
        }
    }

    /// Split a RFC 2822 message at its first empty line.
    ///
    /// The line endings are normalized to `\n`, the other bytes are kept as
    /// they are, 8-bit header text included. A message without an empty line
    /// has no body.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let mut normalized = Vec::with_capacity(raw.len());
        let mut bytes = raw.iter().peekable();
        while let Some(&byte) = bytes.next() {
            if byte == b'\r' && bytes.peek() == Some(&&b'\n') {
                continue;
            }
            normalized.push(byte);
        }

        if normalized.first() == Some(&b'\n') {
            return Self {
                headers: vec![],
                body: normalized.split_off(1),
            };
        }

        match normalized.windows(2).position(|window| window == b"\n\n") {
            Some(position) => {
                let body = normalized.split_off(position + 2);
                normalized.truncate(position + 1);
                Self {
                    headers: normalized,
                    body,
                }
            }
            None => Self {
                headers: normalized,
                body: vec![],
            },
        }
    }

    /// Header block, each line `\n` terminated.
    #[must_use]
    pub fn headers(&self) -> &[u8] {
        &self.headers
    }

    ///
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    ///
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.headers, self.body)
    }
}

/// A recipient group of a message, queued under its own queue id.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Overrides the sender of the submission.
    pub sender: Option<String>,
    ///
    pub recipients: Vec<String>,
}

impl Envelope {
    /// The sender of this envelope, or the default one.
    #[must_use]
    pub fn resolve_sender<'a>(&'a self, default: Option<&'a str>) -> Option<&'a str> {
        self.sender.as_deref().or(default)
    }
}

/// One envelope to queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    ///
    pub sender: String,
    ///
    pub recipients: Vec<String>,
    ///
    pub message: Message,
    ///
    pub metadata: RelayMetadata,
}

/// Several envelopes sharing one body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiSubmission {
    /// Sender of the envelopes without their own.
    pub sender: Option<String>,
    /// Envelopes by name, queued in the order of the names.
    pub envelopes: std::collections::BTreeMap<String, Envelope>,
    ///
    pub message: Message,
    ///
    pub metadata: RelayMetadata,
}
