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
use super::record::Record;
use crate::{allocate_unique_in_directory, Error, QueueDirectory, Result};
use sendq_common::{
    libc_abstraction, Environment, Protocol, QfVersion, QueueId, SystemEnvironment,
    DEFAULT_PRIORITY,
};

/// The control file `qf<id>` of one envelope.
///
/// Lifecycle:
///
/// 1. built with the shared metadata, then [`ControlFile::create_and_lock`]
///    assigns a queue id and keeps the new file open and locked,
/// 2. [`ControlFile::write`] serializes the envelope, exactly once,
/// 3. [`ControlFile::sync`] then [`ControlFile::close`] release it to the
///    queue runner.
///
/// [`ControlFile::unlink`] can be called at any time the file is open, the
/// entry is removed before the lock is released.
#[derive(Debug)]
pub struct ControlFile {
    directory: QueueDirectory,
    environment: std::sync::Arc<dyn Environment>,
    version: QfVersion,
    file_mode: u32,
    queue_id: Option<QueueId>,
    sender: Option<String>,
    recipients: Vec<String>,
    headers: Vec<u8>,
    received_header: Option<String>,
    timestamp: i64,
    priority: i64,
    protocol: Option<Protocol>,
    helo: Option<String>,
    relay_address: Option<String>,
    relay_hostname: Option<String>,
    local_hostname: Option<String>,
    product_name: Option<String>,
    file: Option<std::fs::File>,
}

fn strip_angle_brackets(address: &str) -> String {
    let address = address.trim();
    address
        .strip_prefix('<')
        .and_then(|inner| inner.strip_suffix('>'))
        .unwrap_or(address)
        .to_owned()
}

impl ControlFile {
    /// Default permission bits of the queue files.
    pub const DEFAULT_FILE_MODE: u32 = 0o660;

    /// Empty control file bound to `directory`, timestamped now.
    #[must_use]
    pub fn new(directory: QueueDirectory) -> Self {
        Self::with_environment(directory, std::sync::Arc::new(SystemEnvironment))
    }

    /// Same as [`ControlFile::new`], reading the clock, the pid and the user
    /// from `environment`.
    #[must_use]
    pub fn with_environment(
        directory: QueueDirectory,
        environment: std::sync::Arc<dyn Environment>,
    ) -> Self {
        Self {
            directory,
            timestamp: environment.now(),
            environment,
            version: QfVersion::default(),
            file_mode: Self::DEFAULT_FILE_MODE,
            queue_id: None,
            sender: None,
            recipients: vec![],
            headers: vec![],
            received_header: None,
            priority: DEFAULT_PRIORITY,
            protocol: None,
            helo: None,
            relay_address: None,
            relay_hostname: None,
            local_hostname: None,
            product_name: None,
            file: None,
        }
    }

    /// New control file for another envelope of the same message.
    ///
    /// The directory, the format, the timestamp, the priority, the relay
    /// metadata and the headers are kept. The queue id, the sender, the
    /// recipients, the `Received` header and the file handle are not.
    #[must_use]
    pub fn clone_envelope(&self) -> Self {
        Self {
            directory: self.directory.clone(),
            environment: self.environment.clone(),
            version: self.version,
            file_mode: self.file_mode,
            queue_id: None,
            sender: None,
            recipients: vec![],
            headers: self.headers.clone(),
            received_header: None,
            timestamp: self.timestamp,
            priority: self.priority,
            protocol: self.protocol,
            helo: self.helo.clone(),
            relay_address: self.relay_address.clone(),
            relay_hostname: self.relay_hostname.clone(),
            local_hostname: self.local_hostname.clone(),
            product_name: self.product_name.clone(),
            file: None,
        }
    }

    /// Allocate a queue id, create the control file and lock it.
    ///
    /// # Errors
    ///
    /// * the control file directory does not exist
    /// * the file is already created
    /// * see [`allocate_unique_in_directory`]
    /// * the lock is held by another process
    pub fn create_and_lock(&mut self) -> Result<QueueId> {
        if self.file.is_some() {
            return Err(Error::Configuration(format!(
                "control file {} is already created",
                self.queue_id.as_ref().map_or("", QueueId::as_str)
            )));
        }

        let qf_dir = self.directory.qf_dir();
        if !qf_dir.is_dir() {
            return Err(Error::Configuration(format!(
                "control file directory `{}` does not exist",
                qf_dir.display()
            )));
        }

        let (queue_id, file) = allocate_unique_in_directory(
            &self.directory,
            self.timestamp,
            self.environment.as_ref(),
            self.file_mode,
        )?;
        let path = self.directory.qf_path(&queue_id);

        if let Err(source) =
            libc_abstraction::flock_exclusive(std::os::unix::io::AsRawFd::as_raw_fd(&file))
        {
            if let Err(error) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), %error, "Cannot remove unlocked control file.");
            }
            return Err(Error::Lock { path, source });
        }

        tracing::debug!(%queue_id, path = %path.display(), "Control file created and locked.");

        self.queue_id = Some(queue_id.clone());
        self.file = Some(file);
        Ok(queue_id)
    }

    /// Build the `Received` header of this envelope, written before the other
    /// headers.
    ///
    /// # Errors
    ///
    /// * no queue id is allocated yet
    /// * see [`crate::received_header`]
    pub fn synthesize_received_header(&mut self) -> Result<&str> {
        let queue_id = self.queue_id.as_ref().ok_or_else(|| {
            Error::Configuration("a queue id is required to build the Received header".to_owned())
        })?;
        let header = crate::received_header(self, queue_id)?;
        Ok(self.received_header.insert(header).as_str())
    }

    /// The records of the control file, in the order they are written.
    ///
    /// # Errors
    ///
    /// * the sender is not set
    pub fn records(&self) -> Result<Vec<Record<'_>>> {
        let sender = self.sender.as_deref().ok_or_else(|| {
            Error::Configuration("a sender is required before serialization".to_owned())
        })?;

        let mut records = vec![
            Record::Version(self.version),
            Record::Timestamp(self.timestamp),
            Record::LastProcessed,
            Record::TimesProcessed,
            Record::Priority(self.priority),
            Record::Flags(self.version.default_flags()),
        ];

        if let Some(protocol) = self.protocol {
            records.push(Record::Macro {
                name: "r",
                value: protocol.to_string(),
            });
        }
        if self.version.has_relay_identity() {
            records.push(Record::Macro {
                name: "_",
                value: self.relay_identity(),
            });
        }
        records.push(Record::Macro {
            name: "{daemon_flags}",
            value: String::new(),
        });

        records.push(Record::Sender(sender));
        records.extend(self.recipients.iter().map(|rcpt| Record::Recipient(rcpt)));

        // NOTE: `$` in the header text is not escaped, sendmail expands it.
        records.extend(
            self.received_header
                .iter()
                .flat_map(|header| header.as_bytes().split(|byte| *byte == b'\n'))
                .chain(self.headers.split(|byte| *byte == b'\n'))
                .filter(|line| !line.is_empty())
                .map(Record::Header),
        );

        records.push(Record::Terminator);
        Ok(records)
    }

    /// Serialize the envelope in the open control file.
    ///
    /// Writing appends: call it once.
    ///
    /// # Errors
    ///
    /// * the file is not created, or already closed or unlinked
    /// * the sender is not set
    /// * the write failed
    pub fn write(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Err(Error::WriteWithoutHandle {
                queue_id: self.queue_id.clone(),
            });
        }

        let path = self.queue_filename().unwrap_or_default();
        let mut content = vec![];
        for record in self.records()? {
            record
                .write_to(&mut content)
                .map_err(|source| Error::Write {
                    path: path.clone(),
                    source,
                })?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::WriteWithoutHandle {
                queue_id: self.queue_id.clone(),
            })?;
        std::io::Write::write_all(file, &content)
            .map_err(|source| Error::Write { path, source })?;

        tracing::trace!(queue_id = ?self.queue_id, bytes = content.len(), "Control file written.");
        Ok(())
    }

    /// Flush the control file to the disk.
    ///
    /// Returns `false` if there is no open file.
    ///
    /// # Errors
    ///
    /// * flush or fsync(2) failed
    pub fn sync(&mut self) -> Result<bool> {
        let path = self.queue_filename().unwrap_or_default();
        let Some(file) = self.file.as_mut() else {
            return Ok(false);
        };

        std::io::Write::flush(file)
            .and_then(|()| file.sync_all())
            .map_err(|source| Error::Sync { path, source })?;
        Ok(true)
    }

    /// Close the control file, releasing its lock.
    ///
    /// Returns `false` if there is no open file.
    ///
    /// # Errors
    ///
    /// * close(2) failed
    pub fn close(&mut self) -> Result<bool> {
        let Some(file) = self.file.take() else {
            return Ok(false);
        };

        let path = self.queue_filename().unwrap_or_default();
        libc_abstraction::close(file).map_err(|source| Error::Close { path, source })?;

        tracing::debug!(queue_id = ?self.queue_id, "Control file closed.");
        Ok(true)
    }

    /// Remove the control file while still holding its lock, then drop the
    /// handle.
    ///
    /// Returns `false` when there is no file to remove or no open handle, or
    /// when the removal failed. A failure is logged and the handle is kept.
    pub fn unlink(&mut self) -> bool {
        let Some(path) = self.queue_filename() else {
            return false;
        };
        if self.file.is_none() {
            return false;
        }

        if let Err(error) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), %error, "Cannot remove control file.");
            return false;
        }
        drop(self.file.take());

        tracing::debug!(path = %path.display(), "Control file removed.");
        true
    }

    /// Path of the control file, `None` until a queue id is allocated.
    #[must_use]
    pub fn queue_filename(&self) -> Option<std::path::PathBuf> {
        self.queue_id.as_ref().map(|id| self.directory.qf_path(id))
    }

    /// `host [addr]` of the relay, or the local user.
    pub(crate) fn relay_identity(&self) -> String {
        match &self.relay_address {
            Some(address) => {
                let bracketed = format!("[{address}]");
                match &self.relay_hostname {
                    Some(hostname) if !hostname.eq_ignore_ascii_case(&bracketed) => {
                        format!("{hostname} {bracketed}")
                    }
                    _ => bracketed,
                }
            }
            None => format!("{}@localhost", self.environment.username()),
        }
    }

    pub(crate) fn environment(&self) -> &dyn Environment {
        self.environment.as_ref()
    }
}

impl ControlFile {
    /// Envelope sender, the angle brackets are removed.
    pub fn set_sender(&mut self, sender: &str) -> &mut Self {
        self.sender = Some(strip_angle_brackets(sender));
        self
    }

    /// Append a recipient, the angle brackets are removed.
    pub fn add_recipient(&mut self, rcpt: &str) -> &mut Self {
        self.recipients.push(strip_angle_brackets(rcpt));
        self
    }

    /// Replace the recipients.
    pub fn set_recipients<'a>(&mut self, rcpts: impl IntoIterator<Item = &'a str>) -> &mut Self {
        self.recipients = rcpts.into_iter().map(strip_angle_brackets).collect();
        self
    }

    /// Header block of the message, one header line per `\n` terminated line.
    /// The bytes are written as given.
    pub fn set_headers(&mut self, headers: impl Into<Vec<u8>>) -> &mut Self {
        self.headers = headers.into();
        self
    }

    /// Creation time of the envelope. The queue id is derived from it, so it
    /// must be set before [`ControlFile::create_and_lock`].
    pub fn set_timestamp(&mut self, timestamp: i64) -> &mut Self {
        self.timestamp = timestamp;
        self
    }

    ///
    pub fn set_priority(&mut self, priority: i64) -> &mut Self {
        self.priority = priority;
        self
    }

    ///
    pub fn set_protocol(&mut self, protocol: Option<Protocol>) -> &mut Self {
        self.protocol = protocol;
        self
    }

    /// Name given by the client in its HELO/EHLO command.
    pub fn set_helo(&mut self, helo: impl Into<String>) -> &mut Self {
        self.helo = Some(helo.into());
        self
    }

    /// Address of the client, with or without the square brackets.
    pub fn set_relay_address(&mut self, address: &str) -> &mut Self {
        let address = address.trim();
        self.relay_address = Some(
            address
                .strip_prefix('[')
                .and_then(|inner| inner.strip_suffix(']'))
                .unwrap_or(address)
                .to_owned(),
        );
        self
    }

    /// Resolved name of the client.
    pub fn set_relay_hostname(&mut self, hostname: impl Into<String>) -> &mut Self {
        self.relay_hostname = Some(hostname.into());
        self
    }

    ///
    pub fn set_local_hostname(&mut self, hostname: impl Into<String>) -> &mut Self {
        self.local_hostname = Some(hostname.into());
        self
    }

    ///
    pub fn set_product_name(&mut self, product_name: impl Into<String>) -> &mut Self {
        self.product_name = Some(product_name.into());
        self
    }

    ///
    pub fn set_version(&mut self, version: QfVersion) -> &mut Self {
        self.version = version;
        self
    }

    /// Permission bits of the file, see [`ControlFile::DEFAULT_FILE_MODE`].
    pub fn set_file_mode(&mut self, file_mode: u32) -> &mut Self {
        self.file_mode = file_mode;
        self
    }
}

impl ControlFile {
    ///
    #[must_use]
    pub const fn directory(&self) -> &QueueDirectory {
        &self.directory
    }

    ///
    #[must_use]
    pub const fn queue_id(&self) -> Option<&QueueId> {
        self.queue_id.as_ref()
    }

    ///
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    ///
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    ///
    #[must_use]
    pub fn headers(&self) -> &[u8] {
        &self.headers
    }

    ///
    #[must_use]
    pub fn received_header(&self) -> Option<&str> {
        self.received_header.as_deref()
    }

    ///
    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    ///
    #[must_use]
    pub const fn priority(&self) -> i64 {
        self.priority
    }

    ///
    #[must_use]
    pub const fn protocol(&self) -> Option<Protocol> {
        self.protocol
    }

    ///
    #[must_use]
    pub fn helo(&self) -> Option<&str> {
        self.helo.as_deref()
    }

    ///
    #[must_use]
    pub fn relay_address(&self) -> Option<&str> {
        self.relay_address.as_deref()
    }

    ///
    #[must_use]
    pub fn relay_hostname(&self) -> Option<&str> {
        self.relay_hostname.as_deref()
    }

    ///
    #[must_use]
    pub fn local_hostname(&self) -> Option<&str> {
        self.local_hostname.as_deref()
    }

    ///
    #[must_use]
    pub fn product_name(&self) -> Option<&str> {
        self.product_name.as_deref()
    }

    ///
    #[must_use]
    pub const fn version(&self) -> QfVersion {
        self.version
    }

    ///
    #[must_use]
    pub const fn file_mode(&self) -> u32 {
        self.file_mode
    }

    /// The file is created and neither closed nor unlinked.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.file.is_some()
    }
}
