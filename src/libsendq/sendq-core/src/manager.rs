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
    ControlFile, DataFile, Envelope, Error, LinkTarget, Message, MultiSubmission, QueueDirectory,
    RelayMetadata, Result, Submission,
};
use sendq_common::{Environment, QueueId, SystemEnvironment};
use sendq_config::Config;

/// Write envelopes in the queue directory of the configuration.
#[derive(Debug)]
pub struct QueueManager {
    config: std::sync::Arc<Config>,
    directory: QueueDirectory,
    environment: std::sync::Arc<dyn Environment>,
}

/// Remove the files of an envelope which failed.
///
/// The data file is kept when the control file cannot be removed, a queue
/// entry is either complete or absent.
fn rollback(control: &mut ControlFile, data: &mut DataFile) {
    if control.unlink() && data.is_created() {
        data.unlink();
    }
}

impl QueueManager {
    /// Bind the queue directory of the configuration.
    ///
    /// # Errors
    ///
    /// * the queue directory does not exist
    pub fn init(config: std::sync::Arc<Config>) -> Result<std::sync::Arc<Self>> {
        Self::with_environment(config, std::sync::Arc::new(SystemEnvironment))
    }

    /// Same as [`QueueManager::init`] with another clock, pid and user.
    ///
    /// # Errors
    ///
    /// * the queue directory does not exist
    pub fn with_environment(
        config: std::sync::Arc<Config>,
        environment: std::sync::Arc<dyn Environment>,
    ) -> Result<std::sync::Arc<Self>> {
        let directory = QueueDirectory::open(&config.queue.dirpath)?;

        Ok(std::sync::Arc::new(Self {
            config,
            directory,
            environment,
        }))
    }

    ///
    #[must_use]
    pub const fn directory(&self) -> &QueueDirectory {
        &self.directory
    }

    /// Control file holding the values shared by all the envelopes of a
    /// message.
    #[must_use]
    pub fn control_file_template(&self, headers: &[u8], metadata: &RelayMetadata) -> ControlFile {
        let mut control =
            ControlFile::with_environment(self.directory.clone(), self.environment.clone());

        control
            .set_version(self.config.queue.version)
            .set_file_mode(self.config.queue.file_mode)
            .set_priority(self.config.queue.priority)
            .set_local_hostname(self.config.envelope.local_hostname.clone())
            .set_protocol(metadata.protocol.or(self.config.envelope.protocol))
            .set_headers(headers);

        if let Some(product_name) = &self.config.envelope.product_name {
            control.set_product_name(product_name.clone());
        }
        if let Some(timestamp) = metadata.timestamp {
            control.set_timestamp(timestamp);
        }
        if let Some(helo) = &metadata.helo {
            control.set_helo(helo.clone());
        }
        if let Some(relay_address) = &metadata.relay_address {
            control.set_relay_address(relay_address);
        }
        if let Some(relay_hostname) = &metadata.relay_hostname {
            control.set_relay_hostname(relay_hostname.clone());
        }

        control
    }

    /// Write the data file then the control file of a created envelope, and
    /// release it to the queue runner.
    ///
    /// `control` must be created and locked, its `Received` header is built if
    /// missing. On failure both files are removed before returning the error.
    ///
    /// # Errors
    ///
    /// * see [`DataFile::write`] and [`ControlFile::write`]
    /// * the control file or the directory cannot be synced
    #[tracing::instrument(skip_all, fields(queue_id = ?control.queue_id()), err)]
    pub fn enqueue_one(&self, control: &mut ControlFile, data: &mut DataFile) -> Result<()> {
        if let Err(error) = self.write_pair(control, data) {
            rollback(control, data);
            return Err(error);
        }

        control.close()?;
        tracing::info!("Envelope queued.");
        Ok(())
    }

    fn write_pair(&self, control: &mut ControlFile, data: &mut DataFile) -> Result<()> {
        if control.received_header().is_none() {
            control.synthesize_received_header()?;
        }
        data.write()?;
        control.write()?;
        control.sync()?;
        self.directory.sync()
    }

    /// Queue several envelopes of one message, their data files are hard
    /// links to a single body.
    ///
    /// The envelopes are processed in the order of their names. The data file
    /// of an envelope exists before its control file is written, and the
    /// control files stay locked until every envelope is written and the
    /// directory is synced. If one envelope fails, every file of the batch is
    /// removed.
    ///
    /// # Errors
    ///
    /// * no envelope is given
    /// * [`Error::Envelope`] naming the envelope which failed
    /// * the directory cannot be synced
    #[tracing::instrument(skip_all, fields(envelopes = envelopes.len()), err)]
    pub fn enqueue_many(
        &self,
        message: Message,
        default_sender: Option<&str>,
        envelopes: &std::collections::BTreeMap<String, Envelope>,
        metadata: &RelayMetadata,
    ) -> Result<std::collections::BTreeMap<String, QueueId>> {
        if envelopes.is_empty() {
            return Err(Error::Configuration("no envelope to queue".to_owned()));
        }

        let (headers, body) = message.into_parts();
        let template = self.control_file_template(&headers, metadata);
        let mut body = Some(body);
        let mut staged = Vec::<(&String, ControlFile, DataFile)>::with_capacity(envelopes.len());

        for (name, envelope) in envelopes {
            let mut control = template.clone_envelope();
            let mut data = DataFile::new(self.directory.clone());
            data.set_file_mode(self.config.queue.file_mode);

            let first = staged.first().map(|(_, _, first)| first);
            let outcome = Self::stage_envelope(
                &mut control,
                &mut data,
                envelope,
                default_sender,
                first,
                &mut body,
            );

            if let Err(source) = outcome {
                tracing::warn!(envelope = %name, error = %source, "Envelope failed, rolling back.");
                rollback(&mut control, &mut data);
                for (_, control, data) in &mut staged {
                    rollback(control, data);
                }
                return Err(Error::Envelope {
                    name: name.clone(),
                    source: Box::new(source),
                });
            }
            staged.push((name, control, data));
        }

        if let Err(error) = self.directory.sync() {
            for (_, control, data) in &mut staged {
                rollback(control, data);
            }
            return Err(error);
        }

        let mut queued = std::collections::BTreeMap::new();
        for (name, mut control, _) in staged {
            control.close().map_err(|source| Error::Envelope {
                name: name.clone(),
                source: Box::new(source),
            })?;
            if let Some(queue_id) = control.queue_id() {
                queued.insert(name.clone(), queue_id.clone());
            }
        }

        tracing::info!(?queued, "Envelopes queued.");
        Ok(queued)
    }

    fn stage_envelope(
        control: &mut ControlFile,
        data: &mut DataFile,
        envelope: &Envelope,
        default_sender: Option<&str>,
        first: Option<&DataFile>,
        body: &mut Option<Vec<u8>>,
    ) -> Result<()> {
        let sender = envelope
            .resolve_sender(default_sender)
            .ok_or_else(|| Error::Configuration("the envelope has no sender".to_owned()))?;
        if envelope.recipients.is_empty() {
            return Err(Error::Configuration(
                "the envelope has no recipient".to_owned(),
            ));
        }

        control
            .set_sender(sender)
            .set_recipients(envelope.recipients.iter().map(String::as_str));

        let queue_id = control.create_and_lock()?;

        data.set_queue_id(queue_id);
        match first {
            Some(first) => data.hardlink_to(LinkTarget::DataFile(first))?,
            None => {
                data.set_source(body.take().unwrap_or_default());
                data.write()?;
            }
        }

        control.synthesize_received_header()?;
        control.write()?;
        control.sync()?;
        Ok(())
    }

    /// Queue one envelope.
    ///
    /// # Errors
    ///
    /// * the envelope has no recipient
    /// * see [`ControlFile::create_and_lock`] and [`QueueManager::enqueue_one`]
    #[tracing::instrument(
        skip_all,
        fields(sender = %submission.sender, recipients = submission.recipients.len())
    )]
    pub fn submit(&self, submission: Submission) -> Result<QueueId> {
        let Submission {
            sender,
            recipients,
            message,
            metadata,
        } = submission;

        if recipients.is_empty() {
            return Err(Error::Configuration(
                "the envelope has no recipient".to_owned(),
            ));
        }

        let (headers, body) = message.into_parts();
        let mut control = self.control_file_template(&headers, &metadata);
        control
            .set_sender(&sender)
            .set_recipients(recipients.iter().map(String::as_str));

        let queue_id = control.create_and_lock()?;

        let mut data = DataFile::for_control_file(&control);
        data.set_source(body);

        self.enqueue_one(&mut control, &mut data)?;
        Ok(queue_id)
    }

    /// Queue several envelopes sharing one body.
    ///
    /// # Errors
    ///
    /// * see [`QueueManager::enqueue_many`]
    pub fn submit_many(
        &self,
        submission: MultiSubmission,
    ) -> Result<std::collections::BTreeMap<String, QueueId>> {
        let MultiSubmission {
            sender,
            envelopes,
            message,
            metadata,
        } = submission;

        self.enqueue_many(message, sender.as_deref(), &envelopes, &metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataSource, Layout};
    use pretty_assertions::assert_eq;
    use sendq_common::{FixedEnvironment, Protocol, QfVersion};

    fn manager(dir: &std::path::Path) -> std::sync::Arc<QueueManager> {
        manager_with(dir, FixedEnvironment::default())
    }

    fn manager_with(
        dir: &std::path::Path,
        environment: FixedEnvironment,
    ) -> std::sync::Arc<QueueManager> {
        let mut config = Config::default();
        config.queue.dirpath = dir.to_path_buf();
        config.envelope.local_hostname = "mx.example".to_owned();
        config.envelope.product_name = Some("sendq".to_owned());
        QueueManager::with_environment(std::sync::Arc::new(config), std::sync::Arc::new(environment))
            .unwrap()
    }

    fn entries(dir: &std::path::Path) -> Vec<String> {
        let mut entries = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        entries.sort();
        entries
    }

    fn submission(recipients: &[&str]) -> Submission {
        Submission {
            sender: "a@b".to_owned(),
            recipients: recipients.iter().map(ToString::to_string).collect(),
            message: Message::parse(b"From: a@b\r\nSubject: hi\r\n\r\nhello\r\n"),
            metadata: RelayMetadata::default(),
        }
    }

    fn envelope(recipients: &[&str]) -> Envelope {
        Envelope {
            sender: None,
            recipients: recipients.iter().map(ToString::to_string).collect(),
        }
    }

    struct FailingReader;

    impl std::io::Read for FailingReader {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"))
        }
    }

    #[test]
    fn missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.queue.dirpath = dir.path().join("nope");

        assert!(matches!(
            QueueManager::init(std::sync::Arc::new(config)),
            Err(Error::Configuration(_))
        ));
        assert!(!dir.path().join("nope").exists());
    }

    #[test]
    fn submit() {
        let dir = tempfile::tempdir().unwrap();
        let queue_id = manager(dir.path()).submit(submission(&["c@d"])).unwrap();

        assert_eq!(queue_id.as_str(), "n1DNVU00004242");
        assert_eq!(
            entries(dir.path()),
            ["dfn1DNVU00004242", "qfn1DNVU00004242"]
        );
        assert_eq!(
            std::fs::read(dir.path().join("dfn1DNVU00004242")).unwrap(),
            b"hello\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("qfn1DNVU00004242")).unwrap(),
            [
                "V6",
                "T1234567890",
                "K0",
                "N0",
                "P30000",
                "F",
                "${daemon_flags}",
                "S<a@b>",
                "C:<c@d>",
                "rRFC822; c@d",
                "RPFD:c@d",
                "H??Received: (from mailer@localhost)",
                "\tby mx.example (sendq) id n1DNVU00004242",
                "\tfor <c@d>; Fri, 13 Feb 2009 23:31:30 +0000",
                "H??From: a@b",
                "H??Subject: hi",
                ".",
                "",
            ]
            .join("\n")
        );
    }

    #[test]
    fn submit_relayed() {
        let dir = tempfile::tempdir().unwrap();
        let mut submission = submission(&["c@d", "e@f"]);
        submission.metadata = RelayMetadata {
            timestamp: Some(1_700_000_000),
            protocol: Some(Protocol::Esmtp),
            helo: Some("client".to_owned()),
            relay_address: Some("192.0.2.1".to_owned()),
            relay_hostname: None,
        };

        let queue_id = manager(dir.path()).submit(submission).unwrap();
        assert_eq!(queue_id.as_str(), "3AEMDK00004242");

        let qf = std::fs::read_to_string(dir.path().join("qf3AEMDK00004242")).unwrap();
        assert!(qf.contains("T1700000000\n"));
        assert!(qf.contains("$rESMTP\n"));
        assert!(qf.contains(
            "H??Received: from client ([192.0.2.1])\n\tby mx.example (envelope-sender <a@b>) (sendq) with ESMTP id 3AEMDK00004242; "
        ));
        assert!(qf.contains("C:<e@f>\nrRFC822; e@f\nRPFD:e@f\n"));
    }

    #[test]
    fn submit_without_recipient() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            manager(dir.path()).submit(submission(&[])),
            Err(Error::Configuration(_))
        ));
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn failed_enqueue_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        let mut control = manager.control_file_template(b"Subject: x\n", &RelayMetadata::default());
        control.set_sender("a@b").add_recipient("c@d");
        control.create_and_lock().unwrap();

        let mut data = DataFile::for_control_file(&control);
        data.set_source(DataSource::Reader(Box::new(FailingReader)));

        assert!(matches!(
            manager.enqueue_one(&mut control, &mut data),
            Err(Error::Write { .. })
        ));
        assert!(entries(dir.path()).is_empty());
        assert!(!control.is_open());
    }

    #[test]
    fn existing_data_file_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        let mut control = manager.control_file_template(b"", &RelayMetadata::default());
        control.set_sender("a@b").add_recipient("c@d");
        let queue_id = control.create_and_lock().unwrap();
        std::fs::write(dir.path().join(format!("df{queue_id}")), "theirs").unwrap();

        let mut data = DataFile::for_control_file(&control);
        data.set_source(b"ours".to_vec());

        assert!(matches!(
            manager.enqueue_one(&mut control, &mut data),
            Err(Error::FileExists { .. })
        ));
        assert_eq!(entries(dir.path()), [format!("df{queue_id}")]);
    }

    #[test]
    fn enqueue_many_shares_the_body() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        let envelopes: std::collections::BTreeMap<_, _> = [
            ("sales".to_owned(), envelope(&["s1@x", "s2@x"])),
            (
                "ops".to_owned(),
                Envelope {
                    sender: Some("<bounce@b>".to_owned()),
                    recipients: vec!["o@x".to_owned()],
                },
            ),
        ]
        .into_iter()
        .collect();

        let queued = manager
            .enqueue_many(
                Message::parse(b"Subject: hi\n\nbody\n"),
                Some("a@b"),
                &envelopes,
                &RelayMetadata::default(),
            )
            .unwrap();

        assert_eq!(queued.len(), 2);
        assert_eq!(queued["ops"].as_str(), "n1DNVU00004242");
        assert_eq!(queued["sales"].as_str(), "n1DNVU01004242");

        let inodes = queued
            .values()
            .map(|id| {
                let df = manager.directory().df_path(id);
                assert_eq!(std::fs::read(&df).unwrap(), b"body\n");
                std::os::unix::fs::MetadataExt::ino(&std::fs::metadata(df).unwrap())
            })
            .collect::<Vec<_>>();
        assert_eq!(inodes[0], inodes[1]);

        let ops = std::fs::read_to_string(manager.directory().qf_path(&queued["ops"])).unwrap();
        assert!(ops.contains("S<bounce@b>\n"));
        assert!(ops.contains("\tfor <o@x>; "));

        let sales =
            std::fs::read_to_string(manager.directory().qf_path(&queued["sales"])).unwrap();
        assert!(sales.contains("S<a@b>\n"));
        assert!(!sales.contains("\tfor <"));
        assert!(sales.contains("C:<s1@x>\n"));
        assert!(sales.contains("C:<s2@x>\n"));
    }

    #[test]
    fn enqueue_many_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        let envelopes: std::collections::BTreeMap<_, _> = [
            ("a-first".to_owned(), envelope(&["c@d"])),
            ("b-second".to_owned(), envelope(&["e@f"])),
        ]
        .into_iter()
        .collect();

        match manager.enqueue_many(
            Message::parse(b"Subject: hi\n\nbody\n"),
            None,
            &envelopes,
            &RelayMetadata::default(),
        ) {
            Err(Error::Envelope { name, source }) => {
                assert_eq!(name, "a-first");
                assert!(matches!(*source, Error::Configuration(_)));
            }
            otherwise => panic!("unexpected {otherwise:?}"),
        }
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn enqueue_many_rolls_back_previous_envelopes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        let envelopes: std::collections::BTreeMap<_, _> = [
            ("a-first".to_owned(), envelope(&["c@d"])),
            ("b-second".to_owned(), envelope(&[])),
        ]
        .into_iter()
        .collect();

        match manager.enqueue_many(
            Message::parse(b"Subject: hi\n\nbody\n"),
            Some("a@b"),
            &envelopes,
            &RelayMetadata::default(),
        ) {
            Err(Error::Envelope { name, .. }) => assert_eq!(name, "b-second"),
            otherwise => panic!("unexpected {otherwise:?}"),
        }
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn control_file_written_after_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let mut control =
            manager.control_file_template(b"Subject: hi\n", &RelayMetadata::default());
        let mut data = DataFile::new(manager.directory().clone());
        let mut gone = DataFile::new(manager.directory().clone());
        gone.set_queue_id("n1DNVUxx004242".parse().unwrap());

        let outcome = QueueManager::stage_envelope(
            &mut control,
            &mut data,
            &envelope(&["c@d"]),
            Some("a@b"),
            Some(&gone),
            &mut None,
        );
        assert!(matches!(outcome, Err(Error::HardlinkTargetMissing { .. })));

        let qf = control.queue_filename().unwrap();
        assert!(std::fs::read(&qf).unwrap().is_empty());
        assert!(!manager.directory().df_path(control.queue_id().unwrap()).exists());

        rollback(&mut control, &mut data);
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn enqueue_many_keeps_eight_bit_headers() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let envelopes: std::collections::BTreeMap<_, _> = [("only".to_owned(), envelope(&["c@d"]))]
            .into_iter()
            .collect();

        let queued = manager
            .enqueue_many(
                Message::parse(b"Subject: caf\xe9\r\n\r\nbody\r\n"),
                Some("a@b"),
                &envelopes,
                &RelayMetadata::default(),
            )
            .unwrap();

        let qf = std::fs::read(manager.directory().qf_path(&queued["only"])).unwrap();
        assert!(qf.ends_with(b"H??Subject: caf\xe9\n.\n"));
    }

    #[test]
    fn enqueue_many_split_layout_without_df() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("qf")).unwrap();
        std::fs::create_dir(dir.path().join("df")).unwrap();
        let manager = manager(dir.path());
        assert_eq!(manager.directory().layout(), Layout::Split);
        std::fs::remove_dir(dir.path().join("df")).unwrap();

        let envelopes: std::collections::BTreeMap<_, _> = [("only".to_owned(), envelope(&["c@d"]))]
            .into_iter()
            .collect();

        match manager.enqueue_many(
            Message::parse(b"Subject: hi\n\nbody\n"),
            Some("a@b"),
            &envelopes,
            &RelayMetadata::default(),
        ) {
            Err(Error::Envelope { name, source }) => {
                assert_eq!(name, "only");
                assert!(matches!(*source, Error::QueueFileCreate { .. }));
            }
            otherwise => panic!("unexpected {otherwise:?}"),
        }
        assert!(entries(&dir.path().join("qf")).is_empty());
    }

    #[test]
    fn enqueue_many_without_envelope() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            manager(dir.path()).enqueue_many(
                Message::default(),
                Some("a@b"),
                &std::collections::BTreeMap::new(),
                &RelayMetadata::default(),
            ),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn submit_many_v8() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.queue.dirpath = dir.path().to_path_buf();
        config.queue.version = QfVersion::V8;
        config.envelope.local_hostname = "mx.example".to_owned();
        config.envelope.product_name = None;
        let manager = QueueManager::with_environment(
            std::sync::Arc::new(config),
            std::sync::Arc::new(FixedEnvironment {
                initial_sequence: 3599,
                ..FixedEnvironment::default()
            }),
        )
        .unwrap();

        let queued = manager
            .submit_many(MultiSubmission {
                sender: Some("a@b".to_owned()),
                envelopes: [("one".to_owned(), envelope(&["c@d"]))]
                    .into_iter()
                    .collect(),
                message: Message::parse(b"Subject: hi\n\nbody\n"),
                metadata: RelayMetadata::default(),
            })
            .unwrap();

        let queue_id = &queued["one"];
        assert_eq!(queue_id.as_str(), "n1DNVUxx004242");
        let qf = std::fs::read_to_string(manager.directory().qf_path(queue_id)).unwrap();
        assert!(qf.starts_with("V8\n"));
        assert!(qf.contains("Fs\n$_mailer@localhost\n${daemon_flags}\n"));
        assert!(qf.contains("\tby mx.example id "));
    }
}
