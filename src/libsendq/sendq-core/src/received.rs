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
use crate::{ControlFile, Error, Result};
use sendq_common::QueueId;

/// Build the `Received` trace header of an envelope.
///
/// ```text
/// Received: from <helo> (<hostname> [<address>])
/// 	by <local hostname> (envelope-sender <sender>) (<product>) with ESMTP id <queue id>
/// 	for <recipient>; Fri, 13 Feb 2009 23:31:30 +0000
/// ```
///
/// A local submission is introduced by `(from <user>@localhost)` instead,
/// the `for` clause is only written for a single recipient. The line is
/// folded before the `by` clause, and stays unfolded without a local
/// hostname.
///
/// # Errors
///
/// * the timestamp cannot be formatted
pub fn received_header(control: &ControlFile, queue_id: &QueueId) -> Result<String> {
    let mut header = String::from("Received: ");

    if control.relay_address().is_some() {
        header.push_str("from ");
        if let Some(helo) = control.helo() {
            header.push_str(helo);
            header.push(' ');
        }
        header.push('(');
        header.push_str(&control.relay_identity());
        header.push(')');
    } else {
        header.push_str(&format!("(from {})", control.relay_identity()));
    }

    let mut clauses = vec![];
    if let Some(local_hostname) = control.local_hostname() {
        clauses.push(format!("by {local_hostname}"));
        if control.protocol().is_some() {
            clauses.push(format!(
                "(envelope-sender <{}>)",
                control.sender().unwrap_or_default()
            ));
        }
    }
    if let Some(product_name) = control.product_name() {
        clauses.push(format!("({product_name})"));
    }
    if let Some(protocol) = control.protocol() {
        clauses.push(format!("with {protocol}"));
    }
    clauses.push(format!("id {queue_id}"));

    header.push_str(if control.local_hostname().is_some() {
        "\n\t"
    } else {
        " "
    });
    header.push_str(&clauses.join(" "));

    if let [rcpt] = control.recipients() {
        header.push_str(&format!("\n\tfor <{rcpt}>"));
    }

    let offset = control.environment().utc_offset(control.timestamp());
    header.push_str("; ");
    header.push_str(&rfc2822_date(control.timestamp(), offset)?);

    Ok(header)
}

/// Format `timestamp` as an RFC 2822 date at the given `offset`.
///
/// # Errors
///
/// * the timestamp is out of the supported range
pub fn rfc2822_date(timestamp: i64, offset: time::UtcOffset) -> Result<String> {
    let datetime = time::OffsetDateTime::from_unix_timestamp(timestamp)
        .map_err(|error| Error::Configuration(format!("invalid timestamp {timestamp}: {error}")))?
        .to_offset(offset);

    let date = datetime
        .format(time::macros::format_description!(
            "[weekday repr:short], [day padding:none] [month repr:short] [year] [hour]:[minute]:[second]"
        ))
        .map_err(|error| Error::Configuration(format!("cannot format date: {error}")))?;

    let minutes = offset.whole_minutes();
    let sign = if minutes < 0 { '-' } else { '+' };
    let minutes = minutes.unsigned_abs();

    Ok(format!("{date} {sign}{:02}{:02}", minutes / 60, minutes % 60))
}
