//! Structured mail description, RFC 5322 header serialization, and the
//! dot-stuffed DATA content stream (spec §3, §4.6).

use core::fmt::Write as _;

use crate::{clock::RfcDate, error::Error, io::ByteWriter, transport::Transport};

/// An address plus an optional display name (spec §3, "Mailbox").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mailbox<'a> {
    pub address: &'a str,
    pub display_name: Option<&'a str>,
}

impl<'a> Mailbox<'a> {
    pub const fn new(address: &'a str) -> Self {
        Mailbox {
            address,
            display_name: None,
        }
    }

    pub const fn with_name(address: &'a str, display_name: &'a str) -> Self {
        Mailbox {
            address,
            display_name: Some(display_name),
        }
    }
}

/// A complete mail transaction built from structured fields (spec §3,
/// "Structured Message"). `to`/`cc`/`bcc` are caller-owned slices — this
/// crate never collects into a `Vec`.
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    pub from: Mailbox<'a>,
    pub to: &'a [Mailbox<'a>],
    pub cc: &'a [Mailbox<'a>],
    pub bcc: &'a [Mailbox<'a>],
    pub subject: Option<&'a str>,
    pub body: Option<&'a str>,
}

/// The raw-envelope send path (spec §3, "Envelope"). `sender_addr` may be
/// empty, which maps to `MAIL FROM:<>`.
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a> {
    pub sender_addr: &'a str,
    pub receiver_addrs: &'a [&'a str],
}

fn validate_mailbox_address(address: &str) -> Result<(), &'static str> {
    if address.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err("address contains CR/LF");
    }
    if !address.is_ascii() {
        return Err("address is not ASCII");
    }
    if address.bytes().filter(|&b| b == b'@').count() != 1 {
        return Err("address must contain exactly one '@'");
    }
    Ok(())
}

fn validate_display_name(name: &str) -> Result<(), &'static str> {
    if name.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err("display name contains CR/LF");
    }
    let bytes = name.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'"' && (i == 0 || bytes[i - 1] != b'\\') {
            return Err("display name contains an unescaped '\"'");
        }
    }
    Ok(())
}

fn validate_mailbox<E>(mb: &Mailbox) -> Result<(), Error<E>> {
    validate_mailbox_address(mb.address).map_err(Error::InvalidArgument)?;
    if let Some(name) = mb.display_name {
        validate_display_name(name).map_err(Error::InvalidArgument)?;
    }
    Ok(())
}

/// Validates the Structured Message invariant: at least one recipient
/// across To ∪ Cc ∪ Bcc, every address well-formed, Subject free of CR/LF.
pub(crate) fn validate_message<E>(msg: &Message) -> Result<(), Error<E>> {
    if msg.from.address.is_empty() {
        return Err(Error::InvalidArgument("from address is required"));
    }
    validate_mailbox(&msg.from)?;

    if msg.to.is_empty() && msg.cc.is_empty() && msg.bcc.is_empty() {
        return Err(Error::InvalidArgument("message has no recipients"));
    }
    for mb in msg.to.iter().chain(msg.cc.iter()).chain(msg.bcc.iter()) {
        validate_mailbox(mb)?;
    }

    if let Some(subject) = msg.subject {
        if subject.bytes().any(|b| b == b'\r' || b == b'\n') {
            return Err(Error::InvalidArgument("subject contains CR/LF"));
        }
    }
    Ok(())
}

/// Returns whether the recipient at position `idx` in the conceptual
/// `to ++ cc ++ bcc` sequence is the first occurrence of its address — used
/// to emit exactly one `RCPT TO:` per distinct address (spec §8).
pub(crate) fn is_first_occurrence(msg: &Message, idx: usize, address: &str) -> bool {
    let chain = msg.to.iter().chain(msg.cc.iter()).chain(msg.bcc.iter());
    for (i, mb) in chain.enumerate() {
        if i == idx {
            return true;
        }
        if mb.address == address {
            return false;
        }
    }
    true
}

fn needs_quoting(name: &str) -> bool {
    name.bytes().any(|b| {
        matches!(
            b,
            b' ' | b',' | b'(' | b')' | b'<' | b'>' | b'@' | b':' | b';' | b'"' | b'\\' | b'[' | b']'
        )
    })
}

fn write_mailbox(w: &mut ByteWriter<'_>, mb: &Mailbox) -> core::fmt::Result {
    match mb.display_name {
        Some(name) if needs_quoting(name) => write!(w, "\"{name}\" <{}>", mb.address),
        Some(name) => write!(w, "{name} <{}>", mb.address),
        None => write!(w, "{}", mb.address),
    }
}

fn write_mailbox_list(w: &mut ByteWriter<'_>, list: &[Mailbox]) -> core::fmt::Result {
    for (i, mb) in list.iter().enumerate() {
        if i > 0 {
            write!(w, ", ")?;
        }
        write_mailbox(w, mb)?;
    }
    Ok(())
}

/// Builds the RFC 5322 header block — `Date:` (if supplied), `From:`,
/// `To:`, optional `Cc:`, optional `Subject:`, `MIME-Version:`,
/// `Content-Type:`, then the blank line separating headers from body — into
/// `buf`, returning its length. Recipient header lines are emitted whole,
/// never folded (spec §4.6, §9).
pub(crate) fn build_headers<E>(
    buf: &mut [u8],
    msg: &Message,
    date: Option<RfcDate>,
) -> Result<usize, Error<E>> {
    let mut w = ByteWriter::new(buf);

    if let Some(RfcDate(date_str)) = date {
        write!(w, "Date: {date_str}\r\n")?;
    }
    write!(w, "From: ")?;
    write_mailbox(&mut w, &msg.from)?;
    write!(w, "\r\n")?;

    write!(w, "To: ")?;
    write_mailbox_list(&mut w, msg.to)?;
    write!(w, "\r\n")?;

    if !msg.cc.is_empty() {
        write!(w, "Cc: ")?;
        write_mailbox_list(&mut w, msg.cc)?;
        write!(w, "\r\n")?;
    }

    if let Some(subject) = msg.subject {
        write!(w, "Subject: {subject}\r\n")?;
    }

    write!(w, "MIME-Version: 1.0\r\n")?;
    write!(w, "Content-Type: text/plain; charset=utf-8\r\n")?;
    write!(w, "\r\n")?;

    Ok(w.len())
}

/// Streams `content` line by line through the transport, dot-stuffing any
/// line that begins with `.` and normalizing line endings: a bare LF is
/// treated as a line terminator, a bare CR not followed by LF is rejected.
/// Content is streamed directly from `content` without being staged in the
/// session buffer, so an arbitrarily long caller-owned body never needs to
/// fit in it.
pub(crate) fn send_data_lines<T: Transport>(
    transport: &mut T,
    content: &str,
) -> Result<(), Error<T::Error>> {
    let bytes = content.as_bytes();
    let len = bytes.len();
    let mut i = 0;

    while i < len {
        let mut j = i;
        while j < len && bytes[j] != b'\n' && bytes[j] != b'\r' {
            j += 1;
        }
        let line = &bytes[i..j];

        if line.first() == Some(&b'.') {
            crate::io::write_raw(transport, b".")?;
        }
        crate::io::write_raw(transport, line)?;
        crate::io::write_raw(transport, b"\r\n")?;

        if j >= len {
            break;
        }
        if bytes[j] == b'\r' {
            if j + 1 < len && bytes[j + 1] == b'\n' {
                i = j + 2;
            } else {
                return Err(Error::InvalidArgument("bare CR not followed by LF"));
            }
        } else {
            // bare LF
            i = j + 1;
        }
    }

    Ok(())
}
