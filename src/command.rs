//! Formats SMTP verbs and their arguments into the send buffer (spec §4.3).
//! Each `encode_*` function returns the content length (excluding CRLF);
//! the caller flushes it via [`io::send_line`](crate::io::send_line).

use core::fmt::Write as _;

use crate::{error::Error, io::ByteWriter};

/// Rejects any address containing CR, LF, `<`, or `>` — these would let an
/// attacker smuggle extra command lines or close/reopen the angle-bracket
/// wrapper `MAIL FROM`/`RCPT TO` always add.
fn validate_address(address: &str) -> Result<(), &'static str> {
    if address
        .bytes()
        .any(|b| matches!(b, b'\r' | b'\n' | b'<' | b'>'))
    {
        return Err("address contains CR, LF, '<' or '>'");
    }
    Ok(())
}

fn encode<E>(
    buf: &mut [u8],
    f: impl FnOnce(&mut ByteWriter<'_>) -> core::fmt::Result,
) -> Result<usize, Error<E>> {
    let mut writer = ByteWriter::new(buf);
    f(&mut writer)?;
    Ok(writer.len())
}

pub(crate) fn encode_ehlo<E>(buf: &mut [u8], client_id: &str) -> Result<usize, Error<E>> {
    encode(buf, |w| write!(w, "EHLO {client_id}"))
}

pub(crate) fn encode_helo<E>(buf: &mut [u8], client_id: &str) -> Result<usize, Error<E>> {
    encode(buf, |w| write!(w, "HELO {client_id}"))
}

pub(crate) fn encode_mail_from<E>(buf: &mut [u8], address: &str) -> Result<usize, Error<E>> {
    validate_address(address).map_err(Error::InvalidArgument)?;
    encode(buf, |w| write!(w, "MAIL FROM:<{address}>"))
}

pub(crate) fn encode_rcpt_to<E>(buf: &mut [u8], address: &str) -> Result<usize, Error<E>> {
    validate_address(address).map_err(Error::InvalidArgument)?;
    encode(buf, |w| write!(w, "RCPT TO:<{address}>"))
}

pub(crate) fn encode_data<E>(buf: &mut [u8]) -> Result<usize, Error<E>> {
    encode(buf, |w| write!(w, "DATA"))
}

pub(crate) fn encode_rset<E>(buf: &mut [u8]) -> Result<usize, Error<E>> {
    encode(buf, |w| write!(w, "RSET"))
}

pub(crate) fn encode_quit<E>(buf: &mut [u8]) -> Result<usize, Error<E>> {
    encode(buf, |w| write!(w, "QUIT"))
}

pub(crate) fn encode_auth_login<E>(buf: &mut [u8]) -> Result<usize, Error<E>> {
    encode(buf, |w| write!(w, "AUTH LOGIN"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_ehlo() {
        let mut buf = [0u8; 32];
        let len = encode_ehlo::<()>(&mut buf, "localhost").unwrap();
        assert_eq!(&buf[..len], b"EHLO localhost");
    }

    #[test]
    fn wraps_envelope_addresses_in_angle_brackets() {
        let mut buf = [0u8; 32];
        let len = encode_mail_from::<()>(&mut buf, "a@x").unwrap();
        assert_eq!(&buf[..len], b"MAIL FROM:<a@x>");

        let len = encode_rcpt_to::<()>(&mut buf, "b@y").unwrap();
        assert_eq!(&buf[..len], b"RCPT TO:<b@y>");
    }

    #[test]
    fn empty_sender_is_allowed() {
        let mut buf = [0u8; 32];
        let len = encode_mail_from::<()>(&mut buf, "").unwrap();
        assert_eq!(&buf[..len], b"MAIL FROM:<>");
    }

    #[test]
    fn rejects_address_with_crlf_or_angle_brackets() {
        let mut buf = [0u8; 32];
        assert_eq!(
            encode_mail_from::<()>(&mut buf, "a@x\r\nRCPT TO:<c@z>"),
            Err(Error::InvalidArgument(
                "address contains CR, LF, '<' or '>'"
            ))
        );
        assert!(encode_rcpt_to::<()>(&mut buf, "<a@x>").is_err());
    }

    #[test]
    fn reports_buffer_too_small() {
        let mut buf = [0u8; 4];
        assert_eq!(
            encode_ehlo::<()>(&mut buf, "localhost"),
            Err(Error::BufferTooSmall)
        );
    }
}
