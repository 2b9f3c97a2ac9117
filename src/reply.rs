//! Decodes one logical SMTP reply — possibly spanning several physical
//! lines — into a (code, final-line text, classification) triple, per
//! RFC 5321 §4.2.

use log::error;
use nom::bytes::complete::take_while_m_n;

use crate::{error::Error, io, transport::Transport};

/// 2xx/3xx/4xx/5xx classification of a reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// 2xx — Positive Completion.
    PositiveCompletion,
    /// 3xx — Positive Intermediate (expected mid-`AUTH`, after `DATA`).
    PositiveIntermediate,
    /// 4xx — Transient Negative.
    TransientNegative,
    /// 5xx — Permanent Negative.
    PermanentNegative,
}

fn classify(code: u16) -> ReplyClass {
    match code / 100 {
        2 => ReplyClass::PositiveCompletion,
        3 => ReplyClass::PositiveIntermediate,
        4 => ReplyClass::TransientNegative,
        _ => ReplyClass::PermanentNegative,
    }
}

/// A decoded SMTP reply. `text` points at the final line's remainder (past
/// the code and its separator) and is valid only until the next line is
/// read into the session buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply<'a> {
    code: u16,
    text: &'a [u8],
    class: ReplyClass,
}

impl<'a> Reply<'a> {
    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn text(&self) -> &'a [u8] {
        self.text
    }

    pub fn class(&self) -> ReplyClass {
        self.class
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.class,
            ReplyClass::PositiveCompletion | ReplyClass::PositiveIntermediate
        )
    }
}

struct ParsedLine {
    code: u16,
    continuation: bool,
    text_offset: usize,
}

fn digit3(input: &[u8]) -> nom::IResult<&[u8], &[u8]> {
    take_while_m_n(3, 3, |b: u8| b.is_ascii_digit())(input)
}

/// Parses the code and continuation marker of a single reply line. The
/// caller has already stripped the trailing CRLF (via `io::read_line`).
fn parse_line(line: &[u8]) -> Result<ParsedLine, ()> {
    let (rest, code_bytes) = digit3(line).map_err(|_: nom::Err<nom::error::Error<&[u8]>>| ())?;
    let code: u16 = core::str::from_utf8(code_bytes)
        .map_err(|_| ())?
        .parse()
        .map_err(|_| ())?;
    if !(200..=599).contains(&code) {
        return Err(());
    }
    let continuation = match rest.first() {
        Some(b'-') => true,
        Some(b' ') => false,
        // RFC 5321 requires a separator after the three digit code on
        // every reply line, even when no text follows.
        None => false,
        _ => return Err(()),
    };
    Ok(ParsedLine {
        code,
        continuation,
        text_offset: line.len() - rest.len() + usize::from(!rest.is_empty()),
    })
}

/// Reads one full (possibly multi-line) reply, invoking `on_line` with the
/// code and text of every physical line as it is read — this is the hook
/// the EHLO capability parser uses, since the buffer is overwritten on
/// every `read_line` and continuation-line text cannot outlive its call.
pub(crate) fn read_reply_with<'b, T: Transport>(
    transport: &mut T,
    buffer: &'b mut [u8],
    mut on_line: impl FnMut(u16, &[u8]),
) -> Result<Reply<'b>, Error<T::Error>> {
    let mut first_code: Option<u16> = None;
    let mut final_offset = 0usize;
    let mut final_len = 0usize;

    loop {
        let len = io::read_line(transport, buffer)?;
        let parsed = parse_line(&buffer[..len]).map_err(|_| {
            error!("malformed reply line, discarded = {len} bytes");
            Error::Protocol
        })?;

        match first_code {
            None => first_code = Some(parsed.code),
            Some(code) if code == parsed.code => {}
            Some(code) => {
                error!("continuation code {} does not match first line code {code}", parsed.code);
                return Err(Error::Protocol);
            }
        }

        on_line(parsed.code, &buffer[parsed.text_offset..len]);

        if !parsed.continuation {
            final_offset = parsed.text_offset;
            final_len = len;
            break;
        }
    }

    let code = first_code.expect("loop always sets first_code before breaking");
    Ok(Reply {
        code,
        text: &buffer[final_offset..final_len],
        class: classify(code),
    })
}

/// Reads one full reply, discarding continuation-line text.
pub(crate) fn read_reply<'b, T: Transport>(
    transport: &mut T,
    buffer: &'b mut [u8],
) -> Result<Reply<'b>, Error<T::Error>> {
    read_reply_with(transport, buffer, |_, _| {})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_code_class() {
        assert_eq!(classify(250), ReplyClass::PositiveCompletion);
        assert_eq!(classify(354), ReplyClass::PositiveIntermediate);
        assert_eq!(classify(450), ReplyClass::TransientNegative);
        assert_eq!(classify(550), ReplyClass::PermanentNegative);
    }

    #[test]
    fn parses_final_line() {
        let parsed = parse_line(b"250 OK").unwrap();
        assert_eq!(parsed.code, 250);
        assert!(!parsed.continuation);
        assert_eq!(parsed.text_offset, 4);
    }

    #[test]
    fn parses_continuation_line() {
        let parsed = parse_line(b"250-PIPELINING").unwrap();
        assert_eq!(parsed.code, 250);
        assert!(parsed.continuation);
        assert_eq!(&b"250-PIPELINING"[parsed.text_offset..], b"PIPELINING");
    }

    #[test]
    fn rejects_out_of_range_code() {
        assert!(parse_line(b"999 nope").is_err());
        assert!(parse_line(b"199 nope").is_err());
    }

    #[test]
    fn rejects_bad_separator() {
        assert!(parse_line(b"250xOK").is_err());
    }

    #[test]
    fn bare_code_without_text_is_final() {
        let parsed = parse_line(b"250").unwrap();
        assert!(!parsed.continuation);
        assert_eq!(parsed.text_offset, 3);
    }
}
