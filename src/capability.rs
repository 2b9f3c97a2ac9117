//! Bitmask over the SMTP extensions this client recognizes from a `250-`
//! EHLO response (spec §4.4). Only `AUTH_PLAIN` / `AUTH_LOGIN` are acted
//! upon; the rest are recorded for the caller's benefit and otherwise unused.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    combinator::{all_consuming, map, opt, rest},
    error::Error as NomError,
    sequence::preceded,
    IResult,
};

/// A bitmask over a closed enumeration of EHLO-advertised extensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities(u16);

impl Capabilities {
    pub const AUTH_PLAIN: Capabilities = Capabilities(1 << 0);
    pub const AUTH_LOGIN: Capabilities = Capabilities(1 << 1);
    pub const SIZE: Capabilities = Capabilities(1 << 2);
    pub const PIPELINING: Capabilities = Capabilities(1 << 3);
    pub const EIGHT_BIT_MIME: Capabilities = Capabilities(1 << 4);
    pub const STARTTLS: Capabilities = Capabilities(1 << 5);

    pub const fn empty() -> Self {
        Capabilities(0)
    }

    pub fn contains(&self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub(crate) fn insert(&mut self, other: Capabilities) {
        self.0 |= other.0;
    }
}

impl core::ops::BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

/// `keyword = 1*(OCTET - SP)`, `params = [ SP 1*OCTET ]` — splits `text` on
/// the first space into a keyword and the remainder, via `nom` rather than
/// manual indexing (the line is already known to be a single complete
/// buffer, so every combinator below is the `complete` variant).
fn keyword_and_params(text: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    let (rest_input, keyword) = take_while(|b: u8| b != b' ')(text)?;
    let (rest_input, params) = opt(preceded(tag(" "), rest))(rest_input)?;
    Ok((rest_input, (keyword, params.unwrap_or(b""))))
}

/// Matches one EHLO-advertised keyword, case-insensitively, against a
/// closed set and maps it to its `Capabilities` bit. `all_consuming` makes
/// each `tag_no_case` an exact match rather than a prefix match.
fn keyword_capability(keyword: &[u8]) -> Option<Capabilities> {
    let mut parser = alt((
        map(all_consuming(tag_no_case::<_, _, NomError<&[u8]>>(
            "SIZE",
        )), |_| Capabilities::SIZE),
        map(
            all_consuming(tag_no_case::<_, _, NomError<&[u8]>>("PIPELINING")),
            |_| Capabilities::PIPELINING,
        ),
        map(
            all_consuming(tag_no_case::<_, _, NomError<&[u8]>>("8BITMIME")),
            |_| Capabilities::EIGHT_BIT_MIME,
        ),
        map(
            all_consuming(tag_no_case::<_, _, NomError<&[u8]>>("STARTTLS")),
            |_| Capabilities::STARTTLS,
        ),
    ));
    parser(keyword).ok().map(|(_, cap)| cap)
}

/// Matches one `AUTH` mechanism token, case-insensitively, against the two
/// mechanisms this client drives.
fn auth_mechanism(token: &[u8]) -> Option<Capabilities> {
    let mut parser = alt((
        map(
            all_consuming(tag_no_case::<_, _, NomError<&[u8]>>("PLAIN")),
            |_| Capabilities::AUTH_PLAIN,
        ),
        map(
            all_consuming(tag_no_case::<_, _, NomError<&[u8]>>("LOGIN")),
            |_| Capabilities::AUTH_LOGIN,
        ),
    ));
    parser(token).ok().map(|(_, cap)| cap)
}

/// Calls `f` with every space-separated, non-empty token in `params`
/// (consecutive spaces yield no empty tokens, same as `str::split_whitespace`
/// on a single-space-normalized input). Walks the input with `nom`'s
/// `take_while`/`tag` rather than `[T]::split`, so it stays a parser built
/// from combinators like the rest of this module; it does not use
/// `separated_list1` because that combinator collects into a `Vec`, which
/// would pull in `alloc` — this crate never allocates (spec.md §1, §9).
fn for_each_token<'a>(mut input: &'a [u8], mut f: impl FnMut(&'a [u8])) {
    loop {
        let (rest_input, token) =
            take_while::<_, _, NomError<&[u8]>>(|b: u8| b != b' ')(input)
                .expect("take_while never fails");
        if !token.is_empty() {
            f(token);
        }
        if rest_input.is_empty() {
            break;
        }
        let (after_space, _) = tag::<_, _, NomError<&[u8]>>(" ")(rest_input)
            .expect("take_while stopped at a space byte");
        input = after_space;
    }
}

/// Parses one continuation line of an EHLO response (the text past the
/// reply code and separator) and folds any recognized keyword into `caps`.
/// Unknown keywords are ignored, per spec §4.4.
pub(crate) fn parse_ehlo_line(text: &[u8], caps: &mut Capabilities) {
    let Ok((_, (keyword, params))) = keyword_and_params(text) else {
        return;
    };

    if keyword.eq_ignore_ascii_case(b"AUTH") {
        for_each_token(params, |token| {
            if let Some(cap) = auth_mechanism(token) {
                caps.insert(cap);
            }
        });
    } else if let Some(cap) = keyword_capability(keyword) {
        caps.insert(cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_auth_mechanisms() {
        let mut caps = Capabilities::empty();
        parse_ehlo_line(b"AUTH PLAIN LOGIN", &mut caps);
        assert!(caps.contains(Capabilities::AUTH_PLAIN));
        assert!(caps.contains(Capabilities::AUTH_LOGIN));
        assert!(!caps.contains(Capabilities::SIZE));
    }

    #[test]
    fn auth_keyword_is_case_insensitive() {
        let mut caps = Capabilities::empty();
        parse_ehlo_line(b"auth plain", &mut caps);
        assert!(caps.contains(Capabilities::AUTH_PLAIN));
    }

    #[test]
    fn unknown_keyword_is_ignored() {
        let mut caps = Capabilities::empty();
        parse_ehlo_line(b"X-WHATEVER foo bar", &mut caps);
        assert!(caps.is_empty());
    }

    #[test]
    fn bare_keyword_without_params_sets_flag() {
        let mut caps = Capabilities::empty();
        parse_ehlo_line(b"PIPELINING", &mut caps);
        assert!(caps.contains(Capabilities::PIPELINING));
    }

    #[test]
    fn size_and_mime_and_starttls() {
        let mut caps = Capabilities::empty();
        parse_ehlo_line(b"SIZE 35882577", &mut caps);
        parse_ehlo_line(b"8BITMIME", &mut caps);
        parse_ehlo_line(b"STARTTLS", &mut caps);
        assert!(caps.contains(Capabilities::SIZE));
        assert!(caps.contains(Capabilities::EIGHT_BIT_MIME));
        assert!(caps.contains(Capabilities::STARTTLS));
    }
}
