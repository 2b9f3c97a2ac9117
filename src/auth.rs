//! Drives the `AUTH PLAIN` / `AUTH LOGIN` sub-dialogue (spec §4.5). Base64
//! encoding runs in place over the session buffer via
//! [`base64::Engine::encode_slice`] — no allocation, no intermediate `Vec`.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::Error;

/// Credentials supplied by the caller to [`crate::Session::connect`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

impl<'a> Credentials<'a> {
    pub const fn new(username: &'a str, password: &'a str) -> Self {
        Credentials { username, password }
    }
}

impl<'a> core::fmt::Debug for Credentials<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Base64-encodes `\0username\0password` into `buf`, returning the encoded
/// length. The plaintext is staged at the tail of `buf` (disjoint from the
/// encoded output, which is written from the front) so the whole operation
/// stays allocation-free.
pub(crate) fn encode_plain<E>(
    buf: &mut [u8],
    username: &str,
    password: &str,
) -> Result<usize, Error<E>> {
    let raw_len = 2 + username.len() + password.len();
    let encoded_len =
        base64::encoded_len(raw_len, true).ok_or(Error::InvalidArgument("credentials too large"))?;
    if encoded_len + raw_len > buf.len() {
        return Err(Error::BufferTooSmall);
    }

    let (out, scratch) = buf.split_at_mut(encoded_len);
    let raw = &mut scratch[..raw_len];
    raw[0] = 0;
    raw[1..1 + username.len()].copy_from_slice(username.as_bytes());
    raw[1 + username.len()] = 0;
    raw[2 + username.len()..].copy_from_slice(password.as_bytes());

    STANDARD
        .encode_slice(&raw[..], out)
        .map_err(|_| Error::BufferTooSmall)
}

/// Base64-encodes a single token (an `AUTH LOGIN` username or password) in
/// place over `buf`, same layout trick as [`encode_plain`].
pub(crate) fn encode_token<E>(buf: &mut [u8], value: &str) -> Result<usize, Error<E>> {
    let raw_len = value.len();
    let encoded_len =
        base64::encoded_len(raw_len, true).ok_or(Error::InvalidArgument("credential too large"))?;
    if encoded_len + raw_len > buf.len() {
        return Err(Error::BufferTooSmall);
    }

    let (out, scratch) = buf.split_at_mut(encoded_len);
    let raw = &mut scratch[..raw_len];
    raw.copy_from_slice(value.as_bytes());

    STANDARD
        .encode_slice(&raw[..], out)
        .map_err(|_| Error::BufferTooSmall)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_auth_plain_blob() {
        // \0alice\0s3cret, per spec §8 scenario 3.
        let mut buf = [0u8; 64];
        let len = encode_plain::<()>(&mut buf, "alice", "s3cret").unwrap();
        assert_eq!(&buf[..len], b"AGFsaWNlAHMzY3JldA==");
    }

    #[test]
    fn encodes_login_token() {
        let mut buf = [0u8; 64];
        let len = encode_token::<()>(&mut buf, "alice").unwrap();
        assert_eq!(&buf[..len], b"YWxpY2U=");
    }

    #[test]
    fn reports_buffer_too_small() {
        let mut buf = [0u8; 4];
        assert_eq!(
            encode_plain::<()>(&mut buf, "alice", "s3cret"),
            Err(Error::BufferTooSmall)
        );
    }
}
