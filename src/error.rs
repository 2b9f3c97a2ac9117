use core::fmt;

/// The closed error taxonomy for every fallible operation on a [`Session`](crate::Session).
///
/// `E` is the transport's own error type, carried verbatim in [`Error::Transport`]
/// so callers can distinguish SMTP-level faults from network-level ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// Caller input malformed: empty recipient list, address containing CR/LF,
    /// oversize credentials, and similar.
    InvalidArgument(&'static str),
    /// `connect` called on a session that is not Unconnected.
    AlreadyConnected,
    /// `send`, `send_raw`, or `close` called on a session that is not Ready.
    NotConnected,
    /// A line to be sent or received would exceed the caller-provided buffer.
    BufferTooSmall,
    /// A server reply violated RFC 5321 framing, or a mandatory command got
    /// an unexpected reply code class.
    Protocol,
    /// The server rejected the supplied credentials (535 or analogous).
    AuthFailed,
    /// No mutually supported authentication mechanism was advertised.
    AuthMechanismUnsupported,
    /// Verbatim error surfaced from the transport layer.
    Transport(E),
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(reason) => write!(f, "invalid argument: {reason}"),
            Error::AlreadyConnected => write!(f, "session is already connected"),
            Error::NotConnected => write!(f, "session is not connected"),
            Error::BufferTooSmall => write!(f, "buffer too small for line"),
            Error::Protocol => write!(f, "protocol violation"),
            Error::AuthFailed => write!(f, "authentication failed"),
            Error::AuthMechanismUnsupported => write!(f, "no supported authentication mechanism"),
            Error::Transport(e) => write!(f, "transport error: {e:?}"),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for Error<E> {}

/// Lets the command encoder and message serializer use `?` directly against
/// a `core::fmt::Write` call: running out of buffer space during formatting
/// is exactly a [`Error::BufferTooSmall`].
impl<E> From<fmt::Error> for Error<E> {
    fn from(_: fmt::Error) -> Self {
        Error::BufferTooSmall
    }
}

#[cfg(test)]
mod tests {
    // std is available under cfg(test), used only to assert on the formatted
    // string; the crate itself never depends on `alloc` to implement Display.
    extern crate std;

    use super::*;

    #[test]
    fn display_does_not_panic() {
        let e: Error<()> = Error::InvalidArgument("empty address");
        assert_eq!(std::format!("{e}"), "invalid argument: empty address");
    }

    #[test]
    fn transport_variant_wraps_verbatim() {
        let e: Error<i32> = Error::Transport(-5);
        assert_eq!(e, Error::Transport(-5));
    }
}
