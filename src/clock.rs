/// An RFC 5322 date string (e.g. `"Mon, 1 Jan 2024 00:00:00 +0000"`), owned
/// by the caller and passed through verbatim into the `Date:` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RfcDate<'a>(pub &'a str);

/// Caller-supplied source of the optional `Date:` header.
///
/// The crate has no wall clock of its own — many embedded targets don't
/// have one either. Returning `None` omits the header; most servers stamp
/// one on arrival.
pub trait Clock {
    fn now(&self) -> Option<RfcDate<'_>>;
}

impl Clock for () {
    fn now(&self) -> Option<RfcDate<'_>> {
        None
    }
}
