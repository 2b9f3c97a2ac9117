/// The capability set the library needs from an already-addressed,
/// caller-owned connection.
///
/// The library never resolves addresses, opens sockets, or configures TLS;
/// it only drives an existing handle through these four operations. `read`
/// and `write` are blocking and may return short counts; a `read` returning
/// `Ok(0)` is treated by the session as an unexpected close.
pub trait Transport {
    /// Caller-defined remote address representation (hostname/port, a raw
    /// `SocketAddr`, an RIOT `sock_tcp_ep_t`, whatever the target needs).
    type Endpoint;
    /// Caller-defined transport error, surfaced verbatim via `Error::Transport`.
    type Error;

    /// Establish the connection to `endpoint`. Called at most once per
    /// [`Session::connect`](crate::Session::connect).
    fn connect(&mut self, endpoint: &Self::Endpoint) -> Result<(), Self::Error>;

    /// Block until at least one byte is available, then fill as much of
    /// `buf` as is immediately available. Returns the number of bytes read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Block until at least one byte has been accepted by the transport.
    /// May write fewer bytes than `buf.len()`; the caller retries the rest.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;

    /// Release the connection. Called on orderly `close` and on any fatal
    /// fault during `connect`/`send`/`send_raw`.
    fn close(&mut self) -> Result<(), Self::Error>;
}
