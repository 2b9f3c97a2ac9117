//! Session state machine: connect, send, send_raw, close (spec §4.7).

use log::{debug, error, trace};

use crate::{
    auth, capability::Capabilities, clock::Clock, command, error::Error, io, message, reply,
    transport::Transport, Credentials, Envelope, Message, Reply, ReplyClass,
};

const DEFAULT_CLIENT_ID: &str = "localhost";

/// Everything [`Session::connect`] needs: the caller's transport and
/// already-addressed endpoint, the shared working buffer, and optional
/// authentication / client identity / clock.
pub struct ConnectInfo<'a, T: Transport> {
    pub transport: &'a mut T,
    pub buffer: &'a mut [u8],
    pub remote_endpoint: T::Endpoint,
    pub auth: Option<Credentials<'a>>,
    pub client_id: Option<&'a str>,
    pub clock: Option<&'a dyn Clock>,
}

impl<'a, T: Transport> core::fmt::Debug for ConnectInfo<'a, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectInfo")
            .field("auth", &self.auth)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

enum Inner<'a, T: Transport> {
    Unconnected,
    Ready {
        transport: &'a mut T,
        buffer: &'a mut [u8],
        capabilities: Capabilities,
        clock: Option<&'a dyn Clock>,
    },
    Closed,
}

/// A single SMTP dialogue. Value-initialized via [`Session::new`] in the
/// Unconnected state; see spec §3 and §7 for the full transition table.
pub struct Session<'a, T: Transport> {
    inner: Inner<'a, T>,
}

impl<'a, T: Transport> core::fmt::Debug for Session<'a, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = match self.inner {
            Inner::Unconnected => "Unconnected",
            Inner::Ready { .. } => "Ready",
            Inner::Closed => "Closed",
        };
        f.debug_struct("Session").field("state", &state).finish()
    }
}

impl<'a, T: Transport> Default for Session<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Carries both the taxonomy error to surface and whether the fault closes
/// the session (`fatal`) or leaves it Ready (a recovered MAIL/RCPT rejection).
struct SendFailure<E> {
    error: Error<E>,
    fatal: bool,
}

impl<E> SendFailure<E> {
    fn fatal(error: Error<E>) -> Self {
        SendFailure { error, fatal: true }
    }
}

impl<'a, T: Transport> Session<'a, T> {
    pub fn new() -> Self {
        Session {
            inner: Inner::Unconnected,
        }
    }

    /// Connects the transport, reads the greeting, negotiates EHLO/HELO and
    /// runs AUTH if credentials were supplied. A failure at any step closes
    /// the transport and leaves the session Unconnected, ready to retry with
    /// a fresh [`ConnectInfo`] (spec §7).
    pub fn connect(&mut self, info: ConnectInfo<'a, T>) -> Result<(), Error<T::Error>> {
        if !matches!(self.inner, Inner::Unconnected) {
            return Err(Error::AlreadyConnected);
        }
        match do_connect(info) {
            Ok(ready) => {
                debug!("session Unconnected -> Ready");
                self.inner = ready;
                Ok(())
            }
            Err(e) => {
                error!("connect failed, session stays Unconnected");
                self.inner = Inner::Unconnected;
                Err(e)
            }
        }
    }

    /// Runs a mail transaction from a structured [`Message`] (spec §4.6).
    pub fn send(&mut self, message: &Message) -> Result<(), Error<T::Error>> {
        self.with_ready(|transport, buffer, _caps, clock| {
            do_send(transport, buffer, message, clock)
        })
    }

    /// Runs a mail transaction from a raw envelope and pre-formed message
    /// content; `data` is dot-stuffed the same as the structured path (spec
    /// §9, first Open Question).
    pub fn send_raw(&mut self, envelope: &Envelope, data: &str) -> Result<(), Error<T::Error>> {
        self.with_ready(|transport, buffer, _caps, _clock| {
            do_send_raw(transport, buffer, envelope, data)
        })
    }

    /// Sends `QUIT`, tolerates any reply code, closes the transport, and
    /// transitions to Closed regardless of outcome.
    pub fn close(&mut self) -> Result<(), Error<T::Error>> {
        let previous = core::mem::replace(&mut self.inner, Inner::Closed);
        let Inner::Ready {
            transport, buffer, ..
        } = previous
        else {
            self.inner = previous;
            return Err(Error::NotConnected);
        };

        let result = (|| -> Result<(), Error<T::Error>> {
            let len = command::encode_quit(buffer)?;
            io::send_line(transport, buffer, len)?;
            reply::read_reply(transport, buffer)?;
            Ok(())
        })();
        let _ = transport.close();
        debug!("session Ready -> Closed (QUIT)");
        self.inner = Inner::Closed;
        result
    }

    /// Runs `f` against the Ready state's transport/buffer/capabilities/clock,
    /// restoring Ready on success or a recovered server-level rejection, and
    /// transitioning to Closed on any fatal fault.
    fn with_ready<R>(
        &mut self,
        f: impl FnOnce(
            &mut T,
            &mut [u8],
            Capabilities,
            Option<&'a dyn Clock>,
        ) -> Result<R, SendFailure<T::Error>>,
    ) -> Result<R, Error<T::Error>> {
        let previous = core::mem::replace(&mut self.inner, Inner::Closed);
        let Inner::Ready {
            transport,
            buffer,
            capabilities,
            clock,
        } = previous
        else {
            self.inner = previous;
            return Err(Error::NotConnected);
        };

        match f(transport, buffer, capabilities, clock) {
            Ok(value) => {
                self.inner = Inner::Ready {
                    transport,
                    buffer,
                    capabilities,
                    clock,
                };
                Ok(value)
            }
            Err(failure) => {
                if failure.fatal {
                    let _ = transport.close();
                    debug!("session Ready -> Closed (fatal fault)");
                    self.inner = Inner::Closed;
                } else {
                    self.inner = Inner::Ready {
                        transport,
                        buffer,
                        capabilities,
                        clock,
                    };
                }
                Err(failure.error)
            }
        }
    }
}

fn do_connect<'a, T: Transport>(info: ConnectInfo<'a, T>) -> Result<Inner<'a, T>, Error<T::Error>> {
    let ConnectInfo {
        transport,
        buffer,
        remote_endpoint,
        auth,
        client_id,
        clock,
    } = info;

    match run_handshake(transport, buffer, client_id, auth, &remote_endpoint) {
        Ok(capabilities) => Ok(Inner::Ready {
            transport,
            buffer,
            capabilities,
            clock,
        }),
        Err(e) => {
            let _ = transport.close();
            Err(e)
        }
    }
}

fn run_handshake<T: Transport>(
    transport: &mut T,
    buffer: &mut [u8],
    client_id: Option<&str>,
    auth: Option<Credentials>,
    remote_endpoint: &T::Endpoint,
) -> Result<Capabilities, Error<T::Error>> {
    transport.connect(remote_endpoint).map_err(Error::Transport)?;

    let greeting = reply::read_reply(transport, buffer)?;
    if !greeting.is_success() {
        return Err(Error::Protocol);
    }

    let client_id = client_id.unwrap_or(DEFAULT_CLIENT_ID);
    let capabilities = negotiate_capabilities(transport, buffer, client_id)?;

    if let Some(credentials) = auth {
        run_auth(transport, buffer, capabilities, credentials)?;
    }

    Ok(capabilities)
}

fn negotiate_capabilities<T: Transport>(
    transport: &mut T,
    buffer: &mut [u8],
    client_id: &str,
) -> Result<Capabilities, Error<T::Error>> {
    let mut capabilities = Capabilities::empty();

    let len = command::encode_ehlo(buffer, client_id)?;
    io::send_line(transport, buffer, len)?;
    let reply = reply::read_reply_with(transport, buffer, |_code, text| {
        crate::capability::parse_ehlo_line(text, &mut capabilities);
    })?;

    if reply.is_success() {
        return Ok(capabilities);
    }

    // EHLO rejected; fall back to HELO with an empty capability set (spec §4.4).
    trace!("EHLO rejected with code {}, falling back to HELO", reply.code());
    let len = command::encode_helo(buffer, client_id)?;
    io::send_line(transport, buffer, len)?;
    let reply = reply::read_reply(transport, buffer)?;
    if reply.is_success() {
        Ok(Capabilities::empty())
    } else {
        Err(Error::Protocol)
    }
}

fn run_auth<T: Transport>(
    transport: &mut T,
    buffer: &mut [u8],
    capabilities: Capabilities,
    credentials: Credentials,
) -> Result<(), Error<T::Error>> {
    if capabilities.contains(Capabilities::AUTH_PLAIN) {
        trace!("selected AUTH PLAIN");
        auth_plain(transport, buffer, credentials)
    } else if capabilities.contains(Capabilities::AUTH_LOGIN) {
        trace!("selected AUTH LOGIN");
        auth_login(transport, buffer, credentials)
    } else {
        error!("no mutually supported AUTH mechanism advertised");
        Err(Error::AuthMechanismUnsupported)
    }
}

fn auth_reply_outcome<E>(reply: &Reply) -> Result<(), Error<E>> {
    match reply.class() {
        ReplyClass::PositiveCompletion => Ok(()),
        ReplyClass::TransientNegative => Err(Error::Protocol),
        _ => Err(Error::AuthFailed),
    }
}

fn auth_plain<T: Transport>(
    transport: &mut T,
    buffer: &mut [u8],
    credentials: Credentials,
) -> Result<(), Error<T::Error>> {
    const PREFIX: &[u8] = b"AUTH PLAIN ";
    if buffer.len() < PREFIX.len() {
        return Err(Error::BufferTooSmall);
    }
    buffer[..PREFIX.len()].copy_from_slice(PREFIX);
    let encoded_len = auth::encode_plain(
        &mut buffer[PREFIX.len()..],
        credentials.username,
        credentials.password,
    )?;

    io::send_line(transport, buffer, PREFIX.len() + encoded_len)?;
    let reply = reply::read_reply(transport, buffer)?;
    auth_reply_outcome(&reply)
}

fn auth_login<T: Transport>(
    transport: &mut T,
    buffer: &mut [u8],
    credentials: Credentials,
) -> Result<(), Error<T::Error>> {
    let len = command::encode_auth_login(buffer)?;
    io::send_line(transport, buffer, len)?;
    let reply = reply::read_reply(transport, buffer)?;
    if reply.class() != ReplyClass::PositiveIntermediate {
        return Err(Error::Protocol);
    }

    let len = auth::encode_token(buffer, credentials.username)?;
    io::send_line(transport, buffer, len)?;
    let reply = reply::read_reply(transport, buffer)?;
    if reply.class() != ReplyClass::PositiveIntermediate {
        return Err(Error::Protocol);
    }

    let len = auth::encode_token(buffer, credentials.password)?;
    io::send_line(transport, buffer, len)?;
    let reply = reply::read_reply(transport, buffer)?;
    auth_reply_outcome(&reply)
}

/// Sends `RSET` in response to a rejected MAIL/RCPT command; success returns
/// the session to Ready with `Protocol` surfaced, failure closes it (spec §7).
fn recover_transaction<T: Transport>(
    transport: &mut T,
    buffer: &mut [u8],
) -> SendFailure<T::Error> {
    let outcome = (|| -> Result<bool, Error<T::Error>> {
        let len = command::encode_rset(buffer)?;
        io::send_line(transport, buffer, len)?;
        let reply = reply::read_reply(transport, buffer)?;
        Ok(reply.code() == 250)
    })();

    match outcome {
        Ok(true) => SendFailure {
            error: Error::Protocol,
            fatal: false,
        },
        Ok(false) => SendFailure {
            error: Error::Protocol,
            fatal: true,
        },
        Err(e) => SendFailure::fatal(e),
    }
}

/// Sends a line and expects a reply code satisfying `is_accepted`,
/// recovering via `RSET` on rejection (used for `MAIL FROM` / `RCPT TO`,
/// spec §4.6 steps 1-2, §7). `MAIL FROM` accepts exactly 250; `RCPT TO`
/// accepts 250 or 251 — never any other 2xx, and never 3xx.
fn send_recipient_command<T: Transport>(
    transport: &mut T,
    buffer: &mut [u8],
    encode: impl FnOnce(&mut [u8]) -> Result<usize, Error<T::Error>>,
    is_accepted: impl Fn(u16) -> bool,
) -> Result<(), SendFailure<T::Error>> {
    let len = encode(buffer).map_err(SendFailure::fatal)?;
    io::send_line(transport, buffer, len).map_err(SendFailure::fatal)?;
    let reply = reply::read_reply(transport, buffer).map_err(SendFailure::fatal)?;

    if is_accepted(reply.code()) {
        Ok(())
    } else {
        Err(recover_transaction(transport, buffer))
    }
}

fn do_send<T: Transport>(
    transport: &mut T,
    buffer: &mut [u8],
    message: &Message,
    clock: Option<&dyn Clock>,
) -> Result<(), SendFailure<T::Error>> {
    message::validate_message(message).map_err(|e| SendFailure {
        error: e,
        fatal: false,
    })?;

    send_recipient_command(
        transport,
        buffer,
        |b| command::encode_mail_from(b, message.from.address),
        |code| code == 250,
    )?;

    let recipients = message
        .to
        .iter()
        .chain(message.cc.iter())
        .chain(message.bcc.iter());
    for (idx, mailbox) in recipients.enumerate() {
        if !message::is_first_occurrence(message, idx, mailbox.address) {
            continue;
        }
        send_recipient_command(
            transport,
            buffer,
            |b| command::encode_rcpt_to(b, mailbox.address),
            |code| matches!(code, 250 | 251),
        )?;
    }

    let len = command::encode_data(buffer).map_err(SendFailure::fatal)?;
    io::send_line(transport, buffer, len).map_err(SendFailure::fatal)?;
    let reply = reply::read_reply(transport, buffer).map_err(SendFailure::fatal)?;
    if reply.class() != ReplyClass::PositiveIntermediate {
        return Err(SendFailure::fatal(Error::Protocol));
    }

    let date = clock.and_then(|c| c.now());
    let header_len =
        message::build_headers(buffer, message, date).map_err(SendFailure::fatal)?;
    io::write_raw(transport, &buffer[..header_len]).map_err(SendFailure::fatal)?;
    message::send_data_lines(transport, message.body.unwrap_or(""))
        .map_err(SendFailure::fatal)?;
    io::write_raw(transport, b".\r\n").map_err(SendFailure::fatal)?;

    let reply = reply::read_reply(transport, buffer).map_err(SendFailure::fatal)?;
    if reply.code() == 250 {
        Ok(())
    } else {
        Err(SendFailure::fatal(Error::Protocol))
    }
}

fn do_send_raw<T: Transport>(
    transport: &mut T,
    buffer: &mut [u8],
    envelope: &Envelope,
    data: &str,
) -> Result<(), SendFailure<T::Error>> {
    if envelope.receiver_addrs.is_empty() {
        return Err(SendFailure {
            error: Error::InvalidArgument("envelope has no receivers"),
            fatal: false,
        });
    }

    send_recipient_command(
        transport,
        buffer,
        |b| command::encode_mail_from(b, envelope.sender_addr),
        |code| code == 250,
    )?;

    for address in envelope.receiver_addrs {
        send_recipient_command(
            transport,
            buffer,
            |b| command::encode_rcpt_to(b, address),
            |code| matches!(code, 250 | 251),
        )?;
    }

    let len = command::encode_data(buffer).map_err(SendFailure::fatal)?;
    io::send_line(transport, buffer, len).map_err(SendFailure::fatal)?;
    let reply = reply::read_reply(transport, buffer).map_err(SendFailure::fatal)?;
    if reply.class() != ReplyClass::PositiveIntermediate {
        return Err(SendFailure::fatal(Error::Protocol));
    }

    message::send_data_lines(transport, data).map_err(SendFailure::fatal)?;
    io::write_raw(transport, b".\r\n").map_err(SendFailure::fatal)?;

    let reply = reply::read_reply(transport, buffer).map_err(SendFailure::fatal)?;
    if reply.code() == 250 {
        Ok(())
    } else {
        Err(SendFailure::fatal(Error::Protocol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mailbox;

    struct ScriptedTransport {
        inbox: std::vec::Vec<u8>,
        read_pos: usize,
        outbox: std::vec::Vec<u8>,
        connected: bool,
        closed: bool,
    }

    impl ScriptedTransport {
        fn new(script: &[u8]) -> Self {
            ScriptedTransport {
                inbox: script.to_vec(),
                read_pos: 0,
                outbox: std::vec::Vec::new(),
                connected: false,
                closed: false,
            }
        }
    }

    impl Transport for ScriptedTransport {
        type Endpoint = ();
        type Error = ();

        fn connect(&mut self, _endpoint: &()) -> Result<(), ()> {
            self.connected = true;
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
            if self.read_pos >= self.inbox.len() {
                return Err(());
            }
            buf[0] = self.inbox[self.read_pos];
            self.read_pos += 1;
            Ok(1)
        }

        fn write(&mut self, buf: &[u8]) -> Result<usize, ()> {
            self.outbox.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn close(&mut self) -> Result<(), ()> {
            self.closed = true;
            Ok(())
        }
    }

    fn happy_path_script() -> std::vec::Vec<u8> {
        let mut script = std::vec::Vec::new();
        script.extend_from_slice(b"220 example.test ESMTP\r\n");
        script.extend_from_slice(b"250-example.test\r\n");
        script.extend_from_slice(b"250-PIPELINING\r\n");
        script.extend_from_slice(b"250 AUTH PLAIN LOGIN\r\n");
        script.extend_from_slice(b"250 OK\r\n"); // MAIL FROM
        script.extend_from_slice(b"250 OK\r\n"); // RCPT TO
        script.extend_from_slice(b"354 Go ahead\r\n"); // DATA
        script.extend_from_slice(b"250 OK\r\n"); // end of data
        script
    }

    #[test]
    fn connect_and_send_happy_path() {
        let mut transport = ScriptedTransport::new(&happy_path_script());
        let mut buffer = [0u8; 512];
        let mut session = Session::new();

        session
            .connect(ConnectInfo {
                transport: &mut transport,
                buffer: &mut buffer,
                remote_endpoint: (),
                auth: None,
                client_id: None,
                clock: None,
            })
            .unwrap();

        let to = [Mailbox::new("b@y")];
        let message = Message {
            from: Mailbox::new("a@x"),
            to: &to,
            cc: &[],
            bcc: &[],
            subject: Some("Hi"),
            body: Some("Hello"),
        };
        session.send(&message).unwrap();

        let sent = core::str::from_utf8(&transport.outbox).unwrap();
        assert!(sent.starts_with("EHLO localhost\r\n"));
        assert!(sent.contains("MAIL FROM:<a@x>\r\n"));
        assert!(sent.contains("RCPT TO:<b@y>\r\n"));
        assert!(sent.contains("DATA\r\n"));
        assert!(sent.contains("Subject: Hi\r\n"));
        assert!(sent.ends_with("Hello\r\n.\r\n"));
    }

    #[test]
    fn auth_mechanism_unsupported_aborts_connect() {
        let mut script = std::vec::Vec::new();
        script.extend_from_slice(b"220 example.test ESMTP\r\n");
        script.extend_from_slice(b"250-example.test\r\n");
        script.extend_from_slice(b"250 AUTH CRAM-MD5\r\n");

        let mut transport = ScriptedTransport::new(&script);
        let mut buffer = [0u8; 512];
        let mut session: Session<'_, ScriptedTransport> = Session::new();

        let err = session
            .connect(ConnectInfo {
                transport: &mut transport,
                buffer: &mut buffer,
                remote_endpoint: (),
                auth: Some(Credentials::new("alice", "s3cret")),
                client_id: None,
                clock: None,
            })
            .unwrap_err();

        assert_eq!(err, Error::AuthMechanismUnsupported);
        assert!(!core::str::from_utf8(&transport.outbox)
            .unwrap()
            .contains("AUTH"));
        assert!(transport.closed);
    }

    #[test]
    fn rcpt_rejection_recovers_via_rset() {
        let mut script = std::vec::Vec::new();
        script.extend_from_slice(b"220 example.test ESMTP\r\n");
        script.extend_from_slice(b"250 example.test\r\n");
        script.extend_from_slice(b"250 OK\r\n"); // MAIL FROM
        script.extend_from_slice(b"550 no such user\r\n"); // RCPT TO rejected
        script.extend_from_slice(b"250 OK\r\n"); // RSET

        let mut transport = ScriptedTransport::new(&script);
        let mut buffer = [0u8; 512];
        let mut session = Session::new();
        session
            .connect(ConnectInfo {
                transport: &mut transport,
                buffer: &mut buffer,
                remote_endpoint: (),
                auth: None,
                client_id: None,
                clock: None,
            })
            .unwrap();

        let to = [Mailbox::new("nobody@y")];
        let message = Message {
            from: Mailbox::new("a@x"),
            to: &to,
            cc: &[],
            bcc: &[],
            subject: None,
            body: None,
        };
        let err = session.send(&message).unwrap_err();
        assert_eq!(err, Error::Protocol);

        // RSET succeeded: the session stayed Ready rather than closing.
        assert!(!transport.closed);
        assert_eq!(
            session.send(&message).unwrap_err(),
            Error::Transport(())
        );
    }

    #[test]
    fn send_before_connect_is_not_connected() {
        let mut session: Session<'_, ScriptedTransport> = Session::new();
        let to = [Mailbox::new("b@y")];
        let message = Message {
            from: Mailbox::new("a@x"),
            to: &to,
            cc: &[],
            bcc: &[],
            subject: None,
            body: None,
        };
        assert_eq!(session.send(&message).unwrap_err(), Error::NotConnected);
    }
}
