use crate::message::{Message, Opcode, HEADER_LEN, MAX_BODY_LEN};
use crate::{Result, WireError};
use bytes::{Bytes, BytesMut};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tracing::trace;

/// Write one framed message. Partial writes are absorbed by `write_all`.
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(HEADER_LEN + msg.body.len());
    msg.encode(&mut buf);
    writer.write_all(&buf).await?;
    Ok(())
}

/// Read one framed message, retrying partial reads until the exact header
/// and body widths have been consumed.
///
/// EOF or a reset before a complete frame surfaces as
/// [`WireError::ConnectionReset`]; it never panics the process.
pub async fn read_message<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    read_exact_or_reset(reader, &mut header).await?;

    let opcode = Opcode::from(header[0]);
    let len_field = &header[1..];
    if !len_field.iter().all(u8::is_ascii_digit) {
        return Err(WireError::BadHeader(
            String::from_utf8_lossy(len_field).into_owned(),
        ));
    }
    // The field is 10 digits, so this cannot overflow usize on 64-bit.
    let body_len: usize = std::str::from_utf8(len_field)
        .map_err(|_| WireError::BadHeader("non-utf8 length".into()))?
        .parse()
        .map_err(|_| WireError::BadHeader(String::from_utf8_lossy(len_field).into_owned()))?;
    if body_len > MAX_BODY_LEN {
        return Err(WireError::BadHeader(format!("body too large: {body_len}")));
    }

    let mut body = vec![0u8; body_len];
    read_exact_or_reset(reader, &mut body).await?;

    trace!(?opcode, body_len, "read message");
    Ok(Message::new(opcode, body))
}

async fn read_exact_or_reset<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    reader.read_exact(buf).await.map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
            WireError::ConnectionReset
        }
        _ => WireError::Io(e),
    })?;
    Ok(())
}

/// A buffered, framed peer connection over any byte stream: TCP sockets
/// between processes, or the master's pipe to a worker.
#[derive(Debug)]
pub struct Connection<S> {
    stream: BufStream<S>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Connection {
            stream: BufStream::new(stream),
        }
    }

    /// Send one message and flush it to the peer.
    pub async fn send(&mut self, opcode: Opcode, body: impl Into<Bytes>) -> Result<()> {
        write_message(&mut self.stream, &Message::new(opcode, body)).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Send one message with a text body.
    pub async fn send_text(&mut self, opcode: Opcode, body: impl Into<String>) -> Result<()> {
        self.send(opcode, body.into().into_bytes()).await
    }

    /// Receive the next message.
    pub async fn recv(&mut self) -> Result<Message> {
        read_message(&mut self.stream).await
    }

    /// Mark the end of a streamed answer.
    pub async fn send_end(&mut self) -> Result<()> {
        self.send_text(Opcode::EndOfTransmission, "0").await
    }

    /// Requester half of the closing handshake: confirm receipt of a full
    /// answer and wait for the responder's final end marker.
    pub async fn confirm_received(&mut self) -> Result<()> {
        self.send_text(Opcode::ResponseReceived, "0").await?;
        self.recv().await?;
        Ok(())
    }

    /// Responder half of the closing handshake: wait for the requester's
    /// confirmation, then send the final end marker.
    pub async fn await_receipt(&mut self) -> Result<()> {
        self.recv().await?;
        self.send_end().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let mut tx = Connection::new(client);
        let mut rx = Connection::new(server);

        tx.send_text(Opcode::ClientRequest, "/searchPatientRecord R1\n")
            .await
            .unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.opcode, Opcode::ClientRequest);
        assert_eq!(msg.body_text(), "/searchPatientRecord R1\n");
    }

    #[tokio::test]
    async fn reassembles_partial_reads() {
        let (mut raw, server) = tokio::io::duplex(1024);

        let mut framed = BytesMut::new();
        Message::text(Opcode::RequestResult, "hello world").encode(&mut framed);

        // Dribble the frame a few bytes at a time across the header/body
        // boundary; the reader must keep retrying until it has it all.
        let writer = tokio::spawn(async move {
            for chunk in framed.chunks(3) {
                raw.write_all(chunk).await.unwrap();
                raw.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
            raw
        });

        let mut rx = Connection::new(server);
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.opcode, Opcode::RequestResult);
        assert_eq!(msg.body_text(), "hello world");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn reset_before_full_header_is_a_transport_failure() {
        let (mut raw, server) = tokio::io::duplex(1024);
        raw.write_all(b"\x0100000").await.unwrap();
        drop(raw); // peer goes away mid-header

        let mut rx = Connection::new(server);
        match rx.recv().await {
            Err(WireError::ConnectionReset) => {}
            other => panic!("expected ConnectionReset, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reset_before_full_body_is_a_transport_failure() {
        let (mut raw, server) = tokio::io::duplex(1024);
        raw.write_all(b"\x020000000010abc").await.unwrap();
        drop(raw);

        let mut rx = Connection::new(server);
        assert!(matches!(rx.recv().await, Err(WireError::ConnectionReset)));
    }

    #[tokio::test]
    async fn garbage_length_field_is_rejected() {
        let (mut raw, server) = tokio::io::duplex(1024);
        raw.write_all(b"\x02not-digits!body").await.unwrap();

        let mut rx = Connection::new(server);
        assert!(matches!(rx.recv().await, Err(WireError::BadHeader(_))));
    }

    #[tokio::test]
    async fn closing_handshake_pairs_up() {
        let (client, server) = tokio::io::duplex(1024);
        let mut requester = Connection::new(client);
        let mut responder = Connection::new(server);

        let responder_task = tokio::spawn(async move {
            responder.send_end().await.unwrap();
            responder.await_receipt().await.unwrap();
        });

        let end = requester.recv().await.unwrap();
        assert_eq!(end.opcode, Opcode::EndOfTransmission);
        requester.confirm_received().await.unwrap();
        responder_task.await.unwrap();
    }
}
