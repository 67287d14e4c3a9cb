//! Batch query client: one request per connection, result lines
//! collected up to the end marker, closed with the receipt handshake.

use plagued_wire::{Connection, Opcode, Result as WireResult};
use std::net::SocketAddr;
use tokio::net::TcpStream;

#[derive(Debug, Clone, Copy)]
pub struct QueryClient {
    server: SocketAddr,
}

impl QueryClient {
    pub fn new(server: SocketAddr) -> Self {
        QueryClient { server }
    }

    /// Send one command line and collect the result lines.
    pub async fn request(&self, line: &str) -> WireResult<Vec<String>> {
        let stream = TcpStream::connect(self.server).await?;
        let mut conn = Connection::new(stream);
        conn.send_text(Opcode::ClientRequest, line).await?;

        let mut results = Vec::new();
        loop {
            let msg = conn.recv().await?;
            if msg.opcode == Opcode::EndOfTransmission {
                break;
            }
            results.push(msg.body_text());
        }
        conn.confirm_received().await?;
        Ok(results)
    }
}
