use plagued_client::QueryClient;
use plagued_wire::{Connection, Opcode, WireError};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// A canned query server answering every request with the given lines.
async fn fake_server(lines: Vec<&'static str>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let mut conn = Connection::new(stream);
            let req = conn.recv().await.unwrap();
            assert_eq!(req.opcode, Opcode::ClientRequest);
            for line in &lines {
                conn.send_text(Opcode::RequestResult, *line).await.unwrap();
            }
            conn.send_end().await.unwrap();
            conn.await_receipt().await.unwrap();
        }
    });
    addr
}

#[tokio::test]
async fn request_collects_every_result_line() {
    let addr = fake_server(vec!["Spain 2", "Peru 1"]).await;
    let client = QueryClient::new(addr);

    let results = client.request("/numPatientDischarges Flu - -").await.unwrap();
    assert_eq!(results, vec!["Spain 2", "Peru 1"]);

    // The connection is per request; a second request works the same.
    let results = client.request("/numPatientDischarges Flu - -").await.unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn empty_answers_are_an_empty_vec() {
    let addr = fake_server(vec![]).await;
    let client = QueryClient::new(addr);
    let results = client.request("/searchPatientRecord R1").await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn server_going_away_surfaces_as_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Accept and immediately hang up, mid-exchange.
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        drop(stream);
    });

    let client = QueryClient::new(addr);
    match client.request("/searchPatientRecord R1").await {
        Err(WireError::ConnectionReset) => {}
        other => panic!("expected ConnectionReset, got {other:?}"),
    }
}
