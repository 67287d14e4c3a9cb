use plagued_wire::{write_message, Connection, Message, Opcode};
use plagued_worker::state::{finish_registration, obey_master};
use plagued_worker::WorkerState;
use std::fs;
use tempfile::tempdir;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn rescan_reports_only_files_added_after_the_load() {
    let dir = tempdir().unwrap();
    let spain = dir.path().join("Spain");
    fs::create_dir_all(&spain).unwrap();
    fs::write(spain.join("01-01-2020"), "R1 ENTER Ada Lovelace Flu 36\n").unwrap();

    let mut state = WorkerState::new(dir.path().to_path_buf());
    let (stats_stream, _sink) = tokio::io::duplex(1 << 16);
    let mut server = Connection::new(stats_stream);
    state.load_country("Spain", &mut server, false).await.unwrap();

    // Nothing new yet.
    assert!(state.rescan().await.unwrap().is_empty());

    fs::write(spain.join("02-01-2020"), "R2 ENTER Bob Short Flu 40\n").unwrap();
    let fresh = state.rescan().await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].country, "Spain");
    assert_eq!(state.store.len(), 2);
}

#[tokio::test]
async fn registration_streams_one_report_per_file() {
    let dir = tempdir().unwrap();
    for (country, files) in [
        ("Spain", vec![("01-01-2020", "R1 ENTER Ada Lovelace Flu 36\n")]),
        (
            "Peru",
            vec![
                ("02-01-2020", "P1 ENTER Eve Long Flu 44\n"),
                ("03-01-2020", "P2 ENTER Finn West H1N1 29\n"),
            ],
        ),
    ] {
        let country_dir = dir.path().join(country);
        fs::create_dir_all(&country_dir).unwrap();
        for (name, contents) in files {
            fs::write(country_dir.join(name), contents).unwrap();
        }
    }

    // Commander side: the directory assignments arrive over a one-way
    // pipe, exactly as they would over the worker's stdin.
    let (mut commander, mut command_stream) = tokio::io::duplex(1 << 16);
    for country in ["Spain", "Peru"] {
        write_message(&mut commander, &Message::text(Opcode::ReadDir, country))
            .await
            .unwrap();
    }
    write_message(
        &mut commander,
        &Message::text(Opcode::EndOfTransmission, "0"),
    )
    .await
    .unwrap();
    commander.flush().await.unwrap();

    // Statistics side: collect the streamed reports, then acknowledge
    // the end marker.
    let (stats_stream, server_stream) = tokio::io::duplex(1 << 16);
    let stats_task = tokio::spawn(async move {
        let mut server = Connection::new(server_stream);
        let mut reports = Vec::new();
        loop {
            let msg = server.recv().await.unwrap();
            if msg.opcode == Opcode::EndOfTransmission {
                break;
            }
            assert_eq!(msg.opcode, Opcode::FileReport);
            reports.push(msg.body_text());
        }
        server.send_text(Opcode::ResponseReceived, "0").await.unwrap();
        reports
    });

    let mut state = WorkerState::new(dir.path().to_path_buf());
    let mut server = Connection::new(stats_stream);
    obey_master(&mut state, &mut command_stream, &mut server)
        .await
        .unwrap();
    finish_registration(&mut server).await.unwrap();

    assert_eq!(state.countries, vec!["Spain", "Peru"]);
    assert_eq!(state.store.len(), 3);

    let reports = stats_task.await.unwrap();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().any(|r| r.starts_with("Spain/01-01-2020/")));
    assert!(reports.iter().any(|r| r.starts_with("Peru/02-01-2020/")));
    assert!(reports.iter().any(|r| r.starts_with("Peru/03-01-2020/")));
}
