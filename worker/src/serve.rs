use crate::state::WorkerState;
use plagued_common::{ClientCommand, QueryArgs};
use plagued_wire::{Connection, Opcode, Result as WireResult};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

/// Answer one query connection: decode a single request, dispatch by
/// opcode, stream the answer, then run the responder half of the
/// closing handshake.
pub async fn handle_query<S>(state: &WorkerState, stream: S) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = Connection::new(stream);
    let msg = conn.recv().await?;
    let body = msg.body_text();

    match msg.opcode {
        Opcode::SearchPatient => {
            let record_id = body.trim();
            match state.store.find_patient(record_id) {
                Some(rec) => {
                    conn.send_text(Opcode::SearchSuccess, rec.summary()).await?;
                }
                None => conn.send_text(Opcode::SearchFailure, "").await?,
            }
        }
        Opcode::DiseaseFrequency => match QueryArgs::decode(&body) {
            Ok(args) => {
                let count = state.store.admissions_in_range(
                    &args.disease,
                    args.from,
                    args.to,
                    args.country.as_deref(),
                );
                conn.send_text(Opcode::DiseaseFrequencyResult, count.to_string())
                    .await?;
            }
            Err(err) => reject(&mut conn, &body, err).await?,
        },
        Opcode::NumAdmissions => match QueryArgs::decode(&body) {
            Ok(args) => {
                let total = match args.country.as_deref() {
                    Some(country) => state.store.admissions_in_range(
                        &args.disease,
                        args.from,
                        args.to,
                        Some(country),
                    ),
                    // Fan out across every country this worker owns.
                    None => state
                        .countries
                        .iter()
                        .map(|c| {
                            state
                                .store
                                .admissions_in_range(&args.disease, args.from, args.to, Some(c))
                        })
                        .sum(),
                };
                conn.send_text(Opcode::NumAdmissionsResult, total.to_string())
                    .await?;
            }
            Err(err) => reject(&mut conn, &body, err).await?,
        },
        Opcode::NumDischarges => match QueryArgs::decode(&body) {
            Ok(args) => match args.country.as_deref() {
                Some(country) => {
                    let count = state.store.discharges_in_range(
                        &args.disease,
                        args.from,
                        args.to,
                        Some(country),
                    );
                    conn.send_text(Opcode::NumDischargesResult, format!("{country} {count}"))
                        .await?;
                }
                None => {
                    // One result line per owned country.
                    for country in &state.countries {
                        let count = state.store.discharges_in_range(
                            &args.disease,
                            args.from,
                            args.to,
                            Some(country),
                        );
                        conn.send_text(Opcode::NumDischargesResult, format!("{country} {count}"))
                            .await?;
                    }
                }
            },
            Err(err) => reject(&mut conn, &body, err).await?,
        },
        Opcode::TopkAgeRanges => match ClientCommand::parse(&body) {
            Ok(ClientCommand::TopkAgeRanges {
                k,
                country,
                disease,
                from,
                to,
            }) => {
                let result = state.stats.topk(k, &country, &disease, from, to);
                conn.send_text(Opcode::TopkAgeRangesResult, result.to_message())
                    .await?;
            }
            Ok(_) | Err(_) => {
                warn!(request = %body.trim_end(), "malformed topk request");
                conn.send_text(Opcode::TopkAgeRangesResult, "Unknown command.")
                    .await?;
            }
        },
        other => {
            warn!(?other, "unsupported request opcode");
            conn.send_text(Opcode::RequestResult, "Unknown command.")
                .await?;
        }
    }

    conn.send_end().await?;
    conn.await_receipt().await
}

async fn reject<S>(
    conn: &mut Connection<S>,
    body: &str,
    err: plagued_common::PlagueError,
) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    warn!(request = %body.trim_end(), %err, "rejecting malformed query body");
    conn.send_text(Opcode::RequestResult, "Unknown command.").await
}
