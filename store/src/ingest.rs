use crate::shard::{InsertOutcome, ShardStore};
use crate::stats::CaseStats;
use crate::Result;
use chrono::NaiveDate;
use plagued_common::{
    bracket_of, parse_date, BracketCounts, FileReport, PatientRecord, PlagueError,
};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::warn;

/// What one country scan produced: the streamable per-file reports plus
/// accept/reject counters.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub reports: Vec<FileReport>,
    pub accepted: u64,
    pub rejected: u64,
}

/// Ingest every not-yet-seen record file under `<input_dir>/<country>`,
/// in chronological filename order.
///
/// Each file is named after its reporting day (`dd-mm-yyyy`) and holds
/// lines of `record_id ENTER|EXIT first last disease age`. Malformed
/// lines, invalid ages, duplicates and bad exits are logged and skipped;
/// they never abort the batch. `seen` carries the already-ingested file
/// names across calls, so a rescan after new files appear is incremental.
pub async fn scan_country(
    store: &mut ShardStore,
    stats: &mut CaseStats,
    input_dir: &Path,
    country: &str,
    seen: &mut HashSet<String>,
) -> Result<IngestOutcome> {
    let dir = input_dir.join(country);
    let mut entries = tokio::fs::read_dir(&dir).await?;

    let mut files: Vec<(NaiveDate, String)> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if seen.contains(&name) {
            continue;
        }
        match parse_date(&name) {
            Ok(date) => files.push((date, name)),
            Err(_) => warn!(country, file = %name, "skipping non-date record file"),
        }
    }
    files.sort();

    let mut outcome = IngestOutcome::default();
    for (date, name) in files {
        let contents = tokio::fs::read_to_string(dir.join(&name)).await?;
        let report = ingest_file(store, country, date, &contents, &mut outcome);
        stats.add_report(&report);
        outcome.reports.push(report);
        seen.insert(name);
    }
    Ok(outcome)
}

/// One parsed record line.
#[derive(Debug)]
struct RecordLine<'a> {
    record_id: &'a str,
    entering: bool,
    first_name: &'a str,
    last_name: &'a str,
    disease_id: &'a str,
    age: u16,
}

fn parse_line(line: &str) -> std::result::Result<RecordLine<'_>, PlagueError> {
    let malformed = || PlagueError::MalformedRecord(line.to_string());
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(malformed());
    }
    let entering = match fields[1] {
        "ENTER" => true,
        "EXIT" => false,
        _ => return Err(malformed()),
    };
    let age: i32 = fields[5].parse().map_err(|_| malformed())?;
    if age <= 0 || age > 120 {
        return Err(malformed());
    }
    Ok(RecordLine {
        record_id: fields[0],
        entering,
        first_name: fields[2],
        last_name: fields[3],
        disease_id: fields[4],
        age: age as u16,
    })
}

fn ingest_file(
    store: &mut ShardStore,
    country: &str,
    date: NaiveDate,
    contents: &str,
    outcome: &mut IngestOutcome,
) -> FileReport {
    // Per-disease admission counts for this reporting day only.
    let mut day_stats: BTreeMap<String, BracketCounts> = BTreeMap::new();

    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let rec = match parse_line(line) {
            Ok(rec) => rec,
            Err(err) => {
                warn!(country, %date, %err, "skipping record line");
                outcome.rejected += 1;
                continue;
            }
        };

        let ok = if rec.entering {
            let inserted = store.insert(PatientRecord {
                record_id: rec.record_id.to_string(),
                first_name: rec.first_name.to_string(),
                last_name: rec.last_name.to_string(),
                disease_id: rec.disease_id.to_string(),
                country: country.to_string(),
                age: rec.age,
                entry_date: date,
                exit_date: None,
            });
            if inserted == InsertOutcome::Inserted {
                day_stats.entry(rec.disease_id.to_string()).or_default()
                    [bracket_of(rec.age)] += 1;
                true
            } else {
                warn!(country, record_id = rec.record_id, "duplicate record id");
                false
            }
        } else {
            let updated = store.record_exit(
                rec.record_id,
                rec.first_name,
                rec.last_name,
                rec.disease_id,
                country,
                rec.age,
                date,
            );
            if !updated {
                warn!(country, record_id = rec.record_id, "invalid exit record");
            }
            updated
        };

        if ok {
            outcome.accepted += 1;
        } else {
            outcome.rejected += 1;
        }
    }

    FileReport {
        country: country.to_string(),
        date,
        diseases: day_stats.into_iter().collect(),
    }
}
