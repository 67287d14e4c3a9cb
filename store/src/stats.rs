use chrono::NaiveDate;
use plagued_common::{BracketCounts, FileReport, BRACKET_COUNT, BRACKET_LABELS};
use std::collections::HashMap;

/// Per-country, per-disease daily age-bracket case counts, fed by the
/// same file reports a worker streams to the query server.
///
/// This is the table behind the topk-AgeRanges query; raw patient
/// records are never re-derived for it.
#[derive(Debug, Default)]
pub struct CaseStats {
    by_country: HashMap<String, HashMap<String, Vec<(NaiveDate, BracketCounts)>>>,
}

/// Outcome of a topk-AgeRanges query.
#[derive(Debug, Clone, PartialEq)]
pub enum TopkResult {
    /// Bracket label and percentage, descending, zero-percent brackets
    /// dropped, at most k entries.
    Brackets(Vec<(&'static str, f64)>),
    NoSuchDisease,
    NoCasesInRange,
}

impl TopkResult {
    /// Render to the single response body the worker sends back.
    pub fn to_message(&self) -> String {
        match self {
            TopkResult::NoSuchDisease => "No such disease.".to_string(),
            TopkResult::NoCasesInRange => "No cases in given range of dates.".to_string(),
            TopkResult::Brackets(entries) => entries
                .iter()
                .map(|(label, pct)| format!("{label}: {pct:.1}%"))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl CaseStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one per-file report into the table.
    pub fn add_report(&mut self, report: &FileReport) {
        let diseases = self.by_country.entry(report.country.clone()).or_default();
        for (disease, counts) in &report.diseases {
            diseases
                .entry(disease.clone())
                .or_default()
                .push((report.date, *counts));
        }
    }

    /// Top `k` age brackets by share of cases for a disease in a country
    /// over `[from, to]` (inclusive, `None` unbounded). `k` is clamped
    /// to the bracket count; zero-percentage brackets are skipped even
    /// inside the top-k cut.
    pub fn topk(
        &self,
        k: usize,
        country: &str,
        disease: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> TopkResult {
        let Some(days) = self
            .by_country
            .get(country)
            .and_then(|diseases| diseases.get(disease))
        else {
            return TopkResult::NoSuchDisease;
        };

        let mut sums: [u64; BRACKET_COUNT] = [0; BRACKET_COUNT];
        for (date, counts) in days {
            let in_range =
                from.is_none_or(|d| *date >= d) && to.is_none_or(|d| *date <= d);
            if in_range {
                for (sum, count) in sums.iter_mut().zip(counts) {
                    *sum += count;
                }
            }
        }

        let total: u64 = sums.iter().sum();
        if total == 0 {
            return TopkResult::NoCasesInRange;
        }

        let mut ranked: Vec<(usize, u64)> = sums.iter().copied().enumerate().collect();
        // Stable sort keeps the earlier bracket first on equal counts.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let entries = ranked
            .into_iter()
            .take(k.min(BRACKET_COUNT))
            .filter(|(_, count)| *count > 0)
            .map(|(idx, count)| (BRACKET_LABELS[idx], 100.0 * count as f64 / total as f64))
            .collect();
        TopkResult::Brackets(entries)
    }
}
