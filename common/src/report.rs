use crate::error::{PlagueError, Result};
use crate::types::{parse_date, BracketCounts, DATE_FORMAT};
use chrono::NaiveDate;

/// Per-file age-bracket statistics a worker streams to the query server
/// while loading a shard.
///
/// Wire body layout: `country/date/disease:b0:b1:b2:b3;disease2:...;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub country: String,
    pub date: NaiveDate,
    pub diseases: Vec<(String, BracketCounts)>,
}

impl FileReport {
    pub fn encode(&self) -> String {
        let mut out = format!("{}/{}/", self.country, self.date.format(DATE_FORMAT));
        for (disease, counts) in &self.diseases {
            out.push_str(&format!(
                "{}:{}:{}:{}:{};",
                disease, counts[0], counts[1], counts[2], counts[3]
            ));
        }
        out
    }

    pub fn decode(body: &str) -> Result<Self> {
        let malformed = || PlagueError::MalformedReport(body.to_string());

        let mut parts = body.splitn(3, '/');
        let country = parts.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
        let date = parse_date(parts.next().ok_or_else(malformed)?)?;
        let stats = parts.next().ok_or_else(malformed)?;

        let mut diseases = Vec::new();
        for entry in stats.split(';').filter(|e| !e.is_empty()) {
            let fields: Vec<&str> = entry.split(':').collect();
            if fields.len() != 5 {
                return Err(malformed());
            }
            let mut counts: BracketCounts = [0; 4];
            for (slot, raw) in counts.iter_mut().zip(&fields[1..]) {
                *slot = raw.parse().map_err(|_| malformed())?;
            }
            diseases.push((fields[0].to_string(), counts));
        }

        Ok(FileReport {
            country: country.to_string(),
            date,
            diseases,
        })
    }

    /// The country alone, as the query server's registration path needs.
    pub fn country_of(body: &str) -> Result<&str> {
        body.split('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PlagueError::MalformedReport(body.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_roundtrip() {
        let report = FileReport {
            country: "Spain".into(),
            date: parse_date("10-12-2019").unwrap(),
            diseases: vec![
                ("HIV".into(), [0, 12, 3, 2]),
                ("H1N1".into(), [1, 2, 50, 84]),
            ],
        };
        let body = report.encode();
        assert_eq!(body, "Spain/10-12-2019/HIV:0:12:3:2;H1N1:1:2:50:84;");
        assert_eq!(FileReport::decode(&body).unwrap(), report);
        assert_eq!(FileReport::country_of(&body).unwrap(), "Spain");
    }

    #[test]
    fn rejects_malformed_reports() {
        assert!(FileReport::decode("Spain").is_err());
        assert!(FileReport::decode("Spain/10-12-2019/HIV:1:2:3;").is_err());
        assert!(FileReport::decode("/10-12-2019/").is_err());
    }
}
