use crate::error::{PlagueError, Result};
use crate::types::{format_date_bound, parse_date_bound};
use chrono::NaiveDate;

/// A validated client query command.
///
/// Dates are `dd-mm-yyyy`; a `-` bound means unbounded on that side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    SearchPatient {
        record_id: String,
    },
    DiseaseFrequency {
        args: QueryArgs,
    },
    NumAdmissions {
        args: QueryArgs,
    },
    NumDischarges {
        args: QueryArgs,
    },
    TopkAgeRanges {
        k: usize,
        country: String,
        disease: String,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

impl ClientCommand {
    /// Tokenize and validate one newline-terminated command line.
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next().ok_or(PlagueError::UnknownCommand)?;
        let rest: Vec<&str> = tokens.collect();

        match name {
            "/searchPatientRecord" => {
                if rest.len() != 1 {
                    return Err(PlagueError::InvalidArgument(
                        "expected: /searchPatientRecord <record id>".into(),
                    ));
                }
                Ok(ClientCommand::SearchPatient {
                    record_id: rest[0].to_string(),
                })
            }
            "/diseaseFrequency" => Ok(ClientCommand::DiseaseFrequency {
                args: QueryArgs::from_tokens(&rest)?,
            }),
            "/numPatientAdmissions" => Ok(ClientCommand::NumAdmissions {
                args: QueryArgs::from_tokens(&rest)?,
            }),
            "/numPatientDischarges" => Ok(ClientCommand::NumDischarges {
                args: QueryArgs::from_tokens(&rest)?,
            }),
            "/topk-AgeRanges" => {
                if rest.len() != 5 {
                    return Err(PlagueError::InvalidArgument(
                        "expected: /topk-AgeRanges <k> <country> <disease> <from> <to>".into(),
                    ));
                }
                let k: usize = rest[0]
                    .parse()
                    .map_err(|_| PlagueError::InvalidArgument(format!("bad k: {}", rest[0])))?;
                if k == 0 {
                    return Err(PlagueError::InvalidArgument("k must be positive".into()));
                }
                let (from, to) = parse_range(rest[3], rest[4])?;
                Ok(ClientCommand::TopkAgeRanges {
                    k,
                    country: rest[1].to_string(),
                    disease: rest[2].to_string(),
                    from,
                    to,
                })
            }
            _ => Err(PlagueError::UnknownCommand),
        }
    }
}

fn parse_range(from: &str, to: &str) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
    let from = parse_date_bound(from)?;
    let to = parse_date_bound(to)?;
    if let (Some(a), Some(b)) = (from, to) {
        if a > b {
            return Err(PlagueError::InvalidArgument(
                "start date is after end date".into(),
            ));
        }
    }
    Ok((from, to))
}

/// Arguments shared by the frequency/admission/discharge queries.
///
/// Wire body layout: `disease:from:to:country`, with a single space
/// standing in for a missing country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryArgs {
    pub disease: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub country: Option<String>,
}

impl QueryArgs {
    fn from_tokens(tokens: &[&str]) -> Result<Self> {
        if tokens.len() != 3 && tokens.len() != 4 {
            return Err(PlagueError::InvalidArgument(
                "expected: <disease> <from> <to> [country]".into(),
            ));
        }
        let (from, to) = parse_range(tokens[1], tokens[2])?;
        Ok(QueryArgs {
            disease: tokens[0].to_string(),
            from,
            to,
            country: tokens.get(3).map(|s| s.to_string()),
        })
    }

    /// Compose the colon-separated wire body.
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.disease,
            format_date_bound(self.from),
            format_date_bound(self.to),
            self.country.as_deref().unwrap_or(" ")
        )
    }

    /// Parse the colon-separated wire body.
    pub fn decode(body: &str) -> Result<Self> {
        let fields: Vec<&str> = body.splitn(4, ':').collect();
        if fields.len() != 4 {
            return Err(PlagueError::InvalidArgument(format!(
                "bad query body: {body}"
            )));
        }
        let country = fields[3].trim();
        Ok(QueryArgs {
            disease: fields[0].to_string(),
            from: parse_date_bound(fields[1])?,
            to: parse_date_bound(fields[2])?,
            country: if country.is_empty() {
                None
            } else {
                Some(country.to_string())
            },
        })
    }
}

/// The query server's statistics endpoint, as handed to workers by the
/// master. Wire body layout: `host!port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub host: String,
    pub port: u16,
}

impl ServerInfo {
    pub fn encode(&self) -> String {
        format!("{}!{}", self.host, self.port)
    }

    pub fn decode(body: &str) -> Result<Self> {
        let (host, port) = body
            .split_once('!')
            .ok_or_else(|| PlagueError::InvalidArgument(format!("bad server info: {body}")))?;
        let port = port
            .trim()
            .parse()
            .map_err(|_| PlagueError::InvalidArgument(format!("bad server port: {port}")))?;
        Ok(ServerInfo {
            host: host.to_string(),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_date;

    #[test]
    fn parses_search_patient() {
        let cmd = ClientCommand::parse("/searchPatientRecord R77\n").unwrap();
        assert_eq!(
            cmd,
            ClientCommand::SearchPatient {
                record_id: "R77".into()
            }
        );
    }

    #[test]
    fn parses_disease_frequency_with_and_without_country() {
        let cmd =
            ClientCommand::parse("/diseaseFrequency Flu 01-01-2020 05-01-2020 Spain").unwrap();
        match cmd {
            ClientCommand::DiseaseFrequency { args } => {
                assert_eq!(args.disease, "Flu");
                assert_eq!(args.country.as_deref(), Some("Spain"));
                assert_eq!(args.from, Some(parse_date("01-01-2020").unwrap()));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cmd = ClientCommand::parse("/diseaseFrequency Flu - 05-01-2020").unwrap();
        match cmd {
            ClientCommand::DiseaseFrequency { args } => {
                assert_eq!(args.from, None);
                assert_eq!(args.country, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_inverted_range_and_unknown_command() {
        assert!(ClientCommand::parse("/diseaseFrequency Flu 05-01-2020 01-01-2020").is_err());
        assert_eq!(
            ClientCommand::parse("/listEverything"),
            Err(PlagueError::UnknownCommand)
        );
        assert_eq!(ClientCommand::parse(""), Err(PlagueError::UnknownCommand));
    }

    #[test]
    fn query_args_roundtrip() {
        let args = QueryArgs {
            disease: "H1N1".into(),
            from: Some(parse_date("02-02-2021").unwrap()),
            to: None,
            country: None,
        };
        let body = args.encode();
        assert_eq!(body, "H1N1:02-02-2021:-: ");
        assert_eq!(QueryArgs::decode(&body).unwrap(), args);

        let args = QueryArgs {
            country: Some("Peru".into()),
            ..args
        };
        assert_eq!(QueryArgs::decode(&args.encode()).unwrap(), args);
    }

    #[test]
    fn server_info_roundtrip() {
        let info = ServerInfo {
            host: "127.0.0.1".into(),
            port: 9009,
        };
        assert_eq!(ServerInfo::decode(&info.encode()).unwrap(), info);
        assert!(ServerInfo::decode("no-port-here").is_err());
    }
}
