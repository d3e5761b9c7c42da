//! InfluxDB 2.x HTTP client
//!
//! Drives `/api/v2/query` with Flux and streams the annotated-CSV response
//! back as rows; writes go to `/api/v2/write` as line protocol. Uses
//! synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use std::io::{BufRead, BufReader};

use super::{
    ClientFactory, MirrorClients, QueryClient, RangeQuery, RangeStart, RowStream, WriteClient,
};
use crate::models::Point;
use config::Settings;

/// Client for one InfluxDB 2.x instance
#[derive(Debug, Clone)]
pub struct InfluxDb {
    url: String,
    token: String,
    org: String,
}

impl InfluxDb {
    /// Create a client for an endpoint URL, API token, and organization
    pub fn new(url: &str, token: &str, org: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            org: org.to_string(),
        }
    }

    /// Render a range query as Flux
    fn flux(query: &RangeQuery) -> String {
        let start = match query.start {
            RangeStart::Relative(lookback) => format!("-{}s", lookback.num_seconds()),
            RangeStart::Absolute(instant) => instant.to_rfc3339_opts(SecondsFormat::Nanos, true),
        };
        let mut flux = format!(
            "from(bucket:\"{}\") |> range(start: {})",
            query.bucket, start
        );
        if query.latest_only {
            flux.push_str(" |> sort(columns: [\"_time\"]) |> last()");
        }
        flux
    }
}

impl QueryClient for InfluxDb {
    fn query(&self, query: &RangeQuery) -> Result<RowStream> {
        let flux = Self::flux(query);
        let response = ureq::post(&format!("{}/api/v2/query?org={}", self.url, self.org))
            .header("Authorization", &format!("Token {}", self.token))
            .header("Content-Type", "application/vnd.flux")
            .header("Accept", "application/csv")
            .send(flux.as_str())
            .with_context(|| format!("Flux query failed against {}", self.url))?;

        let reader = BufReader::new(response.into_body().into_reader());
        let rows = reader.lines().filter_map(|line| match line {
            Ok(line) => {
                let line = line.trim_end_matches('\r');
                if line.is_empty() {
                    None
                } else {
                    Some(Ok(split_csv_row(line)))
                }
            }
            Err(e) => Some(Err(
                anyhow::Error::new(e).context("Failed to read query response stream")
            )),
        });
        Ok(Box::new(rows))
    }
}

impl WriteClient for InfluxDb {
    fn write(&self, bucket: &str, org: &str, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = points
            .iter()
            .map(Point::to_line_protocol)
            .collect::<Vec<_>>()
            .join("\n");
        let url = format!(
            "{}/api/v2/write?org={}&bucket={}&precision=ns",
            self.url, org, bucket
        );
        ureq::post(&url)
            .header("Authorization", &format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .send(body.as_str())
            .with_context(|| {
                format!("Write of {} points to bucket {} failed", points.len(), bucket)
            })?;
        Ok(())
    }
}

/// Split one CSV line into cells, honoring quoting and doubled quotes
pub(crate) fn split_csv_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    cell.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => cells.push(std::mem::take(&mut cell)),
            c => cell.push(c),
        }
    }
    cells.push(cell);
    cells
}

/// Builds InfluxDB clients from settings
pub struct InfluxFactory;

impl ClientFactory for InfluxFactory {
    fn connect(&self, settings: &Settings) -> Result<MirrorClients> {
        let local = InfluxDb::new(
            &settings.local_url,
            &settings.local_token,
            &settings.local_org,
        );
        let remote = InfluxDb::new(
            &settings.remote_url,
            &settings.remote_token,
            &settings.remote_org,
        );
        Ok(MirrorClients {
            local_query: Box::new(local.clone()),
            local_write: Box::new(local),
            remote_query: Box::new(remote),
        })
    }
}
