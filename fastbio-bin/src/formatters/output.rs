use anyhow::Result;
use fastbio_lib::{BatchResponse, DispatchStats, Outcome};
use serde::Serialize;
use serde_json::Value;

/// Turns the outcomes of a batch into the bytes written to standard output
pub(crate) trait PayloadFormatter {
    fn format(&self, response: &BatchResponse, stats: &DispatchStats) -> Result<Vec<u8>>;
}

/// Every successful payload as it is, each one terminated by a newline.
/// Empty payloads (`404 Not Found`) produce no output.
pub(crate) struct Raw;

impl PayloadFormatter for Raw {
    fn format(&self, response: &BatchResponse, _stats: &DispatchStats) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for payload in response.successes().filter_map(Outcome::payload) {
            if payload.is_empty() {
                continue;
            }
            out.extend_from_slice(payload);
            if !payload.ends_with(b"\n") {
                out.push(b'\n');
            }
        }
        Ok(out)
    }
}

/// A single JSON document with one entry per request, in request order
pub(crate) struct Json;

#[derive(Serialize)]
struct JsonReport<'a> {
    results: Vec<JsonOutcome<'a>>,
    stats: &'a DispatchStats,
}

#[derive(Serialize)]
struct JsonOutcome<'a> {
    index: usize,
    method: String,
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> From<&'a Outcome> for JsonOutcome<'a> {
    fn from(outcome: &'a Outcome) -> Self {
        let (payload, error) = match &outcome.result {
            Ok(payload) => (Some(payload_value(payload)), None),
            Err(e) => (None, Some(e.to_string())),
        };
        JsonOutcome {
            index: outcome.index,
            method: outcome.method.to_string(),
            url: outcome.url.as_str(),
            payload,
            error,
        }
    }
}

/// JSON payloads are embedded as they are, anything else as a string.
/// An empty payload is `null`.
fn payload_value(payload: &[u8]) -> Value {
    if payload.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()))
}

impl PayloadFormatter for Json {
    fn format(&self, response: &BatchResponse, stats: &DispatchStats) -> Result<Vec<u8>> {
        let report = JsonReport {
            results: response.outcomes().iter().map(JsonOutcome::from).collect(),
            stats,
        };
        let mut out = serde_json::to_vec_pretty(&report)?;
        out.push(b'\n');
        Ok(out)
    }
}
