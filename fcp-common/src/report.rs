//! JSON reports presented to the decision provider

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::state::write_json_atomic;
use crate::Result;

#[derive(Serialize)]
struct ReportEnvelope<'a, R> {
    kind: &'a str,
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    body: &'a R,
}

/// Write `body` as `<dir>/<kind>.json`, replacing the previous report of that kind
pub fn write_report<R: Serialize>(dir: &Path, kind: &str, body: &R) -> Result<PathBuf> {
    let path = dir.join(format!("{}.json", kind));
    let envelope = ReportEnvelope {
        kind,
        generated_at: crate::time::now(),
        body,
    };
    write_json_atomic(&path, &envelope)?;
    info!(report = kind, path = %path.display(), "Report written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    #[derive(Serialize)]
    struct Sample {
        balanced: bool,
    }

    #[test]
    fn test_report_is_flattened_into_envelope() {
        let dir = TempDir::new().unwrap();
        let path = write_report(dir.path(), "balancing_report", &Sample { balanced: true }).unwrap();
        let json: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["kind"], "balancing_report");
        assert_eq!(json["balanced"], true);
        assert!(json["generated_at"].is_string());
    }
}
