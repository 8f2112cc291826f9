use std::path::Path;

use serde::Serialize;

use clip_align_engine::align::PairOutcome;
use clip_align_types::{AlignError, AlignResult};

/// One line of the JSON report, success or failure.
#[derive(Debug, Serialize)]
pub struct PairRecord {
    pub pair_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_sampled_frames: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_original_frames: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&PairOutcome> for PairRecord {
    fn from(outcome: &PairOutcome) -> Self {
        match &outcome.outcome {
            Ok(result) => Self {
                pair_id: outcome.pair_id.clone(),
                status: "ok",
                offset_sampled_frames: Some(result.offset_sampled_frames),
                offset_original_frames: Some(result.offset_original_frames),
                offset_seconds: Some(result.offset_seconds),
                error: None,
            },
            Err(err) => Self {
                pair_id: outcome.pair_id.clone(),
                status: "error",
                offset_sampled_frames: None,
                offset_original_frames: None,
                offset_seconds: None,
                error: Some(err.to_string()),
            },
        }
    }
}

pub async fn write_report(path: &Path, records: &[PairRecord]) -> AlignResult<()> {
    let encoded = serde_json::to_vec_pretty(records)
        .map_err(|err| AlignError::persist(path, err.to_string()))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| AlignError::persist(parent, err.to_string()))?;
        }
    }
    tokio::fs::write(path, encoded)
        .await
        .map_err(|err| AlignError::persist(path, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clip_align_types::AlignmentResult;

    #[tokio::test(flavor = "multi_thread")]
    async fn report_serializes_successes_and_failures() {
        let outcomes = vec![
            PairOutcome {
                pair_id: "a".into(),
                outcome: Ok(AlignmentResult {
                    pair_id: "a".into(),
                    offset_sampled_frames: 5,
                    offset_original_frames: 15,
                    offset_seconds: 0.5,
                }),
            },
            PairOutcome {
                pair_id: "b".into(),
                outcome: Err(AlignError::source_unavailable("b.mp4", "gone")),
            },
        ];
        let records: Vec<PairRecord> = outcomes.iter().map(PairRecord::from).collect();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_report(&path, &records).await.unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[0]["status"], "ok");
        assert_eq!(parsed[0]["offset_original_frames"], 15);
        assert_eq!(parsed[1]["status"], "error");
        assert!(parsed[1]["error"].as_str().unwrap().contains("b.mp4"));
    }
}
