use crate::error::{FeedError, JobLogError};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use fs_err as fs;
use glob::glob;
use serde::Deserialize;
use toolmatrix_types::feed::{JobStatus, UsageRecord};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LoadedJobLog {
    pub path: Utf8PathBuf,
    /// File stem; used as the job id when the log does not carry one.
    pub job_id: String,
    pub records: Result<Vec<UsageRecord>, JobLogError>,
}

/// One job with the tools it consumed.
#[derive(Deserialize)]
struct JobDoc {
    #[serde(default, alias = "jobId")]
    job_id: Option<String>,

    #[serde(default)]
    project: Option<String>,

    #[serde(default)]
    status: Option<JobStatus>,

    #[serde(default, alias = "recordedAt", alias = "finishedAt")]
    recorded_at: Option<DateTime<Utc>>,

    tools: Vec<UsageRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JobLogDoc {
    Job(JobDoc),
    Records(Vec<UsageRecord>),
    Record(UsageRecord),
}

/// Loads every `*.json` job log directly under `usage_dir`, sorted by path.
pub fn load_job_logs(usage_dir: &Utf8Path) -> Result<Vec<LoadedJobLog>, FeedError> {
    if !usage_dir.is_dir() {
        return Err(FeedError::MissingDir {
            path: usage_dir.to_string(),
        });
    }

    let pattern = usage_dir.join("*.json");
    let pattern_str = pattern.as_str();

    debug!(pattern = %pattern_str, "scanning usage feed for job logs");

    let mut out = Vec::new();
    let entries = glob(pattern_str).map_err(|e| FeedError::Glob {
        message: e.to_string(),
    })?;
    for entry in entries {
        let path = entry
            .map_err(|e| FeedError::Glob {
                message: e.to_string(),
            })?
            .to_string_lossy()
            .to_string();

        let utf8_path = Utf8PathBuf::from(path);
        let job_id = utf8_path.file_stem().unwrap_or("unknown").to_string();

        let records = match fs::read_to_string(&utf8_path) {
            Ok(s) => parse_job_log(&s, &job_id),
            Err(e) => Err(JobLogError::Io {
                message: e.to_string(),
            }),
        };

        out.push(LoadedJobLog {
            path: utf8_path,
            job_id,
            records,
        });
    }

    // Deterministic order matters.
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

/// Parses one job log. Job-level fields fill in whatever the tool entries leave out.
pub fn parse_job_log(contents: &str, fallback_job_id: &str) -> Result<Vec<UsageRecord>, JobLogError> {
    let doc: JobLogDoc = serde_json::from_str(contents).map_err(|e| JobLogError::Json {
        message: e.to_string(),
    })?;

    let records = match doc {
        JobLogDoc::Job(job) => {
            let job_id = job.job_id.unwrap_or_else(|| fallback_job_id.to_string());
            job.tools
                .into_iter()
                .map(|mut rec| {
                    if rec.job_id.is_none() {
                        rec.job_id = Some(job_id.clone());
                    }
                    if rec.project.is_none() {
                        rec.project = job.project.clone();
                    }
                    if let Some(status) = job.status {
                        rec.status = status;
                    }
                    if rec.recorded_at.is_none() {
                        rec.recorded_at = job.recorded_at;
                    }
                    rec
                })
                .collect()
        }
        JobLogDoc::Records(records) => with_job_id(records, fallback_job_id),
        JobLogDoc::Record(record) => with_job_id(vec![record], fallback_job_id),
    };

    Ok(records)
}

fn with_job_id(records: Vec<UsageRecord>, fallback_job_id: &str) -> Vec<UsageRecord> {
    records
        .into_iter()
        .map(|mut rec| {
            if rec.job_id.is_none() {
                rec.job_id = Some(fallback_job_id.to_string());
            }
            rec
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_fields_fill_tool_entries() {
        let records = parse_job_log(
            r#"{
                "jobId": "J-100",
                "project": "bracket-a",
                "status": "in_progress",
                "tools": [
                    { "toolId": "FRA-P8201-S15.2R0_H100W16L100X", "minutes": 45 },
                    { "toolId": "FRA-P8400-S3.0", "minutes": 5, "project": "override" }
                ]
            }"#,
            "file-stem",
        )
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].job_id.as_deref(), Some("J-100"));
        assert_eq!(records[0].project.as_deref(), Some("bracket-a"));
        assert_eq!(records[0].status, JobStatus::InProgress);
        assert_eq!(records[1].project.as_deref(), Some("override"));
    }

    #[test]
    fn flat_array_uses_file_stem_as_job_id() {
        let records = parse_job_log(
            r#"[{ "toolId": "FRA-P8201", "minutes": 3 }, { "toolId": "FRA-P8202", "minutes": 4, "jobId": "J-7" }]"#,
            "job-2024-01-02",
        )
        .unwrap();
        assert_eq!(records[0].job_id.as_deref(), Some("job-2024-01-02"));
        assert_eq!(records[1].job_id.as_deref(), Some("J-7"));
    }

    #[test]
    fn single_record_is_accepted() {
        let records = parse_job_log(r#"{ "tool_id": "FRA-P8201", "minutes": 3 }"#, "x").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn garbage_is_a_json_error() {
        let err = parse_job_log("{ not json", "x").unwrap_err();
        assert!(matches!(err, JobLogError::Json { .. }));
    }
}
