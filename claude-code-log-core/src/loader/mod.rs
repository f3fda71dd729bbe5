//! Transcript file loading
//!
//! Reads newline-delimited JSON transcript files into [`ParsedRecord`]s.
//! Each line parses to a raw `serde_json::Value` first (the lossless
//! payload the cache preserves), then into the typed record. Malformed
//! lines and unknown discriminators are logged and skipped; a bad line
//! never aborts the file.
//!
//! Sub-agent sidechain files follow the `agent-<agentId>.jsonl` naming
//! convention and live next to the main transcripts. Their records are
//! merged into the stream with the sidechain flag forced on; where in the
//! stream they belong is the tree builder's concern, not the loader's.

use crate::error::Result;
use crate::types::{ParsedRecord, TranscriptRecord};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Record discriminators this loader understands.
const KNOWN_RECORD_TYPES: &[&str] = &["user", "assistant", "summary", "system", "queue-operation"];

/// Result of loading one or more transcript files.
#[derive(Debug, Default)]
pub struct LoadResult {
    pub records: Vec<ParsedRecord>,
    /// Human-readable notes about skipped lines
    pub warnings: Vec<String>,
}

/// Check if a file is an agent sidechain file (agent-*.jsonl pattern).
pub fn is_agent_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with("agent-"))
        .unwrap_or(false)
}

/// Extract the agent ID from an agent file path.
///
/// Given `agent-a4767a09.jsonl`, returns `Some("a4767a09")`.
pub fn extract_agent_id(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix("agent-").map(|s| s.to_string())
}

/// All transcript files of a project directory, sorted by name.
pub fn find_transcript_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join("*.jsonl");
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| crate::error::Error::Parse {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?
        .filter_map(|entry| entry.ok())
        .collect();
    files.sort();
    Ok(files)
}

/// Sibling sidechain files of a transcript directory.
pub fn find_sidechain_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(find_transcript_files(dir)?
        .into_iter()
        .filter(|path| is_agent_file(path))
        .collect())
}

/// Load one transcript file.
///
/// Records loaded from an agent file are tagged: the sidechain flag is
/// forced on and a missing agent id is filled from the filename, on both
/// the typed record and the preserved raw value.
pub fn load_transcript_file(path: &Path) -> Result<LoadResult> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut result = LoadResult::default();

    let agent_id = if is_agent_file(path) {
        extract_agent_id(path)
    } else {
        None
    };

    for (line_number, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                let warning = format!("{}:{}: read error: {}", path.display(), line_number + 1, e);
                tracing::warn!("{}", warning);
                result.warnings.push(warning);
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let mut raw: serde_json::Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                let warning = format!(
                    "{}:{}: malformed JSON: {}",
                    path.display(),
                    line_number + 1,
                    e
                );
                tracing::warn!("{}", warning);
                result.warnings.push(warning);
                continue;
            }
        };

        let record_type = raw
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if !KNOWN_RECORD_TYPES.contains(&record_type.as_str()) {
            let warning = format!(
                "{}:{}: skipping unknown record type {:?}",
                path.display(),
                line_number + 1,
                record_type
            );
            tracing::warn!("{}", warning);
            result.warnings.push(warning);
            continue;
        }

        if let Some(ref agent_id) = agent_id {
            tag_sidechain(&mut raw, agent_id);
        }

        match serde_json::from_value::<TranscriptRecord>(raw.clone()) {
            Ok(record) => result.records.push(ParsedRecord { record, raw }),
            Err(e) => {
                let warning = format!(
                    "{}:{}: unreadable {} record: {}",
                    path.display(),
                    line_number + 1,
                    record_type,
                    e
                );
                tracing::warn!("{}", warning);
                result.warnings.push(warning);
            }
        }
    }

    Ok(result)
}

/// Load a main transcript together with its sibling sidechain files.
pub fn load_transcript_with_sidechains(path: &Path) -> Result<LoadResult> {
    let mut result = load_transcript_file(path)?;
    if is_agent_file(path) {
        return Ok(result);
    }
    if let Some(dir) = path.parent() {
        for sidechain in find_sidechain_files(dir)? {
            match load_transcript_file(&sidechain) {
                Ok(mut side) => {
                    result.records.append(&mut side.records);
                    result.warnings.append(&mut side.warnings);
                }
                Err(e) => {
                    // A missing or unreadable sidechain file is recoverable.
                    let warning = format!("{}: {}", sidechain.display(), e);
                    tracing::warn!("{}", warning);
                    result.warnings.push(warning);
                }
            }
        }
    }
    Ok(result)
}

/// Force the sidechain flag and default the agent id on a raw record
/// value loaded from an agent file.
fn tag_sidechain(raw: &mut serde_json::Value, agent_id: &str) {
    if let Some(object) = raw.as_object_mut() {
        object.insert("isSidechain".to_string(), serde_json::Value::Bool(true));
        let missing_agent = object
            .get("agentId")
            .map(|v| v.is_null())
            .unwrap_or(true);
        if missing_agent {
            object.insert(
                "agentId".to_string(),
                serde_json::Value::String(agent_id.to_string()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_agent_file() {
        assert!(is_agent_file(Path::new("agent-a4767a09.jsonl")));
        assert!(is_agent_file(Path::new("/path/to/agent-10b3de07.jsonl")));
        assert!(!is_agent_file(Path::new(
            "b4749c81-937a-4bd4-b62c-9d78905f0975.jsonl"
        )));
        assert!(!is_agent_file(Path::new("session.jsonl")));
    }

    #[test]
    fn test_extract_agent_id() {
        assert_eq!(
            extract_agent_id(Path::new("agent-a4767a09.jsonl")),
            Some("a4767a09".to_string())
        );
        assert_eq!(extract_agent_id(Path::new("session.jsonl")), None);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"user","sessionId":"s1","uuid":"u1","timestamp":"2023-01-01T10:00:00Z","message":{"role":"user","content":"hi"}}"#,
                "\n",
                "{not json}\n",
                r#"{"type":"wormhole","data":1}"#,
                "\n",
                r#"{"type":"assistant","sessionId":"s1","uuid":"a1","timestamp":"2023-01-01T10:01:00Z","message":{"role":"assistant","content":[]}}"#,
                "\n",
            ),
        )
        .unwrap();

        let result = load_transcript_file(&path).unwrap();
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_agent_records_are_tagged() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agent-abc123.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"assistant","sessionId":"s1","uuid":"a1","message":{"role":"assistant","content":[{"type":"text","text":"working"}]}}"#,
                "\n",
            ),
        )
        .unwrap();

        let result = load_transcript_file(&path).unwrap();
        assert_eq!(result.records.len(), 1);
        let record = &result.records[0].record;
        assert!(record.is_sidechain());
        assert_eq!(record.agent_id(), Some("abc123"));
        assert_eq!(result.records[0].raw["isSidechain"], true);
    }

    #[test]
    fn test_sidechain_merging() {
        let tmp = TempDir::new().unwrap();
        let main = tmp.path().join("session.jsonl");
        std::fs::write(
            &main,
            concat!(
                r#"{"type":"user","sessionId":"s1","uuid":"u1","message":{"role":"user","content":"hi"}}"#,
                "\n",
            ),
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("agent-x1.jsonl"),
            concat!(
                r#"{"type":"assistant","sessionId":"s1","uuid":"a1","message":{"role":"assistant","content":[{"type":"text","text":"sub"}]}}"#,
                "\n",
            ),
        )
        .unwrap();

        let result = load_transcript_with_sidechains(&main).unwrap();
        assert_eq!(result.records.len(), 2);
        assert!(result.records.iter().any(|r| r.record.is_sidechain()));
    }
}
