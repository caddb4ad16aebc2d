// JSONL export file producer
// Reads a newline-delimited JSON export with blocking IO on the blocking pool.

use async_trait::async_trait;
use harvest_core::application::blocking_stream;
use harvest_core::domain::Record;
use harvest_core::port::{ExtractionParams, OpenedProducer, ProducerError, ProducerSource};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::{Path, PathBuf};
use tracing::info;

/// Option naming the file to read
pub const PATH_OPTION: &str = "path";

/// Producer for `{"path": "..."}` requests
///
/// Relative paths resolve against the base directory when one is set.
#[derive(Debug, Clone, Default)]
pub struct JsonlFileSource {
    base_dir: Option<PathBuf>,
}

impl JsonlFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) if Path::new(path).is_relative() => base.join(path),
            _ => PathBuf::from(path),
        }
    }
}

/// Open the file and count its non-empty lines
fn open_counted(path: &Path) -> std::io::Result<(File, u64)> {
    let mut file = File::open(path)?;
    let mut count = 0u64;
    for line in BufReader::new(&file).lines() {
        if !line?.trim().is_empty() {
            count += 1;
        }
    }
    file.rewind()?;
    Ok((file, count))
}

fn parse_line(line_no: usize, line: std::io::Result<String>) -> Result<Record, ProducerError> {
    let line = line.map_err(|e| ProducerError::Failed(format!("read error at line {}: {}", line_no, e)))?;
    serde_json::from_str(&line)
        .map(Record::new)
        .map_err(|e| ProducerError::Malformed(format!("line {}: {}", line_no, e)))
}

#[async_trait]
impl ProducerSource for JsonlFileSource {
    async fn open(&self, params: &ExtractionParams) -> Result<OpenedProducer, ProducerError> {
        let path = params
            .option_str(PATH_OPTION)
            .map(|p| self.resolve(p))
            .ok_or_else(|| ProducerError::Failed(format!("missing '{}' option", PATH_OPTION)))?;

        let shown = path.display().to_string();
        let (file, lines) = tokio::task::spawn_blocking(move || open_counted(&path))
            .await
            .map_err(|e| ProducerError::Failed(e.to_string()))?
            .map_err(|e| ProducerError::Failed(format!("cannot read {}: {}", shown, e)))?;

        let expected_total = params.limit.map_or(lines, |limit| limit.min(lines));
        let take = usize::try_from(expected_total).unwrap_or(usize::MAX);
        info!(path = %shown, lines, expected_total, "Opened JSONL export");

        let records = blocking_stream(move || {
            BufReader::new(file)
                .lines()
                .enumerate()
                .filter(|(_, line)| !matches!(line, Ok(l) if l.trim().is_empty()))
                .take(take)
                .map(|(idx, line)| parse_line(idx + 1, line))
        });

        Ok(OpenedProducer::new(records).with_expected_total(Some(expected_total)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use std::io::Write;

    fn export_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("harvest-jsonl-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn params_for(path: &Path, limit: Option<u64>) -> ExtractionParams {
        let mut params = ExtractionParams {
            limit,
            ..ExtractionParams::default()
        };
        params
            .options
            .insert(PATH_OPTION.to_string(), json!(path.to_string_lossy()));
        params
    }

    #[tokio::test]
    async fn test_reads_every_line() {
        let path = export_file("all.jsonl", "{\"id\":1}\n\n{\"id\":2}\n{\"id\":3}\n");

        let opened = JsonlFileSource::new()
            .open(&params_for(&path, None))
            .await
            .unwrap();
        assert_eq!(opened.expected_total, Some(3));

        let keys: Vec<String> = opened
            .records
            .map(|r| r.unwrap().key().unwrap())
            .collect()
            .await;
        assert_eq!(keys, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_limit_caps_records() {
        let path = export_file("limited.jsonl", "{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n");

        let opened = JsonlFileSource::new()
            .open(&params_for(&path, Some(2)))
            .await
            .unwrap();
        assert_eq!(opened.expected_total, Some(2));

        let items: Vec<_> = opened.records.collect().await;
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_bad_line_is_malformed() {
        let path = export_file("broken.jsonl", "{\"id\":1}\n{oops\n");

        let opened = JsonlFileSource::new()
            .open(&params_for(&path, None))
            .await
            .unwrap();
        let items: Vec<_> = opened.records.collect().await;

        assert!(items[0].is_ok());
        assert!(matches!(&items[1], Err(ProducerError::Malformed(msg)) if msg.contains("line 2")));
    }

    #[tokio::test]
    async fn test_missing_path_option() {
        let err = JsonlFileSource::new()
            .open(&ExtractionParams::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("path"));
    }

    #[tokio::test]
    async fn test_unreadable_file() {
        let err = JsonlFileSource::new()
            .open(&params_for(Path::new("/nonexistent/export.jsonl"), None))
            .await
            .unwrap_err();

        assert!(matches!(err, ProducerError::Failed(msg) if msg.contains("cannot read")));
    }

    #[tokio::test]
    async fn test_relative_path_uses_base_dir() {
        let path = export_file("relative.jsonl", "{\"id\":\"a\"}\n");
        let base = path.parent().unwrap().to_path_buf();
        let mut params = ExtractionParams::default();
        params
            .options
            .insert(PATH_OPTION.to_string(), json!("relative.jsonl"));

        let opened = JsonlFileSource::with_base_dir(base)
            .open(&params)
            .await
            .unwrap();

        assert_eq!(opened.expected_total, Some(1));
    }
}
