//! File-backed URL Metric storage
//!
//! Each slug is stored as `<dir>/<slug>.json`, a JSON array of URL Metric
//! payloads. Files are replaced by writing a temporary file in the same
//! directory, syncing it and renaming it over the target.

use super::{
    MergeMode, StoredUrlMetrics, UrlMetricStore, check_slug, decode_url_metrics, merge_url_metric,
};
use crate::config::DetectiveConfig;
use crate::core::{MetricsError, Result};
use crate::metric::UrlMetric;
use crate::schema::UrlMetricSchema;
use lazy_static::lazy_static;
use log::debug;
use serde_json::Value as JsonValue;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

lazy_static! {
    /// Serializes read-modify-write cycles of every file store in the process.
    static ref FILE_STORE_LOCK: Mutex<()> = Mutex::new(());
}

#[derive(Debug)]
pub struct FileUrlMetricStore {
    dir: PathBuf,
    config: DetectiveConfig,
    schema: UrlMetricSchema,
}

impl FileUrlMetricStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open<P: AsRef<Path>>(dir: P, config: DetectiveConfig) -> Result<Self> {
        Self::open_with_schema(dir, config, UrlMetricSchema::default())
    }

    pub fn open_with_schema<P: AsRef<Path>>(
        dir: P,
        config: DetectiveConfig,
        schema: UrlMetricSchema,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            MetricsError::Storage(format!(
                "Failed to create store directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir, config, schema })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slug))
    }

    fn read_values(&self, slug: &str) -> Result<Vec<JsonValue>> {
        let path = self.path_for(slug);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).map_err(|e| {
            MetricsError::Storage(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let values: Vec<JsonValue> = serde_json::from_reader(BufReader::new(file))?;
        Ok(values)
    }

    fn write_values(&self, slug: &str, values: &[JsonValue]) -> Result<()> {
        let path = self.path_for(slug);
        let temp_file = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| {
            MetricsError::Storage(format!("Failed to create temp file: {}", e))
        })?;

        let mut writer = BufWriter::new(temp_file);
        serde_json::to_writer(&mut writer, values)?;
        writer.flush()?;
        let temp_file = writer
            .into_inner()
            .map_err(|e| MetricsError::Storage(format!("Failed to flush temp file: {}", e)))?;
        temp_file.as_file().sync_all()?;

        temp_file.persist(&path).map_err(|e| {
            MetricsError::Storage(format!("Failed to replace {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}

impl UrlMetricStore for FileUrlMetricStore {
    fn config(&self) -> &DetectiveConfig {
        &self.config
    }

    fn get_url_metrics(&self, slug: &str) -> Result<Vec<UrlMetric>> {
        check_slug(slug)?;
        let _guard = FILE_STORE_LOCK.lock()?;
        let values = self.read_values(slug)?;
        Ok(decode_url_metrics(slug, &values, &self.schema))
    }

    fn store_url_metric(&self, slug: &str, url_metric: UrlMetric) -> Result<StoredUrlMetrics> {
        self.write(slug, url_metric, MergeMode::Always)
    }

    fn store_url_metric_if_incomplete(
        &self,
        slug: &str,
        url_metric: UrlMetric,
    ) -> Result<StoredUrlMetrics> {
        self.write(slug, url_metric, MergeMode::IfIncomplete)
    }
}

impl FileUrlMetricStore {
    fn write(
        &self,
        slug: &str,
        url_metric: UrlMetric,
        mode: MergeMode,
    ) -> Result<StoredUrlMetrics> {
        check_slug(slug)?;
        let _guard = FILE_STORE_LOCK.lock()?;

        let existing = decode_url_metrics(slug, &self.read_values(slug)?, &self.schema);
        let (values, stored) = merge_url_metric(slug, &self.config, existing, url_metric, mode)?;
        self.write_values(slug, &values)?;

        debug!(
            "Wrote {} URL Metrics to {}",
            stored.url_metric_count,
            self.path_for(slug).display()
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const ETAG: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const SLUG: &str = "0123456789abcdef0123456789abcdef";

    fn url_metric(width: u32, timestamp: f64) -> UrlMetric {
        UrlMetric::from_value(json!({
            "url": "https://example.com/",
            "viewport": {"width": width, "height": 640},
            "timestamp": timestamp,
            "etag": ETAG,
            "elements": [],
        }))
        .unwrap()
    }

    #[test]
    fn test_store_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileUrlMetricStore::open(temp_dir.path(), DetectiveConfig::default()).unwrap();
            store.store_url_metric(SLUG, url_metric(400, 1.0)).unwrap();
            store.store_url_metric(SLUG, url_metric(1000, 2.0)).unwrap();
        }

        let store = FileUrlMetricStore::open(temp_dir.path(), DetectiveConfig::default()).unwrap();
        assert!(store.path_for(SLUG).exists());
        let url_metrics = store.get_url_metrics(SLUG).unwrap();
        assert_eq!(url_metrics.len(), 2);
        assert_eq!(url_metrics[0].viewport_width(), 400);
        assert_eq!(url_metrics[1].viewport_width(), 1000);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileUrlMetricStore::open(temp_dir.path(), DetectiveConfig::default()).unwrap();
        fs::write(store.path_for(SLUG), "{not json").unwrap();
        assert!(matches!(
            store.get_url_metrics(SLUG),
            Err(MetricsError::Serialization(_))
        ));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileUrlMetricStore::open(temp_dir.path(), DetectiveConfig::default()).unwrap();
        store.store_url_metric(SLUG, url_metric(400, 1.0)).unwrap();

        let entries: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(format!("{}.json", SLUG))]);
    }
}
