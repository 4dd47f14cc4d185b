//! The highlights pipeline: store → analyze → cut.
//!
//! Stages run one after another inside the request that triggered them.
//! Storage and analysis failures abandon the run. Clip extraction is per
//! highlight: a bad timestamp or a failed ffmpeg call marks that one clip
//! as failed and the rest carry on.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use hlgen_cloud::{clip_object_key, upload_object_key, HighlightAnalyzer, ObjectStore, VideoReference};
use hlgen_media::ClipExtractor;
use hlgen_models::upload::VIDEO_CONTENT_TYPE;
use hlgen_models::{ClipOutcome, HighlightDescriptor, HighlightEntry, HighlightReport, SourceVideo};
use tracing::{info_span, Instrument};

use crate::error::ApiResult;
use crate::ingest::UploadedVideo;
use crate::logging::RunLogger;
use crate::metrics;
use crate::session::Session;

/// The three collaborators of a run.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    analyzer: Arc<dyn HighlightAnalyzer>,
    extractor: Arc<dyn ClipExtractor>,
    upload_clips: bool,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        analyzer: Arc<dyn HighlightAnalyzer>,
        extractor: Arc<dyn ClipExtractor>,
    ) -> Self {
        Self {
            store,
            analyzer,
            extractor,
            upload_clips: true,
        }
    }

    /// Upload extracted clips to the bucket.
    pub fn with_clip_upload(mut self, enabled: bool) -> Self {
        self.upload_clips = enabled;
        self
    }

    /// Run all stages for a video already written to the session directory.
    pub async fn run(&self, session: &Session, video: &UploadedVideo) -> ApiResult<HighlightReport> {
        let span = info_span!("pipeline", session_id = %session.id(), file = %video.file_name);
        let result = self.run_stages(session, video).instrument(span).await;
        metrics::record_pipeline_run(if result.is_ok() { "completed" } else { "failed" });
        result
    }

    async fn run_stages(&self, session: &Session, video: &UploadedVideo) -> ApiResult<HighlightReport> {
        let logger = RunLogger::new(session.id());

        // Store
        let log = logger.stage("store");
        log.log_start(&format!("uploading {} ({} bytes)", video.file_name, video.size_bytes));
        let start = Instant::now();
        let key = upload_object_key(session.id().as_str(), &video.file_name, Utc::now());
        let stored = self
            .store
            .put_file(&video.path, &key, VIDEO_CONTENT_TYPE)
            .await
            .inspect_err(|e| log.log_error(&e.to_string()))?;
        metrics::record_stage_duration("store", start.elapsed().as_secs_f64());
        log.log_completion(&stored.uri);

        let source = SourceVideo {
            file_name: video.file_name.clone(),
            size_bytes: video.size_bytes,
            object_key: stored.key.clone(),
            gcs_uri: stored.uri.clone(),
            public_url: stored.url.clone(),
        };

        // Analyze
        let log = logger.stage("analyze");
        log.log_start(&stored.uri);
        let start = Instant::now();
        let response = self
            .analyzer
            .analyze(&VideoReference::mp4(&stored.uri))
            .await
            .inspect_err(|e| log.log_error(&e.to_string()))?;
        metrics::record_stage_duration("analyze", start.elapsed().as_secs_f64());
        log.log_completion(&format!("{} highlights", response.highlights.len()));

        // Extract
        let log = logger.stage("extract");
        let start = Instant::now();
        let mut entries = Vec::with_capacity(response.highlights.len());
        for descriptor in response.highlights {
            let outcome = self.extract_one(session, &video.path, &descriptor, &log).await;
            metrics::record_clip(if outcome.is_ready() { "ready" } else { "failed" });
            entries.push(HighlightEntry::new(descriptor, outcome));
        }
        metrics::record_stage_duration("extract", start.elapsed().as_secs_f64());

        let report = HighlightReport::new(session.id().as_str(), source, entries);
        log.log_completion(&format!(
            "{} clips ready, {} failed",
            report.clips_ready, report.clips_failed
        ));
        Ok(report)
    }

    async fn extract_one(
        &self,
        session: &Session,
        source: &Path,
        descriptor: &HighlightDescriptor,
        log: &RunLogger,
    ) -> ClipOutcome {
        let number = descriptor.highlight_number;

        let range = match descriptor.clip_range() {
            Ok(range) => range,
            Err(e) => {
                log.log_warning(&format!("highlight {}: {}", number, e));
                return ClipOutcome::failed(format!("Invalid timestamps: {}", e));
            }
        };

        let file_name = descriptor.clip_file_name();
        let output = session.clip_path(&file_name);
        let clip = match self.extractor.extract(source, &range, &output).await {
            Ok(clip) => clip,
            Err(e) => {
                log.log_warning(&format!("highlight {}: {}", number, e));
                return ClipOutcome::failed(e.user_message());
            }
        };
        log.log_progress(&format!(
            "highlight {} cut ({} → {}, {} bytes)",
            number, descriptor.start_time, descriptor.end_time, clip.size_bytes
        ));

        let (remote_url, upload_error) = if self.upload_clips {
            let key = clip_object_key(session.id().as_str(), &file_name, Utc::now());
            match self.store.put_file(&clip.path, &key, VIDEO_CONTENT_TYPE).await {
                Ok(object) => (Some(object.url), None),
                Err(e) => {
                    log.log_warning(&format!("highlight {} upload failed: {}", number, e));
                    (None, Some(e.to_string()))
                }
            }
        } else {
            (None, None)
        };

        ClipOutcome::Ready {
            file_name,
            size_bytes: clip.size_bytes,
            duration_secs: clip.duration_secs,
            remote_url,
            upload_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::session::SessionStore;
    use async_trait::async_trait;
    use hlgen_cloud::{AnalysisError, AnalysisResult, StorageError, StorageResult, StoredObject};
    use hlgen_media::{ExtractedClip, MediaError, MediaResult};
    use hlgen_models::{ClipRange, HighlightsResponse};
    use mockall::mock;
    use std::time::Duration;

    mock! {
        Store {}
        #[async_trait]
        impl ObjectStore for Store {
            async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<StoredObject>;
            async fn check_connectivity(&self) -> StorageResult<()>;
        }
    }

    mock! {
        Analyzer {}
        #[async_trait]
        impl HighlightAnalyzer for Analyzer {
            async fn analyze(&self, video: &VideoReference) -> AnalysisResult<HighlightsResponse>;
        }
    }

    mock! {
        Extractor {}
        #[async_trait]
        impl ClipExtractor for Extractor {
            async fn extract(&self, source: &Path, range: &ClipRange, output: &Path) -> MediaResult<ExtractedClip>;
        }
    }

    fn stored(key: &str) -> StoredObject {
        StoredObject {
            key: key.to_string(),
            uri: format!("gs://bucket/{}", key),
            url: format!("https://storage.googleapis.com/bucket/{}", key),
            size_bytes: 4,
        }
    }

    fn highlight(n: u32, start: &str, end: &str) -> HighlightDescriptor {
        HighlightDescriptor::new(n, start, end, "A great moment", "Goal")
    }

    async fn fixture() -> (tempfile::TempDir, Arc<Session>, UploadedVideo) {
        let root = tempfile::tempdir().unwrap();
        let store = SessionStore::new(root.path(), Duration::from_secs(60));
        let session = store.create().await.unwrap();
        let path = session.input_path("game.mp4");
        tokio::fs::write(&path, b"fake").await.unwrap();
        let video = UploadedVideo {
            file_name: "game.mp4".to_string(),
            path,
            size_bytes: 4,
        };
        (root, session, video)
    }

    fn ok_extract(_: &Path, range: &ClipRange, output: &Path) -> MediaResult<ExtractedClip> {
        Ok(ExtractedClip {
            path: output.to_path_buf(),
            size_bytes: 1024,
            duration_secs: Some(range.duration_secs()),
        })
    }

    #[tokio::test]
    async fn test_one_bad_timestamp_fails_only_that_clip() {
        let (_root, session, video) = fixture().await;

        let mut store = MockStore::new();
        store
            .expect_put_file()
            .withf(|_, key, _| key.starts_with("uploads/") && key.ends_with("_game.mp4"))
            .times(1)
            .returning(|_, key, _| Ok(stored(key)));

        let mut analyzer = MockAnalyzer::new();
        analyzer
            .expect_analyze()
            .withf(|video| video.uri.starts_with("gs://bucket/uploads/") && video.mime_type == "video/mp4")
            .times(1)
            .returning(|_| {
                Ok(HighlightsResponse {
                    highlights: vec![
                        highlight(1, "00:02", "00:10"),
                        highlight(2, "0:99", "01:10"),
                        highlight(3, "01:30", "02:00"),
                    ],
                })
            });

        let mut extractor = MockExtractor::new();
        extractor.expect_extract().times(2).returning(ok_extract);

        let pipeline = Pipeline::new(Arc::new(store), Arc::new(analyzer), Arc::new(extractor)).with_clip_upload(false);
        let report = pipeline.run(&session, &video).await.unwrap();

        assert_eq!(report.highlights.len(), 3);
        assert_eq!(report.clips_ready, 2);
        assert_eq!(report.clips_failed, 1);
        assert!(report.highlights[1].clip.error().unwrap().contains("Invalid timestamps"));
        assert_eq!(report.highlights[0].clip.file_name(), Some("highlight_1.mp4"));
        assert_eq!(report.video.gcs_uri, format!("gs://bucket/{}", report.video.object_key));
        assert_eq!(report.session_id, session.id().as_str());
    }

    #[tokio::test]
    async fn test_extractor_failure_is_reported_per_clip() {
        let (_root, session, video) = fixture().await;

        let mut store = MockStore::new();
        store.expect_put_file().returning(|_, key, _| Ok(stored(key)));

        let mut analyzer = MockAnalyzer::new();
        analyzer.expect_analyze().returning(|_| {
            Ok(HighlightsResponse {
                highlights: vec![highlight(1, "00:00", "00:20"), highlight(2, "00:30", "00:50")],
            })
        });

        let mut extractor = MockExtractor::new();
        extractor.expect_extract().returning(|source, range, output| {
            if range.start_secs == 0.0 {
                Err(MediaError::ffmpeg_failed("FFmpeg exited with error", Some("Invalid data found".into()), Some(1)))
            } else {
                ok_extract(source, range, output)
            }
        });

        let pipeline = Pipeline::new(Arc::new(store), Arc::new(analyzer), Arc::new(extractor));
        let report = pipeline.run(&session, &video).await.unwrap();

        assert_eq!(report.clips_ready, 1);
        assert!(report.highlights[0].clip.error().unwrap().contains("Invalid data found"));
        match &report.highlights[1].clip {
            ClipOutcome::Ready { remote_url, upload_error, .. } => {
                assert!(remote_url.as_deref().unwrap().contains("/highlights/"));
                assert!(upload_error.is_none());
            }
            other => panic!("expected ready clip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clip_upload_failure_keeps_clip() {
        let (_root, session, video) = fixture().await;

        let mut store = MockStore::new();
        store
            .expect_put_file()
            .withf(|_, key, _| key.starts_with("uploads/"))
            .returning(|_, key, _| Ok(stored(key)));
        store
            .expect_put_file()
            .withf(|_, key, _| key.starts_with("highlights/"))
            .returning(|_, _, _| Err(StorageError::upload_failed(403, "denied")));

        let mut analyzer = MockAnalyzer::new();
        analyzer.expect_analyze().returning(|_| {
            Ok(HighlightsResponse {
                highlights: vec![highlight(1, "00:05", "00:25")],
            })
        });

        let mut extractor = MockExtractor::new();
        extractor.expect_extract().returning(ok_extract);

        let pipeline = Pipeline::new(Arc::new(store), Arc::new(analyzer), Arc::new(extractor));
        let report = pipeline.run(&session, &video).await.unwrap();

        assert_eq!(report.clips_ready, 1);
        match &report.highlights[0].clip {
            ClipOutcome::Ready { remote_url, upload_error, .. } => {
                assert!(remote_url.is_none());
                assert!(upload_error.as_deref().unwrap().contains("403"));
            }
            other => panic!("expected ready clip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_storage_failure_skips_analysis() {
        let (_root, session, video) = fixture().await;

        let mut store = MockStore::new();
        store
            .expect_put_file()
            .times(1)
            .returning(|_, _, _| Err(StorageError::upload_failed(401, "invalid credentials")));
        let mut analyzer = MockAnalyzer::new();
        analyzer.expect_analyze().never();
        let mut extractor = MockExtractor::new();
        extractor.expect_extract().never();

        let pipeline = Pipeline::new(Arc::new(store), Arc::new(analyzer), Arc::new(extractor));
        let err = pipeline.run(&session, &video).await.unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)));
    }

    #[tokio::test]
    async fn test_malformed_model_output_skips_extraction() {
        let (_root, session, video) = fixture().await;

        let mut store = MockStore::new();
        store.expect_put_file().returning(|_, key, _| Ok(stored(key)));
        let mut analyzer = MockAnalyzer::new();
        analyzer
            .expect_analyze()
            .returning(|_| Err(AnalysisError::MalformedJson("expected value at line 1".into())));
        let mut extractor = MockExtractor::new();
        extractor.expect_extract().never();

        let pipeline = Pipeline::new(Arc::new(store), Arc::new(analyzer), Arc::new(extractor));
        let err = pipeline.run(&session, &video).await.unwrap_err();
        assert!(matches!(err, ApiError::Analysis(ref e) if e.is_parse_error()));
    }

    #[tokio::test]
    async fn test_clip_paths_live_in_session() {
        let (_root, session, video) = fixture().await;

        let mut store = MockStore::new();
        store.expect_put_file().returning(|_, key, _| Ok(stored(key)));
        let mut analyzer = MockAnalyzer::new();
        analyzer.expect_analyze().returning(|_| {
            Ok(HighlightsResponse {
                highlights: vec![highlight(4, "00:02", "00:10")],
            })
        });
        let mut extractor = MockExtractor::new();
        let expected_source = video.path.clone();
        let expected_output = session.clip_path("highlight_4.mp4");
        extractor
            .expect_extract()
            .withf(move |source, range, output| {
                source == expected_source.as_path()
                    && *range == ClipRange {
                        start_secs: 2.0,
                        end_secs: 10.0,
                    }
                    && output == expected_output.as_path()
            })
            .times(1)
            .returning(ok_extract);

        let pipeline = Pipeline::new(Arc::new(store), Arc::new(analyzer), Arc::new(extractor)).with_clip_upload(false);
        let report = pipeline.run(&session, &video).await.unwrap();
        assert_eq!(report.highlights[0].duration_secs, Some(8.0));
    }

    #[tokio::test]
    async fn test_same_file_name_in_two_sessions_gets_distinct_keys() {
        let root = tempfile::tempdir().unwrap();
        let sessions = SessionStore::new(root.path(), Duration::from_secs(60));

        let keys = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut store = MockStore::new();
        let recorded = Arc::clone(&keys);
        store.expect_put_file().times(2).returning(move |_, key, _| {
            recorded.lock().unwrap().push(key.to_string());
            Ok(stored(key))
        });
        let mut analyzer = MockAnalyzer::new();
        analyzer.expect_analyze().times(2).returning(|_| {
            Ok(HighlightsResponse {
                highlights: vec![highlight(1, "00:00", "00:05")],
            })
        });
        let mut extractor = MockExtractor::new();
        extractor.expect_extract().returning(ok_extract);

        let pipeline = Pipeline::new(Arc::new(store), Arc::new(analyzer), Arc::new(extractor)).with_clip_upload(false);
        for _ in 0..2 {
            let session = sessions.create().await.unwrap();
            let path = session.input_path("video.mp4");
            tokio::fs::write(&path, b"fake").await.unwrap();
            let video = UploadedVideo {
                file_name: "video.mp4".to_string(),
                path,
                size_bytes: 4,
            };
            let report = pipeline.run(&session, &video).await.unwrap();
            let prefix: String = session.id().as_str().chars().filter(|c| c.is_ascii_alphanumeric()).take(8).collect();
            assert!(report.video.object_key.ends_with(&format!("_{prefix}_video.mp4")));
        }

        let keys = keys.lock().unwrap();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);
    }
}
