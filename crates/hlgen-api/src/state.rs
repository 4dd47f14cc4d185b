//! Application state.

use std::sync::Arc;

use hlgen_cloud::{
    load_prompt, AccessTokenSource, GcsClient, GcsConfig, ObjectStore, TokenCache, VertexConfig, VertexGeminiClient,
};
use hlgen_media::{check_ffmpeg, check_ffprobe, ClipEncoding, FfmpegClipExtractor};
use hlgen_models::EncodingConfig;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use crate::session::SessionStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionStore>,
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<dyn ObjectStore>,
}

impl AppState {
    /// Create application state backed by Google Cloud and the local ffmpeg.
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let tokens: Arc<dyn AccessTokenSource> = Arc::new(TokenCache::from_adc().await?);

        let gcs = GcsClient::new(
            GcsConfig::new(&config.bucket_name).with_public_read(config.gcs_public_read),
            Arc::clone(&tokens),
        )?;

        let prompt = load_prompt(config.prompt_file.as_deref()).await?;
        let vertex = VertexGeminiClient::new(
            VertexConfig::new(&config.gcp_project)
                .with_location(&config.vertex_location)
                .with_model(&config.gemini_model)
                .with_timeout(config.analysis_timeout),
            prompt,
            tokens,
        )?;
        info!(
            "Analysis model {} in {} (project {}), bucket {}",
            vertex.model(),
            config.vertex_location,
            config.gcp_project,
            gcs.bucket()
        );

        match (check_ffmpeg(), check_ffprobe()) {
            (Ok(ffmpeg), Ok(_)) => info!("Using ffmpeg at {}", ffmpeg.display()),
            (Err(e), _) | (_, Err(e)) => warn!("{}; clip extraction will fail until it is installed", e),
        }

        let encoding = if config.clip_reencode {
            ClipEncoding::Reencode(EncodingConfig::default())
        } else {
            ClipEncoding::StreamCopy
        };
        let extractor = FfmpegClipExtractor::new(encoding).with_timeout(config.ffmpeg_timeout_secs);
        info!(
            "Clip encoding {:?}, ffmpeg timeout {}s",
            extractor.encoding(),
            config.ffmpeg_timeout_secs
        );

        let store: Arc<dyn ObjectStore> = Arc::new(gcs);
        let pipeline = Pipeline::new(Arc::clone(&store), Arc::new(vertex), Arc::new(extractor))
            .with_clip_upload(config.upload_clips);

        Ok(Self::with_services(config, store, pipeline))
    }

    /// Assemble state from already-built services.
    pub fn with_services(config: AppConfig, store: Arc<dyn ObjectStore>, pipeline: Pipeline) -> Self {
        let sessions = SessionStore::new(config.work_dir.clone(), config.session_ttl);
        Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            pipeline: Arc::new(pipeline),
            store,
        }
    }
}
