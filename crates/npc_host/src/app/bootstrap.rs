use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use npc_engine::{ConfigError, ContentRequest, SimTuning};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const ENABLED_MODS_ENV_VAR: &str = "NPC_SIM_ENABLED_MODS";
const CONFIG_ENV_VAR: &str = "NPC_SIM_CONFIG";
const FRAMES_ENV_VAR: &str = "NPC_SIM_FRAMES";
pub(crate) const SLOW_FRAME_ENV_VAR: &str = "NPC_SIM_SLOW_FRAME_MS";

#[derive(Debug, Clone)]
pub(crate) struct LoopConfig {
    pub frames: u32,
    pub target_fps: u32,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    pub content_request: ContentRequest,
    pub tuning_path: Option<PathBuf>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            frames: 1800,
            target_fps: 60,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            content_request: ContentRequest::default(),
            tuning_path: None,
        }
    }
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== NPC Sim Startup ===");

    let defaults = LoopConfig::default();
    let config = LoopConfig {
        frames: parse_u64_env(FRAMES_ENV_VAR, u64::from(defaults.frames))
            .try_into()
            .unwrap_or(u32::MAX),
        simulated_slow_frame_ms: parse_u64_env(
            SLOW_FRAME_ENV_VAR,
            defaults.simulated_slow_frame_ms,
        ),
        content_request: env::var(ENABLED_MODS_ENV_VAR)
            .map(|raw| ContentRequest::from_mod_list(&raw))
            .unwrap_or_default(),
        tuning_path: env::var_os(CONFIG_ENV_VAR).map(PathBuf::from),
        ..defaults
    };

    AppWiring { config }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_u64_env(var: &'static str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    env_var = var,
                    value = value.as_str(),
                    "invalid env var value; falling back to default"
                );
                fallback
            }
        },
        Err(env::VarError::NotPresent) => fallback,
        Err(err) => {
            warn!(
                env_var = var,
                error = %err,
                "unable to read env var; falling back to default"
            );
            fallback
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum TuningLoadError {
    #[error("failed to read tuning file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse tuning json{location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("tuning failed validation: {0}")]
    Invalid(#[from] ConfigError),
}

/// Reads the optional tuning override; `None` keeps the built-in defaults.
pub(crate) fn load_tuning(path: Option<&Path>) -> Result<SimTuning, TuningLoadError> {
    let Some(path) = path else {
        return Ok(SimTuning::default());
    };
    let raw = fs::read_to_string(path).map_err(|source| TuningLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let tuning = parse_tuning_json(&raw)?;
    info!(path = %path.display(), seed = tuning.seed, "tuning_loaded");
    Ok(tuning)
}

/// Parses a (possibly partial) tuning document and validates it. Parse
/// failures name the JSON path of the offending field.
pub(crate) fn parse_tuning_json(raw: &str) -> Result<SimTuning, TuningLoadError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let tuning = match serde_path_to_error::deserialize::<_, SimTuning>(&mut deserializer) {
        Ok(tuning) => tuning,
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            let location = if path.is_empty() || path == "." {
                String::new()
            } else {
                format!(" at {path}")
            };
            return Err(TuningLoadError::Parse { location, source });
        }
    };
    tuning.validate()?;
    Ok(tuning)
}
