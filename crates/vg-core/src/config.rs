use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use crate::error::{Error, Result};
use crate::model_types::ImageModel;
use crate::vectorize::VectorizerKind;

pub const DEFAULT_API_BASE: &str = "https://api.together.xyz/v1";

#[derive(Debug, Clone)]
pub struct ImageClientConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: ImageModel,
    pub steps: u32,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    /// Wait used when a warming-up response carries no estimate
    pub warmup_wait: Duration,
    pub max_warmup_wait: Duration,
}

impl Default for ImageClientConfig {
    fn default() -> Self {
        let model = ImageModel::default();
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model,
            steps: model.default_steps(),
            request_timeout: Duration::from_secs(60),
            download_timeout: Duration::from_secs(30),
            warmup_wait: Duration::from_secs(20),
            max_warmup_wait: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorizeConfig {
    pub kind: VectorizerKind,
    pub magick_path: PathBuf,
    pub potrace_path: PathBuf,
    pub posterize_levels: u8,
}

impl Default for VectorizeConfig {
    fn default() -> Self {
        Self {
            kind: VectorizerKind::Auto,
            magick_path: PathBuf::from("magick"),
            potrace_path: PathBuf::from("potrace"),
            posterize_levels: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub image: ImageClientConfig,
    pub vectorize: VectorizeConfig,
    /// Directory that holds per-job temp files
    pub work_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image: ImageClientConfig::default(),
            vectorize: VectorizeConfig::default(),
            work_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Reads configuration from the process environment.
    /// Loading a `.env` file is left to the binary.
    pub fn from_env() -> Result<Self> {
        let mut conf = Self::from_lookup(|key| env::var(key).ok())?;
        if env::var("VECTORGEN_WORK_DIR").is_err() {
            if let Ok(cwd) = env::current_dir() {
                conf.work_dir = cwd;
            }
        }
        Ok(conf)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut conf = Self::default();

        conf.image.api_key = get("TOGETHER_API_KEY");
        if let Some(base) = get("VECTORGEN_API_BASE") {
            conf.image.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(id) = get("VECTORGEN_MODEL") {
            conf.image.model = ImageModel::from_id(&id)
                .ok_or_else(|| Error::config("VECTORGEN_MODEL", format!("unknown model '{id}'")))?;
            conf.image.steps = conf.image.model.default_steps();
        }
        if let Some(steps) = parse::<u32>(&get, "VECTORGEN_STEPS")? {
            conf.image.steps = steps;
        }
        if let Some(secs) = parse::<u64>(&get, "VECTORGEN_REQUEST_TIMEOUT_SECS")? {
            conf.image.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&get, "VECTORGEN_DOWNLOAD_TIMEOUT_SECS")? {
            conf.image.download_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&get, "VECTORGEN_WARMUP_WAIT_SECS")? {
            conf.image.warmup_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&get, "VECTORGEN_MAX_WARMUP_WAIT_SECS")? {
            conf.image.max_warmup_wait = Duration::from_secs(secs);
        }

        if let Some(kind) = parse::<VectorizerKind>(&get, "VECTORGEN_VECTORIZER")? {
            conf.vectorize.kind = kind;
        }
        if let Some(path) = get("VECTORGEN_MAGICK") {
            conf.vectorize.magick_path = PathBuf::from(path);
        }
        if let Some(path) = get("VECTORGEN_POTRACE") {
            conf.vectorize.potrace_path = PathBuf::from(path);
        }
        if let Some(levels) = parse::<u8>(&get, "VECTORGEN_POSTERIZE_LEVELS")? {
            if levels < 2 {
                return Err(Error::config("VECTORGEN_POSTERIZE_LEVELS", "must be at least 2"));
            }
            conf.vectorize.posterize_levels = levels;
        }

        if let Some(dir) = get("VECTORGEN_WORK_DIR") {
            conf.work_dir = PathBuf::from(dir);
        }

        Ok(conf)
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| raw.trim().parse::<T>().map_err(|e| Error::config(key, e.to_string())))
        .transpose()
}
