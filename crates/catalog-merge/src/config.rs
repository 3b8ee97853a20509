use std::{
    fs,
    io::BufReader,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    error::ConfigError,
    orchestrator::{RunRequest, SourceDescriptor},
    predicate::{PredicateSet, Selection},
    vocabulary::Vocabulary,
};

const APP_NAME: &str = "catalog-merge";
const VOCABULARY_FILE: &str = "vocabulary.json";

/// A run described as JSON, as the host would persist it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub sources:    Vec<SourceDescriptor>,
    pub selection:  Selection,
    pub output:     Option<PathBuf>,
    pub seed:       Option<u64>,
    pub parallel:   bool,
    pub vocabulary: Option<Vocabulary>,
}

impl RunConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config: RunConfig = read_json(path)?;
        // relative source and output paths are taken relative to the config file
        if let Some(base) = path.parent() {
            for source in &mut config.sources {
                source.path = resolve(base, &source.path);
            }
            config.output = config.output.map(|output| resolve(base, &output));
        }
        Ok(config)
    }

    /// Validates the config and builds the request the orchestrator runs.
    pub fn into_request(self, fallback_vocabulary: Vocabulary) -> Result<RunRequest, ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("select at least one platform".into()));
        }
        let output = self
            .output
            .ok_or_else(|| ConfigError::Invalid("no output path given".into()))?;
        let vocabulary = self.vocabulary.unwrap_or(fallback_vocabulary);
        let predicates = PredicateSet::from_selection(&self.selection, &vocabulary);

        Ok(RunRequest::builder()
            .sources(self.sources)
            .predicates(predicates)
            .vocabulary(vocabulary)
            .output(output)
            .maybe_seed(self.seed)
            .parallel(self.parallel)
            .build())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || base.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let file = fs::File::open(path).map_err(|cause| ConfigError::Io {
        path: path.to_path_buf(),
        cause,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|cause| ConfigError::Json {
        path: path.to_path_buf(),
        cause,
    })
}

/// Returns:
/// - macOS: ~/Library/Application Support/catalog-merge
/// - Windows: %APPDATA%\catalog-merge
/// - Linux: ~/.config/catalog-merge
pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|path| path.join(APP_NAME))
}

/// Vocabulary from an explicit file, else the per-user file when it exists, else the defaults.
pub fn load_vocabulary(explicit: Option<&Path>) -> Result<Vocabulary, ConfigError> {
    if let Some(path) = explicit {
        return Vocabulary::from_json_file(path);
    }
    match get_config_path().map(|dir| dir.join(VOCABULARY_FILE)) {
        Some(path) if path.is_file() => Vocabulary::from_json_file(path),
        _ => Ok(Vocabulary::default()),
    }
}
