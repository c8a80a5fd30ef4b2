//! Configuration loading and root folder resolution
//!
//! Every service reads the same TOML file once at startup. The file holds the
//! address of every peer plus one section per service; a service that cannot
//! load or validate it must not start listening.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "FCP_CONFIG";

/// Environment variable naming the data root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "FCP_ROOT_FOLDER";

/// One labeled session for each of training, validation and test
pub const MIN_SESSION_QUOTA: u32 = 3;

/// `host:port` address of a peer service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress {
    host: String,
    port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `http://host:port` prefix used by the outbound client
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        let (host, port) = value
            .rsplit_once(':')
            .ok_or_else(|| Error::Config(format!("Peer address '{}' is not host:port", value)))?;
        if host.is_empty() {
            return Err(Error::Config(format!("Peer address '{}' has no host", value)));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::Config(format!("Peer address '{}' has an invalid port", value)))?;
        Ok(Self::new(host, port))
    }
}

impl From<PeerAddress> for String {
    fn from(addr: PeerAddress) -> Self {
        addr.to_string()
    }
}

/// Addresses of every service taking part in the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peers {
    pub segregation: PeerAddress,
    pub development: PeerAddress,
    pub classification: PeerAddress,
    pub evaluation: PeerAddress,
    /// End consumer of production labels (optional in test deployments)
    #[serde(default)]
    pub client: Option<PeerAddress>,
}

/// How gate decisions and numeric inputs are obtained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMode {
    /// Computed recommendations and configured defaults
    #[default]
    Automated,
    /// Operator prompts on stdin
    Interactive,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Inclusive `[min, max]` range of one prepared-session feature
pub type FeatureRange = [f64; 2];

/// Expected value ranges used by the coverage report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRanges {
    pub mean_current: FeatureRange,
    pub mean_voltage: FeatureRange,
    pub mean_temperature: FeatureRange,
    pub mean_external_temperature: FeatureRange,
    pub mean_external_humidity: FeatureRange,
    pub mean_occupancy: FeatureRange,
}

impl FeatureRanges {
    /// Ranges in feature-vector order
    pub fn as_array(&self) -> [FeatureRange; 6] {
        [
            self.mean_current,
            self.mean_voltage,
            self.mean_temperature,
            self.mean_external_temperature,
            self.mean_external_humidity,
            self.mean_occupancy,
        ]
    }
}

impl Default for FeatureRanges {
    fn default() -> Self {
        Self {
            mean_current: [0.0, 20.0],
            mean_voltage: [200.0, 250.0],
            mean_temperature: [20.0, 100.0],
            mean_external_temperature: [-20.0, 50.0],
            mean_external_humidity: [0.0, 100.0],
            mean_occupancy: [0.0, 10.0],
        }
    }
}

/// Segregation system parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegregationSettings {
    /// Sessions buffered before the balancing gate runs
    pub session_quota: u32,
    /// Allowed deviation of each class share from the uniform share
    pub tolerance_interval: f64,
    #[serde(default = "default_split_fraction")]
    pub validation_fraction: f64,
    #[serde(default = "default_split_fraction")]
    pub test_fraction: f64,
    /// Delay before re-sending a learning set that could not be delivered
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub feature_ranges: FeatureRanges,
}

fn default_split_fraction() -> f64 {
    0.15
}

fn default_retry_delay_ms() -> u64 {
    5000
}

/// Development system parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevelopmentSettings {
    /// Iteration count used by the candidate search and as the automated default
    pub iteration_count: u32,
    pub overfitting_tolerance: f64,
    pub generalization_tolerance: f64,
    pub layer_count_range: [u32; 2],
    /// Both bounds must be powers of two
    pub neuron_count_range: [u32; 2],
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_learning_rate() -> f64 {
    0.05
}

fn default_seed() -> u64 {
    42
}

/// Classification system parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationSettings {
    pub evaluation_sessions: u32,
    pub production_sessions: u32,
}

/// Evaluation system parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSettings {
    /// Complete label pairs needed before a report is produced
    pub min_label_pairs: u32,
    pub max_errors: u32,
    pub max_consecutive_errors: u32,
}

/// Whole-pipeline configuration, read-only after startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub decision_mode: DecisionMode,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub peers: Peers,
    pub segregation: SegregationSettings,
    pub development: DevelopmentSettings,
    pub classification: ClassificationSettings,
    pub evaluation: EvaluationSettings,
}

impl PipelineConfig {
    /// Load and validate the configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no service can run with
    pub fn validate(&self) -> Result<()> {
        let seg = &self.segregation;
        if seg.session_quota < MIN_SESSION_QUOTA {
            return Err(Error::Config(format!(
                "segregation.session_quota must be at least {}",
                MIN_SESSION_QUOTA
            )));
        }
        if !(0.0..=1.0).contains(&seg.tolerance_interval) {
            return Err(Error::Config(
                "segregation.tolerance_interval must lie in [0, 1]".to_string(),
            ));
        }
        for (name, value) in [
            ("validation_fraction", seg.validation_fraction),
            ("test_fraction", seg.test_fraction),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(Error::Config(format!("segregation.{} must lie in (0, 1)", name)));
            }
        }
        if seg.validation_fraction + seg.test_fraction >= 1.0 {
            return Err(Error::Config(
                "segregation split fractions leave no training data".to_string(),
            ));
        }
        for range in seg.feature_ranges.as_array() {
            if range[0] > range[1] {
                return Err(Error::Config(format!(
                    "feature range [{}, {}] is inverted",
                    range[0], range[1]
                )));
            }
        }

        let dev = &self.development;
        if dev.iteration_count == 0 {
            return Err(Error::Config("development.iteration_count must be positive".to_string()));
        }
        if dev.layer_count_range[0] == 0 {
            return Err(Error::Config(
                "development.layer_count_range must start at 1 or more".to_string(),
            ));
        }
        for bound in dev.neuron_count_range {
            if !bound.is_power_of_two() {
                return Err(Error::Config(format!(
                    "development.neuron_count_range bound {} is not a power of two",
                    bound
                )));
            }
        }
        if dev.learning_rate <= 0.0 {
            return Err(Error::Config("development.learning_rate must be positive".to_string()));
        }

        let cls = &self.classification;
        if cls.evaluation_sessions == 0 || cls.production_sessions == 0 {
            return Err(Error::Config(
                "classification session quotas must be positive".to_string(),
            ));
        }

        if self.evaluation.min_label_pairs == 0 {
            return Err(Error::Config("evaluation.min_label_pairs must be positive".to_string()));
        }

        Ok(())
    }
}

/// Resolve the configuration file path
///
/// Priority order:
/// 1. Command-line argument
/// 2. `FCP_CONFIG` environment variable
/// 3. `<platform config dir>/fcp/fcp.toml`
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    if let Some(path) = env_path(CONFIG_ENV_VAR) {
        return Ok(path);
    }

    let default_path = dirs::config_dir()
        .map(|d| d.join("fcp").join("fcp.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
    if default_path.exists() {
        Ok(default_path)
    } else {
        Err(Error::Config(format!(
            "No config file given and {} does not exist",
            default_path.display()
        )))
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Root folder resolution
///
/// Priority order:
/// 1. Command-line argument
/// 2. `FCP_ROOT_FOLDER` environment variable
/// 3. `root_folder` in the TOML file
/// 4. OS-dependent default data directory
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &PipelineConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Some(path) = env_path(ROOT_FOLDER_ENV_VAR) {
        return path;
    }
    if let Some(path) = &config.root_folder {
        return path.clone();
    }
    let fallback = dirs::data_local_dir()
        .map(|d| d.join("fcp"))
        .unwrap_or_else(|| PathBuf::from("./fcp_data"));
    warn!("No root folder configured, using {}", fallback.display());
    fallback
}

/// Creates and names the per-service directories below the root folder
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    module_dir: PathBuf,
}

impl RootFolderInitializer {
    /// `module_name` becomes a sub-directory of `root_folder`
    pub fn new(root_folder: PathBuf, module_name: &str) -> Self {
        Self {
            module_dir: root_folder.join(module_name),
        }
    }

    /// Create the module and report directories if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.module_dir)?;
        std::fs::create_dir_all(self.reports_dir())?;
        info!("Module folder: {}", self.module_dir.display());
        Ok(())
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.module_dir.join("reports")
    }

    pub fn state_path(&self) -> PathBuf {
        self.module_dir.join("state.json")
    }

    pub fn database_path(&self) -> PathBuf {
        self.module_dir.join("store.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
decision_mode = "automated"

[peers]
segregation = "127.0.0.1:5801"
development = "127.0.0.1:5802"
classification = "127.0.0.1:5803"
evaluation = "127.0.0.1:5804"

[segregation]
session_quota = 24
tolerance_interval = 0.2

[development]
iteration_count = 50
overfitting_tolerance = 0.2
generalization_tolerance = 0.2
layer_count_range = [1, 2]
neuron_count_range = [4, 8]

[classification]
evaluation_sessions = 5
production_sessions = 10

[evaluation]
min_label_pairs = 5
max_errors = 2
max_consecutive_errors = 1
"#;

    #[test]
    fn test_parse_sample_with_defaults() {
        let config = PipelineConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.decision_mode, DecisionMode::Automated);
        assert_eq!(config.peers.development.port(), 5802);
        assert!(config.peers.client.is_none());
        assert_eq!(config.segregation.validation_fraction, 0.15);
        assert_eq!(config.segregation.retry_delay_ms, 5000);
        assert_eq!(config.development.seed, 42);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_shipped_example_is_valid() {
        let config = PipelineConfig::from_toml(include_str!("../../fcp.example.toml")).unwrap();
        assert_eq!(config.peers.client.as_ref().map(|c| c.port()), Some(5805));
        assert_eq!(config.development.neuron_count_range, [4, 32]);
        assert_eq!(config.segregation.feature_ranges.mean_voltage, [200.0, 250.0]);
    }

    #[test]
    fn test_rejects_non_power_of_two_neurons() {
        let text = SAMPLE.replace("neuron_count_range = [4, 8]", "neuron_count_range = [4, 12]");
        let err = PipelineConfig::from_toml(&text).unwrap_err();
        assert!(err.to_string().contains("power of two"));
    }

    #[test]
    fn test_rejects_zero_quota() {
        let text = SAMPLE.replace("session_quota = 24", "session_quota = 0");
        assert!(PipelineConfig::from_toml(&text).is_err());
    }

    #[test]
    fn test_rejects_quota_too_small_for_three_splits() {
        let text = SAMPLE.replace("session_quota = 24", "session_quota = 2");
        let err = PipelineConfig::from_toml(&text).unwrap_err();
        assert!(err.to_string().contains("at least 3"));
        let text = SAMPLE.replace("session_quota = 24", "session_quota = 3");
        assert!(PipelineConfig::from_toml(&text).is_ok());
    }

    #[test]
    fn test_rejects_empty_split_fraction() {
        for line in ["validation_fraction = 0.0", "test_fraction = 0.0", "test_fraction = 1.0"] {
            let text = SAMPLE.replace("tolerance_interval = 0.2", &format!("tolerance_interval = 0.2\n{}", line));
            let err = PipelineConfig::from_toml(&text).unwrap_err();
            assert!(err.to_string().contains("(0, 1)"), "{}", line);
        }
    }

    #[test]
    fn test_rejects_bad_peer_address() {
        let text = SAMPLE.replace("127.0.0.1:5804", "localhost");
        assert!(PipelineConfig::from_toml(&text).is_err());
    }

    #[test]
    fn test_peer_address_base_url() {
        let addr = PeerAddress::try_from("10.0.0.7:8080".to_string()).unwrap();
        assert_eq!(addr.base_url(), "http://10.0.0.7:8080");
        assert_eq!(addr.to_string(), "10.0.0.7:8080");
    }

    #[test]
    fn test_root_folder_prefers_cli() {
        let config = PipelineConfig::from_toml(SAMPLE).unwrap();
        let root = resolve_root_folder(Some(Path::new("/tmp/fcp-cli")), &config);
        assert_eq!(root, PathBuf::from("/tmp/fcp-cli"));
    }

    #[test]
    fn test_initializer_paths() {
        let init = RootFolderInitializer::new(PathBuf::from("/tmp/fcp-root"), "development");
        assert_eq!(init.module_dir(), Path::new("/tmp/fcp-root/development"));
        assert_eq!(init.state_path(), PathBuf::from("/tmp/fcp-root/development/state.json"));
        assert_eq!(init.reports_dir(), PathBuf::from("/tmp/fcp-root/development/reports"));
    }
}
