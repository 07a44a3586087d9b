//! Configuration types for label-dl

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Scheduling policy for the batch fetcher
///
/// Both pipelines use the same loop: requests are cut into chunks of
/// `concurrency_limit`, each chunk is fetched concurrently and fully settled
/// before the next one starts, and `inter_item_delay` is slept between chunks.
/// A limit of 1 with a delay gives the strictly sequential archive behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum fetches in flight at once (default: 10)
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Pause between chunks, in milliseconds when serialized (default: 0)
    #[serde(default, with = "duration_millis_serde")]
    pub inter_item_delay: Duration,

    /// Deadline for a single fetch, in milliseconds when serialized (default: 60s)
    #[serde(default = "default_request_timeout", with = "duration_millis_serde")]
    pub request_timeout: Duration,

    /// User-Agent sent by the HTTP gateway
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl FetchConfig {
    /// One request at a time with a 500ms pause, used when building archives
    pub fn sequential() -> Self {
        Self {
            concurrency_limit: 1,
            inter_item_delay: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// Ten concurrent requests per chunk with no pause, used when printing
    pub fn chunked() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            inter_item_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            inter_item_delay: Duration::ZERO,
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Where and how artifacts are written
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory artifacts are saved to (default: "./labels")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Scratch directory for external tools (default: system temp dir)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Deflate level for archive entries, 0-9 (default: 6)
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// Prefix of generated archive names (default: "shipping_labels")
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,

    /// File collision handling when saving
    #[serde(default)]
    pub file_collision: FileCollisionAction,

    /// Failure lines shown in the end-of-run summary before truncating (default: 10)
    #[serde(default = "default_max_displayed_failures")]
    pub max_displayed_failures: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            temp_dir: None,
            compression_level: default_compression_level(),
            archive_prefix: default_archive_prefix(),
            file_collision: FileCollisionAction::default(),
            max_displayed_failures: default_max_displayed_failures(),
        }
    }
}

/// Print view and raster settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrintConfig {
    /// Raster resolution in DPI (default: 144, twice the PDF point grid)
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u32,

    /// Delay before the print dialog is triggered, in milliseconds when serialized (default: 1s)
    #[serde(default = "default_settle_delay", with = "duration_millis_serde")]
    pub settle_delay: Duration,

    /// Path to pdftoppm (auto-detected if None)
    #[serde(default)]
    pub pdftoppm_path: Option<PathBuf>,

    /// Whether to search PATH for pdftoppm if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            render_dpi: default_render_dpi(),
            settle_delay: default_settle_delay(),
            pdftoppm_path: None,
            search_path: true,
        }
    }
}

/// Main configuration for [`LabelDownloader`](crate::LabelDownloader)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Fetch scheduling
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Artifact output
    #[serde(default)]
    pub output: OutputConfig,

    /// Print view
    #[serde(default)]
    pub print: PrintConfig,
}

impl Config {
    /// Check the settings that would make a run impossible
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.fetch.concurrency_limit == 0 {
            return Err(ValidationError::Config {
                key: "fetch.concurrency_limit".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.fetch.request_timeout.is_zero() {
            return Err(ValidationError::Config {
                key: "fetch.request_timeout".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if !(0..=9).contains(&self.output.compression_level) {
            return Err(ValidationError::Config {
                key: "output.compression_level".to_string(),
                message: format!("{} is outside 0-9", self.output.compression_level),
            });
        }
        if self.print.render_dpi == 0 {
            return Err(ValidationError::Config {
                key: "print.render_dpi".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// File collision handling when saving artifacts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename
    #[default]
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Fail if the file already exists
    Skip,
}

fn default_concurrency_limit() -> usize {
    10
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    format!("label-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./labels")
}

fn default_compression_level() -> i32 {
    6
}

fn default_archive_prefix() -> String {
    "shipping_labels".to_string()
}

fn default_max_displayed_failures() -> usize {
    10
}

fn default_render_dpi() -> u32 {
    144
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (milliseconds)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
