use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{RunnerError, RunnerResult};

/// All tunables of the agent. Every section has serde defaults so a missing
/// `config.toml` yields a fully working configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunnerConfig {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub long_travel: LongTravelConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub labels: LabelConfig,
    #[serde(default)]
    pub learning: LearningConfig,
}

/// Delays between sensing operations, in milliseconds. The loop is a
/// cooperative polling loop; these are its only suspension points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Pause after moving the pointer, so label text can appear.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Pause after the click, before the first verification check.
    #[serde(default = "default_post_click_ms")]
    pub post_click_ms: u64,
    /// Interval between verification checks.
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Number of verification checks in the standard monitoring window.
    #[serde(default = "default_max_checks")]
    pub max_checks: u32,
    /// Pacing delay after an interaction completes.
    #[serde(default = "default_action_pace_ms")]
    pub action_pace_ms: u64,
    /// Delay when a detection pass yields no candidates.
    #[serde(default = "default_empty_search_ms")]
    pub empty_search_ms: u64,
    /// Delay after an unresolved stuck-recovery attempt.
    #[serde(default = "default_stuck_wait_ms")]
    pub stuck_wait_ms: u64,
    /// Pause after each camera rotation, for tags to re-render.
    #[serde(default = "default_rotate_settle_ms")]
    pub rotate_settle_ms: u64,
    /// Poll interval while deferring on a long-travel cooldown.
    #[serde(default = "default_deferral_poll_ms")]
    pub deferral_poll_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            post_click_ms: default_post_click_ms(),
            check_interval_ms: default_check_interval_ms(),
            max_checks: default_max_checks(),
            action_pace_ms: default_action_pace_ms(),
            empty_search_ms: default_empty_search_ms(),
            stuck_wait_ms: default_stuck_wait_ms(),
            rotate_settle_ms: default_rotate_settle_ms(),
            deferral_poll_ms: default_deferral_poll_ms(),
        }
    }
}

fn default_settle_ms() -> u64 {
    150
}
fn default_post_click_ms() -> u64 {
    1000
}
fn default_check_interval_ms() -> u64 {
    800
}
fn default_max_checks() -> u32 {
    3
}
fn default_action_pace_ms() -> u64 {
    4000
}
fn default_empty_search_ms() -> u64 {
    1500
}
fn default_stuck_wait_ms() -> u64 {
    2000
}
fn default_rotate_settle_ms() -> u64 {
    800
}
fn default_deferral_poll_ms() -> u64 {
    1200
}

/// Handling for obstacles far enough away that the subject travels for many
/// seconds before the interaction visibly resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTravelConfig {
    /// Distance beyond which a primary target counts as long-travel.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,
    /// Total observation time for the extended monitoring window, seconds.
    #[serde(default = "default_monitor_secs")]
    pub monitor_secs: f64,
    /// Cooldown opened after a successful long-travel click, seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f64,
    /// Check interval inside the extended monitoring window.
    #[serde(default = "default_lt_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Minimum gap between "still traveling" log lines, seconds.
    #[serde(default = "default_wait_log_secs")]
    pub wait_log_secs: u64,
}

impl Default for LongTravelConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
            monitor_secs: default_monitor_secs(),
            cooldown_secs: default_cooldown_secs(),
            check_interval_ms: default_lt_check_interval_ms(),
            wait_log_secs: default_wait_log_secs(),
        }
    }
}

fn default_distance_threshold() -> f64 {
    230.0
}
fn default_monitor_secs() -> f64 {
    15.0
}
fn default_cooldown_secs() -> f64 {
    14.0
}
fn default_lt_check_interval_ms() -> u64 {
    1000
}
fn default_wait_log_secs() -> u64 {
    3
}

/// Distance thresholds used by stuck detection and success verification.
/// Units are the perception adapter's pixel-analogous units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Manhattan delta below which the primary target "has not moved".
    #[serde(default = "default_stuck_position_delta")]
    pub stuck_position_delta: u32,
    /// Consecutive unmoved snapshots before declaring stuck.
    #[serde(default = "default_stuck_no_change")]
    pub stuck_no_change: u32,
    /// Consecutive primary-absent snapshots before declaring stuck.
    #[serde(default = "default_stuck_absent")]
    pub stuck_absent: u32,
    /// Radius within which a position counts as recently clicked.
    #[serde(default = "default_recently_clicked_radius")]
    pub recently_clicked_radius: u32,
    /// Marker movement beyond `factor × largest dimension` means progress.
    #[serde(default = "default_moved_far_factor")]
    pub moved_far_factor: f64,
    /// Floor for the movement test when the obstacle is small.
    #[serde(default = "default_moved_far_min")]
    pub moved_far_min: u32,
    /// Final fallback: marker movement beyond this is progress.
    #[serde(default = "default_final_move_delta")]
    pub final_move_delta: u32,
    /// How long a clicked position stays excluded from fallbacks, seconds.
    #[serde(default = "default_recent_click_ttl_secs")]
    pub recent_click_ttl_secs: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            stuck_position_delta: default_stuck_position_delta(),
            stuck_no_change: default_stuck_no_change(),
            stuck_absent: default_stuck_absent(),
            recently_clicked_radius: default_recently_clicked_radius(),
            moved_far_factor: default_moved_far_factor(),
            moved_far_min: default_moved_far_min(),
            final_move_delta: default_final_move_delta(),
            recent_click_ttl_secs: default_recent_click_ttl_secs(),
        }
    }
}

fn default_stuck_position_delta() -> u32 {
    10
}
fn default_stuck_no_change() -> u32 {
    5
}
fn default_stuck_absent() -> u32 {
    3
}
fn default_recently_clicked_radius() -> u32 {
    30
}
fn default_moved_far_factor() -> f64 {
    1.5
}
fn default_moved_far_min() -> u32 {
    30
}
fn default_final_move_delta() -> u32 {
    50
}
fn default_recent_click_ttl_secs() -> f64 {
    10.0
}

/// Named termination thresholds; consumed by the escalation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Consecutive interaction failures after which the run terminates.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Consecutive unresolved stuck recoveries before terminating.
    #[serde(default = "default_max_recovery_failures")]
    pub max_recovery_failures: u32,
    /// Empty detection passes before trying a camera rotation.
    #[serde(default = "default_search_rotate_after")]
    pub search_rotate_after: u32,
    /// Empty detection passes before giving up entirely. Deliberately high:
    /// legitimate travel between objectives hides the tags for a long time.
    #[serde(default = "default_search_abandon_after")]
    pub search_abandon_after: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: default_max_consecutive_failures(),
            max_recovery_failures: default_max_recovery_failures(),
            search_rotate_after: default_search_rotate_after(),
            search_abandon_after: default_search_abandon_after(),
        }
    }
}

fn default_max_consecutive_failures() -> u32 {
    10
}
fn default_max_recovery_failures() -> u32 {
    5
}
fn default_search_rotate_after() -> u32 {
    30
}
fn default_search_abandon_after() -> u32 {
    120
}

/// The label vocabulary probed against pointer-hover text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Known action labels, probed in priority order.
    #[serde(default = "default_action_labels")]
    pub action_labels: Vec<String>,
    /// Labels that must never be clicked (similar-looking transit fixtures).
    #[serde(default = "default_exclusion_labels")]
    pub exclusion_labels: Vec<String>,
    /// The action label used for collecting bonus rewards.
    #[serde(default = "default_collect_action")]
    pub collect_action: String,
    /// Substrings of hover text that identify a bonus reward.
    #[serde(default = "default_bonus_markers")]
    pub bonus_markers: Vec<String>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            action_labels: default_action_labels(),
            exclusion_labels: default_exclusion_labels(),
            collect_action: default_collect_action(),
            bonus_markers: default_bonus_markers(),
        }
    }
}

fn default_action_labels() -> Vec<String> {
    [
        "Jump", "Climb", "Take", "Vault", "Cross", "Grab", "Leap", "Hurdle", "Balance", "Swing",
        "Teeth",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclusion_labels() -> Vec<String> {
    ["Ladder", "Staircase"].iter().map(|s| s.to_string()).collect()
}

fn default_collect_action() -> String {
    "Take".into()
}

fn default_bonus_markers() -> Vec<String> {
    ["mark", "grace"].iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Learning store path. Defaults to `runner_learning.json` in the user
    /// data directory, falling back to the working directory.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// Flush the store every N recorded actions.
    #[serde(default = "default_flush_every")]
    pub flush_every: u32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            flush_every: default_flush_every(),
        }
    }
}

fn default_flush_every() -> u32 {
    5
}

impl LearningConfig {
    pub fn resolve_store_path(&self) -> PathBuf {
        if let Some(path) = &self.store_path {
            return path.clone();
        }
        if let Some(data_dir) = dirs::data_dir() {
            let dir = data_dir.join("tagrunner");
            let _ = std::fs::create_dir_all(&dir);
            return dir.join("runner_learning.json");
        }
        PathBuf::from("runner_learning.json")
    }
}

fn resolve_config_path() -> RunnerResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(RunnerError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

/// Load `config.toml` if present; a missing file is not an error.
pub fn load_config() -> RunnerResult<RunnerConfig> {
    let path = match resolve_config_path() {
        Ok(p) => p,
        Err(_) => {
            tracing::info!("no config.toml found, using defaults");
            return Ok(RunnerConfig::default());
        }
    };
    let content = std::fs::read_to_string(&path)?;
    let config: RunnerConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "config loaded");
    Ok(config)
}

pub fn save_config(config: &RunnerConfig) -> RunnerResult<()> {
    let path = resolve_config_path()?;
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
