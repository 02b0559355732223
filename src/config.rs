use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::matching::LocateSettings;

pub const CONFIG_FILENAME: &str = "docx-comment-merge.toml";
pub const CONFIG_ENV: &str = "DOCX_COMMENT_MERGE_CONFIG";

pub const DEFAULT_AUTHOR: &str = "Reviewer";
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_merged";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub merge: MergeSection,
    #[serde(default)]
    pub locate: LocateSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct MergeSection {
    /// Author written on comments whose record has none.
    #[serde(default)]
    pub default_author: Option<String>,
    /// Paragraph matches scoring below this (0..=100) are treated as unmatched.
    #[serde(default)]
    pub min_match_score: Option<f64>,
    /// Appended to the input file stem to name the default output.
    #[serde(default)]
    pub output_suffix: Option<String>,
    /// RFC 3339 timestamp stamped on every comment instead of the current time.
    /// Useful for reproducible output.
    #[serde(default)]
    pub fixed_date: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct LocateSection {
    #[serde(default)]
    pub prefix_chars: Option<usize>,
    #[serde(default)]
    pub min_prefix_chars: Option<usize>,
    #[serde(default)]
    pub window_min: Option<usize>,
    #[serde(default)]
    pub window_max: Option<usize>,
    #[serde(default)]
    pub window_step: Option<usize>,
    #[serde(default)]
    pub anchor_sample_chars: Option<usize>,
    #[serde(default)]
    pub accept_score: Option<f64>,
    #[serde(default)]
    pub exact_score: Option<f64>,
}

/// Resolved, validated settings for one [`CommentMerger`](crate::merge::CommentMerger).
#[derive(Clone, Debug, PartialEq)]
pub struct MergeSettings {
    pub default_author: String,
    pub min_match_score: f64,
    pub output_suffix: String,
    /// Already normalized to `YYYY-MM-DDTHH:MM:SSZ`.
    pub fixed_date: Option<String>,
    pub locate: LocateSettings,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            default_author: DEFAULT_AUTHOR.to_string(),
            min_match_score: 0.0,
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            fixed_date: None,
            locate: LocateSettings::default(),
        }
    }
}

impl MergeSettings {
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let d = Self::default();
        let m = &cfg.merge;

        let default_author = m
            .default_author
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or(d.default_author);

        let min_match_score = m.min_match_score.unwrap_or(d.min_match_score);
        check_score("merge.min_match_score", min_match_score)?;

        let output_suffix = m.output_suffix.clone().unwrap_or(d.output_suffix);

        let fixed_date = m
            .fixed_date
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(normalize_date)
            .transpose()?;

        let l = &cfg.locate;
        let dl = d.locate;
        let locate = LocateSettings {
            prefix_chars: l.prefix_chars.unwrap_or(dl.prefix_chars),
            min_prefix_chars: l.min_prefix_chars.unwrap_or(dl.min_prefix_chars),
            window_min: l.window_min.unwrap_or(dl.window_min),
            window_max: l.window_max.unwrap_or(dl.window_max),
            window_step: l.window_step.unwrap_or(dl.window_step),
            anchor_sample_chars: l.anchor_sample_chars.unwrap_or(dl.anchor_sample_chars),
            accept_score: l.accept_score.unwrap_or(dl.accept_score),
            exact_score: l.exact_score.unwrap_or(dl.exact_score),
        };
        check_score("locate.accept_score", locate.accept_score)?;
        check_score("locate.exact_score", locate.exact_score)?;
        if locate.window_step == 0 {
            return Err(anyhow!("locate.window_step must be at least 1"));
        }
        if locate.window_min == 0 || locate.window_max < locate.window_min {
            return Err(anyhow!(
                "locate window bounds invalid: window_min={} window_max={}",
                locate.window_min,
                locate.window_max
            ));
        }
        if locate.anchor_sample_chars == 0 {
            return Err(anyhow!("locate.anchor_sample_chars must be at least 1"));
        }

        Ok(Self {
            default_author,
            min_match_score,
            output_suffix,
            fixed_date,
            locate,
        })
    }

    /// Loads settings from an explicit path, `DOCX_COMMENT_MERGE_CONFIG`, or the first
    /// `docx-comment-merge.toml` found upwards from `workdir`. No file at all means defaults.
    ///
    /// Returns the config path that was used, if any.
    pub fn resolve(
        config_path: Option<PathBuf>,
        workdir: &Path,
    ) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let explicit = config_path.or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));
        let cfg_file = match explicit {
            Some(p) => {
                if !p.exists() {
                    return Err(anyhow!("config not found: {}", p.display()));
                }
                Some(p)
            }
            None => find_default_config(workdir, CONFIG_FILENAME),
        };
        let cfg = match cfg_file.as_ref() {
            Some(p) => load_config(p)?,
            None => AppConfig::default(),
        };
        let settings = Self::from_config(&cfg)
            .with_context(|| match cfg_file.as_ref() {
                Some(p) => format!("invalid config: {}", p.display()),
                None => "invalid default config".to_string(),
            })?;
        Ok((settings, cfg_file))
    }

    /// Timestamp for comments written now.
    pub fn comment_date(&self) -> String {
        match &self.fixed_date {
            Some(d) => d.clone(),
            None => Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// `<dir>/<stem><suffix>.docx` next to `input`.
    pub fn default_output_for(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let dir = input.parent().unwrap_or_else(|| Path::new("."));
        dir.join(format!("{stem}{}.docx", self.output_suffix))
    }
}

fn check_score(key: &str, v: f64) -> anyhow::Result<()> {
    if !(0.0..=100.0).contains(&v) {
        return Err(anyhow!("{key} must be within 0..=100, got {v}"));
    }
    Ok(())
}

fn normalize_date(raw: &str) -> anyhow::Result<String> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("merge.fixed_date is not an RFC 3339 timestamp: {raw}"))?;
    Ok(parsed
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Secs, true))
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

pub const DEFAULT_CONFIG_TOML: &str = r#"[merge]
# Author for records that carry none.
default_author = "Reviewer"
# Best paragraph scores below this (0-100) leave the record unmerged.
min_match_score = 0
# Default output name: <input stem><suffix>.docx
output_suffix = "_merged"
# Stamp every comment with this RFC 3339 time instead of now.
# fixed_date = "2024-01-01T00:00:00Z"

[locate]
# Normalized anchor prefix searched for when the whole anchor is not found.
prefix_chars = 80
min_prefix_chars = 12
# Fuzzy window scan: window length is the anchor length clamped to [window_min, window_max].
window_min = 80
window_max = 260
window_step = 5
anchor_sample_chars = 220
accept_score = 60
exact_score = 98
"#;

/// Writes the default config into `dir`. An existing file is kept unless `force`.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}
