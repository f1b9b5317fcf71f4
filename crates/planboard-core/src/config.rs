use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{
  debug,
  info,
  warn
};

use crate::datetime::parse_timezone;

pub const CONFIG_FILE_NAME: &str =
  "planboard.toml";
pub const CONFIG_ENV_VAR: &str =
  "PLANBOARD_CONFIG";
pub const TIMEZONE_ENV_VAR: &str =
  "PLANBOARD_TIMEZONE";

const DEFAULT_HOUR_HEIGHT: f64 = 60.0;
const DEFAULT_MIN_SLOT_MINUTES: u32 =
  15;
const DEFAULT_DURATION_MINUTES: u32 =
  60;
const DEFAULT_SORT_GAP: i64 = 1024;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
  timezone: Option<String>,
  hour_height: Option<f64>,
  min_slot_minutes: Option<u32>,
  default_duration_minutes: Option<u32>,
  sort_gap: Option<i64>,
  supports_geometric_targets:
    Option<bool>
}

/// Engine tunables. Every field has a
/// default so an absent config file is
/// a valid configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
  /// Zone the calendar's day keys and
  /// hours are interpreted in.
  pub timezone: Tz,
  /// Pixel height of one hour in an
  /// undivided calendar day area.
  pub hour_height: f64,
  /// Floor for a calendar slot drop's
  /// duration. May be raised, never
  /// set below 15.
  pub min_slot_minutes: u32,
  /// Duration used when a task has
  /// neither a planned window nor an
  /// estimate.
  pub default_duration_minutes: u32,
  /// Spacing between sort indices when
  /// appending or re-sequencing a list.
  pub sort_gap: i64,
  /// Whether the host can hit-test
  /// pointer coordinates against the
  /// zone registry.
  pub supports_geometric_targets: bool,
  pub loaded_from: Option<PathBuf>
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      timezone: chrono_tz::UTC,
      hour_height: DEFAULT_HOUR_HEIGHT,
      min_slot_minutes:
        DEFAULT_MIN_SLOT_MINUTES,
      default_duration_minutes:
        DEFAULT_DURATION_MINUTES,
      sort_gap: DEFAULT_SORT_GAP,
      supports_geometric_targets: true,
      loaded_from: None
    }
  }
}

impl Settings {
  #[tracing::instrument(skip(
    override_path
  ))]
  pub fn load(
    override_path: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut settings =
      match resolve_config_path(
        override_path
      ) {
        | Some(path) => {
          info!(config = %path.display(), "loading settings");
          Self::from_file(&path)?
        }
        | None => {
          warn!(
            "no planboard config \
             found; using defaults"
          );
          Self::default()
        }
      };

    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
    {
      debug!(timezone = %raw, "timezone overridden from environment");
      settings.timezone =
        parse_timezone(&raw)
          .with_context(|| {
            format!(
              "invalid \
               {TIMEZONE_ENV_VAR}"
            )
          })?;
    }

    Ok(settings)
  }

  pub fn from_file(
    path: &Path
  ) -> anyhow::Result<Self> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    let mut settings =
      Self::from_toml_str(&text)
        .with_context(|| {
          format!(
            "invalid config {}",
            path.display()
          )
        })?;
    settings.loaded_from = Some(path);
    Ok(settings)
  }

  pub fn from_toml_str(
    text: &str
  ) -> anyhow::Result<Self> {
    let file: SettingsFile =
      toml::from_str(text)
        .context("failed to parse toml")?;

    let mut settings = Self::default();
    if let Some(tz) = file.timezone {
      settings.timezone =
        parse_timezone(&tz)?;
    }
    if let Some(v) = file.hour_height {
      settings.hour_height = v;
    }
    if let Some(v) =
      file.min_slot_minutes
    {
      settings.min_slot_minutes = v;
    }
    if let Some(v) =
      file.default_duration_minutes
    {
      settings
        .default_duration_minutes = v;
    }
    if let Some(v) = file.sort_gap {
      settings.sort_gap = v;
    }
    if let Some(v) =
      file.supports_geometric_targets
    {
      settings
        .supports_geometric_targets = v;
    }
    settings.validate()?;
    Ok(settings)
  }

  /// Applies `key=value` overrides on
  /// top of the loaded settings.
  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    let mut next = self.clone();
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      next.set(&key, &v)?;
    }
    next.validate()?;
    *self = next;
    Ok(())
  }

  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    let value = value.trim();
    match key {
      | "timezone" => {
        self.timezone =
          parse_timezone(value)?;
      }
      | "hour_height" => {
        self.hour_height =
          value.parse().with_context(
            || {
              format!(
                "hour_height must be \
                 a number, got \
                 {value}"
              )
            }
          )?;
      }
      | "min_slot_minutes" => {
        self.min_slot_minutes =
          parse_minutes(key, value)?;
      }
      | "default_duration_minutes" => {
        self.default_duration_minutes =
          parse_minutes(key, value)?;
      }
      | "sort_gap" => {
        self.sort_gap =
          value.parse().with_context(
            || {
              format!(
                "sort_gap must be an \
                 integer, got {value}"
              )
            }
          )?;
      }
      | "supports_geometric_targets" => {
        self
          .supports_geometric_targets =
          parse_bool(value).ok_or_else(
            || {
              anyhow!(
                "{key} must be a \
                 boolean, got {value}"
              )
            }
          )?;
      }
      | other => {
        return Err(anyhow!(
          "unknown setting: {other}"
        ));
      }
    }
    Ok(())
  }

  fn validate(
    &self
  ) -> anyhow::Result<()> {
    if self.sort_gap < 2 {
      return Err(anyhow!(
        "sort_gap must be at least 2, \
         got {}",
        self.sort_gap
      ));
    }
    if self.min_slot_minutes
      < DEFAULT_MIN_SLOT_MINUTES
    {
      return Err(anyhow!(
        "min_slot_minutes must be at \
         least \
         {DEFAULT_MIN_SLOT_MINUTES}, \
         got {}",
        self.min_slot_minutes
      ));
    }
    if self.default_duration_minutes
      == 0
    {
      return Err(anyhow!(
        "default_duration_minutes \
         must be positive"
      ));
    }
    if !self.hour_height.is_finite() {
      return Err(anyhow!(
        "hour_height must be finite"
      ));
    }
    Ok(())
  }
}

fn resolve_config_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(raw) =
    std::env::var(CONFIG_ENV_VAR)
  {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  let candidate = dirs::config_dir()?
    .join("planboard")
    .join(CONFIG_FILE_NAME);
  candidate.exists().then_some(candidate)
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_minutes(
  key: &str,
  value: &str
) -> anyhow::Result<u32> {
  value.parse().with_context(|| {
    format!(
      "{key} must be a whole number \
       of minutes, got {value}"
    )
  })
}

fn parse_bool(
  s: &str
) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}
