use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime::{
  MINUTES_PER_HOUR,
  MIN_BLOCK_MINUTES
};

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("data.location", "~/.planner"),
      ("color", "on"),
      ("default.list", "inbox"),
      ("geometry.hour_height", "60"),
      ("geometry.day_width", "120"),
      ("drag.threshold", "6"),
      ("snap.minutes", "15"),
      ("window.days_before", "7"),
      ("window.days_after", "14")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(plannerrc = %path.display(), "loading plannerrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no plannerrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_f64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<f64>> {
    self
      .map
      .get(key)
      .map(|raw| {
        raw.trim().parse::<f64>().with_context(
          || {
            format!(
              "config key {key} expects \
               a number, got {raw}"
            )
          }
        )
      })
      .transpose()
  }

  pub fn get_u32(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u32>> {
    self
      .map
      .get(key)
      .map(|raw| {
        raw.trim().parse::<u32>().with_context(
          || {
            format!(
              "config key {key} expects \
               a whole number, got {raw}"
            )
          }
        )
      })
      .transpose()
  }

  pub fn default_list(&self) -> String {
    self
      .get("default.list")
      .filter(|v| !v.trim().is_empty())
      .unwrap_or_else(|| {
        "inbox".to_string()
      })
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// Pixel geometry shared by every drag
/// surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryConfig {
  pub hour_height:    f64,
  pub day_width:      f64,
  pub drag_threshold: f64,
  pub snap_minutes:   u32
}

impl Default for GeometryConfig {
  fn default() -> Self {
    Self {
      hour_height:    60.0,
      day_width:      120.0,
      drag_threshold: 6.0,
      snap_minutes:   MIN_BLOCK_MINUTES
    }
  }
}

impl GeometryConfig {
  pub fn from_config(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    let defaults = Self::default();
    let geometry = Self {
      hour_height:    cfg
        .get_f64("geometry.hour_height")?
        .unwrap_or(defaults.hour_height),
      day_width:      cfg
        .get_f64("geometry.day_width")?
        .unwrap_or(defaults.day_width),
      drag_threshold: cfg
        .get_f64("drag.threshold")?
        .unwrap_or(
          defaults.drag_threshold
        ),
      snap_minutes:   cfg
        .get_u32("snap.minutes")?
        .unwrap_or(defaults.snap_minutes)
    };
    geometry.validate()?;
    Ok(geometry)
  }

  pub fn validate(
    &self
  ) -> anyhow::Result<()> {
    for (name, value) in [
      (
        "geometry.hour_height",
        self.hour_height
      ),
      (
        "geometry.day_width",
        self.day_width
      )
    ] {
      if !value.is_finite()
        || value <= 0.0
      {
        return Err(anyhow!(
          "{name} must be a positive \
           number, got {value}"
        ));
      }
    }
    if !self.drag_threshold.is_finite()
      || self.drag_threshold < 0.0
    {
      return Err(anyhow!(
        "drag.threshold must be \
         non-negative, got {}",
        self.drag_threshold
      ));
    }
    if self.snap_minutes == 0
      || MINUTES_PER_HOUR
        % self.snap_minutes
        != 0
    {
      return Err(anyhow!(
        "snap.minutes must divide an \
         hour, got {}",
        self.snap_minutes
      ));
    }
    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("PLANNERRC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping plannerrc"
    );
    return Ok(None);
  };
  let candidate = home.join(".plannerrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".planner"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
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

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
