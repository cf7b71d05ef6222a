//! Runtime configuration persisted as RON, with CLI overrides.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlareConfig {
    pub optics: OpticsConfig,
    pub tonemap: ToneMapConfig,
    pub render: RenderConfig,
    pub assets: AssetsConfig,
    pub debug: DebugConfig,
}

/// Physical constants of the simulated eye.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpticsConfig {
    /// Largest pupil diameter in mm.
    pub max_pupil_mm: f32,
    /// Adaptation luminance in cd/m^2.
    pub field_luminance: f32,
    /// Reference wavelength in nm.
    pub wavelength_nm: f32,
    /// Pupil to retina propagation distance in mm.
    pub distance_mm: f32,
    /// Number of lens particles.
    pub lens_particles: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ExposureMode {
    #[default]
    Auto,
    Manual,
}

/// Extended Reinhard settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToneMapConfig {
    pub gamma: f32,
    pub white_point: f32,
    /// Exposure knob; exposure is `2^((alpha - 0.5) * 20)` in manual mode.
    pub alpha: f32,
    pub exposure_mode: ExposureMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Frames to render in headless mode.
    pub frames: u32,
    /// Interval between periodic frame ticks, in milliseconds.
    pub tick_ms: u64,
    /// Seed for pupil and lens noise; `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Compute worker threads; `None` uses one per core.
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetsConfig {
    /// Diffraction grating bitmap.
    pub grating: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter, e.g. "info" or "temporal_glare=debug".
    pub log_level: String,
}

impl Default for OpticsConfig {
    fn default() -> Self {
        Self {
            max_pupil_mm: 9.0,
            field_luminance: 100.0,
            wavelength_nm: 575.0,
            distance_mm: 20.0,
            lens_particles: 750,
        }
    }
}

impl Default for ToneMapConfig {
    fn default() -> Self {
        Self {
            gamma: 2.2,
            white_point: 5.0,
            alpha: 0.5,
            exposure_mode: ExposureMode::Auto,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames: 10,
            tick_ms: 100,
            seed: None,
            threads: None,
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            grating: PathBuf::from("textures/grating.png"),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl GlareConfig {
    /// Read `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: GlareConfig = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Write the configuration as pretty RON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(ConfigError::WriteError)?;
        }
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;
        std::fs::write(path, serialized).map_err(ConfigError::WriteError)
    }

    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(threads) = args.threads {
            self.render.threads = Some(threads);
        }

        if let Command::Glare(glare) = &args.command {
            if let Some(ref grating) = glare.grating {
                self.assets.grating = grating.clone();
            }
            if let Some(frames) = glare.frames {
                self.render.frames = frames;
            }
            if let Some(seed) = glare.seed {
                self.render.seed = Some(seed);
            }
            if let Some(luminance) = glare.field_luminance {
                self.optics.field_luminance = luminance;
            }
            if let Some(gamma) = glare.gamma {
                self.tonemap.gamma = gamma;
            }
            if let Some(white) = glare.white_point {
                self.tonemap.white_point = white;
            }
            if let Some(alpha) = glare.alpha {
                self.tonemap.alpha = alpha;
            }
            if let Some(mode) = glare.exposure {
                self.tonemap.exposure_mode = mode;
            }
        }
    }
}

/// Temporal glare renderer.
#[derive(Parser, Debug)]
#[command(name = "tglare", about = "Temporal glare renderer")]
pub struct CliArgs {
    /// Path to the RON configuration file.
    #[arg(long, default_value = "glare.ron")]
    pub config: PathBuf,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Compute worker threads.
    #[arg(long)]
    pub threads: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Simulate glare over an HDR image.
    Glare(GlareArgs),
    /// Render a virtual view of a camera-array light field.
    Lightfield(LightFieldArgs),
    /// Write the effective configuration and exit.
    WriteConfig,
}

#[derive(clap::Args, Debug, Default)]
pub struct GlareArgs {
    /// OpenEXR image to load.
    pub image: PathBuf,
    /// Grating texture overriding the configured asset.
    #[arg(long)]
    pub grating: Option<PathBuf>,
    #[arg(long)]
    pub frames: Option<u32>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub field_luminance: Option<f32>,
    #[arg(long)]
    pub gamma: Option<f32>,
    #[arg(long)]
    pub white_point: Option<f32>,
    #[arg(long, allow_negative_numbers = true)]
    pub alpha: Option<f32>,
    #[arg(long, value_enum)]
    pub exposure: Option<ExposureMode>,
}

#[derive(clap::Args, Debug)]
pub struct LightFieldArgs {
    /// Directory holding one image per array camera, in row-major file-name order.
    pub dir: PathBuf,
    #[arg(long)]
    pub rows: usize,
    #[arg(long)]
    pub cols: usize,
    /// Distance between neighbouring array cameras.
    #[arg(long, default_value_t = 10.0)]
    pub spacing: f32,
    /// Field of view shared by the array cameras, degrees.
    #[arg(long, default_value_t = 90.0)]
    pub array_fov: f32,
    #[arg(long, default_value_t = 500.0)]
    pub focus: f32,
    #[arg(long, default_value_t = 8.0)]
    pub aperture: f32,
    #[arg(long, default_value_t = 90.0)]
    pub fov: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = GlareConfig::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("max_pupil_mm: 9.0"));
        assert!(ron_str.contains("lens_particles: 750"));
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: GlareConfig = ron::from_str("(tonemap: (gamma: 1.5))").unwrap();
        assert_eq!(config.tonemap.gamma, 1.5);
        assert_eq!(config.tonemap.white_point, 5.0);
        assert_eq!(config.optics, OpticsConfig::default());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("glare.ron");
        let mut config = GlareConfig::default();
        config.render.seed = Some(9);
        config.tonemap.exposure_mode = ExposureMode::Manual;
        config.save(&path).unwrap();

        let loaded = GlareConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn absent_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = GlareConfig::load_or_default(&dir.path().join("none.ron")).unwrap();
        assert_eq!(loaded, GlareConfig::default());
    }

    #[test]
    fn invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ron");
        std::fs::write(&path, "(optics: [").unwrap();
        assert!(matches!(
            GlareConfig::load_or_default(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn cli_overrides_apply() {
        let args = CliArgs::parse_from([
            "tglare",
            "--threads",
            "3",
            "glare",
            "scene.exr",
            "--seed",
            "4",
            "--alpha",
            "-2.5",
            "--exposure",
            "manual",
        ]);
        let mut config = GlareConfig::default();
        config.apply_cli_overrides(&args);

        assert_eq!(config.render.threads, Some(3));
        assert_eq!(config.render.seed, Some(4));
        assert_eq!(config.tonemap.alpha, -2.5);
        assert_eq!(config.tonemap.exposure_mode, ExposureMode::Manual);
        assert_eq!(config.tonemap.gamma, 2.2);
    }
}
