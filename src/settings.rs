// ============================================================================
// SETTINGS: editor defaults persisted as a plain key=value file
// ============================================================================

use std::path::PathBuf;

use image::Rgba;

use crate::surface::ResampleFilter;

const SETTINGS_FILE: &str = "layerfe_settings.cfg";

#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Length cap of the undo stack.
    pub max_undo_steps: usize,
    pub zoom_min: f32,
    pub zoom_max: f32,
    /// Factor applied by one zoom in/out step.
    pub zoom_step: f32,
    /// Compositor background behind the bottom layer.
    pub background: Rgba<u8>,
    pub default_width: u32,
    pub default_height: u32,
    pub resample: ResampleFilter,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: 20,
            zoom_min: 0.1,
            zoom_max: 10.0,
            zoom_step: 1.2,
            background: Rgba([0, 0, 0, 255]),
            default_width: 800,
            default_height: 600,
            resample: ResampleFilter::Bilinear,
        }
    }
}

fn parse_color(val: &str) -> Option<Rgba<u8>> {
    let hex = val.trim().trim_start_matches('#');
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => None,
    }
}

fn format_color(c: Rgba<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}{:02x}", c[0], c[1], c[2], c[3])
}

impl EditorSettings {
    /// Platform config location (XDG on Linux, %APPDATA% on Windows,
    /// Application Support on macOS).
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("layerfe");
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("LayerFE").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("LayerFE")
                    .join(SETTINGS_FILE),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Load from the platform path; missing or unreadable files give defaults.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::from_config_str(&content)
    }

    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::settings_path() else { return Ok(()) };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, self.to_config_string())?;
        tracing::info!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Parse `key=value` lines. Unknown keys are ignored; malformed values
    /// keep the default for that key.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "max_undo_steps" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.max_undo_steps = v.clamp(1, 1000);
                    }
                }
                "zoom_min" => {
                    if let Ok(v) = val.parse::<f32>() {
                        if v.is_finite() && v > 0.0 {
                            s.zoom_min = v;
                        }
                    }
                }
                "zoom_max" => {
                    if let Ok(v) = val.parse::<f32>() {
                        if v.is_finite() && v > 0.0 {
                            s.zoom_max = v;
                        }
                    }
                }
                "zoom_step" => {
                    if let Ok(v) = val.parse::<f32>() {
                        if v.is_finite() && v > 1.0 {
                            s.zoom_step = v;
                        }
                    }
                }
                "background" => {
                    if let Some(c) = parse_color(val) {
                        s.background = c;
                    }
                }
                "default_width" => {
                    if let Ok(v) = val.parse::<u32>() {
                        if v > 0 {
                            s.default_width = v;
                        }
                    }
                }
                "default_height" => {
                    if let Ok(v) = val.parse::<u32>() {
                        if v > 0 {
                            s.default_height = v;
                        }
                    }
                }
                "resample" => {
                    if let Some(f) = ResampleFilter::from_name(val) {
                        s.resample = f;
                    }
                }
                _ => {}
            }
        }
        if s.zoom_min > s.zoom_max {
            std::mem::swap(&mut s.zoom_min, &mut s.zoom_max);
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "max_undo_steps={}\n\
             zoom_min={}\n\
             zoom_max={}\n\
             zoom_step={}\n\
             background={}\n\
             default_width={}\n\
             default_height={}\n\
             resample={}\n",
            self.max_undo_steps,
            self.zoom_min,
            self.zoom_max,
            self.zoom_step,
            format_color(self.background),
            self.default_width,
            self.default_height,
            self.resample.name(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_config_reads_back() {
        let s = EditorSettings {
            max_undo_steps: 7,
            background: Rgba([255, 255, 255, 128]),
            resample: ResampleFilter::Nearest,
            ..Default::default()
        };
        assert_eq!(EditorSettings::from_config_str(&s.to_config_string()), s);
    }

    #[test]
    fn bad_values_fall_back_per_key() {
        let s = EditorSettings::from_config_str(
            "max_undo_steps=lots\nzoom_step=0.5\nbackground=#12345\nresample=cubic\nfoo=bar\ndefault_width=1024\nnot a line",
        );
        let d = EditorSettings::default();
        assert_eq!(s.max_undo_steps, d.max_undo_steps);
        assert_eq!(s.zoom_step, d.zoom_step);
        assert_eq!(s.background, d.background);
        assert_eq!(s.resample, d.resample);
        assert_eq!(s.default_width, 1024);
    }

    #[test]
    fn colour_parsing_accepts_rgb_and_rgba() {
        assert_eq!(parse_color("#ff0000"), Some(Rgba([255, 0, 0, 255])));
        assert_eq!(parse_color("00ff0080"), Some(Rgba([0, 255, 0, 128])));
        assert_eq!(parse_color("#zzzzzz"), None);
    }
}
