// ============================================================================
// PERSISTENT SETTINGS: key=value comicfe_settings.cfg
// ============================================================================

use std::path::PathBuf;

use crate::canvas::CanvasSpec;
use crate::io::ExportFormat;
use crate::ops::color::{Rgb, hex_to_rgb};
use crate::tools::{ColorRemoverSettings, DrawingSettings, FloodFillSettings, clamp_tolerance};

const SETTINGS_FILE: &str = "comicfe_settings.cfg";

/// Tool defaults and export preferences that persist across sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub canvas: CanvasSpec,
    pub drawing: DrawingSettings,
    pub fill: FloodFillSettings,
    pub remover: ColorRemoverSettings,
    pub background: Rgb,
    pub export_format: ExportFormat,
    /// JPEG quality, 1–100.
    pub export_quality: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            canvas: CanvasSpec::SQUARE,
            drawing: DrawingSettings::default(),
            fill: FloodFillSettings::default(),
            remover: ColorRemoverSettings::default(),
            background: Rgb::WHITE,
            export_format: ExportFormat::Png,
            export_quality: 90,
        }
    }
}

impl Settings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/comicfe/comicfe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\ComicFE\comicfe_settings.cfg
    /// On macOS:   ~/Library/Application Support/ComicFE/comicfe_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("comicfe");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            let config_dir = PathBuf::from(appdata).join("ComicFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("ComicFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "canvas={}\n\
             background={}\n\
             draw_shape={}\n\
             draw_color={}\n\
             draw_thickness={}\n\
             draw_fill={}\n\
             fill_color={}\n\
             fill_tolerance={}\n\
             fill_mode={}\n\
             remover_color={}\n\
             remover_tolerance={}\n\
             export_format={}\n\
             export_quality={}\n",
            self.canvas.label(),
            self.background.to_hex(),
            self.drawing.shape.label(),
            self.drawing.color.to_hex(),
            self.drawing.thickness,
            self.drawing.fill,
            self.fill.color.to_hex(),
            self.fill.tolerance,
            self.fill.mode.label(),
            self.remover.target.to_hex(),
            self.remover.tolerance,
            self.export_format.extension(),
            self.export_quality,
        )
    }

    /// Parse settings text. Unknown keys and bad values fall back to defaults.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "canvas" => {
                    if let Ok(c) = val.parse() { s.canvas = c; }
                }
                "background" => {
                    if let Some(c) = hex_to_rgb(val) { s.background = c; }
                }
                "draw_shape" => {
                    if let Ok(k) = val.parse() { s.drawing.shape = k; }
                }
                "draw_color" => {
                    if let Some(c) = hex_to_rgb(val) { s.drawing.color = c; }
                }
                "draw_thickness" => {
                    if let Ok(t) = val.parse::<f32>() { s.drawing.set_thickness(t); }
                }
                "draw_fill" => {
                    s.drawing.fill = val == "true";
                }
                "fill_color" => {
                    if let Some(c) = hex_to_rgb(val) { s.fill.color = c; }
                }
                "fill_tolerance" => {
                    if let Ok(t) = val.parse::<f32>() { s.fill.tolerance = clamp_tolerance(t); }
                }
                "fill_mode" => {
                    if let Ok(m) = val.parse() { s.fill.mode = m; }
                }
                "remover_color" => {
                    if let Some(c) = hex_to_rgb(val) { s.remover.target = c; }
                }
                "remover_tolerance" => {
                    if let Ok(t) = val.parse::<f32>() { s.remover.tolerance = clamp_tolerance(t); }
                }
                "export_format" => {
                    if let Ok(f) = val.parse() { s.export_format = f; }
                }
                "export_quality" => {
                    s.export_quality = val.parse::<u8>().unwrap_or(90).clamp(1, 100);
                }
                _ => {}
            }
        }
        s
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            log_warn!("Could not save settings to {}: {}", path.display(), e);
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::from_config_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::flood_fill::FillMode;
    use crate::ops::shapes::ShapeKind;

    #[test]
    fn config_text_round_trips() {
        let mut s = Settings::default();
        s.canvas = CanvasSpec::PORTRAIT;
        s.drawing.shape = ShapeKind::Rectangle;
        s.drawing.set_thickness(12.0);
        s.fill.mode = FillMode::All;
        s.fill.tolerance = 55.0;
        s.remover.target = Rgb::new(0, 255, 0);
        s.export_format = ExportFormat::Jpeg;
        s.export_quality = 75;
        assert_eq!(Settings::from_config_str(&s.to_config_string()), s);
    }

    #[test]
    fn tolerant_of_garbage() {
        let text = "fill_color=not-a-color\n\
                    fill_tolerance=900\n\
                    # comment\n\
                    export_quality=abc\n\
                    canvas=0x0\n\
                    mystery=1\n";
        let s = Settings::from_config_str(text);
        assert_eq!(s.fill.color, Rgb::new(255, 0, 0));
        assert_eq!(s.fill.tolerance, 100.0);
        assert_eq!(s.export_quality, 90);
        assert_eq!(s.canvas, CanvasSpec::SQUARE);
    }
}
