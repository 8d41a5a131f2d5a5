// ============================================================================
// TOOL STATE: armed raster mode, per-tool settings, in-progress gestures
// ============================================================================
//
// Only one raster mode is armed at a time. While any of them is armed, clicks
// go to the tool instead of selecting layers.

use serde::{Deserialize, Serialize};

use crate::canvas::CanvasElement;
use crate::ops::color::Rgb;
use crate::ops::crop::{CropRect, CropSession};
use crate::ops::flood_fill::FillMode;
use crate::ops::shapes::{ShapeDescriptor, ShapeKind};

pub const DEFAULT_TOLERANCE: f32 = 30.0;
/// Range offered for tolerance sliders.
pub const TOLERANCE_RANGE: (f32, f32) = (0.0, 100.0);
/// Range offered for stroke thickness (logical units).
pub const THICKNESS_RANGE: (f32, f32) = (1.0, 100.0);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolMode {
    #[default]
    Select,
    Draw,
    Crop,
    FloodFill,
    ColorRemove,
}

impl ToolMode {
    pub fn label(&self) -> &'static str {
        match self {
            ToolMode::Select => "select",
            ToolMode::Draw => "draw",
            ToolMode::Crop => "crop",
            ToolMode::FloodFill => "fill",
            ToolMode::ColorRemove => "remove-color",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrawingSettings {
    pub shape: ShapeKind,
    pub color: Rgb,
    pub thickness: f32,
    pub fill: bool,
}

impl Default for DrawingSettings {
    fn default() -> Self {
        Self {
            shape: ShapeKind::Line,
            color: Rgb::BLACK,
            thickness: 5.0,
            fill: false,
        }
    }
}

impl DrawingSettings {
    pub fn set_thickness(&mut self, thickness: f32) {
        self.thickness = thickness.clamp(THICKNESS_RANGE.0, THICKNESS_RANGE.1);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloodFillSettings {
    pub color: Rgb,
    pub tolerance: f32,
    pub mode: FillMode,
}

impl Default for FloodFillSettings {
    fn default() -> Self {
        Self {
            color: Rgb::new(255, 0, 0),
            tolerance: DEFAULT_TOLERANCE,
            mode: FillMode::Adjacent,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorRemoverSettings {
    pub target: Rgb,
    pub tolerance: f32,
}

impl Default for ColorRemoverSettings {
    fn default() -> Self {
        Self {
            target: Rgb::WHITE,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

pub fn clamp_tolerance(t: f32) -> f32 {
    t.clamp(TOLERANCE_RANGE.0, TOLERANCE_RANGE.1)
}

/// Crop mode: armed flag plus the confirmed-but-not-applied rectangle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CropTool {
    pub enabled: bool,
    pub pending: Option<CropRect>,
}

impl CropTool {
    /// After a successful apply the tool stays armed for another crop.
    pub fn applied(&mut self) {
        self.pending = None;
    }
}

#[derive(Clone, Debug, Default)]
pub struct ToolState {
    mode: ToolMode,
    pub drawing: DrawingSettings,
    pub fill: FloodFillSettings,
    pub remover: ColorRemoverSettings,
    pub crop: CropTool,
    shape: Option<ShapeDescriptor>,
    crop_drag: Option<CropSession>,
}

impl ToolState {
    pub fn mode(&self) -> ToolMode {
        self.mode
    }

    /// Arm `mode`, disarming whatever was armed. Pending gestures and any
    /// unapplied crop rectangle are discarded.
    pub fn arm(&mut self, mode: ToolMode) {
        self.mode = mode;
        self.shape = None;
        self.crop_drag = None;
        self.crop = CropTool {
            enabled: mode == ToolMode::Crop,
            pending: None,
        };
    }

    /// Arm `mode`, or go back to selection if it is already armed.
    pub fn toggle(&mut self, mode: ToolMode) {
        if self.mode == mode {
            self.arm(ToolMode::Select);
        } else {
            self.arm(mode);
        }
    }

    /// Whether a click should select the layer under the pointer.
    pub fn selection_enabled(&self) -> bool {
        self.mode == ToolMode::Select
    }

    // --- draw gesture ---

    pub fn shape_down(&mut self, x: f32, y: f32) {
        if self.mode != ToolMode::Draw {
            return;
        }
        let s = &self.drawing;
        self.shape = Some(ShapeDescriptor::begin(s.shape, x, y, s.color, s.thickness, s.fill));
    }

    pub fn shape_move(&mut self, x: f32, y: f32) {
        if let Some(shape) = self.shape.as_mut() {
            shape.update(x, y);
        }
    }

    /// The shape in progress, for live preview.
    pub fn current_shape(&self) -> Option<&ShapeDescriptor> {
        self.shape.as_ref()
    }

    /// Pointer-up: hands the finished descriptor over to the rasterizer.
    pub fn shape_up(&mut self) -> Option<ShapeDescriptor> {
        self.shape.take()
    }

    // --- crop gesture (element-local coordinates) ---

    pub fn crop_down(&mut self, local_x: f32, local_y: f32, element: &CanvasElement) {
        if self.mode != ToolMode::Crop {
            return;
        }
        self.crop_drag = CropSession::begin(local_x, local_y, element);
    }

    pub fn crop_move(&mut self, local_x: f32, local_y: f32) {
        if let Some(drag) = self.crop_drag.as_mut() {
            drag.update(local_x, local_y);
        }
    }

    /// Pointer-up: a large enough rectangle becomes the pending crop area.
    pub fn crop_up(&mut self) -> Option<CropRect> {
        let rect = self.crop_drag.take().and_then(CropSession::finish);
        if rect.is_some() {
            self.crop.pending = rect;
        }
        rect
    }
}
