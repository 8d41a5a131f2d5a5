// ============================================================================
// CANVAS MODEL: page elements, canvas geometry, element patches
// ============================================================================
//
// Elements are immutable snapshots from the engine's point of view: every
// operation takes an element by reference and returns an `ElementPatch`, which
// the caller applies with `CanvasElement::with_patch` (copy-on-write).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::io::ImageAsset;
use crate::ops::color::Rgb;
use crate::ops::shapes::DrawingData;

/// Longest edge an image element gets when first placed on the canvas.
pub const IMAGE_FIT_BOX: f32 = 300.0;
/// Where newly added image elements land (logical units).
pub const DEFAULT_PLACEMENT: (f32, f32) = (50.0, 50.0);

pub type ElementId = u64;

static LAST_ID: AtomicU64 = AtomicU64::new(0);

/// Creation-timestamp-derived id (milliseconds since the epoch), bumped so ids
/// stay strictly increasing when several elements are created within one millisecond.
pub fn next_element_id() -> ElementId {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let mut prev = LAST_ID.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_ID.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

// ============================================================================
// CANVAS GEOMETRY
// ============================================================================

/// Logical display box plus the physical export resolution it stands in for.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanvasSpec {
    pub logical_width: f32,
    pub logical_height: f32,
    pub physical_width: u32,
    pub physical_height: u32,
}

impl CanvasSpec {
    /// 1080×1080 exported, edited as a 400×400 box.
    pub const SQUARE: CanvasSpec = CanvasSpec {
        logical_width: 400.0,
        logical_height: 400.0,
        physical_width: 1080,
        physical_height: 1080,
    };

    /// 1080×1350 exported, edited as a 400×500 box.
    pub const PORTRAIT: CanvasSpec = CanvasSpec {
        logical_width: 400.0,
        logical_height: 500.0,
        physical_width: 1080,
        physical_height: 1350,
    };

    /// Any physical resolution, shown 400 units wide.
    pub fn from_physical(physical_width: u32, physical_height: u32) -> EngineResult<Self> {
        if physical_width == 0 || physical_height == 0 {
            return Err(EngineError::InvalidGeometry(format!(
                "canvas {}x{}",
                physical_width, physical_height
            )));
        }
        let logical_width = 400.0;
        Ok(Self {
            logical_width,
            logical_height: logical_width * physical_height as f32 / physical_width as f32,
            physical_width,
            physical_height,
        })
    }

    /// Physical pixels per logical unit along X. Drawings use this as their scale ratio.
    pub fn ratio(&self) -> f32 {
        self.physical_width as f32 / self.logical_width
    }

    /// Physical pixels per logical unit along Y.
    pub fn ratio_y(&self) -> f32 {
        self.physical_height as f32 / self.logical_height
    }

    /// `WxH` label of the physical size.
    pub fn label(&self) -> String {
        format!("{}x{}", self.physical_width, self.physical_height)
    }
}

impl Default for CanvasSpec {
    fn default() -> Self {
        CanvasSpec::SQUARE
    }
}

impl std::str::FromStr for CanvasSpec {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidGeometry(format!("canvas size '{}'", s));
        let (w, h) = s.trim().split_once(|c: char| c == 'x' || c == 'X').ok_or_else(invalid)?;
        let w: u32 = w.trim().parse().map_err(|_| invalid())?;
        let h: u32 = h.trim().parse().map_err(|_| invalid())?;
        match (w, h) {
            (1080, 1080) => Ok(CanvasSpec::SQUARE),
            (1080, 1350) => Ok(CanvasSpec::PORTRAIT),
            _ => CanvasSpec::from_physical(w, h),
        }
    }
}

// ============================================================================
// ELEMENTS
// ============================================================================

/// The closed set of layer kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Character,
    Background,
    Text,
    Image,
    Drawing,
}

impl ElementKind {
    pub fn label(&self) -> &'static str {
        match self {
            ElementKind::Character => "character",
            ElementKind::Background => "background",
            ElementKind::Text => "text",
            ElementKind::Image => "image",
            ElementKind::Drawing => "drawing",
        }
    }
}

/// Styled text record. Rendering text is handled outside the raster engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
    pub font_family: String,
    pub font_size: f32,
    pub color: Rgb,
    pub bubble: Option<Rgb>,
}

/// Render-time image adjustments. Never baked into the stored bitmap.
///
/// Percentages follow CSS filter conventions: 100 is neutral for brightness,
/// contrast, saturation and opacity; 0 is neutral for the rest.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageFilters {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    /// Degrees.
    pub hue: f32,
    /// Logical pixels.
    pub blur: f32,
    pub grayscale: f32,
    pub sepia: f32,
    pub invert: f32,
    pub opacity: f32,
    /// Degrees, clockwise.
    pub rotate: f32,
    pub flip_h: bool,
    pub flip_v: bool,
}

impl Default for ImageFilters {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            hue: 0.0,
            blur: 0.0,
            grayscale: 0.0,
            sepia: 0.0,
            invert: 0.0,
            opacity: 100.0,
            rotate: 0.0,
            flip_h: false,
            flip_v: false,
        }
    }
}

impl ImageFilters {
    /// True when no color adjustment would change a pixel.
    pub fn is_color_neutral(&self) -> bool {
        self.brightness == 100.0
            && self.contrast == 100.0
            && self.saturation == 100.0
            && self.hue % 360.0 == 0.0
            && self.blur <= 0.0
            && self.grayscale <= 0.0
            && self.sepia <= 0.0
            && self.invert <= 0.0
    }
}

/// Per-kind payload. Only `Drawing` carries vector metadata, and `Text` is the
/// only kind without a bitmap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ElementBody {
    Character { asset: ImageAsset },
    Background { asset: ImageAsset },
    Text { text: TextContent },
    Image { asset: ImageAsset },
    Drawing { asset: ImageAsset, drawing: DrawingData },
}

/// One layer of a page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanvasElement {
    pub id: ElementId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub filters: Option<ImageFilters>,
    pub body: ElementBody,
}

/// Replacement state for one element, returned by every successful operation.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementPatch {
    pub content: ImageAsset,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Only set when an operation produces a new drawing record.
    pub drawing: Option<DrawingData>,
    /// The new bitmap no longer follows the element's drawing record, so the
    /// element must become a plain image.
    pub detach_drawing: bool,
}

impl ElementPatch {
    /// New bitmap, geometry unchanged.
    pub fn content(element: &CanvasElement, content: ImageAsset) -> Self {
        Self {
            content,
            x: element.x,
            y: element.y,
            width: element.width,
            height: element.height,
            drawing: None,
            detach_drawing: false,
        }
    }
}

impl CanvasElement {
    /// Image element fitted into [`IMAGE_FIT_BOX`], keeping its aspect ratio.
    pub fn new_image(asset: ImageAsset, natural_width: u32, natural_height: u32) -> Self {
        let mut w = natural_width as f32;
        let mut h = natural_height as f32;
        if w > IMAGE_FIT_BOX || h > IMAGE_FIT_BOX {
            let scale = (IMAGE_FIT_BOX / w).min(IMAGE_FIT_BOX / h);
            w *= scale;
            h *= scale;
        }
        Self {
            id: next_element_id(),
            x: DEFAULT_PLACEMENT.0,
            y: DEFAULT_PLACEMENT.1,
            width: w.round(),
            height: h.round(),
            filters: Some(ImageFilters::default()),
            body: ElementBody::Image { asset },
        }
    }

    /// Image element whose display geometry is given explicitly.
    pub fn image_at(asset: ImageAsset, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            id: next_element_id(),
            x,
            y,
            width,
            height,
            filters: None,
            body: ElementBody::Image { asset },
        }
    }

    /// Drawing element placed exactly where the rasterizer says.
    pub fn new_drawing(patch: ElementPatch, drawing: DrawingData) -> Self {
        Self {
            id: next_element_id(),
            x: patch.x,
            y: patch.y,
            width: patch.width,
            height: patch.height,
            filters: None,
            body: ElementBody::Drawing {
                asset: patch.content,
                drawing,
            },
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self.body {
            ElementBody::Character { .. } => ElementKind::Character,
            ElementBody::Background { .. } => ElementKind::Background,
            ElementBody::Text { .. } => ElementKind::Text,
            ElementBody::Image { .. } => ElementKind::Image,
            ElementBody::Drawing { .. } => ElementKind::Drawing,
        }
    }

    /// The bitmap behind this element, for any kind that has one.
    pub fn asset(&self) -> Option<&ImageAsset> {
        match &self.body {
            ElementBody::Character { asset }
            | ElementBody::Background { asset }
            | ElementBody::Image { asset }
            | ElementBody::Drawing { asset, .. } => Some(asset),
            ElementBody::Text { .. } => None,
        }
    }

    /// The bitmap, if this kind may be pixel-edited.
    pub fn editable_asset(&self) -> EngineResult<&ImageAsset> {
        match &self.body {
            ElementBody::Image { asset } | ElementBody::Drawing { asset, .. } => Ok(asset),
            _ => Err(EngineError::UnsupportedLayerType(self.kind())),
        }
    }

    pub fn drawing(&self) -> Option<&DrawingData> {
        match &self.body {
            ElementBody::Drawing { drawing, .. } => Some(drawing),
            _ => None,
        }
    }

    /// Rejects elements whose size would make coordinate ratios undefined.
    pub fn ensure_has_area(&self) -> EngineResult<()> {
        if self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite() {
            Ok(())
        } else {
            Err(EngineError::InvalidGeometry(format!(
                "element {} is {}x{}",
                self.id, self.width, self.height
            )))
        }
    }

    /// Canvas point relative to this element's top-left.
    pub fn to_local(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.x, y - self.y)
    }

    /// Copy of this element with the patch applied. A patch carrying drawing
    /// metadata turns the element into a drawing, a detaching patch turns a
    /// drawing into an image; otherwise the kind is kept.
    ///
    /// Text elements have no bitmap, so they come back unchanged.
    pub fn with_patch(&self, patch: &ElementPatch) -> CanvasElement {
        let body = match (&self.body, &patch.drawing) {
            (ElementBody::Text { .. }, _) => return self.clone(),
            (_, Some(drawing)) => ElementBody::Drawing {
                asset: patch.content.clone(),
                drawing: drawing.clone(),
            },
            (ElementBody::Character { .. }, None) => ElementBody::Character {
                asset: patch.content.clone(),
            },
            (ElementBody::Background { .. }, None) => ElementBody::Background {
                asset: patch.content.clone(),
            },
            (ElementBody::Image { .. }, None) => ElementBody::Image {
                asset: patch.content.clone(),
            },
            (ElementBody::Drawing { .. }, None) if patch.detach_drawing => ElementBody::Image {
                asset: patch.content.clone(),
            },
            (ElementBody::Drawing { drawing, .. }, None) => ElementBody::Drawing {
                asset: patch.content.clone(),
                drawing: drawing.clone(),
            },
        };
        CanvasElement {
            id: self.id,
            x: patch.x,
            y: patch.y,
            width: patch.width,
            height: patch.height,
            filters: self.filters,
            body,
        }
    }
}
