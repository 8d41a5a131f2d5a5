// ============================================================================
// ENGINE ERRORS: every way a single raster action can abort
// ============================================================================
//
// None of these are fatal: an operation that fails leaves the element
// untouched, and re-running it with the same inputs is always safe.

use crate::canvas::ElementKind;

/// Failure of one raster operation.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Malformed `#rrggbb` string.
    InvalidColor(String),
    /// The layer has no pixel representation (text, or an asset-less kind).
    UnsupportedLayerType(ElementKind),
    NoLayerSelected,
    /// Crop apply requested with no confirmed rectangle.
    NoAreaSelected,
    /// The scan completed but nothing changed. The element must not be replaced.
    NoPixelsMatched,
    /// The asset could not be fetched or decoded.
    DecodeFailure(String),
    /// The result bitmap could not be encoded.
    EncodeFailure(String),
    /// Zero-size element, zero-size crop, or a point outside the bitmap.
    InvalidGeometry(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Message suitable for showing to the user as-is.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::InvalidColor(hex) => format!("'{}' is not a valid color. Use #rrggbb.", hex),
            EngineError::UnsupportedLayerType(kind) => format!(
                "Only image or drawing layers can be edited this way ({} layer selected).",
                kind.label()
            ),
            EngineError::NoLayerSelected => "Select a layer first.".to_string(),
            EngineError::NoAreaSelected => "Drag to select the area to crop first.".to_string(),
            EngineError::NoPixelsMatched => {
                "No matching pixels found. Try a higher tolerance.".to_string()
            }
            EngineError::DecodeFailure(_) => "The image could not be loaded.".to_string(),
            EngineError::EncodeFailure(_) => "The result image could not be saved.".to_string(),
            EngineError::InvalidGeometry(_) => "The layer or selection has no area.".to_string(),
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidColor(hex) => write!(f, "Invalid color: {}", hex),
            EngineError::UnsupportedLayerType(kind) => {
                write!(f, "Unsupported layer type: {}", kind.label())
            }
            EngineError::NoLayerSelected => write!(f, "No layer selected"),
            EngineError::NoAreaSelected => write!(f, "No area selected"),
            EngineError::NoPixelsMatched => write!(f, "No pixels matched"),
            EngineError::DecodeFailure(e) => write!(f, "Decode failure: {}", e),
            EngineError::EncodeFailure(e) => write!(f, "Encode failure: {}", e),
            EngineError::InvalidGeometry(e) => write!(f, "Invalid geometry: {}", e),
        }
    }
}

impl std::error::Error for EngineError {}
