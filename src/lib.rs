//! ComicFE raster engine: pixel-level edits on the image and drawing layers
//! of a comic page (color removal, flood fill, crop, shape rasterization),
//! plus page export, project files and the headless CLI.

#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;

pub mod canvas;
pub mod cli;
pub mod engine;
pub mod error;
pub mod io;
pub mod ops;
pub mod project;
pub mod settings;
pub mod tools;

pub use canvas::{CanvasElement, CanvasSpec, ElementKind, ElementPatch};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
