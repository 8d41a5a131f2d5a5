// ============================================================================
// RASTER ENGINE: element snapshot in, element patch out
// ============================================================================
//
// The layer store hands the engine the selected element (if any) together
// with the operation parameters. The engine never keeps a reference to an
// element or a bitmap between calls: each operation decodes, edits a private
// buffer, encodes it as PNG and returns the replacement state.
//
// Checks run in a fixed order so the user always sees the first problem:
// selection, layer kind, parameters, then geometry and decoding.

use image::RgbaImage;

use crate::canvas::{CanvasElement, CanvasSpec, ElementPatch};
use crate::error::{EngineError, EngineResult};
use crate::io::{AssetResolver, ImageAsset, decode_asset, decode_bytes, encode_asset};
use crate::ops::color::{Rgb, parse_hex};
use crate::ops::color_removal;
use crate::ops::coords::to_pixel_index;
use crate::ops::crop::{self, CropRect};
use crate::ops::flood_fill::{self, FillMode};
use crate::ops::shapes::{self, ShapeDescriptor};
use crate::tools::CropTool;

/// Smallest logical size an element may be resized to.
pub const MIN_ELEMENT_SIZE: f32 = 50.0;

pub struct Engine {
    canvas: CanvasSpec,
    resolver: Box<dyn AssetResolver>,
}

impl Engine {
    pub fn new(canvas: CanvasSpec, resolver: impl AssetResolver + 'static) -> Self {
        Self {
            canvas,
            resolver: Box::new(resolver),
        }
    }

    pub fn canvas(&self) -> &CanvasSpec {
        &self.canvas
    }

    /// Selected element and its editable bitmap reference.
    fn target<'a>(selected: Option<&'a CanvasElement>) -> EngineResult<(&'a CanvasElement, &'a ImageAsset)> {
        let element = selected.ok_or(EngineError::NoLayerSelected)?;
        let asset = element.editable_asset()?;
        Ok((element, asset))
    }

    fn load(&self, asset: &ImageAsset) -> EngineResult<RgbaImage> {
        decode_asset(asset, self.resolver.as_ref())
    }

    /// Decode any element's bitmap.
    pub fn decode(&self, element: &CanvasElement) -> EngineResult<RgbaImage> {
        let asset = element
            .asset()
            .ok_or(EngineError::UnsupportedLayerType(element.kind()))?;
        self.load(asset)
    }

    /// Clear every pixel near `target_hex` to transparent.
    pub fn remove_color(
        &self,
        selected: Option<&CanvasElement>,
        target_hex: &str,
        tolerance: f32,
    ) -> EngineResult<ElementPatch> {
        logged("Color remover", || {
            let (element, asset) = Self::target(selected)?;
            let target = parse_hex(target_hex)?;
            let mut pixels = self.load(asset)?;

            let changed = color_removal::remove_color(&mut pixels, target, tolerance);
            if changed == 0 {
                return Err(EngineError::NoPixelsMatched);
            }
            log_info!(
                "Color remover: {} pixels of {} cleared on element {} (tolerance {})",
                changed,
                target,
                element.id,
                tolerance
            );
            pixel_edit_patch(element, &pixels)
        })
    }

    /// Fill from a click given in element-local logical coordinates.
    pub fn flood_fill(
        &self,
        selected: Option<&CanvasElement>,
        local_x: f32,
        local_y: f32,
        fill_hex: &str,
        tolerance: f32,
        mode: FillMode,
    ) -> EngineResult<ElementPatch> {
        logged("Flood fill", || {
            let (element, asset) = Self::target(selected)?;
            let fill = parse_hex(fill_hex)?;
            element.ensure_has_area()?;
            let mut pixels = self.load(asset)?;

            let (px, py) = to_pixel_index(local_x, local_y, element, pixels.width(), pixels.height())?;
            let changed = flood_fill::flood_fill(&mut pixels, px, py, fill, tolerance, mode)?;
            if changed == 0 {
                return Err(EngineError::NoPixelsMatched);
            }
            log_info!(
                "Flood fill ({}): {} pixels set to {} from ({}, {}) on element {}",
                mode.label(),
                changed,
                fill,
                px,
                py,
                element.id
            );
            pixel_edit_patch(element, &pixels)
        })
    }

    /// Color under an element-local point (eyedropper).
    pub fn pick_color(&self, selected: Option<&CanvasElement>, local_x: f32, local_y: f32) -> EngineResult<Rgb> {
        let (element, asset) = Self::target(selected)?;
        element.ensure_has_area()?;
        let pixels = self.load(asset)?;
        let (px, py) = to_pixel_index(local_x, local_y, element, pixels.width(), pixels.height())?;
        Ok(Rgb::from_pixel(pixels.get_pixel(px, py)))
    }

    /// Rasterize a finished draw gesture. Degenerate gestures give `Ok(None)`.
    /// The patch carries the drawing record for the new element.
    pub fn finish_drawing(&self, shape: &ShapeDescriptor) -> EngineResult<Option<ElementPatch>> {
        logged("Draw", || {
            let Some(raster) = shapes::rasterize_shape(shape, self.canvas.ratio())? else {
                log_info!("Draw: gesture too small, ignored");
                return Ok(None);
            };
            log_info!(
                "Draw: {} rasterized at {}x{}",
                shape.kind.label(),
                raster.image.width(),
                raster.image.height()
            );
            Ok(Some(ElementPatch {
                content: encode_asset(&raster.image)?,
                x: raster.x,
                y: raster.y,
                width: raster.width,
                height: raster.height,
                drawing: Some(raster.drawing),
                detach_drawing: false,
            }))
        })
    }

    /// [`Engine::finish_drawing`] as a new drawing element.
    pub fn draw_element(&self, shape: &ShapeDescriptor) -> EngineResult<Option<CanvasElement>> {
        Ok(self.finish_drawing(shape)?.and_then(|patch| {
            let drawing = patch.drawing.clone()?;
            Some(CanvasElement::new_drawing(patch, drawing))
        }))
    }

    /// Redraw a drawing element's bitmap for a new logical size. The stored
    /// drawing record is left as it is.
    pub fn regenerate_drawing(
        &self,
        element: &CanvasElement,
        new_width: f32,
        new_height: f32,
    ) -> EngineResult<ElementPatch> {
        logged("Redraw", || {
            let drawing = element
                .drawing()
                .ok_or(EngineError::UnsupportedLayerType(element.kind()))?;
            let image = shapes::rerasterize(drawing, new_width, new_height, self.canvas.ratio())?;
            Ok(ElementPatch {
                content: encode_asset(&image)?,
                x: element.x,
                y: element.y,
                width: new_width,
                height: new_height,
                drawing: None,
                detach_drawing: false,
            })
        })
    }

    /// Move/resize an element. Sizes are held at [`MIN_ELEMENT_SIZE`]; drawing
    /// elements are redrawn for the new size, other kinds keep their bitmap.
    pub fn resize_element(
        &self,
        selected: Option<&CanvasElement>,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> EngineResult<ElementPatch> {
        let element = selected.ok_or(EngineError::NoLayerSelected)?;
        let asset = element
            .asset()
            .ok_or(EngineError::UnsupportedLayerType(element.kind()))?;
        let width = width.max(MIN_ELEMENT_SIZE);
        let height = height.max(MIN_ELEMENT_SIZE);
        if element.drawing().is_some() {
            let mut patch = self.regenerate_drawing(element, width, height)?;
            patch.x = x;
            patch.y = y;
            return Ok(patch);
        }
        Ok(ElementPatch {
            content: asset.clone(),
            x,
            y,
            width,
            height,
            drawing: None,
            detach_drawing: false,
        })
    }

    /// Crop the selected element to `area` (element-local logical units).
    pub fn crop(&self, selected: Option<&CanvasElement>, area: Option<CropRect>) -> EngineResult<ElementPatch> {
        logged("Crop", || {
            let (element, asset) = Self::target(selected)?;
            let rect = area.ok_or(EngineError::NoAreaSelected)?;
            element.ensure_has_area()?;
            let pixels = self.load(asset)?;

            let cropped = crop::apply_crop(&pixels, &rect, element)?;
            log_info!(
                "Crop: element {} cut to {}x{} px",
                element.id,
                cropped.image.width(),
                cropped.image.height()
            );
            Ok(ElementPatch {
                content: encode_asset(&cropped.image)?,
                x: cropped.x,
                y: cropped.y,
                width: cropped.width,
                height: cropped.height,
                drawing: None,
                detach_drawing: true,
            })
        })
    }

    /// Crop with the tool's pending area. On success the area is cleared and
    /// the tool stays armed.
    pub fn apply_crop(&self, selected: Option<&CanvasElement>, tool: &mut CropTool) -> EngineResult<ElementPatch> {
        let patch = self.crop(selected, tool.pending)?;
        tool.applied();
        Ok(patch)
    }

    /// New image element from encoded bytes, fitted into the placement box.
    pub fn add_image(&self, bytes: Vec<u8>) -> EngineResult<CanvasElement> {
        let img = decode_bytes(&bytes)?;
        let element = CanvasElement::new_image(ImageAsset::Inline(bytes), img.width(), img.height());
        log_info!(
            "Image added: {}x{} px placed as {}x{}",
            img.width(),
            img.height(),
            element.width,
            element.height
        );
        Ok(element)
    }
}

/// Patch for an in-place pixel edit. Drawings lose their vector record since
/// the new bitmap can no longer be regenerated from it.
fn pixel_edit_patch(element: &CanvasElement, pixels: &RgbaImage) -> EngineResult<ElementPatch> {
    let mut patch = ElementPatch::content(element, encode_asset(pixels)?);
    patch.detach_drawing = element.drawing().is_some();
    Ok(patch)
}

/// Run an operation and log its failure, if any, under `op`.
fn logged<T>(op: &str, f: impl FnOnce() -> EngineResult<T>) -> EngineResult<T> {
    let result = f();
    if let Err(e) = &result {
        match e {
            EngineError::DecodeFailure(_) | EngineError::EncodeFailure(_) => {
                log_err!("{}: {}", op, e);
            }
            _ => {
                log_warn!("{}: {}", op, e);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{ElementBody, ElementKind, TextContent};
    use crate::io::{InlineOnly, encode_asset};
    use crate::ops::shapes::ShapeKind;
    use image::Rgba;

    fn engine() -> Engine {
        Engine::new(CanvasSpec::from_physical(400, 400).unwrap(), InlineOnly)
    }

    fn image_element(img: &RgbaImage, w: f32, h: f32) -> CanvasElement {
        CanvasElement::image_at(encode_asset(img).unwrap(), 0.0, 0.0, w, h)
    }

    fn text_element() -> CanvasElement {
        let mut el = image_element(&RgbaImage::new(1, 1), 10.0, 10.0);
        el.body = ElementBody::Text {
            text: TextContent {
                text: "hi".into(),
                font_family: "sans".into(),
                font_size: 12.0,
                color: Rgb::BLACK,
                bubble: None,
            },
        };
        el
    }

    #[test]
    fn checks_run_in_order() {
        let e = engine();
        assert_eq!(e.remove_color(None, "nope", 10.0), Err(EngineError::NoLayerSelected));
        let text = text_element();
        assert_eq!(
            e.remove_color(Some(&text), "nope", 10.0),
            Err(EngineError::UnsupportedLayerType(ElementKind::Text))
        );
        let img = image_element(&RgbaImage::new(4, 4), 4.0, 4.0);
        assert_eq!(
            e.flood_fill(Some(&img), 1.0, 1.0, "#12345", 10.0, FillMode::All),
            Err(EngineError::InvalidColor("#12345".into()))
        );
        assert_eq!(e.crop(Some(&text), None), Err(EngineError::UnsupportedLayerType(ElementKind::Text)));
        assert_eq!(e.crop(Some(&img), None), Err(EngineError::NoAreaSelected));
    }

    #[test]
    fn flood_fill_click_uses_natural_ratio() {
        // 4x4 bitmap shown at 2x: logical (5, 5) is pixel (2, 2)
        let mut src = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        src.put_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let el = image_element(&src, 8.0, 8.0);
        let e = engine();
        let patch = e
            .flood_fill(Some(&el), 5.0, 5.0, "#00ff00", 0.0, FillMode::Adjacent)
            .unwrap();
        let out = decode_asset(&patch.content, &InlineOnly).unwrap();
        assert_eq!(out.get_pixel(2, 2).0, [0, 255, 0, 255]);
        assert_eq!(out.get_pixel(1, 1).0, [0, 0, 0, 255]);
        assert_eq!((patch.width, patch.height), (8.0, 8.0));
        assert_eq!(e.pick_color(Some(&el), 5.0, 5.0), Ok(Rgb::WHITE));
    }

    #[test]
    fn drawings_are_created_and_regenerated() {
        let e = engine();
        let mut shape = ShapeDescriptor::begin(ShapeKind::Rectangle, 10.0, 10.0, Rgb::BLACK, 4.0, false);
        shape.update(11.0, 12.0);
        assert_eq!(e.finish_drawing(&shape), Ok(None));

        shape.update(60.0, 40.0);
        let el = e.draw_element(&shape).unwrap().unwrap();
        assert_eq!(el.kind(), ElementKind::Drawing);
        assert_eq!((el.x, el.y), (1.0, 1.0));

        let patch = e.resize_element(Some(&el), 5.0, 6.0, 120.0, 20.0).unwrap();
        assert_eq!((patch.x, patch.y, patch.width, patch.height), (5.0, 6.0, 120.0, 50.0));
        let resized = el.with_patch(&patch);
        assert_eq!(resized.drawing(), el.drawing());
        let img = e.decode(&resized).unwrap();
        assert_eq!(img.dimensions(), (120, 50));
    }

    #[test]
    fn pixel_edits_detach_drawings() {
        let e = engine();
        let mut shape = ShapeDescriptor::begin(ShapeKind::Rectangle, 0.0, 0.0, Rgb::BLACK, 2.0, true);
        shape.update(30.0, 30.0);
        let el = e.draw_element(&shape).unwrap().unwrap();
        let patch = e.remove_color(Some(&el), "#000000", 0.0).unwrap();
        assert!(patch.detach_drawing);
        assert_eq!(el.with_patch(&patch).kind(), ElementKind::Image);
    }

    #[test]
    fn crop_clears_pending_area_only_on_success() {
        let e = engine();
        let el = image_element(&RgbaImage::from_pixel(200, 200, Rgba([9, 9, 9, 255])), 200.0, 200.0);
        let mut tool = CropTool {
            enabled: true,
            pending: Some(CropRect { x: 10.0, y: 10.0, width: 50.0, height: 50.0 }),
        };
        assert_eq!(e.apply_crop(None, &mut tool), Err(EngineError::NoLayerSelected));
        assert!(tool.pending.is_some());

        let patch = e.apply_crop(Some(&el), &mut tool).unwrap();
        assert_eq!((patch.x, patch.y, patch.width, patch.height), (10.0, 10.0, 50.0, 50.0));
        assert!(tool.enabled);
        assert!(tool.pending.is_none());
        assert_eq!(e.apply_crop(Some(&el), &mut tool), Err(EngineError::NoAreaSelected));
    }

    #[test]
    fn overhanging_crop_patch_matches_its_bitmap() {
        let e = engine();
        let el = image_element(&RgbaImage::from_pixel(100, 100, Rgba([9, 9, 9, 255])), 100.0, 100.0);
        let rect = CropRect { x: 80.0, y: 80.0, width: 60.0, height: 60.0 };
        let patch = e.crop(Some(&el), Some(rect)).unwrap();
        assert_eq!((patch.x, patch.y, patch.width, patch.height), (80.0, 80.0, 20.0, 20.0));
        assert_eq!(decode_asset(&patch.content, &InlineOnly).unwrap().dimensions(), (20, 20));
    }

    #[test]
    fn added_images_are_fitted() {
        let bytes = crate::io::encode_png(&RgbaImage::new(900, 600)).unwrap();
        let el = engine().add_image(bytes).unwrap();
        assert_eq!((el.width, el.height), (300.0, 200.0));
        assert!(matches!(engine().add_image(vec![0; 8]), Err(EngineError::DecodeFailure(_))));
    }
}
