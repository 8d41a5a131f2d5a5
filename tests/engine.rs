// End-to-end: pointer events through the tool state and engine into a page,
// then out through export and project files.

use comicfe::canvas::{ElementBody, ElementKind, TextContent};
use comicfe::io::{InlineOnly, decode_asset, encode_png, load_image_file};
use comicfe::ops::color::Rgb;
use comicfe::ops::coords::{DisplayRect, to_logical};
use comicfe::ops::export::{export_pages, flatten_page};
use comicfe::project::{Project, load_project, save_project};
use comicfe::tools::{ToolMode, ToolState};
use comicfe::{CanvasElement, CanvasSpec, Engine, EngineError};
use image::{Rgba, RgbaImage};

const BLUE: [u8; 4] = [0, 0, 255, 255];
const RED: [u8; 4] = [255, 0, 0, 255];

fn engine() -> Engine {
    Engine::new(CanvasSpec::from_physical(400, 400).unwrap(), InlineOnly)
}

/// 40x20: white left half, blue right half.
fn two_tone_png() -> Vec<u8> {
    let img = RgbaImage::from_fn(40, 20, |x, _| {
        if x < 20 { Rgba([255, 255, 255, 255]) } else { Rgba(BLUE) }
    });
    encode_png(&img).unwrap()
}

fn pixels(el: &CanvasElement) -> RgbaImage {
    decode_asset(el.asset().unwrap(), &InlineOnly).unwrap()
}

#[test]
fn edit_session_on_one_page() {
    let engine = engine();
    let mut tools = ToolState::default();
    let mut project = Project::new("Integration", *engine.canvas());
    let page = &mut project.pages[0];

    // Small images keep their size and land at the default placement.
    let image = engine.add_image(two_tone_png()).unwrap();
    assert_eq!((image.x, image.y, image.width, image.height), (50.0, 50.0, 40.0, 20.0));
    let id = image.id;
    page.elements.push(image);

    // Remove the white background with the panel defaults.
    tools.arm(ToolMode::ColorRemove);
    let hex = tools.remover.target.to_hex();
    let patch = engine.remove_color(page.element(id), &hex, tools.remover.tolerance).unwrap();
    assert!(page.apply_patch(id, &patch));
    let px = pixels(page.element(id).unwrap());
    assert_eq!(px.get_pixel(5, 5)[3], 0);
    assert_eq!(px.get_pixel(30, 5).0, BLUE);

    // Nothing left to remove: the element must stay as it is.
    let before = page.element(id).cloned();
    let again = engine.remove_color(page.element(id), &hex, tools.remover.tolerance);
    assert_eq!(again.unwrap_err(), EngineError::NoPixelsMatched);
    assert_eq!(page.element(id).cloned(), before);

    // Fill the blue half from a click on a canvas shown at 200 %.
    tools.arm(ToolMode::FloodFill);
    assert!(!tools.selection_enabled());
    let rect = DisplayRect::zoomed(100.0, 20.0, 400.0, 400.0, 200);
    let (cx, cy) = to_logical(250.0, 130.0, &rect, 400.0, 400.0).unwrap();
    let el = page.element(id).unwrap();
    let (lx, ly) = el.to_local(cx, cy);
    let fill = &tools.fill;
    let patch = engine
        .flood_fill(Some(el), lx, ly, &fill.color.to_hex(), fill.tolerance, fill.mode)
        .unwrap();
    page.apply_patch(id, &patch);
    let px = pixels(page.element(id).unwrap());
    assert_eq!(px.get_pixel(39, 19).0, RED);
    assert_eq!(px.get_pixel(0, 0)[3], 0, "transparent pixels are never filled");

    // Crop to the right half.
    tools.arm(ToolMode::Crop);
    let el = page.element(id).unwrap().clone();
    tools.crop_down(20.0, 0.0, &el);
    tools.crop_move(45.0, 30.0);
    assert!(tools.crop_up().is_some());
    let patch = engine.apply_crop(Some(&el), &mut tools.crop).unwrap();
    assert!(tools.crop.pending.is_none());
    page.apply_patch(id, &patch);
    let cropped = page.element(id).unwrap();
    assert_eq!((cropped.x, cropped.y, cropped.width, cropped.height), (70.0, 50.0, 20.0, 20.0));
    let px = pixels(cropped);
    assert_eq!(px.dimensions(), (20, 20));
    assert!(px.pixels().all(|p| p.0 == RED));

    // A second apply without a new drag has nothing to crop.
    let err = engine.apply_crop(page.element(id), &mut tools.crop).unwrap_err();
    assert_eq!(err, EngineError::NoAreaSelected);

    // Draw a line, then resize it: the bitmap is redrawn at the new size.
    tools.arm(ToolMode::Draw);
    tools.shape_down(10.0, 10.0);
    tools.shape_move(110.0, 60.0);
    let shape = tools.shape_up().unwrap();
    let line = engine.draw_element(&shape).unwrap().unwrap();
    assert_eq!(line.kind(), ElementKind::Drawing);
    let line_id = line.id;
    page.elements.push(line);

    let patch = engine
        .resize_element(page.element(line_id), 10.0, 10.0, 200.0, 100.0)
        .unwrap();
    page.apply_patch(line_id, &patch);
    let resized = page.element(line_id).unwrap();
    assert_eq!(resized.kind(), ElementKind::Drawing);
    assert_eq!(pixels(resized).dimensions(), (200, 100));

    // Pixel edits turn the drawing into a plain image.
    let patch = engine.remove_color(Some(resized), "#000000", 30.0).unwrap();
    page.apply_patch(line_id, &patch);
    assert_eq!(page.element(line_id).unwrap().kind(), ElementKind::Image);

    // Flatten: the cropped red square sits at its logical position.
    let flat = flatten_page(&page.elements, engine.canvas(), Rgb::WHITE, &InlineOnly);
    assert_eq!(flat.dimensions(), (400, 400));
    assert_eq!(flat.get_pixel(88, 68).0, RED);
    assert_eq!(flat.get_pixel(300, 300).0, [255, 255, 255, 255]);

    // Project round trip and page export.
    let dir = std::env::temp_dir().join(format!("comicfe-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("story.cfe");
    save_project(&project, &file).unwrap();
    let loaded = load_project(&file).unwrap();
    assert_eq!(loaded, project);

    let written = export_pages(
        &loaded.pages,
        &loaded.canvas,
        loaded.background,
        &dir,
        comicfe::io::ExportFormat::Png,
        90,
        &InlineOnly,
    )
    .unwrap();
    assert_eq!(written.len(), 1);
    assert!(written[0].ends_with("page-1.png"));
    assert_eq!(load_image_file(&written[0]).unwrap().dimensions(), (400, 400));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn text_and_missing_selection_are_refused() {
    let engine = engine();
    assert_eq!(
        engine.flood_fill(None, 1.0, 1.0, "#ff0000", 30.0, Default::default()).unwrap_err(),
        EngineError::NoLayerSelected
    );

    let mut text = engine.add_image(two_tone_png()).unwrap();
    text.body = ElementBody::Text {
        text: TextContent {
            text: "POW!".into(),
            font_family: "Bangers".into(),
            font_size: 32.0,
            color: Rgb::BLACK,
            bubble: Some(Rgb::WHITE),
        },
    };
    assert_eq!(
        engine.remove_color(Some(&text), "#ffffff", 30.0).unwrap_err(),
        EngineError::UnsupportedLayerType(ElementKind::Text)
    );

    let image = engine.add_image(two_tone_png()).unwrap();
    assert!(matches!(
        engine.remove_color(Some(&image), "white", 30.0),
        Err(EngineError::InvalidColor(_))
    ));
}
