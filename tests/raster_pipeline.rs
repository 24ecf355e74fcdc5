use std::sync::Arc;

use matchcard::fetch::FetchedResource;
use matchcard::fonts::{FontFaceBlock, FontRegistry, FontSource};
use matchcard::layers::separate;
use matchcard::model::FontStyle;
use matchcard::render::{Bitmap, rasterize};
use matchcard::{GameRecord, RecordSet, Template, resolve_template};

// 4x4 opaque red PNG.
const RED_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAQAAAAECAYAAACp8Z5+AAAAEklEQVR4nGP4z8DwHxkzkC4AADxAH+HggXe0AAAAAElFTkSuQmCC";

/// A real monospace face as the embedded bytes for `css_family`, the way
/// the exporter hands fetched font data to the rasterizer.
fn mono_face(css_family: &str) -> FontFaceBlock {
    let bytes = std::fs::read(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/data/fonts/DejaVuSansMono.ttf"
    ))
    .unwrap();
    FontFaceBlock {
        css_family: css_family.into(),
        weight: 400,
        style: FontStyle::Normal,
        source: FontSource::Inline(Arc::new(FetchedResource {
            bytes,
            content_type: "font/ttf".into(),
        })),
    }
}

fn px(bitmap: &Bitmap, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * bitmap.width + x) * 4) as usize;
    [
        bitmap.rgba8[i],
        bitmap.rgba8[i + 1],
        bitmap.rgba8[i + 2],
        bitmap.rgba8[i + 3],
    ]
}

fn raster_fixture(json: &str, scale: f32) -> Bitmap {
    let template = Template::from_json(json).unwrap();
    let resolved = resolve_template(&template, &RecordSet::single(GameRecord::new("g1")));
    let layers = separate(&resolved);
    let out = rasterize(&layers, &[], FontRegistry::builtin(), scale).unwrap();
    out.bitmap
}

#[test]
fn background_rect_fills_scaled_canvas() {
    let bitmap = raster_fixture(
        r##"{
            "name": "t",
            "format": {"custom": {"width": 64, "height": 64}},
            "backgroundColor": "#102030",
            "elements": [
                {"id": "bg", "x": 0, "y": 0, "type": "rect",
                 "width": 64, "height": 64, "fill": "#ff0000"}
            ]
        }"##,
        2.0,
    );
    assert_eq!((bitmap.width, bitmap.height), (128, 128));
    assert_eq!(px(&bitmap, 64, 64), [255, 0, 0, 255]);
    assert_eq!(px(&bitmap, 2, 125), [255, 0, 0, 255]);
}

#[test]
fn empty_template_is_flat_background() {
    let bitmap = raster_fixture(
        r##"{
            "name": "t",
            "format": {"custom": {"width": 32, "height": 16}},
            "backgroundColor": "#336699",
            "elements": []
        }"##,
        1.0,
    );
    assert_eq!((bitmap.width, bitmap.height), (32, 16));
    assert_eq!(px(&bitmap, 16, 8), [0x33, 0x66, 0x99, 255]);
}

#[test]
fn inlined_image_lands_on_the_canvas() {
    let json = format!(
        r##"{{
            "name": "t",
            "format": {{"custom": {{"width": 64, "height": 64}}}},
            "backgroundColor": "#000000",
            "elements": [
                {{"id": "logo", "x": 8, "y": 8, "type": "image",
                 "href": "{RED_PNG}", "width": 16, "height": 16}}
            ]
        }}"##
    );
    let bitmap = raster_fixture(&json, 1.0);
    // Inside the image box.
    assert_eq!(px(&bitmap, 16, 16), [255, 0, 0, 255]);
    // Outside it, the flat background shows through.
    assert_eq!(px(&bitmap, 40, 40), [0, 0, 0, 255]);
}

#[test]
fn text_without_usable_font_still_produces_a_bitmap() {
    // No font face blocks are supplied, so the glyph path cannot shape and
    // the markup fallback carries the layer.
    let bitmap = raster_fixture(
        r##"{
            "name": "t",
            "format": {"custom": {"width": 96, "height": 48}},
            "backgroundColor": "#ffffff",
            "elements": [
                {"id": "caption", "x": 48, "y": 32, "type": "text",
                 "content": "KICKOFF", "fontFamily": "Bebas Neue",
                 "fontSize": 24, "fill": "#000000", "textAnchor": "middle"}
            ]
        }"##,
        1.0,
    );
    assert_eq!((bitmap.width, bitmap.height), (96, 48));
}

#[test]
fn shaping_embedded_font_yields_uniform_monospace_advances() {
    use matchcard::model::{TextAnchor, TextStyle};
    use matchcard::render::text::TextShaper;

    let block = mono_face("Montserrat");
    let style = TextStyle {
        font_family: "Montserrat".into(),
        font_size: 24.0,
        font_weight: 400,
        font_style: FontStyle::Normal,
        fill: matchcard::Color::WHITE,
        stroke: None,
        stroke_width: 0.0,
        letter_spacing: 0.0,
        text_anchor: TextAnchor::Start,
        opacity: 1.0,
    };

    let mut shaper = TextShaper::new();
    let run = shaper.shape("HHHH", &block, &style).unwrap();
    assert_eq!(run.glyphs.len(), 4);

    let advance = run.glyphs[0].advance;
    assert!(advance > 0.0);
    for (i, g) in run.glyphs.iter().enumerate() {
        assert_eq!(g.advance, advance);
        // Monospace run: shaped x positions march by exactly one advance.
        assert!((g.x - advance * i as f32).abs() < 0.01, "glyph {i} at x={}", g.x);
        // Single line, so every glyph sits on the baseline.
        assert!(g.y.abs() < 0.01, "glyph {i} at y={}", g.y);
    }
}

#[test]
fn embedded_font_text_sits_on_the_baseline() {
    let template = Template::from_json(
        r##"{
            "name": "t",
            "format": {"custom": {"width": 96, "height": 64}},
            "backgroundColor": "#000000",
            "elements": [
                {"id": "caption", "x": 6, "y": 40, "type": "text",
                 "content": "HHHH", "fontFamily": "Montserrat",
                 "fontSize": 24, "fill": "#ffffff"}
            ]
        }"##,
    )
    .unwrap();
    let resolved = resolve_template(&template, &RecordSet::single(GameRecord::new("g1")));
    let layers = separate(&resolved);
    let fonts = [mono_face("Montserrat")];
    let out = rasterize(&layers, &fonts, FontRegistry::builtin(), 1.0).unwrap();
    assert!(out.warnings.is_empty(), "{:?}", out.warnings);
    let bitmap = out.bitmap;

    // Glyph ink lands above the authored y (the alphabetic baseline).
    let ink_above = (22..40).any(|y| (6..64).any(|x| px(&bitmap, x, y) != [0, 0, 0, 255]));
    assert!(ink_above, "no glyph ink above the baseline");

    // `H` has no descender: everything below the baseline stays background.
    for y in 44..60 {
        for x in 0..96 {
            assert_eq!(px(&bitmap, x, y), [0, 0, 0, 255], "ink below baseline at ({x},{y})");
        }
    }
}

#[test]
fn composed_scene_has_disjoint_foreground_regions() {
    let json = format!(
        r##"{{
            "name": "t",
            "format": {{"custom": {{"width": 64, "height": 64}}}},
            "backgroundColor": "#000000",
            "elements": [
                {{"id": "a", "x": 4, "y": 4, "type": "rect",
                 "width": 12, "height": 12, "fill": "#00ff00"}},
                {{"id": "b", "x": 26, "y": 26, "type": "image",
                 "href": "{RED_PNG}", "width": 12, "height": 12}},
                {{"id": "c", "x": 48, "y": 48, "type": "rect",
                 "width": 12, "height": 12, "fill": "#0000ff"}}
            ]
        }}"##
    );
    let bitmap = raster_fixture(&json, 1.0);

    // Each region's center carries its own color.
    assert_eq!(px(&bitmap, 10, 10), [0, 255, 0, 255]);
    assert_eq!(px(&bitmap, 32, 32), [255, 0, 0, 255]);
    assert_eq!(px(&bitmap, 54, 54), [0, 0, 255, 255]);
    // And background separates them.
    assert_eq!(px(&bitmap, 21, 21), [0, 0, 0, 255]);
    assert_eq!(px(&bitmap, 43, 43), [0, 0, 0, 255]);
}

#[test]
fn fractional_scale_rounds_output_dimensions() {
    let bitmap = raster_fixture(
        r##"{
            "name": "t",
            "format": {"custom": {"width": 30, "height": 20}},
            "backgroundColor": "#000000",
            "elements": []
        }"##,
        1.5,
    );
    assert_eq!((bitmap.width, bitmap.height), (45, 30));
}
