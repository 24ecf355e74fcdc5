//! Vector sub-scene serialization and rasterization. Each layer becomes a
//! self-contained SVG document (every href a data URI, every font-face
//! embedded in its own `<defs>`), parsed with `usvg` and rasterized with
//! `resvg` at the output scale.

use crate::binding::{ResolvedElement, ResolvedKind};
use crate::error::{MatchcardError, MatchcardResult};
use crate::fonts::FontFaceBlock;
use crate::layers::SceneLayers;
use crate::model::{FontStyle, TextAnchor};

// Guard against pathological allocations when the scale factor is abused.
const MAX_DIM: u32 = 16_384;

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serialize one layer's elements to standalone SVG markup. Every layer
/// carries its own copy of the font-face definitions so the three layers
/// stay independently rasterizable.
pub fn layer_markup(
    layers: &SceneLayers,
    elements: &[ResolvedElement],
    fonts: &[FontFaceBlock],
    with_backdrop: bool,
) -> String {
    let (w, h) = (layers.width, layers.height);
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#
    );

    if !fonts.is_empty() {
        svg.push_str("<defs><style>");
        for block in fonts {
            svg.push_str(&block.to_css());
        }
        svg.push_str("</style></defs>");
    }

    if with_backdrop {
        if let Some(placeholder) = &layers.background_placeholder {
            svg.push_str(&format!(
                r#"<image x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="xMidYMid slice" href="{}"/>"#,
                escape_xml(placeholder)
            ));
        }
    }

    for element in elements {
        svg.push_str(&element_markup(element));
    }
    svg.push_str("</svg>");
    svg
}

pub fn element_markup(element: &ResolvedElement) -> String {
    match &element.kind {
        ResolvedKind::Rect {
            width,
            height,
            fill,
            rx,
            ry,
            stroke,
            stroke_width,
        } => {
            let mut attrs = format!(
                r#"x="{}" y="{}" width="{width}" height="{height}" fill="{}""#,
                element.x,
                element.y,
                fill.to_css()
            );
            if *rx > 0.0 {
                attrs.push_str(&format!(r#" rx="{rx}""#));
            }
            if *ry > 0.0 {
                attrs.push_str(&format!(r#" ry="{ry}""#));
            }
            if let Some(stroke) = stroke {
                attrs.push_str(&format!(
                    r#" stroke="{}" stroke-width="{stroke_width}""#,
                    stroke.to_css()
                ));
            }
            format!("<rect {attrs}/>")
        }
        ResolvedKind::Image {
            href,
            width,
            height,
        } => {
            if href.is_empty() {
                // Omitted image (fetch failed or no binding): renders as nothing.
                return String::new();
            }
            format!(
                r#"<image x="{}" y="{}" width="{width}" height="{height}" preserveAspectRatio="xMidYMid meet" href="{}"/>"#,
                element.x,
                element.y,
                escape_xml(href)
            )
        }
        ResolvedKind::Text { content, style } => {
            let anchor = match style.text_anchor {
                TextAnchor::Start => "start",
                TextAnchor::Middle => "middle",
                TextAnchor::End => "end",
            };
            let font_style = match style.font_style {
                FontStyle::Normal => "normal",
                FontStyle::Italic => "italic",
            };
            let mut attrs = format!(
                r#"x="{}" y="{}" font-family="{}" font-size="{}" font-weight="{}" font-style="{font_style}" fill="{}" text-anchor="{anchor}""#,
                element.x,
                element.y,
                escape_xml(&style.font_family),
                style.font_size,
                style.font_weight,
                style.fill.to_css()
            );
            if style.letter_spacing != 0.0 {
                attrs.push_str(&format!(r#" letter-spacing="{}""#, style.letter_spacing));
            }
            if let Some(stroke) = &style.stroke {
                attrs.push_str(&format!(
                    r#" stroke="{}" stroke-width="{}""#,
                    stroke.to_css(),
                    style.stroke_width
                ));
            }
            if style.opacity < 1.0 {
                attrs.push_str(&format!(r#" opacity="{}""#, style.opacity));
            }
            format!("<text {attrs}>{}</text>", escape_xml(content))
        }
    }
}

/// Rasterize SVG markup to premultiplied RGBA8 at `width`x`height` output
/// pixels. `font_blocks` with inlined bytes are loaded into the document's
/// font database so `<text>` fallback rendering can resolve them.
pub fn rasterize_markup(
    markup: &str,
    width: u32,
    height: u32,
    font_blocks: &[FontFaceBlock],
) -> MatchcardResult<Vec<u8>> {
    if width == 0 || height == 0 || width > MAX_DIM || height > MAX_DIM {
        return Err(MatchcardError::raster(format!(
            "raster size out of range: {width}x{height} (max {MAX_DIM})"
        )));
    }

    let mut opts = usvg::Options::default();
    {
        let db = opts.fontdb_mut();
        for block in font_blocks {
            if let Some(bytes) = block.bytes() {
                db.load_font_data(bytes.to_vec());
            }
        }
    }

    let tree = usvg::Tree::from_data(markup.as_bytes(), &opts)
        .map_err(|e| MatchcardError::raster(format!("parse scene markup: {e}")))?;

    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| MatchcardError::raster("failed to allocate scene pixmap"))?;

    let size = tree.size();
    let sx = width as f32 / size.width();
    let sy = height as f32 / size.height();
    let xform = resvg::tiny_skia::Transform::from_scale(sx, sy);

    resvg::render(&tree, xform, &mut pixmap.as_mut());
    Ok(pixmap.data().to_vec())
}
