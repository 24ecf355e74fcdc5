//! Layer rasterization and compositing onto the output canvas.
//!
//! Background and image layers rasterize primarily as standalone vector
//! scenes (`resvg`), with direct `vello_cpu` drawing as the degraded
//! fallback. The text layer is the other way around: direct glyph drawing
//! is primary (the only strategy that reliably honors baseline and letter
//! spacing), with `<text>` markup through `resvg` as fallback. Layers are
//! drawn background first, text last; later layers must occlude earlier
//! ones.

use std::sync::Arc;

use vello_cpu::kurbo::Shape;

use crate::binding::{ResolvedElement, ResolvedKind};
use crate::error::{MatchcardError, MatchcardResult};
use crate::fetch::decode_data_uri;
use crate::fonts::{FontFaceBlock, FontRegistry};
use crate::layers::SceneLayers;
use crate::render::composite;
use crate::render::scene::{layer_markup, rasterize_markup};
use crate::render::text::{TextShaper, place_glyphs};

const MAX_DIM: u32 = 16_384;

/// Final raster output in straight-alpha RGBA8.
#[derive(Clone, Debug)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub rgba8: Vec<u8>,
}

/// Rasterization result plus non-fatal degradation notices.
#[derive(Debug)]
pub struct RasterOutput {
    pub bitmap: Bitmap,
    pub warnings: Vec<String>,
}

/// Rasterize the separated scene at `scale` times its logical size.
///
/// Background/image layer failures degrade to the flat background fill;
/// a text layer failure is surfaced as a warning. Only canvas allocation
/// itself is fatal here.
pub fn rasterize(
    layers: &SceneLayers,
    fonts: &[FontFaceBlock],
    registry: &FontRegistry,
    scale: f32,
) -> MatchcardResult<RasterOutput> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(MatchcardError::raster("scale must be finite and > 0"));
    }
    let out_w = (layers.width as f64 * scale as f64).round() as u32;
    let out_h = (layers.height as f64 * scale as f64).round() as u32;
    if out_w == 0 || out_h == 0 || out_w > MAX_DIM || out_h > MAX_DIM {
        return Err(MatchcardError::raster(format!(
            "output size out of range: {out_w}x{out_h} (max {MAX_DIM})"
        )));
    }

    let len = (out_w as usize)
        .checked_mul(out_h as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| MatchcardError::raster("output buffer size overflow"))?;
    let mut out = vec![0u8; len];
    composite::fill(&mut out, layers.background_color);

    let mut warnings = Vec::new();

    // Background, then images; both use the same primary/fallback pair.
    let passes: [(&str, &[ResolvedElement], bool); 2] = [
        ("background", &layers.background, true),
        ("images", &layers.images, false),
    ];
    for (name, elements, with_backdrop) in passes {
        if elements.is_empty() && !(with_backdrop && layers.background_placeholder.is_some()) {
            continue;
        }
        let rendered = render_vector_layer(layers, elements, with_backdrop, out_w, out_h, scale);
        match rendered {
            Ok(pixels) => composite::over_in_place(&mut out, &pixels, 1.0)?,
            Err(e) => {
                tracing::warn!(layer = name, error = %e, "layer rasterization failed, flat background fill stands");
                warnings.push(format!("{name} layer degraded: {e}"));
            }
        }
    }

    if !layers.text.is_empty() {
        match render_text_layer(layers, fonts, registry, out_w, out_h, scale) {
            Ok(pixels) => composite::over_in_place(&mut out, &pixels, 1.0)?,
            Err(e) => {
                tracing::warn!(error = %e, "text layer rasterization failed, exporting without captions");
                warnings.push(format!("text layer degraded: {e}"));
            }
        }
    }

    composite::unpremultiply_in_place(&mut out);
    Ok(RasterOutput {
        bitmap: Bitmap {
            width: out_w,
            height: out_h,
            rgba8: out,
        },
        warnings,
    })
}

fn render_vector_layer(
    layers: &SceneLayers,
    elements: &[ResolvedElement],
    with_backdrop: bool,
    out_w: u32,
    out_h: u32,
    scale: f32,
) -> MatchcardResult<Vec<u8>> {
    let markup = layer_markup(layers, elements, &[], with_backdrop);
    match rasterize_markup(&markup, out_w, out_h, &[]) {
        Ok(pixels) => Ok(pixels),
        Err(primary_err) => {
            tracing::debug!(error = %primary_err, "vector scene raster failed, drawing layer directly");
            draw_layer_direct(layers, elements, with_backdrop, out_w, out_h, scale)
                .map_err(|fallback_err| {
                    MatchcardError::raster(format!(
                        "primary: {primary_err}; fallback: {fallback_err}"
                    ))
                })
        }
    }
}

fn render_text_layer(
    layers: &SceneLayers,
    fonts: &[FontFaceBlock],
    registry: &FontRegistry,
    out_w: u32,
    out_h: u32,
    scale: f32,
) -> MatchcardResult<Vec<u8>> {
    match draw_text_direct(&layers.text, fonts, registry, out_w, out_h, scale) {
        Ok(pixels) => Ok(pixels),
        Err(primary_err) => {
            tracing::debug!(error = %primary_err, "direct text draw failed, falling back to markup rendering");
            let canonical = canonicalize_text_families(&layers.text, registry);
            let markup = layer_markup(layers, &canonical, fonts, false);
            rasterize_markup(&markup, out_w, out_h, fonts).map_err(|fallback_err| {
                MatchcardError::raster(format!(
                    "primary: {primary_err}; fallback: {fallback_err}"
                ))
            })
        }
    }
}

/// Rewrite each text element's authored family (`"bebas-neue"`, an alias,
/// whatever the template said) to the registry-canonical name, so the
/// fallback markup matches the face loaded into the document's font
/// database instead of asking `resvg` for a family it has never seen.
fn canonicalize_text_families(
    elements: &[ResolvedElement],
    registry: &FontRegistry,
) -> Vec<ResolvedElement> {
    elements
        .iter()
        .map(|element| {
            let mut element = element.clone();
            if let ResolvedKind::Text { style, .. } = &mut element.kind {
                style.font_family = registry.resolve_family(&style.font_family).css_family.clone();
            }
            element
        })
        .collect()
}

fn new_context(out_w: u32, out_h: u32) -> MatchcardResult<(vello_cpu::RenderContext, vello_cpu::Pixmap)> {
    let w: u16 = out_w
        .try_into()
        .map_err(|_| MatchcardError::raster("output width exceeds u16"))?;
    let h: u16 = out_h
        .try_into()
        .map_err(|_| MatchcardError::raster("output height exceeds u16"))?;
    Ok((vello_cpu::RenderContext::new(w, h), vello_cpu::Pixmap::new(w, h)))
}

fn scale_translate(scale: f32, x: f64, y: f64) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::scale(f64::from(scale))
        * vello_cpu::kurbo::Affine::translate((x, y))
}

/// Degraded path for background/image layers: draw rects and decoded
/// images straight through `vello_cpu`, skipping the vector scene.
fn draw_layer_direct(
    layers: &SceneLayers,
    elements: &[ResolvedElement],
    with_backdrop: bool,
    out_w: u32,
    out_h: u32,
    scale: f32,
) -> MatchcardResult<Vec<u8>> {
    let (mut ctx, mut pixmap) = new_context(out_w, out_h)?;

    if with_backdrop {
        if let Some(placeholder) = &layers.background_placeholder {
            draw_image_direct(
                &mut ctx,
                placeholder,
                0.0,
                0.0,
                f64::from(layers.width),
                f64::from(layers.height),
                scale,
            )?;
        }
    }

    for element in elements {
        match &element.kind {
            ResolvedKind::Rect {
                width,
                height,
                fill,
                rx,
                ry: _,
                stroke,
                stroke_width,
            } => {
                ctx.set_transform(scale_translate(scale, element.x, element.y));
                let rect = vello_cpu::kurbo::Rect::new(0.0, 0.0, *width, *height);
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    fill.r, fill.g, fill.b, fill.a,
                ));
                if *rx > 0.0 {
                    let rounded = vello_cpu::kurbo::RoundedRect::from_rect(rect, *rx);
                    ctx.fill_path(&rounded.to_path(0.1));
                } else {
                    ctx.fill_rect(&rect);
                }
                if let Some(stroke) = stroke {
                    if *stroke_width > 0.0 {
                        ctx.set_stroke(vello_cpu::kurbo::Stroke::new(*stroke_width));
                        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                            stroke.r, stroke.g, stroke.b, stroke.a,
                        ));
                        ctx.stroke_rect(&rect);
                    }
                }
            }
            ResolvedKind::Image {
                href,
                width,
                height,
            } => {
                if href.is_empty() {
                    continue;
                }
                draw_image_direct(&mut ctx, href, element.x, element.y, *width, *height, scale)?;
            }
            ResolvedKind::Text { .. } => {
                return Err(MatchcardError::raster(
                    "text element routed to a vector layer",
                ));
            }
        }
    }

    ctx.flush();
    ctx.render_to_pixmap(&mut pixmap);
    Ok(pixmap.data_as_u8_slice().to_vec())
}

fn draw_image_direct(
    ctx: &mut vello_cpu::RenderContext,
    href: &str,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    scale: f32,
) -> MatchcardResult<()> {
    // Only inlined images reach the rasterizer; remote refs were either
    // fetched or emptied out by the controller.
    let resource = decode_data_uri(href)?;
    let decoded = image::load_from_memory(&resource.bytes)
        .map_err(|e| MatchcardError::raster(format!("decode inlined image: {e}")))?;
    let rgba = decoded.to_rgba8();
    let (img_w, img_h) = rgba.dimensions();
    let mut bytes = rgba.into_raw();
    premultiply_rgba8_in_place(&mut bytes);
    let source = premul_bytes_to_pixmap(&bytes, img_w, img_h)?;

    let paint = vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(source)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    };

    // xMidYMid meet: uniform fit inside the element box, centered.
    let fit = (width / f64::from(img_w)).min(height / f64::from(img_h));
    let draw_w = f64::from(img_w) * fit;
    let draw_h = f64::from(img_h) * fit;
    let offset_x = x + (width - draw_w) / 2.0;
    let offset_y = y + (height - draw_h) / 2.0;

    ctx.set_transform(
        scale_translate(scale, offset_x, offset_y)
            * vello_cpu::kurbo::Affine::scale(fit),
    );
    ctx.set_paint(paint);
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(img_w),
        f64::from(img_h),
    ));
    Ok(())
}

/// Primary text strategy: shape with Parley, place with accumulated
/// letter spacing, draw glyph runs directly. The element's `y` is the
/// alphabetic baseline.
fn draw_text_direct(
    elements: &[ResolvedElement],
    fonts: &[FontFaceBlock],
    registry: &FontRegistry,
    out_w: u32,
    out_h: u32,
    scale: f32,
) -> MatchcardResult<Vec<u8>> {
    let (mut ctx, mut pixmap) = new_context(out_w, out_h)?;
    let mut shaper = TextShaper::new();

    for element in elements {
        let ResolvedKind::Text { content, style } = &element.kind else {
            return Err(MatchcardError::raster("non-text element in text layer"));
        };
        if content.is_empty() {
            continue;
        }

        let config = registry.resolve_family(&style.font_family);
        let block = fonts
            .iter()
            .find(|b| {
                b.css_family == config.css_family
                    && b.weight == style.font_weight
                    && b.style == style.font_style
            })
            .ok_or_else(|| {
                MatchcardError::raster(format!(
                    "no embedded font for {} {} {:?}",
                    config.css_family, style.font_weight, style.font_style
                ))
            })?;

        let run = shaper.shape(content, block, style)?;
        let plan = place_glyphs(&run.glyphs, style.letter_spacing, style.text_anchor);

        ctx.set_transform(scale_translate(scale, element.x, element.y));
        if style.opacity < 1.0 {
            ctx.push_opacity_layer(style.opacity);
        }

        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            style.fill.r,
            style.fill.g,
            style.fill.b,
            style.fill.a,
        ));
        let glyphs = plan.glyphs.iter().map(|g| vello_cpu::Glyph {
            id: g.id,
            x: g.x,
            y: g.y,
        });
        ctx.glyph_run(&run.font)
            .font_size(run.font_size)
            .fill_glyphs(glyphs);

        if let Some(stroke) = &style.stroke {
            if style.stroke_width > 0.0 {
                ctx.set_stroke(vello_cpu::kurbo::Stroke::new(f64::from(style.stroke_width)));
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    stroke.r, stroke.g, stroke.b, stroke.a,
                ));
                let glyphs = plan.glyphs.iter().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&run.font)
                    .font_size(run.font_size)
                    .stroke_glyphs(glyphs);
            }
        }

        if style.opacity < 1.0 {
            ctx.pop_layer();
        }
    }

    ctx.flush();
    ctx.render_to_pixmap(&mut pixmap);
    Ok(pixmap.data_as_u8_slice().to_vec())
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

fn premul_bytes_to_pixmap(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> MatchcardResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| MatchcardError::raster("image width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| MatchcardError::raster("image height exceeds u16"))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(MatchcardError::raster("image byte length mismatch"));
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in rgba8_premul.chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        });
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}
