//! Direct text shaping and glyph placement. This is the primary text
//! strategy: shape each element's run with Parley against the embedded
//! font bytes, place glyphs with manually accumulated letter spacing, and
//! draw them straight into the pixel buffer. Only this path guarantees
//! the baseline and letter-spacing rules exactly.

use std::collections::HashMap;

use crate::error::{MatchcardError, MatchcardResult};
use crate::fonts::FontFaceBlock;
use crate::model::{FontStyle, TextAnchor, TextStyle};

/// One glyph as shaped, before letter spacing and anchoring. `x`/`y` are
/// relative to the run origin with `y = 0` on the alphabetic baseline.
#[derive(Clone, Copy, Debug)]
pub struct ShapedGlyph {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub advance: f32,
}

/// A shaped run plus the font needed to draw it.
pub struct ShapedRun {
    pub glyphs: Vec<ShapedGlyph>,
    pub font: vello_cpu::peniko::FontData,
    pub font_size: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlannedGlyph {
    pub id: u32,
    pub x: f32,
    pub y: f32,
}

/// Final glyph positions for one text element, anchor already applied.
#[derive(Clone, Debug)]
pub struct TextDrawPlan {
    pub glyphs: Vec<PlannedGlyph>,
    /// Total advance of the run including accumulated letter spacing.
    pub total_advance: f32,
}

/// Compute draw positions from shaped glyphs.
///
/// With zero letter spacing the shaper's positions are kept (kerning
/// intact). Otherwise each glyph is placed individually with accumulated
/// `advance + letter_spacing`; backends are not trusted to support native
/// letter spacing. The anchor offset is computed against the total advance
/// of the run, never per glyph.
pub fn place_glyphs(
    glyphs: &[ShapedGlyph],
    letter_spacing: f32,
    anchor: TextAnchor,
) -> TextDrawPlan {
    let mut planned = Vec::with_capacity(glyphs.len());
    let total_advance;

    if letter_spacing == 0.0 {
        for g in glyphs {
            planned.push(PlannedGlyph { id: g.id, x: g.x, y: g.y });
        }
        total_advance = glyphs.last().map(|g| g.x + g.advance).unwrap_or(0.0);
    } else {
        let mut pen = 0.0f32;
        for g in glyphs {
            planned.push(PlannedGlyph { id: g.id, x: pen, y: g.y });
            pen += g.advance + letter_spacing;
        }
        total_advance = if glyphs.is_empty() {
            0.0
        } else {
            pen - letter_spacing
        };
    }

    let shift = match anchor {
        TextAnchor::Start => 0.0,
        TextAnchor::Middle => -total_advance / 2.0,
        TextAnchor::End => -total_advance,
    };
    if shift != 0.0 {
        for g in &mut planned {
            g.x += shift;
        }
    }

    TextDrawPlan {
        glyphs: planned,
        total_advance,
    }
}

/// Stateful Parley shaper over embedded font bytes.
pub struct TextShaper {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<()>,
    /// Registered family name per embedded variant, keyed by
    /// `(css_family, weight, style)`.
    registered: HashMap<(String, u16, FontStyle), String>,
}

impl Default for TextShaper {
    fn default() -> Self {
        Self::new()
    }
}

impl TextShaper {
    pub fn new() -> TextShaper {
        TextShaper {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            registered: HashMap::new(),
        }
    }

    /// Shape `content` with the embedded font of `block`, styled by
    /// `style`. Fails when the block degraded to a remote reference; the
    /// caller then routes the whole layer through the markup fallback.
    pub fn shape(
        &mut self,
        content: &str,
        block: &FontFaceBlock,
        style: &TextStyle,
    ) -> MatchcardResult<ShapedRun> {
        let bytes = block.bytes().ok_or_else(|| {
            MatchcardError::raster(format!(
                "font {} not inlined, cannot shape directly",
                block.css_family
            ))
        })?;

        let key = (block.css_family.clone(), block.weight, block.style);
        let family_name = match self.registered.get(&key) {
            Some(name) => name.clone(),
            None => {
                let families = self
                    .font_ctx
                    .collection
                    .register_fonts(parley::fontique::Blob::from(bytes.to_vec()), None);
                let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
                    MatchcardError::raster("no font families registered from font bytes")
                })?;
                let name = self
                    .font_ctx
                    .collection
                    .family_name(family_id)
                    .ok_or_else(|| MatchcardError::raster("registered font family has no name"))?
                    .to_string();
                self.registered.insert(key, name.clone());
                name
            }
        };

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, content, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(style.font_size));
        builder.push_default(parley::style::StyleProperty::FontWeight(
            parley::style::FontWeight::new(f32::from(style.font_weight)),
        ));
        builder.push_default(parley::style::StyleProperty::FontStyle(
            match style.font_style {
                FontStyle::Normal => parley::style::FontStyle::Normal,
                FontStyle::Italic => parley::style::FontStyle::Italic,
            },
        ));

        let mut layout: parley::Layout<()> = builder.build(content);
        // Template text is a single run; no wrapping width.
        layout.break_all_lines(None);

        let mut glyphs = Vec::new();
        for line in layout.lines() {
            let baseline = line.metrics().baseline;
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                for g in run.glyphs() {
                    glyphs.push(ShapedGlyph {
                        id: g.id.into(),
                        x: g.x,
                        y: g.y - baseline,
                        advance: g.advance,
                    });
                }
            }
        }

        let font =
            vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes.to_vec()), 0);
        Ok(ShapedRun {
            glyphs,
            font,
            font_size: style.font_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ab(advance_a: f32, advance_b: f32) -> Vec<ShapedGlyph> {
        vec![
            ShapedGlyph { id: 1, x: 0.0, y: 0.0, advance: advance_a },
            ShapedGlyph { id: 2, x: advance_a, y: 0.0, advance: advance_b },
        ]
    }

    #[test]
    fn letter_spacing_accumulates_per_character() {
        for anchor in [TextAnchor::Start, TextAnchor::Middle, TextAnchor::End] {
            let plan = place_glyphs(&ab(10.0, 12.0), 4.0, anchor);
            let dx = plan.glyphs[1].x - plan.glyphs[0].x;
            assert_eq!(dx, 10.0 + 4.0, "anchor {anchor:?}");
        }
    }

    #[test]
    fn total_advance_excludes_trailing_spacing() {
        let plan = place_glyphs(&ab(10.0, 12.0), 4.0, TextAnchor::Start);
        assert_eq!(plan.total_advance, 10.0 + 4.0 + 12.0);
    }

    #[test]
    fn anchor_shifts_against_total_advance() {
        let glyphs = ab(10.0, 12.0);
        let start = place_glyphs(&glyphs, 0.0, TextAnchor::Start);
        let middle = place_glyphs(&glyphs, 0.0, TextAnchor::Middle);
        let end = place_glyphs(&glyphs, 0.0, TextAnchor::End);
        assert_eq!(start.total_advance, 22.0);
        assert_eq!(start.glyphs[0].x, 0.0);
        assert_eq!(middle.glyphs[0].x, -11.0);
        assert_eq!(end.glyphs[0].x, -22.0);
    }

    #[test]
    fn zero_spacing_keeps_shaped_positions() {
        let glyphs = vec![
            ShapedGlyph { id: 1, x: 0.0, y: 0.0, advance: 10.0 },
            // Kerned pair: shaped position tighter than the advance.
            ShapedGlyph { id: 2, x: 8.5, y: 0.0, advance: 12.0 },
        ];
        let plan = place_glyphs(&glyphs, 0.0, TextAnchor::Start);
        assert_eq!(plan.glyphs[1].x, 8.5);
        assert_eq!(plan.total_advance, 20.5);
    }

    #[test]
    fn empty_run_is_empty_plan() {
        let plan = place_glyphs(&[], 4.0, TextAnchor::Middle);
        assert!(plan.glyphs.is_empty());
        assert_eq!(plan.total_advance, 0.0);
    }
}
