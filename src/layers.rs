//! Scene separation: partitions a resolved template into background,
//! image, and text layers. Text metrics and vector/raster drawing are
//! served by different rasterization strategies, and separated layers can
//! degrade independently on partial failure.

use crate::binding::{ResolvedElement, ResolvedKind, ResolvedTemplate};
use crate::model::Color;

/// Fraction of the canvas (in both dimensions) an origin-anchored element
/// must cover to count as background. Inherited threshold; matches
/// existing templates rather than anything fundamental.
pub const BACKGROUND_COVERAGE: f64 = 0.9;

/// One independently rasterizable subset of the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    Background,
    Images,
    Text,
}

/// The resolved scene split into three draw-ordered sub-scenes.
#[derive(Clone, Debug)]
pub struct SceneLayers {
    pub width: u32,
    pub height: u32,
    pub background_color: Color,
    /// User-supplied backdrop image, drawn under everything else.
    pub background_placeholder: Option<String>,
    pub background: Vec<ResolvedElement>,
    pub images: Vec<ResolvedElement>,
    pub text: Vec<ResolvedElement>,
}

impl SceneLayers {
    /// All remote image references the scene still depends on, in draw
    /// order. Fonts are collected separately via the registry.
    pub fn image_refs(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        if let Some(placeholder) = &self.background_placeholder {
            refs.push(placeholder.as_str());
        }
        for element in self.background.iter().chain(&self.images) {
            if let ResolvedKind::Image { href, .. } = &element.kind {
                if !href.is_empty() {
                    refs.push(href.as_str());
                }
            }
        }
        refs
    }
}

/// True when an element fills the canvas closely enough to act as its
/// backdrop: anchored at the origin and covering at least
/// [`BACKGROUND_COVERAGE`] of both dimensions.
pub fn is_background(element: &ResolvedElement, canvas_w: u32, canvas_h: u32) -> bool {
    let (w, h) = match &element.kind {
        ResolvedKind::Rect { width, height, .. } => (*width, *height),
        ResolvedKind::Image { width, height, .. } => (*width, *height),
        ResolvedKind::Text { .. } => return false,
    };
    element.x == 0.0
        && element.y == 0.0
        && w >= BACKGROUND_COVERAGE * canvas_w as f64
        && h >= BACKGROUND_COVERAGE * canvas_h as f64
}

/// Partition the resolved scene. Classification: origin-anchored
/// near-full-canvas rects/images are background; remaining text is the
/// text layer; everything else (images and foreground shapes) is the
/// image layer. Relative draw order within each layer is preserved.
pub fn separate(resolved: &ResolvedTemplate) -> SceneLayers {
    let mut layers = SceneLayers {
        width: resolved.width,
        height: resolved.height,
        background_color: resolved.background_color,
        background_placeholder: resolved.background_placeholder.clone(),
        background: Vec::new(),
        images: Vec::new(),
        text: Vec::new(),
    };

    for element in &resolved.elements {
        match classify(element, resolved.width, resolved.height) {
            LayerKind::Background => layers.background.push(element.clone()),
            LayerKind::Images => layers.images.push(element.clone()),
            LayerKind::Text => layers.text.push(element.clone()),
        }
    }
    layers
}

pub fn classify(element: &ResolvedElement, canvas_w: u32, canvas_h: u32) -> LayerKind {
    match &element.kind {
        ResolvedKind::Text { .. } => LayerKind::Text,
        _ if is_background(element, canvas_w, canvas_h) => LayerKind::Background,
        _ => LayerKind::Images,
    }
}
