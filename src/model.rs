use std::collections::BTreeSet;
use std::fmt;

use crate::error::{MatchcardError, MatchcardResult};

/// Enumerated output aspect ratios with fixed logical pixel dimensions.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateFormat {
    /// 4:5 portrait feed post, 1080x1350.
    FourFive,
    /// 1:1 square post, 1080x1080.
    Square,
    /// 9:16 story, 1080x1920.
    Story,
    /// Caller-specified logical dimensions.
    Custom { width: u32, height: u32 },
}

impl TemplateFormat {
    /// Logical pixel dimensions before the export scale factor is applied.
    pub fn dimensions(&self) -> (u32, u32) {
        match *self {
            TemplateFormat::FourFive => (1080, 1350),
            TemplateFormat::Square => (1080, 1080),
            TemplateFormat::Story => (1080, 1920),
            TemplateFormat::Custom { width, height } => (width, height),
        }
    }
}

/// RGBA color parsed from CSS-style hex notation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };

    pub fn rgb(r: u8, g: u8, b: u8) -> Color {
        Color { r, g, b, a: 255 }
    }

    /// Parse `#rgb`, `#rrggbb`, `#rrggbbaa`, `none`, or one of the CSS color
    /// names that appear in shipped templates.
    pub fn parse(s: &str) -> MatchcardResult<Color> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            let nib = |c: u8| -> MatchcardResult<u8> {
                (c as char)
                    .to_digit(16)
                    .map(|d| d as u8)
                    .ok_or_else(|| MatchcardError::validation(format!("invalid hex color: {s}")))
            };
            let b = hex.as_bytes();
            return match b.len() {
                3 => Ok(Color {
                    r: nib(b[0])? * 17,
                    g: nib(b[1])? * 17,
                    b: nib(b[2])? * 17,
                    a: 255,
                }),
                6 | 8 => {
                    let byte =
                        |i: usize| -> MatchcardResult<u8> { Ok(nib(b[i])? * 16 + nib(b[i + 1])?) };
                    Ok(Color {
                        r: byte(0)?,
                        g: byte(2)?,
                        b: byte(4)?,
                        a: if b.len() == 8 { byte(6)? } else { 255 },
                    })
                }
                _ => Err(MatchcardError::validation(format!(
                    "invalid hex color length: {s}"
                ))),
            };
        }
        match s.to_ascii_lowercase().as_str() {
            "none" | "transparent" => Ok(Color::TRANSPARENT),
            "black" => Ok(Color::BLACK),
            "white" => Ok(Color::WHITE),
            "red" => Ok(Color::rgb(255, 0, 0)),
            "green" => Ok(Color::rgb(0, 128, 0)),
            "blue" => Ok(Color::rgb(0, 0, 255)),
            "yellow" => Ok(Color::rgb(255, 255, 0)),
            "gray" | "grey" => Ok(Color::rgb(128, 128, 128)),
            _ => Err(MatchcardError::validation(format!("unknown color: {s}"))),
        }
    }

    pub fn to_css(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}

impl serde::Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_css())
    }
}

impl<'de> serde::Deserialize<'de> for Color {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Color, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextAnchor {
    #[default]
    Start,
    Middle,
    End,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

/// Text styling shared by literal and data-bound text elements.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub font_family: String,
    pub font_size: f32,
    #[serde(default = "default_font_weight")]
    pub font_weight: u16,
    #[serde(default)]
    pub font_style: FontStyle,
    pub fill: Color,
    #[serde(default)]
    pub stroke: Option<Color>,
    #[serde(default)]
    pub stroke_width: f32,
    #[serde(default)]
    pub letter_spacing: f32,
    #[serde(default)]
    pub text_anchor: TextAnchor,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

fn default_font_weight() -> u16 {
    400
}

fn default_opacity() -> f32 {
    1.0
}

/// One visual primitive within a template. `x`/`y` are the top-left corner
/// for images and rects, and the anchor point on the alphabetic baseline
/// for text.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    pub x: f64,
    pub y: f64,
    /// Explicit z override; sequence order within `elements` otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
    #[serde(flatten)]
    pub kind: ElementKind,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ElementKind {
    Text {
        content: String,
        #[serde(flatten)]
        style: TextStyle,
    },
    /// Text whose `field` is a field reference string resolved against the
    /// bound records; `content` is the literal fallback.
    BoundText {
        field: String,
        #[serde(default)]
        content: String,
        #[serde(flatten)]
        style: TextStyle,
    },
    Image {
        href: String,
        width: f64,
        height: f64,
    },
    /// Image whose `field` is a field reference string; `href` is the
    /// literal fallback.
    BoundImage {
        field: String,
        #[serde(default)]
        href: String,
        width: f64,
        height: f64,
    },
    Rect {
        width: f64,
        height: f64,
        fill: Color,
        #[serde(default)]
        rx: f64,
        #[serde(default)]
        ry: f64,
        #[serde(default)]
        stroke: Option<Color>,
        #[serde(default)]
        stroke_width: f64,
    },
}

/// A named, versioned visual scene. Element order is z-order (later = on
/// top) unless an element carries an explicit `z_index`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub version: u32,
    pub format: TemplateFormat,
    pub background_color: Color,
    #[serde(default)]
    pub use_background_placeholder: bool,
    /// User-supplied image that replaces the flat fill when
    /// `use_background_placeholder` is set. URL or data URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_placeholder: Option<String>,
    pub elements: Vec<Element>,
}

impl Template {
    pub fn from_json(json: &str) -> MatchcardResult<Template> {
        let template: Template = serde_json::from_str(json)
            .map_err(|e| MatchcardError::serde(format!("template parse: {e}")))?;
        template.validate()?;
        Ok(template)
    }

    pub fn validate(&self) -> MatchcardResult<()> {
        let (width, height) = self.format.dimensions();
        if width == 0 || height == 0 {
            return Err(MatchcardError::validation(
                "template dimensions must be > 0",
            ));
        }

        let mut seen = BTreeSet::new();
        for element in &self.elements {
            if element.id.is_empty() {
                return Err(MatchcardError::validation("element id must be non-empty"));
            }
            if !seen.insert(element.id.as_str()) {
                return Err(MatchcardError::validation(format!(
                    "duplicate element id: {}",
                    element.id
                )));
            }
            match &element.kind {
                ElementKind::Text { style, .. } | ElementKind::BoundText { style, .. } => {
                    if !style.font_size.is_finite() || style.font_size <= 0.0 {
                        return Err(MatchcardError::validation(format!(
                            "element {}: fontSize must be finite and > 0",
                            element.id
                        )));
                    }
                }
                ElementKind::Image { width, height, .. }
                | ElementKind::BoundImage { width, height, .. }
                | ElementKind::Rect { width, height, .. } => {
                    if *width <= 0.0 || *height <= 0.0 {
                        return Err(MatchcardError::validation(format!(
                            "element {}: width/height must be > 0",
                            element.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_parse_forms() {
        assert_eq!(Color::parse("#fff").unwrap(), Color::WHITE);
        assert_eq!(
            Color::parse("#1a2b3c").unwrap(),
            Color { r: 0x1a, g: 0x2b, b: 0x3c, a: 255 }
        );
        assert_eq!(Color::parse("#1a2b3c80").unwrap().a, 0x80);
        assert_eq!(Color::parse("none").unwrap(), Color::TRANSPARENT);
        assert!(Color::parse("#12345").is_err());
        assert!(Color::parse("chartreuse").is_err());
    }

    #[test]
    fn color_css_round_trip() {
        let c = Color { r: 1, g: 2, b: 3, a: 255 };
        assert_eq!(Color::parse(&c.to_css()).unwrap(), c);
        let c = Color { r: 1, g: 2, b: 3, a: 4 };
        assert_eq!(Color::parse(&c.to_css()).unwrap(), c);
    }

    #[test]
    fn format_dimensions() {
        assert_eq!(TemplateFormat::FourFive.dimensions(), (1080, 1350));
        assert_eq!(TemplateFormat::Square.dimensions(), (1080, 1080));
        assert_eq!(
            TemplateFormat::Custom { width: 10, height: 20 }.dimensions(),
            (10, 20)
        );
    }

    #[test]
    fn template_json_round_trip() {
        let json = r##"{
            "name": "matchday",
            "format": "square",
            "backgroundColor": "#101820",
            "elements": [
                {"id": "bg", "x": 0, "y": 0, "type": "rect",
                 "width": 1080, "height": 1080, "fill": "#101820"},
                {"id": "home", "x": 540, "y": 400, "type": "boundText",
                 "field": "teamHome", "content": "Home",
                 "fontFamily": "Bebas Neue", "fontSize": 96, "fill": "#ffffff",
                 "textAnchor": "middle"}
            ]
        }"##;
        let template = Template::from_json(json).unwrap();
        assert_eq!(template.elements.len(), 2);
        let back = serde_json::to_string(&template).unwrap();
        let again = Template::from_json(&back).unwrap();
        assert_eq!(again.name, "matchday");
        match &again.elements[1].kind {
            ElementKind::BoundText { field, style, .. } => {
                assert_eq!(field, "teamHome");
                assert_eq!(style.text_anchor, TextAnchor::Middle);
                assert_eq!(style.font_weight, 400);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_duplicate_ids_and_bad_sizes() {
        let mut template = Template {
            name: "t".into(),
            version: 0,
            format: TemplateFormat::Square,
            background_color: Color::BLACK,
            use_background_placeholder: false,
            background_placeholder: None,
            elements: vec![Element {
                id: "a".into(),
                x: 0.0,
                y: 0.0,
                z_index: None,
                kind: ElementKind::Rect {
                    width: 10.0,
                    height: 10.0,
                    fill: Color::BLACK,
                    rx: 0.0,
                    ry: 0.0,
                    stroke: None,
                    stroke_width: 0.0,
                },
            }],
        };
        assert!(template.validate().is_ok());

        template.elements.push(template.elements[0].clone());
        assert!(template.validate().is_err());

        template.elements.pop();
        if let ElementKind::Rect { width, .. } = &mut template.elements[0].kind {
            *width = 0.0;
        }
        assert!(template.validate().is_err());
    }
}
