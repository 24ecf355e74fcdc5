//! Binding resolution: maps template elements with field references onto
//! concrete strings from the bound records. Pure and deterministic; the
//! same `(template, records)` pair always yields the same resolved scene.

use crate::model::{Color, Element, ElementKind, Template, TextStyle};
use crate::record::RecordSet;

/// Which record a field reference selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordSelector {
    Primary,
    Game2,
    Game3,
}

impl RecordSelector {
    pub fn index(&self) -> usize {
        match self {
            RecordSelector::Primary => 0,
            RecordSelector::Game2 => 1,
            RecordSelector::Game3 => 2,
        }
    }
}

/// A parsed field reference string: an optional record-selector prefix and
/// one or more comma-joined field names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRef {
    pub selector: RecordSelector,
    pub fields: Vec<String>,
}

impl FieldRef {
    /// Parse `game-2.<field>`, `game-3.<field>`, `game.<field>`, or a bare
    /// `<field>`; the field part may be a comma-joined list.
    pub fn parse(raw: &str) -> FieldRef {
        let raw = raw.trim();
        let (selector, rest) = if let Some(rest) = raw.strip_prefix("game-2.") {
            (RecordSelector::Game2, rest)
        } else if let Some(rest) = raw.strip_prefix("game-3.") {
            (RecordSelector::Game3, rest)
        } else if let Some(rest) = raw.strip_prefix("game.") {
            (RecordSelector::Primary, rest)
        } else {
            (RecordSelector::Primary, raw)
        };

        let fields = rest
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();

        FieldRef { selector, fields }
    }

    /// Resolve against the record set. Absent/empty fields are dropped and
    /// the survivors joined with a single space; zero survivors is `None`
    /// and the caller falls back to the element's literal content.
    pub fn resolve(&self, records: &RecordSet) -> Option<String> {
        let record = records.select(self.selector.index())?;
        let parts: Vec<&str> = self
            .fields
            .iter()
            .filter_map(|name| record.get_named(name))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// How a resolved element's content came to be. Only observability: a
/// `Fallback` is "intentionally blank per template", never an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingOutcome {
    /// Element was not data-bound.
    Literal,
    /// Field reference resolved to record data.
    Resolved,
    /// All referenced fields were absent; literal fallback content used.
    Fallback,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedKind {
    Text {
        content: String,
        style: TextStyle,
    },
    Image {
        href: String,
        width: f64,
        height: f64,
    },
    Rect {
        width: f64,
        height: f64,
        fill: Color,
        rx: f64,
        ry: f64,
        stroke: Option<Color>,
        stroke_width: f64,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedElement {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub z: i32,
    pub binding: BindingOutcome,
    pub kind: ResolvedKind,
}

/// A template with every field reference replaced by concrete content,
/// elements in final draw order (back to front).
#[derive(Clone, Debug)]
pub struct ResolvedTemplate {
    pub width: u32,
    pub height: u32,
    pub background_color: Color,
    pub background_placeholder: Option<String>,
    pub elements: Vec<ResolvedElement>,
}

/// Resolve every element of `template` against `records`.
pub fn resolve_template(template: &Template, records: &RecordSet) -> ResolvedTemplate {
    let (width, height) = template.format.dimensions();

    let mut elements: Vec<ResolvedElement> = template
        .elements
        .iter()
        .enumerate()
        .map(|(i, element)| resolve_element(element, i as i32, records))
        .collect();
    // Stable by z, so equal-z elements keep template sequence order.
    elements.sort_by_key(|e| e.z);

    ResolvedTemplate {
        width,
        height,
        background_color: template.background_color,
        background_placeholder: if template.use_background_placeholder {
            template.background_placeholder.clone()
        } else {
            None
        },
        elements,
    }
}

fn resolve_element(element: &Element, sequence: i32, records: &RecordSet) -> ResolvedElement {
    let z = element.z_index.unwrap_or(sequence);
    let (binding, kind) = match &element.kind {
        ElementKind::Text { content, style } => (
            BindingOutcome::Literal,
            ResolvedKind::Text {
                content: content.clone(),
                style: style.clone(),
            },
        ),
        ElementKind::BoundText {
            field,
            content,
            style,
        } => {
            let (binding, content) = match FieldRef::parse(field).resolve(records) {
                Some(resolved) => (BindingOutcome::Resolved, resolved),
                None => (BindingOutcome::Fallback, content.clone()),
            };
            (
                binding,
                ResolvedKind::Text {
                    content,
                    style: style.clone(),
                },
            )
        }
        ElementKind::Image {
            href,
            width,
            height,
        } => (
            BindingOutcome::Literal,
            ResolvedKind::Image {
                href: href.clone(),
                width: *width,
                height: *height,
            },
        ),
        ElementKind::BoundImage {
            field,
            href,
            width,
            height,
        } => {
            let (binding, href) = match FieldRef::parse(field).resolve(records) {
                Some(resolved) => (BindingOutcome::Resolved, resolved),
                None => (BindingOutcome::Fallback, href.clone()),
            };
            (
                binding,
                ResolvedKind::Image {
                    href,
                    width: *width,
                    height: *height,
                },
            )
        }
        ElementKind::Rect {
            width,
            height,
            fill,
            rx,
            ry,
            stroke,
            stroke_width,
        } => (
            BindingOutcome::Literal,
            ResolvedKind::Rect {
                width: *width,
                height: *height,
                fill: *fill,
                rx: *rx,
                ry: *ry,
                stroke: *stroke,
                stroke_width: *stroke_width,
            },
        ),
    };

    ResolvedElement {
        id: element.id.clone(),
        x: element.x,
        y: element.y,
        z,
        binding,
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{GameField, GameRecord};

    fn records() -> RecordSet {
        RecordSet::new(vec![
            GameRecord::new("g1")
                .with(GameField::TeamHome, "FC Bern")
                .with(GameField::TeamAway, "FC Zürich")
                .with(GameField::Date, "12.05.2025")
                .with(GameField::Time, "18:00"),
            GameRecord::new("g2").with(GameField::TeamHome, "SC Bümpliz"),
            GameRecord::new("g3").with(GameField::ResultDetail, "(2:0, 1:0)"),
        ])
    }

    #[test]
    fn parses_selector_prefixes() {
        assert_eq!(FieldRef::parse("teamHome").selector, RecordSelector::Primary);
        assert_eq!(FieldRef::parse("game.teamHome").selector, RecordSelector::Primary);
        assert_eq!(FieldRef::parse("game-2.teamHome").selector, RecordSelector::Game2);
        assert_eq!(FieldRef::parse("game-3.result").selector, RecordSelector::Game3);
        assert_eq!(FieldRef::parse("game-2.teamHome").fields, vec!["teamHome"]);
    }

    #[test]
    fn routes_to_selected_record() {
        let records = records();
        assert_eq!(
            FieldRef::parse("game-2.teamHome").resolve(&records),
            Some("SC Bümpliz".to_string())
        );
        assert_eq!(
            FieldRef::parse("game-3.resultDetail").resolve(&records),
            Some("(2:0, 1:0)".to_string())
        );
        assert_eq!(
            FieldRef::parse("teamAway").resolve(&records),
            Some("FC Zürich".to_string())
        );
    }

    #[test]
    fn out_of_range_selector_falls_back_to_primary() {
        let records = RecordSet::single(
            GameRecord::new("g1").with(GameField::TeamHome, "FC Bern"),
        );
        assert_eq!(
            FieldRef::parse("game-3.teamHome").resolve(&records),
            Some("FC Bern".to_string())
        );
        assert_eq!(FieldRef::parse("game-3.result").resolve(&records), None);
    }

    #[test]
    fn comma_join_drops_absent_fields() {
        let records = records();
        assert_eq!(
            FieldRef::parse("date,time,location").resolve(&records),
            Some("12.05.2025 18:00".to_string())
        );
        assert_eq!(FieldRef::parse("location,city").resolve(&records), None);
    }

    #[test]
    fn explicit_z_overrides_sequence_order() {
        let template = Template {
            name: "t".into(),
            version: 0,
            format: crate::model::TemplateFormat::Square,
            background_color: Color::BLACK,
            use_background_placeholder: false,
            background_placeholder: None,
            elements: vec![
                Element {
                    id: "top".into(),
                    x: 0.0,
                    y: 0.0,
                    z_index: Some(10),
                    kind: ElementKind::Rect {
                        width: 1.0,
                        height: 1.0,
                        fill: Color::BLACK,
                        rx: 0.0,
                        ry: 0.0,
                        stroke: None,
                        stroke_width: 0.0,
                    },
                },
                Element {
                    id: "bottom".into(),
                    x: 0.0,
                    y: 0.0,
                    z_index: None,
                    kind: ElementKind::Rect {
                        width: 1.0,
                        height: 1.0,
                        fill: Color::BLACK,
                        rx: 0.0,
                        ry: 0.0,
                        stroke: None,
                        stroke_width: 0.0,
                    },
                },
            ],
        };
        let resolved = resolve_template(&template, &RecordSet::default());
        assert_eq!(resolved.elements[0].id, "bottom");
        assert_eq!(resolved.elements[1].id, "top");
    }
}
