use matchcard::binding::{BindingOutcome, ResolvedKind, resolve_template};
use matchcard::layers::separate;
use matchcard::{GameField, GameRecord, RecordSet, Template};
use pretty_assertions::assert_eq;

fn fixture() -> Template {
    Template::from_json(
        r##"{
            "name": "doubleheader",
            "format": "fourFive",
            "backgroundColor": "#101820",
            "elements": [
                {"id": "bg", "x": 0, "y": 0, "type": "rect",
                 "width": 1080, "height": 1350, "fill": "#101820"},
                {"id": "badge", "x": 40, "y": 40, "type": "rect", "zIndex": 50,
                 "width": 200, "height": 80, "fill": "#e10600"},
                {"id": "pairing", "x": 540, "y": 500, "type": "boundText",
                 "field": "teamHome,teamAway", "content": "Home vs Away",
                 "fontFamily": "Bebas Neue", "fontSize": 96,
                 "fill": "#ffffff", "textAnchor": "middle"},
                {"id": "second", "x": 540, "y": 900, "type": "boundText",
                 "field": "game-2.result", "content": "-:-",
                 "fontFamily": "Oswald", "fontSize": 64,
                 "fill": "#ffffff", "textAnchor": "middle"},
                {"id": "logo", "x": 440, "y": 120, "type": "boundImage",
                 "field": "teamHomeLogo", "href": "",
                 "width": 200, "height": 200}
            ]
        }"##,
    )
    .unwrap()
}

fn two_games() -> RecordSet {
    RecordSet::new(vec![
        GameRecord::new("g1")
            .with(GameField::TeamHome, "FC Aarau")
            .with(GameField::TeamAway, "FC Thun")
            .with(GameField::TeamHomeLogo, "https://cdn.example/aarau.png"),
        GameRecord::new("g2").with(GameField::Result, "2:1"),
    ])
}

#[test]
fn bound_text_joins_fields_and_routes_prefixes() {
    let resolved = resolve_template(&fixture(), &two_games());

    let pairing = resolved.elements.iter().find(|e| e.id == "pairing").unwrap();
    assert_eq!(pairing.binding, BindingOutcome::Resolved);
    match &pairing.kind {
        ResolvedKind::Text { content, .. } => assert_eq!(content, "FC Aarau FC Thun"),
        other => panic!("unexpected kind: {other:?}"),
    }

    let second = resolved.elements.iter().find(|e| e.id == "second").unwrap();
    match &second.kind {
        ResolvedKind::Text { content, .. } => assert_eq!(content, "2:1"),
        other => panic!("unexpected kind: {other:?}"),
    }
}

#[test]
fn absent_fields_fall_back_to_literal_content() {
    // Only the primary game exists; game-2.result is absent.
    let records = RecordSet::single(GameRecord::new("g1").with(GameField::TeamHome, "FC Aarau"));
    let resolved = resolve_template(&fixture(), &records);

    let second = resolved.elements.iter().find(|e| e.id == "second").unwrap();
    assert_eq!(second.binding, BindingOutcome::Fallback);
    match &second.kind {
        ResolvedKind::Text { content, .. } => assert_eq!(content, "-:-"),
        other => panic!("unexpected kind: {other:?}"),
    }
}

#[test]
fn bound_image_resolves_href_from_record() {
    let resolved = resolve_template(&fixture(), &two_games());
    let logo = resolved.elements.iter().find(|e| e.id == "logo").unwrap();
    match &logo.kind {
        ResolvedKind::Image { href, .. } => assert_eq!(href, "https://cdn.example/aarau.png"),
        other => panic!("unexpected kind: {other:?}"),
    }
}

#[test]
fn explicit_z_index_reorders_but_sort_is_stable() {
    let resolved = resolve_template(&fixture(), &two_games());
    let order: Vec<&str> = resolved.elements.iter().map(|e| e.id.as_str()).collect();
    // "badge" (z 50) sorts after everything with a sequence-derived z.
    assert_eq!(order, vec!["bg", "pairing", "second", "logo", "badge"]);
}

#[test]
fn resolution_is_deterministic() {
    let template = fixture();
    let records = two_games();
    let a = resolve_template(&template, &records);
    let b = resolve_template(&template, &records);
    assert_eq!(a.elements, b.elements);
}

#[test]
fn layers_split_into_background_images_text() {
    let resolved = resolve_template(&fixture(), &two_games());
    let layers = separate(&resolved);

    let ids = |elements: &[matchcard::binding::ResolvedElement]| -> Vec<String> {
        elements.iter().map(|e| e.id.clone()).collect()
    };
    // Full-canvas rect at the origin is background; the small badge is not.
    assert_eq!(ids(&layers.background), vec!["bg"]);
    assert_eq!(ids(&layers.images), vec!["logo", "badge"]);
    assert_eq!(ids(&layers.text), vec!["pairing", "second"]);
}
