//! Static font catalog, family-name normalization, and font-face embedding.
//!
//! The catalog mirrors the font set shipped with the template editor: a
//! fixed list of display families hosted as static TTFs. Only the
//! `(family, weight, style)` triples actually used by a resolved template
//! are fetched and inlined.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use crate::binding::{ResolvedKind, ResolvedTemplate};
use crate::error::MatchcardResult;
use crate::fetch::{FetchedResource, ResourceFetcher};
use crate::model::FontStyle;

#[derive(Clone, Debug)]
pub struct FontVariant {
    pub weight: u16,
    pub style: FontStyle,
    pub url: String,
}

#[derive(Clone, Debug)]
pub struct FontConfig {
    pub display_name: String,
    /// Canonical family name used in css/svg output and for shaping.
    pub css_family: String,
    /// Extra names that normalize to this family (import aliases).
    pub aliases: Vec<String>,
    pub variants: Vec<FontVariant>,
}

impl FontConfig {
    /// Exact `(weight, style)` match, else the first declared variant.
    /// The fallback is an approximation, not a rendering guarantee.
    pub fn variant_for(&self, weight: u16, style: FontStyle) -> Option<&FontVariant> {
        let exact = self
            .variants
            .iter()
            .find(|v| v.weight == weight && v.style == style);
        if exact.is_some() {
            return exact;
        }
        let first = self.variants.first();
        if let Some(v) = first {
            tracing::warn!(
                family = %self.css_family,
                requested_weight = weight,
                got_weight = v.weight,
                "no exact font variant match, using first declared variant"
            );
        }
        first
    }
}

/// Generic CSS family keywords; these never match a catalog family.
const GENERIC_FAMILIES: &[&str] = &[
    "sans-serif",
    "serif",
    "monospace",
    "cursive",
    "fantasy",
    "system-ui",
    "ui-sans-serif",
    "ui-serif",
    "ui-monospace",
];

/// Catalog of supported families. Pure lookup; fetching happens in
/// [`embed_fonts`].
pub struct FontRegistry {
    configs: Vec<FontConfig>,
    default_family: String,
}

impl FontRegistry {
    pub fn new(configs: Vec<FontConfig>, default_family: impl Into<String>) -> FontRegistry {
        FontRegistry {
            configs,
            default_family: default_family.into(),
        }
    }

    /// The built-in catalog shared process-wide.
    pub fn builtin() -> &'static FontRegistry {
        static BUILTIN: OnceLock<FontRegistry> = OnceLock::new();
        BUILTIN.get_or_init(|| FontRegistry::new(builtin_configs(), "Montserrat"))
    }

    pub fn families(&self) -> impl Iterator<Item = &FontConfig> {
        self.configs.iter()
    }

    pub fn default_family(&self) -> &FontConfig {
        self.configs
            .iter()
            .find(|c| c.css_family == self.default_family)
            .or_else(|| self.configs.first())
            .expect("font registry must not be empty")
    }

    /// Normalize a raw family name (typed by a user or imported from a
    /// file) to its canonical catalog entry. Case, whitespace, and common
    /// punctuation differences are ignored; generic CSS keywords never
    /// match.
    pub fn normalize(&self, raw: &str) -> Option<&FontConfig> {
        let trimmed = raw.trim().trim_matches(['"', '\'']);
        if GENERIC_FAMILIES.contains(&trimmed.to_ascii_lowercase().as_str()) {
            return None;
        }
        let key = fold_family_name(trimmed);
        if key.is_empty() {
            return None;
        }
        self.configs.iter().find(|c| {
            fold_family_name(&c.css_family) == key
                || fold_family_name(&c.display_name) == key
                || c.aliases.iter().any(|a| fold_family_name(a) == key)
        })
    }

    /// Canonical config for an element's family: normalized match, or the
    /// default family when nothing matches.
    pub fn resolve_family(&self, raw: &str) -> &FontConfig {
        self.normalize(raw).unwrap_or_else(|| {
            tracing::debug!(family = raw, "unknown font family, using default");
            self.default_family()
        })
    }
}

/// Lowercase and strip everything that is not alphanumeric, so
/// `"Bebas Neue"`, `"bebas-neue"`, and `"BebasNeue"` fold identically.
fn fold_family_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// One `(family, weight, style)` triple a template actually uses.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FontUsage {
    pub css_family: String,
    pub weight: u16,
    pub style: FontStyle,
}

/// Scan the resolved scene for the set of font triples in use. A family
/// with a dozen declared variants but two used yields exactly two entries.
pub fn collect_usage(resolved: &ResolvedTemplate, registry: &FontRegistry) -> Vec<FontUsage> {
    let mut set = BTreeSet::new();
    for element in &resolved.elements {
        if let ResolvedKind::Text { style, .. } = &element.kind {
            let config = registry.resolve_family(&style.font_family);
            set.insert(FontUsage {
                css_family: config.css_family.clone(),
                weight: style.font_weight,
                style: style.font_style,
            });
        }
    }
    set.into_iter().collect()
}

/// Where an embedded font-face's bytes come from.
#[derive(Clone, Debug)]
pub enum FontSource {
    /// Fully inlined; the export has no remaining dependency on the URL.
    Inline(Arc<FetchedResource>),
    /// Fetch failed twice; the face references the remote URL and the
    /// export stays valid only while that URL is reachable.
    Remote(String),
}

/// A self-contained font-face description for one used variant.
#[derive(Clone, Debug)]
pub struct FontFaceBlock {
    pub css_family: String,
    pub weight: u16,
    pub style: FontStyle,
    pub source: FontSource,
}

impl FontFaceBlock {
    /// Raw font bytes when inlined; `None` for a remote-degraded face.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.source {
            FontSource::Inline(resource) => Some(&resource.bytes),
            FontSource::Remote(_) => None,
        }
    }

    /// `@font-face` rule for the SVG fallback markup.
    pub fn to_css(&self) -> String {
        let src = match &self.source {
            FontSource::Inline(resource) => resource.to_data_uri(),
            FontSource::Remote(url) => url.clone(),
        };
        let style = match self.style {
            FontStyle::Normal => "normal",
            FontStyle::Italic => "italic",
        };
        format!(
            "@font-face {{ font-family: '{}'; font-weight: {}; font-style: {}; src: url('{}'); }}",
            self.css_family, self.weight, style, src
        )
    }
}

/// Fetch and inline every used variant, fanning the fetches out as one
/// concurrent batch. A variant whose fetch fails twice degrades to its
/// remote URL; fonts never fail an export on their own.
pub async fn embed_fonts(
    usage: &[FontUsage],
    registry: &FontRegistry,
    fetcher: &ResourceFetcher,
) -> MatchcardResult<Vec<FontFaceBlock>> {
    let wanted: Vec<(&FontUsage, &FontConfig, &FontVariant)> = usage
        .iter()
        .filter_map(|used| {
            let config = registry.normalize(&used.css_family)?;
            let variant = config.variant_for(used.weight, used.style)?;
            Some((used, config, variant))
        })
        .collect();

    let fetches = wanted.iter().map(|(_, config, variant)| async move {
        let mut fetched = fetcher.fetch(&variant.url).await;
        if fetched.is_err() {
            fetched = fetcher.fetch(&variant.url).await;
        }
        match fetched {
            Ok(resource) => FontSource::Inline(resource),
            Err(e) => {
                tracing::warn!(
                    family = %config.css_family,
                    url = %variant.url,
                    error = %e,
                    "font fetch failed twice, degrading to remote reference"
                );
                FontSource::Remote(variant.url.clone())
            }
        }
    });
    let sources = futures::future::join_all(fetches).await;

    Ok(wanted
        .iter()
        .zip(sources)
        .map(|((used, config, _), source)| FontFaceBlock {
            css_family: config.css_family.clone(),
            weight: used.weight,
            style: used.style,
            source,
        })
        .collect())
}

fn builtin_configs() -> Vec<FontConfig> {
    fn variant(weight: u16, style: FontStyle, url: &str) -> FontVariant {
        FontVariant {
            weight,
            style,
            url: url.to_string(),
        }
    }
    fn family(
        display_name: &str,
        css_family: &str,
        aliases: &[&str],
        variants: Vec<FontVariant>,
    ) -> FontConfig {
        FontConfig {
            display_name: display_name.to_string(),
            css_family: css_family.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            variants,
        }
    }

    vec![
        family(
            "Bebas Neue",
            "Bebas Neue",
            &["BebasNeue-Regular"],
            vec![variant(
                400,
                FontStyle::Normal,
                "https://fonts.gstatic.com/s/bebasneue/v14/JTUSjIg69CK48gW7PXoo9Wlhyw.ttf",
            )],
        ),
        family(
            "Anton",
            "Anton",
            &["Anton-Regular"],
            vec![variant(
                400,
                FontStyle::Normal,
                "https://fonts.gstatic.com/s/anton/v25/1Ptgg87LROyAm0K08i4gS7lu.ttf",
            )],
        ),
        family(
            "Archivo Black",
            "Archivo Black",
            &["ArchivoBlack-Regular"],
            vec![variant(
                400,
                FontStyle::Normal,
                "https://fonts.gstatic.com/s/archivoblack/v21/HTxqL289NzCGg4MzN6KJ7eW6OYuP_x7yx3A.ttf",
            )],
        ),
        family(
            "Oswald",
            "Oswald",
            &[],
            vec![
                variant(
                    300,
                    FontStyle::Normal,
                    "https://fonts.gstatic.com/s/oswald/v53/TK3_WkUHHAIjg75cFRf3bXL8LICs169vsUZiYA.ttf",
                ),
                variant(
                    400,
                    FontStyle::Normal,
                    "https://fonts.gstatic.com/s/oswald/v53/TK3_WkUHHAIjg75cFRf3bXL8LICs1_FvsUZiYA.ttf",
                ),
                variant(
                    600,
                    FontStyle::Normal,
                    "https://fonts.gstatic.com/s/oswald/v53/TK3_WkUHHAIjg75cFRf3bXL8LICs1xZosUZiYA.ttf",
                ),
                variant(
                    700,
                    FontStyle::Normal,
                    "https://fonts.gstatic.com/s/oswald/v53/TK3_WkUHHAIjg75cFRf3bXL8LICs1y9osUZiYA.ttf",
                ),
            ],
        ),
        family(
            "Montserrat",
            "Montserrat",
            &[],
            vec![
                variant(
                    400,
                    FontStyle::Normal,
                    "https://fonts.gstatic.com/s/montserrat/v26/JTUHjIg1_i6t8kCHKm4532VJOt5-QNFgpCtr6Hw5aXo.ttf",
                ),
                variant(
                    400,
                    FontStyle::Italic,
                    "https://fonts.gstatic.com/s/montserrat/v26/JTUFjIg1_i6t8kCHKm459Wx7xQYXK0vOoz6jq6R9aX8.ttf",
                ),
                variant(
                    600,
                    FontStyle::Normal,
                    "https://fonts.gstatic.com/s/montserrat/v26/JTUHjIg1_i6t8kCHKm4532VJOt5-QNFgpCu173w5aXo.ttf",
                ),
                variant(
                    700,
                    FontStyle::Normal,
                    "https://fonts.gstatic.com/s/montserrat/v26/JTUHjIg1_i6t8kCHKm4532VJOt5-QNFgpCuM73w5aXo.ttf",
                ),
                variant(
                    800,
                    FontStyle::Normal,
                    "https://fonts.gstatic.com/s/montserrat/v26/JTUHjIg1_i6t8kCHKm4532VJOt5-QNFgpCuW73w5aXo.ttf",
                ),
            ],
        ),
        family(
            "Roboto Condensed",
            "Roboto Condensed",
            &["RobotoCondensed"],
            vec![
                variant(
                    400,
                    FontStyle::Normal,
                    "https://fonts.gstatic.com/s/robotocondensed/v27/ieVo2ZhZI2eCN5jzbjEETS9weq8-_d6T_POl0fRJeyWyosBO5Xc.ttf",
                ),
                variant(
                    700,
                    FontStyle::Normal,
                    "https://fonts.gstatic.com/s/robotocondensed/v27/ieVo2ZhZI2eCN5jzbjEETS9weq8-_d6T_POl0fRJeyXbo8BO5Xc.ttf",
                ),
            ],
        ),
        family(
            "Teko",
            "Teko",
            &[],
            vec![
                variant(
                    400,
                    FontStyle::Normal,
                    "https://fonts.gstatic.com/s/teko/v20/LYjYdG7kmE0gV69VVPPdFl06VN8XG6Sy3TKEvkCF.ttf",
                ),
                variant(
                    600,
                    FontStyle::Normal,
                    "https://fonts.gstatic.com/s/teko/v20/LYjYdG7kmE0gV69VVPPdFl06VN9ZGqSy3TKEvkCF.ttf",
                ),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_alias_and_case_insensitive() {
        let registry = FontRegistry::builtin();
        let a = registry.normalize("Bebas Neue").unwrap();
        let b = registry.normalize("bebas-neue").unwrap();
        let c = registry.normalize("BebasNeue").unwrap();
        assert_eq!(a.css_family, "Bebas Neue");
        assert_eq!(b.css_family, a.css_family);
        assert_eq!(c.css_family, a.css_family);
        assert_eq!(
            registry.normalize("  'Oswald' ").unwrap().css_family,
            "Oswald"
        );
    }

    #[test]
    fn generic_families_never_match() {
        let registry = FontRegistry::builtin();
        assert!(registry.normalize("sans-serif").is_none());
        assert!(registry.normalize("Monospace").is_none());
        assert!(registry.normalize("").is_none());
        assert!(registry.normalize("Comic Neue Deluxe").is_none());
    }

    #[test]
    fn variant_matching_is_exact_with_first_declared_fallback() {
        let registry = FontRegistry::builtin();
        let oswald = registry.normalize("Oswald").unwrap();
        assert_eq!(oswald.variant_for(700, FontStyle::Normal).unwrap().weight, 700);
        // No italic Oswald declared: first declared variant (300) is used.
        assert_eq!(oswald.variant_for(700, FontStyle::Italic).unwrap().weight, 300);
    }

    #[test]
    fn unknown_family_resolves_to_default() {
        let registry = FontRegistry::builtin();
        assert_eq!(
            registry.resolve_family("No Such Font").css_family,
            "Montserrat"
        );
    }

    #[test]
    fn font_face_css_for_remote_source() {
        let block = FontFaceBlock {
            css_family: "Oswald".into(),
            weight: 700,
            style: FontStyle::Normal,
            source: FontSource::Remote("https://example.com/oswald.ttf".into()),
        };
        let css = block.to_css();
        assert!(css.contains("font-family: 'Oswald'"));
        assert!(css.contains("font-weight: 700"));
        assert!(css.contains("https://example.com/oswald.ttf"));
        assert!(block.bytes().is_none());
    }
}
