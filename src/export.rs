//! Export orchestration: binding → layer separation → resource inlining →
//! rasterization → encoding → delivery, with a typed event stream for
//! progress and per-resource status.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;

use crate::binding::{ResolvedKind, resolve_template};
use crate::delivery::{Delivered, DeliveryChain};
use crate::encode::{ImageFormat, encode};
use crate::error::MatchcardResult;
use crate::fetch::ResourceFetcher;
use crate::fonts::{FontRegistry, collect_usage, embed_fonts};
use crate::layers::{SceneLayers, separate};
use crate::model::Template;
use crate::record::RecordSet;
use crate::render::rasterize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    Pending,
    Loading,
    Loaded,
    Error,
}

/// Load status for one remote resource. Observability only; it never
/// affects the produced bitmap.
#[derive(Clone, Debug)]
pub struct ResourceStatus {
    pub identifier: String,
    pub state: ResourceState,
    pub size: Option<usize>,
    pub error: Option<String>,
}

/// What a finished export produced.
#[derive(Clone, Debug)]
pub struct ExportOutcome {
    pub filename: String,
    pub delivered: Delivered,
    pub width: u32,
    pub height: u32,
    /// Non-fatal degradations (failed layers, omitted images).
    pub warnings: Vec<String>,
}

/// The single typed event stream a caller subscribes to. Progress and
/// resource-status events carry no ordering guarantee relative to each
/// other; exactly one terminal event (`Completed` or `Failed`) fires per
/// export.
#[derive(Clone, Debug)]
pub enum ExportEvent {
    Progress { percent: u8, message: String },
    Resources(Vec<ResourceStatus>),
    Completed(ExportOutcome),
    Failed { message: String },
}

/// Sending half of the event stream. Progress is clamped monotonic: a
/// late-arriving lower percentage never rolls the bar back.
#[derive(Clone)]
pub struct ExportEvents {
    tx: Option<mpsc::UnboundedSender<ExportEvent>>,
    last_percent: Arc<AtomicU8>,
}

impl ExportEvents {
    pub fn channel() -> (ExportEvents, mpsc::UnboundedReceiver<ExportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ExportEvents {
                tx: Some(tx),
                last_percent: Arc::new(AtomicU8::new(0)),
            },
            rx,
        )
    }

    /// An event sink that drops everything, for callers that only want
    /// the returned result.
    pub fn discard() -> ExportEvents {
        ExportEvents {
            tx: None,
            last_percent: Arc::new(AtomicU8::new(0)),
        }
    }

    fn send(&self, event: ExportEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    fn progress(&self, percent: u8, message: impl Into<String>) {
        let percent = self.last_percent.fetch_max(percent, Ordering::Relaxed).max(percent);
        self.send(ExportEvent::Progress {
            percent,
            message: message.into(),
        });
    }

    fn resources(&self, statuses: &HashMap<String, ResourceStatus>) {
        let mut list: Vec<ResourceStatus> = statuses.values().cloned().collect();
        list.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        self.send(ExportEvent::Resources(list));
    }
}

#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Output pixels per logical pixel.
    pub scale: f32,
    pub format: ImageFormat,
    /// Filename prefix: `<category>-<primaryRecordId>-<timestamp>.<ext>`.
    pub category: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            scale: 2.0,
            format: ImageFormat::Png,
            category: "matchday".to_string(),
        }
    }
}

/// Drives one export end to end. The fetcher (and with it the font and
/// image cache) is shared across exports; everything else is per-call.
pub struct Exporter {
    fetcher: Arc<ResourceFetcher>,
    registry: &'static FontRegistry,
    chain: DeliveryChain,
}

impl Exporter {
    pub fn new(chain: DeliveryChain) -> Exporter {
        Exporter {
            fetcher: ResourceFetcher::shared(),
            registry: FontRegistry::builtin(),
            chain,
        }
    }

    pub fn with_fetcher(chain: DeliveryChain, fetcher: Arc<ResourceFetcher>) -> Exporter {
        Exporter::with_registry(chain, fetcher, FontRegistry::builtin())
    }

    /// Exporter over a custom font catalog instead of the built-in one.
    pub fn with_registry(
        chain: DeliveryChain,
        fetcher: Arc<ResourceFetcher>,
        registry: &'static FontRegistry,
    ) -> Exporter {
        Exporter {
            fetcher,
            registry,
            chain,
        }
    }

    /// Run the full pipeline. Resource and layer failures degrade the
    /// output; only encoding failure or an exhausted delivery chain is
    /// fatal. Exactly one terminal event is emitted either way.
    #[tracing::instrument(skip_all, fields(template = %template.name))]
    pub async fn export(
        &self,
        template: &Template,
        records: &RecordSet,
        opts: &ExportOptions,
        events: &ExportEvents,
    ) -> MatchcardResult<ExportOutcome> {
        match self.run(template, records, opts, events).await {
            Ok(outcome) => {
                events.send(ExportEvent::Completed(outcome.clone()));
                Ok(outcome)
            }
            Err(e) => {
                events.send(ExportEvent::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        template: &Template,
        records: &RecordSet,
        opts: &ExportOptions,
        events: &ExportEvents,
    ) -> MatchcardResult<ExportOutcome> {
        template.validate()?;
        events.progress(10, "Preparing template");

        let resolved = resolve_template(template, records);
        let mut layers = separate(&resolved);

        let usage = collect_usage(&resolved, self.registry);
        let image_refs: Vec<String> = layers
            .image_refs()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut statuses: HashMap<String, ResourceStatus> = image_refs
            .iter()
            .filter(|r| !r.starts_with("data:"))
            .map(|r| {
                (
                    r.clone(),
                    ResourceStatus {
                        identifier: r.clone(),
                        state: ResourceState::Pending,
                        size: None,
                        error: None,
                    },
                )
            })
            .collect();
        events.resources(&statuses);
        events.progress(30, "Inlining images");

        // Fan out every fetch for this stage in one concurrent batch, fonts
        // and images together; rasterization must not start until all of
        // them have settled.
        for status in statuses.values_mut() {
            status.state = ResourceState::Loading;
        }
        events.resources(&statuses);

        let unique_refs: Vec<String> = statuses.keys().cloned().collect();
        let fetches = unique_refs.iter().map(|url| {
            let fetcher = self.fetcher.clone();
            async move { (url.clone(), fetcher.fetch(url).await) }
        });
        let (fonts, results) = tokio::join!(
            embed_fonts(&usage, self.registry, self.fetcher.as_ref()),
            futures::future::join_all(fetches),
        );
        let fonts = fonts?;

        let mut inlined: HashMap<String, String> = HashMap::new();
        let mut warnings = Vec::new();
        for (url, result) in results {
            match result {
                Ok(resource) => {
                    if let Some(status) = statuses.get_mut(&url) {
                        status.state = ResourceState::Loaded;
                        status.size = Some(resource.size());
                    }
                    inlined.insert(url, resource.to_data_uri());
                }
                Err(e) => {
                    tracing::warn!(%url, error = %e, "image fetch failed, element will be omitted");
                    if let Some(status) = statuses.get_mut(&url) {
                        status.state = ResourceState::Error;
                        status.error = Some(e.to_string());
                    }
                    warnings.push(format!("image omitted: {url}"));
                }
            }
        }
        events.resources(&statuses);
        events.progress(60, "Images loaded");

        inline_hrefs(&mut layers, &inlined);

        events.progress(70, "Rendering image");
        let raster = rasterize(&layers, &fonts, self.registry, opts.scale)?;
        warnings.extend(raster.warnings);

        events.progress(90, "Finalizing");
        let bytes = encode(&raster.bitmap, opts.format, template.background_color)?;

        // 100% fires before the delivery side effect; a delivery failure
        // after that still surfaces as the terminal event.
        events.progress(100, "Done");
        let filename = export_filename(&opts.category, records, opts.format);
        let delivered = self.chain.deliver(&bytes, &filename)?;
        tracing::debug!(%filename, size = bytes.len(), "export delivered");

        Ok(ExportOutcome {
            filename,
            delivered,
            width: raster.bitmap.width,
            height: raster.bitmap.height,
            warnings,
        })
    }
}

/// Swap every remote href for its inlined data URI; fetch failures leave
/// an empty href, which renders as an omitted image.
fn inline_hrefs(layers: &mut SceneLayers, inlined: &HashMap<String, String>) {
    let rewrite = |href: &mut String| {
        if href.is_empty() || href.starts_with("data:") {
            return;
        }
        *href = inlined.get(href.as_str()).cloned().unwrap_or_default();
    };

    if let Some(placeholder) = &mut layers.background_placeholder {
        rewrite(placeholder);
        if placeholder.is_empty() {
            layers.background_placeholder = None;
        }
    }
    for element in layers.background.iter_mut().chain(layers.images.iter_mut()) {
        if let ResolvedKind::Image { href, .. } = &mut element.kind {
            rewrite(href);
        }
    }
}

fn export_filename(category: &str, records: &RecordSet, format: ImageFormat) -> String {
    let record_id = records
        .primary()
        .map(|r| r.id.as_str())
        .filter(|id| !id.is_empty())
        .unwrap_or("preview");
    let timestamp = chrono::Utc::now().timestamp_millis();
    format!("{category}-{record_id}-{timestamp}.{}", format.extension())
}
