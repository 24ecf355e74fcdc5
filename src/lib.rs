//! matchcard turns structured game data and declarative visual templates
//! into finished social-media raster graphics.
//!
//! The pipeline is staged: a [`Template`] is bound against a
//! [`RecordSet`], the resolved scene is split into background, image and
//! text layers, remote resources are fetched and inlined, each layer is
//! rasterized and composited in order, and the encoded image is handed to
//! a delivery chain.
//!
//! ```no_run
//! use matchcard::{
//!     DeliveryChain, ExportEvents, ExportOptions, Exporter, GameField, GameRecord, RecordSet,
//!     Template,
//! };
//!
//! # async fn demo(template_json: &str) -> matchcard::MatchcardResult<()> {
//! let template = Template::from_json(template_json)?;
//! let record = GameRecord::new("4711")
//!     .with(GameField::TeamHome, "FC Example")
//!     .with(GameField::TeamAway, "SV Sample");
//!
//! let exporter = Exporter::new(DeliveryChain::download_to("out"));
//! let outcome = exporter
//!     .export(
//!         &template,
//!         &RecordSet::single(record),
//!         &ExportOptions::default(),
//!         &ExportEvents::discard(),
//!     )
//!     .await?;
//! println!("wrote {}", outcome.filename);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod binding;
pub mod delivery;
pub mod encode;
pub mod error;
pub mod export;
pub mod fetch;
pub mod fonts;
pub mod layers;
pub mod model;
pub mod record;
pub mod render;

pub use binding::{BindingOutcome, FieldRef, ResolvedTemplate, resolve_template};
pub use delivery::{Delivered, DeliveryChain, DeliverySink};
pub use encode::{ImageFormat, encode};
pub use error::{MatchcardError, MatchcardResult};
pub use export::{
    ExportEvent, ExportEvents, ExportOptions, ExportOutcome, Exporter, ResourceState,
    ResourceStatus,
};
pub use fetch::{FetchedResource, FetcherConfig, ResourceFetcher};
pub use fonts::{FontFaceBlock, FontRegistry};
pub use layers::{SceneLayers, separate};
pub use model::{Color, Element, ElementKind, Template, TemplateFormat, TextAnchor, TextStyle};
pub use record::{GameField, GameRecord, RecordSet};
pub use render::{Bitmap, RasterOutput, rasterize};
