//! Batch student ID-card (carnet) generation.
//!
//! The pipeline renders each student's card faces (front with the
//! portrait, back with a QR code over the document number) at a fixed
//! print resolution, tiles them two-up in five rows per A4 page, and
//! assembles a single multi-page PDF.
//!
//! ```no_run
//! use carnetpress::{CarnetPress, Settings, Student};
//!
//! # fn run(students: Vec<Student>) -> Result<(), carnetpress::CarnetPressError> {
//! let mut press = CarnetPress::builder()
//!     .register_font_dir("assets/fonts")
//!     .build()?;
//! let settings = Settings::default();
//! if let Some(path) = press.generate_to_dir(&students, &settings, "out")? {
//!     println!("wrote {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

mod assets;
mod canvas;
mod card;
mod error;
mod font;
mod layout;
mod model;
mod pdf;
mod qr;
mod raster;
mod types;

pub use assets::ImageStore;
pub use canvas::{Canvas, Command, Scene, TextAnchor, TextSpan};
pub use card::{CARD_HEIGHT_PX, CARD_WIDTH_PX, CardFace, CardSpec, scene};
pub use error::CarnetPressError;
pub use font::FontRegistry;
pub use layout::{CardGeometry, ROWS_PER_PAGE, SlotPosition};
pub use model::{
    GradientPair, Level, Settings, Student, grade_section_display, series_label,
};
pub use pdf::{CardSlot, PagePlan, assemble};
pub use raster::{FaceRenderer, RenderedFace, SceneRasterizer};
pub use types::{Color, Pt, ShadingStop, Size};

use chrono::NaiveDate;
use log::info;
use std::path::{Path, PathBuf};

/// The batch generator. Fonts are registered once at build time; image
/// sources (logo, pattern, portraits) are decoded up front at the
/// start of each batch behind an explicit readiness barrier.
pub struct CarnetPress {
    fonts: FontRegistry,
    images: ImageStore,
}

#[derive(Debug, Clone, Default)]
pub struct CarnetPressBuilder {
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
}

impl CarnetPressBuilder {
    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    pub fn build(self) -> Result<CarnetPress, CarnetPressError> {
        let mut fonts = FontRegistry::new();
        for dir in &self.font_dirs {
            fonts.register_dir(dir);
        }
        for file in &self.font_files {
            fonts.register_file(file);
        }
        Ok(CarnetPress {
            fonts,
            images: ImageStore::new(),
        })
    }
}

impl CarnetPress {
    pub fn builder() -> CarnetPressBuilder {
        CarnetPressBuilder::default()
    }

    /// Registers raw image bytes (PNG/JPEG) under an id that settings
    /// or roster photo fields can then reference as a source.
    pub fn insert_image_bytes(
        &mut self,
        id: impl Into<String>,
        bytes: &[u8],
    ) -> Result<(), CarnetPressError> {
        self.images.insert_bytes(id, bytes)
    }

    /// Generates the carnet batch PDF. An empty roster is not an
    /// error: the call returns `Ok(None)` without touching fonts,
    /// images or the filesystem.
    ///
    /// Everything else runs to completion or fails as a whole: there
    /// is no per-card recovery and no partial document.
    pub fn generate(
        &mut self,
        students: &[Student],
        settings: &Settings,
    ) -> Result<Option<Vec<u8>>, CarnetPressError> {
        if students.is_empty() {
            info!("empty roster, skipping carnet generation");
            return Ok(None);
        }

        // Readiness barriers, once per batch: fonts first, then every
        // image source the batch will reference, decoded up front.
        self.fonts.ensure_ready(&[settings.font_family.as_str()])?;
        let mut sources: Vec<&str> = Vec::new();
        sources.extend(settings.logo.as_deref());
        sources.extend(settings.pattern.as_deref());
        sources.extend(students.iter().filter_map(|s| s.photo.as_deref()));
        self.images.ensure_loaded(sources)?;

        let geometry = CardGeometry::a4();
        let mut renderer = SceneRasterizer::new(&self.fonts, &self.images)?;
        let bytes = pdf::assemble(students, settings, &mut renderer, &geometry)?;

        info!(
            "generated {} bytes of carnet PDF for {} students ({} pages)",
            bytes.len(),
            students.len(),
            students.len().div_ceil(ROWS_PER_PAGE)
        );
        Ok(Some(bytes))
    }

    /// Generates the batch and writes it into `dir` under the dated
    /// filename. The file is written only after the whole document has
    /// been assembled, so no partial PDF is ever exposed.
    pub fn generate_to_dir(
        &mut self,
        students: &[Student],
        settings: &Settings,
        dir: impl AsRef<Path>,
    ) -> Result<Option<PathBuf>, CarnetPressError> {
        let Some(bytes) = self.generate(students, settings)? else {
            return Ok(None);
        };
        let path = dir
            .as_ref()
            .join(output_filename(chrono::Local::now().date_naive()));
        std::fs::write(&path, bytes)?;
        info!("wrote {}", path.display());
        Ok(Some(path))
    }
}

/// Download filename contract: the generation date, not per-student
/// data. Repeated runs on one day overwrite each other.
pub fn output_filename(date: NaiveDate) -> String {
    format!("Carnets_Estudiantes_{}.pdf", date.format("%Y-%m-%d"))
}
