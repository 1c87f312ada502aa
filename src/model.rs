use crate::types::Color;
use serde::Deserialize;

/// One student row of the roster, consumed read-only. The document
/// number is unique within a batch and is the value encoded in the
/// back-face QR code.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub document_number: String,
    pub names: String,
    pub paternal_last_name: String,
    pub maternal_last_name: String,
    #[serde(default)]
    pub full_name: String,
    pub grade: String,
    pub section: String,
    /// Image source for the portrait: a file path or a data URI.
    /// Absent photos get a generated placeholder avatar.
    #[serde(default)]
    pub photo: Option<String>,
}

impl Student {
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.names
        } else {
            &self.full_name
        }
    }

    pub fn surnames(&self) -> String {
        format!("{} {}", self.paternal_last_name, self.maternal_last_name)
    }
}

/// School stage, derived from the grade label. Drives the header
/// gradient and the grade/section display formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Inicial,
    Primaria,
    Secundaria,
}

impl Level {
    /// Grade labels look like "1er Grado", "3 AÑOS" or "4to Año".
    /// Anything that names neither a numbered primary grade nor an
    /// initial-level age group is a secondary-level year.
    pub fn from_grade(grade: &str) -> Level {
        let lower = grade.to_lowercase();
        if lower.contains("grado") {
            Level::Primaria
        } else if lower.contains("años") {
            Level::Inicial
        } else {
            Level::Secundaria
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Level::Inicial => "Inicial",
            Level::Primaria => "Primaria",
            Level::Secundaria => "Secundaria",
        }
    }
}

/// Two-stop header gradient, deserialized from `{"from": "#rrggbb",
/// "to": "#rrggbb"}`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RawGradientPair")]
pub struct GradientPair {
    pub from: Color,
    pub to: Color,
}

#[derive(Deserialize)]
struct RawGradientPair {
    from: String,
    to: String,
}

impl TryFrom<RawGradientPair> for GradientPair {
    type Error = String;

    fn try_from(raw: RawGradientPair) -> Result<Self, Self::Error> {
        let from = Color::from_hex(&raw.from)
            .ok_or_else(|| format!("invalid gradient color {:?}", raw.from))?;
        let to = Color::from_hex(&raw.to)
            .ok_or_else(|| format!("invalid gradient color {:?}", raw.to))?;
        Ok(GradientPair { from, to })
    }
}

impl GradientPair {
    pub fn new(from: Color, to: Color) -> Self {
        Self { from, to }
    }
}

/// Visual branding parameters for the card template. Never mutated by
/// the pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub institution_name: String,
    pub institution_title: String,
    pub institution_levels: String,
    pub institution_ugel: String,
    pub school_year: u16,
    /// Image source for the header crest/logo.
    pub logo: Option<String>,
    /// Image source for the decorative card background pattern.
    pub pattern: Option<String>,
    pub font_family: String,
    pub gradient_inicial: GradientPair,
    pub gradient_primaria: GradientPair,
    pub gradient_secundaria: GradientPair,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            institution_name: "Institución Educativa N° 6049".to_string(),
            institution_title: "“RICARDO PALMA”".to_string(),
            institution_levels: "INICIAL - PRIMARIA - SECUNDARIA".to_string(),
            institution_ugel: "UGEL 07 - Surquillo".to_string(),
            school_year: 2025,
            logo: None,
            pattern: None,
            font_family: "Chau Philomene One".to_string(),
            gradient_inicial: GradientPair::new(
                Color::from_rgb8(0xe4, 0xca, 0x40),
                Color::from_rgb8(0xd4, 0xb8, 0x28),
            ),
            gradient_primaria: GradientPair::new(
                Color::from_rgb8(0xfc, 0x00, 0x02),
                Color::from_rgb8(0xc6, 0x16, 0x1b),
            ),
            gradient_secundaria: GradientPair::new(
                Color::from_rgb8(0x11, 0x79, 0x82),
                Color::from_rgb8(0x0b, 0x3e, 0x42),
            ),
        }
    }
}

impl Settings {
    pub fn gradient_for(&self, level: Level) -> GradientPair {
        match level {
            Level::Inicial => self.gradient_inicial,
            Level::Primaria => self.gradient_primaria,
            Level::Secundaria => self.gradient_secundaria,
        }
    }
}

/// Zero-padded series label: the digit width follows the batch size,
/// never narrower than three digits.
pub fn series_label(serial: usize, total: usize) -> String {
    let width = total.to_string().len().max(3);
    format!("{:0width$}", serial)
}

/// Display form of grade + section. Numbered grades ("1er Grado",
/// "4to Año") collapse to "1° A"; the token match is case-sensitive so
/// initial-level age groups ("3 AÑOS") pass through unchanged.
pub fn grade_section_display(grade: &str, section: &str) -> String {
    if grade.contains("Grado") || grade.contains("Año") {
        if let Some(first) = grade.chars().next() {
            return format!("{}° {}", first, section);
        }
    }
    grade.to_string()
}
