//! Typed option records parsed from form fields.
//!
//! Every enumeration and range is checked here, once, before a transform
//! sees it. Page indices are resolved later against the loaded document
//! because only then is the page count known.

use std::collections::BTreeSet;
use std::str::FromStr;

use thiserror::Error;

use crate::transform::TransformError;

/// A malformed option value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct OptionError(pub String);

impl OptionError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

/// Parse a JSON array of 1-based page numbers.
pub fn parse_page_list(raw: &str) -> Result<Vec<i64>, OptionError> {
    serde_json::from_str::<Vec<i64>>(raw.trim())
        .map_err(|_| OptionError::new("Invalid pages format. Must be JSON array."))
}

/// Which pages an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageSelection {
    #[default]
    All,
    First,
    Last,
    Specific(Vec<i64>),
}

impl FromStr for PageSelection {
    type Err = OptionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(PageSelection::All),
            "first" => Ok(PageSelection::First),
            "last" => Ok(PageSelection::Last),
            _ => parse_page_list(raw)
                .map(PageSelection::Specific)
                .map_err(|_| OptionError::new("Invalid pages format. Use 'all', 'first', 'last', or JSON array.")),
        }
    }
}

impl PageSelection {
    /// 1-based page numbers in document order, without duplicates.
    pub fn resolve(&self, total: usize) -> Result<Vec<u32>, TransformError> {
        match self {
            PageSelection::All => Ok((1..=total as u32).collect()),
            PageSelection::First | PageSelection::Last if total == 0 => {
                Err(TransformError::EmptyResult("PDF has no pages".into()))
            }
            PageSelection::First => Ok(vec![1]),
            PageSelection::Last => Ok(vec![total as u32]),
            PageSelection::Specific(pages) => {
                check_pages(pages, total)?;
                let unique: BTreeSet<u32> = pages.iter().map(|p| *p as u32).collect();
                Ok(unique.into_iter().collect())
            }
        }
    }
}

/// Every page must lie in `[1, total]`.
pub fn check_pages(pages: &[i64], total: usize) -> Result<(), TransformError> {
    match pages.iter().find(|p| **p < 1 || **p > total as i64) {
        Some(page) => Err(TransformError::PageOutOfRange { page: *page, total }),
        None => Ok(()),
    }
}

/// Clockwise rotation applied on top of the page's current rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation(i64);

impl Rotation {
    const ALLOWED: [i64; 6] = [90, 180, 270, -90, -180, -270];

    pub fn degrees(self) -> i64 {
        self.0
    }

    /// New `/Rotate` value for a page currently at `current` degrees.
    pub fn apply_to(self, current: i64) -> i64 {
        (current + self.0).rem_euclid(360)
    }
}

impl TryFrom<i64> for Rotation {
    type Error = OptionError;

    fn try_from(degrees: i64) -> Result<Self, Self::Error> {
        if Self::ALLOWED.contains(&degrees) {
            Ok(Rotation(degrees))
        } else {
            Err(OptionError::new(
                "Degrees must be one of [90, 180, 270, -90, -180, -270]",
            ))
        }
    }
}

/// Compression preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityPreset {
    /// JPEG quality for re-encoding embedded photos, if any.
    pub fn jpeg_quality(self) -> Option<u8> {
        match self {
            QualityPreset::Low => Some(60),
            QualityPreset::Medium => Some(75),
            QualityPreset::High => None,
        }
    }
}

impl FromStr for QualityPreset {
    type Err = OptionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(QualityPreset::Low),
            "medium" | "" => Ok(QualityPreset::Medium),
            "high" => Ok(QualityPreset::High),
            _ => Err(OptionError::new("Invalid quality. Must be one of: low, medium, high")),
        }
    }
}

/// How a document is split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitMode {
    Range { start: i64, end: i64 },
    EveryN(usize),
    Specific(Vec<i64>),
}

impl SplitMode {
    /// Build from the raw `mode` field and its companions.
    pub fn parse(
        mode: &str,
        start: Option<i64>,
        end: Option<i64>,
        n_pages: Option<i64>,
        pages: Option<&str>,
    ) -> Result<Self, OptionError> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "range" => match (start, end) {
                (Some(start), Some(end)) if start <= end => Ok(SplitMode::Range { start, end }),
                (Some(_), Some(_)) => Err(OptionError::new("start must not be greater than end")),
                _ => Err(OptionError::new("start and end required for range mode")),
            },
            "every_n" => match n_pages {
                Some(n) if n >= 1 => Ok(SplitMode::EveryN(n as usize)),
                _ => Err(OptionError::new("n_pages must be >= 1")),
            },
            "specific" => {
                let pages = pages
                    .map(parse_page_list)
                    .transpose()?
                    .filter(|pages| !pages.is_empty())
                    .ok_or_else(|| OptionError::new("pages required for specific mode"))?;
                Ok(SplitMode::Specific(pages))
            }
            _ => Err(OptionError::new("Invalid mode. Must be one of: range, every_n, specific")),
        }
    }
}

/// Anchor of a text watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatermarkPosition {
    Center,
    #[default]
    Diagonal,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl FromStr for WatermarkPosition {
    type Err = OptionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "center" => Ok(WatermarkPosition::Center),
            "diagonal" | "" => Ok(WatermarkPosition::Diagonal),
            "top-left" => Ok(WatermarkPosition::TopLeft),
            "top-right" => Ok(WatermarkPosition::TopRight),
            "bottom-left" => Ok(WatermarkPosition::BottomLeft),
            "bottom-right" => Ok(WatermarkPosition::BottomRight),
            _ => Err(OptionError::new(
                "Invalid position. Must be one of: center, diagonal, top-left, top-right, bottom-left, bottom-right",
            )),
        }
    }
}

/// An RGB color with components in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl FromStr for Color {
    type Err = OptionError;

    /// Accepts `#RRGGBB` or `RRGGBB`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let hex = raw.trim().trim_start_matches('#');
        let invalid = || OptionError::new("Invalid color. Use hex format like #808080");
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map(|v| f32::from(v) / 255.0)
                .map_err(|_| invalid())
        };
        Ok(Color {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

/// A right granted to holders of the user password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Print,
    Copy,
    Edit,
    Annotate,
    FillForms,
    Extract,
}

impl FromStr for Permission {
    type Err = OptionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "print" => Ok(Permission::Print),
            "copy" => Ok(Permission::Copy),
            "edit" => Ok(Permission::Edit),
            "annotate" => Ok(Permission::Annotate),
            "fill_forms" => Ok(Permission::FillForms),
            "extract" => Ok(Permission::Extract),
            other => Err(OptionError::new(format!(
                "Invalid permission: {other}. Must be one of: print, copy, edit, annotate, fill_forms, extract"
            ))),
        }
    }
}

/// Parse the optional JSON list of permission names.
pub fn parse_permissions(raw: Option<&str>) -> Result<Vec<Permission>, OptionError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Vec::new());
    };
    let names: Vec<String> = serde_json::from_str(raw)
        .map_err(|_| OptionError::new("Invalid permissions format. Must be JSON array."))?;
    names.iter().map(|name| name.parse()).collect()
}

/// Check `value` against an inclusive range.
pub fn in_range<T>(field: &str, value: T, min: T, max: T) -> Result<T, OptionError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        Err(OptionError::new(format!("{field} must be between {min} and {max}")))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_selection_variants() {
        assert_eq!("all".parse::<PageSelection>().unwrap(), PageSelection::All);
        assert_eq!("First".parse::<PageSelection>().unwrap(), PageSelection::First);
        assert_eq!("last".parse::<PageSelection>().unwrap(), PageSelection::Last);
        assert_eq!(
            "[3, 1]".parse::<PageSelection>().unwrap(),
            PageSelection::Specific(vec![3, 1])
        );
        assert!("odd".parse::<PageSelection>().is_err());
    }

    #[test]
    fn page_selection_resolves_against_count() {
        assert_eq!(PageSelection::All.resolve(3).unwrap(), vec![1, 2, 3]);
        assert_eq!(PageSelection::Last.resolve(3).unwrap(), vec![3]);
        assert_eq!(PageSelection::Specific(vec![3, 1, 3]).resolve(3).unwrap(), vec![1, 3]);

        let err = PageSelection::Specific(vec![4]).resolve(3).unwrap_err();
        assert_eq!(err.to_string(), "Page 4 is out of range. PDF has 3 pages.");
        assert!(PageSelection::Specific(vec![0]).resolve(3).is_err());
    }

    #[test]
    fn rotation_is_relative_and_normalized() {
        let quarter = Rotation::try_from(90).unwrap();
        assert_eq!(quarter.apply_to(0), 90);
        assert_eq!(quarter.apply_to(270), 0);
        assert_eq!(Rotation::try_from(-90).unwrap().apply_to(0), 270);
        assert!(Rotation::try_from(45).is_err());
        assert!(Rotation::try_from(360).is_err());
    }

    #[test]
    fn quality_presets() {
        assert_eq!("LOW".parse::<QualityPreset>().unwrap().jpeg_quality(), Some(60));
        assert_eq!("medium".parse::<QualityPreset>().unwrap().jpeg_quality(), Some(75));
        assert_eq!("high".parse::<QualityPreset>().unwrap().jpeg_quality(), None);
        assert!("ultra".parse::<QualityPreset>().is_err());
    }

    #[test]
    fn split_modes() {
        assert_eq!(
            SplitMode::parse("range", Some(1), Some(2), None, None).unwrap(),
            SplitMode::Range { start: 1, end: 2 }
        );
        assert_eq!(
            SplitMode::parse("every_n", None, None, Some(2), None).unwrap(),
            SplitMode::EveryN(2)
        );
        assert_eq!(
            SplitMode::parse("specific", None, None, None, Some("[2,4]")).unwrap(),
            SplitMode::Specific(vec![2, 4])
        );
        assert!(SplitMode::parse("range", Some(1), None, None, None).is_err());
        assert!(SplitMode::parse("every_n", None, None, Some(0), None).is_err());
        assert!(SplitMode::parse("specific", None, None, None, Some("[]")).is_err());
        assert!(SplitMode::parse("halves", None, None, None, None).is_err());
    }

    #[test]
    fn colors() {
        let grey: Color = "#808080".parse().unwrap();
        assert!((grey.r - 128.0 / 255.0).abs() < f32::EPSILON);
        assert!("ff0000".parse::<Color>().is_ok());
        assert!("#80808".parse::<Color>().is_err());
        assert!("#zzzzzz".parse::<Color>().is_err());
    }

    #[test]
    fn permissions() {
        assert!(parse_permissions(None).unwrap().is_empty());
        assert_eq!(
            parse_permissions(Some(r#"["print","fill_forms"]"#)).unwrap(),
            vec![Permission::Print, Permission::FillForms]
        );
        assert!(parse_permissions(Some(r#"["teleport"]"#)).is_err());
        assert!(parse_permissions(Some("print")).is_err());
    }

    #[test]
    fn ranges() {
        assert_eq!(in_range("font_size", 12, 6, 72).unwrap(), 12);
        assert_eq!(
            in_range("opacity", 1.5, 0.0, 1.0).unwrap_err().to_string(),
            "opacity must be between 0 and 1"
        );
    }
}
