//! Image conversion backends.
//!
//! [`ConverterBackend`] is the capability set every backend offers.
//! [`Backend`] is the closed set of backends the configuration can select;
//! both build their command lines through [`convert_arguments`].

mod graphicsmagick;
mod imagemagick;

pub use graphicsmagick::GraphicsMagick;
pub use imagemagick::ImageMagick;

use crate::process::CommandRunner;
use crate::transformation::Transformation;
use edms_core::{BackendKind, ConverterConfig, ConverterError, EdmsError, EdmsResult, EnumParseError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

// ============================================================================
// REQUEST
// ============================================================================

/// Rendering quality, expressed as the density used to rasterise the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    #[default]
    Default,
    Low,
    High,
    Print,
}

impl QualityPreset {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            QualityPreset::Default => "default",
            QualityPreset::Low => "low",
            QualityPreset::High => "high",
            QualityPreset::Print => "print",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(QualityPreset::Default),
            "low" => Ok(QualityPreset::Low),
            "high" => Ok(QualityPreset::High),
            "print" => Ok(QualityPreset::Print),
            _ => Err(EnumParseError {
                enum_name: "quality preset",
                value: s.to_string(),
            }),
        }
    }

    /// Read density in DPI, `None` for the tool default.
    pub fn density(&self) -> Option<u32> {
        match self {
            QualityPreset::Default => None,
            QualityPreset::Low => Some(72),
            QualityPreset::High => Some(400),
            QualityPreset::Print => Some(500),
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for QualityPreset {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// What to render: one page of `input`, transformed, in `file_format`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub file_format: String,
    /// 1-based page number.
    pub page: u32,
    pub transformations: Vec<Transformation>,
    pub quality: QualityPreset,
}

impl ConversionRequest {
    pub fn new(input: impl Into<PathBuf>, file_format: impl Into<String>) -> Self {
        ConversionRequest {
            input: input.into(),
            file_format: file_format.into(),
            page: 1,
            transformations: Vec::new(),
            quality: QualityPreset::Default,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_transformation(mut self, transformation: Transformation) -> Self {
        self.transformations.push(transformation);
        self
    }

    pub fn with_transformations(mut self, transformations: impl IntoIterator<Item = Transformation>) -> Self {
        self.transformations.extend(transformations);
        self
    }

    pub fn with_quality(mut self, quality: QualityPreset) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = input.into();
        self
    }

    fn is_jpeg(&self) -> bool {
        matches!(self.file_format.to_lowercase().as_str(), "jpeg" | "jpg")
    }
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// Operations a conversion backend offers.
pub trait ConverterBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Raw `identify` output for `input`.
    fn identify(&self, input: &Path, arguments: &[String]) -> EdmsResult<String>;

    /// Render `request` into `output`.
    fn convert(&self, request: &ConversionRequest, output: &Path) -> EdmsResult<()>;

    /// Format names the tool can handle.
    fn list_formats(&self) -> EdmsResult<Vec<String>>;

    fn list_transformations(&self) -> Vec<&'static str> {
        Transformation::NAMES.to_vec()
    }

    /// One identify line per page. Input identify cannot read is an
    /// unknown format.
    fn page_count(&self, input: &Path) -> EdmsResult<usize> {
        match self.identify(input, &[]) {
            Ok(stdout) => Ok(stdout.lines().filter(|l| !l.trim().is_empty()).count()),
            Err(EdmsError::Converter(ConverterError::Identify { detail })) => {
                Err(ConverterError::UnknownFormat { detail }.into())
            }
            Err(other) => Err(other),
        }
    }
}

// ============================================================================
// SHARED ARGUMENT BUILDING
// ============================================================================

/// Arguments for a magick `convert`, without the program itself.
///
/// Shape: `[quality] input[page-1] [transformations] [-quality N] format:output`.
pub fn convert_arguments(request: &ConversionRequest, output: &Path, jpeg_quality: u8) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(dpi) = request.quality.density() {
        args.push("-density".to_string());
        args.push(dpi.to_string());
    }

    args.push(format!(
        "{}[{}]",
        request.input.display(),
        request.page.max(1) - 1
    ));

    for transformation in &request.transformations {
        push_transformation(&mut args, transformation);
    }

    if request.is_jpeg() {
        args.push("-quality".to_string());
        args.push(jpeg_quality.to_string());
    }

    args.push(format!("{}:{}", request.file_format, output.display()));
    args
}

fn push_transformation(args: &mut Vec<String>, transformation: &Transformation) {
    match *transformation {
        Transformation::Resize { width, height } => {
            args.push("-resize".to_string());
            args.push(match height {
                Some(height) => format!("{}x{}", width, height),
                None => width.to_string(),
            });
        }
        Transformation::Zoom { percent } => {
            args.push("-resize".to_string());
            args.push(format!("{}%", percent));
        }
        Transformation::Rotate { degrees } => {
            args.push("-rotate".to_string());
            args.push(degrees.to_string());
        }
        Transformation::Density { dpi } => {
            args.push("-density".to_string());
            args.push(dpi.to_string());
        }
        Transformation::Crop {
            left,
            top,
            right,
            bottom,
        } => {
            args.extend(
                [
                    "-gravity".to_string(),
                    "NorthWest".to_string(),
                    "-chop".to_string(),
                    format!("{}x{}", left, top),
                    "-gravity".to_string(),
                    "SouthEast".to_string(),
                    "-chop".to_string(),
                    format!("{}x{}", right, bottom),
                    "+gravity".to_string(),
                ],
            );
        }
    }
}

static FORMAT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Z0-9]+)\*?\s+([A-Z0-9]+)\s+([rw+-]+)\s*(.*)$").expect("valid regex")
});

/// First column of every line of a `-list format` table.
pub fn parse_format_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| FORMAT_LINE.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

// ============================================================================
// BACKEND SELECTION
// ============================================================================

/// The backend chosen by `converter.backend`.
pub enum Backend {
    ImageMagick(ImageMagick),
    GraphicsMagick(GraphicsMagick),
}

impl Backend {
    pub fn from_config(config: &ConverterConfig, runner: Arc<dyn CommandRunner>) -> Self {
        match config.backend {
            BackendKind::ImageMagick => Backend::ImageMagick(ImageMagick::new(
                &config.im_convert_path,
                &config.im_identify_path,
                config.jpeg_quality,
                runner,
            )),
            BackendKind::GraphicsMagick => Backend::GraphicsMagick(GraphicsMagick::new(
                &config.gm_path,
                config.jpeg_quality,
                runner,
            )),
        }
    }

    fn inner(&self) -> &dyn ConverterBackend {
        match self {
            Backend::ImageMagick(backend) => backend,
            Backend::GraphicsMagick(backend) => backend,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Backend").field(&self.kind()).finish()
    }
}

impl ConverterBackend for Backend {
    fn kind(&self) -> BackendKind {
        self.inner().kind()
    }

    fn identify(&self, input: &Path, arguments: &[String]) -> EdmsResult<String> {
        self.inner().identify(input, arguments)
    }

    fn convert(&self, request: &ConversionRequest, output: &Path) -> EdmsResult<()> {
        self.inner().convert(request, output)
    }

    fn list_formats(&self) -> EdmsResult<Vec<String>> {
        self.inner().list_formats()
    }

    fn list_transformations(&self) -> Vec<&'static str> {
        self.inner().list_transformations()
    }

    fn page_count(&self, input: &Path) -> EdmsResult<usize> {
        self.inner().page_count(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessOutput, ScriptedRunner};
    use edms_core::EdmsConfig;

    fn request() -> ConversionRequest {
        ConversionRequest::new("/docs/a.pdf", "jpeg").with_page(3)
    }

    #[test]
    fn test_quality_preset_densities() {
        assert_eq!(QualityPreset::Default.density(), None);
        assert_eq!(QualityPreset::Low.density(), Some(72));
        assert_eq!(QualityPreset::High.density(), Some(400));
        assert_eq!(QualityPreset::Print.density(), Some(500));
        assert_eq!("PRINT".parse::<QualityPreset>().unwrap(), QualityPreset::Print);
        assert!("ultra".parse::<QualityPreset>().is_err());
    }

    #[test]
    fn test_convert_arguments_minimal() {
        let args = convert_arguments(&request(), Path::new("/tmp/out"), 85);
        assert_eq!(args, vec!["/docs/a.pdf[2]", "-quality", "85", "jpeg:/tmp/out"]);
    }

    #[test]
    fn test_convert_arguments_keep_transformation_order() {
        let request = request()
            .with_quality(QualityPreset::High)
            .with_transformation(Transformation::rotate(90))
            .with_transformation(Transformation::Resize {
                width: 640,
                height: Some(480),
            })
            .with_transformation(Transformation::Zoom { percent: 50 });
        let args = convert_arguments(&request, Path::new("/tmp/out"), 70);
        assert_eq!(
            args,
            vec![
                "-density",
                "400",
                "/docs/a.pdf[2]",
                "-rotate",
                "90",
                "-resize",
                "640x480",
                "-resize",
                "50%",
                "-quality",
                "70",
                "jpeg:/tmp/out"
            ]
        );
    }

    #[test]
    fn test_convert_arguments_crop_and_png() {
        let request = ConversionRequest::new("/docs/a.png", "png").with_transformation(Transformation::Crop {
            left: 10,
            top: 20,
            right: 30,
            bottom: 40,
        });
        let args = convert_arguments(&request, Path::new("/tmp/out"), 85);
        assert_eq!(
            args,
            vec![
                "/docs/a.png[0]",
                "-gravity",
                "NorthWest",
                "-chop",
                "10x20",
                "-gravity",
                "SouthEast",
                "-chop",
                "30x40",
                "+gravity",
                "png:/tmp/out"
            ]
        );
    }

    #[test]
    fn test_page_zero_is_first_page() {
        let request = ConversionRequest::new("/docs/a.pdf", "png").with_page(0);
        assert_eq!(request.page, 1);
    }

    #[test]
    fn test_parse_format_list() {
        let stdout = "   Format  Module    Mode  Description\n\
                      -------------------------------------------------\n\
                      \x20     3FR  DNG       r--   Hasselblad CFV/H3D39II\n\
                      \x20     PDF* PDF       rw+   Portable Document Format\n\
                      \x20    JPEG* JPEG      rw-   Joint Photographic Experts Group JFIF format\n\
                      \n";
        assert_eq!(parse_format_list(stdout), vec!["3FR", "PDF", "JPEG"]);
    }

    #[test]
    fn test_backend_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EdmsConfig::defaults_for(dir.path()).converter;
        let runner = Arc::new(ScriptedRunner::new());

        let backend = Backend::from_config(&config, runner.clone());
        assert_eq!(backend.kind(), BackendKind::ImageMagick);

        config.backend = BackendKind::GraphicsMagick;
        let backend = Backend::from_config(&config, runner.clone());
        assert_eq!(backend.kind(), BackendKind::GraphicsMagick);

        runner.push(ProcessOutput::ok("a.pdf[0] PDF\na.pdf[1] PDF\n"));
        assert_eq!(backend.page_count(Path::new("a.pdf")).unwrap(), 2);
        assert_eq!(runner.invocations()[0].args, vec!["identify", "a.pdf"]);
    }
}
