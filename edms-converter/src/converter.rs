//! Conversion dispatcher.
//!
//! Office documents go through the office tool first; the resulting PDF is
//! kept in the temporary directory under a key derived from the input path,
//! so later pages of the same document reuse it. Everything then goes to the
//! configured image backend.

use crate::backend::{Backend, ConversionRequest, ConverterBackend};
use crate::mimetype::guess_mime_type;
use crate::office::{is_office_mime_type, OfficeConverter};
use crate::process::CommandRunner;
use edms_core::{BackendKind, ConverterError, EdmsConfig, EdmsResult};
use edms_storage::cache_filename;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct Converter {
    backend: Box<dyn ConverterBackend>,
    office: OfficeConverter,
    temporary_directory: PathBuf,
    default_file_format: String,
}

impl Converter {
    pub fn new(
        backend: Box<dyn ConverterBackend>,
        office: OfficeConverter,
        temporary_directory: impl Into<PathBuf>,
        default_file_format: impl Into<String>,
    ) -> Self {
        Converter {
            backend,
            office,
            temporary_directory: temporary_directory.into(),
            default_file_format: default_file_format.into(),
        }
    }

    pub fn from_config(config: &EdmsConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let backend = Backend::from_config(&config.converter, runner.clone());
        let office = OfficeConverter::from_config(&config.converter, &config.temporary_directory, runner);
        Converter::new(
            Box::new(backend),
            office,
            &config.temporary_directory,
            &config.converter.default_file_format,
        )
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn temporary_directory(&self) -> &Path {
        &self.temporary_directory
    }

    /// A first-page request in the default output format.
    pub fn request(&self, input: impl Into<PathBuf>) -> ConversionRequest {
        ConversionRequest::new(input, self.default_file_format.clone())
    }

    /// Render `request` into `output`. `mime_type` is guessed from the input
    /// extension when not given.
    pub fn convert(
        &self,
        request: &ConversionRequest,
        output: &Path,
        mime_type: Option<&str>,
    ) -> EdmsResult<()> {
        match self.office_source(&request.input, mime_type)? {
            Some(pdf) => {
                let request = request.clone().with_input(pdf);
                self.backend.convert(&request, output)
            }
            None => self.backend.convert(request, output),
        }
    }

    pub fn page_count(&self, input: &Path, mime_type: Option<&str>) -> EdmsResult<usize> {
        match self.office_source(input, mime_type)? {
            Some(pdf) => self.backend.page_count(&pdf),
            None => self.backend.page_count(input),
        }
    }

    pub fn identify(&self, input: &Path, arguments: &[String]) -> EdmsResult<String> {
        self.backend.identify(input, arguments)
    }

    pub fn list_formats(&self) -> EdmsResult<Vec<String>> {
        self.backend.list_formats()
    }

    pub fn list_transformations(&self) -> Vec<&'static str> {
        self.backend.list_transformations()
    }

    /// Where the PDF rendition of an office `input` is kept.
    pub fn office_pdf_path(&self, input: &Path) -> PathBuf {
        let no_kwargs: [(&str, &str); 0] = [];
        let key = cache_filename(&input.display().to_string(), &["office"], &no_kwargs);
        self.temporary_directory.join(format!("{}.pdf", key))
    }

    /// PDF to read instead of `input` when it is an office document.
    fn office_source(&self, input: &Path, mime_type: Option<&str>) -> EdmsResult<Option<PathBuf>> {
        let mime_type = mime_type.unwrap_or_else(|| guess_mime_type(input));
        if !is_office_mime_type(mime_type) {
            return Ok(None);
        }

        let pdf = self.office_pdf_path(input);
        if pdf.exists() {
            debug!(input = %input.display(), pdf = %pdf.display(), "reusing office conversion");
            return Ok(Some(pdf));
        }
        fs::create_dir_all(&self.temporary_directory).map_err(|e| ConverterError::OfficeBackend {
            detail: format!("{}: {}", self.temporary_directory.display(), e),
        })?;
        self.office.convert(input, &pdf, mime_type)?;
        Ok(Some(pdf))
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("backend", &self.backend.kind())
            .field("office", &self.office)
            .field("temporary_directory", &self.temporary_directory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandRunner, Invocation, ProcessOutput, ScriptedRunner};
    use crate::transformation::Transformation;
    use edms_core::{EdmsError, OfficeTool};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn setup(dir: &Path) -> (Converter, Arc<ScriptedRunner>) {
        let config = EdmsConfig::defaults_for(dir);
        let runner = Arc::new(ScriptedRunner::new());
        (Converter::from_config(&config, runner.clone()), runner)
    }

    #[test]
    fn test_image_goes_straight_to_backend() {
        let dir = tempfile::tempdir().unwrap();
        let (converter, runner) = setup(dir.path());
        runner.push(ProcessOutput::ok(""));

        let request = converter
            .request("/docs/scan.png")
            .with_transformation(Transformation::Zoom { percent: 25 });
        converter
            .convert(&request, Path::new("/tmp/out"), None)
            .unwrap();

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].program, PathBuf::from("/usr/bin/convert"));
        assert_eq!(
            invocations[0].args,
            vec!["/docs/scan.png[0]", "-resize", "25%", "-quality", "85", "jpeg:/tmp/out"]
        );
    }

    #[test]
    fn test_office_document_converted_once() {
        let dir = tempfile::tempdir().unwrap();
        let (converter, runner) = setup(dir.path());
        let input = dir.path().join("letter.odt");
        fs::write(&input, b"odt").unwrap();

        runner.push_creating(b"%PDF".to_vec());
        runner.push(ProcessOutput::ok(""));
        runner.push(ProcessOutput::ok(""));

        let first = converter.request(&input);
        let second = converter.request(&input).with_page(2);
        converter.convert(&first, &dir.path().join("p1"), None).unwrap();
        converter.convert(&second, &dir.path().join("p2"), None).unwrap();

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 3);
        assert_eq!(invocations[0].program, PathBuf::from("/usr/bin/libreoffice"));
        let pdf = converter.office_pdf_path(&input);
        assert!(pdf.exists());
        assert_eq!(invocations[1].args[0], format!("{}[0]", pdf.display()));
        assert_eq!(invocations[2].args[0], format!("{}[1]", pdf.display()));
    }

    #[test]
    fn test_explicit_mime_type_wins() {
        let dir = tempfile::tempdir().unwrap();
        let (converter, runner) = setup(dir.path());
        runner.push(ProcessOutput::ok(""));
        // An .odt extension, declared as an image.
        converter
            .convert(&converter.request("/docs/x.odt"), Path::new("/tmp/out"), Some("image/png"))
            .unwrap();
        assert_eq!(runner.invocations()[0].program, PathBuf::from("/usr/bin/convert"));
    }

    #[test]
    fn test_office_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let (converter, runner) = setup(dir.path());
        runner.push(ProcessOutput::failed(1, "Error: source file could not be loaded\n"));
        let err = converter
            .convert(&converter.request("/docs/x.doc"), Path::new("/tmp/out"), None)
            .unwrap_err();
        assert!(matches!(
            err,
            EdmsError::Converter(ConverterError::OfficeConversion { .. })
        ));
        assert!(!converter.office_pdf_path(Path::new("/docs/x.doc")).exists());
    }

    #[test]
    fn test_page_count_of_office_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EdmsConfig::defaults_for(dir.path());
        config.converter.office_tool = OfficeTool::Unoconv;
        let runner = Arc::new(ScriptedRunner::new());
        let converter = Converter::from_config(&config, runner.clone());

        runner.push_creating(b"%PDF".to_vec());
        runner.push(ProcessOutput::ok("p[0]\np[1]\np[2]\n"));
        assert_eq!(converter.page_count(Path::new("/docs/deck.pptx"), None).unwrap(), 3);
        assert_eq!(runner.invocations()[0].program, PathBuf::from("/usr/bin/unoconv"));
    }

    #[test]
    fn test_list_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let (converter, runner) = setup(dir.path());
        runner.push(ProcessOutput::ok("      TIFF* TIFF      rw+   Tagged Image File Format\n"));
        assert_eq!(converter.list_formats().unwrap(), vec!["TIFF"]);
        assert_eq!(converter.list_transformations().len(), Transformation::NAMES.len());
        assert_eq!(converter.backend_kind(), BackendKind::ImageMagick);
    }

    /// Runs the script, but the first call reports a crash after writing.
    struct CrashOnceRunner {
        inner: ScriptedRunner,
        crashed: AtomicBool,
    }

    impl CommandRunner for CrashOnceRunner {
        fn run(&self, invocation: &Invocation) -> EdmsResult<ProcessOutput> {
            let output = self.inner.run(invocation)?;
            if self.crashed.swap(true, Ordering::SeqCst) {
                Ok(output)
            } else {
                Ok(ProcessOutput::failed(1, "unoconv: connection lost\n"))
            }
        }
    }

    #[test]
    fn test_partial_office_output_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EdmsConfig::defaults_for(dir.path());
        config.converter.office_tool = OfficeTool::Unoconv;
        let runner = Arc::new(CrashOnceRunner {
            inner: ScriptedRunner::new(),
            crashed: AtomicBool::new(false),
        });
        let converter = Converter::from_config(&config, runner.clone());
        let input = dir.path().join("deck.pptx");
        fs::write(&input, b"pptx").unwrap();
        let request = converter.request(&input);

        runner.inner.push_creating(b"%PD".to_vec());
        assert!(converter.convert(&request, &dir.path().join("p1"), None).is_err());
        assert!(!converter.office_pdf_path(&input).exists());

        runner.inner.push_creating(b"%PDF-1.7".to_vec());
        runner.inner.push(ProcessOutput::ok(""));
        converter.convert(&request, &dir.path().join("p1"), None).unwrap();

        let invocations = runner.inner.invocations();
        assert_eq!(invocations.len(), 3);
        assert_eq!(invocations[1].program, PathBuf::from("/usr/bin/unoconv"));
        assert_eq!(fs::read(converter.office_pdf_path(&input)).unwrap(), b"%PDF-1.7");
    }
}
