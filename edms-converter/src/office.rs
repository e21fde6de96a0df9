//! Office documents to PDF through LibreOffice or unoconv.

use crate::process::{CommandRunner, Invocation};
use edms_core::{ConverterConfig, ConverterError, EdmsResult, OfficeTool};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// MIME types handed to the office tool before rasterising.
pub const OFFICE_MIME_TYPES: &[&str] = &[
    "application/msword",
    "application/mswrite",
    "application/mspowerpoint",
    "application/msexcel",
    "application/pgp-keys",
    "application/vnd.ms-excel",
    "application/vnd.ms-excel.addin.macroEnabled.12",
    "application/vnd.ms-excel.sheet.binary.macroEnabled.12",
    "application/vnd.ms-powerpoint",
    "application/vnd.oasis.opendocument.chart",
    "application/vnd.oasis.opendocument.chart-template",
    "application/vnd.oasis.opendocument.formula",
    "application/vnd.oasis.opendocument.formula-template",
    "application/vnd.oasis.opendocument.graphics",
    "application/vnd.oasis.opendocument.graphics-template",
    "application/vnd.oasis.opendocument.image",
    "application/vnd.oasis.opendocument.image-template",
    "application/vnd.oasis.opendocument.presentation",
    "application/vnd.oasis.opendocument.presentation-template",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.template",
    "application/vnd.openxmlformats-officedocument.presentationml.template",
    "application/vnd.openxmlformats-officedocument.presentationml.slideshow",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.openxmlformats-officedocument.presentationml.slide",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.template",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.oasis.opendocument.spreadsheet-template",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.text-master",
    "application/vnd.oasis.opendocument.text-template",
    "application/vnd.oasis.opendocument.text-web",
    "application/vnd.ms-office",
    "application/xml",
    "text/x-c",
    "text/x-c++",
    "text/x-pascal",
    "text/x-msdos-batch",
    "text/x-python",
    "text/x-shellscript",
    "text/plain",
    "text/rtf",
];

const TEXT_PLAIN_FILTER: &str = "--infilter=Text (encoded):UTF8,LF,,,";

pub fn is_office_mime_type(mime_type: &str) -> bool {
    OFFICE_MIME_TYPES.contains(&mime_type)
}

fn backend_error(detail: impl fmt::Display) -> ConverterError {
    ConverterError::OfficeBackend {
        detail: detail.to_string(),
    }
}

pub struct OfficeConverter {
    tool: OfficeTool,
    libreoffice_path: PathBuf,
    unoconv_path: PathBuf,
    temporary_directory: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl OfficeConverter {
    pub fn from_config(
        config: &ConverterConfig,
        temporary_directory: &Path,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        OfficeConverter {
            tool: config.office_tool,
            libreoffice_path: config.libreoffice_path.clone(),
            unoconv_path: config.unoconv_path.clone(),
            temporary_directory: temporary_directory.to_path_buf(),
            runner,
        }
    }

    pub fn tool(&self) -> OfficeTool {
        self.tool
    }

    /// Convert `input` of type `mime_type` to a PDF at `output`.
    ///
    /// The tool writes into a scratch workspace; `output` only appears once
    /// the tool has succeeded, so a failed run never leaves a partial PDF
    /// where a later call would pick it up.
    pub fn convert(&self, input: &Path, output: &Path, mime_type: &str) -> EdmsResult<()> {
        if !is_office_mime_type(mime_type) {
            return Err(ConverterError::InvalidOfficeFormat {
                mime_type: mime_type.to_string(),
            }
            .into());
        }

        fs::create_dir_all(&self.temporary_directory).map_err(backend_error)?;
        // Removed on drop, taking any partial output and profile with it.
        let workspace = tempfile::Builder::new()
            .prefix("office-")
            .tempdir_in(&self.temporary_directory)
            .map_err(backend_error)?;
        let outdir = workspace.path().join("out");
        fs::create_dir_all(&outdir).map_err(backend_error)?;

        let converted = match self.tool {
            OfficeTool::LibreOffice => {
                self.convert_libreoffice(input, workspace.path(), &outdir, mime_type)?
            }
            OfficeTool::Unoconv => self.convert_unoconv(input, &outdir)?,
        };
        move_file(&converted, output)?;

        if let Err(e) = workspace.close() {
            warn!(error = %e, "failed to remove office conversion workspace");
        }
        Ok(())
    }

    fn convert_libreoffice(
        &self,
        input: &Path,
        workspace: &Path,
        outdir: &Path,
        mime_type: &str,
    ) -> EdmsResult<PathBuf> {
        let home = workspace.join("home");
        fs::create_dir_all(&home).map_err(backend_error)?;

        let mut invocation = Invocation::new(&self.libreoffice_path)
            .args(["--headless", "--convert-to", "pdf:writer_pdf_Export"]);
        if mime_type == "text/plain" {
            invocation = invocation.arg(TEXT_PLAIN_FILTER);
        }
        let invocation = invocation
            .arg(input.display().to_string())
            .arg("--outdir")
            .arg(outdir.display().to_string())
            .arg(format!(
                "-env:UserInstallation=file://{}",
                home.join("LibreOffice_Conversion").display()
            ))
            .env("HOME", home.display().to_string());

        debug!(command = %invocation.command_line(), "libreoffice convert");
        let result = self.runner.run(&invocation)?;
        if !result.success() {
            return Err(ConverterError::OfficeConversion {
                detail: result.first_stderr_line(),
            }
            .into());
        }

        let stem = input
            .file_stem()
            .ok_or_else(|| backend_error(format!("{} has no file name", input.display())))?;
        let mut converted = outdir.join(stem);
        converted.set_extension("pdf");
        require_output("LibreOffice", converted)
    }

    fn convert_unoconv(&self, input: &Path, outdir: &Path) -> EdmsResult<PathBuf> {
        let converted = outdir.join("converted.pdf");
        let invocation = Invocation::new(&self.unoconv_path)
            .args(["--pipe", "edms", "--format=pdf"])
            .arg(format!("--output={}", converted.display()))
            .arg(input.display().to_string());

        debug!(command = %invocation.command_line(), "unoconv convert");
        let result = self.runner.run(&invocation)?;
        if !result.success() {
            return Err(ConverterError::OfficeConversion {
                detail: result.first_stderr_line(),
            }
            .into());
        }
        require_output("unoconv", converted)
    }
}

fn require_output(tool: &str, converted: PathBuf) -> EdmsResult<PathBuf> {
    if !converted.exists() {
        return Err(backend_error(format!(
            "{} produced no output at {}",
            tool,
            converted.display()
        ))
        .into());
    }
    Ok(converted)
}

/// Rename, falling back to copy when the paths sit on different devices.
fn move_file(from: &Path, to: &Path) -> EdmsResult<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(backend_error)?;
    fs::remove_file(from).map_err(backend_error)?;
    Ok(())
}

impl fmt::Debug for OfficeConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfficeConverter")
            .field("tool", &self.tool)
            .field("libreoffice_path", &self.libreoffice_path)
            .field("unoconv_path", &self.unoconv_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessOutput, ScriptedRunner};
    use edms_core::{EdmsConfig, EdmsError};

    fn converter(tool: OfficeTool, tmp: &Path, runner: &Arc<ScriptedRunner>) -> OfficeConverter {
        let mut config = EdmsConfig::defaults_for(tmp).converter;
        config.office_tool = tool;
        OfficeConverter::from_config(&config, tmp, runner.clone())
    }

    #[test]
    fn test_mime_type_list() {
        assert!(is_office_mime_type("application/msword"));
        assert!(is_office_mime_type("text/plain"));
        assert!(!is_office_mime_type("image/png"));
        assert!(!is_office_mime_type("application/pdf"));
    }

    #[test]
    fn test_rejects_non_office_type() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let err = converter(OfficeTool::LibreOffice, dir.path(), &runner)
            .convert(Path::new("a.png"), &dir.path().join("a.pdf"), "image/png")
            .unwrap_err();
        assert_eq!(
            err,
            EdmsError::Converter(ConverterError::InvalidOfficeFormat {
                mime_type: "image/png".to_string()
            })
        );
        assert_eq!(runner.invocation_count(), 0);
    }

    #[test]
    fn test_libreoffice_converts_and_moves_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("report.docx");
        fs::write(&input, b"docx").unwrap();
        let output = dir.path().join("report-out.pdf");
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_creating(b"%PDF".to_vec());

        converter(OfficeTool::LibreOffice, dir.path(), &runner)
            .convert(
                &input,
                &output,
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            )
            .unwrap();

        assert_eq!(fs::read(&output).unwrap(), b"%PDF");
        let invocation = &runner.invocations()[0];
        assert_eq!(
            &invocation.args[..3],
            &["--headless", "--convert-to", "pdf:writer_pdf_Export"]
        );
        assert_eq!(invocation.args[3], input.display().to_string());
        assert_eq!(invocation.args[4], "--outdir");
        assert!(invocation.args[6].starts_with("-env:UserInstallation=file://"));
        assert!(invocation.env.contains_key("HOME"));
        // Workspace removed afterwards.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("office-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_libreoffice_text_filter() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        fs::write(&input, b"hello").unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_creating(b"%PDF".to_vec());

        converter(OfficeTool::LibreOffice, dir.path(), &runner)
            .convert(&input, &dir.path().join("notes.pdf"), "text/plain")
            .unwrap();
        assert_eq!(runner.invocations()[0].args[3], TEXT_PLAIN_FILTER);
    }

    #[test]
    fn test_libreoffice_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(ProcessOutput::failed(77, "Error: source file could not be loaded\n"));
        let err = converter(OfficeTool::LibreOffice, dir.path(), &runner)
            .convert(Path::new("/missing.odt"), &dir.path().join("x.pdf"), "application/vnd.oasis.opendocument.text")
            .unwrap_err();
        assert_eq!(
            err,
            EdmsError::Converter(ConverterError::OfficeConversion {
                detail: "Error: source file could not be loaded".to_string()
            })
        );
    }

    #[test]
    fn test_libreoffice_missing_output_is_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.push(ProcessOutput::ok(""));
        let err = converter(OfficeTool::LibreOffice, dir.path(), &runner)
            .convert(Path::new("/a.odt"), &dir.path().join("x.pdf"), "application/vnd.oasis.opendocument.text")
            .unwrap_err();
        assert!(matches!(
            err,
            EdmsError::Converter(ConverterError::OfficeBackend { .. })
        ));
    }

    #[test]
    fn test_unoconv_writes_into_workspace_then_moves() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a.pdf");
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_creating(b"%PDF".to_vec());

        converter(OfficeTool::Unoconv, dir.path(), &runner)
            .convert(Path::new("/docs/a.odt"), &output, "application/vnd.oasis.opendocument.text")
            .unwrap();

        let invocation = &runner.invocations()[0];
        assert_eq!(invocation.program, PathBuf::from("/usr/bin/unoconv"));
        assert_eq!(&invocation.args[..3], &["--pipe", "edms", "--format=pdf"]);
        let written = invocation.args[3].strip_prefix("--output=").unwrap();
        assert_ne!(Path::new(written), output.as_path());
        assert!(written.ends_with("converted.pdf"));
        assert_eq!(invocation.args[4], "/docs/a.odt");
        assert_eq!(fs::read(&output).unwrap(), b"%PDF");
        assert!(!Path::new(written).exists());
    }

    /// Writes its output file, then reports failure.
    struct CrashingRunner {
        inner: ScriptedRunner,
    }

    impl CommandRunner for CrashingRunner {
        fn run(&self, invocation: &Invocation) -> EdmsResult<ProcessOutput> {
            self.inner.run(invocation)?;
            Ok(ProcessOutput::failed(1, "unoconv: crashed mid-write\n"))
        }
    }

    #[test]
    fn test_crashed_tool_leaves_no_output() {
        for tool in [OfficeTool::Unoconv, OfficeTool::LibreOffice] {
            let dir = tempfile::tempdir().unwrap();
            let input = dir.path().join("a.odt");
            fs::write(&input, b"odt").unwrap();
            let output = dir.path().join("a.pdf");
            let runner = Arc::new(CrashingRunner {
                inner: ScriptedRunner::new(),
            });
            runner.inner.push_creating(b"%PD".to_vec());
            let mut config = EdmsConfig::defaults_for(dir.path()).converter;
            config.office_tool = tool;

            let err = OfficeConverter::from_config(&config, dir.path(), runner.clone())
                .convert(&input, &output, "application/vnd.oasis.opendocument.text")
                .unwrap_err();
            assert!(matches!(
                err,
                EdmsError::Converter(ConverterError::OfficeConversion { .. })
            ));
            assert!(!output.exists(), "{tool:?} left a partial PDF behind");
        }
    }
}
