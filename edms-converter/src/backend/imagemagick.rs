//! ImageMagick through its `convert` and `identify` binaries.

use super::{convert_arguments, parse_format_list, ConversionRequest, ConverterBackend};
use crate::classify::{identify_error, imagemagick_convert_error};
use crate::process::{CommandRunner, Invocation};
use edms_core::{BackendKind, ConverterError, EdmsResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct ImageMagick {
    convert_path: PathBuf,
    identify_path: PathBuf,
    jpeg_quality: u8,
    runner: Arc<dyn CommandRunner>,
}

impl ImageMagick {
    pub fn new(
        convert_path: &Path,
        identify_path: &Path,
        jpeg_quality: u8,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        ImageMagick {
            convert_path: convert_path.to_path_buf(),
            identify_path: identify_path.to_path_buf(),
            jpeg_quality,
            runner,
        }
    }
}

impl fmt::Debug for ImageMagick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageMagick")
            .field("convert_path", &self.convert_path)
            .field("identify_path", &self.identify_path)
            .finish()
    }
}

impl ConverterBackend for ImageMagick {
    fn kind(&self) -> BackendKind {
        BackendKind::ImageMagick
    }

    fn identify(&self, input: &Path, arguments: &[String]) -> EdmsResult<String> {
        let invocation = Invocation::new(&self.identify_path)
            .args(arguments.iter().cloned())
            .arg(input.display().to_string());
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            return Err(identify_error(&output).into());
        }
        Ok(output.stdout)
    }

    fn convert(&self, request: &ConversionRequest, output: &Path) -> EdmsResult<()> {
        let invocation = Invocation::new(&self.convert_path)
            .args(convert_arguments(request, output, self.jpeg_quality));
        debug!(command = %invocation.command_line(), "imagemagick convert");
        let result = self.runner.run(&invocation)?;
        if !result.success() {
            return Err(imagemagick_convert_error(&result).into());
        }
        Ok(())
    }

    fn list_formats(&self) -> EdmsResult<Vec<String>> {
        let invocation = Invocation::new(&self.convert_path).args(["-list", "format"]);
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            return Err(ConverterError::Convert {
                detail: output.first_stderr_line(),
            }
            .into());
        }
        Ok(parse_format_list(&output.stdout))
    }
}
