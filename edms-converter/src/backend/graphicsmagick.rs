//! GraphicsMagick through the single `gm` binary.

use super::{convert_arguments, parse_format_list, ConversionRequest, ConverterBackend};
use crate::classify::{graphicsmagick_convert_error, identify_error};
use crate::process::{CommandRunner, Invocation};
use edms_core::{BackendKind, ConverterError, EdmsResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct GraphicsMagick {
    gm_path: PathBuf,
    jpeg_quality: u8,
    runner: Arc<dyn CommandRunner>,
}

impl GraphicsMagick {
    pub fn new(gm_path: &Path, jpeg_quality: u8, runner: Arc<dyn CommandRunner>) -> Self {
        GraphicsMagick {
            gm_path: gm_path.to_path_buf(),
            jpeg_quality,
            runner,
        }
    }

    fn subcommand(&self, name: &str) -> Invocation {
        Invocation::new(&self.gm_path).arg(name)
    }
}

impl fmt::Debug for GraphicsMagick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsMagick")
            .field("gm_path", &self.gm_path)
            .finish()
    }
}

impl ConverterBackend for GraphicsMagick {
    fn kind(&self) -> BackendKind {
        BackendKind::GraphicsMagick
    }

    fn identify(&self, input: &Path, arguments: &[String]) -> EdmsResult<String> {
        let invocation = self
            .subcommand("identify")
            .args(arguments.iter().cloned())
            .arg(input.display().to_string());
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            return Err(identify_error(&output).into());
        }
        Ok(output.stdout)
    }

    fn convert(&self, request: &ConversionRequest, output: &Path) -> EdmsResult<()> {
        let invocation = self
            .subcommand("convert")
            .args(convert_arguments(request, output, self.jpeg_quality));
        debug!(command = %invocation.command_line(), "graphicsmagick convert");
        let result = self.runner.run(&invocation)?;
        if !result.success() {
            return Err(graphicsmagick_convert_error(&result).into());
        }
        Ok(())
    }

    fn list_formats(&self) -> EdmsResult<Vec<String>> {
        let invocation = self.subcommand("convert").args(["-list", "formats"]);
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
