//! Map a failed tool run onto a typed error by reading its stderr.

use crate::process::ProcessOutput;
use edms_core::ConverterError;

/// ImageMagick's wording for input it has no reader for.
pub const NO_DECODE_DELEGATE: &str = "no decode delegate for this image format";

const GM_UNKNOWN_FORMAT_MARKERS: [&str; 2] = ["no decode delegate", "unrecognized image format"];

/// Failed ImageMagick `convert`.
pub fn imagemagick_convert_error(output: &ProcessOutput) -> ConverterError {
    let stderr = output.stderr.to_lowercase();
    if stderr.contains(NO_DECODE_DELEGATE) {
        ConverterError::UnknownFormat {
            detail: output.first_stderr_line(),
        }
    } else {
        ConverterError::Convert {
            detail: output.first_stderr_line(),
        }
    }
}

/// Failed GraphicsMagick `gm convert`.
pub fn graphicsmagick_convert_error(output: &ProcessOutput) -> ConverterError {
    let stderr = output.stderr.to_lowercase();
    if GM_UNKNOWN_FORMAT_MARKERS.iter().any(|m| stderr.contains(m)) {
        ConverterError::UnknownFormat {
            detail: output.first_stderr_line(),
        }
    } else {
        ConverterError::Convert {
            detail: output.first_stderr_line(),
        }
    }
}

/// Failed `identify`, for either backend.
pub fn identify_error(output: &ProcessOutput) -> ConverterError {
    ConverterError::Identify {
        detail: output.first_stderr_line(),
    }
}
