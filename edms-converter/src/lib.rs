//! EDMS Converter - Document Rendering Pipeline
//!
//! Turns a source document page plus an ordered list of transformations into
//! an invocation of ImageMagick, GraphicsMagick or an office tool, and keeps
//! the results in a file cache.

pub mod backend;
pub mod cached;
pub mod classify;
pub mod converter;
pub mod mimetype;
pub mod office;
pub mod process;
pub mod transformation;

pub use backend::{
    convert_arguments, parse_format_list, Backend, ConversionRequest, ConverterBackend,
    GraphicsMagick, ImageMagick, QualityPreset,
};
pub use cached::CachedConverter;
pub use converter::Converter;
pub use mimetype::guess_mime_type;
pub use office::{is_office_mime_type, OfficeConverter, OFFICE_MIME_TYPES};
pub use process::{CommandRunner, Invocation, ProcessOutput, ScriptedRunner, SystemRunner};
pub use transformation::Transformation;
