use crate::app::{App, AppContext};
use crate::settings::Setting;
use edms_core::{EdmsResult, PermissionKey, TargetKind};

pub const NAMESPACE: &str = "converter";

pub const TRANSFORMATION_CREATE: &str = "transformation_create";
pub const TRANSFORMATION_DELETE: &str = "transformation_delete";
pub const TRANSFORMATION_EDIT: &str = "transformation_edit";
pub const TRANSFORMATION_VIEW: &str = "transformation_view";

pub fn permission(name: &str) -> PermissionKey {
    PermissionKey::new(NAMESPACE, name)
}

/// Converter settings and the permissions guarding page transformations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConverterApp;

impl App for ConverterApp {
    fn name(&self) -> &'static str {
        "converter"
    }

    fn label(&self) -> &'static str {
        "Converter"
    }

    fn ready(&self, ctx: &mut AppContext<'_>) -> EdmsResult<()> {
        ctx.permissions.namespace(NAMESPACE, "Converter");
        let mut transformations = Vec::new();
        for (name, label) in [
            (TRANSFORMATION_CREATE, "Create new transformations"),
            (TRANSFORMATION_DELETE, "Delete transformations"),
            (TRANSFORMATION_EDIT, "Edit transformations"),
            (TRANSFORMATION_VIEW, "View existing transformations"),
        ] {
            transformations.push(ctx.permissions.register(NAMESPACE, name, label)?.pk());
        }
        ctx.targets
            .register_permissions(ctx.permissions, TargetKind::DocumentPage, &transformations)?;

        ctx.settings.namespace(NAMESPACE, "Converter");
        // Only the tools the configured backend and office tool run must be
        // installed.
        let active: Vec<&str> = ctx
            .config
            .converter
            .active_tool_paths()
            .into_iter()
            .map(|(field, _)| field)
            .collect();
        for (global_name, field, help_text) in [
            ("CONVERTER_IM_CONVERT_PATH", "im_convert_path", "File path to the ImageMagick convert program."),
            ("CONVERTER_IM_IDENTIFY_PATH", "im_identify_path", "File path to the ImageMagick identify program."),
            ("CONVERTER_GM_PATH", "gm_path", "File path to the GraphicsMagick program."),
            ("CONVERTER_LIBREOFFICE_PATH", "libreoffice_path", "File path to the LibreOffice program."),
            ("CONVERTER_UNOCONV_PATH", "unoconv_path", "File path to the unoconv program."),
        ] {
            let mut setting = Setting::new(NAMESPACE, global_name, &format!("converter.{}", field))
                .with_help_text(help_text);
            if active.contains(&field) {
                setting = setting.must_exist();
            }
            ctx.settings.register(setting)?;
        }
        for setting in [
            Setting::new(NAMESPACE, "CONVERTER_GRAPHICS_BACKEND", "converter.backend")
                .with_help_text("Graphics conversion backend: imagemagick or graphicsmagick.")
                .with_default("imagemagick"),
            Setting::new(NAMESPACE, "CONVERTER_OFFICE_TOOL", "converter.office_tool")
                .with_help_text("Office to PDF tool: libreoffice or unoconv.")
                .with_default("libreoffice"),
            Setting::new(NAMESPACE, "CONVERTER_DEFAULT_FILE_FORMAT", "converter.default_file_format")
                .with_help_text("Output format of rendered pages.")
                .with_default("jpeg"),
            Setting::new(NAMESPACE, "CONVERTER_JPEG_QUALITY", "converter.jpeg_quality")
                .with_help_text("Quality passed to the backend for JPEG output.")
                .with_default(85),
            Setting::new(NAMESPACE, "CONVERTER_CACHE_NAME", "converter.cache_name")
                .with_help_text("Cache holding rendered pages."),
            Setting::new(NAMESPACE, "CONVERTER_TEMPORARY_DIRECTORY", "temporary_directory")
                .with_help_text("Scratch directory for office conversions and renders."),
        ] {
            ctx.settings.register(setting)?;
        }
        Ok(())
    }
}
