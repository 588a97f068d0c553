//! Manifest and config renderer.
//!
//! Pure text substitution of template metadata into the configuration
//! artifacts the downstream daemons require. A missing required field is a
//! fatal render error, not a silent default. Re-rendering into an existing
//! directory overwrites prior artifacts, which is what makes Setup
//! idempotent across re-runs.

pub mod embedded_templates;
mod metadata;

pub use metadata::{detect_cgroup_driver, MetadataBuilder, TemplateMetadata};

use std::path::Path;

use tera::Tera;

use crate::error::SetupError;

pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Create a renderer from the embedded templates.
    pub fn from_embedded() -> Result<Self, SetupError> {
        let mut tera = Tera::default();
        for (name, content) in embedded_templates::ALL_TEMPLATES {
            tera.add_raw_template(name, content).map_err(|e| {
                SetupError::Template(format!("failed to register template {}: {}", name, e))
            })?;
        }
        tracing::debug!(
            "[TemplateRenderer] Loaded {} embedded templates",
            embedded_templates::ALL_TEMPLATES.len()
        );
        Ok(TemplateRenderer { tera })
    }

    /// Render a template against a context.
    pub fn render(&self, template_name: &str, context: &tera::Context) -> Result<String, SetupError> {
        self.tera.render(template_name, context).map_err(|e| {
            SetupError::Template(format!("failed to render {}: {}", template_name, render_error(&e)))
        })
    }

    /// Render a template and write it to a file, creating parent directories
    /// and overwriting any prior artifact.
    pub fn render_to_file(
        &self,
        template_name: &str,
        context: &tera::Context,
        output_path: &Path,
    ) -> Result<(), SetupError> {
        let rendered = self.render(template_name, context)?;
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output_path, rendered)?;
        tracing::debug!(
            "[TemplateRenderer] Rendered {} to {}",
            template_name,
            output_path.display()
        );
        Ok(())
    }

    /// Mirror the raw template sources into per-role subdirectories so an
    /// operator can inspect what was rendered from.
    pub fn mirror_sources(&self, source_dir: &Path) -> Result<(), SetupError> {
        for (name, content) in embedded_templates::ALL_TEMPLATES {
            let target = source_dir.join(name);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, content)?;
        }
        tracing::debug!(
            "[TemplateRenderer] Mirrored {} template sources into {}",
            embedded_templates::ALL_TEMPLATES.len(),
            source_dir.display()
        );
        Ok(())
    }

    pub fn list_templates(&self) -> Vec<String> {
        self.tera.get_template_names().map(String::from).collect()
    }
}

/// Tera nests the useful cause one level down.
fn render_error(e: &tera::Error) -> String {
    use std::error::Error;
    match e.source() {
        Some(source) => format!("{}: {}", e, source),
        None => e.to_string(),
    }
}
