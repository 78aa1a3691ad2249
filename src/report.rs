/*!
 * Failure report rendering
 *
 * The report replaces the original artifact when a document is blocked and
 * a report was requested.
 */

use crate::config::DEFAULT_REPORT_MESSAGE;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_TEMPLATE: &str = include_str!("../templates/rebuild_error_report.html");

const MESSAGE_PLACEHOLDER: &str = "{{MESSAGE}}";
const FILE_ID_PLACEHOLDER: &str = "{{FILE_ID}}";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to load report template {}: {source}", .path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("report template is empty")]
    EmptyTemplate,
}

/// Renders the artifact that stands in for a blocked document
pub trait ReportRenderer: Send + Sync + 'static {
    fn render(&self, file_id: &str) -> Result<Vec<u8>, ReportError>;
}

/// HTML report with `{{MESSAGE}}` and `{{FILE_ID}}` placeholders
#[derive(Debug, Clone)]
pub struct HtmlReportRenderer {
    template: String,
    message: String,
}

impl HtmlReportRenderer {
    /// Built-in template with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            message: message.into(),
        }
    }

    pub fn with_template(
        template: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Self, ReportError> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(ReportError::EmptyTemplate);
        }
        Ok(Self {
            template,
            message: message.into(),
        })
    }

    pub fn from_template_file(
        path: &Path,
        message: impl Into<String>,
    ) -> Result<Self, ReportError> {
        let template = std::fs::read_to_string(path).map_err(|source| ReportError::Template {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_template(template, message)
    }
}

impl Default for HtmlReportRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_MESSAGE)
    }
}

impl ReportRenderer for HtmlReportRenderer {
    fn render(&self, file_id: &str) -> Result<Vec<u8>, ReportError> {
        let html = self
            .template
            .replace(MESSAGE_PLACEHOLDER, &escape_html(&self.message))
            .replace(FILE_ID_PLACEHOLDER, &escape_html(file_id));
        Ok(html.into_bytes())
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
