use thiserror::Error;
use tracing::debug;

// Wide enough that ordinary fragments are never wrapped.
const RENDER_WIDTH: usize = 4096;

#[derive(Debug, Error)]
#[error("failed to render HTML fragment: {0}")]
pub struct RenderError(#[from] html2text::Error);

/// Render an HTML fragment (markup, entities) to plain text.
pub fn render_fragment(fragment: &str) -> Result<String, RenderError> {
    Ok(html2text::from_read(fragment.as_bytes(), RENDER_WIDTH)?)
}

/// Like [`render_fragment`], falling back to the raw fragment on failure.
pub fn render_lossy(fragment: &str) -> String {
    render_fragment(fragment).unwrap_or_else(|e| {
        debug!(error = %e, "using raw fragment text");
        fragment.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_entities() {
        let text = render_fragment("Fish &amp; Chips &lt;3").unwrap();
        assert_eq!(text.trim(), "Fish & Chips <3");
    }

    #[test]
    fn test_drops_markup() {
        let text = render_lossy("<span class=\"x\">Plain</span> text");
        assert_eq!(text.trim(), "Plain text");
    }

    #[test]
    fn test_empty_fragment() {
        assert_eq!(render_lossy("").trim(), "");
    }
}
