use std::path::Path;

use pipeline::{PipelineError, PromptTemplate};

/// Reads and parses the prompt template at `path`.
pub fn load_prompt_template(path: &Path) -> Result<PromptTemplate, PipelineError> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::configuration(format!(
            "cannot read prompt template {}: {e}",
            path.display()
        ))
    })?;
    Ok(PromptTemplate::parse(&source)?)
}
