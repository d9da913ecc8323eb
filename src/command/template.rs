// ABOUTME: Minimal `{key}` template renderer for command lines.
// ABOUTME: Only the template is scanned; substituted values are inserted verbatim.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template references unknown key '{0}'")]
    MissingKey(String),

    #[error("unterminated placeholder in template: {0}")]
    Unterminated(String),
}

/// Substitute every `{key}` in `template` from `data`.
pub fn render(template: &str, data: &BTreeMap<&'static str, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| TemplateError::Unterminated(template.to_string()))?;
        let key = &after[..close];
        let value = data
            .get(key)
            .ok_or_else(|| TemplateError::MissingKey(key.to_string()))?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    Ok(out)
}
