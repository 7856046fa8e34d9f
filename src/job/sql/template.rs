//! Named-placeholder SQL templates
//!
//! `SELECT {fields} FROM {table}` is rendered by substituting `{name}`
//! placeholders. The set of names a template may use is checked once, when
//! the options are built.

use std::{borrow::Cow, sync::LazyLock};

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template `{template}` uses unknown placeholder `{{{placeholder}}}`")]
    UnknownPlaceholder {
        template: &'static str,
        placeholder: String,
    },
    #[error("Template `{template}` must reference `{{{placeholder}}}`")]
    MissingPlaceholder {
        template: &'static str,
        placeholder: &'static str,
    },
    #[error("Template `{0}` is empty")]
    Empty(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        PLACEHOLDER
            .captures_iter(&self.text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Ensure only `allowed` names are used and every `required` one appears.
    pub fn validate(
        &self,
        name: &'static str,
        allowed: &[&'static str],
        required: &[&'static str],
    ) -> Result<(), TemplateError> {
        if self.text.trim().is_empty() {
            return Err(TemplateError::Empty(name));
        }
        if let Some(unknown) = self.placeholders().find(|p| !allowed.iter().any(|a| a == p)) {
            return Err(TemplateError::UnknownPlaceholder {
                template: name,
                placeholder: unknown.to_owned(),
            });
        }
        for &placeholder in required {
            if !self.placeholders().any(|p| p == placeholder) {
                return Err(TemplateError::MissingPlaceholder {
                    template: name,
                    placeholder,
                });
            }
        }
        Ok(())
    }

    /// Substitute placeholders. Names without a binding are left untouched.
    pub fn render(&self, bindings: &[(&str, &str)]) -> String {
        let rendered: Cow<'_, str> = PLACEHOLDER.replace_all(&self.text, |caps: &Captures| {
            let name = &caps[1];
            bindings
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_owned())
                .unwrap_or_else(|| caps[0].to_owned())
        });
        rendered.trim().to_owned()
    }
}

impl From<&str> for Template {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Template {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
