use serde::{Deserialize, Serialize};

/// The brand a run is measuring visibility for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandContext {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Alternate spellings counted as a brand mention
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl BrandContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// All terms that identify the brand in free text, name first.
    pub fn terms(&self) -> Vec<&str> {
        let mut terms = vec![self.name.as_str()];
        terms.extend(self.aliases.iter().map(String::as_str));
        if let Some(domain) = &self.domain {
            terms.push(domain.as_str());
        }
        terms.retain(|t| !t.trim().is_empty());
        terms
    }
}
