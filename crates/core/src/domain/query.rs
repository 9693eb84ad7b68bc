use serde::{Deserialize, Serialize};

/// Largest page size the records API accepts.
pub const MAX_PER_PAGE: u32 = 200;
pub const DEFAULT_PAGE: u32 = 1;

/// Structured query produced from natural language and consumed by the executor.
///
/// Wire keys follow the translation contract (`sort_by`, `per_page`, ...);
/// camelCase spellings are accepted on input. `module` stays optional at the
/// type level so a descriptor without it can still reach the executor, which
/// rejects it before any network call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<String>,
    #[serde(default, alias = "sortBy", skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, alias = "sortOrder", skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, alias = "perPage", skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[serde(alias = "ASC", alias = "Asc", alias = "ascending")]
    Asc,
    #[default]
    #[serde(alias = "DESC", alias = "Desc", alias = "descending")]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl QueryDescriptor {
    pub fn for_module(module: impl Into<String>) -> Self {
        Self { module: Some(module.into()), ..Self::default() }
    }

    /// Module name with surrounding whitespace removed, `None` when absent or blank.
    pub fn module_name(&self) -> Option<&str> {
        self.module.as_deref().map(str::trim).filter(|module| !module.is_empty())
    }

    pub fn effective_page(&self) -> u32 {
        self.page.unwrap_or(DEFAULT_PAGE)
    }

    pub fn effective_per_page(&self) -> u32 {
        self.per_page.unwrap_or(MAX_PER_PAGE).min(MAX_PER_PAGE)
    }
}

/// Wraps a criteria expression in the outer double parentheses the filter
/// grammar requires. Already wrapped input is returned unchanged.
pub fn wrap_criteria(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("((") && trimmed.ends_with("))") {
        trimmed.to_string()
    } else {
        format!("(({trimmed}))")
    }
}
