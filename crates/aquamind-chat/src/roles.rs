//! Role profile registry.
//!
//! A role is data, not code: an id, a display name, a set of capability tags
//! and a list of example queries. The catalog is built once at startup,
//! either from the built-in profiles or from `[[roles]]` in the config file,
//! and is read-only afterwards.

use std::collections::HashSet;
use std::sync::LazyLock;

use serde::Serialize;

use aquamind_core::config::RoleProfileConfig;
use aquamind_core::types::RoleId;

use crate::error::ChatError;

/// General example queries shown alongside every role's own hints.
pub const QUICK_PROMPTS: &[&str] = &[
    "Show me temperature anomalies in the last month",
    "Which ARGO floats are active near coordinates 15°N, 68°E?",
    "Compare salinity levels between Arabian Sea and Bay of Bengal",
    "Generate a report on ocean health for this region",
    "What's the current thermocline depth in this area?",
    "Show BGC parameter trends for the last quarter",
];

static BUILTIN: LazyLock<RoleRegistry> = LazyLock::new(RoleRegistry::builtin);

/// Capability and behavior descriptor for one selectable role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleProfile {
    pub id: RoleId,
    pub display_name: String,
    pub description: String,
    /// Feature tags, unique, in catalog order.
    pub capabilities: Vec<String>,
    /// Example queries, in display order.
    pub prompt_hints: Vec<String>,
}

impl RoleProfile {
    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.iter().any(|c| c == tag)
    }
}

impl From<&RoleProfileConfig> for RoleProfile {
    fn from(cfg: &RoleProfileConfig) -> Self {
        Self {
            id: RoleId::new(cfg.id.trim()),
            display_name: cfg.display_name.clone(),
            description: cfg.description.clone(),
            capabilities: cfg.capabilities.iter().map(|c| capability_tag(c)).collect(),
            prompt_hints: cfg.prompt_hints.clone(),
        }
    }
}

/// Normalize a feature label into a capability tag ("BGC Parameters" -> "bgc-parameters").
pub fn capability_tag(label: &str) -> String {
    label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Static catalog of role profiles.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    profiles: Vec<RoleProfile>,
}

impl RoleRegistry {
    /// Build a registry from an explicit catalog.
    ///
    /// Rejects an empty catalog, blank ids and duplicate ids. Duplicate
    /// capability tags within a profile are collapsed.
    pub fn new(profiles: Vec<RoleProfile>) -> Result<Self, ChatError> {
        if profiles.is_empty() {
            return Err(ChatError::InvalidCatalog("catalog has no roles".to_string()));
        }

        let mut seen = HashSet::new();
        let mut cleaned = Vec::with_capacity(profiles.len());
        for mut profile in profiles {
            if profile.id.as_str().trim().is_empty() {
                return Err(ChatError::InvalidCatalog("role id is blank".to_string()));
            }
            if !seen.insert(profile.id.clone()) {
                return Err(ChatError::InvalidCatalog(format!(
                    "duplicate role id {}",
                    profile.id
                )));
            }
            let mut tags = HashSet::new();
            profile.capabilities.retain(|t| !t.is_empty() && tags.insert(t.clone()));
            cleaned.push(profile);
        }

        Ok(Self { profiles: cleaned })
    }

    /// Build from `[[roles]]` config entries, or the built-in catalog when none are given.
    pub fn from_config(roles: &[RoleProfileConfig]) -> Result<Self, ChatError> {
        if roles.is_empty() {
            return Ok(Self::builtin());
        }
        let registry = Self::new(roles.iter().map(RoleProfile::from).collect())?;
        tracing::info!(roles = registry.len(), "Role catalog loaded from configuration");
        Ok(registry)
    }

    /// Process-wide built-in catalog, initialised on first use.
    pub fn global() -> &'static RoleRegistry {
        &BUILTIN
    }

    /// Look up a role by id.
    pub fn get(&self, id: &str) -> Result<&RoleProfile, ChatError> {
        self.profiles
            .iter()
            .find(|p| p.id.as_str() == id)
            .ok_or_else(|| ChatError::UnknownRole(id.to_string()))
    }

    /// All roles in catalog order.
    pub fn list(&self) -> &[RoleProfile] {
        &self.profiles
    }

    pub fn contains(&self, id: &str) -> bool {
        self.profiles.iter().any(|p| p.id.as_str() == id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// The preferred role if catalogued, otherwise the first catalog entry.
    pub fn resolve_default(&self, preferred: &str) -> &RoleProfile {
        match self.get(preferred) {
            Ok(profile) => profile,
            Err(_) => {
                tracing::warn!(
                    preferred = %preferred,
                    fallback = %self.profiles[0].id,
                    "Default role not in catalog, using first entry"
                );
                &self.profiles[0]
            }
        }
    }

    /// The role's own hints followed by the general quick prompts, without repeats.
    pub fn prompt_hints_for(&self, id: &str) -> Result<Vec<String>, ChatError> {
        let profile = self.get(id)?;
        let mut seen = HashSet::new();
        Ok(profile
            .prompt_hints
            .iter()
            .map(String::as_str)
            .chain(QUICK_PROMPTS.iter().copied())
            .filter(|hint| seen.insert(*hint))
            .map(str::to_string)
            .collect())
    }

    fn builtin() -> Self {
        let profiles = vec![
            builtin_profile(
                "researcher",
                "Ocean Researcher",
                "Deep analysis of oceanographic data and trends",
                &["Advanced Analytics", "Research Tools", "Data Export"],
                &[
                    "Show me temperature profiles in the Indian Ocean",
                    "Compare salinity levels between Arabian Sea and Bay of Bengal",
                ],
            ),
            builtin_profile(
                "marine-biologist",
                "Marine Biologist",
                "Biological and ecological ocean data insights",
                &["BGC Parameters", "Ecosystem Health", "Species Analysis"],
                &[
                    "Show BGC parameter trends for the last quarter",
                    "How healthy are chlorophyll levels in the Arabian Sea?",
                ],
            ),
            builtin_profile(
                "policy-maker",
                "Policy Maker",
                "Strategic insights for ocean governance",
                &["Trend Reports", "Impact Analysis", "Policy Insights"],
                &[
                    "Generate a report on ocean health for this region",
                    "Summarize warming trends over the last decade",
                ],
            ),
            builtin_profile(
                "student",
                "Student",
                "Educational exploration of ocean science",
                &["Learning Mode", "Guided Tours", "Simple Explanations"],
                &[
                    "What is a thermocline?",
                    "How do ARGO floats measure the ocean?",
                ],
            ),
            builtin_profile(
                "captain",
                "Ship Captain",
                "Navigation and operational ocean data",
                &["Weather Data", "Navigation Aids", "Safety Reports"],
                &[
                    "Which ARGO floats are active near coordinates 15°N, 68°E?",
                    "Are there temperature anomalies along my route?",
                ],
            ),
            builtin_profile(
                "data-analyst",
                "Data Analyst",
                "Statistical analysis and data visualization",
                &["Custom Charts", "Statistical Tools", "Data Mining"],
                &[
                    "Plot salinity against depth for float 4901234",
                    "Show me temperature anomalies in the last month",
                ],
            ),
        ];
        Self { profiles }
    }
}

fn builtin_profile(
    id: &str,
    display_name: &str,
    description: &str,
    features: &[&str],
    hints: &[&str],
) -> RoleProfile {
    RoleProfile {
        id: RoleId::from(id),
        display_name: display_name.to_string(),
        description: description.to_string(),
        capabilities: features.iter().map(|f| capability_tag(f)).collect(),
        prompt_hints: hints.iter().map(|h| h.to_string()).collect(),
    }
}

// =============================================================================
// Tests
// =============================================================================
