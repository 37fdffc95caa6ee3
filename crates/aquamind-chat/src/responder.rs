//! The Responder boundary and the canned ocean-data stub behind it.
//!
//! The engine only sees [`Responder`]. A real deployment plugs a reasoning or
//! query backend in here; [`CannedResponder`] answers from a fixed table so the
//! dashboard works without one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use aquamind_core::config::{ResponderConfig, SelectionMode};
use aquamind_core::types::MessageKind;

use crate::error::ResponderError;
use crate::input::NormalizedQuery;
use crate::roles::RoleProfile;

/// What a responder returns for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
}

impl Answer {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: MessageKind::Text,
        }
    }

    pub fn with_kind(content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            content: content.into(),
            kind,
        }
    }
}

/// Produces an answer for a query asked under a role.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(
        &self,
        query: &NormalizedQuery,
        role: &RoleProfile,
    ) -> Result<Answer, ResponderError>;
}

/// Picks one of several candidate answers.
#[derive(Debug)]
pub enum SelectionStrategy {
    /// Always the first candidate.
    First,
    /// Cycle through candidates across calls.
    RoundRobin(AtomicUsize),
    /// Uniformly random, optionally seeded.
    Random(Mutex<StdRng>),
}

impl SelectionStrategy {
    pub fn round_robin() -> Self {
        SelectionStrategy::RoundRobin(AtomicUsize::new(0))
    }

    pub fn random(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        SelectionStrategy::Random(Mutex::new(rng))
    }

    pub fn from_config(mode: SelectionMode, seed: Option<u64>) -> Self {
        match mode {
            SelectionMode::First => SelectionStrategy::First,
            SelectionMode::RoundRobin => Self::round_robin(),
            SelectionMode::Random => Self::random(seed),
        }
    }

    /// Index in `0..n`. `n` must be non-zero.
    pub fn pick(&self, n: usize) -> usize {
        debug_assert!(n > 0);
        match self {
            SelectionStrategy::First => 0,
            SelectionStrategy::RoundRobin(next) => next.fetch_add(1, Ordering::Relaxed) % n,
            SelectionStrategy::Random(rng) => rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .random_range(0..n),
        }
    }
}

/// One entry in the canned answer table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedAnswer {
    pub content: String,
    pub kind: MessageKind,
    /// Lowercase fragments that make this answer relevant to a query.
    pub keywords: Vec<String>,
    /// Capability tag the role must carry for this answer to be offered.
    pub requires: Option<String>,
}

impl CannedAnswer {
    pub fn new(content: &str, kind: MessageKind, keywords: &[&str]) -> Self {
        Self {
            content: content.to_string(),
            kind,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            requires: None,
        }
    }

    pub fn requiring(mut self, capability: &str) -> Self {
        self.requires = Some(capability.to_string());
        self
    }

    fn available_to(&self, role: &RoleProfile) -> bool {
        self.requires
            .as_deref()
            .map_or(true, |tag| role.has_capability(tag))
    }

    fn matches(&self, query: &str) -> bool {
        self.keywords.iter().any(|k| query.contains(k.as_str()))
    }
}

/// Answers from a fixed table after a simulated "thinking" delay.
#[derive(Debug)]
pub struct CannedResponder {
    answers: Vec<CannedAnswer>,
    strategy: SelectionStrategy,
    latency: Duration,
}

impl CannedResponder {
    pub fn new(answers: Vec<CannedAnswer>, strategy: SelectionStrategy) -> Self {
        Self {
            answers,
            strategy,
            latency: Duration::ZERO,
        }
    }

    /// The stock ocean-data answers with the given strategy and no latency.
    pub fn ocean_defaults(strategy: SelectionStrategy) -> Self {
        Self::new(ocean_answers(), strategy)
    }

    pub fn from_config(config: &ResponderConfig) -> Self {
        Self::ocean_defaults(SelectionStrategy::from_config(config.selection, config.seed))
            .with_latency(config.latency())
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn answers(&self) -> &[CannedAnswer] {
        &self.answers
    }

    fn candidates(&self, query: &NormalizedQuery, role: &RoleProfile) -> Vec<&CannedAnswer> {
        let available: Vec<&CannedAnswer> = self
            .answers
            .iter()
            .filter(|a| a.available_to(role))
            .collect();

        let lowered = query.as_str().to_lowercase();
        let relevant: Vec<&CannedAnswer> = available
            .iter()
            .copied()
            .filter(|a| a.matches(&lowered))
            .collect();
        if relevant.is_empty() {
            return available;
        }

        // Role-specific matches win over general ones.
        let specialised: Vec<&CannedAnswer> = relevant
            .iter()
            .copied()
            .filter(|a| a.requires.is_some())
            .collect();
        if specialised.is_empty() {
            relevant
        } else {
            specialised
        }
    }
}

#[async_trait]
impl Responder for CannedResponder {
    async fn respond(
        &self,
        query: &NormalizedQuery,
        role: &RoleProfile,
    ) -> Result<Answer, ResponderError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let candidates = self.candidates(query, role);
        if candidates.is_empty() {
            return Err(ResponderError::NoAnswer);
        }
        let chosen = candidates[self.strategy.pick(candidates.len())];

        tracing::debug!(
            role = %role.id,
            candidates = candidates.len(),
            kind = %chosen.kind,
            "Canned answer selected"
        );
        Ok(Answer::with_kind(chosen.content.clone(), chosen.kind))
    }
}

fn ocean_answers() -> Vec<CannedAnswer> {
    vec![
        CannedAnswer::new(
            "I found 23 ARGO floats in the Arabian Sea region. The latest salinity readings show an average of 36.5 PSU.",
            MessageKind::Text,
            &["argo", "float", "salinity", "arabian"],
        ),
        CannedAnswer::new(
            "The ocean temperature profile shows a thermocline at approximately 150m depth. Would you like me to visualize this data?",
            MessageKind::ChartRef,
            &["temperature", "profile", "thermocline", "depth"],
        ),
        CannedAnswer::new(
            "Ocean health score for this region is 78/100 - Good condition. BGC parameters indicate healthy chlorophyll levels.",
            MessageKind::Text,
            &["health", "bgc", "chlorophyll", "report"],
        ),
        CannedAnswer::new(
            "I've located 5 active floats near your specified coordinates. The nearest one (ID: 4901234) last transmitted 2 hours ago.",
            MessageKind::MapRef,
            &["near", "coordinates", "nearest", "location"],
        ),
        CannedAnswer::new(
            "Temperature anomalies detected in the equatorial region. Values are 1.2°C above seasonal average.",
            MessageKind::ChartRef,
            &["anomal", "warming", "trend", "seasonal"],
        ),
        CannedAnswer::new(
            "A thermocline is the layer where water temperature drops quickly with depth. ARGO floats measure it by diving to 2000m and rising back while recording.",
            MessageKind::Text,
            &["what is", "how do", "explain", "thermocline"],
        )
        .requiring("simple-explanations"),
        CannedAnswer::new(
            "Along your route, 3 ARGO floats report surface temperatures within normal range. No hazardous anomalies detected in the next 200 nautical miles.",
            MessageKind::MapRef,
            &["route", "navigation", "weather", "safety"],
        )
        .requiring("navigation-aids"),
        CannedAnswer::new(
            "Here is the salinity-depth plot for float 4901234. Salinity peaks at 36.8 PSU near 100m before settling around 35.0 PSU below 1000m.",
            MessageKind::ChartRef,
            &["plot", "salinity against depth", "chart", "correlation"],
        )
        .requiring("custom-charts"),
    ]
}

// =============================================================================
// Tests
// =============================================================================
