//! Access stage resolution
//!
//! Combines the three independently sourced facts about a visitor
//! (session, profile, entitlement) into the one funnel stage they may see.
//! This is the only place the three facts are combined. Everything here is
//! synchronous and performs no I/O so route guards can call it with facts
//! they have already gathered.

use serde::{Deserialize, Serialize};

/// The three facts that decide which funnel stage a visitor sees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessFacts {
    /// Owned by the session layer
    pub is_authenticated: bool,
    /// Owned by the profile record
    pub onboarding_completed: bool,
    /// Owned by the external entitlement source
    pub is_entitled: bool,
}

impl AccessFacts {
    pub fn new(is_authenticated: bool, onboarding_completed: bool, is_entitled: bool) -> Self {
        Self {
            is_authenticated,
            onboarding_completed,
            is_entitled,
        }
    }

    /// Build facts from lookups that may have failed or returned "unknown".
    ///
    /// `None` becomes `false` for that fact only, so a failing source can
    /// only push the outcome toward `Onboarding`/`Paywall`.
    pub fn from_lookups(
        is_authenticated: Option<bool>,
        onboarding_completed: Option<bool>,
        is_entitled: Option<bool>,
    ) -> Self {
        Self {
            is_authenticated: is_authenticated.unwrap_or(false),
            onboarding_completed: onboarding_completed.unwrap_or(false),
            is_entitled: is_entitled.unwrap_or(false),
        }
    }
}

/// Funnel stage a visitor is allowed to see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Funnel entry: anonymous visitors and users with onboarding pending
    Onboarding,
    /// Authenticated and onboarded, but no entitlement yet
    Paywall,
    /// Fully entitled
    Dashboard,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Onboarding, Stage::Paywall, Stage::Dashboard];

    /// Navigable destination for this stage
    pub fn route(self) -> &'static str {
        match self {
            Stage::Onboarding => "/onboarding",
            Stage::Paywall => "/paywall",
            Stage::Dashboard => "/dashboard",
        }
    }

    /// Reverse of [`Stage::route`]. Trailing slashes are ignored.
    pub fn from_route(route: &str) -> Option<Stage> {
        let trimmed = route.trim();
        let normalized = if trimmed.len() > 1 {
            trimmed.trim_end_matches('/')
        } else {
            trimmed
        };
        Stage::ALL.into_iter().find(|stage| stage.route() == normalized)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Onboarding => "onboarding",
            Stage::Paywall => "paywall",
            Stage::Dashboard => "dashboard",
        };
        f.write_str(name)
    }
}

/// Resolve the stage for a set of facts. First matching row wins.
pub fn resolve(facts: AccessFacts) -> Stage {
    match (
        facts.is_authenticated,
        facts.onboarding_completed,
        facts.is_entitled,
    ) {
        (false, _, _) => Stage::Onboarding,
        (true, false, _) => Stage::Onboarding,
        (true, true, false) => Stage::Paywall,
        (true, true, true) => Stage::Dashboard,
    }
}

/// Outcome of a route guard check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    /// The requested destination is the resolved stage
    Allow { stage: Stage },
    /// Send the visitor to the resolved stage instead
    Redirect { stage: Stage, to: String },
}

/// Decide whether `requested` may be rendered for these facts.
///
/// Unknown destinations never render; they redirect to the resolved stage.
pub fn guard(requested: &str, facts: AccessFacts) -> GuardDecision {
    let stage = resolve(facts);
    match Stage::from_route(requested) {
        Some(requested_stage) if requested_stage == stage => GuardDecision::Allow { stage },
        _ => GuardDecision::Redirect {
            stage,
            to: stage.route().to_string(),
        },
    }
}
