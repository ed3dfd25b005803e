//! Page context resolution: which chassis and which user the widget serves.
//!
//! DESIGN
//! ======
//! How the host page exposes its data is opaque here. A [`ContextProvider`]
//! returns a [`PageContext`] synchronously; this module only turns the raw
//! host data (chassis element attributes, greeting text) into typed ids and
//! owns the fixed retry schedule used while the host is still rendering.
//!
//! A page with no chassis is a normal state. Nothing in this module fails;
//! it returns `None` fields instead.

#[cfg(test)]
#[path = "context_test.rs"]
mod context_test;

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tracing::warn;

use crate::types::{ChassisId, Division};

/// Delay before retry `n` is `CONTEXT_RETRY_SCHEDULE_MS[n]`, clamped to the
/// last entry.
pub const CONTEXT_RETRY_SCHEDULE_MS: [u64; 7] = [500, 1000, 1000, 2000, 2000, 2000, 2000];
pub const MAX_CONTEXT_RETRIES: usize = 5;

const GREETING_PREFIX: &str = "Hello, ";

// =============================================================================
// PAGE CONTEXT
// =============================================================================

/// Identifiers that scope a conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageContext {
    pub chassis_id: Option<ChassisId>,
    pub user_name: Option<String>,
}

/// Source of page context. Re-invoked on every navigation and retry.
pub trait ContextProvider: Send + Sync {
    fn resolve(&self) -> PageContext;
}

/// Data attributes carried by the host page's chassis element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChassisElement {
    pub chassis_no: Option<String>,
    pub order_year: Option<String>,
    pub rei_url: Option<String>,
}

/// Latest known host page data, updated by the host before it signals a
/// navigation.
#[derive(Debug, Default)]
pub struct PageSnapshot {
    chassis: RwLock<Option<ChassisElement>>,
    greeting: RwLock<Option<String>>,
}

impl PageSnapshot {
    #[must_use]
    pub fn new(chassis: Option<ChassisElement>, greeting: Option<String>) -> Self {
        Self { chassis: RwLock::new(chassis), greeting: RwLock::new(greeting) }
    }

    pub fn set_chassis_element(&self, chassis: Option<ChassisElement>) {
        *self.chassis.write().unwrap_or_else(PoisonError::into_inner) = chassis;
    }

    pub fn set_greeting(&self, greeting: Option<String>) {
        *self.greeting.write().unwrap_or_else(PoisonError::into_inner) = greeting;
    }
}

impl ContextProvider for PageSnapshot {
    fn resolve(&self) -> PageContext {
        let chassis_id =
            self.chassis.read().unwrap_or_else(PoisonError::into_inner).as_ref().and_then(chassis_id_from_element);
        let user_name =
            self.greeting.read().unwrap_or_else(PoisonError::into_inner).as_deref().and_then(user_name_from_greeting);
        PageContext { chassis_id, user_name }
    }
}

// =============================================================================
// DIVISION RULES
// =============================================================================

/// A division is inferred when every fragment occurs in the page URL.
#[derive(Debug, Clone, Copy)]
pub struct DivisionRule {
    pub division: Division,
    pub fragments: &'static [&'static str],
}

/// Checked in order; the first matching rule wins.
pub const DIVISION_RULES: &[DivisionRule] = &[
    DivisionRule { division: Division::K, fragments: &["-kwr"] },
    DivisionRule { division: Division::K, fragments: &["webapp-test", "/REI/"] },
    DivisionRule { division: Division::P, fragments: &["pbdenton"] },
    DivisionRule { division: Division::P, fragments: &["webapp-test.", "/PB_REI/"] },
];

#[must_use]
pub fn infer_division(url: &str) -> Option<Division> {
    DIVISION_RULES
        .iter()
        .find(|rule| rule.fragments.iter().all(|f| url.contains(f)))
        .map(|rule| rule.division)
}

/// Build `C{chassisNo}_{division}20{orderYear}` from the element attributes.
#[must_use]
pub fn chassis_id_from_element(element: &ChassisElement) -> Option<ChassisId> {
    let chassis_no = non_empty(element.chassis_no.as_deref())?;
    let order_year = non_empty(element.order_year.as_deref())?;
    let url = non_empty(element.rei_url.as_deref())?;

    let Some(division) = infer_division(url) else {
        warn!(url, "context: no division rule matches chassis URL");
        return None;
    };

    let raw = format!("C{chassis_no}_{}20{order_year}", division.as_char());
    match ChassisId::parse(&raw) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(error = %e, "context: chassis attributes do not form a valid id");
            None
        }
    }
}

/// Strip the `Hello, ` greeting prefix from the host's user label.
#[must_use]
pub fn user_name_from_greeting(text: &str) -> Option<String> {
    let name = text.replace(GREETING_PREFIX, "");
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_owned())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// =============================================================================
// RETRY SCHEDULE
// =============================================================================

/// Retry counter for context resolution. Reset on every navigation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ContextRetry {
    retries: usize,
}

impl ContextRetry {
    #[must_use]
    pub fn retries(&self) -> usize {
        self.retries
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= MAX_CONTEXT_RETRIES {
            return None;
        }
        let idx = self.retries.min(CONTEXT_RETRY_SCHEDULE_MS.len() - 1);
        self.retries += 1;
        Some(Duration::from_millis(CONTEXT_RETRY_SCHEDULE_MS[idx]))
    }
}
