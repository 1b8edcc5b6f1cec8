//! User selection strategies
//!
//! A selector picks the user who receives the next assignment for a rule.
//! Round robin walks `users` after the rule's `last_user` cursor; load
//! balancing picks whoever currently holds the fewest open assignments for
//! the rule's document type.

use crate::error::{RotaError, RotaResult};
use crate::rule::{AssignmentRule, RuleKind, fields};
use crate::store::AssignmentStore;
use tracing::debug;

/// Strategy for choosing the next assignee of a rule
pub trait UserSelector: Send + Sync {
    /// Pick a user from `rule.users`
    fn select(&self, rule: &AssignmentRule, assignments: &dyn AssignmentStore) -> RotaResult<String>;

    /// Strategy name for logging
    fn name(&self) -> &'static str;
}

/// Cycles through users in order
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinSelector;

/// Picks the user with the fewest open assignments
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadBalancingSelector;

static ROUND_ROBIN: RoundRobinSelector = RoundRobinSelector;
static LOAD_BALANCING: LoadBalancingSelector = LoadBalancingSelector;

/// Selector implementing a rule kind
pub fn selector_for(kind: RuleKind) -> &'static dyn UserSelector {
    match kind {
        RuleKind::RoundRobin => &ROUND_ROBIN,
        RuleKind::LoadBalancing => &LOAD_BALANCING,
    }
}

fn require_users(rule: &AssignmentRule) -> RotaResult<()> {
    if rule.users.is_empty() {
        return Err(RotaError::configuration(&rule.name, fields::USERS, "rule has no users to assign"));
    }
    Ok(())
}

/// Next user after `last_user`, wrapping to the start
///
/// An unset cursor, a cursor on the last user, or a cursor naming someone no
/// longer in the list all restart at the first user.
pub fn next_round_robin<'a>(users: &'a [String], last_user: Option<&str>) -> Option<&'a str> {
    let first = users.first()?;
    // A cursor on the last entry wraps even if that user also appears earlier
    if last_user.is_some() && users.last().map(String::as_str) == last_user {
        return Some(first.as_str());
    }
    let next = last_user
        .and_then(|last| users.iter().position(|user| user == last))
        .and_then(|index| users.get(index + 1))
        .unwrap_or(first);
    Some(next.as_str())
}

impl UserSelector for RoundRobinSelector {
    fn select(&self, rule: &AssignmentRule, _assignments: &dyn AssignmentStore) -> RotaResult<String> {
        require_users(rule)?;
        next_round_robin(&rule.users, rule.last_user.as_deref())
            .map(str::to_string)
            .ok_or_else(|| RotaError::configuration(&rule.name, fields::USERS, "rule has no users to assign"))
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

impl UserSelector for LoadBalancingSelector {
    fn select(&self, rule: &AssignmentRule, assignments: &dyn AssignmentStore) -> RotaResult<String> {
        require_users(rule)?;

        let mut counts = Vec::with_capacity(rule.users.len());
        for user in &rule.users {
            let open = assignments.open_count(user, &rule.document_type)?;
            counts.push((user, open));
        }

        // Stable: equal loads keep list order
        counts.sort_by_key(|(_, open)| *open);
        debug!(rule = %rule.name, ?counts, "Load balancing candidates");

        counts
            .first()
            .map(|(user, _)| (*user).clone())
            .ok_or_else(|| RotaError::configuration(&rule.name, fields::USERS, "rule has no users to assign"))
    }

    fn name(&self) -> &'static str {
        "load_balancing"
    }
}
