//! Semantic memory: static, priority-ordered project rules.
//!
//! Rules are read-only from the core's point of view. Only active rules are
//! ever returned, ordered by [`rule_order`]: priority descending, then
//! category, then insertion order.

use std::cmp::Ordering;

use hunter_types::ProjectRule;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::MemoryError;
use crate::store::sqlite::{now_rfc3339, parse_timestamp};

/// Total order used to present rules deterministically.
pub fn rule_order(a: &ProjectRule, b: &ProjectRule) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.category.cmp(&b.category))
        .then_with(|| a.id.cmp(&b.id))
}

/// Load every active rule, sorted by [`rule_order`].
pub fn load_active_rules(conn: &Connection) -> Result<Vec<ProjectRule>, MemoryError> {
    let mut stmt = conn.prepare(
        "SELECT id, category, rule_content, priority, is_active, created_at
         FROM project_rules
         WHERE is_active = 1",
    )?;
    let rows = stmt.query_map([], |row| {
        let created_at: String = row.get(5)?;
        Ok(ProjectRule {
            id: row.get(0)?,
            category: row.get(1)?,
            rule_content: row.get(2)?,
            priority: row.get(3)?,
            is_active: row.get(4)?,
            created_at: parse_timestamp(&created_at),
        })
    })?;
    let mut rules = rows.collect::<Result<Vec<_>, _>>()?;
    rules.sort_by(rule_order);
    Ok(rules)
}

/// A rule to seed into an empty rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRule {
    pub category: String,
    pub content: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_priority() -> i64 {
    1
}
fn default_active() -> bool {
    true
}

/// Insert `rules` when the table holds no rules yet; returns how many were
/// inserted. Rule authoring is administrative, so this never edits or
/// appends to an existing rule set.
pub fn seed_rules(conn: &Connection, rules: &[NewRule]) -> Result<usize, MemoryError> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM project_rules", [], |row| row.get(0))?;
    if existing > 0 || rules.is_empty() {
        return Ok(0);
    }
    let now = now_rfc3339();
    let mut stmt = conn.prepare(
        "INSERT INTO project_rules (category, rule_content, priority, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for rule in rules {
        stmt.execute(params![rule.category, rule.content, rule.priority, rule.active, now])?;
    }
    info!(count = rules.len(), "seeded project rules");
    Ok(rules.len())
}
