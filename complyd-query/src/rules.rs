//! Textual rewrite rules applied to queries before execution.
//!
//! Rules are pure pattern/replacement substitutions over raw SQL text,
//! applied in order, each independently toggleable, with later rules
//! seeing the output of earlier ones. There is no SQL parser behind
//! them: a pattern can in principle match inside a string literal or a
//! comment and corrupt the statement. Callers feeding adversarial text
//! should disable the rule set.

use regex::{Captures, Regex};

/// One pattern/replacement pair.
///
/// The `regex` crate supports neither lookarounds nor backreferences,
/// so a rule may carry a `skip_if` anti-pattern ("do nothing when this
/// already matches") and a per-match `guard` (for constraints like
/// "both captures name the same column").
pub struct RewriteRule {
    pub name: &'static str,
    pub rationale: &'static str,
    pub enabled: bool,
    pattern: Regex,
    replacement: &'static str,
    skip_if: Option<Regex>,
    guard: Option<fn(&Captures) -> bool>,
}

impl RewriteRule {
    /// Applies the rule once over the whole text. Returns the rewritten
    /// text only when something actually changed.
    pub fn apply(&self, query: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        if let Some(skip) = &self.skip_if {
            if skip.is_match(query) {
                return None;
            }
        }
        if !self.pattern.is_match(query) {
            return None;
        }

        let rewritten = self.pattern.replace_all(query, |caps: &Captures| {
            if self.guard.map_or(true, |guard| guard(caps)) {
                let mut expanded = String::new();
                caps.expand(self.replacement, &mut expanded);
                expanded
            } else {
                caps[0].to_string()
            }
        });

        if rewritten != query {
            Some(rewritten.into_owned())
        } else {
            None
        }
    }
}

fn same_column(caps: &Captures) -> bool {
    match (caps.name("col1"), caps.name("col2")) {
        (Some(a), Some(b)) => a.as_str().eq_ignore_ascii_case(b.as_str()),
        _ => false,
    }
}

/// The outcome of running a query through the full rule pipeline.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub rewritten: String,
    pub applied: Vec<&'static str>,
}

/// Ordered, cumulative rule pipeline. Applying the pipeline twice to
/// its own output yields the same text: no rule re-triggers on what it
/// produced.
pub struct RuleSet {
    rules: Vec<RewriteRule>,
}

impl RuleSet {
    /// The standard rule set, in application order.
    pub fn standard() -> Self {
        let rules = vec![
            RewriteRule {
                name: "bounded-select",
                rationale: "an unbounded SELECT can drag an entire table over the wire",
                enabled: true,
                pattern: Regex::new(r"(?is)^\s*(?P<q>select\b.*\bfrom\b.*?)[\s;]*$")
                    .expect("static pattern"),
                replacement: "${q} LIMIT 1000",
                skip_if: Some(Regex::new(r"(?i)\blimit\s+\d+").expect("static pattern")),
                guard: None,
            },
            RewriteRule {
                name: "normalize-count",
                rationale: "a canonical COUNT(*) spelling keeps plans comparable",
                enabled: true,
                pattern: Regex::new(r"(?i)\bcount\s*\(\s*\*\s*\)").expect("static pattern"),
                replacement: "COUNT(*)",
                skip_if: None,
                guard: None,
            },
            RewriteRule {
                name: "tenant-index-hint",
                rationale: "tenant-scoped lookups on notifications should use the tenant index",
                enabled: true,
                pattern: Regex::new(r"(?i)\bfrom\s+notifications\s+where\s+tenant_id\b")
                    .expect("static pattern"),
                replacement:
                    "FROM notifications /*+ IndexScan(notifications idx_notifications_tenant) */ WHERE tenant_id",
                skip_if: None,
                guard: None,
            },
            RewriteRule {
                name: "case-insensitive-match",
                rationale: "substring matching on mixed-case data wants ILIKE",
                enabled: true,
                pattern: Regex::new(r"(?i)\blike\b").expect("static pattern"),
                replacement: "ILIKE",
                skip_if: None,
                guard: None,
            },
            RewriteRule {
                name: "range-to-between",
                rationale: "a single range operator reads better to the planner",
                enabled: true,
                pattern: Regex::new(
                    r"(?i)\b(?P<col1>[\w.]+)\s*>=\s*(?P<lo>'[^']*'|[\w.]+)\s+and\s+(?P<col2>[\w.]+)\s*<=\s*(?P<hi>'[^']*'|[\w.]+)",
                )
                .expect("static pattern"),
                replacement: "${col1} BETWEEN ${lo} AND ${hi}",
                skip_if: None,
                guard: Some(same_column),
            },
        ];
        Self { rules }
    }

    /// Runs every enabled rule in order; non-matching rules are no-ops.
    pub fn apply(&self, query: &str) -> RewriteOutcome {
        let mut rewritten = query.to_string();
        let mut applied = Vec::new();
        for rule in &self.rules {
            if let Some(next) = rule.apply(&rewritten) {
                tracing::debug!(rule = rule.name, "rewrite rule applied");
                rewritten = next;
                applied.push(rule.name);
            }
        }
        RewriteOutcome { rewritten, applied }
    }

    /// Toggles one rule by name. Returns false for an unknown name.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.rules.iter_mut().find(|rule| rule.name == name) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unbounded_select_gets_row_cap() {
        let rules = RuleSet::standard();
        let outcome = rules.apply("SELECT * FROM screenings WHERE status = 'open'");
        assert_eq!(
            outcome.rewritten,
            "SELECT * FROM screenings WHERE status = 'open' LIMIT 1000"
        );
        assert!(outcome.applied.contains(&"bounded-select"));
    }

    #[test]
    fn bounded_select_is_untouched() {
        let rules = RuleSet::standard();
        let query = "SELECT * FROM screenings LIMIT 50";
        let outcome = rules.apply(query);
        assert_eq!(outcome.rewritten, query);
        assert!(!outcome.applied.contains(&"bounded-select"));
    }

    #[test]
    fn trailing_semicolon_does_not_break_row_cap() {
        let rules = RuleSet::standard();
        let outcome = rules.apply("SELECT id FROM cases;");
        assert_eq!(outcome.rewritten, "SELECT id FROM cases LIMIT 1000");
    }

    #[test]
    fn count_star_is_normalized() {
        let rules = RuleSet::standard();
        let outcome = rules.apply("SELECT count( * ) FROM users LIMIT 1");
        assert_eq!(outcome.rewritten, "SELECT COUNT(*) FROM users LIMIT 1");
        assert!(outcome.applied.contains(&"normalize-count"));
    }

    #[test]
    fn tenant_lookup_gets_index_hint() {
        let rules = RuleSet::standard();
        let outcome = rules.apply("SELECT * FROM notifications WHERE tenant_id = 'abc'");
        assert!(outcome
            .rewritten
            .contains("/*+ IndexScan(notifications idx_notifications_tenant) */"));
        assert!(outcome.applied.contains(&"tenant-index-hint"));
    }

    #[test]
    fn like_becomes_ilike() {
        let rules = RuleSet::standard();
        let outcome = rules.apply("SELECT id FROM users WHERE name LIKE '%smith%' LIMIT 10");
        assert_eq!(
            outcome.rewritten,
            "SELECT id FROM users WHERE name ILIKE '%smith%' LIMIT 10"
        );
    }

    #[test]
    fn conjoined_range_becomes_between() {
        let rules = RuleSet::standard();
        let outcome =
            rules.apply("SELECT id FROM cases WHERE score >= 10 AND score <= 90 LIMIT 5");
        assert_eq!(
            outcome.rewritten,
            "SELECT id FROM cases WHERE score BETWEEN 10 AND 90 LIMIT 5"
        );
    }

    #[test]
    fn range_on_different_columns_is_untouched() {
        let rules = RuleSet::standard();
        let query = "SELECT id FROM cases WHERE low >= 10 AND high <= 90 LIMIT 5";
        let outcome = rules.apply(query);
        assert_eq!(outcome.rewritten, query);
        assert!(!outcome.applied.contains(&"range-to-between"));
    }

    #[test]
    fn pipeline_is_idempotent() {
        let rules = RuleSet::standard();
        let queries = [
            "SELECT * FROM notifications WHERE tenant_id = 'abc'",
            "SELECT count(*) FROM users WHERE name LIKE '%a%'",
            "SELECT id FROM cases WHERE score >= 10 AND score <= 90",
            "UPDATE users SET name = 'x' WHERE id = 1",
        ];
        for query in queries {
            let once = rules.apply(query).rewritten;
            let twice = rules.apply(&once).rewritten;
            assert_eq!(twice, once, "pipeline not idempotent for: {}", query);
        }
    }

    #[test]
    fn disabled_rule_is_skipped() {
        let mut rules = RuleSet::standard();
        assert!(rules.set_enabled("bounded-select", false));
        let query = "SELECT * FROM screenings";
        let outcome = rules.apply(query);
        assert_eq!(outcome.rewritten, query);
    }

    #[test]
    fn unknown_rule_name_is_reported() {
        let mut rules = RuleSet::standard();
        assert!(!rules.set_enabled("no-such-rule", false));
    }

    #[test]
    fn mutating_statements_pass_through() {
        let rules = RuleSet::standard();
        let query = "DELETE FROM sessions WHERE expired_at < '2026-01-01'";
        let outcome = rules.apply(query);
        assert_eq!(outcome.rewritten, query);
        assert!(outcome.applied.is_empty());
    }
}
