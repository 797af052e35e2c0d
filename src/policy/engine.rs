//! Policy decision engine.
//!
//! Evaluates intents against an ordered rule list and returns a decision:
//! ALLOW, DENY, or REQUIRE_APPROVAL.
//!
//! Rules are evaluated **in order**: first match wins. A rule matches when
//! its resource and action patterns match and its condition (if any) holds.
//! A condition that fails to compile or evaluate makes its rule not match;
//! it never fails the evaluation. When nothing matches, the answer is DENY.
//!
//! Conditions are compiled once at load time, not per request. The whole
//! ruleset sits behind one `Arc` that `reload` swaps, so an evaluation in
//! flight sees either the old rules or the new ones, never a mix.

use crate::condition::{Condition, ConditionError, Scope};
use crate::policy::parser::load_policy_or_empty;
use crate::policy::types::*;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Policy engine holding the current ruleset snapshot.
pub struct PolicyEngine {
    ruleset: RwLock<Arc<Ruleset>>,
}

/// An immutable, pre-compiled rule list.
#[derive(Debug)]
pub struct Ruleset {
    /// The original policy (kept for logging/display)
    policy: Policy,
    compiled_rules: Vec<CompiledRule>,
}

#[derive(Debug)]
struct CompiledRule {
    rule: Rule,
    condition: CompiledCondition,
}

#[derive(Debug)]
enum CompiledCondition {
    Always,
    Expr(Condition),
    /// The expression did not parse; the rule can never match.
    Invalid(ConditionError),
}

impl Ruleset {
    /// Compile every rule's condition up front.
    pub fn compile(policy: Policy) -> Self {
        let compiled_rules = policy
            .rules
            .iter()
            .map(|rule| {
                let condition = match rule.condition.as_deref() {
                    None => CompiledCondition::Always,
                    Some(source) => match Condition::compile(source) {
                        Ok(condition) => CompiledCondition::Expr(condition),
                        Err(e) => {
                            tracing::warn!(
                                rule = %rule.name,
                                condition = source,
                                error = %e,
                                "Condition does not compile, rule will never match"
                            );
                            CompiledCondition::Invalid(e)
                        }
                    },
                };
                CompiledRule {
                    rule: rule.clone(),
                    condition,
                }
            })
            .collect();

        Self {
            policy,
            compiled_rules,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.compiled_rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled_rules.is_empty()
    }

    /// Rules whose condition failed to compile, with the reason.
    pub fn invalid_conditions(&self) -> Vec<(&Rule, &ConditionError)> {
        self.compiled_rules
            .iter()
            .filter_map(|c| match &c.condition {
                CompiledCondition::Invalid(e) => Some((&c.rule, e)),
                _ => None,
            })
            .collect()
    }

    /// Evaluate an intent against this ruleset.
    pub fn evaluate(&self, intent: &Intent) -> Decision {
        // Built on first use, then shared by every conditional rule.
        let mut scope: Option<Scope> = None;

        for compiled in &self.compiled_rules {
            let rule = &compiled.rule;
            if !rule.matches_resource(&intent.resource) || !rule.matches_action(&intent.action) {
                continue;
            }

            let matched = match &compiled.condition {
                CompiledCondition::Always => true,
                CompiledCondition::Invalid(e) => {
                    tracing::warn!(
                        rule = %rule.name,
                        error = %e,
                        "Skipping rule with invalid condition"
                    );
                    false
                }
                CompiledCondition::Expr(condition) => {
                    let scope = scope.get_or_insert_with(|| {
                        Scope::new(&intent.resource, &intent.action, &intent.args)
                    });
                    match condition.evaluate(scope) {
                        Ok(result) => result,
                        Err(e) => {
                            tracing::warn!(
                                rule = %rule.name,
                                condition = condition.source(),
                                error = %e,
                                "Condition evaluation failed, treating rule as non-matching"
                            );
                            false
                        }
                    }
                }
            };

            if matched {
                tracing::debug!(rule = %rule.name, status = %rule.decision, intent = %intent, "Rule matched");
                return Decision::new(rule.decision, rule.reason.clone())
                    .with_matched_rule(rule.name.clone());
            }
        }

        tracing::debug!(intent = %intent, "No rule matched, default deny");
        Decision::default_deny()
    }
}

impl PolicyEngine {
    /// Create a new engine from a parsed policy.
    pub fn new(policy: Policy) -> Self {
        Self {
            ruleset: RwLock::new(Arc::new(Ruleset::compile(policy))),
        }
    }

    /// An engine with no rules: it denies everything.
    pub fn empty() -> Self {
        Self::new(Policy::default())
    }

    /// Create an engine from a policy file. Missing or unparseable files
    /// produce an empty ruleset.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        Self::new(load_policy_or_empty(path))
    }

    /// Evaluate an intent against the current ruleset.
    ///
    /// Pure with respect to the snapshot: no side effects besides logging.
    pub fn evaluate(&self, intent: &Intent) -> Decision {
        self.snapshot().evaluate(intent)
    }

    /// The ruleset currently in force.
    pub fn snapshot(&self) -> Arc<Ruleset> {
        self.ruleset
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the ruleset atomically.
    pub fn reload(&self, policy: Policy) {
        let compiled = Arc::new(Ruleset::compile(policy));
        let count = compiled.len();
        *self.ruleset.write().unwrap_or_else(PoisonError::into_inner) = compiled;
        tracing::info!(rules = count, "Policy reloaded");
    }

    /// Re-read a policy file and swap it in. Returns the new rule count.
    pub fn reload_from_file(&self, path: impl AsRef<Path>) -> usize {
        let policy = load_policy_or_empty(path);
        let count = policy.rules.len();
        self.reload(policy);
        count
    }

    pub fn rule_count(&self) -> usize {
        self.snapshot().len()
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::parser::parse_policy_str;
    use serde_json::json;

    fn make_engine(yaml: &str) -> PolicyEngine {
        PolicyEngine::new(parse_policy_str(yaml).unwrap())
    }

    fn charge(amount: serde_json::Value) -> Intent {
        Intent::new("stripe.charge", "charge").with_arg("amount", amount)
    }

    const CHARGES: &str = r#"
rules:
  - name: small
    resource: stripe.charge
    action: charge
    condition: args.amount <= 50
    decision: ALLOW
    reason: small charge
  - name: large
    resource: stripe.charge
    action: charge
    condition: args.amount > 50
    decision: REQUIRE_APPROVAL
    reason: large charge
"#;

    #[test]
    fn test_conditions_select_rule() {
        let engine = make_engine(CHARGES);

        let decision = engine.evaluate(&charge(json!(30)));
        assert!(decision.is_allowed());
        assert_eq!(decision.matched_rule.as_deref(), Some("small"));

        let decision = engine.evaluate(&charge(json!(5000)));
        assert!(decision.is_requires_approval());
        assert_eq!(decision.reason, "large charge");
        assert!(decision.request_id.is_none());
    }

    #[test]
    fn test_empty_ruleset_denies() {
        let engine = PolicyEngine::empty();
        let decision = engine.evaluate(&Intent::new("database", "read"));
        assert_eq!(decision, Decision::default_deny());
    }

    #[test]
    fn test_no_match_denies() {
        let engine = make_engine(
            r#"
rules:
  - name: reads
    resource: database
    action: read
    decision: ALLOW
    reason: reads are fine
"#,
        );
        let decision = engine.evaluate(&Intent::new("database", "delete"));
        assert!(decision.is_denied());
        assert_eq!(decision.reason, NO_MATCH_REASON);
        assert!(decision.matched_rule.is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let engine = make_engine(
            r#"
rules:
  - name: block_deletes
    resource: database
    action: delete
    decision: DENY
    reason: no deletes
  - name: everything
    resource: "*"
    action: "*"
    decision: ALLOW
    reason: open
"#,
        );
        assert!(engine.evaluate(&Intent::new("database", "delete")).is_denied());
        assert!(engine.evaluate(&Intent::new("database", "read")).is_allowed());
        assert!(engine.evaluate(&Intent::new("s3", "put")).is_allowed());
    }

    #[test]
    fn test_condition_error_falls_through() {
        let engine = make_engine(
            r#"
rules:
  - name: typed
    resource: stripe.charge
    action: charge
    condition: args.amount > 50
    decision: ALLOW
    reason: numeric
  - name: fallback
    resource: stripe.charge
    action: charge
    decision: REQUIRE_APPROVAL
    reason: fallback
"#,
        );

        // Missing key and wrong type both skip the first rule.
        let decision = engine.evaluate(&Intent::new("stripe.charge", "charge"));
        assert_eq!(decision.matched_rule.as_deref(), Some("fallback"));
        let decision = engine.evaluate(&charge(json!("a lot")));
        assert_eq!(decision.matched_rule.as_deref(), Some("fallback"));
    }

    #[test]
    fn test_malformed_condition_never_matches() {
        let engine = make_engine(
            r#"
rules:
  - name: broken
    condition: "args.amount >>> 1"
    decision: ALLOW
    reason: broken
"#,
        );
        assert!(engine.evaluate(&charge(json!(1))).is_denied());

        let snapshot = engine.snapshot();
        let invalid = snapshot.invalid_conditions();
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].0.name, "broken");
    }

    #[test]
    fn test_condition_sees_resource_and_action() {
        let engine = make_engine(
            r#"
rules:
  - name: reads_anywhere
    condition: action == 'read' and resource != 'secrets'
    decision: ALLOW
    reason: reads
"#,
        );
        assert!(engine.evaluate(&Intent::new("database", "read")).is_allowed());
        assert!(engine.evaluate(&Intent::new("secrets", "read")).is_denied());
    }

    #[test]
    fn test_reload_swaps_ruleset() {
        let engine = PolicyEngine::empty();
        let intent = Intent::new("database", "read");
        assert!(engine.evaluate(&intent).is_denied());

        engine.reload(
            parse_policy_str(
                "rules:\n  - name: open\n    decision: ALLOW\n    reason: open\n",
            )
            .unwrap(),
        );
        assert_eq!(engine.rule_count(), 1);
        assert!(engine.evaluate(&intent).is_allowed());
    }

    #[test]
    fn test_snapshot_survives_reload() {
        let engine = make_engine(CHARGES);
        let before = engine.snapshot();
        engine.reload(Policy::default());

        // The old snapshot still answers with the old rules.
        assert!(before.evaluate(&charge(json!(1))).is_allowed());
        assert!(engine.evaluate(&charge(json!(1))).is_denied());
    }
}
