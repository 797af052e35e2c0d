//! YAML policy parser for SudoMode.
//!
//! Parses policy files into the internal Policy struct. The format is an
//! ordered rule list; order is precedence.
//!
//! # Example policy file:
//! ```yaml
//! rules:
//!   - name: small_charges
//!     resource: stripe.charge
//!     action: charge
//!     condition: args.amount <= 50
//!     decision: ALLOW
//!     reason: Small charges are auto-approved
//!   - name: large_charges
//!     resource: stripe.charge
//!     action: charge
//!     condition: args.amount > 50
//!     decision: REQUIRE_APPROVAL
//!     reason: Charges over $50 need a human
//! ```

use crate::policy::types::*;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Raw YAML representation before conversion to internal types.
#[derive(Debug, Deserialize)]
struct RawPolicy {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    rules: Option<Vec<RawRule>>,
}

/// A rule as it appears in the YAML file. Everything is optional here so
/// defaults can be applied in one place.
#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    decision: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Parse a YAML policy file from a file path.
pub fn parse_policy_file(path: impl AsRef<Path>) -> Result<Policy> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read policy file: {}", path.display()))?;
    parse_policy_str(&content)
        .with_context(|| format!("Failed to parse policy file: {}", path.display()))
}

/// Parse a YAML policy string into a Policy struct.
pub fn parse_policy_str(yaml: &str) -> Result<Policy> {
    // An empty document is an empty policy.
    if yaml.trim().is_empty() {
        return Ok(Policy::default());
    }

    let raw: RawPolicy =
        serde_yaml::from_str(yaml).context("Invalid YAML syntax in policy file")?;

    let raw_rules = raw.rules.unwrap_or_default();
    let mut rules = Vec::with_capacity(raw_rules.len());
    for (i, raw_rule) in raw_rules.into_iter().enumerate() {
        let rule = convert_rule(raw_rule, i)
            .with_context(|| format!("Invalid rule at position {} (0-indexed)", i))?;
        rules.push(rule);
    }

    Ok(Policy {
        description: raw.description,
        rules,
    })
}

/// Load a policy for serving. A missing file or a file that fails to parse
/// yields an empty policy (so everything is denied) instead of an error.
pub fn load_policy_or_empty(path: impl AsRef<Path>) -> Policy {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!(
            path = %path.display(),
            "Policy file not found, starting with an empty ruleset (default deny)"
        );
        return Policy::default();
    }

    match parse_policy_file(path) {
        Ok(policy) => policy,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %format!("{:#}", e),
                "Policy file is invalid, starting with an empty ruleset (default deny)"
            );
            Policy::default()
        }
    }
}

/// Convert a raw YAML rule into a typed Rule, applying defaults.
fn convert_rule(raw: RawRule, index: usize) -> Result<Rule> {
    let name = raw
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("rule-{}", index + 1));

    let decision = match raw.decision {
        Some(ref s) => DecisionStatus::from_str_loose(s)
            .ok_or_else(|| anyhow!("Unknown decision '{}' in rule '{}'", s, name))?,
        None => DecisionStatus::Deny,
    };

    let reason = raw
        .reason
        .unwrap_or_else(|| format!("Matched rule: {}", name));

    // An empty condition string means "no condition".
    let condition = raw.condition.filter(|c| !c.trim().is_empty());

    Ok(Rule {
        name,
        resource: raw.resource.unwrap_or_else(|| WILDCARD.to_string()),
        action: raw.action.unwrap_or_else(|| WILDCARD.to_string()),
        condition,
        decision,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_basic_policy() {
        let yaml = r#"
rules:
  - name: small_charges
    resource: stripe.charge
    action: charge
    condition: args.amount <= 50
    decision: ALLOW
    reason: Small charges are fine
  - name: deny_deletes
    resource: database
    action: delete
    decision: DENY
    reason: Never delete
"#;
        let policy = parse_policy_str(yaml).unwrap();
        assert_eq!(policy.rules.len(), 2);
        assert_eq!(policy.rules[0].name, "small_charges");
        assert_eq!(policy.rules[0].condition.as_deref(), Some("args.amount <= 50"));
        assert_eq!(policy.rules[0].decision, DecisionStatus::Allow);
        assert_eq!(policy.rules[1].decision, DecisionStatus::Deny);
    }

    #[test]
    fn test_defaults_applied() {
        let yaml = r#"
rules:
  - name: catch_all
  - decision: allow
"#;
        let policy = parse_policy_str(yaml).unwrap();
        let first = &policy.rules[0];
        assert_eq!(first.resource, "*");
        assert_eq!(first.action, "*");
        assert_eq!(first.decision, DecisionStatus::Deny);
        assert_eq!(first.reason, "Matched rule: catch_all");
        assert!(first.condition.is_none());

        assert_eq!(policy.rules[1].name, "rule-2");
        assert_eq!(policy.rules[1].decision, DecisionStatus::Allow);
    }

    #[test]
    fn test_order_is_preserved() {
        let yaml = r#"
rules:
  - name: a
  - name: b
  - name: c
"#;
        let names: Vec<_> = parse_policy_str(yaml)
            .unwrap()
            .rules
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_documents() {
        assert!(parse_policy_str("").unwrap().rules.is_empty());
        assert!(parse_policy_str("rules: []").unwrap().rules.is_empty());
        assert!(parse_policy_str("description: nothing yet").unwrap().rules.is_empty());
    }

    #[test]
    fn test_reject_unknown_decision() {
        let yaml = r#"
rules:
  - name: odd
    decision: MAYBE
"#;
        assert!(parse_policy_str(yaml).is_err());
    }

    #[test]
    fn test_reject_invalid_yaml() {
        assert!(parse_policy_str("rules: [ {name: ").is_err());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let policy = load_policy_or_empty(tmp.path().join("nope.yaml"));
        assert!(policy.rules.is_empty());
    }

    #[test]
    fn test_load_broken_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.yaml");
        std::fs::write(&path, "rules:\n  - decision: SOMETIMES\n").unwrap();
        assert!(load_policy_or_empty(&path).rules.is_empty());
    }
}
