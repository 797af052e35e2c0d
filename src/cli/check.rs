//! `sudomode check`: validate a policy file, optionally dry-running an intent.

use crate::policy::parser::parse_policy_file;
use crate::policy::{DecisionStatus, Intent, Ruleset};
use anyhow::Result;
use colored::Colorize;
use std::path::Path;

pub fn run_check(policy_path: &Path, intent: Option<&Intent>) -> Result<()> {
    let policy = parse_policy_file(policy_path)?;
    let ruleset = Ruleset::compile(policy);

    println!();
    println!("  {} Policy parsed", "✓".green().bold());
    if let Some(ref description) = ruleset.policy().description {
        println!("  About: {}", description.cyan());
    }
    println!("  Rules: {}", ruleset.len());
    println!();
    for (i, rule) in ruleset.policy().rules.iter().enumerate() {
        println!("  {}. {}", i + 1, rule.describe());
    }

    let invalid = ruleset.invalid_conditions();
    println!();
    if invalid.is_empty() {
        println!("  {} All conditions compile.", "✓".green());
    } else {
        println!(
            "  {} {} {} will never match:",
            "!".yellow().bold(),
            invalid.len(),
            if invalid.len() == 1 { "rule" } else { "rules" }
        );
        for (rule, error) in &invalid {
            println!("    {} {}", rule.name.bold(), error.to_string().dimmed());
        }
    }

    if let Some(intent) = intent {
        let decision = ruleset.evaluate(intent);
        let status = match decision.status {
            DecisionStatus::Allow => decision.status.to_string().green(),
            DecisionStatus::Deny => decision.status.to_string().red(),
            DecisionStatus::RequireApproval => decision.status.to_string().yellow(),
        };
        println!();
        println!("  {} → {}", intent.to_string().bold(), status.bold());
        println!("  Reason: {}", decision.reason);
        if let Some(ref rule) = decision.matched_rule {
            println!("  Rule:   {}", rule.dimmed());
        }
    }

    println!();
    Ok(())
}
