//! Finalize-time validation of a step tree.

use super::builder::StepBuilder;
use super::types::{IdempotentStrategy, StepId};
use crate::errors::{codes, Violation};

/// Walks the tree rooted at `root` and returns every violation found.
pub(crate) fn validate(root: &StepBuilder) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut ancestors = Vec::new();
    walk(root, "root", &mut ancestors, &mut violations);
    violations
}

fn walk(
    step: &StepBuilder,
    path: &str,
    ancestors: &mut Vec<StepId>,
    violations: &mut Vec<Violation>,
) {
    check_step(step, path, violations);

    ancestors.push(step.id);

    let children = [
        ("on_success", step.on_success.as_deref()),
        ("on_failure", step.on_failure.as_deref()),
        ("fallback", step.fallback.as_ref().map(|(child, _)| child.as_ref())),
    ];

    for (edge, child) in children {
        let Some(child) = child else { continue };
        let child_path = format!("{path}.{edge}");

        if ancestors.contains(&child.id) {
            violations.push(Violation::new(
                codes::CYCLE,
                &child_path,
                format!("step '{}' is reachable from itself", child.label()),
            ));
            continue;
        }

        walk(child, &child_path, ancestors, violations);
    }

    ancestors.pop();
}

fn check_step(step: &StepBuilder, path: &str, violations: &mut Vec<Violation>) {
    if step.target.url.trim().is_empty() {
        violations.push(Violation::new(codes::EMPTY_URL, path, "target url is required"));
    }

    if reqwest::Method::from_bytes(step.target.method.as_bytes()).is_err() {
        violations.push(Violation::new(
            codes::METHOD,
            path,
            format!("'{}' is not a valid HTTP method", step.target.method),
        ));
    }

    if step.idempotent_strategy == IdempotentStrategy::Custom
        && step.idempotent_key.as_deref().map_or(true, |k| k.trim().is_empty())
    {
        violations.push(Violation::new(
            codes::CUSTOM_KEY,
            path,
            "CUSTOM idempotency strategy requires a non-empty key",
        ));
    }

    for (i, hook) in step.webhooks.iter().enumerate() {
        if hook.url.trim().is_empty() {
            violations.push(Violation::new(
                codes::WEBHOOK_URL,
                path,
                format!("webhook #{i} has an empty url"),
            ));
        }
    }

    if let Some(quorum) = step.webhook_quorum {
        let voting = step.webhooks.iter().filter(|h| h.has_quorum_vote).count();
        if quorum == 0 {
            violations.push(Violation::new(codes::QUORUM, path, "webhook quorum must be at least 1"));
        } else if quorum as usize > voting {
            violations.push(Violation::new(
                codes::QUORUM,
                path,
                format!("webhook quorum {quorum} exceeds {voting} voting webhook(s)"),
            ));
        }
    }

    if step.regions.iter().any(|r| r.trim().is_empty()) {
        violations.push(Violation::new(codes::REGION, path, "region identifiers must be non-empty"));
    }

    if let Some(ref policy) = step.retry_policy {
        if policy.max_retries > 0 && policy.retry_codes.is_empty() {
            violations.push(Violation::new(
                codes::RETRY_CODES,
                path,
                format!("max_retries is {} but no retry codes are set", policy.max_retries),
            ));
        }
        if policy.max_reroutes > 0 && policy.reroute_codes.is_empty() {
            violations.push(Violation::new(
                codes::RETRY_CODES,
                path,
                format!("max_reroutes is {} but no reroute codes are set", policy.max_reroutes),
            ));
        }
    }

    if step.local_timeout.is_zero() {
        violations.push(Violation::new(codes::TIMEOUT, path, "local timeout must be greater than zero"));
    }

    if let Some((_, ref triggers)) = step.fallback {
        if triggers.is_empty() {
            violations.push(Violation::new(
                codes::FALLBACK_TRIGGER,
                format!("{path}.fallback"),
                "fallback requires at least one trigger status",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{RetryPolicy, Webhook};
    use std::time::Duration;

    fn step(url: &str) -> StepBuilder {
        StepBuilder::new().url(url)
    }

    #[test]
    fn test_valid_tree_has_no_violations() {
        let root = step("https://a.example.com")
            .on_success(step("https://b.example.com"))
            .on_failure(step("https://c.example.com"))
            .fallback(step("https://d.example.com"), [500]);

        assert!(validate(&root).is_empty());
    }

    #[test]
    fn test_self_attachment_is_a_cycle() {
        let a = step("https://a.example.com");
        let root = a.clone().on_success(a);

        let violations = validate(&root);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, codes::CYCLE);
        assert_eq!(violations[0].path, "root.on_success");
    }

    #[test]
    fn test_deep_cycle_is_detected() {
        let a = step("https://a.example.com");
        let b = step("https://b.example.com").on_failure(a.clone());
        let root = a.on_success(step("https://c.example.com").fallback(b, [503]));

        let violations = validate(&root);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, codes::CYCLE);
        assert_eq!(violations[0].path, "root.on_success.fallback.on_failure");
    }

    #[test]
    fn test_reuse_in_sibling_branches_is_allowed() {
        let shared = step("https://notify.example.com");
        let root = step("https://a.example.com")
            .on_success(shared.clone())
            .on_failure(shared);

        assert!(validate(&root).is_empty());
    }

    #[test]
    fn test_empty_fallback_trigger_rejected() {
        let root = step("https://a.example.com").fallback(step("https://b.example.com"), []);

        let violations = validate(&root);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, codes::FALLBACK_TRIGGER);
    }

    #[test]
    fn test_quorum_counts_only_voting_webhooks() {
        let root = step("https://a.example.com")
            .webhook(Webhook::new("https://h1.example.com"))
            .webhook(Webhook::new("https://h2.example.com").non_voting())
            .webhook_quorum(2);

        let violations = validate(&root);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("1 voting"));
    }

    #[test]
    fn test_quorum_equal_to_voting_is_fine() {
        let root = step("https://a.example.com")
            .webhook(Webhook::new("https://h1.example.com"))
            .webhook(Webhook::new("https://h2.example.com"))
            .webhook_quorum(2);

        assert!(validate(&root).is_empty());
    }

    #[test]
    fn test_child_violations_carry_their_path() {
        let root = step("https://a.example.com").on_failure(step(""));

        let violations = validate(&root);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "root.on_failure");
        assert_eq!(violations[0].code, codes::EMPTY_URL);
    }

    #[test]
    fn test_structural_retry_checks() {
        let policy = RetryPolicy {
            max_retries: 2,
            max_reroutes: 1,
            ..RetryPolicy::default()
        };
        let root = step("https://a.example.com")
            .retry_policy(policy)
            .local_timeout(Duration::ZERO);

        let violations = validate(&root);
        let retry = violations.iter().filter(|v| v.code == codes::RETRY_CODES).count();
        assert_eq!(retry, 2);
        assert!(violations.iter().any(|v| v.code == codes::TIMEOUT));
    }

    #[test]
    fn test_invalid_method_rejected() {
        let root = step("https://a.example.com").method("GE T");

        let violations = validate(&root);
        assert!(violations.iter().any(|v| v.code == codes::METHOD));
    }
}
