// crates/gait-core/tests/policy.rs
// ============================================================================
// Module: Policy Evaluation Tests
// Description: Verifies rule ordering, fail-closed, dataflow, and determinism.
// ============================================================================
//! ## Overview
//! Exercises the gate pipeline end to end: first-match-wins ordering,
//! fail-closed required fields, dataflow overlays, and byte-identical
//! results for repeated evaluations.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use gait_core::gate::policy;
use gait_core::gate::policy::EvalOptions;
use gait_core::schema::gate::IntentArgProvenance;
use gait_core::schema::gate::IntentContext;
use gait_core::schema::gate::IntentRequest;
use gait_core::schema::gate::IntentTarget;
use gait_core::schema::gate::Verdict;
use serde_json::Map;

fn intent_with_target(tool_name: &str, risk_class: &str, target: IntentTarget) -> IntentRequest {
    IntentRequest {
        tool_name: tool_name.to_string(),
        args: Map::new(),
        targets: vec![target],
        context: IntentContext {
            identity: "agent@example".to_string(),
            workspace: "/repo/demo".to_string(),
            risk_class: risk_class.to_string(),
            ..IntentContext::default()
        },
        ..IntentRequest::default()
    }
}

fn external_host_policy() -> policy::Policy {
    policy::parse_policy_yaml(
        br#"
default_verdict: allow
rules:
  - name: block-external-host
    priority: 1
    effect: block
    match:
      tool_names: [tool.write]
      target_kinds: [host]
      target_values: [api.external.com]
      risk_classes: [high]
    reason_codes: [blocked_external]
    violations: [external_target]
"#,
    )
    .expect("parse policy")
}

#[test]
fn block_external_host_scenario() {
    let intent = intent_with_target(
        "tool.write",
        "high",
        IntentTarget {
            kind: "host".to_string(),
            value: "api.external.com".to_string(),
            operation: String::new(),
            sensitivity: String::new(),
        },
    );

    let result =
        policy::evaluate_policy(&external_host_policy(), &intent, &EvalOptions::default())
            .expect("evaluate");
    assert_eq!(result.verdict, Verdict::Block);
    assert_eq!(result.reason_codes, vec!["blocked_external".to_string()]);
    assert_eq!(result.violations, vec!["external_target".to_string()]);
}

#[test]
fn repeated_evaluations_are_byte_identical() {
    let intent = intent_with_target(
        "tool.write",
        "high",
        IntentTarget {
            kind: "host".to_string(),
            value: "api.external.com".to_string(),
            operation: String::new(),
            sensitivity: String::new(),
        },
    );
    let policy = external_host_policy();

    let first = policy::evaluate_policy(&policy, &intent, &EvalOptions::default()).expect("first");
    let second =
        policy::evaluate_policy(&policy, &intent, &EvalOptions::default()).expect("second");

    let first_bytes = gait_core::canonical_json_bytes(&first).expect("encode first");
    let second_bytes = gait_core::canonical_json_bytes(&second).expect("encode second");
    assert_eq!(first_bytes, second_bytes);
}

#[test]
fn fail_closed_reports_missing_required_fields() {
    let policy = policy::parse_policy_yaml(
        br#"
fail_closed:
  enabled: true
  risk_classes: [high]
  required_fields: [targets, arg_provenance]
"#,
    )
    .expect("parse policy");

    let intent = IntentRequest {
        tool_name: "tool.write".to_string(),
        args: Map::new(),
        context: IntentContext {
            identity: "agent@example".to_string(),
            workspace: "/repo".to_string(),
            risk_class: "high".to_string(),
            ..IntentContext::default()
        },
        ..IntentRequest::default()
    };

    let result = policy::evaluate_policy(&policy, &intent, &EvalOptions::default())
        .expect("evaluate");
    assert_eq!(result.verdict, Verdict::Block);
    assert_eq!(
        result.reason_codes,
        vec![
            "fail_closed_missing_arg_provenance".to_string(),
            "fail_closed_missing_targets".to_string(),
        ]
    );
    assert_eq!(
        result.violations,
        vec!["missing_arg_provenance".to_string(), "missing_targets".to_string()]
    );
}

#[test]
fn fail_closed_converts_unevaluable_intent_into_block() {
    let policy = policy::parse_policy_yaml(
        br#"
fail_closed:
  enabled: true
  risk_classes: [high]
"#,
    )
    .expect("parse policy");

    // Missing identity makes the intent unevaluable.
    let intent = IntentRequest {
        tool_name: "tool.write".to_string(),
        context: IntentContext {
            risk_class: "high".to_string(),
            ..IntentContext::default()
        },
        ..IntentRequest::default()
    };

    let result = policy::evaluate_policy(&policy, &intent, &EvalOptions::default())
        .expect("evaluate");
    assert_eq!(result.verdict, Verdict::Block);
    assert_eq!(result.reason_codes, vec!["fail_closed_intent_invalid".to_string()]);
    assert_eq!(result.violations, vec!["intent_not_evaluable".to_string()]);
}

#[test]
fn unevaluable_intent_bubbles_when_not_fail_closed() {
    let intent = IntentRequest {
        tool_name: "tool.write".to_string(),
        context: IntentContext {
            risk_class: "low".to_string(),
            ..IntentContext::default()
        },
        ..IntentRequest::default()
    };
    assert!(
        policy::evaluate_policy(&policy::Policy::default(), &intent, &EvalOptions::default())
            .is_err()
    );
}

#[test]
fn first_match_wins_by_priority_then_name() {
    let policy = policy::parse_policy_yaml(
        br#"
default_verdict: allow
rules:
  - name: zz-later
    priority: 1
    effect: block
    reason_codes: [later]
  - name: aa-first
    priority: 1
    effect: dry_run
    reason_codes: [first]
  - name: earlier-priority
    priority: 0
    effect: require_approval
    reason_codes: [earliest]
"#,
    )
    .expect("parse policy");

    let intent = intent_with_target(
        "tool.read",
        "low",
        IntentTarget {
            kind: "path".to_string(),
            value: "/tmp/file".to_string(),
            operation: String::new(),
            sensitivity: String::new(),
        },
    );

    let outcome = policy::evaluate_policy_detailed(&policy, &intent, &EvalOptions::default())
        .expect("evaluate");
    assert_eq!(outcome.matched_rule, "earlier-priority");
    assert_eq!(outcome.result.verdict, Verdict::RequireApproval);
    assert_eq!(outcome.min_approvals, 1);
}

#[test]
fn default_verdict_applies_when_no_rule_matches() {
    let intent = intent_with_target(
        "tool.read",
        "low",
        IntentTarget {
            kind: "path".to_string(),
            value: "/tmp/file".to_string(),
            operation: String::new(),
            sensitivity: String::new(),
        },
    );

    let result =
        policy::evaluate_policy(&policy::Policy::default(), &intent, &EvalOptions::default())
            .expect("evaluate");
    assert_eq!(result.verdict, Verdict::RequireApproval);
    assert_eq!(result.reason_codes, vec!["default_require_approval".to_string()]);
}

#[test]
fn dataflow_overlay_replaces_effect_on_tainted_egress() {
    let policy = policy::parse_policy_yaml(
        br#"
default_verdict: allow
rules:
  - name: egress-guard
    priority: 1
    effect: allow
    match:
      tool_names: [tool.fetch]
    dataflow:
      enabled: true
      action: block
"#,
    )
    .expect("parse policy");

    let mut intent = intent_with_target(
        "tool.fetch",
        "medium",
        IntentTarget {
            kind: "host".to_string(),
            value: "api.example.com".to_string(),
            operation: "write".to_string(),
            sensitivity: String::new(),
        },
    );
    intent.arg_provenance = vec![IntentArgProvenance {
        arg_path: "url".to_string(),
        source: "external".to_string(),
        source_ref: String::new(),
        integrity_digest: String::new(),
    }];

    let outcome = policy::evaluate_policy_detailed(&policy, &intent, &EvalOptions::default())
        .expect("evaluate");
    assert!(outcome.dataflow_triggered);
    assert_eq!(outcome.result.verdict, Verdict::Block);
    assert!(outcome
        .result
        .reason_codes
        .contains(&"dataflow_tainted_destination".to_string()));
    assert!(outcome.result.violations.contains(&"tainted_dataflow".to_string()));
}

#[test]
fn dataflow_stays_quiet_without_taint() {
    let policy = policy::parse_policy_yaml(
        br#"
default_verdict: allow
rules:
  - name: egress-guard
    priority: 1
    effect: allow
    match:
      tool_names: [tool.fetch]
    dataflow:
      enabled: true
"#,
    )
    .expect("parse policy");

    let intent = intent_with_target(
        "tool.fetch",
        "medium",
        IntentTarget {
            kind: "host".to_string(),
            value: "api.example.com".to_string(),
            operation: String::new(),
            sensitivity: String::new(),
        },
    );

    let outcome = policy::evaluate_policy_detailed(&policy, &intent, &EvalOptions::default())
        .expect("evaluate");
    assert!(!outcome.dataflow_triggered);
    assert_eq!(outcome.result.verdict, Verdict::Allow);
}

#[test]
fn min_approvals_above_one_forces_distinct_approvers() {
    let policy = policy::parse_policy_yaml(
        br#"
rules:
  - name: dual-control
    priority: 1
    effect: require_approval
    min_approvals: 2
"#,
    )
    .expect("parse policy");
    let normalized = policy::normalize_policy(&policy).expect("normalize");
    assert!(normalized.rules[0].require_distinct_approvers);
}

#[test]
fn policy_digest_is_stable_across_rule_order() {
    let forward = policy::parse_policy_yaml(
        br#"
rules:
  - name: a
    priority: 2
    effect: allow
  - name: b
    priority: 1
    effect: block
"#,
    )
    .expect("parse forward");
    let reversed = policy::parse_policy_yaml(
        br#"
rules:
  - name: b
    priority: 1
    effect: block
  - name: a
    priority: 2
    effect: allow
"#,
    )
    .expect("parse reversed");

    assert_eq!(
        policy::policy_digest(&forward).expect("digest forward"),
        policy::policy_digest(&reversed).expect("digest reversed")
    );
}

#[test]
fn invalid_enums_are_rejected() {
    assert!(policy::parse_policy_yaml(b"default_verdict: maybe").is_err());
    assert!(policy::parse_policy_yaml(
        br#"
rules:
  - name: bad
    priority: 1
    effect: escalate
"#
    )
    .is_err());
    assert!(policy::parse_policy_yaml(
        br#"
fail_closed:
  enabled: true
  required_fields: [signatures]
"#
    )
    .is_err());
    assert!(policy::parse_policy_yaml(
        br#"
rules:
  - name: bad-window
    priority: 1
    effect: allow
    rate_limit:
      requests: 5
      window: day
"#
    )
    .is_err());
    assert!(policy::parse_policy_yaml(
        br#"
rules:
  - name: bad-approvals
    priority: 1
    effect: allow
    min_approvals: -1
"#
    )
    .is_err());
}

#[test]
fn high_risk_broker_checks_classify_rules() {
    let unbrokered = policy::parse_policy_yaml(
        br#"
rules:
  - name: risky-write
    priority: 1
    effect: require_approval
    match:
      risk_classes: [high]
"#,
    )
    .expect("parse unbrokered");
    assert!(policy::policy_has_high_risk_unbrokered_actions(&unbrokered));
    assert!(!policy::policy_requires_broker_for_high_risk(&unbrokered));

    let brokered = policy::parse_policy_yaml(
        br#"
rules:
  - name: risky-write
    priority: 1
    effect: require_approval
    require_broker_credential: true
    broker_scopes: [write]
    match:
      risk_classes: [critical]
"#,
    )
    .expect("parse brokered");
    assert!(!policy::policy_has_high_risk_unbrokered_actions(&brokered));
    assert!(policy::policy_requires_broker_for_high_risk(&brokered));

    let blocked = policy::parse_policy_yaml(
        br#"
rules:
  - name: block-high
    priority: 1
    effect: block
    match:
      risk_classes: [high]
"#,
    )
    .expect("parse blocked");
    assert!(!policy::policy_has_high_risk_unbrokered_actions(&blocked));
}

#[test]
fn rate_limit_defaults_populate_on_normalize() {
    let policy = policy::parse_policy_yaml(
        br#"
rules:
  - name: limited
    priority: 1
    effect: allow
    rate_limit:
      requests: 2
"#,
    )
    .expect("parse policy");
    let normalized = policy::normalize_policy(&policy).expect("normalize");
    assert_eq!(normalized.rules[0].rate_limit.window, "minute");
    assert_eq!(normalized.rules[0].rate_limit.scope, "tool_identity");
}
