//! Golden tests - fixture-based tests that lock expected behavior
//!
//! The guardrail verdicts fixture pins the rule set's behavior on
//! known answers. Any change in rule order, patterns, or thresholds
//! shows up as a failing case here before it ships.
//!
//! Run with: cargo test --test golden_tests

use std::fs;
use std::sync::Arc;

use serde::Deserialize;

use cognate::audit::{AuditSink, MemorySink};
use cognate::guardrail::{GuardrailFilter, Verdict};
use cognate::types::{aggregate_confidence, Answer, CoreConfig, ReasoningStep};

#[derive(Debug, Deserialize)]
struct TestCase {
    name: String,
    text: String,
    confidence: f32,
    /// "pass" or the name of the rule expected to fire
    expected: String,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    test_cases: Vec<TestCase>,
}

fn answer(text: &str, confidence: f32) -> Answer {
    let chain = vec![ReasoningStep {
        step_index: 0,
        premise: vec![],
        inference: text.to_string(),
        confidence,
    }];
    Answer {
        text: text.to_string(),
        confidence: aggregate_confidence(&chain),
        chain,
        evidence_ids: vec![],
        low_confidence: false,
    }
}

#[test]
fn test_guardrail_verdicts_golden() {
    let fixture_path = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/guardrail_verdicts.json"
    );
    let content =
        fs::read_to_string(fixture_path).expect("Failed to read guardrail_verdicts.json fixture");
    let fixture: Fixture = serde_json::from_str(&content).expect("Failed to parse fixture JSON");

    let sink = Arc::new(MemorySink::new());
    let filter = GuardrailFilter::with_default_rules(
        &CoreConfig::default(),
        Arc::clone(&sink) as Arc<dyn AuditSink>,
    );

    let mut expected_violations = 0usize;
    for case in fixture.test_cases {
        let verdict = filter.check(&answer(&case.text, case.confidence)).unwrap();

        match (case.expected.as_str(), &verdict) {
            ("pass", Verdict::Pass) => {}
            ("pass", Verdict::Violation { rule, .. }) => {
                panic!("Case '{}': expected Pass, got Violation({})", case.name, rule)
            }
            (expected, Verdict::Pass) => {
                panic!("Case '{}': expected Violation({}), got Pass", case.name, expected)
            }
            (expected, Verdict::Violation { rule, .. }) => {
                assert_eq!(
                    rule, expected,
                    "Case '{}': wrong rule fired",
                    case.name
                );
                expected_violations += 1;
            }
        }
    }

    // Every violation verdict left an audit record
    assert_eq!(sink.violations().len(), expected_violations);
}
