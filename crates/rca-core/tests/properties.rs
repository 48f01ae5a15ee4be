use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest::test_runner::Config;

use rca_core::{
    allocate, batch_artifacts, plan, AnalysisConfig, ArtifactRef, BudgetConfig, CollectedJob,
    FailureItem, ItemKey, RedactionConfig, RedactionGate, StepRef, TestRef,
};

fn gate() -> RedactionGate {
    RedactionGate::new(&RedactionConfig::default()).expect("gate")
}

fn step(name: String, size_tokens: u64) -> StepRef {
    StepRef {
        size_tokens,
        ..StepRef::new(name, "")
    }
}

fn test_case(identifier: String, size_tokens: u64) -> TestRef {
    TestRef {
        size_tokens,
        ..TestRef::new(identifier, "")
    }
}

/// Detector-shaped secrets. Filler text is lowercase only, so the secret
/// values cannot reappear in it by accident.
fn secret() -> impl Strategy<Value = (String, String)> {
    prop_oneof![
        "[A-Za-z0-9]{36}".prop_map(|tail| {
            let token = format!("ghp_{tail}");
            (token.clone(), token)
        }),
        "[A-Z0-9]{16}".prop_map(|tail| {
            let key = format!("AKIA{tail}");
            (key.clone(), key)
        }),
        "[A-Za-z0-9]{8,16}".prop_map(|tail| {
            let value = format!("Zq{tail}");
            (format!("db_password={value}"), value)
        }),
    ]
}

fn budget_config() -> impl Strategy<Value = BudgetConfig> {
    (1_000_u64..200_000, 0_u64..20_000, 0_u64..40_000, 1_u64..5_000).prop_map(
        |(context_window, prompt_overhead, synthesis_reserve, min_item_tokens)| BudgetConfig {
            context_window,
            prompt_overhead,
            synthesis_reserve,
            min_item_tokens,
            ..BudgetConfig::default()
        },
    )
}

proptest! {
    #![proptest_config(Config::with_cases(128))]

    #[test]
    fn redaction_removes_secrets_and_is_idempotent(
        parts in prop::collection::vec(("[a-z ]{0,24}", secret()), 1..6)
    ) {
        let mut text = String::new();
        let mut values = Vec::new();
        for (filler, (embedded, value)) in parts {
            text.push_str(&filler);
            text.push(' ');
            text.push_str(&embedded);
            text.push(' ');
            values.push(value);
        }

        let gate = gate();
        let once = gate.clean(&text).expect("redact");
        for value in &values {
            prop_assert!(!once.as_str().contains(value.as_str()));
        }
        let twice = gate.clean(once.as_str()).expect("redact again");
        prop_assert_eq!(twice.as_str(), once.as_str());
    }

    #[test]
    fn budget_never_overcommits_and_is_deterministic(
        config in budget_config(),
        steps in prop::collection::btree_map("[a-z]{1,8}", 0_u64..300_000, 0..5),
        tests in prop::collection::btree_map("[A-Z][a-z]{0,6}\\.[a-z]{1,6}", 0_u64..100_000, 0..8)
    ) {
        let steps: Vec<StepRef> = steps.into_iter().map(|(n, s)| step(n, s)).collect();
        let tests: Vec<TestRef> = tests.into_iter().map(|(n, s)| test_case(n, s)).collect();
        let mut items: Vec<FailureItem<'_>> = steps.iter().map(FailureItem::Step).collect();
        items.extend(tests.iter().map(FailureItem::Test));

        let budget = allocate(&items, &config);
        prop_assert_eq!(budget.len(), items.len());
        prop_assert!(budget.total_granted() <= budget.available());

        for item in &items {
            if let Some(tokens) = budget.granted(&item.key()) {
                let capped = item.size_tokens().min(config.caps.get(item.kind()));
                prop_assert!(tokens >= config.min_item_tokens);
                prop_assert!(tokens <= capped.max(config.min_item_tokens));
            }
        }

        items.reverse();
        prop_assert_eq!(allocate(&items, &config), budget);
    }

    #[test]
    fn batches_respect_ceiling_and_keep_every_artifact(
        ceiling in 1_u64..5_000,
        sizes in prop::collection::btree_map("[a-z]{1,10}\\.log", 0_u64..10_000, 0..12)
    ) {
        let artifacts: Vec<ArtifactRef> = sizes
            .iter()
            .map(|(path, size)| ArtifactRef {
                size_tokens: *size,
                ..ArtifactRef::new(path.as_str(), "")
            })
            .collect();

        let batches = batch_artifacts(&artifacts, ceiling);
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for (i, batch) in batches.iter().enumerate() {
            prop_assert_eq!(&batch.id, &format!("artifacts-{:03}", i + 1));
            prop_assert!(!batch.members.is_empty());
            prop_assert!(batch.size_tokens() <= ceiling);
            for member in &batch.members {
                *seen.entry(member.artifact.path.as_str()).or_default() += 1;
                prop_assert_eq!(member.truncated, member.artifact.size_tokens > ceiling);
            }
        }
        prop_assert_eq!(seen.len(), artifacts.len());
        prop_assert!(seen.values().all(|count| *count == 1));
    }
}

fn narrow_window(min_item_tokens: u64) -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.budget.context_window = 1_000;
    config.budget.prompt_overhead = 300;
    config.budget.synthesis_reserve = 600;
    config.budget.min_item_tokens = min_item_tokens;
    config
}

#[test]
fn narrow_window_excludes_large_step_below_floor() {
    let input = CollectedJob {
        steps: vec![step("e2e".to_string(), 50_000)],
        ..CollectedJob::default()
    };
    let config = narrow_window(1_000);
    let plan = plan(&input, &config);

    assert_eq!(plan.budget.available(), 100);
    assert_eq!(plan.budget.total_granted(), 0);
    assert_eq!(plan.budget.excluded().collect::<Vec<_>>(), vec![&ItemKey::step("e2e")]);
}

#[test]
fn narrow_window_gives_the_remainder_to_the_heaviest_item() {
    let input = CollectedJob {
        steps: vec![step("e2e".to_string(), 50_000)],
        tests: vec![test_case("Suite.a".to_string(), 10)],
        artifacts: vec![],
    };
    let config = narrow_window(40);
    let plan = plan(&input, &config);

    assert_eq!(plan.budget.available(), 100);
    assert_eq!(plan.budget.granted(&ItemKey::step("e2e")), Some(100));
    assert_eq!(plan.budget.excluded().collect::<Vec<_>>(), vec![&ItemKey::test("Suite.a")]);
    assert_eq!(plan.budget.total_granted(), 100);
}
