use std::{
    collections::HashMap,
    fs::{self, File},
    sync::{Arc, Mutex},
};

use serde::Deserialize;

use growthbook::{
    evaluate_feature, Attributes, Context, ContextStore, Evaluator, Experiment, ExperimentResult,
    FeatureDefinitions, FeatureSource, FeaturesPayload, InMemoryPersistence,
    LocalStickyBucketService, StickyBucketService, Value,
};

#[derive(Debug, Deserialize)]
struct TestCase {
    feature: String,
    attributes: Attributes,
    value: Value,
    source: FeatureSource,
}

fn definitions() -> FeatureDefinitions {
    let payload = FeaturesPayload::from_json(&fs::read("tests/data/features.json").unwrap()).unwrap();
    payload.into_definitions(None).unwrap()
}

fn context(definitions: &FeatureDefinitions) -> Context {
    Context::new("sdk-test", "https://cdn.growthbook.io")
        .with_features(definitions.features.clone())
        .with_saved_groups(definitions.saved_groups.clone())
}

#[test]
fn evaluation_test_data() {
    let _ = env_logger::builder().is_test(true).try_init();

    let definitions = definitions();
    assert!(definitions.date_updated.is_some());
    assert!(!definitions.features.contains_key("broken"));

    let cases: Vec<TestCase> =
        serde_json::from_reader(File::open("tests/data/evaluation.json").unwrap()).unwrap();

    for case in cases {
        print!("{} {:?} ... ", case.feature, case.attributes);
        let context = context(&definitions).with_attributes(case.attributes);

        let result = evaluate_feature(&context, &case.feature);

        assert_eq!(result.value, case.value, "feature {}", case.feature);
        assert_eq!(result.source, case.source, "feature {}", case.feature);
        assert_eq!(result.on, case.value.is_truthy());
        assert_eq!(result.off, !result.on);
        println!("ok");
    }
}

#[test]
fn evaluation_is_idempotent() {
    let definitions = definitions();
    let context = context(&definitions).with_attributes(Attributes::from([
        ("id".to_owned(), Value::from("alice")),
        ("country".to_owned(), Value::from("IN")),
    ]));

    for feature in definitions.features.keys() {
        let first = evaluate_feature(&context, feature);
        for _ in 0..5 {
            assert_eq!(evaluate_feature(&context, feature), first);
        }
    }
}

#[test]
fn evaluator_tracks_feature_experiments() {
    let definitions = definitions();
    let store = Arc::new(ContextStore::new(context(&definitions)));

    let viewed = Arc::new(Mutex::new(Vec::new()));
    let evaluator = Evaluator::with_tracking_callback(store.clone(), {
        let viewed = viewed.clone();
        Arc::new(move |experiment: &Experiment, result: &ExperimentResult| {
            viewed
                .lock()
                .unwrap()
                .push((experiment.key.clone(), result.hash_value.clone(), result.key.clone()));
        })
    });

    for id in ["user1", "user123", "user1", "bob"] {
        store.set_attributes(Attributes::from([("id".to_owned(), Value::from(id))]));
        evaluator.evaluate_feature("button");
    }
    evaluator.evaluate_feature("color");

    assert_eq!(
        viewed.lock().unwrap().as_slice(),
        [
            ("t1".to_owned(), "user1".to_owned(), "0".to_owned()),
            ("t1".to_owned(), "user123".to_owned(), "1".to_owned()),
            ("t1".to_owned(), "bob".to_owned(), "1".to_owned()),
        ]
    );
}

#[test]
fn sticky_buckets_survive_definition_updates() {
    let definitions = definitions();
    let service = Arc::new(LocalStickyBucketService::new(Arc::new(
        InMemoryPersistence::new(),
    )));
    let store = Arc::new(ContextStore::new(
        context(&definitions)
            .with_attributes(Attributes::from([("id".to_owned(), Value::from("user1"))]))
            .with_sticky_bucket_service(service.clone()),
    ));
    let evaluator = Evaluator::new(store.clone());

    assert_eq!(evaluator.evaluate_feature("button").value, Value::from("A"));
    assert_eq!(
        service
            .get_assignments("id", "user1")
            .unwrap()
            .assignments
            .get("t1__0")
            .map(String::as_str),
        Some("0")
    );

    // New weights would put user1 (bucket 0.226) into "B".
    let mut updated = definitions.clone();
    let button = updated.features.get_mut("button").unwrap();
    button.rules[0].weights = Some(vec![0.1, 0.9]);
    store.set_features(updated);

    let result = evaluator.evaluate_feature("button");
    assert_eq!(result.value, Value::from("A"));
    assert!(result.experiment_result.unwrap().sticky_bucket_used);
}

#[test]
fn forced_variations_and_disabled_context() {
    let definitions = definitions();
    let context = context(&definitions)
        .with_attributes(Attributes::from([("id".to_owned(), Value::from("user1"))]))
        .with_forced_variations(HashMap::from([("t1".to_owned(), 1)]));

    // Forced variations are served but don't count as being in the experiment, so the feature
    // falls back to its default.
    let result = evaluate_feature(&context, "button");
    assert_eq!(result.value, Value::from("none"));
    assert_eq!(result.source, FeatureSource::DefaultValue);

    let context = context.with_forced_variations(HashMap::new()).with_enabled(false);
    assert_eq!(evaluate_feature(&context, "button").value, Value::from("none"));
    assert_eq!(evaluate_feature(&context, "color").value, Value::from("red"));
}
