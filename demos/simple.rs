use std::{collections::HashMap, sync::Arc};

use flagwise::{
    Caller, ContextValue, Environment, EvaluationService, FlagCache, InMemoryFlagStore,
};

pub fn main() {
    env_logger::init();

    let store = InMemoryFlagStore::from_json(include_str!("../tests/data/flags.json"))
        .expect("test data should parse");
    let service = EvaluationService::new(Arc::new(FlagCache::new(Arc::new(store))));

    let caller = Caller::new("org-a", Environment::Production);
    let context = HashMap::from([
        ("userId".to_owned(), ContextValue::from("test-subject")),
        ("location".to_owned(), ContextValue::from("US")),
    ]);

    let flag_keys = ["new-checkout", "dark-mode", "missing"];
    for evaluation in service.evaluate_all(&caller, flag_keys, &context) {
        println!(
            "{}: {} ({})",
            evaluation.flag_key, evaluation.enabled, evaluation.metadata.reason
        );
    }
}
