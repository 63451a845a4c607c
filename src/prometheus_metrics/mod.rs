use std::collections::HashMap;

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry, Histogram,
    IntCounterVec, Registry,
};

pub const NAMESPACE: &str = "lagshot";

pub const LABEL_GROUP: &str = "group";
pub const LABEL_OUTCOME: &str = "outcome";

pub const OUTCOME_SUCCESS: &str = "success";

const MET_DURATION_NAME: &str = "lag_collection_duration_seconds";
const MET_DURATION_HELP: &str = "Time (s) taken by a lag collection run, successful or not";
const MET_RUNS_NAME: &str = "lag_collections_total";
const MET_RUNS_HELP: &str = "Lag collection runs, by outcome ('success' or the kind of error)";

/// Creates the Prometheus Metrics [`Registry`], labelling every metric with the Consumer Group.
pub fn init(group_id: &str) -> Registry {
    let prom_def_labels = HashMap::from([(LABEL_GROUP.to_string(), group_id.to_string())]);

    info!("Prometheus Metrics default labels:\n{:#?}", prom_def_labels);

    Registry::new_custom(Some(NAMESPACE.to_string()), Some(prom_def_labels))
        .expect("Unable to create a Prometheus Metrics Registry")
}

/// Metrics about the lag collection runs served by this process.
#[derive(Clone)]
pub struct CollectionMetrics {
    pub duration: Histogram,
    pub runs: IntCounterVec,
}

impl CollectionMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            duration: register_histogram_with_registry!(
                MET_DURATION_NAME,
                MET_DURATION_HELP,
                registry
            )
            .unwrap_or_else(|e| panic!("Failed to create metric '{MET_DURATION_NAME}': {e}")),
            runs: register_int_counter_vec_with_registry!(
                MET_RUNS_NAME,
                MET_RUNS_HELP,
                &[LABEL_OUTCOME],
                registry
            )
            .unwrap_or_else(|e| panic!("Failed to create metric '{MET_RUNS_NAME}': {e}")),
        }
    }

    pub fn observe_outcome(&self, outcome: &str) {
        self.runs.with_label_values(&[outcome]).inc();
    }
}

#[cfg(test)]
mod test {
    use prometheus::TextEncoder;

    use super::*;

    #[test]
    fn metrics_are_namespaced_and_labelled() {
        let registry = init("g1");
        let metrics = CollectionMetrics::new(&registry);

        metrics.observe_outcome(OUTCOME_SUCCESS);
        metrics.observe_outcome("timeout");
        metrics.observe_outcome(OUTCOME_SUCCESS);
        metrics.duration.observe(0.5);

        let mut body = String::new();
        TextEncoder.encode_utf8(&registry.gather(), &mut body).unwrap();
        // Variable labels are rendered before the default ones
        assert!(body.contains("lagshot_lag_collections_total{outcome=\"success\",group=\"g1\"} 2"));
        assert!(body.contains("lagshot_lag_collections_total{outcome=\"timeout\",group=\"g1\"} 1"));
        assert!(body.contains("lagshot_lag_collection_duration_seconds_count{group=\"g1\"} 1"));
    }
}
