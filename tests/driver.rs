mod common;

use common::{filters, FakeStore};
use logs_exporter::config::{DesiredState, TargetConfig};
use logs_exporter::credentials::SecretStore;
use logs_exporter::driver::Driver;
use logs_exporter::gauges::GaugeCache;
use logs_exporter::query::{for_each_combination, Dimensions, TimeWindow};
use prometheus::Registry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn driver(registry: &Registry) -> Driver {
    Driver::new(
        Arc::new(GaugeCache::new(registry.clone())),
        Duration::from_secs(900),
        SecretStore::new("/nonexistent/secrets"),
    )
}

fn target(yaml: &str) -> TargetConfig {
    DesiredState::from_yaml(yaml)
        .expect("valid test targets")
        .targets
        .remove(0)
}

/// "label=value,..." -> gauge value, for one family.
fn observed(registry: &Registry, name: &str) -> BTreeMap<String, f64> {
    registry
        .gather()
        .into_iter()
        .filter(|family| family.get_name() == name)
        .flat_map(|family| family.get_metric().to_vec())
        .map(|metric| {
            let labels = metric
                .get_label()
                .iter()
                .map(|pair| format!("{}={}", pair.get_name(), pair.get_value()))
                .collect::<Vec<_>>()
                .join(",");
            (labels, metric.get_gauge().get_value())
        })
        .collect()
}

const REQS_TARGET: &str = r#"
targets:
  - name: prod
    url: http://localhost:9200
    index: logs-2023-01-02
    tuples:
      - metric_name: reqs
        filters: { ns: namespace }
        aggregate: { name: status, field: response.code }
"#;

#[tokio::test]
async fn writes_one_observation_per_combination_and_bucket() {
    let store = FakeStore::new()
        .answer("namespace", &[], &[("a", 6), ("b", 9)])
        .answer("response.code", &[("namespace", "a")], &[("200", 5), ("500", 1)])
        .answer("response.code", &[("namespace", "b")], &[("200", 9)]);
    let registry = Registry::new();

    let report = driver(&registry)
        .reconcile_with_store(&store, &target(REQS_TARGET))
        .await
        .unwrap();

    assert_eq!(report.index.as_deref(), Some("logs-2023-01-02"));
    assert_eq!(report.combinations_ok(), 2);
    assert_eq!(report.combinations_failed(), 0);
    assert_eq!(report.observations(), 3);

    let values = observed(&registry, "reqs");
    assert_eq!(values.len(), 3);
    assert_eq!(values["ns=a,status=200"], 5.0);
    assert_eq!(values["ns=a,status=500"], 1.0);
    assert_eq!(values["ns=b,status=200"], 9.0);

    // one discovery query, then one query per namespace
    let searches = store.searches();
    assert_eq!(searches.len(), 3);
    assert_eq!(searches[0].field, "namespace");
    assert!(searches[0].filters.is_empty());
    assert!(searches.iter().all(|s| s.index == "logs-2023-01-02"));
}

#[tokio::test]
async fn failed_combination_does_not_block_siblings() {
    let store = FakeStore::new()
        .answer("namespace", &[], &[("a", 6), ("b", 9)])
        .fail("response.code", &[("namespace", "a")])
        .answer("response.code", &[("namespace", "b")], &[("200", 9)]);
    let registry = Registry::new();

    let report = driver(&registry)
        .reconcile_with_store(&store, &target(REQS_TARGET))
        .await
        .unwrap();

    assert_eq!(report.combinations_ok(), 1);
    assert_eq!(report.combinations_failed(), 1);
    assert_eq!(report.tuples_failed(), 0);
    let values = observed(&registry, "reqs");
    assert_eq!(values.len(), 1);
    assert_eq!(values["ns=b,status=200"], 9.0);
}

#[tokio::test]
async fn failed_combination_keeps_previous_value() {
    let registry = Registry::new();
    let driver = driver(&registry);
    let target = target(REQS_TARGET);

    let healthy = FakeStore::new()
        .answer("namespace", &[], &[("a", 6)])
        .answer("response.code", &[("namespace", "a")], &[("200", 5)]);
    driver.reconcile_with_store(&healthy, &target).await.unwrap();

    let broken = FakeStore::new()
        .answer("namespace", &[], &[("a", 6)])
        .fail("response.code", &[("namespace", "a")]);
    let report = driver.reconcile_with_store(&broken, &target).await.unwrap();

    assert_eq!(report.combinations_failed(), 1);
    assert_eq!(observed(&registry, "reqs")["ns=a,status=200"], 5.0);
}

#[tokio::test]
async fn enumeration_failure_aborts_only_that_tuple() {
    let yaml = r#"
targets:
  - name: prod
    url: http://localhost:9200
    index: logs
    tuples:
      - metric_name: by_node
        filters: { node: node.name }
        aggregate: { name: status, field: response.code }
      - metric_name: by_ns
        filters: { ns: namespace }
        aggregate: { name: level, field: log.level }
"#;
    let store = FakeStore::new()
        .fail("node.name", &[])
        .answer("namespace", &[], &[("a", 1)])
        .answer("log.level", &[("namespace", "a")], &[("info", 4)]);
    let registry = Registry::new();

    let report = driver(&registry)
        .reconcile_with_store(&store, &target(yaml))
        .await
        .unwrap();

    assert_eq!(report.tuples.len(), 2);
    assert_eq!(report.tuples_failed(), 1);
    let failed = &report.tuples[0];
    assert_eq!(failed.metric, "by_node");
    let message = failed.error.as_deref().unwrap();
    assert!(message.contains("field=node.name label=node"), "{message}");

    assert!(report.tuples[1].is_success());
    assert_eq!(observed(&registry, "by_ns")["level=info,ns=a"], 4.0);
}

#[tokio::test]
async fn tuple_without_filters_runs_one_top_level_aggregation() {
    let yaml = r#"
targets:
  - name: prod
    url: http://localhost:9200
    index: logs
    tuples:
      - metric_name: docs
        aggregate: { name: namespace, field: kubernetes.namespace }
"#;
    let store = FakeStore::new().answer("kubernetes.namespace", &[], &[("kube-system", 12), ("default", 3)]);
    let registry = Registry::new();

    let report = driver(&registry)
        .reconcile_with_store(&store, &target(yaml))
        .await
        .unwrap();

    assert_eq!(store.searches().len(), 1);
    assert_eq!(report.combinations_ok(), 1);
    let values = observed(&registry, "docs");
    assert_eq!(values["namespace=kube-system"], 12.0);
    assert_eq!(values["namespace=default"], 3.0);
}

#[tokio::test]
async fn fixed_filter_values_skip_discovery() {
    let yaml = r#"
targets:
  - name: prod
    url: http://localhost:9200
    index: logs
    tuples:
      - metric_name: cluster_docs
        filters: { cluster: fields.cluster, ns: namespace }
        values: { cluster: [eu, us] }
        aggregate: { name: type, field: fields.type }
"#;
    let store = FakeStore::new()
        .answer("namespace", &[], &[("a", 3)])
        .answer("fields.type", &[("fields.cluster", "eu"), ("namespace", "a")], &[("nginx", 2)])
        .answer("fields.type", &[("fields.cluster", "us"), ("namespace", "a")], &[("nginx", 1)]);
    let registry = Registry::new();

    let report = driver(&registry)
        .reconcile_with_store(&store, &target(yaml))
        .await
        .unwrap();

    assert_eq!(report.combinations_ok(), 2);
    // only the namespace dimension is discovered
    let searches = store.searches();
    assert_eq!(searches.len(), 3);
    assert!(searches.iter().all(|s| s.field != "fields.cluster"));

    let values = observed(&registry, "cluster_docs");
    assert_eq!(values["cluster=eu,ns=a,type=nginx"], 2.0);
    assert_eq!(values["cluster=us,ns=a,type=nginx"], 1.0);
}

#[tokio::test]
async fn index_prefix_resolves_to_latest_index() {
    let yaml = r#"
targets:
  - name: prod
    url: http://localhost:9200
    index_prefix: "logs-"
    tuples:
      - metric_name: docs
        aggregate: { name: namespace, field: kubernetes.namespace }
"#;
    let store = FakeStore::new()
        .with_indices(&["logs-2023-01-01", "logs-2023-01-02", "other-2023-05-05"])
        .answer("kubernetes.namespace", &[], &[("default", 1)]);
    let registry = Registry::new();

    let report = driver(&registry)
        .reconcile_with_store(&store, &target(yaml))
        .await
        .unwrap();

    assert_eq!(report.index.as_deref(), Some("logs-2023-01-02"));
    assert_eq!(store.searches()[0].index, "logs-2023-01-02");
}

#[tokio::test]
async fn missing_index_abandons_target() {
    let yaml = r#"
targets:
  - name: prod
    url: http://localhost:9200
    index_prefix: "absent-"
    tuples:
      - metric_name: docs
        aggregate: { name: namespace, field: kubernetes.namespace }
"#;
    let store = FakeStore::new().with_indices(&["logs-2023-01-01"]);
    let registry = Registry::new();

    let err = driver(&registry)
        .reconcile_with_store(&store, &target(yaml))
        .await
        .unwrap_err();
    assert!(err.is_index_not_found());
    assert!(store.searches().is_empty());
}

#[tokio::test]
async fn tuples_sharing_a_label_set_share_the_first_gauge() {
    let yaml = r#"
targets:
  - name: prod
    url: http://localhost:9200
    index: logs
    tuples:
      - metric_name: first_metric
        aggregate: { name: value, field: kubernetes.namespace }
      - metric_name: second_metric
        aggregate: { name: value, field: kubernetes.node.name }
"#;
    let store = FakeStore::new()
        .answer("kubernetes.namespace", &[], &[("default", 2)])
        .answer("kubernetes.node.name", &[], &[("node-1", 7)]);
    let registry = Registry::new();

    driver(&registry)
        .reconcile_with_store(&store, &target(yaml))
        .await
        .unwrap();

    // the second tuple's name is ignored; both write into first_metric
    assert!(observed(&registry, "second_metric").is_empty());
    let values = observed(&registry, "first_metric");
    assert_eq!(values["value=default"], 2.0);
    assert_eq!(values["value=node-1"], 7.0);
}

#[tokio::test]
async fn missing_secret_is_a_credential_failure() {
    let yaml = r#"
targets:
  - name: prod
    url: http://localhost:9200
    username: elastic
    password:
      secret: { name: es-creds, namespace: monitoring, key: password }
    index: logs
"#;
    let registry = Registry::new();
    let report = driver(&registry).run_cycle(&[target(yaml)]).await;

    assert_eq!(report.targets.len(), 1);
    assert_eq!(report.targets[0].error_kind, Some("credential"));
    assert!(report.has_credential_failure());
    assert_eq!(report.targets_failed(), 1);
}

#[tokio::test]
async fn enumerator_calls_back_once_per_product_element() {
    let store = FakeStore::new()
        .answer("f.a", &[], &[("1", 1), ("2", 1)])
        .answer("f.b", &[], &[("x", 1), ("y", 1), ("z", 1)]);
    let mut dims = Dimensions::new();
    dims.insert("a".into(), "f.a".into());
    dims.insert("b".into(), "f.b".into());
    let window = TimeWindow::new(Duration::from_secs(60));

    let seen = for_each_combination(&store, "logs", &dims, &window, |comb| async move {
        comb.exact_filters()
    })
    .await
    .unwrap();

    assert_eq!(seen.len(), 6);
    assert!(seen.contains(&filters(&[("f.a", "2"), ("f.b", "z")])));
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 6);
}

#[tokio::test]
async fn enumerator_skips_empty_dimensions_without_querying() {
    let store = FakeStore::new();
    let mut calls = 0;
    let seen = for_each_combination(
        &store,
        "logs",
        &Dimensions::new(),
        &TimeWindow::new(Duration::from_secs(60)),
        |_| {
            calls += 1;
            async {}
        },
    )
    .await
    .unwrap();

    assert!(seen.is_empty());
    assert_eq!(calls, 0);
    assert!(store.searches().is_empty());
}
