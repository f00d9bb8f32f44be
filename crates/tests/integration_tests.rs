//! Integration tests for MiniCube
//!
//! These tests drive loading, querying and cluster assignment end to end.

use std::collections::HashMap;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use proptest::prelude::*;
use tempfile::NamedTempFile;

use minicube_cluster::{
    ClusterManager, ClusterTransport, CubeId, CubeNode, CubeOp, CubeResponse, LocalCluster,
    LocalTransport, MemoryShardRegistry, ShardRegistry,
};
use minicube_common::config::{ClusterConfig, Config};
use minicube_common::error::{ClusterError, Error, Result};
use minicube_common::types::{DimValue, ExecutionMode, NodeAddress};
use minicube_storage::source::{
    load_fact_table, ColumnSplit, DateRange, MemoryRowSource, RowScan, RowSource, SourceValue,
    TsvRowSource,
};
use minicube_storage::{
    round_indicator, CubeEngine, DerivedDimension, DimFilter, FactTable, FactTableBuilder, Schema,
};

const COLUMNS: [&str; 8] = [
    "dim_date",
    "dim_tradeid",
    "dim_productlineid",
    "dim_postid",
    "csm",
    "cash",
    "click",
    "shw",
];

const ROWS_PER_DAY: i64 = 2100;

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

/// Trade id of fixture row `i`: 209 real trades plus a -1 bucket
fn trade_id(i: i64) -> i64 {
    let slot = i % 210;
    if slot == 209 {
        -1
    } else {
        3200 + slot
    }
}

/// Test helper to create the fixture source, 2100 rows for each day
fn fixture_source(days: &[i64]) -> MemoryRowSource {
    let source = MemoryRowSource::new(COLUMNS, "dim_date").expect("Failed to create source");
    for day in days {
        for i in 0..ROWS_PER_DAY {
            source
                .push(vec![
                    SourceValue::Int(*day),
                    SourceValue::Int(trade_id(i)),
                    SourceValue::Int(i % 7),
                    if i % 50 == 0 {
                        SourceValue::Null
                    } else {
                        SourceValue::Int(i % 5)
                    },
                    SourceValue::Decimal(dec("0.1")),
                    SourceValue::Int(i),
                    SourceValue::Int(1),
                    SourceValue::Decimal(dec("2.5")),
                ])
                .expect("Failed to push row");
        }
    }
    source
}

/// Test helper to load one day of the fixture into an engine
fn fixture_engine(day: u32, mode: ExecutionMode) -> CubeEngine {
    let source = fixture_source(&[i64::from(day)]);
    let scan = source
        .scan(&DateRange::new(day, day))
        .expect("Failed to scan fixture");
    let table = load_fact_table(&day.to_string(), scan, &ColumnSplit::default(), &[])
        .expect("Failed to load fixture");
    CubeEngine::new(table, mode)
}

fn trade_filter() -> DimFilter {
    DimFilter::new().with("dim_tradeid", (3201..=3212).chain([3299]))
}

fn table_of(name: &str, rows: &[(u32, DimValue, DimValue, i64)]) -> FactTable {
    let mut builder = FactTableBuilder::build(name).expect("Failed to create builder");
    builder
        .add_dimension_columns(["a", "b"])
        .unwrap()
        .add_indicator_columns(["v"])
        .unwrap();
    for (id, a, b, v) in rows {
        builder.add_dimension_row(*id, vec![*a, *b]).unwrap();
        builder.add_indicator_row(*id, vec![BigDecimal::from(*v)]).unwrap();
    }
    builder.done().expect("Failed to build table")
}

// ============================================================================
// Cube Engine Tests
// ============================================================================

#[test]
fn test_fixture_sums() {
    let engine = fixture_engine(20_140_606, ExecutionMode::Parallel);

    let total = engine.sum("csm", None).unwrap();
    assert_eq!(total, dec("210.00000000"));
    assert_eq!(total.as_bigint_and_exponent().1, 8);

    let filtered = engine.sum("csm", Some(&trade_filter())).unwrap();
    assert_eq!(filtered, dec("13.00000000"));
    assert!(filtered < total);

    assert_eq!(engine.sum("cash", None).unwrap(), BigDecimal::from(2100 * 2099 / 2));
}

#[test]
fn test_fixture_group_sum_has_unset_bucket() {
    let engine = fixture_engine(20_140_606, ExecutionMode::Parallel);

    let groups = engine.group_sum("csm", "dim_tradeid", None).unwrap();
    assert_eq!(groups.len(), 210);
    assert_eq!(groups[&-1], dec("1"));
    assert_eq!(groups[&3200], dec("1"));

    let posts = engine.group_sum("click", "dim_postid", None).unwrap();
    assert_eq!(posts[&Schema::UNSET_DIMENSION], BigDecimal::from(ROWS_PER_DAY / 50));
}

#[test]
fn test_group_sums_add_up_to_sum() {
    let engine = fixture_engine(20_140_606, ExecutionMode::Parallel);
    let filter = trade_filter();

    let groups = engine.group_sum("shw", "dim_postid", Some(&filter)).unwrap();
    let total = groups
        .values()
        .fold(BigDecimal::from(0), |acc, value| acc + value);
    assert_eq!(total, engine.sum("shw", Some(&filter)).unwrap());
}

#[test]
fn test_distinct_count_is_distinct_cardinality() {
    let engine = fixture_engine(20_140_606, ExecutionMode::Parallel);

    let sets = engine.distinct("cash", false, "dim_productlineid", None).unwrap();
    let counts = engine
        .distinct_count("cash", false, "dim_productlineid", None)
        .unwrap();
    assert_eq!(sets.len(), 7);
    for (key, set) in &sets {
        assert_eq!(counts[key], set.len());
    }
}

#[test]
fn test_repeated_builds_answer_identically() {
    let first = fixture_engine(20_140_606, ExecutionMode::Parallel);
    let second = fixture_engine(20_140_606, ExecutionMode::Parallel);

    assert_eq!(first.snapshot().stats(), second.snapshot().stats());
    assert_eq!(
        first.group_sum("cash", "dim_tradeid", None).unwrap(),
        second.group_sum("cash", "dim_tradeid", None).unwrap()
    );
}

#[test]
fn test_parallel_and_sequential_agree() {
    let parallel = fixture_engine(20_140_606, ExecutionMode::Parallel);
    let sequential = fixture_engine(20_140_606, ExecutionMode::Sequential);
    let filter = trade_filter().with("dim_productlineid", [0, 3]);

    assert_eq!(
        parallel.sum("shw", Some(&filter)).unwrap(),
        sequential.sum("shw", Some(&filter)).unwrap()
    );
    assert_eq!(
        parallel.group_sum("cash", "dim_productlineid", None).unwrap(),
        sequential.group_sum("cash", "dim_productlineid", None).unwrap()
    );
    assert_eq!(
        parallel
            .distinct_count("dim_tradeid", true, "dim_productlineid", Some(&filter))
            .unwrap(),
        sequential
            .distinct_count("dim_tradeid", true, "dim_productlineid", Some(&filter))
            .unwrap()
    );
}

#[test]
fn test_merge_order_does_not_matter() {
    let left = table_of("l", &[(1, 1, 1, 10), (2, 2, 1, 20)]);
    let right = table_of("r", &[(3, 1, 2, 5), (4, 3, 2, 7)]);

    let mut lr = left.clone();
    lr.merge(&right).unwrap();
    let mut rl = right.clone();
    rl.merge(&left).unwrap();

    let lr = CubeEngine::new(lr, ExecutionMode::Sequential);
    let rl = CubeEngine::new(rl, ExecutionMode::Parallel);
    assert_eq!(lr.sum("v", None).unwrap(), rl.sum("v", None).unwrap());
    assert_eq!(
        lr.group_sum("v", "a", None).unwrap(),
        rl.group_sum("v", "a", None).unwrap()
    );
    assert_eq!(
        lr.distinct_count("a", true, "b", None).unwrap(),
        rl.distinct_count("a", true, "b", None).unwrap()
    );
    let filter = DimFilter::new().with("a", [1]);
    assert_eq!(lr.sum("v", Some(&filter)).unwrap(), dec("15"));
    assert_eq!(rl.sum("v", Some(&filter)).unwrap(), dec("15"));
}

#[test]
fn test_engine_merge_is_visible_to_queries() {
    let engine = CubeEngine::new(table_of("l", &[(1, 1, 1, 10)]), ExecutionMode::Parallel);
    engine.merge(&table_of("r", &[(1, 2, 1, 4), (2, 2, 2, 6)])).unwrap();

    let filter = DimFilter::new().with("a", [1]);
    assert_eq!(engine.sum("v", Some(&filter)).unwrap(), dec("0"));
    assert_eq!(engine.sum("v", None).unwrap(), dec("10"));
}

#[test]
fn test_queries_during_merge_see_whole_tables() {
    let base: Vec<(u32, DimValue, DimValue, i64)> = (1..=1000).map(|id| (id, 1, 1, 1)).collect();
    let extra: Vec<(u32, DimValue, DimValue, i64)> =
        (1001..=2000).map(|id| (id, 2, 1, 1)).collect();
    let engine = CubeEngine::new(table_of("base", &base), ExecutionMode::Parallel);
    let extra = table_of("extra", &extra);
    let before = dec("1000");
    let after = dec("2000");
    let merged = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let mut last = before.clone();
                loop {
                    let done = merged.load(Ordering::Acquire);
                    let sum = engine.sum("v", None).unwrap();
                    assert!(sum == before || sum == after, "torn read: {sum}");
                    assert!(sum >= last);
                    last = sum;
                    if done {
                        assert_eq!(last, after);
                        break;
                    }
                }
            });
        }
        scope.spawn(|| {
            std::thread::sleep(Duration::from_millis(5));
            engine.merge(&extra).unwrap();
            merged.store(true, Ordering::Release);
        });
    });

    assert_eq!(engine.sum("v", None).unwrap(), after);
    assert_eq!(engine.group_sum("v", "a", None).unwrap()[&2], dec("1000"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_indexed_queries_match_linear_scan(
        rows in prop::collection::vec((0..5i32, 0..4i32, -1000i64..1000), 0..200),
        wanted_a in prop::collection::btree_set(0..5i32, 0..4),
        wanted_b in prop::option::of(prop::collection::btree_set(0..4i32, 1..3)),
        parallel in any::<bool>(),
    ) {
        let table_rows: Vec<(u32, DimValue, DimValue, i64)> = rows
            .iter()
            .enumerate()
            .map(|(i, (a, b, v))| (u32::try_from(i + 1).unwrap(), *a, *b, *v))
            .collect();
        let engine = CubeEngine::new(
            table_of("p", &table_rows),
            ExecutionMode::from_parallel(parallel),
        );

        let mut filter = DimFilter::new().with("a", wanted_a.iter().copied());
        if let Some(wanted_b) = &wanted_b {
            filter.insert("b", wanted_b.iter().copied());
        }
        let matching: Vec<&(u32, DimValue, DimValue, i64)> = table_rows
            .iter()
            .filter(|(_, a, b, _)| {
                wanted_a.contains(a) && wanted_b.as_ref().map_or(true, |w| w.contains(b))
            })
            .collect();

        let expected: i64 = matching.iter().map(|(_, _, _, v)| v).sum();
        prop_assert_eq!(
            engine.sum("v", Some(&filter)).unwrap(),
            round_indicator(&BigDecimal::from(expected))
        );

        let mut expected_groups: HashMap<DimValue, i64> = HashMap::new();
        for (_, _, b, v) in &matching {
            *expected_groups.entry(*b).or_default() += v;
        }
        let groups = engine.group_sum("v", "b", Some(&filter)).unwrap();
        prop_assert_eq!(groups.len(), expected_groups.len());
        for (key, value) in expected_groups {
            prop_assert_eq!(&groups[&key], &round_indicator(&BigDecimal::from(value)));
        }

        let ids: Vec<u32> = matching.iter().map(|(id, ..)| *id).collect();
        prop_assert_eq!(engine.filter(&filter).unwrap().iter().collect::<Vec<_>>(), ids);
    }
}

// ============================================================================
// Source Tests
// ============================================================================

#[test]
fn test_tsv_file_end_to_end() {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(file, "dim_date\tdim_tradeid\tcsm\tclick").unwrap();
    writeln!(file, "20140606\t3201\t1.25\t3").unwrap();
    writeln!(file, "20140606\t\t0.75\t1").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "20140607\t3201\t100\t1").unwrap();
    file.flush().unwrap();

    let source = TsvRowSource::new(file.path(), "dim_date");
    let scan = source.scan(&DateRange::new(20_140_606, 20_140_606)).unwrap();
    let table = load_fact_table("20140606", scan, &ColumnSplit::default(), &[]).unwrap();
    assert_eq!(table.len(), 2);

    let engine = CubeEngine::new(table, ExecutionMode::Parallel);
    assert_eq!(engine.sum("csm", None).unwrap(), dec("2"));
    let groups = engine.group_sum("click", "dim_tradeid", None).unwrap();
    assert_eq!(groups[&3201], dec("3"));
    assert_eq!(groups[&Schema::UNSET_DIMENSION], dec("1"));
}

// ============================================================================
// Cluster Tests
// ============================================================================

/// Fixture source that refuses scans starting at one date
struct FlakySource {
    inner: MemoryRowSource,
    failing_start: u32,
}

impl RowSource for FlakySource {
    fn scan(&self, range: &DateRange) -> Result<RowScan> {
        if range.start == self.failing_start {
            return Err(Error::Internal(format!("scan of {} refused", range)));
        }
        self.inner.scan(range)
    }
}

fn cluster_config() -> Config {
    let mut config = Config::default();
    config.node.join_delay_secs = 0;
    config
}

/// Test helper to start a cluster of `nodes` members over both fixture days
async fn create_test_cluster(nodes: usize) -> LocalCluster {
    let source = FlakySource {
        inner: fixture_source(&[20_140_606, 20_140_607]),
        failing_start: 20_150_101,
    };
    let cluster = LocalCluster::new(&cluster_config(), Arc::new(source));
    let addresses: Vec<String> = (1..=nodes).map(|i| format!("10.0.0.{}:5701", i)).collect();
    cluster
        .start_nodes(&addresses)
        .await
        .expect("Failed to start nodes");
    cluster
}

fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_cluster_assignment_and_status() {
    let cluster = create_test_cluster(3).await;
    assert_eq!(cluster.manager().status().awaiting.len(), 3);

    let assigned = cluster
        .assign_awaiting(&keys(&["20140606", "20140607"]))
        .await
        .unwrap();
    assert_eq!(assigned.len(), 2);

    let status = cluster.manager().status();
    assert_eq!(status.working.len(), 2);
    assert_eq!(status.awaiting.len(), 1);
    assert_eq!(status.total(), 3);
    assert_eq!(cluster.manager().cube_ids("201406").len(), 2);
    assert_eq!(cluster.manager().cube_ids("20140607").len(), 1);
    assert_eq!(cluster.manager().all_cube_ids().len(), 3);
}

#[tokio::test]
async fn test_cluster_queries_reduce_across_nodes() {
    let cluster = create_test_cluster(3).await;
    cluster
        .assign_awaiting(&keys(&["20140606", "20140607"]))
        .await
        .unwrap();
    let manager = cluster.manager();

    assert_eq!(manager.sum("csm", None, &keys(&["201406"])).await.unwrap(), dec("420"));
    assert_eq!(manager.sum("csm", None, &keys(&["20140606"])).await.unwrap(), dec("210"));
    // The unassigned member answers zero
    assert_eq!(manager.sum("csm", None, &[]).await.unwrap(), dec("420"));
    assert_eq!(
        manager
            .sum("csm", Some(trade_filter()), &keys(&["201406"]))
            .await
            .unwrap(),
        dec("26")
    );

    let groups = manager
        .group_sum("csm", "dim_tradeid", None, &keys(&["201406"]))
        .await
        .unwrap();
    assert_eq!(groups.len(), 210);
    assert_eq!(groups[&-1], dec("2"));

    // Both days carry the same trades, a value seen on both nodes counts once
    let local = fixture_engine(20_140_606, ExecutionMode::Parallel)
        .distinct_count("dim_tradeid", true, "dim_productlineid", None)
        .unwrap();
    let counts = manager
        .distinct_count("dim_tradeid", true, "dim_productlineid", None, &keys(&["201406"]))
        .await
        .unwrap();
    assert_eq!(counts, local);

    let by_day = manager
        .distinct("dim_tradeid", true, "dim_date", None, &[])
        .await
        .unwrap();
    assert_eq!(by_day.len(), 2);
    assert_eq!(by_day[&20_140_607].len(), 210);
}

#[tokio::test]
async fn test_cluster_unknown_shard_is_invalid() {
    let cluster = create_test_cluster(1).await;
    cluster.assign_awaiting(&keys(&["20140606"])).await.unwrap();

    let err = cluster
        .manager()
        .sum("csm", None, &keys(&["2015"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_cluster_node_error_fails_whole_query() {
    let cluster = create_test_cluster(3).await;
    cluster
        .assign_awaiting(&keys(&["20140606", "20140607"]))
        .await
        .unwrap();

    let err = cluster
        .manager()
        .sum("nope", None, &keys(&["201406"]))
        .await
        .unwrap_err();
    match err {
        Error::Cluster(ClusterError::PartialFailure { failed, total, .. }) => {
            assert_eq!((failed, total), (2, 2));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_cluster_failed_assignment_keeps_state() {
    let cluster = create_test_cluster(1).await;
    let awaiting = cluster.manager().status().awaiting;

    let err = cluster
        .manager()
        .reassign(&awaiting[0], "20150101")
        .await
        .unwrap_err();
    assert!(err.is_partial_failure());
    assert_eq!(cluster.manager().status().awaiting, awaiting);
}

#[tokio::test]
async fn test_cluster_reassign_moves_shard() {
    let cluster = create_test_cluster(2).await;
    let assigned = cluster.assign_awaiting(&keys(&["20140606"])).await.unwrap();
    let manager = cluster.manager();

    let moved = manager.reassign(&assigned[0], "20140607").await.unwrap();
    assert!(moved.starts_with("20140607::"));
    assert!(manager.cube_ids("20140606").is_empty());
    assert_eq!(manager.sum("csm", None, &keys(&["201406"])).await.unwrap(), dec("210"));

    // Assigning the same shard again leaves the answer unchanged
    let again = manager.reassign(&moved, "20140607").await.unwrap();
    assert_eq!(again, moved);
    assert_eq!(manager.sum("csm", None, &keys(&["20140607"])).await.unwrap(), dec("210"));
}

#[tokio::test]
async fn test_cluster_restarted_node_reloads_its_shard() {
    let cluster = create_test_cluster(2).await;
    let assigned = cluster.assign_awaiting(&keys(&["20140606"])).await.unwrap();
    let owner = assigned[0].split('@').last().unwrap().to_string();

    cluster.stop_node(&owner).expect("Node was not a member");
    assert!(cluster.manager().cube_ids("20140606").is_empty());

    let node = cluster.add_node(&owner);
    assert!(node.is_load_pending());
    let rejoined = node.join().unwrap();
    assert_eq!(rejoined.to_string(), assigned[0]);
    assert_eq!(
        cluster
            .manager()
            .sum("csm", None, &keys(&["20140606"]))
            .await
            .unwrap(),
        dec("210")
    );
}

#[tokio::test]
async fn test_cluster_set_mode_keeps_answers() {
    let cluster = create_test_cluster(2).await;
    cluster
        .assign_awaiting(&keys(&["20140606", "20140607"]))
        .await
        .unwrap();
    let manager = cluster.manager();

    let before = manager
        .group_sum("cash", "dim_productlineid", None, &[])
        .await
        .unwrap();
    manager.set_mode(ExecutionMode::Sequential, &[]).await.unwrap();
    let after = manager
        .group_sum("cash", "dim_productlineid", None, &[])
        .await
        .unwrap();
    assert_eq!(before, after);

    let err = manager
        .set_mode(ExecutionMode::Parallel, &keys(&["2013"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_node_builds_derived_dimensions() {
    let source = fixture_source(&[20_140_606]);
    let node = CubeNode::new(
        &Config::default(),
        Arc::new(MemoryShardRegistry::new()),
        Arc::new(source),
    )
    .with_derived_dimensions(vec![DerivedDimension::new("dim_cash_band", |indicators| {
        // cash is the second indicator column
        if indicators[1] >= BigDecimal::from(2000) {
            2
        } else if indicators[1] >= BigDecimal::from(1000) {
            1
        } else {
            0
        }
    })]);

    let joined = node.join().unwrap();
    node.assign(&joined, "20140606").unwrap();

    let engine = node.engine().expect("Node has no cube");
    let bands = engine.group_sum("click", "dim_cash_band", None).unwrap();
    assert_eq!(bands[&0], dec("1000"));
    assert_eq!(bands[&1], dec("1000"));
    assert_eq!(bands[&2], dec("100"));

    let filter = DimFilter::new().with("dim_cash_band", [2]);
    assert_eq!(engine.sum("click", Some(&filter)).unwrap(), dec("100"));
}

/// Transport that holds back every call to one member
struct SlowTransport {
    inner: Arc<LocalTransport>,
    slow: String,
}

#[async_trait]
impl ClusterTransport for SlowTransport {
    fn members(&self) -> Vec<NodeAddress> {
        self.inner.members()
    }

    async fn call(&self, node: &str, op: CubeOp) -> Result<CubeResponse> {
        if node == self.slow {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.inner.call(node, op).await
    }
}

#[tokio::test]
async fn test_cluster_query_times_out_on_slow_member() {
    let cluster = create_test_cluster(2).await;
    cluster
        .assign_awaiting(&keys(&["20140606", "20140607"]))
        .await
        .unwrap();

    let transport = Arc::new(SlowTransport {
        inner: Arc::clone(cluster.transport()),
        slow: "10.0.0.2:5701".to_string(),
    });
    let manager = ClusterManager::new(
        &ClusterConfig {
            executor_timeout_secs: 1,
        },
        transport,
        cluster.registry().clone(),
    );

    // The fast member alone still answers in time
    assert_eq!(manager.sum("csm", None, &keys(&["20140606"])).await.unwrap(), dec("210"));

    let err = manager.sum("csm", None, &keys(&["201406"])).await.unwrap_err();
    assert!(err.is_timeout());
    match err {
        Error::Cluster(ClusterError::Timeout { received, total, .. }) => {
            assert_eq!((received, total), (1, 2));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_cluster_failed_restart_is_unassigned() {
    let source = FlakySource {
        inner: fixture_source(&[20_140_606, 20_140_607]),
        failing_start: 20_140_606,
    };
    let cluster = LocalCluster::new(&cluster_config(), Arc::new(source));
    let address = "10.0.0.9:5701";
    cluster.registry().put(
        address,
        CubeId::assigned("20140606", "minicubes-cluster", address).to_string(),
    );

    let node = cluster.add_node(address);
    assert!(node.join().is_err());

    let manager = cluster.manager();
    assert_eq!(manager.status().awaiting, vec!["?::minicubes-cluster@10.0.0.9:5701"]);
    assert!(manager.cube_ids("20140606").is_empty());

    // Nobody serves the shard, so asking for it is an error rather than zero
    let err = manager.sum("csm", None, &keys(&["20140606"])).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(manager.sum("csm", None, &[]).await.unwrap(), dec("0"));
}

#[tokio::test]
async fn test_cluster_load_pending_member_records_then_builds() {
    let cluster = create_test_cluster(1).await;
    cluster.assign_awaiting(&keys(&["20140607"])).await.unwrap();

    let address = "10.0.0.5:5701";
    let node = cluster.add_node(address);
    assert!(node.is_load_pending());

    let manager = cluster.manager();
    let unassigned = CubeId::unassigned("minicubes-cluster", address).to_string();
    let recorded = manager.reassign(&unassigned, "20140606").await.unwrap();
    assert_eq!(recorded, "20140606::minicubes-cluster@10.0.0.5:5701");
    assert!(node.engine().is_none());

    // The recorded owner has no cube yet and must not answer as if empty
    let err = manager.sum("csm", None, &keys(&["201406"])).await.unwrap_err();
    assert!(err.is_partial_failure());

    let joined = node.spawn_join(Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(joined.to_string(), recorded);
    assert_eq!(manager.sum("csm", None, &keys(&["201406"])).await.unwrap(), dec("420"));
}
