//! Cross-Partition Query Executor (C9): parallel fan-out across the
//! routed partition set with bounded concurrency and aggregation
//! (spec §4.9).

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::manager::PartitionManager;
use crate::router::{PartitionRouter, QueryPredicates};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationType {
    Union,
    Merge,
    Intersect,
    First,
}

#[derive(Debug, Clone)]
pub struct PartitionQueryResult {
    pub partition_id: String,
    pub results: Vec<Value>,
    pub execution_time_ms: f64,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CrossPartitionQueryResult {
    pub partition_results: Vec<PartitionQueryResult>,
    pub aggregated_results: Vec<Value>,
    pub total_execution_time_ms: f64,
    pub partitions_queried: usize,
    pub partitions_succeeded: usize,
    pub aggregation_type: AggregationType,
}

/// The query-execution seam: a real implementation dispatches to the
/// Capsule Store for the named partition.
#[async_trait]
pub trait PartitionQueryCallback: Send + Sync {
    async fn query_partition(
        &self,
        partition_id: &str,
        query: &str,
        params: &Value,
        limit: usize,
    ) -> Result<Vec<Value>, String>;
}

fn result_id(value: &Value) -> Option<String> {
    value
        .get("id")
        .or_else(|| value.get("capsule_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub struct CrossPartitionQueryExecutor<'a> {
    manager: &'a PartitionManager,
    callback: std::sync::Arc<dyn PartitionQueryCallback>,
    concurrency: std::sync::Arc<Semaphore>,
    queries_executed: AtomicU64,
    avg_execution_time_ms: std::sync::Mutex<f64>,
}

impl<'a> CrossPartitionQueryExecutor<'a> {
    pub fn new(
        manager: &'a PartitionManager,
        callback: std::sync::Arc<dyn PartitionQueryCallback>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            manager,
            callback,
            concurrency: std::sync::Arc::new(Semaphore::new(max_concurrency.max(1))),
            queries_executed: AtomicU64::new(0),
            avg_execution_time_ms: std::sync::Mutex::new(0.0),
        }
    }

    pub async fn execute(
        &self,
        query: &str,
        params: &Value,
        predicates: &QueryPredicates,
        aggregation: AggregationType,
        timeout: Duration,
        max_results_per_partition: usize,
    ) -> CrossPartitionQueryResult {
        let start = Instant::now();
        self.queries_executed.fetch_add(1, Ordering::Relaxed);

        let router = PartitionRouter::new(self.manager);
        let (scope, partition_ids) = router.route_query(predicates);
        tracing::debug!(?scope, partitions = partition_ids.len(), "cross_partition_query_started");

        let partition_results = match tokio::time::timeout(
            timeout,
            self.execute_parallel(&partition_ids, query, params, max_results_per_partition),
        )
        .await
        {
            Ok(results) => results,
            Err(_) => {
                tracing::warn!(partitions = partition_ids.len(), "cross_partition_query_timeout");
                partition_ids
                    .iter()
                    .map(|id| PartitionQueryResult {
                        partition_id: id.clone(),
                        results: Vec::new(),
                        execution_time_ms: 0.0,
                        success: false,
                        error: Some("timeout".to_string()),
                    })
                    .collect()
            }
        };

        let aggregated = Self::aggregate(&partition_results, aggregation);
        let total_execution_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.update_running_average(total_execution_time_ms);

        let partitions_succeeded = partition_results.iter().filter(|r| r.success).count();
        tracing::debug!(
            partitions = partition_ids.len(),
            results = aggregated.len(),
            time_ms = total_execution_time_ms,
            "cross_partition_query_completed"
        );

        CrossPartitionQueryResult {
            partition_results,
            aggregated_results: aggregated,
            total_execution_time_ms,
            partitions_queried: partition_ids.len(),
            partitions_succeeded,
            aggregation_type: aggregation,
        }
    }

    async fn execute_parallel(
        &self,
        partition_ids: &[String],
        query: &str,
        params: &Value,
        max_results: usize,
    ) -> Vec<PartitionQueryResult> {
        let futures = partition_ids.iter().map(|partition_id| {
            let semaphore = self.concurrency.clone();
            let callback = self.callback.clone();
            let partition_id = partition_id.clone();
            let query = query.to_string();
            let params = params.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let start = Instant::now();
                match callback
                    .query_partition(&partition_id, &query, &params, max_results)
                    .await
                {
                    Ok(mut results) => {
                        results.truncate(max_results);
                        PartitionQueryResult {
                            partition_id,
                            results,
                            execution_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                            success: true,
                            error: None,
                        }
                    }
                    Err(e) => PartitionQueryResult {
                        partition_id,
                        results: Vec::new(),
                        execution_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                        success: false,
                        error: Some(e),
                    },
                }
            }
        });
        join_all(futures).await
    }

    fn aggregate(results: &[PartitionQueryResult], aggregation: AggregationType) -> Vec<Value> {
        let all: Vec<Value> = results
            .iter()
            .filter(|r| r.success)
            .flat_map(|r| r.results.clone())
            .collect();

        match aggregation {
            AggregationType::Union => all,
            AggregationType::Merge => {
                let mut seen = BTreeSet::new();
                let mut merged = Vec::new();
                for value in all {
                    match result_id(&value) {
                        Some(id) if seen.insert(id.clone()) => merged.push(value),
                        Some(_) => {}
                        None => merged.push(value),
                    }
                }
                merged
            }
            AggregationType::Intersect => {
                let successful: Vec<&PartitionQueryResult> =
                    results.iter().filter(|r| r.success).collect();
                if successful.is_empty() {
                    return Vec::new();
                }
                let mut common: Option<BTreeSet<String>> = None;
                for r in &successful {
                    let ids: BTreeSet<String> = r.results.iter().filter_map(result_id).collect();
                    common = Some(match common {
                        Some(acc) => acc.intersection(&ids).cloned().collect(),
                        None => ids,
                    });
                }
                let common = common.unwrap_or_default();
                if common.is_empty() {
                    return Vec::new();
                }
                let mut seen = BTreeSet::new();
                all.into_iter()
                    .filter(|v| match result_id(v) {
                        Some(id) => common.contains(&id) && seen.insert(id),
                        None => false,
                    })
                    .collect()
            }
            AggregationType::First => all.into_iter().take(1).collect(),
        }
    }

    fn update_running_average(&self, sample_ms: f64) {
        let n = self.queries_executed.load(Ordering::Relaxed) as f64;
        let mut avg = self.avg_execution_time_ms.lock().expect("poisoned");
        *avg = (*avg * (n - 1.0) + sample_ms) / n;
    }

    pub fn stats(&self) -> (u64, f64) {
        (
            self.queries_executed.load(Ordering::Relaxed),
            *self.avg_execution_time_ms.lock().expect("poisoned"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct StaticCallback {
        responses: std::collections::HashMap<String, Vec<Value>>,
    }

    #[async_trait]
    impl PartitionQueryCallback for StaticCallback {
        async fn query_partition(
            &self,
            partition_id: &str,
            _query: &str,
            _params: &Value,
            _limit: usize,
        ) -> Result<Vec<Value>, String> {
            Ok(self.responses.get(partition_id).cloned().unwrap_or_default())
        }
    }

    fn two_partition_manager() -> PartitionManager {
        let manager = PartitionManager::new(1000, 0.2);
        manager.create_partition(
            "second".to_string(),
            forge_primitives::PartitionStrategy::Domain,
            BTreeSet::new(),
            None,
        );
        manager
    }

    /// Scenario S5 shape: intersect/merge correctness (invariant 7).
    #[tokio::test]
    async fn intersect_returns_only_ids_present_in_every_successful_partition() {
        let manager = two_partition_manager();
        let partitions = manager.list_partitions();
        let a = partitions[0].partition_id.clone();
        let b = partitions[1].partition_id.clone();

        let mut responses = std::collections::HashMap::new();
        responses.insert(a.clone(), vec![serde_json::json!({"id": "1"}), serde_json::json!({"id": "2"})]);
        responses.insert(b.clone(), vec![serde_json::json!({"id": "2"}), serde_json::json!({"id": "3"})]);

        let executor = CrossPartitionQueryExecutor::new(&manager, Arc::new(StaticCallback { responses }), 4);
        let result = executor
            .execute(
                "search",
                &serde_json::json!({}),
                &QueryPredicates::default(),
                AggregationType::Intersect,
                Duration::from_secs(1),
                100,
            )
            .await;

        // only the shared id "2" survives, deduplicated to a single entry.
        assert_eq!(result.aggregated_results.len(), 1);
        assert!(result.aggregated_results.iter().all(|v| v["id"] == "2"));
    }

    #[tokio::test]
    async fn merge_deduplicates_by_id_keeping_first_occurrence() {
        let manager = two_partition_manager();
        let partitions = manager.list_partitions();
        let a = partitions[0].partition_id.clone();
        let b = partitions[1].partition_id.clone();

        let mut responses = std::collections::HashMap::new();
        responses.insert(a.clone(), vec![serde_json::json!({"id": "1"})]);
        responses.insert(b.clone(), vec![serde_json::json!({"id": "1"}), serde_json::json!({"id": "2"})]);

        let executor = CrossPartitionQueryExecutor::new(&manager, Arc::new(StaticCallback { responses }), 4);
        let result = executor
            .execute(
                "search",
                &serde_json::json!({}),
                &QueryPredicates::default(),
                AggregationType::Merge,
                Duration::from_secs(1),
                100,
            )
            .await;

        assert_eq!(result.aggregated_results.len(), 2);
    }

    #[tokio::test]
    async fn partial_failure_still_returns_successful_partitions_results() {
        struct FailingOneCallback;
        #[async_trait]
        impl PartitionQueryCallback for FailingOneCallback {
            async fn query_partition(
                &self,
                partition_id: &str,
                _query: &str,
                _params: &Value,
                _limit: usize,
            ) -> Result<Vec<Value>, String> {
                if partition_id == "default" {
                    Err("connection refused".to_string())
                } else {
                    Ok(vec![serde_json::json!({"id": "ok"})])
                }
            }
        }

        let manager = two_partition_manager();
        let executor = CrossPartitionQueryExecutor::new(&manager, Arc::new(FailingOneCallback), 4);
        let result = executor
            .execute(
                "search",
                &serde_json::json!({}),
                &QueryPredicates::default(),
                AggregationType::Union,
                Duration::from_secs(1),
                100,
            )
            .await;

        assert_eq!(result.partitions_queried, 2);
        assert_eq!(result.partitions_succeeded, 1);
        assert_eq!(result.aggregated_results.len(), 1);
    }
}
