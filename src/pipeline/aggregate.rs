//! 比较结果的汇总

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::compare::{CmpVerdict, PlanCmpResult};

/// 一组结果的执行计划数和按执行次数加权的语句数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCount {
    pub sql: u64,
    pub plan: usize,
}

impl ChangeCount {
    fn add(&mut self, exec_count: u64) {
        self.sql += exec_count;
        self.plan += 1;
    }

    fn merge(self, other: ChangeCount) -> ChangeCount {
        ChangeCount {
            sql: self.sql + other.sql,
            plan: self.plan + other.plan,
        }
    }
}

/// 结果分桶：计划相同、计划不同、不可重试错误、可重试
#[derive(Debug, Default)]
pub struct Aggregate {
    results: Vec<PlanCmpResult>,
    same: ChangeCount,
    diff: ChangeCount,
    error: ChangeCount,
    retry: ChangeCount,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: PlanCmpResult) {
        let exec_count = result.old_version_info.exec_count;
        match result.result {
            CmpVerdict::Same => self.same.add(exec_count),
            CmpVerdict::Diff => self.diff.add(exec_count),
            CmpVerdict::Unknown if result.err_msg.is_empty() => self.retry.add(exec_count),
            CmpVerdict::Unknown => self.error.add(exec_count),
        }
        self.results.push(result);
    }

    pub fn results(&self) -> &[PlanCmpResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn same(&self) -> ChangeCount {
        self.same
    }

    pub fn diff(&self) -> ChangeCount {
        self.diff
    }

    pub fn error(&self) -> ChangeCount {
        self.error
    }

    pub fn retry(&self) -> ChangeCount {
        self.retry
    }

    /// 报告中的错误包含不可重试错误和等待重试的结果
    pub fn errors_and_retries(&self) -> ChangeCount {
        self.error.merge(self.retry)
    }

    pub fn overall(&self) -> ChangeCount {
        self.same
            .merge(self.diff)
            .merge(self.error)
            .merge(self.retry)
    }
}

/// 按累计延迟取前 `n` 个结果，从大到小排列，不修改输入
///
/// 用大小为 `n` 的小顶堆筛选，延迟相同时先出现的结果排在前面
pub fn top_n_sum_latency_plans(results: &[PlanCmpResult], n: usize) -> Vec<&PlanCmpResult> {
    if n == 0 {
        return Vec::new();
    }

    // 堆顶是当前保留的结果中延迟最小、位置最靠后的一个
    let mut heap: BinaryHeap<Reverse<(u64, Reverse<usize>)>> = BinaryHeap::with_capacity(n + 1);
    for (idx, result) in results.iter().enumerate() {
        let key = Reverse((result.old_version_info.sum_latency, Reverse(idx)));
        if heap.len() < n {
            heap.push(key);
        } else if heap.peek().is_some_and(|top| key < *top) {
            heap.pop();
            heap.push(key);
        }
    }

    let mut kept: Vec<(u64, usize)> = heap
        .into_iter()
        .map(|Reverse((latency, Reverse(idx)))| (latency, idx))
        .collect();
    kept.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    kept.into_iter().map(|(_, idx)| &results[idx]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StmtSummary;
    use rand::Rng;

    fn result_with_latency(sum_latency: u64) -> PlanCmpResult {
        PlanCmpResult::new(StmtSummary {
            sum_latency,
            exec_count: 1,
            ..Default::default()
        })
    }

    fn latencies(results: &[&PlanCmpResult]) -> Vec<u64> {
        results.iter().map(|r| r.old_version_info.sum_latency).collect()
    }

    #[test]
    fn test_top_n_sum_latency_plans() {
        assert!(top_n_sum_latency_plans(&[], 5).is_empty());

        let one = vec![result_with_latency(5)];
        assert_eq!(latencies(&top_n_sum_latency_plans(&one, 5)), vec![5]);

        let results: Vec<PlanCmpResult> = [1, 3, 2, 5, 4].into_iter().map(result_with_latency).collect();
        assert_eq!(
            latencies(&top_n_sum_latency_plans(&results, 10)),
            vec![5, 4, 3, 2, 1]
        );
        assert_eq!(latencies(&top_n_sum_latency_plans(&results, 3)), vec![5, 4, 3]);
        assert!(top_n_sum_latency_plans(&results, 0).is_empty());
    }

    #[test]
    fn test_top_n_matches_full_sort() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let len = rng.gen_range(0..60);
            let results: Vec<PlanCmpResult> = (0..len)
                .map(|_| result_with_latency(rng.gen_range(0..30)))
                .collect();

            let mut expected: Vec<u64> = results.iter().map(|r| r.old_version_info.sum_latency).collect();
            expected.sort_by(|a, b| b.cmp(a));

            for n in 0..=len + 2 {
                let got = latencies(&top_n_sum_latency_plans(&results, n));
                let want: Vec<u64> = expected.iter().take(n).copied().collect();
                assert_eq!(got, want, "n = {}", n);
            }
        }
    }

    #[test]
    fn test_top_n_ties_keep_input_order() {
        let mut results: Vec<PlanCmpResult> = (0..4).map(|_| result_with_latency(7)).collect();
        for (i, r) in results.iter_mut().enumerate() {
            r.old_version_info.sql_digest = format!("d{}", i);
        }
        let top = top_n_sum_latency_plans(&results, 2);
        let digests: Vec<&str> = top.iter().map(|r| r.old_version_info.sql_digest.as_str()).collect();
        assert_eq!(digests, vec!["d0", "d1"]);
    }

    #[test]
    fn test_buckets() {
        let mut agg = Aggregate::new();

        let mut same = result_with_latency(1);
        same.result = CmpVerdict::Same;
        same.old_version_info.exec_count = 10;
        agg.add(same);

        let mut diff = result_with_latency(1);
        diff.result = CmpVerdict::Diff;
        diff.old_version_info.exec_count = 3;
        agg.add(diff);

        let mut error = result_with_latency(1);
        error.err_msg = "parse failed".to_string();
        error.old_version_info.exec_count = 2;
        agg.add(error);

        agg.add(result_with_latency(1));

        assert_eq!(agg.same(), ChangeCount { sql: 10, plan: 1 });
        assert_eq!(agg.diff(), ChangeCount { sql: 3, plan: 1 });
        assert_eq!(agg.error(), ChangeCount { sql: 2, plan: 1 });
        assert_eq!(agg.retry(), ChangeCount { sql: 1, plan: 1 });
        assert_eq!(agg.errors_and_retries(), ChangeCount { sql: 3, plan: 2 });
        assert_eq!(agg.overall(), ChangeCount { sql: 16, plan: 4 });
        assert_eq!(agg.len(), 4);
    }
}
