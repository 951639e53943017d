//! Process-global metrics rendered in Prometheus text exposition format.
//!
//! Counters and histograms with small label sets are kept behind coarse
//! locks; hot single-value gauges are plain atomics. `Metrics::global()`
//! is the only handle, initialized once and shared by middleware, the job
//! stores, and the worker pool so both store variants record identically.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

/// Default histogram buckets, seconds.
const BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Fixed-bucket histogram.
#[derive(Debug, Default, Clone)]
struct Histogram {
    counts: [u64; BUCKETS.len()],
    sum: f64,
    total: u64,
}

impl Histogram {
    fn observe(&mut self, value: f64) {
        for (slot, bound) in self.counts.iter_mut().zip(BUCKETS.iter()) {
            if value <= *bound {
                *slot += 1;
            }
        }
        self.sum += value;
        self.total += 1;
    }

    fn render_into(&self, out: &mut String, name: &str, labels: &str) {
        let sep = if labels.is_empty() { "" } else { "," };
        for (count, bound) in self.counts.iter().zip(BUCKETS.iter()) {
            out.push_str(&format!(
                "{name}_bucket{{{labels}{sep}le=\"{bound}\"}} {count}\n"
            ));
        }
        out.push_str(&format!(
            "{name}_bucket{{{labels}{sep}le=\"+Inf\"}} {}\n",
            self.total
        ));
        out.push_str(&format!("{name}_sum{{{labels}}} {}\n", self.sum));
        out.push_str(&format!("{name}_count{{{labels}}} {}\n", self.total));
    }
}

/// The process-wide metric registry.
#[derive(Debug, Default)]
pub struct Metrics {
    requests_total: Mutex<BTreeMap<(String, u16), u64>>,
    request_duration: Mutex<BTreeMap<String, Histogram>>,
    jobs_running: AtomicI64,
    jobs_submitted_total: AtomicU64,
    jobs_completed_total: Mutex<BTreeMap<&'static str, u64>>,
    run_duration: Mutex<BTreeMap<(String, String, String), Histogram>>,
    job_duration: Mutex<BTreeMap<&'static str, Histogram>>,
    queue_depth: AtomicI64,
    workers_busy: AtomicI64,
}

impl Metrics {
    pub fn global() -> &'static Metrics {
        static GLOBAL: OnceLock<Metrics> = OnceLock::new();
        GLOBAL.get_or_init(Metrics::default)
    }

    pub fn record_request(&self, route: &str, status: u16, elapsed: Duration) {
        *self
            .requests_total
            .lock()
            .expect("metrics lock poisoned")
            .entry((route.to_string(), status))
            .or_insert(0) += 1;
        self.request_duration
            .lock()
            .expect("metrics lock poisoned")
            .entry(route.to_string())
            .or_default()
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_run(&self, mode: &str, dist: &str, elem_type: &str, elapsed: Duration) {
        self.run_duration
            .lock()
            .expect("metrics lock poisoned")
            .entry((mode.to_string(), dist.to_string(), elem_type.to_string()))
            .or_default()
            .observe(elapsed.as_secs_f64());
    }

    pub fn job_submitted(&self) {
        self.jobs_submitted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_started(&self) {
        self.jobs_running.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a terminal job outcome; `result` is `done|failed|canceled`.
    pub fn job_finished(&self, result: &'static str, elapsed: Duration) {
        self.jobs_running.fetch_sub(1, Ordering::Relaxed);
        *self
            .jobs_completed_total
            .lock()
            .expect("metrics lock poisoned")
            .entry(result)
            .or_insert(0) += 1;
        self.job_duration
            .lock()
            .expect("metrics lock poisoned")
            .entry(result)
            .or_default()
            .observe(elapsed.as_secs_f64());
    }

    pub fn set_queue_depth(&self, depth: i64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn worker_busy(&self, busy: bool) {
        let delta = if busy { 1 } else { -1 };
        self.workers_busy.fetch_add(delta, Ordering::Relaxed);
    }

    /// Renders every family in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(4096);

        out.push_str("# HELP requests_total HTTP requests by route and status.\n");
        out.push_str("# TYPE requests_total counter\n");
        for ((route, status), count) in
            self.requests_total.lock().expect("metrics lock poisoned").iter()
        {
            out.push_str(&format!(
                "requests_total{{route=\"{route}\",status=\"{status}\"}} {count}\n"
            ));
        }

        out.push_str("# HELP request_duration_seconds HTTP request wall-clock time.\n");
        out.push_str("# TYPE request_duration_seconds histogram\n");
        for (route, histogram) in
            self.request_duration.lock().expect("metrics lock poisoned").iter()
        {
            histogram.render_into(
                &mut out,
                "request_duration_seconds",
                &format!("route=\"{route}\""),
            );
        }

        out.push_str("# HELP jobs_running Jobs currently executing.\n");
        out.push_str("# TYPE jobs_running gauge\n");
        out.push_str(&format!(
            "jobs_running {}\n",
            self.jobs_running.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP jobs_submitted_total Jobs accepted for execution.\n");
        out.push_str("# TYPE jobs_submitted_total counter\n");
        out.push_str(&format!(
            "jobs_submitted_total {}\n",
            self.jobs_submitted_total.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP jobs_completed_total Terminal job outcomes.\n");
        out.push_str("# TYPE jobs_completed_total counter\n");
        for (result, count) in self
            .jobs_completed_total
            .lock()
            .expect("metrics lock poisoned")
            .iter()
        {
            out.push_str(&format!(
                "jobs_completed_total{{result=\"{result}\"}} {count}\n"
            ));
        }

        out.push_str("# HELP run_duration_seconds Engine run wall-clock time.\n");
        out.push_str("# TYPE run_duration_seconds histogram\n");
        for ((mode, dist, elem_type), histogram) in
            self.run_duration.lock().expect("metrics lock poisoned").iter()
        {
            histogram.render_into(
                &mut out,
                "run_duration_seconds",
                &format!("mode=\"{mode}\",dist=\"{dist}\",type=\"{elem_type}\""),
            );
        }

        out.push_str("# HELP job_duration_seconds Job wall-clock time by outcome.\n");
        out.push_str("# TYPE job_duration_seconds histogram\n");
        for (result, histogram) in
            self.job_duration.lock().expect("metrics lock poisoned").iter()
        {
            histogram.render_into(
                &mut out,
                "job_duration_seconds",
                &format!("result=\"{result}\""),
            );
        }

        out.push_str("# HELP queue_depth Pending jobs awaiting a worker.\n");
        out.push_str("# TYPE queue_depth gauge\n");
        out.push_str(&format!(
            "queue_depth {}\n",
            self.queue_depth.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP workers_busy Workers currently running a job.\n");
        out.push_str("# TYPE workers_busy gauge\n");
        out.push_str(&format!(
            "workers_busy {}\n",
            self.workers_busy.load(Ordering::Relaxed)
        ));

        out
    }
}
