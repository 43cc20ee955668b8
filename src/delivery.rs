use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use rand::Rng;
use tracing::{debug, error, warn};

use crate::batcher::CreateRequest;
use crate::error::{Error, Result};
use crate::retry::{retry_with_policy, RetryFailure, RetryPolicy};

/// Destination requests per rolling second.
pub const GROUP_SIZE: usize = 3;
pub const PACING_MIN: Duration = Duration::from_millis(1100);
pub const PACING_MAX: Duration = Duration::from_millis(1300);

/// Anything that can create one destination page per request.
#[async_trait]
pub trait PageSink: Send + Sync {
    async fn create_page(&self, request: &CreateRequest) -> Result<()>;
}

/// Wait inserted between consecutive request groups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    Fixed(Duration),
    /// Uniformly random in `min..=max`, so parallel runs drift out of lockstep.
    Jittered { min: Duration, max: Duration },
}

impl Pacing {
    pub fn next_delay(&self) -> Duration {
        match *self {
            Pacing::Fixed(delay) => delay,
            Pacing::Jittered { min, max } if max > min => rand::thread_rng().gen_range(min..=max),
            Pacing::Jittered { min, .. } => min,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::Jittered {
            min: PACING_MIN,
            max: PACING_MAX,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub group_size: usize,
    pub pacing: Pacing,
    pub retry: RetryPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        DeliveryConfig {
            group_size: GROUP_SIZE,
            pacing: Pacing::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub requests: usize,
    pub groups: usize,
    /// Failed attempts that were followed by another try.
    pub retries: u32,
}

impl DeliveryReport {
    pub fn absorb(&mut self, other: DeliveryReport) {
        self.requests += other.requests;
        self.groups += other.groups;
        self.retries += other.retries;
    }
}

/// Sends requests in small concurrent groups, one group at a time, pausing
/// between groups. The pause also applies across successive `deliver` calls
/// on the same engine.
pub struct DeliveryEngine<S> {
    sink: S,
    config: DeliveryConfig,
    sent_any: AtomicBool,
}

impl<S: PageSink> DeliveryEngine<S> {
    pub fn new(sink: S, config: DeliveryConfig) -> Self {
        DeliveryEngine {
            sink,
            config,
            sent_any: AtomicBool::new(false),
        }
    }

    /// Deliver `requests` in order. The first request that exhausts its retry
    /// budget aborts delivery: requests still in flight in its group are
    /// dropped and no later group is started.
    pub async fn deliver(&self, requests: &[CreateRequest]) -> Result<DeliveryReport> {
        let mut report = DeliveryReport::default();

        for group in requests.chunks(self.config.group_size.max(1)) {
            if self.sent_any.swap(true, Ordering::SeqCst) {
                let delay = self.config.pacing.next_delay();
                debug!("Pacing {}ms before next group", delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            let attempts = try_join_all(group.iter().map(|request| self.deliver_one(request))).await?;

            report.groups += 1;
            report.requests += group.len();
            report.retries += attempts.iter().map(|a| a - 1).sum::<u32>();
        }

        Ok(report)
    }

    /// Returns the number of attempts the request needed.
    async fn deliver_one(&self, request: &CreateRequest) -> Result<u32> {
        let result = retry_with_policy(&self.config.retry, |attempt| async move {
            match self.sink.create_page(request).await {
                Ok(()) => Ok(attempt),
                Err(e) => {
                    warn!(
                        "'{}' attempt {}/{} failed: {}",
                        request.title, attempt, self.config.retry.max_attempts, e
                    );
                    Err(e)
                }
            }
        })
        .await;

        match result {
            Ok(attempts) => {
                debug!("Created '{}' ({} attempts)", request.title, attempts);
                Ok(attempts)
            }
            Err(RetryFailure { attempts, error }) => {
                error!("Giving up on '{}' after {} attempts", request.title, attempts);
                Err(Error::DeliveryAborted {
                    title: request.title.clone(),
                    attempts,
                    reason: error.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batcher::{book_color, Block};
    use crate::model::Testament;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    const LATENCY: Duration = Duration::from_millis(100);

    /// Records every call and fails each title a scripted number of times.
    struct ScriptedSink {
        failures: Mutex<HashMap<String, u32>>,
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl ScriptedSink {
        fn new(failures: &[(&str, u32)]) -> Self {
            ScriptedSink {
                failures: Mutex::new(failures.iter().map(|(t, n)| (t.to_string(), *n)).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls_for(&self, title: &str) -> Vec<Instant> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == title)
                .map(|(_, at)| *at)
                .collect()
        }
    }

    #[async_trait]
    impl PageSink for ScriptedSink {
        async fn create_page(&self, request: &CreateRequest) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((request.title.clone(), Instant::now()));
            tokio::time::sleep(LATENCY).await;
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&request.title) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    Err(Error::TransientDelivery {
                        title: request.title.clone(),
                        reason: "HTTP 429".into(),
                    })
                }
                _ => Ok(()),
            }
        }
    }

    fn requests(n: usize) -> Vec<CreateRequest> {
        (1..=n as u32)
            .map(|chapter| CreateRequest {
                title: format!("Genesis {}", chapter),
                chapter,
                book_name: "Genesis".into(),
                book_index: 1,
                testament: Testament::Old,
                color: book_color(1),
                blocks: vec![Block { spans: vec![] }],
            })
            .collect()
    }

    /// Timer expirations may land up to a millisecond late per sleep.
    fn assert_at(actual: Duration, expected_ms: u64) {
        let expected = Duration::from_millis(expected_ms);
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(20),
            "expected ~{}ms, got {:?}",
            expected_ms,
            actual
        );
    }

    fn fixed_config() -> DeliveryConfig {
        DeliveryConfig {
            pacing: Pacing::Fixed(Duration::from_millis(1100)),
            ..DeliveryConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn groups_run_concurrently_then_pace() {
        let engine = DeliveryEngine::new(ScriptedSink::new(&[]), fixed_config());
        let start = Instant::now();
        let report = engine.deliver(&requests(7)).await.unwrap();
        assert_eq!(
            report,
            DeliveryReport {
                requests: 7,
                groups: 3,
                retries: 0
            }
        );

        let sink = &engine.sink;
        let offset = |title: &str| sink.calls_for(title)[0] - start;
        for title in ["Genesis 1", "Genesis 2", "Genesis 3"] {
            assert_eq!(offset(title), Duration::ZERO);
        }
        // group settles at 100ms, then 1100ms pacing
        for title in ["Genesis 4", "Genesis 5", "Genesis 6"] {
            assert_at(offset(title), 1200);
        }
        assert_at(offset("Genesis 7"), 2400);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_retried_request_before_next_group() {
        let engine = DeliveryEngine::new(ScriptedSink::new(&[("Genesis 2", 2)]), fixed_config());
        let start = Instant::now();
        let report = engine.deliver(&requests(4)).await.unwrap();
        assert_eq!(report.retries, 2);

        let sink = &engine.sink;
        let retried = sink.calls_for("Genesis 2");
        assert_eq!(retried.len(), 3);
        // third attempt settles at 300ms; pacing starts from there
        let next = sink.calls_for("Genesis 4")[0] - start;
        assert_at(next, 300 + 1100);
    }

    #[tokio::test(start_paused = true)]
    async fn aborts_after_retry_budget() {
        let engine = DeliveryEngine::new(ScriptedSink::new(&[("Genesis 2", 11)]), fixed_config());
        let err = engine.deliver(&requests(6)).await.unwrap_err();
        match err {
            Error::DeliveryAborted { title, attempts, .. } => {
                assert_eq!(title, "Genesis 2");
                assert_eq!(attempts, 10);
            }
            other => panic!("unexpected error: {other}"),
        }

        let sink = &engine.sink;
        assert_eq!(sink.calls_for("Genesis 2").len(), 10);
        for title in ["Genesis 4", "Genesis 5", "Genesis 6"] {
            assert!(sink.calls_for(title).is_empty(), "{} was submitted", title);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_carries_across_deliver_calls() {
        let engine = DeliveryEngine::new(ScriptedSink::new(&[]), fixed_config());
        let start = Instant::now();
        let all = requests(4);
        engine.deliver(&all[..1]).await.unwrap();
        engine.deliver(&all[1..]).await.unwrap();
        let second = engine.sink.calls_for("Genesis 2")[0] - start;
        assert_at(second, 1200);
    }

    #[test]
    fn jittered_pacing_stays_in_range() {
        let pacing = Pacing::default();
        for _ in 0..200 {
            let delay = pacing.next_delay();
            assert!(delay >= PACING_MIN && delay <= PACING_MAX, "{:?}", delay);
        }
    }

    #[test]
    fn report_accumulates() {
        let mut total = DeliveryReport::default();
        total.absorb(DeliveryReport {
            requests: 3,
            groups: 1,
            retries: 2,
        });
        total.absorb(DeliveryReport {
            requests: 1,
            groups: 1,
            retries: 0,
        });
        assert_eq!(
            total,
            DeliveryReport {
                requests: 4,
                groups: 2,
                retries: 2
            }
        );
    }
}
