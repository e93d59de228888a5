//! Weather update scheduler.
//!
//! One background task owns two independent timers: an hourly trigger for
//! `hourly` subscribers and a daily trigger for `daily` subscribers. Each
//! firing loads the confirmed subscriptions, keeps the matching bucket and
//! sends every subscriber the current weather for their city.
//!
//! A failing subscriber is logged and skipped; a failing store load aborts
//! that cycle only. [`UpdateScheduler::stop`] cancels both timers through a
//! single `watch` signal and abandons any in-flight batch.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::metrics::AppMetrics;
use crate::services::notifier::{NotifierError, SharedNotifier};
use crate::services::weather::{SharedWeather, WeatherError};
use crate::store::{SharedStore, StoreError};
use crate::subscription::{Frequency, Subscription};

/// Timer periods and per-subscriber deadline.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub hourly_period: Duration,
    pub daily_period: Duration,
    /// Upper bound for one subscriber's lookup + send.
    pub per_subscriber_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            hourly_period: Duration::from_secs(60 * 60),
            daily_period: Duration::from_secs(24 * 60 * 60),
            per_subscriber_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of a single cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub frequency: Frequency,
    /// Confirmed subscribers in this frequency bucket.
    pub matched: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Error)]
enum DeliveryFailure {
    #[error("weather lookup failed: {0}")]
    Weather(#[from] WeatherError),

    #[error("email send failed: {0}")]
    Email(#[from] NotifierError),
}

impl DeliveryFailure {
    fn stage(&self) -> &'static str {
        match self {
            DeliveryFailure::Weather(_) => "weather",
            DeliveryFailure::Email(_) => "email",
        }
    }
}

/// Runs update cycles. Cheap to clone; shared with the background task.
#[derive(Clone)]
pub struct UpdateDispatcher {
    store: SharedStore,
    weather: SharedWeather,
    notifier: SharedNotifier,
    metrics: Arc<AppMetrics>,
    per_subscriber_timeout: Duration,
}

impl UpdateDispatcher {
    pub fn new(
        store: SharedStore,
        weather: SharedWeather,
        notifier: SharedNotifier,
        metrics: Arc<AppMetrics>,
        per_subscriber_timeout: Duration,
    ) -> Self {
        Self {
            store,
            weather,
            notifier,
            metrics,
            per_subscriber_timeout,
        }
    }

    /// Send updates to every confirmed subscriber in the `frequency` bucket.
    ///
    /// Only a store failure is returned; per-subscriber failures are logged,
    /// counted in the report and skipped.
    pub async fn run_cycle(&self, frequency: Frequency) -> Result<CycleReport, StoreError> {
        let label = frequency.as_str();
        self.metrics.update_cycles_total.with_label_values(&[label]).inc();

        let subscriptions = match self.store.find_all_confirmed().await {
            Ok(subscriptions) => subscriptions,
            Err(err) => {
                self.metrics
                    .update_cycle_errors_total
                    .with_label_values(&[label])
                    .inc();
                return Err(err);
            }
        };

        let due: Vec<&Subscription> = subscriptions
            .iter()
            .filter(|s| s.frequency == frequency)
            .collect();

        let mut report = CycleReport {
            frequency,
            matched: due.len(),
            delivered: 0,
            failed: 0,
        };

        for subscription in due {
            let stage = match time::timeout(self.per_subscriber_timeout, self.deliver(subscription)).await
            {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    self.metrics.updates_sent_total.with_label_values(&[label]).inc();
                    continue;
                }
                Ok(Err(failure)) => {
                    tracing::warn!(
                        "Skipping subscription {} ({}): {}",
                        subscription.id,
                        subscription.city,
                        failure
                    );
                    failure.stage()
                }
                Err(_) => {
                    tracing::warn!(
                        "Skipping subscription {} ({}): timed out after {:?}",
                        subscription.id,
                        subscription.city,
                        self.per_subscriber_timeout
                    );
                    "timeout"
                }
            };

            report.failed += 1;
            self.metrics
                .update_failures_total
                .with_label_values(&[label, stage])
                .inc();
        }

        Ok(report)
    }

    async fn deliver(&self, subscription: &Subscription) -> Result<(), DeliveryFailure> {
        let weather = self.weather.current_weather(&subscription.city).await?;
        self.notifier
            .send_update(
                &subscription.email,
                &subscription.city,
                &subscription.token,
                &weather,
            )
            .await?;
        Ok(())
    }
}

struct RunningTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owned handle over the background update task.
///
/// `start` and `stop` are idempotent. Dropping the handle while running also
/// stops the task, since the cancellation sender goes away with it.
pub struct UpdateScheduler {
    dispatcher: UpdateDispatcher,
    config: SchedulerConfig,
    running: Mutex<Option<RunningTask>>,
}

impl UpdateScheduler {
    pub fn new(dispatcher: UpdateDispatcher, config: SchedulerConfig) -> Self {
        Self {
            dispatcher,
            config,
            running: Mutex::new(None),
        }
    }

    /// Spawn the background task. Returns `false` if it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            tracing::warn!("Update scheduler already running");
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_update_loop(
            self.dispatcher.clone(),
            self.config.clone(),
            shutdown_rx,
        ));

        *running = Some(RunningTask { shutdown, handle });
        true
    }

    /// Signal the background task to stop and return its handle.
    ///
    /// Does not wait for the task; callers may await the handle if they
    /// want to observe termination. Returns `None` when nothing is running.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let task = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        // Err means the task already exited and dropped its receiver.
        let _ = task.shutdown.send(true);
        tracing::info!("Update scheduler stop requested");
        Some(task.handle)
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

async fn run_update_loop(
    dispatcher: UpdateDispatcher,
    config: SchedulerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let started = Instant::now();
    let mut hourly = time::interval_at(started + config.hourly_period, config.hourly_period);
    let mut daily = time::interval_at(started + config.daily_period, config.daily_period);
    hourly.set_missed_tick_behavior(MissedTickBehavior::Delay);
    daily.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        "Update scheduler started (hourly every {:?}, daily every {:?})",
        config.hourly_period,
        config.daily_period
    );

    loop {
        let frequency = tokio::select! {
            _ = shutdown.changed() => break,
            _ = hourly.tick() => Frequency::Hourly,
            _ = daily.tick() => Frequency::Daily,
        };

        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("Stop requested during {} cycle; abandoning batch", frequency);
                break;
            }
            result = dispatcher.run_cycle(frequency) => log_cycle(frequency, result),
        }
    }

    tracing::info!("Update scheduler stopped");
}

fn log_cycle(frequency: Frequency, result: Result<CycleReport, StoreError>) {
    match result {
        Ok(report) => tracing::info!(
            "{} update cycle done: {} matched, {} delivered, {} failed",
            frequency,
            report.matched,
            report.delivered,
            report.failed
        ),
        Err(err) => tracing::error!(
            "{} update cycle aborted, will retry at next trigger: {}",
            frequency,
            err
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::services::notifier::Notifier;
    use crate::services::weather::{WeatherData, WeatherLookup};
    use crate::store::SubscriptionStore;
    use crate::subscription::NewSubscription;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn make_subscription(id: i64, city: &str, frequency: Frequency) -> Subscription {
        Subscription {
            id,
            email: format!("user{}@example.com", id),
            city: city.to_string(),
            frequency,
            token: format!("token{}", id),
            confirmed: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct FakeStore {
        confirmed: Vec<Subscription>,
        fail: bool,
    }

    #[async_trait]
    impl SubscriptionStore for FakeStore {
        async fn create(
            &self,
            _subscription: &NewSubscription,
            _token: &str,
        ) -> Result<Subscription, StoreError> {
            Err(StoreError::corrupt_row("read-only fake"))
        }

        async fn find_by_token(&self, _token: &str) -> Result<Subscription, StoreError> {
            Err(StoreError::NotFound)
        }

        async fn update_confirmation(&self, _token: &str, _confirmed: bool) -> Result<(), StoreError> {
            Err(StoreError::NotFound)
        }

        async fn find_all_confirmed(&self) -> Result<Vec<Subscription>, StoreError> {
            if self.fail {
                return Err(StoreError::Database(sqlx::Error::PoolClosed));
            }
            Ok(self.confirmed.clone())
        }

        async fn delete(&self, _token: &str) -> Result<(), StoreError> {
            Err(StoreError::NotFound)
        }
    }

    #[derive(Default)]
    struct FakeWeather {
        failing: HashSet<String>,
        slow: HashSet<String>,
    }

    #[async_trait]
    impl WeatherLookup for FakeWeather {
        async fn current_weather(&self, city: &str) -> Result<WeatherData, WeatherError> {
            if self.slow.contains(city) {
                time::sleep(HOUR * 100).await;
            }
            if self.failing.contains(city) {
                return Err(WeatherError::Upstream { status: 503 });
            }
            Ok(WeatherData {
                temperature: 10.0,
                humidity: 50,
                description: format!("Clear in {}", city),
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        updates: Mutex<Vec<String>>,
        failing_emails: HashSet<String>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<String> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_confirmation(
            &self,
            _email: &str,
            _city: &str,
            _token: &str,
        ) -> Result<(), NotifierError> {
            Ok(())
        }

        async fn send_update(
            &self,
            email: &str,
            _city: &str,
            _token: &str,
            _weather: &WeatherData,
        ) -> Result<(), NotifierError> {
            if self.failing_emails.contains(email) {
                return Err(NotifierError::Transport { message: "rejected".into() });
            }
            self.updates.lock().unwrap().push(email.to_string());
            Ok(())
        }
    }

    fn dispatcher(
        store: FakeStore,
        weather: FakeWeather,
        notifier: Arc<RecordingNotifier>,
        timeout: Duration,
    ) -> UpdateDispatcher {
        UpdateDispatcher::new(
            Arc::new(store),
            Arc::new(weather),
            notifier,
            Arc::new(AppMetrics::new().unwrap()),
            timeout,
        )
    }

    fn mixed_store() -> FakeStore {
        FakeStore {
            confirmed: vec![
                make_subscription(1, "Kyiv", Frequency::Hourly),
                make_subscription(2, "Lviv", Frequency::Daily),
                make_subscription(3, "Odesa", Frequency::Hourly),
            ],
            fail: false,
        }
    }

    #[tokio::test]
    async fn hourly_cycle_only_reaches_hourly_subscribers() {
        let notifier = Arc::new(RecordingNotifier::default());
        let d = dispatcher(mixed_store(), FakeWeather::default(), notifier.clone(), HOUR);

        let report = d.run_cycle(Frequency::Hourly).await.unwrap();

        assert_eq!(report.matched, 2);
        assert_eq!(report.delivered, 2);
        let sent: HashSet<String> = notifier.sent().into_iter().collect();
        assert_eq!(
            sent,
            HashSet::from(["user1@example.com".to_string(), "user3@example.com".to_string()])
        );
    }

    #[tokio::test]
    async fn daily_cycle_only_reaches_daily_subscribers() {
        let notifier = Arc::new(RecordingNotifier::default());
        let d = dispatcher(mixed_store(), FakeWeather::default(), notifier.clone(), HOUR);

        let report = d.run_cycle(Frequency::Daily).await.unwrap();

        assert_eq!(report.matched, 1);
        assert_eq!(notifier.sent(), vec!["user2@example.com".to_string()]);
    }

    #[tokio::test]
    async fn weather_failure_does_not_block_later_subscribers() {
        let notifier = Arc::new(RecordingNotifier::default());
        let weather = FakeWeather {
            failing: HashSet::from(["Kyiv".to_string()]),
            ..Default::default()
        };
        let d = dispatcher(mixed_store(), weather, notifier.clone(), HOUR);

        let report = d.run_cycle(Frequency::Hourly).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(notifier.sent(), vec!["user3@example.com".to_string()]);
    }

    #[tokio::test]
    async fn email_failure_is_skipped() {
        let notifier = Arc::new(RecordingNotifier {
            failing_emails: HashSet::from(["user1@example.com".to_string()]),
            ..Default::default()
        });
        let d = dispatcher(mixed_store(), FakeWeather::default(), notifier.clone(), HOUR);

        let report = d.run_cycle(Frequency::Hourly).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(notifier.sent(), vec!["user3@example.com".to_string()]);
    }

    #[tokio::test]
    async fn store_failure_aborts_the_cycle() {
        let notifier = Arc::new(RecordingNotifier::default());
        let store = FakeStore {
            fail: true,
            ..mixed_store()
        };
        let d = dispatcher(store, FakeWeather::default(), notifier.clone(), HOUR);

        let result = d.run_cycle(Frequency::Hourly).await;

        assert!(result.is_err());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_subscriber_times_out_and_batch_continues() {
        let notifier = Arc::new(RecordingNotifier::default());
        let weather = FakeWeather {
            slow: HashSet::from(["Kyiv".to_string()]),
            ..Default::default()
        };
        let d = dispatcher(mixed_store(), weather, notifier.clone(), Duration::from_secs(5));

        let report = d.run_cycle(Frequency::Hourly).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(notifier.sent(), vec!["user3@example.com".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_fires_hourly_bucket_after_one_period() {
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = UpdateScheduler::new(
            dispatcher(mixed_store(), FakeWeather::default(), notifier.clone(), HOUR),
            SchedulerConfig::default(),
        );

        assert!(scheduler.start());
        assert!(scheduler.is_running());

        time::sleep(HOUR - Duration::from_secs(1)).await;
        assert!(notifier.sent().is_empty(), "no trigger fires before one period");

        time::sleep(Duration::from_secs(2)).await;
        let mut sent = notifier.sent();
        sent.sort();
        assert_eq!(sent, vec!["user1@example.com", "user3@example.com"]);

        let handle = scheduler.stop().expect("scheduler was running");
        handle.await.unwrap();
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_are_idempotent() {
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = UpdateScheduler::new(
            dispatcher(mixed_store(), FakeWeather::default(), notifier, HOUR),
            SchedulerConfig::default(),
        );

        assert!(scheduler.stop().is_none(), "stop before start is a no-op");

        assert!(scheduler.start());
        assert!(!scheduler.start(), "second start is rejected");

        let handle = scheduler.stop().unwrap();
        assert!(scheduler.stop().is_none());
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_abandons_in_flight_batch() {
        let notifier = Arc::new(RecordingNotifier::default());
        let weather = FakeWeather {
            slow: HashSet::from(["Kyiv".to_string()]),
            ..Default::default()
        };
        let scheduler = UpdateScheduler::new(
            dispatcher(mixed_store(), weather, notifier.clone(), HOUR * 1000),
            SchedulerConfig::default(),
        );

        scheduler.start();
        // First hourly cycle is now blocked on Kyiv's slow lookup.
        time::sleep(HOUR + Duration::from_secs(1)).await;

        let handle = scheduler.stop().unwrap();
        handle.await.unwrap();

        assert!(notifier.sent().is_empty(), "batch was not drained");
    }
}
