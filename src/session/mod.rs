//! Market session orchestrator
//!
//! Polls the exchange status once per interval during a daily loop and drives
//! the rest of the pipeline off the observed session transitions:
//!
//! - `regular` + open: record the open, start the quote poller, announce
//! - `post-market` or `regular` + closed: record the close, take one final
//!   sample, stop the poller, announce, build the daily metrics
//!
//! Each one-time action fires at most once per daily loop. Nothing in here
//! returns an error to the caller; failures are logged and the schedule holds.

pub mod clock;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::db::SessionWindowRepository;
use crate::error::Result;
use crate::notify::{Notifier, MARKET_CLOSE_TITLE, MARKET_OPEN_TITLE};
use crate::quote_poller::TickReport;
use crate::source::QuoteSource;
use crate::types::{SessionLabel, SessionStatus, SessionWindowRecord};

use clock::{sleep_or_cancel, LocalTime};

/// Lifecycle of the quote sampler as seen by the orchestrator
#[async_trait]
pub trait SamplerControl: Send + Sync {
    /// Returns `false` when a loop is already running
    fn start(&self, parent: &CancellationToken) -> bool;

    /// Returns `false` when nothing was running
    async fn stop(&self) -> bool;

    async fn run_once(&self, token: &CancellationToken) -> TickReport;

    fn is_running(&self) -> bool;
}

#[async_trait]
pub trait DailyBuild: Send + Sync {
    async fn build_for_window(
        &self,
        token: &CancellationToken,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    PreMarket,
    RegularOpen,
    RegularClosedOrPost,
    StoppedForDay,
}

/// Per-loop flags; a fresh value is created for every daily loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayState {
    pub phase: SessionPhase,
    pub sampler_started: bool,
    pub post_handled: bool,
}

impl Default for DayState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            sampler_started: false,
            post_handled: false,
        }
    }
}

/// Wall-clock source for deadlines and status fallbacks
pub type Now = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct SessionOrchestrator {
    source: Arc<dyn QuoteSource>,
    windows: Arc<dyn SessionWindowRepository>,
    sampler: Arc<dyn SamplerControl>,
    daily: Arc<dyn DailyBuild>,
    notifier: Option<Arc<dyn Notifier>>,
    config: SessionConfig,
    offset: FixedOffset,
    now: Now,
}

impl SessionOrchestrator {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        windows: Arc<dyn SessionWindowRepository>,
        sampler: Arc<dyn SamplerControl>,
        daily: Arc<dyn DailyBuild>,
        notifier: Option<Arc<dyn Notifier>>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            source,
            windows,
            sampler,
            daily,
            notifier,
            offset: config.utc_offset(),
            config: config.clone(),
            now: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, now: Now) -> Self {
        self.now = now;
        self
    }

    fn scheduler_time(&self) -> LocalTime {
        LocalTime::new(self.config.scheduler_hour, self.config.scheduler_minute)
    }

    fn stop_time(&self) -> LocalTime {
        LocalTime::new(self.config.stop_hour, self.config.stop_minute)
    }

    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_scheduler(token).await })
    }

    async fn run_scheduler(&self, token: CancellationToken) {
        let (start, stop) = (self.scheduler_time(), self.stop_time());
        info!(
            "🗓️  Session scheduler running (start {:02}:{:02}, stop {:02}:{:02}, offset {})",
            start.hour, start.minute, stop.hour, stop.minute, self.offset
        );

        if clock::within_run_window((self.now)(), self.offset, start, stop) {
            info!("Process started inside the run window, starting daily loop now");
            self.run_daily_loop(&token).await;
        }

        while !token.is_cancelled() {
            let now = (self.now)();
            let next = clock::next_run_at(now, self.offset, start);
            info!("⏰ Next daily loop at {}", next.with_timezone(&self.offset));

            let wait = (next - now).to_std().unwrap_or_default();
            if !sleep_or_cancel(&token, wait).await {
                break;
            }
            self.run_daily_loop(&token).await;
        }

        info!("Session scheduler stopped");
    }

    /// Runs one day's polling until the hard stop or cancellation
    pub async fn run_daily_loop(&self, token: &CancellationToken) -> DayState {
        let deadline = clock::stop_deadline((self.now)(), self.offset, self.stop_time());
        let mut state = DayState::default();
        info!("🌅 Daily loop started, hard stop at {}", deadline.with_timezone(&self.offset));

        loop {
            if token.is_cancelled() || (self.now)() >= deadline {
                break;
            }

            match self.fetch_status_with_retry(token).await {
                Some(status) => self.handle_status(&status, &mut state, token).await,
                None if token.is_cancelled() => break,
                None => warn!("Session status unavailable, retrying next interval"),
            }

            if !sleep_or_cancel(token, self.config.poll_interval()).await {
                break;
            }
        }

        if self.sampler.is_running() {
            self.sampler.stop().await;
        }
        state.phase = SessionPhase::StoppedForDay;
        info!("🌙 Daily loop finished");
        state
    }

    /// Bounded attempts with a fixed backoff; `None` after the last failure or on cancellation
    pub async fn fetch_status_with_retry(
        &self,
        token: &CancellationToken,
    ) -> Option<SessionStatus> {
        let attempts = self.config.retry_attempts.max(1);
        for attempt in 1..=attempts {
            match self.source.fetch_session_status().await {
                Ok(status) => {
                    self.log_status(&status);
                    return Some(status);
                }
                Err(e) => {
                    warn!("Session status attempt {}/{} failed: {}", attempt, attempts, e);
                    if attempt < attempts
                        && !sleep_or_cancel(token, self.config.retry_backoff()).await
                    {
                        return None;
                    }
                }
            }
        }
        None
    }

    fn log_status(&self, status: &SessionStatus) {
        let correlation_id = Uuid::new_v4();
        info!(
            %correlation_id,
            "market status: session={} exchange={} is_open={} t={} timezone={} holiday={}",
            status.label.as_str(),
            status.exchange,
            status.is_open,
            status.timestamp.map_or(0, |t| t.timestamp()),
            status.timezone,
            status.holiday.as_deref().unwrap_or("-"),
        );
    }

    /// Applies one classified status to the day's state
    pub async fn handle_status(
        &self,
        status: &SessionStatus,
        state: &mut DayState,
        token: &CancellationToken,
    ) {
        let at = status.timestamp.unwrap_or_else(|| (self.now)());
        let trade_date = clock::trade_date_for(at, self.offset, self.config.trade_date_cutoff_hour);

        match (&status.label, status.is_open) {
            (SessionLabel::PreMarket, _) => {
                state.phase = SessionPhase::PreMarket;
            }
            (SessionLabel::Regular, true) => {
                self.ensure_open_record(trade_date, at);
                if !state.sampler_started {
                    self.sampler.start(token);
                    state.sampler_started = true;
                    self.announce(MARKET_OPEN_TITLE, &self.config.open_message).await;
                }
                state.phase = SessionPhase::RegularOpen;
            }
            (SessionLabel::PostMarket, _) | (SessionLabel::Regular, false) => {
                self.close_record(trade_date, at);
                if !state.post_handled {
                    state.post_handled = true;
                    self.wind_down(at, token).await;
                }
                state.phase = SessionPhase::RegularClosedOrPost;
            }
            (SessionLabel::Other(label), _) => {
                debug!("Ignoring session label {:?}", label);
                state.phase = SessionPhase::Idle;
            }
        }
    }

    async fn wind_down(&self, at: DateTime<Utc>, token: &CancellationToken) {
        let report = self.sampler.run_once(token).await;
        debug!("Final tick before close: {} stored, {} skipped", report.stored, report.skipped);
        self.sampler.stop().await;

        self.announce(MARKET_CLOSE_TITLE, &self.config.close_message).await;

        let (start, end) = clock::daily_metrics_window(
            at,
            self.offset,
            self.config.daily_window_start_hour,
            LocalTime::new(self.config.daily_window_end_hour, self.config.daily_window_end_minute),
        );
        match self.daily.build_for_window(token, start, end).await {
            Ok(written) => info!("📅 Daily build complete: {} metrics", written),
            Err(e) => warn!("Daily build failed for window {} → {}: {}", start, end, e),
        }
    }

    fn ensure_open_record(&self, trade_date: NaiveDate, opened_at: DateTime<Utc>) {
        let record = SessionWindowRecord {
            trade_date,
            is_trading_day: true,
            opened_at: Some(opened_at),
            closed_at: None,
        };
        match self.windows.create_if_absent(&record) {
            Ok(true) => info!("🔔 Session opened for {}", trade_date),
            Ok(false) => debug!("Session record for {} already exists", trade_date),
            Err(e) => warn!("Failed to record session open for {}: {}", trade_date, e),
        }
    }

    fn close_record(&self, trade_date: NaiveDate, closed_at: DateTime<Utc>) {
        match self.windows.update_close(trade_date, closed_at) {
            Ok(true) => info!("🔕 Session closed for {}", trade_date),
            Ok(false) => debug!("No open session record to close for {}", trade_date),
            Err(e) => warn!("Failed to record session close for {}: {}", trade_date, e),
        }
    }

    async fn announce(&self, title: &str, message: &str) {
        if let Some(notifier) = &self.notifier {
            notifier.notify_generic(title, message).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::error::{PipelineError, SourceError};
    use crate::types::{AlertEvent, Quote};
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Pops one scripted status per call and cancels `done` once the script is exhausted
    struct ScriptedStatus {
        script: Mutex<VecDeque<std::result::Result<SessionStatus, u16>>>,
        calls: AtomicUsize,
        done: CancellationToken,
    }

    impl ScriptedStatus {
        fn new(
            script: Vec<std::result::Result<SessionStatus, u16>>,
            done: CancellationToken,
        ) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                done,
            }
        }
    }

    #[async_trait]
    impl QuoteSource for ScriptedStatus {
        async fn fetch_quote(&self, symbol: &str) -> std::result::Result<Quote, SourceError> {
            Err(SourceError::Empty(symbol.to_string()))
        }

        async fn fetch_session_status(&self) -> std::result::Result<SessionStatus, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(status)) => Ok(status),
                Some(Err(code)) => Err(SourceError::Status {
                    status: code,
                    body: "unavailable".to_string(),
                }),
                None => {
                    self.done.cancel();
                    Err(SourceError::Empty("script exhausted".to_string()))
                }
            }
        }
    }

    #[derive(Default)]
    struct CountingSampler {
        running: AtomicBool,
        starts: AtomicUsize,
        stops: AtomicUsize,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl SamplerControl for CountingSampler {
        fn start(&self, _parent: &CancellationToken) -> bool {
            if self.running.swap(true, Ordering::SeqCst) {
                return false;
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            true
        }

        async fn stop(&self) -> bool {
            if !self.running.swap(false, Ordering::SeqCst) {
                return false;
            }
            self.stops.fetch_add(1, Ordering::SeqCst);
            true
        }

        async fn run_once(&self, _token: &CancellationToken) -> TickReport {
            self.runs.fetch_add(1, Ordering::SeqCst);
            TickReport::default()
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct CountingDaily {
        windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
        fail: bool,
    }

    #[async_trait]
    impl DailyBuild for CountingDaily {
        async fn build_for_window(
            &self,
            _token: &CancellationToken,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<usize> {
            self.windows.lock().unwrap().push((start, end));
            if self.fail {
                return Err(PipelineError::Cancelled);
            }
            Ok(1)
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        titles: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, _event: &AlertEvent, _message: &str) {}

        async fn notify_generic(&self, title: &str, _message: &str) {
            self.titles.lock().unwrap().push(title.to_string());
        }
    }

    struct Harness {
        orchestrator: SessionOrchestrator,
        source: Arc<ScriptedStatus>,
        store: Arc<SqliteStore>,
        sampler: Arc<CountingSampler>,
        daily: Arc<CountingDaily>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(
        script: Vec<std::result::Result<SessionStatus, u16>>,
        done: CancellationToken,
        daily: CountingDaily,
    ) -> Harness {
        let source = Arc::new(ScriptedStatus::new(script, done));
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let sampler = Arc::new(CountingSampler::default());
        let daily = Arc::new(daily);
        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = SessionOrchestrator::new(
            source.clone(),
            store.clone(),
            sampler.clone(),
            daily.clone(),
            Some(notifier.clone() as Arc<dyn Notifier>),
            &SessionConfig::default(),
        );
        Harness { orchestrator, source, store, sampler, daily, notifier }
    }

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn local(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        offset().with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap().with_timezone(&Utc)
    }

    fn status(label: &str, is_open: bool, at: DateTime<Utc>) -> SessionStatus {
        SessionStatus {
            exchange: "US".to_string(),
            is_open,
            label: SessionLabel::parse(Some(label)),
            timestamp: Some(at),
            timezone: "America/New_York".to_string(),
            holiday: None,
        }
    }

    fn trading_day() -> Vec<SessionStatus> {
        vec![
            status("pre-market", false, local(4, 20, 0)),
            status("regular", true, local(4, 21, 30)),
            status("regular", true, local(4, 21, 31)),
            status("post-market", false, local(5, 3, 0)),
        ]
    }

    #[tokio::test]
    async fn test_trading_day_sequence_starts_and_stops_once() {
        let token = CancellationToken::new();
        let h = harness(Vec::new(), token.clone(), CountingDaily::default());

        let mut state = DayState::default();
        let mut phases = Vec::new();
        for s in trading_day() {
            h.orchestrator.handle_status(&s, &mut state, &token).await;
            phases.push(state.phase);
        }

        assert_eq!(
            phases,
            vec![
                SessionPhase::PreMarket,
                SessionPhase::RegularOpen,
                SessionPhase::RegularOpen,
                SessionPhase::RegularClosedOrPost,
            ]
        );
        assert_eq!(h.sampler.starts.load(Ordering::SeqCst), 1);
        assert_eq!(h.sampler.stops.load(Ordering::SeqCst), 1);
        assert_eq!(h.sampler.runs.load(Ordering::SeqCst), 1);
        assert_eq!(*h.notifier.titles.lock().unwrap(), vec![MARKET_OPEN_TITLE, MARKET_CLOSE_TITLE]);

        let record = h
            .store
            .find_by_trade_date(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(record.opened_at, Some(local(4, 21, 30)));
        assert_eq!(record.closed_at, Some(local(5, 3, 0)));

        let windows = h.daily.windows.lock().unwrap();
        assert_eq!(*windows, vec![(local(4, 20, 0), local(5, 4, 30))]);
    }

    #[tokio::test]
    async fn test_post_market_actions_fire_once() {
        let token = CancellationToken::new();
        let h = harness(Vec::new(), token.clone(), CountingDaily::default());
        let mut state = DayState::default();

        for s in trading_day() {
            h.orchestrator.handle_status(&s, &mut state, &token).await;
        }
        h.orchestrator
            .handle_status(&status("regular", false, local(5, 3, 1)), &mut state, &token)
            .await;
        h.orchestrator
            .handle_status(&status("post-market", false, local(5, 3, 2)), &mut state, &token)
            .await;

        assert_eq!(h.sampler.runs.load(Ordering::SeqCst), 1);
        assert_eq!(h.daily.windows.lock().unwrap().len(), 1);
        // First close wins
        let record = h
            .store
            .find_by_trade_date(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(record.closed_at, Some(local(5, 3, 0)));
    }

    #[tokio::test]
    async fn test_daily_build_failure_is_absorbed() {
        let token = CancellationToken::new();
        let daily = CountingDaily { fail: true, ..Default::default() };
        let h = harness(Vec::new(), token.clone(), daily);
        let mut state = DayState::default();

        for s in trading_day() {
            h.orchestrator.handle_status(&s, &mut state, &token).await;
        }
        assert_eq!(state.phase, SessionPhase::RegularClosedOrPost);
        assert!(state.post_handled);
    }

    #[tokio::test]
    async fn test_unknown_label_is_idle() {
        let token = CancellationToken::new();
        let h = harness(Vec::new(), token.clone(), CountingDaily::default());
        let mut state = DayState::default();

        h.orchestrator
            .handle_status(&status("closed", false, local(4, 12, 0)), &mut state, &token)
            .await;
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(h.sampler.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_retry_with_backoff() {
        let token = CancellationToken::new();
        let script = vec![Err(502), Err(503), Ok(status("regular", true, local(4, 21, 30)))];
        let h = harness(script, token.clone(), CountingDaily::default());

        let started = tokio::time::Instant::now();
        let fetched = h.orchestrator.fetch_status_with_retry(&token).await;

        assert!(fetched.is_some());
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_retry_gives_up() {
        let token = CancellationToken::new();
        let h = harness(
            vec![Err(500), Err(500), Err(500), Err(500)],
            token.clone(),
            CountingDaily::default(),
        );

        assert!(h.orchestrator.fetch_status_with_retry(&token).await.is_none());
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_loop_runs_script_and_cleans_up() {
        let token = CancellationToken::new();
        let mut script: Vec<_> = trading_day().into_iter().map(Ok).collect();
        // A failed poll mid-day is absorbed
        script.insert(2, Err(500));
        script.insert(3, Err(500));
        script.insert(4, Err(500));
        let h = harness(script, token.clone(), CountingDaily::default());

        let state = h.orchestrator.run_daily_loop(&token).await;

        assert_eq!(state.phase, SessionPhase::StoppedForDay);
        assert!(state.sampler_started && state.post_handled);
        assert_eq!(h.sampler.starts.load(Ordering::SeqCst), 1);
        assert_eq!(h.sampler.stops.load(Ordering::SeqCst), 1);
        assert!(!h.sampler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_loop_stops_running_sampler() {
        let token = CancellationToken::new();
        let script = vec![Ok(status("regular", true, local(4, 21, 30)))];
        let h = harness(script, token.clone(), CountingDaily::default());

        let state = h.orchestrator.run_daily_loop(&token).await;

        assert_eq!(state.phase, SessionPhase::StoppedForDay);
        assert_eq!(h.sampler.starts.load(Ordering::SeqCst), 1);
        assert_eq!(h.sampler.stops.load(Ordering::SeqCst), 1);
        assert!(token.is_cancelled());
    }

    /// Wall clock pinned to `start` that advances with tokio's (paused) clock
    fn paused_clock(start: DateTime<Utc>) -> Now {
        let origin = tokio::time::Instant::now();
        Arc::new(move || start + chrono::Duration::from_std(origin.elapsed()).unwrap())
    }

    fn open_without_timestamp() -> SessionStatus {
        SessionStatus {
            timestamp: None,
            ..status("regular", true, local(5, 4, 0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_loop_exits_at_hard_stop() {
        let token = CancellationToken::new();
        // Everything after the first poll fails; the script-end token is never observed
        let h = harness(
            vec![Ok(open_without_timestamp())],
            CancellationToken::new(),
            CountingDaily::default(),
        );
        let started = local(5, 4, 20);
        let orchestrator = h.orchestrator.with_clock(paused_clock(started));

        let polling_since = tokio::time::Instant::now();
        let state = orchestrator.run_daily_loop(&token).await;

        assert_eq!(state.phase, SessionPhase::StoppedForDay);
        assert!(state.sampler_started);
        assert!(polling_since.elapsed() >= Duration::from_secs(600));
        assert_eq!(h.sampler.starts.load(Ordering::SeqCst), 1);
        assert_eq!(h.sampler.stops.load(Ordering::SeqCst), 1);
        assert!(!h.sampler.is_running());
        assert!(!token.is_cancelled());
        assert!(h.source.calls.load(Ordering::SeqCst) > 1);

        // Open record falls back to the clock for a missing status timestamp
        let record = h
            .store
            .find_by_trade_date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(record.opened_at, Some(started));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_runs_immediately_inside_run_window() {
        let token = CancellationToken::new();
        let h = harness(
            vec![Ok(status("regular", true, local(5, 1, 0)))],
            token.clone(),
            CountingDaily::default(),
        );
        let orchestrator = Arc::new(h.orchestrator.with_clock(paused_clock(local(5, 1, 0))));

        let started = tokio::time::Instant::now();
        orchestrator.spawn(token.clone()).await.unwrap();

        // First poll happened at startup, not at the next 00:16
        assert!(started.elapsed() < Duration::from_secs(3600));
        assert_eq!(h.sampler.starts.load(Ordering::SeqCst), 1);
        assert!(h.source.calls.load(Ordering::SeqCst) >= 2);
        assert!(!h.sampler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_waits_outside_run_window() {
        let token = CancellationToken::new();
        let h = harness(
            vec![Ok(status("regular", true, local(5, 12, 0)))],
            token.clone(),
            CountingDaily::default(),
        );
        let orchestrator = Arc::new(h.orchestrator.with_clock(paused_clock(local(5, 12, 0))));

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            canceller.cancel();
        });
        orchestrator.spawn(token.clone()).await.unwrap();

        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.sampler.starts.load(Ordering::SeqCst), 0);
    }
}
