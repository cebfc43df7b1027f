//! Async drivers for the engine: poll loop, watchdog and input dispatch
//!
//! Each runs as its own task and exits when the stop channel fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::input::InputEvent;

use super::machine::{Engine, EngineError};

/// Pause after a failed tick before trying again
pub const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Ceiling for the doubling retry period while injection is degraded
pub const DEGRADED_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Tick periods for the poll loop and watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub active: Duration,
    pub idle: Duration,
    pub watchdog: Duration,
}

impl From<&Settings> for Timing {
    fn from(settings: &Settings) -> Self {
        Self {
            active: settings.active_period(),
            idle: settings.idle_period(),
            watchdog: settings.watchdog_interval(),
        }
    }
}

/// Tick the engine until stopped, then release the output key
///
/// Runs fast while enabled and slow while disabled. A failed tick forces a
/// release and backs off; it never ends the loop. While injection is
/// degraded the period doubles from [`ERROR_BACKOFF`] up to
/// [`DEGRADED_BACKOFF_MAX`].
pub async fn run_poll_loop(engine: Arc<Engine>, timing: Timing, mut stop: broadcast::Receiver<()>) {
    info!(
        active_ms = timing.active.as_millis() as u64,
        idle_ms = timing.idle.as_millis() as u64,
        "poll loop started"
    );

    let mut retry = Duration::ZERO;
    loop {
        let period = match engine.tick(Instant::now().into_std()) {
            Ok(status) if status.degraded => {
                retry = (retry * 2).clamp(ERROR_BACKOFF, DEGRADED_BACKOFF_MAX);
                retry
            }
            Ok(status) => {
                retry = Duration::ZERO;
                if status.active {
                    timing.active
                } else {
                    timing.idle
                }
            }
            Err(EngineError::Stopped) => break,
            Err(e) => {
                error!(error = %e, "tick failed");
                engine.recover();
                ERROR_BACKOFF
            }
        };

        tokio::select! {
            _ = time::sleep(period) => {}
            _ = stop.recv() => {
                debug!("poll loop stop requested");
                break;
            }
        }
    }

    engine.shutdown();
    info!("poll loop stopped");
}

/// Periodically release an output key no trigger is holding
pub async fn run_watchdog(engine: Arc<Engine>, interval: Duration, mut stop: broadcast::Receiver<()>) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_ms = interval.as_millis() as u64, "watchdog started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                engine.watchdog_check();
            }
            _ = stop.recv() => break,
        }
    }

    info!("watchdog stopped");
}

/// Feed listener events into the engine
pub async fn run_input_dispatch(
    engine: Arc<Engine>,
    mut input_rx: mpsc::Receiver<InputEvent>,
    mut stop: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = input_rx.recv() => match event {
                Some(event) => engine.handle_input(event),
                None => {
                    debug!("input channel closed");
                    break;
                }
            },
            _ = stop.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::events::{EngineEvent, StatusSink, StatusSnapshot};
    use crate::input::fake::FakeBackend;
    use crate::input::{Key, MouseEvent};

    #[derive(Default, Clone)]
    struct Counter(Arc<Mutex<Vec<StatusSnapshot>>>);

    impl StatusSink for Counter {
        fn on_status(&self, snapshot: StatusSnapshot) {
            self.0.lock().unwrap().push(snapshot);
        }
    }

    fn setup(start_enabled: bool) -> (Arc<Engine>, Arc<FakeBackend>, Counter, Timing) {
        let settings = Settings {
            start_enabled,
            ..Settings::default()
        };
        let backend = Arc::new(FakeBackend::new());
        let counter = Counter::default();
        let (event_tx, _) = broadcast::channel::<EngineEvent>(64);
        let engine = Engine::new(backend.clone(), &settings, Box::new(counter.clone()), event_tx);
        (Arc::new(engine), backend, counter, Timing::from(&settings))
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_rate_follows_enabled_flag() {
        let (engine, _backend, counter, timing) = setup(true);
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_poll_loop(engine.clone(), timing, stop_rx));

        time::sleep(Duration::from_millis(1_000)).await;
        let active_ticks = counter.0.lock().unwrap().len();
        assert!((19..=22).contains(&active_ticks), "active ticks: {active_ticks}");

        engine.set_enabled(false);
        time::sleep(Duration::from_millis(60)).await;
        counter.0.lock().unwrap().clear();
        time::sleep(Duration::from_millis(1_000)).await;
        let idle_ticks = counter.0.lock().unwrap().len();
        assert!((4..=6).contains(&idle_ticks), "idle ticks: {idle_ticks}");

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_releases_held_key_once() {
        let (engine, backend, _counter, timing) = setup(true);
        backend.hold(Key::Q);
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_poll_loop(engine.clone(), timing, stop_rx));

        time::sleep(Duration::from_millis(200)).await;
        assert!(engine.is_held());

        stop_tx.send(()).unwrap();
        task.await.unwrap();
        assert!(!engine.is_held());
        assert_eq!(backend.presses(), 1);
        assert_eq!(backend.releases(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_tick_errors() {
        let (engine, backend, _counter, timing) = setup(true);
        backend.hold(Key::Q);
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_poll_loop(engine.clone(), timing, stop_rx));

        time::sleep(Duration::from_millis(120)).await;
        assert!(engine.is_held());

        backend.fail_sample(true);
        time::sleep(Duration::from_millis(500)).await;
        assert!(!engine.is_held());
        assert!(!task.is_finished());

        backend.fail_sample(false);
        time::sleep(Duration::from_millis(200)).await;
        assert!(engine.is_held());

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_injection_retries_slow_down() {
        let (engine, backend, counter, timing) = setup(true);
        backend.hold(Key::Q);
        backend.fail_press(true);
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_poll_loop(engine.clone(), timing, stop_rx));

        time::sleep(Duration::from_millis(1_000)).await;
        assert!(counter.0.lock().unwrap().last().unwrap().degraded);

        // Backoff has reached its ceiling: about one attempt per second
        backend.clear_calls();
        time::sleep(Duration::from_secs(5)).await;
        let attempts = backend.presses();
        assert!((4..=7).contains(&attempts), "attempts while degraded: {attempts}");

        backend.fail_press(false);
        time::sleep(DEGRADED_BACKOFF_MAX + Duration::from_millis(100)).await;
        assert!(engine.is_held());
        assert!(!counter.0.lock().unwrap().last().unwrap().degraded);

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_corrects_within_interval() {
        let (engine, backend, _counter, timing) = setup(true);
        backend.hold(Key::Q);
        engine.tick(Instant::now().into_std()).unwrap();
        assert!(engine.is_held());

        // No poll loop here, only the watchdog
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_watchdog(engine.clone(), timing.watchdog, stop_rx));

        backend.lift(Key::Q);
        time::sleep(Duration::from_millis(1_500)).await;
        assert!(engine.is_held());

        time::sleep(Duration::from_millis(600)).await;
        assert!(!engine.is_held());
        assert_eq!(backend.releases(), 1);

        stop_tx.send(()).unwrap();
        task.await.unwrap();
        assert_eq!(backend.presses(), 1);
    }

    #[tokio::test]
    async fn test_input_dispatch_forwards_events() {
        let (engine, _backend, _counter, _timing) = setup(false);
        let (input_tx, input_rx) = mpsc::channel(8);
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        let task = tokio::spawn(run_input_dispatch(engine.clone(), input_rx, stop_rx));

        input_tx.send(InputEvent::TogglePressed).await.unwrap();
        input_tx
            .send(InputEvent::Mouse(MouseEvent {
                pressed: true,
                at: std::time::Instant::now(),
            }))
            .await
            .unwrap();
        drop(input_tx);
        tokio_test::assert_ok!(task.await);

        assert!(engine.is_enabled());
        assert!(engine.scope_active());
    }
}
