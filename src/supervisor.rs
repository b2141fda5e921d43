use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Error};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

#[cfg(feature = "pi")]
use rppal::gpio::{Gpio, InputPin};

use crate::channels::offer;
use crate::config::Pin;
use crate::power::PowerMonitor;
use crate::settings::SettingsStore;
use crate::NetworkEvent;

pub const SUPERVISOR_TICK: Duration = Duration::from_secs(1);
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(10);
/// How long the reset button must be held
pub const RESET_HOLD: Duration = Duration::from_secs(5);

/// Why the supervisor stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Shutdown,
    FactoryReset,
}

pub trait ResetInput: Send {
    fn is_pressed(&mut self) -> bool;
}

/// No reset button fitted
pub struct NoResetButton;

impl ResetInput for NoResetButton {
    fn is_pressed(&mut self) -> bool {
        false
    }
}

/// Active-low button with the internal pull-up enabled
#[cfg(feature = "pi")]
pub struct GpioResetButton {
    pin: InputPin,
}

#[cfg(feature = "pi")]
impl GpioResetButton {
    pub fn new(pin: Pin) -> Result<Self, Error> {
        let pin = pin.gpio();
        info!("Reset button on GPIO {}", pin.0);
        let pin = Gpio::new()?.get(pin.0)?.into_input_pullup();
        Ok(Self { pin })
    }
}

#[cfg(feature = "pi")]
impl ResetInput for GpioResetButton {
    fn is_pressed(&mut self) -> bool {
        self.pin.is_low()
    }
}

pub fn open_reset_input(pin: Option<Pin>) -> Result<Box<dyn ResetInput>, Error> {
    match pin {
        #[cfg(feature = "pi")]
        Some(pin) => Ok(Box::new(GpioResetButton::new(pin)?)),
        #[cfg(not(feature = "pi"))]
        Some(pin) => {
            warn!(
                "Reset button on GPIO {} needs the `pi` feature, ignoring it",
                pin.gpio().0
            );
            Ok(Box::new(NoResetButton))
        }
        None => Ok(Box::new(NoResetButton)),
    }
}

/// Debounces the reset button into a single long-press event
#[derive(Debug)]
pub struct ResetWatcher {
    hold: Duration,
    pressed_since: Option<Instant>,
}

impl ResetWatcher {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            pressed_since: None,
        }
    }

    /// Feed the current button level. True once it has been held for the
    /// whole hold time.
    pub fn update(&mut self, pressed: bool, now: Instant) -> bool {
        if !pressed {
            self.pressed_since = None;
            return false;
        }
        let since = *self.pressed_since.get_or_insert(now);
        now.saturating_duration_since(since) >= self.hold
    }
}

/// A worker the supervisor keeps an eye on
pub enum Worker {
    Thread(thread::JoinHandle<()>),
    Task(tokio::task::JoinHandle<()>),
}

impl Worker {
    fn is_finished(&self) -> bool {
        match self {
            Worker::Thread(handle) => handle.is_finished(),
            Worker::Task(handle) => handle.is_finished(),
        }
    }
}

pub struct Supervisor {
    workers: Vec<(&'static str, Worker)>,
    reset: Box<dyn ResetInput>,
    watcher: ResetWatcher,
    power: Box<dyn PowerMonitor>,
    settings: Box<dyn SettingsStore>,
    events: mpsc::Sender<NetworkEvent>,
}

impl Supervisor {
    pub fn new(
        reset: Box<dyn ResetInput>,
        power: Box<dyn PowerMonitor>,
        settings: Box<dyn SettingsStore>,
        events: mpsc::Sender<NetworkEvent>,
    ) -> Self {
        Self {
            workers: Vec::new(),
            reset,
            watcher: ResetWatcher::new(RESET_HOLD),
            power,
            settings,
            events,
        }
    }

    pub fn watch(&mut self, name: &'static str, worker: Worker) {
        self.workers.push((name, worker));
    }

    /// Fails if any watched worker has stopped
    fn check_workers(&self) -> Result<(), Error> {
        for (name, worker) in &self.workers {
            if worker.is_finished() {
                bail!("{} task stopped unexpectedly", name);
            }
        }
        Ok(())
    }

    fn report_health(&mut self) {
        let battery = self.power.read();
        offer(&self.events, NetworkEvent::Health(battery), "network");
    }

    /// One supervision step. Returns an exit when the device should stop.
    pub fn step(&mut self, now: Instant) -> Result<Option<Exit>, Error> {
        self.check_workers()?;

        if self.watcher.update(self.reset.is_pressed(), now) {
            warn!("Reset button held for {:?}, clearing settings", RESET_HOLD);
            self.settings.clear()?;
            return Ok(Some(Exit::FactoryReset));
        }
        Ok(None)
    }

    pub async fn run(mut self) -> Result<Exit, Error> {
        let mut tick = tokio::time::interval(SUPERVISOR_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut health = tokio::time::interval(HEALTH_INTERVAL);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Supervising {} workers", self.workers.len());
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Some(exit) = self.step(Instant::now()).map_err(|e| {
                        error!("{}", e);
                        e
                    })? {
                        return Ok(exit);
                    }
                }
                _ = health.tick() => self.report_health(),
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    return Ok(Exit::Shutdown);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::NoBattery;
    use crate::settings::{keys, MemorySettings};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Button(Arc<AtomicBool>);

    impl ResetInput for Button {
        fn is_pressed(&mut self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_reset_needs_full_hold() {
        let mut watcher = ResetWatcher::new(RESET_HOLD);
        let start = Instant::now();

        assert!(!watcher.update(true, start));
        assert!(!watcher.update(true, start + Duration::from_secs(4)));
        // Released and pressed again restarts the hold
        assert!(!watcher.update(false, start + Duration::from_millis(4500)));
        assert!(!watcher.update(true, start + Duration::from_secs(5)));
        assert!(!watcher.update(true, start + Duration::from_secs(9)));
        assert!(watcher.update(true, start + Duration::from_secs(10)));
    }

    #[test]
    fn test_factory_reset_clears_settings() {
        let pressed = Arc::new(AtomicBool::new(true));
        let mut settings = MemorySettings::default();
        settings.set(keys::SACN_UNIVERSE, "4").unwrap();
        let (tx, _rx) = mpsc::channel(4);

        let mut supervisor = Supervisor::new(
            Box::new(Button(pressed.clone())),
            Box::new(NoBattery),
            Box::new(settings),
            tx,
        );
        let start = Instant::now();
        assert_eq!(supervisor.step(start).unwrap(), None);
        assert_eq!(
            supervisor.step(start + RESET_HOLD).unwrap(),
            Some(Exit::FactoryReset)
        );
        assert_eq!(supervisor.settings.get(keys::SACN_UNIVERSE), None);
    }

    #[test]
    fn test_stopped_worker_is_fatal() {
        let (tx, _rx) = mpsc::channel(4);
        let mut supervisor = Supervisor::new(
            Box::new(NoResetButton),
            Box::new(NoBattery),
            Box::new(MemorySettings::default()),
            tx,
        );
        let handle = thread::spawn(|| {});
        while !handle.is_finished() {
            thread::sleep(Duration::from_millis(1));
        }
        supervisor.watch("led", Worker::Thread(handle));
        let err = supervisor.step(Instant::now()).unwrap_err();
        assert!(err.to_string().contains("led"));
    }

    #[test]
    fn test_health_published() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut supervisor = Supervisor::new(
            Box::new(NoResetButton),
            Box::new(NoBattery),
            Box::new(MemorySettings::default()),
            tx,
        );
        supervisor.report_health();
        assert_eq!(
            rx.try_recv().unwrap(),
            NetworkEvent::Health(Default::default())
        );
    }
}
