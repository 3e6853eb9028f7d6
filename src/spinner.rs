//! Tick spinner – the outer poll loop that drives the whole bus.
//!
//! Every frame the spinner measures elapsed wall time, converts it into
//! fixed-size simulation steps and posts one [`Event::Tick`] per step,
//! followed by a single [`Event::Render`].  Elapsed time is clamped to
//! `1 / minimum_fps` so a stalled frame never produces a burst of catch-up
//! ticks.
//!
//! The spinner is itself a listener: [`Event::ProgramQuit`] clears its
//! running flag and [`run`] returns after the current frame.

use crate::bus::EventBus;
use crate::event::{Event, Listener, ListenerError};
use log::{debug, info};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

#[derive(Debug)]
pub struct TickSpinner {
    fps: u32,
    step: f64,
    max_elapsed: f64,
    accumulator: f64,
    program_time: f64,
    ticks: u64,
    running: bool,
}

impl TickSpinner {
    pub fn new(fps: u32, minimum_fps: u32) -> Self {
        let fps = fps.max(1);
        let minimum_fps = minimum_fps.clamp(1, fps);
        Self {
            fps,
            step: 1.0 / fps as f64,
            max_elapsed: 1.0 / minimum_fps as f64,
            accumulator: 0.0,
            program_time: 0.0,
            ticks: 0,
            running: true,
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Fixed simulation step in seconds.
    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Simulated seconds so far.
    pub fn program_time(&self) -> f64 {
        self.program_time
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Account for `elapsed` seconds of wall time and return the tick
    /// deltas to post, oldest first.
    pub fn advance(&mut self, elapsed: f64) -> Vec<f64> {
        self.accumulator += elapsed.clamp(0.0, self.max_elapsed);
        let mut deltas = Vec::new();
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            self.program_time += self.step;
            self.ticks += 1;
            deltas.push(self.step);
        }
        deltas
    }
}

impl Listener for TickSpinner {
    fn notify(&mut self, event: &Event, _bus: &EventBus) -> Result<(), ListenerError> {
        if let Event::ProgramQuit = event {
            debug!("spinner stopping after {} ticks", self.ticks);
            self.running = false;
        }
        Ok(())
    }
}

/// Drive `bus` at the spinner's frame rate until a quit event stops it.
///
/// `spinner` must be registered on `bus`, otherwise nothing stops the loop.
pub async fn run(spinner: &Rc<RefCell<TickSpinner>>, bus: &EventBus) {
    let fps = spinner.borrow().fps();
    info!("spinner running at {} fps", fps);

    let mut frames = interval(Duration::from_secs_f64(1.0 / fps as f64));
    frames.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        frames.tick().await;
        let now = Instant::now();
        let elapsed = now.duration_since(last).as_secs_f64();
        last = now;

        let deltas = spinner.borrow_mut().advance(elapsed);
        for delta in deltas {
            bus.post(Event::tick(delta));
            if !spinner.borrow().is_running() {
                return;
            }
        }
        bus.post(Event::Render);
        if !spinner.borrow().is_running() {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
