//! Credit-based liveness watchdog.
//!
//! The watchdog aborts the whole process if the supervisor's control loop
//! stops delivering ticks. A 1 Hz timer burns one credit per second; every
//! `tick` refills the account. Ten missed seconds in a row means the main
//! loop is wedged and a hard abort beats limping on.
//!
//! `$TERM` exits the actor cleanly without aborting; nothing else stops it.

use std::time::{Duration, Instant};

use anyhow::Result;
use logjam_proto::{Actor, Pipe, CMD_TERM, CMD_TICK};
use tracing::{debug, error, info};

/// Seconds of missed ticks tolerated before aborting.
pub const CREDIT: i32 = 10;

/// Result of one timer expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditStatus {
    Ok,
    /// Running low; carries the remaining credit for the log line.
    Low(i32),
    /// Out of credit, the process must abort.
    Exhausted,
}

/// Timer/credit bookkeeping, separated from the socket loop.
#[derive(Debug)]
pub struct WatchdogState {
    credit: i32,
}

impl WatchdogState {
    pub fn new() -> Self {
        Self { credit: CREDIT }
    }

    /// Burn one credit (called once per second).
    pub fn on_timer(&mut self) -> CreditStatus {
        self.credit -= 1;
        if self.credit <= 0 {
            CreditStatus::Exhausted
        } else if self.credit < CREDIT - 1 {
            CreditStatus::Low(self.credit)
        } else {
            CreditStatus::Ok
        }
    }

    /// Refill on a supervisor tick.
    pub fn on_tick(&mut self) {
        self.credit = CREDIT;
    }

    pub fn credit(&self) -> i32 {
        self.credit
    }
}

impl Default for WatchdogState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn spawn(ctx: &zmq::Context) -> Result<Actor> {
    Actor::spawn(ctx, "watchdog", run)
}

fn run(pipe: Pipe) -> Result<()> {
    let mut state = WatchdogState::new();
    pipe.signal_ready()?;

    let mut next_decrement = Instant::now() + Duration::from_secs(1);
    loop {
        let timeout = next_decrement
            .saturating_duration_since(Instant::now())
            .as_millis() as i64;
        let readable = match pipe.socket().poll(zmq::POLLIN, timeout.max(1)) {
            Ok(n) => n > 0,
            // only the supervisor may stop us; signals are not a shutdown path
            Err(zmq::Error::EINTR) => continue,
            Err(err) => return Err(err.into()),
        };

        if Instant::now() >= next_decrement {
            next_decrement += Duration::from_secs(1);
            match state.on_timer() {
                CreditStatus::Exhausted => {
                    error!("watchdog: no credit left, aborting process");
                    std::process::abort();
                }
                CreditStatus::Low(credit) => info!("watchdog: credit left: {credit}"),
                CreditStatus::Ok => {}
            }
        }

        if readable {
            match pipe.recv_command()?.as_str() {
                CMD_TICK => {
                    debug!("watchdog: credit: {}", state.credit());
                    state.on_tick();
                }
                CMD_TERM => break,
                other => error!("watchdog: received unknown actor command: {other}"),
            }
        }
    }

    info!("watchdog: terminated");
    Ok(())
}
