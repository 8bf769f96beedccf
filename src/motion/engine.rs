// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Single owner of the lift actuator and height sensor.
//!
//! At most one [`Session`] exists at a time. Requests that arrive while one is running are
//! rejected with [`MotionError::Busy`], except a jog while jogging, which only changes the jog
//! direction.

use crate::config::DeskConfig;
use crate::motion::session::{Entry, Session, SessionReport};
use crate::motion::{
    Actuator, Direction, HeightReading, HeightSensor, Millis, MotionError, MotionRequest, Outcome,
    Strategy,
};

pub struct MotionEngine<A, S> {
    actuator: A,
    sensor: S,
    config: DeskConfig,
    session: Option<Session>,
    last_height: Option<i32>,
}

impl<A, S> MotionEngine<A, S>
where
    A: Actuator,
    S: HeightSensor,
{
    /// Take ownership of the lift hardware. The actuator is stopped immediately.
    pub fn new(mut actuator: A, sensor: S, config: DeskConfig) -> Self {
        actuator.stop();
        Self {
            actuator,
            sensor,
            config,
            session: None,
            last_height: None,
        }
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.session.is_some()
    }

    #[inline]
    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    /// Request of the running session, if any.
    pub fn active_request(&self) -> Option<&MotionRequest> {
        self.session.as_ref().map(Session::request)
    }

    /// Most recent valid height seen by the engine or its session.
    pub fn last_height(&self) -> Option<i32> {
        self.session
            .as_ref()
            .and_then(Session::last_mm)
            .or(self.last_height)
    }

    /// Take a fresh sample from the sensor.
    pub fn read_height(&mut self) -> HeightReading {
        let reading = self.sensor.read();
        if let Some(mm) = reading.get() {
            self.last_height = Some(mm);
        }
        reading
    }

    /// Start a session for `request`.
    ///
    /// Returns `Ok(Some(report))` when the request ended at entry (already close, sensor fault,
    /// at limit) and `Ok(None)` when a session is now running.
    pub fn begin(
        &mut self,
        mut request: MotionRequest,
        now: Millis,
    ) -> Result<Option<SessionReport>, MotionError> {
        if let Some(session) = self.session.as_mut() {
            if let Strategy::Jog(direction) = request.strategy {
                if direction != Direction::Stopped
                    && session.redirect_jog(direction, now, &mut self.actuator)
                {
                    log::info!("jog redirected {:?}", direction);
                    return Ok(None);
                }
            }
            log::warn!("rejecting {} move: busy", request.strategy.as_str());
            return Err(MotionError::Busy);
        }

        if !matches!(request.strategy, Strategy::Jog(_)) {
            let clamped = self.config.clamp_target(request.target_mm);
            if clamped != request.target_mm {
                log::warn!(
                    "target {} mm outside {}..={}, clamped to {}",
                    request.target_mm,
                    self.config.min_height_mm,
                    self.config.max_height_mm,
                    clamped
                );
                request.target_mm = clamped;
            }
        }

        match Session::enter(
            request,
            now,
            &mut self.actuator,
            &mut self.sensor,
            &self.config,
        ) {
            Entry::Moving(session) => {
                log::info!(
                    "{} move to {} mm from {:?}",
                    request.strategy.as_str(),
                    request.target_mm,
                    session.last_mm()
                );
                self.session = Some(session);
                Ok(None)
            }
            Entry::Done(report) => {
                self.actuator.stop();
                Ok(Some(self.record(report)))
            }
        }
    }

    /// Advance the running session by one tick. Returns its report once it has finished.
    pub fn poll(&mut self, now: Millis) -> Option<SessionReport> {
        let session = self.session.as_mut()?;
        let outcome = session.advance(now, &mut self.actuator, &mut self.sensor, &self.config)?;

        self.actuator.stop();
        let report = session.finish(outcome, now);
        self.session = None;
        Some(self.record(report))
    }

    /// Stop the lift. Ends the running session, if any, as [`Outcome::Cancelled`].
    pub fn cancel(&mut self, now: Millis) -> Option<SessionReport> {
        self.actuator.stop();
        let session = self.session.take()?;
        let report = session.finish(Outcome::Cancelled, now);
        Some(self.record(report))
    }

    fn record(&mut self, report: SessionReport) -> SessionReport {
        if let Some(mm) = report.final_mm {
            self.last_height = Some(mm);
        }
        if report.outcome.is_success() || report.outcome == Outcome::Cancelled {
            log::info!(
                "{} {} after {} ms",
                report.request.strategy.as_str(),
                report.outcome,
                report.elapsed_ms
            );
        } else {
            log::warn!(
                "{} {} after {} ms (target {}, at {:?})",
                report.request.strategy.as_str(),
                report.outcome,
                report.elapsed_ms,
                report.request.target_mm,
                report.final_mm
            );
        }
        report
    }
}
