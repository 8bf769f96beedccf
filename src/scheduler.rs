// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Cooperative scheduler.
//!
//! Call [`Scheduler::tick`] from the main loop with the current time. Each tick runs whichever of
//! these are due and then advances the motion session:
//!
//! | Task      | Period (default) | Work                                                  |
//! |-----------|------------------|-------------------------------------------------------|
//! | command   | 100 ms           | Assemble console lines, parse and dispatch commands   |
//! | remote    | 100 ms           | Poll the remote link for commands                     |
//! | telemetry | 5 s              | Publish the height on the height topic                |
//! | progress  | 1 s              | Publish `move <height>` while a session is running    |
//!
//! Status messages go to the status topic: `start <target>` when a session starts and
//! `<outcome> <final_mm>` when it ends (e.g. `reached 897`). The console sees the replies to its
//! own commands.

use core::fmt::{self, Write};

use crate::config::RemoteConfig;
use crate::io::ByteSource;
use crate::motion::{
    is_due, Actuator, HeightSensor, Millis, MotionEngine, MotionRequest, SessionReport, Strategy,
};
use crate::protocol::{parse, Command, LineBuffer, ParseError};
use crate::remote::{RemoteError, RemoteLink};

/// Bytes taken from the console per command tick.
const CONSOLE_BUDGET: usize = 64;
/// Remote messages handled per remote tick.
const REMOTE_BUDGET: usize = 4;
/// Largest remote command payload.
const PAYLOAD_MAX: usize = 64;

type Payload = heapless::String<64>;

/// Where a command came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    Console,
    Remote,
}

/// Fixed-period deadline on the wrapping millisecond clock.
#[derive(Copy, Clone, Debug)]
pub struct Interval {
    period_ms: u32,
    next: Millis,
}

impl Interval {
    /// First fires at `now`.
    pub fn new(period_ms: u32, now: Millis) -> Self {
        Self {
            period_ms,
            next: now,
        }
    }

    /// `true` when the period has elapsed; the next deadline is then `now + period`.
    pub fn poll(&mut self, now: Millis) -> bool {
        if is_due(now, self.next) {
            self.next = now.wrapping_add(self.period_ms);
            true
        } else {
            false
        }
    }

    /// Push the next deadline to one period from `now`.
    pub fn reset(&mut self, now: Millis) {
        self.next = now.wrapping_add(self.period_ms);
    }
}

pub struct Scheduler<A, S, C, W, R> {
    engine: MotionEngine<A, S>,
    console_rx: C,
    console: W,
    remote: Option<R>,
    remote_running: bool,
    line: LineBuffer,
    /// Who started the running session
    origin: Option<Origin>,
    topics: RemoteConfig,

    command_task: Interval,
    remote_task: Interval,
    telemetry_task: Interval,
    progress: Interval,
}

impl<A, S, C, W, R> Scheduler<A, S, C, W, R>
where
    A: Actuator,
    S: HeightSensor,
    C: ByteSource,
    W: fmt::Write,
    R: RemoteLink,
{
    pub fn new(
        engine: MotionEngine<A, S>,
        console_rx: C,
        console: W,
        remote: Option<R>,
        now: Millis,
    ) -> Self {
        let periods = engine.config().scheduler;
        let topics = engine.config().remote;
        Self {
            engine,
            console_rx,
            console,
            remote_running: remote.is_some(),
            remote,
            line: LineBuffer::new(),
            origin: None,
            topics,
            command_task: Interval::new(periods.command_poll_ms, now),
            remote_task: Interval::new(periods.remote_poll_ms, now),
            telemetry_task: Interval::new(periods.telemetry_interval_ms, now),
            progress: Interval::new(periods.progress_interval_ms, now),
        }
    }

    /// Connect and subscribe the remote link, then announce readiness on the console.
    ///
    /// A link that fails to come up is disconnected; everything else keeps running.
    pub fn start(&mut self) {
        let topics = self.topics;
        if let Some(remote) = self.remote.as_mut() {
            match connect(remote, &topics) {
                Ok(()) => log::info!("remote: subscribed to {}", topics.command_topic),
                Err(e) => {
                    log::error!("remote: {}", e);
                    self.stop_remote();
                }
            }
        }
        self.console_line(format_args!("desklift ready"));
    }

    /// Run every task that is due at `now`.
    pub fn tick(&mut self, now: Millis) {
        if self.command_task.poll(now) {
            self.service_console(now);
        }
        if self.remote_running && self.remote_task.poll(now) {
            self.service_remote(now);
        }

        if let Some(report) = self.engine.poll(now) {
            self.finished(report, None);
        }
        if self.engine.is_busy() && self.progress.poll(now) {
            self.report_progress();
        }

        if self.telemetry_task.poll(now) {
            self.publish_height();
        }
    }

    #[inline]
    pub fn engine(&self) -> &MotionEngine<A, S> {
        &self.engine
    }

    #[inline]
    pub fn engine_mut(&mut self) -> &mut MotionEngine<A, S> {
        &mut self.engine
    }

    #[inline]
    pub fn console(&self) -> &W {
        &self.console
    }

    #[inline]
    pub fn console_rx(&mut self) -> &mut C {
        &mut self.console_rx
    }

    #[inline]
    pub fn remote(&self) -> Option<&R> {
        self.remote.as_ref()
    }

    #[inline]
    pub fn remote_mut(&mut self) -> Option<&mut R> {
        self.remote.as_mut()
    }

    /// `false` once the remote task has ended.
    #[inline]
    pub fn is_remote_running(&self) -> bool {
        self.remote_running
    }

    fn service_console(&mut self, now: Millis) {
        for _ in 0..CONSOLE_BUDGET {
            let b = match self.console_rx.read_byte() {
                Ok(b) => b,
                Err(nb::Error::WouldBlock) => return,
                Err(nb::Error::Other(e)) => {
                    log::warn!("console rx error: {:?}", e);
                    continue;
                }
            };
            let Some(line) = self.line.push(b) else {
                continue;
            };
            let parsed = line.and_then(parse);
            if let Err(e) = parsed {
                log::warn!("console: {} ({:?})", e, line);
            }
            self.dispatch(parsed, Origin::Console, now);
        }
    }

    fn service_remote(&mut self, now: Millis) {
        let mut buf = [0u8; PAYLOAD_MAX];
        for _ in 0..REMOTE_BUDGET {
            let Some(remote) = self.remote.as_mut() else {
                return;
            };
            match remote.poll_message(&mut buf) {
                Ok(None) => return,
                Ok(Some(n)) => {
                    let payload = &mut buf[..n];
                    payload.make_ascii_lowercase();
                    let parsed = core::str::from_utf8(payload)
                        .map_err(|_| ParseError::UnrecognizedCommand)
                        .and_then(|text| parse(text.trim()));
                    if let Err(e) = parsed {
                        log::warn!("remote: {}", e);
                    }
                    self.dispatch(parsed, Origin::Remote, now);
                }
                Err(RemoteError::Disconnected) => {
                    log::error!("remote channel disconnected");
                    self.stop_remote();
                    return;
                }
                Err(e) => log::warn!("remote: {}", e),
            }
        }
    }

    fn dispatch(&mut self, parsed: Result<Command, ParseError>, origin: Origin, now: Millis) {
        let command = match parsed {
            Ok(command) => command,
            Err(ParseError::Empty) => return,
            Err(e) => {
                self.reply(origin, format_args!("error: {}", e));
                return;
            }
        };

        match command {
            Command::Stop => match self.engine.cancel(now) {
                Some(report) => self.finished(report, Some(origin)),
                None => self.reply(origin, format_args!("stopped")),
            },
            Command::Height => match (self.engine.read_height().get(), origin) {
                (Some(mm), Origin::Console) => self.console_line(format_args!("height {}", mm)),
                (Some(mm), Origin::Remote) => {
                    let mut digits = itoa::Buffer::new();
                    self.publish_str(self.topics.height_topic, digits.format(mm));
                }
                (None, _) => self.reply(origin, format_args!("height unavailable")),
            },
            other => {
                if let Some(request) = other.motion_request() {
                    self.start_motion(request, origin, now);
                }
            }
        }
    }

    fn start_motion(&mut self, request: MotionRequest, origin: Origin, now: Millis) {
        match self.engine.begin(request, now) {
            Ok(None) => {
                self.origin = Some(origin);
                self.progress.reset(now);
                let target = self
                    .engine
                    .active_request()
                    .map_or(request.target_mm, |r| r.target_mm);
                match request.strategy {
                    Strategy::Jog(_) => {
                        self.status(format_args!("start {}", request.strategy.as_str()))
                    }
                    _ => self.status(format_args!("start {}", target)),
                }
            }
            Ok(Some(report)) => {
                self.origin = Some(origin);
                self.finished(report, None);
            }
            Err(e) => self.reply(origin, format_args!("{}", e)),
        }
    }

    /// Report a finished session. `trigger` is the channel that ended it, if any.
    fn finished(&mut self, report: SessionReport, trigger: Option<Origin>) {
        let origin = self.origin.take();
        let final_mm = report.final_mm.unwrap_or(-1);

        self.publish(
            self.topics.status_topic,
            format_args!("{} {}", report.outcome, final_mm),
        );
        if origin == Some(Origin::Console) || trigger == Some(Origin::Console) {
            self.console_line(format_args!("{} {}", report.outcome, final_mm));
        }
    }

    fn report_progress(&mut self) {
        if let Some(mm) = self.engine.last_height() {
            self.publish(self.topics.status_topic, format_args!("move {}", mm));
        }
    }

    fn publish_height(&mut self) {
        if !self.remote_running {
            return;
        }
        match self.engine.read_height().get() {
            Some(mm) => {
                let mut digits = itoa::Buffer::new();
                self.publish_str(self.topics.height_topic, digits.format(mm));
            }
            None => log::debug!("telemetry: no height"),
        }
    }

    /// Session status: always to the status topic, and to the console for console sessions.
    fn status(&mut self, args: fmt::Arguments<'_>) {
        self.publish(self.topics.status_topic, args);
        if self.origin == Some(Origin::Console) {
            self.console_line(args);
        }
    }

    fn reply(&mut self, origin: Origin, args: fmt::Arguments<'_>) {
        match origin {
            Origin::Console => self.console_line(args),
            Origin::Remote => self.publish(self.topics.status_topic, args),
        }
    }

    fn console_line(&mut self, args: fmt::Arguments<'_>) {
        self.console.write_fmt(args).ok();
        self.console.write_str("\r\n").ok();
    }

    fn publish(&mut self, topic: &str, args: fmt::Arguments<'_>) {
        let mut payload = Payload::new();
        if payload.write_fmt(args).is_err() {
            log::warn!("remote: payload too long for {}", topic);
            return;
        }
        self.publish_str(topic, &payload);
    }

    fn publish_str(&mut self, topic: &str, payload: &str) {
        if !self.remote_running {
            return;
        }
        let Some(remote) = self.remote.as_mut() else {
            return;
        };
        match remote.publish(topic, payload) {
            Ok(()) => {}
            Err(RemoteError::Disconnected) => {
                log::error!("remote channel disconnected");
                self.stop_remote();
            }
            Err(e) => log::warn!("remote: publish to {} failed: {}", topic, e),
        }
    }

    /// End the remote task. The link object is kept.
    fn stop_remote(&mut self) {
        if let Some(remote) = self.remote.as_mut() {
            remote.disconnect();
        }
        if self.remote_running {
            log::warn!("remote task stopped");
        }
        self.remote_running = false;
    }
}

fn connect<R: RemoteLink>(remote: &mut R, topics: &RemoteConfig) -> Result<(), RemoteError> {
    remote.connect(topics.client_id)?;
    remote.subscribe(topics.command_topic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeskConfig;
    use crate::io::testing::MemBytes;
    use crate::motion::testing::{SimActuator, SimDesk, SimSensor};
    use crate::motion::Direction;
    use crate::remote::testing::FakeRemote;
    use std::string::String;

    type Sched = Scheduler<SimActuator, SimSensor, MemBytes, String, FakeRemote>;

    const STATUS: &str = "desk/status";
    const HEIGHT: &str = "desk/height";

    fn rig(height: i32, speed: f32) -> (SimDesk, Sched) {
        let desk = SimDesk::new(height, speed);
        let engine = MotionEngine::new(desk.actuator(), desk.sensor(), DeskConfig::default());
        let mut sched = Scheduler::new(
            engine,
            MemBytes::default(),
            String::new(),
            Some(FakeRemote::default()),
            0,
        );
        sched.start();
        (desk, sched)
    }

    /// Tick every 10 ms over `(from, to]`, moving the simulated desk.
    fn run(desk: &SimDesk, sched: &mut Sched, from: Millis, to: Millis) {
        let mut now = from;
        while now < to {
            now += 10;
            desk.advance(10);
            sched.tick(now);
        }
    }

    fn type_line(sched: &mut Sched, line: &str) {
        sched.console_rx().push_str(line);
    }

    fn remote(sched: &mut Sched) -> &mut FakeRemote {
        sched.remote_mut().unwrap()
    }

    #[test]
    fn interval_fires_once_per_period() {
        let mut i = Interval::new(100, 0);
        assert!(i.poll(0));
        assert!(!i.poll(50));
        assert!(i.poll(100));
        assert!(!i.poll(199));
        i.reset(150);
        assert!(!i.poll(200));
        assert!(i.poll(250));
    }

    #[test]
    fn start_connects_and_subscribes() {
        let (_desk, mut sched) = rig(700, 0.0);
        let r = remote(&mut sched);
        assert!(r.connected);
        assert_eq!(r.subscriptions, vec!["desk/cmd"]);
        assert!(sched.console().starts_with("desklift ready\r\n"));
    }

    #[test]
    fn console_move_reports_start_and_outcome() {
        let (desk, mut sched) = rig(700, 50.0);
        type_line(&mut sched, "MOVE 760\r\n");
        run(&desk, &mut sched, 0, 3_000);

        assert!(!sched.engine().is_busy());
        let console = sched.console().clone();
        assert!(console.contains("start 760\r\n"), "{}", console);
        assert!(console.contains("reached 75"), "{}", console);

        let status = remote(&mut sched).published_on(STATUS);
        assert_eq!(status.first().map(String::as_str), Some("start 760"));
        assert!(status.last().unwrap().starts_with("reached "));
        assert_eq!(desk.direction(), Direction::Stopped);
    }

    #[test]
    fn unknown_and_malformed_input_is_reported() {
        let (desk, mut sched) = rig(700, 0.0);
        type_line(&mut sched, "jump\nmove_pid abc\n\n");
        run(&desk, &mut sched, 0, 200);
        let console = sched.console();
        assert!(console.contains("error: unrecognized command\r\n"));
        assert!(console.contains("error: malformed numeric argument\r\n"));
        assert!(!sched.engine().is_busy());
    }

    #[test]
    fn garbled_console_bytes_are_reported() {
        let (desk, mut sched) = rig(700, 0.0);
        sched.console_rx().bytes.extend([Ok(0xC3), Ok(0x28), Ok(b'\n')]);
        run(&desk, &mut sched, 0, 200);
        assert!(sched.console().contains("error: unrecognized command\r\n"));
        assert!(!sched.engine().is_busy());
    }

    #[test]
    fn second_move_is_rejected_while_busy() {
        let (desk, mut sched) = rig(700, 50.0);
        type_line(&mut sched, "move 900\n");
        run(&desk, &mut sched, 0, 100);
        type_line(&mut sched, "move_smooth 800\n");
        run(&desk, &mut sched, 100, 300);
        assert!(sched.console().contains("busy"));
        assert_eq!(
            sched.engine().active_request().map(|r| r.strategy),
            Some(Strategy::FixedTimeout)
        );
    }

    #[test]
    fn stop_cancels_a_jog() {
        let (desk, mut sched) = rig(800, 50.0);
        type_line(&mut sched, "u\n");
        run(&desk, &mut sched, 0, 1_000);
        assert_eq!(desk.direction(), Direction::Up);

        type_line(&mut sched, "s\n");
        run(&desk, &mut sched, 1_000, 1_200);
        assert_eq!(desk.direction(), Direction::Stopped);
        assert!(!sched.engine().is_busy());
        assert!(sched.console().contains("start jog_up\r\n"));
        assert!(sched.console().contains("cancelled 8"));
    }

    #[test]
    fn remote_commands_drive_the_desk() {
        let (desk, mut sched) = rig(800, 50.0);
        remote(&mut sched).send(" Down ");
        run(&desk, &mut sched, 0, 500);
        assert_eq!(desk.direction(), Direction::Down);

        remote(&mut sched).send("stop");
        run(&desk, &mut sched, 500, 700);
        assert_eq!(desk.direction(), Direction::Stopped);

        let status = remote(&mut sched).published_on(STATUS);
        assert_eq!(status[0], "start jog_down");
        assert!(status.last().unwrap().starts_with("cancelled 7"));
        // Remote sessions are not echoed to the console.
        assert!(!sched.console().contains("cancelled"));
    }

    #[test]
    fn remote_errors_are_published() {
        let (desk, mut sched) = rig(800, 0.0);
        remote(&mut sched).send("fly 3");
        run(&desk, &mut sched, 0, 200);
        let status = remote(&mut sched).published_on(STATUS);
        assert_eq!(status, vec!["error: unrecognized command"]);
    }

    #[test]
    fn telemetry_publishes_height_every_five_seconds() {
        let (desk, mut sched) = rig(742, 0.0);
        run(&desk, &mut sched, 0, 12_000);
        let heights = remote(&mut sched).published_on(HEIGHT);
        // t = 10, 5010, 10010
        assert_eq!(heights, vec!["742", "742", "742"]);
    }

    #[test]
    fn progress_is_published_while_moving() {
        let (desk, mut sched) = rig(685, 50.0);
        remote(&mut sched).send("move 900");
        run(&desk, &mut sched, 0, 6_000);
        let status = remote(&mut sched).published_on(STATUS);
        let moves = status.iter().filter(|s| s.starts_with("move ")).count();
        assert!((3..=5).contains(&moves), "{:?}", status);
        assert!(status.last().unwrap().starts_with("reached "));
    }

    #[test]
    fn disconnect_ends_only_the_remote_task() {
        let (desk, mut sched) = rig(700, 50.0);
        remote(&mut sched).incoming.push_back(Err(RemoteError::Disconnected));
        run(&desk, &mut sched, 0, 200);
        assert!(!sched.is_remote_running());
        assert_eq!(remote(&mut sched).disconnects, 1);

        // Console and motion keep working.
        type_line(&mut sched, "move 800\n");
        run(&desk, &mut sched, 200, 6_000);
        assert!(sched.console().contains("reached "));
        assert!(remote(&mut sched).published_on(HEIGHT).is_empty());
    }

    #[test]
    fn failed_connect_leaves_console_running() {
        let desk = SimDesk::new(700, 0.0);
        let engine = MotionEngine::new(desk.actuator(), desk.sensor(), DeskConfig::default());
        let remote = FakeRemote {
            refuse_connect: true,
            ..FakeRemote::default()
        };
        let mut sched: Sched =
            Scheduler::new(engine, MemBytes::default(), String::new(), Some(remote), 0);
        sched.start();
        assert!(!sched.is_remote_running());

        type_line(&mut sched, "h\n");
        run(&desk, &mut sched, 0, 200);
        assert!(sched.console().contains("height 700\r\n"));
    }

    #[test]
    fn already_close_is_reported_without_moving() {
        let (desk, mut sched) = rig(900, 50.0);
        type_line(&mut sched, "move_smooth 903\n");
        run(&desk, &mut sched, 0, 200);
        assert!(sched.console().contains("no_change 900\r\n"));
        assert_eq!(desk.drives(), 0);
    }
}
