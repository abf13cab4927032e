//! Closure-based command adapters
//!
//! Small building blocks for the common command shapes: run once, run
//! forever, run until a condition, wait for a duration, choose between two
//! commands, or fork other commands onto the scheduler and optionally wait
//! for them.

use std::rc::Rc;
use std::time::Duration;

use super::{Command, CommandRef, Requirements};
use crate::clock::{Clock, SystemClock};
use crate::error::CommandError;
use crate::scheduler::SchedulerHandle;
use crate::subsystem::SubsystemId;

type Action = Box<dyn FnMut()>;
type EndAction = Box<dyn FnMut(bool)>;
type Condition = Box<dyn Fn() -> bool>;

/// Runs an action once on initialize and finishes immediately
pub struct InstantCommand {
    action: Action,
    requirements: Requirements,
    runs_when_disabled: bool,
}

impl InstantCommand {
    pub fn new(action: impl FnMut() + 'static) -> Self {
        Self {
            action: Box::new(action),
            requirements: Requirements::new(),
            runs_when_disabled: false,
        }
    }

    pub fn requiring(mut self, subsystems: impl IntoIterator<Item = SubsystemId>) -> Self {
        self.requirements.extend(subsystems);
        self
    }

    /// Keep running while the robot is disabled
    pub fn run_while_disabled(mut self) -> Self {
        self.runs_when_disabled = true;
        self
    }
}

impl Command for InstantCommand {
    fn initialize(&mut self) -> Result<(), CommandError> {
        (self.action)();
        Ok(())
    }

    fn is_finished(&self) -> bool {
        true
    }

    fn requirements(&self) -> Requirements {
        self.requirements.clone()
    }

    fn runs_when_disabled(&self) -> bool {
        self.runs_when_disabled
    }

    fn name(&self) -> &str {
        "InstantCommand"
    }
}

/// Runs an action on every execute and never finishes on its own
pub struct RunCommand {
    action: Action,
    requirements: Requirements,
    runs_when_disabled: bool,
}

impl RunCommand {
    pub fn new(action: impl FnMut() + 'static) -> Self {
        Self {
            action: Box::new(action),
            requirements: Requirements::new(),
            runs_when_disabled: false,
        }
    }

    pub fn requiring(mut self, subsystems: impl IntoIterator<Item = SubsystemId>) -> Self {
        self.requirements.extend(subsystems);
        self
    }

    pub fn run_while_disabled(mut self) -> Self {
        self.runs_when_disabled = true;
        self
    }
}

impl Command for RunCommand {
    fn execute(&mut self) -> Result<(), CommandError> {
        (self.action)();
        Ok(())
    }

    fn requirements(&self) -> Requirements {
        self.requirements.clone()
    }

    fn runs_when_disabled(&self) -> bool {
        self.runs_when_disabled
    }

    fn name(&self) -> &str {
        "RunCommand"
    }
}

/// A command built from one closure per lifecycle hook
pub struct FunctionalCommand {
    on_init: Action,
    on_execute: Action,
    on_end: EndAction,
    is_finished: Condition,
    requirements: Requirements,
    runs_when_disabled: bool,
}

impl FunctionalCommand {
    pub fn new(
        on_init: impl FnMut() + 'static,
        on_execute: impl FnMut() + 'static,
        on_end: impl FnMut(bool) + 'static,
        is_finished: impl Fn() -> bool + 'static,
    ) -> Self {
        Self {
            on_init: Box::new(on_init),
            on_execute: Box::new(on_execute),
            on_end: Box::new(on_end),
            is_finished: Box::new(is_finished),
            requirements: Requirements::new(),
            runs_when_disabled: false,
        }
    }

    pub fn requiring(mut self, subsystems: impl IntoIterator<Item = SubsystemId>) -> Self {
        self.requirements.extend(subsystems);
        self
    }

    pub fn run_while_disabled(mut self) -> Self {
        self.runs_when_disabled = true;
        self
    }
}

impl Command for FunctionalCommand {
    fn initialize(&mut self) -> Result<(), CommandError> {
        (self.on_init)();
        Ok(())
    }

    fn execute(&mut self) -> Result<(), CommandError> {
        (self.on_execute)();
        Ok(())
    }

    fn end(&mut self, interrupted: bool) {
        (self.on_end)(interrupted);
    }

    fn is_finished(&self) -> bool {
        (self.is_finished)()
    }

    fn requirements(&self) -> Requirements {
        self.requirements.clone()
    }

    fn runs_when_disabled(&self) -> bool {
        self.runs_when_disabled
    }

    fn name(&self) -> &str {
        "FunctionalCommand"
    }
}

/// Runs one action on initialize and another on end; never finishes on its own
pub struct StartEndCommand {
    on_start: Action,
    on_end: Action,
    requirements: Requirements,
    runs_when_disabled: bool,
}

impl StartEndCommand {
    pub fn new(on_start: impl FnMut() + 'static, on_end: impl FnMut() + 'static) -> Self {
        Self {
            on_start: Box::new(on_start),
            on_end: Box::new(on_end),
            requirements: Requirements::new(),
            runs_when_disabled: false,
        }
    }

    pub fn requiring(mut self, subsystems: impl IntoIterator<Item = SubsystemId>) -> Self {
        self.requirements.extend(subsystems);
        self
    }

    pub fn run_while_disabled(mut self) -> Self {
        self.runs_when_disabled = true;
        self
    }
}

impl Command for StartEndCommand {
    fn initialize(&mut self) -> Result<(), CommandError> {
        (self.on_start)();
        Ok(())
    }

    fn end(&mut self, _interrupted: bool) {
        (self.on_end)();
    }

    fn requirements(&self) -> Requirements {
        self.requirements.clone()
    }

    fn runs_when_disabled(&self) -> bool {
        self.runs_when_disabled
    }

    fn name(&self) -> &str {
        "StartEndCommand"
    }
}

/// Finishes once `duration` has elapsed since initialize
pub struct WaitCommand {
    duration: Duration,
    clock: Rc<dyn Clock>,
    started_at: Option<Duration>,
}

impl WaitCommand {
    /// Wait against the system clock
    pub fn new(duration: Duration) -> Self {
        Self::with_clock(duration, Rc::new(SystemClock::new()))
    }

    pub fn with_clock(duration: Duration, clock: Rc<dyn Clock>) -> Self {
        Self {
            duration,
            clock,
            started_at: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at
            .map(|start| self.clock.now().saturating_sub(start))
            .unwrap_or_default()
    }
}

impl Command for WaitCommand {
    fn initialize(&mut self) -> Result<(), CommandError> {
        self.started_at = Some(self.clock.now());
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.started_at.is_some() && self.elapsed() >= self.duration
    }

    fn requirements(&self) -> Requirements {
        Requirements::new()
    }

    fn runs_when_disabled(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "WaitCommand"
    }
}

/// Finishes as soon as `condition` returns true
pub struct WaitUntilCommand {
    condition: Condition,
}

impl WaitUntilCommand {
    pub fn new(condition: impl Fn() -> bool + 'static) -> Self {
        Self {
            condition: Box::new(condition),
        }
    }
}

impl Command for WaitUntilCommand {
    fn is_finished(&self) -> bool {
        (self.condition)()
    }

    fn requirements(&self) -> Requirements {
        Requirements::new()
    }

    fn runs_when_disabled(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "WaitUntilCommand"
    }
}

/// Runs the inner command but ignores its end condition
pub struct PerpetualCommand<C> {
    inner: C,
}

impl<C: Command> PerpetualCommand<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: Command> Command for PerpetualCommand<C> {
    fn initialize(&mut self) -> Result<(), CommandError> {
        self.inner.initialize()
    }

    fn execute(&mut self) -> Result<(), CommandError> {
        self.inner.execute()
    }

    fn end(&mut self, interrupted: bool) {
        self.inner.end(interrupted);
    }

    fn requirements(&self) -> Requirements {
        self.inner.requirements()
    }

    fn runs_when_disabled(&self) -> bool {
        self.inner.runs_when_disabled()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Picks one of two commands when initialized, based on `condition`
///
/// Requires the union of both branches' subsystems, since the branch is not
/// known at admission time.
pub struct ConditionalCommand {
    on_true: Box<dyn Command>,
    on_false: Box<dyn Command>,
    condition: Condition,
    selected: Option<bool>,
}

impl ConditionalCommand {
    pub fn new(
        on_true: impl Command + 'static,
        on_false: impl Command + 'static,
        condition: impl Fn() -> bool + 'static,
    ) -> Self {
        Self {
            on_true: Box::new(on_true),
            on_false: Box::new(on_false),
            condition: Box::new(condition),
            selected: None,
        }
    }

    fn selected(&self) -> Option<&dyn Command> {
        match self.selected? {
            true => Some(&*self.on_true),
            false => Some(&*self.on_false),
        }
    }

    fn selected_mut(&mut self) -> Option<&mut Box<dyn Command>> {
        match self.selected? {
            true => Some(&mut self.on_true),
            false => Some(&mut self.on_false),
        }
    }
}

impl Command for ConditionalCommand {
    fn initialize(&mut self) -> Result<(), CommandError> {
        self.selected = Some((self.condition)());
        match self.selected_mut() {
            Some(branch) => branch.initialize(),
            None => Ok(()),
        }
    }

    fn execute(&mut self) -> Result<(), CommandError> {
        match self.selected_mut() {
            Some(branch) => branch.execute(),
            None => Ok(()),
        }
    }

    fn end(&mut self, interrupted: bool) {
        if let Some(branch) = self.selected_mut() {
            branch.end(interrupted);
        }
        self.selected = None;
    }

    fn is_finished(&self) -> bool {
        self.selected().is_some_and(|branch| branch.is_finished())
    }

    fn requirements(&self) -> Requirements {
        let mut requirements = self.on_true.requirements();
        requirements.extend(self.on_false.requirements());
        requirements
    }

    fn runs_when_disabled(&self) -> bool {
        self.on_true.runs_when_disabled() && self.on_false.runs_when_disabled()
    }

    fn name(&self) -> &str {
        "ConditionalCommand"
    }
}

/// Forks other commands onto the scheduler and finishes immediately
///
/// The forked commands run independently; ending this command does not
/// cancel them.
pub struct ScheduleCommand {
    handle: SchedulerHandle,
    commands: Vec<CommandRef>,
}

impl ScheduleCommand {
    pub fn new(handle: SchedulerHandle, commands: Vec<CommandRef>) -> Self {
        Self { handle, commands }
    }
}

impl Command for ScheduleCommand {
    fn initialize(&mut self) -> Result<(), CommandError> {
        for command in &self.commands {
            self.handle.schedule(command);
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        true
    }

    fn requirements(&self) -> Requirements {
        Requirements::new()
    }

    fn runs_when_disabled(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "ScheduleCommand"
    }
}

/// Runs another command on the scheduler and finishes when it does
///
/// The proxy itself requires nothing, so a group holding it does not claim
/// the proxied command's subsystems. Interrupting the proxy cancels the
/// proxied command.
pub struct ProxyCommand {
    handle: SchedulerHandle,
    command: CommandRef,
}

impl ProxyCommand {
    pub fn new(handle: SchedulerHandle, command: CommandRef) -> Self {
        Self { handle, command }
    }
}

impl Command for ProxyCommand {
    fn initialize(&mut self) -> Result<(), CommandError> {
        self.handle.schedule(&self.command);
        Ok(())
    }

    fn end(&mut self, interrupted: bool) {
        if interrupted {
            self.handle.cancel(&self.command);
        }
    }

    fn is_finished(&self) -> bool {
        !self.handle.is_scheduled(&self.command) && !self.handle.is_queued(&self.command)
    }

    fn requirements(&self) -> Requirements {
        Requirements::new()
    }

    fn name(&self) -> &str {
        "ProxyCommand"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::scheduler::CommandScheduler;
    use std::cell::{Cell, RefCell};

    #[test]
    fn test_instant_runs_on_initialize() {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let mut cmd = InstantCommand::new(move || count_clone.set(count_clone.get() + 1));

        assert_eq!(count.get(), 0);
        cmd.initialize().unwrap();
        assert_eq!(count.get(), 1);
        assert!(cmd.is_finished());
    }

    #[test]
    fn test_run_command_never_finishes() {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let mut cmd = RunCommand::new(move || count_clone.set(count_clone.get() + 1));

        cmd.initialize().unwrap();
        for _ in 0..5 {
            cmd.execute().unwrap();
            assert!(!cmd.is_finished());
        }
        assert_eq!(count.get(), 5);
    }

    #[test]
    fn test_wait_command_elapses_on_clock() {
        let clock = ManualClock::new();
        let mut cmd = WaitCommand::with_clock(Duration::from_millis(500), Rc::new(clock.clone()));

        assert!(!cmd.is_finished());
        cmd.initialize().unwrap();
        clock.advance(Duration::from_millis(499));
        assert!(!cmd.is_finished());
        clock.advance(Duration::from_millis(1));
        assert!(cmd.is_finished());
        assert_eq!(cmd.elapsed(), Duration::from_millis(500));
    }

    #[test]
    fn test_wait_command_restarts_on_initialize() {
        let clock = ManualClock::new();
        let mut cmd = WaitCommand::with_clock(Duration::from_millis(100), Rc::new(clock.clone()));

        cmd.initialize().unwrap();
        clock.advance(Duration::from_millis(150));
        assert!(cmd.is_finished());

        cmd.initialize().unwrap();
        assert!(!cmd.is_finished());
    }

    #[test]
    fn test_perpetual_ignores_finish() {
        let cmd = PerpetualCommand::new(InstantCommand::new(|| {}));
        assert!(!cmd.is_finished());
    }

    #[test]
    fn test_conditional_selects_branch() {
        let flag = Rc::new(Cell::new(true));
        let hits = Rc::new(RefCell::new(Vec::new()));
        let (t, f) = (hits.clone(), hits.clone());
        let cond_flag = flag.clone();

        let mut cmd = ConditionalCommand::new(
            InstantCommand::new(move || t.borrow_mut().push("true")),
            InstantCommand::new(move || f.borrow_mut().push("false")),
            move || cond_flag.get(),
        );

        cmd.initialize().unwrap();
        assert!(cmd.is_finished());
        cmd.end(false);

        flag.set(false);
        cmd.initialize().unwrap();
        cmd.end(false);

        assert_eq!(*hits.borrow(), vec!["true", "false"]);
    }

    #[test]
    fn test_schedule_command_queues_requests() {
        let handle = CommandScheduler::default().handle();
        let forked = InstantCommand::new(|| {});
        let forked = CommandRef::new(forked);

        let mut cmd = ScheduleCommand::new(handle.clone(), vec![forked]);
        cmd.initialize().unwrap();

        assert!(cmd.is_finished());
        assert_eq!(handle.pending(), 1);
    }

    #[test]
    fn test_start_end_runs_while_disabled_when_asked() {
        let cmd = StartEndCommand::new(|| {}, || {});
        assert!(!cmd.runs_when_disabled());
        assert!(cmd.run_while_disabled().runs_when_disabled());
    }

    #[test]
    fn test_proxy_waits_for_queued_request() {
        let handle = CommandScheduler::default().handle();
        let target = CommandRef::new(RunCommand::new(|| {}));

        let mut proxy = ProxyCommand::new(handle.clone(), target);
        proxy.initialize().unwrap();

        assert_eq!(handle.pending(), 1);
        assert!(!proxy.is_finished());
    }
}
