//! The command contract
//!
//! A command is a small state machine run by the scheduler:
//! - `initialize` once when admitted
//! - `execute` once per tick while active
//! - `is_finished` after every `execute`
//! - `end` exactly once on retirement
//!
//! Commands declare the subsystems they require; the scheduler guarantees
//! that no two active commands share one.

mod basic;

pub use basic::{
    ConditionalCommand, FunctionalCommand, InstantCommand, PerpetualCommand, ProxyCommand,
    RunCommand, ScheduleCommand, StartEndCommand, WaitCommand, WaitUntilCommand,
};

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{CommandError, GroupError};
use crate::group::{ParallelGroup, SequentialGroup};
use crate::scheduler::SchedulerHandle;
use crate::subsystem::SubsystemId;

/// Set of subsystems a command needs exclusive access to
pub type Requirements = BTreeSet<SubsystemId>;

/// A unit of schedulable robot behavior
pub trait Command {
    fn initialize(&mut self) -> Result<(), CommandError> {
        Ok(())
    }

    /// One bounded step of work. Must not block.
    fn execute(&mut self) -> Result<(), CommandError> {
        Ok(())
    }

    /// Called exactly once on retirement. `interrupted` is false only when
    /// the command retired because `is_finished` returned true.
    fn end(&mut self, _interrupted: bool) {}

    fn is_finished(&self) -> bool {
        false
    }

    /// Subsystems this command requires, queried once at admission
    fn requirements(&self) -> Requirements;

    fn runs_when_disabled(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<C: Command + ?Sized> Command for Box<C> {
    fn initialize(&mut self) -> Result<(), CommandError> {
        (**self).initialize()
    }

    fn execute(&mut self) -> Result<(), CommandError> {
        (**self).execute()
    }

    fn end(&mut self, interrupted: bool) {
        (**self).end(interrupted)
    }

    fn is_finished(&self) -> bool {
        (**self).is_finished()
    }

    fn requirements(&self) -> Requirements {
        (**self).requirements()
    }

    fn runs_when_disabled(&self) -> bool {
        (**self).runs_when_disabled()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Shared handle to a command submitted to the scheduler
///
/// Handle identity is what the scheduler compares: submitting a clone of an
/// active handle is a no-op, submitting a retired one starts it again.
#[derive(Clone)]
pub struct CommandRef {
    inner: Rc<RefCell<dyn Command>>,
}

impl CommandRef {
    pub fn new<C: Command + 'static>(command: C) -> Self {
        Self {
            inner: Rc::new(RefCell::new(command)),
        }
    }

    /// Whether both handles point at the same command instance
    pub fn ptr_eq(&self, other: &CommandRef) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.inner), Rc::as_ptr(&other.inner))
    }

    /// Identity key, stable while the command is alive
    pub(crate) fn key(&self) -> usize {
        Rc::as_ptr(&self.inner).cast::<()>() as usize
    }

    pub fn name(&self) -> String {
        match self.inner.try_borrow() {
            Ok(command) => command.name().to_string(),
            Err(_) => "<busy command>".to_string(),
        }
    }

    pub(crate) fn borrow(&self) -> Ref<'_, dyn Command> {
        self.inner.borrow()
    }

    pub(crate) fn borrow_mut(&self) -> RefMut<'_, dyn Command> {
        self.inner.borrow_mut()
    }
}

impl fmt::Debug for CommandRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRef")
            .field("name", &self.name())
            .finish()
    }
}

/// Decorators available on every command
///
/// Decorators compose the command into a group; the original command is
/// moved into the result and cannot be scheduled on its own anymore.
pub trait CommandExt: Command + Sized + 'static {
    /// Wrap into a shareable handle for the scheduler
    fn into_ref(self) -> CommandRef {
        CommandRef::new(self)
    }

    /// Interrupt the command if it has not finished after `timeout`
    fn with_timeout(self, timeout: Duration, clock: Rc<dyn Clock>) -> ParallelGroup {
        ParallelGroup::from_disjoint(
            vec![
                Box::new(self),
                Box::new(WaitCommand::with_clock(timeout, clock)),
            ],
            crate::group::Completion::Any,
        )
    }

    /// Interrupt the command as soon as `condition` becomes true
    fn interrupt_on(self, condition: impl Fn() -> bool + 'static) -> ParallelGroup {
        ParallelGroup::from_disjoint(
            vec![Box::new(self), Box::new(WaitUntilCommand::new(condition))],
            crate::group::Completion::Any,
        )
    }

    /// Run `action` once after the command finishes
    fn when_finished(self, action: impl FnMut() + 'static) -> SequentialGroup {
        SequentialGroup::from_disjoint(vec![
            Box::new(self),
            Box::new(InstantCommand::new(action)),
        ])
    }

    /// Run `action` once before the command starts
    fn before_starting(self, action: impl FnMut() + 'static) -> SequentialGroup {
        SequentialGroup::from_disjoint(vec![
            Box::new(InstantCommand::new(action)),
            Box::new(self),
        ])
    }

    /// Run `next` after this command finishes
    fn and_then(self, next: impl Command + 'static) -> Result<SequentialGroup, GroupError> {
        SequentialGroup::new(vec![Box::new(self), Box::new(next)])
    }

    /// Run alongside `others`, finishing when all of them have finished
    fn along_with(self, others: Vec<Box<dyn Command>>) -> Result<ParallelGroup, GroupError> {
        let mut commands: Vec<Box<dyn Command>> = vec![Box::new(self)];
        commands.extend(others);
        ParallelGroup::new(commands)
    }

    /// Run alongside `others`, finishing when the first one finishes
    fn race_with(self, others: Vec<Box<dyn Command>>) -> Result<ParallelGroup, GroupError> {
        let mut commands: Vec<Box<dyn Command>> = vec![Box::new(self)];
        commands.extend(others);
        ParallelGroup::race(commands)
    }

    /// Run alongside `others`, finishing when this command finishes
    fn deadline_with(self, others: Vec<Box<dyn Command>>) -> Result<ParallelGroup, GroupError> {
        ParallelGroup::deadline(Box::new(self), others)
    }

    /// Ignore the command's end condition; it runs until interrupted
    fn perpetually(self) -> PerpetualCommand<Self> {
        PerpetualCommand::new(self)
    }

    /// Run on the scheduler behind a requirement-free proxy
    fn as_proxy(self, handle: &SchedulerHandle) -> ProxyCommand {
        ProxyCommand::new(handle.clone(), self.into_ref())
    }

    fn has_requirement(&self, subsystem: SubsystemId) -> bool {
        self.requirements().contains(&subsystem)
    }
}

impl<C: Command + 'static> CommandExt for C {}
