//! Command scheduler
//!
//! The scheduler owns the active set and the requirements map and runs one
//! control cycle per `tick()`:
//! 1. Sample trigger bindings and fire their actions
//! 2. Run `periodic()` on every registered subsystem
//! 3. Execute every active command, retiring those that finish
//! 4. Schedule default commands for idle subsystems
//!
//! Faults raised by command bodies (error returns or panics) retire the
//! faulty command without stopping the cycle for everyone else.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use crate::command::{CommandRef, Requirements};
use crate::error::{CommandError, CommandFault, FaultPhase, SchedulerError};
use crate::subsystem::{Subsystem, SubsystemId, SubsystemRef};
use crate::trigger::Binding;

/// What to do when a command body faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Retire the faulty command, log, and keep ticking the others
    #[default]
    Isolate,
    /// Retire the faulty command and abort the rest of the tick with an error
    Propagate,
}

/// Scheduler configuration
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    pub fault_policy: FaultPolicy,
}

/// Result of a `schedule` call; none of these are errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Admitted and initialized
    Scheduled,
    /// The command was already active
    AlreadyScheduled,
    /// The robot is disabled and the command does not run when disabled
    RejectedDisabled,
    /// Admitted, but its `initialize` faulted and it was retired again
    Faulted(CommandFault),
}

/// What happened since the previous tick report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Commands whose `execute` ran this tick
    pub executed: usize,
    /// Commands retired because they finished
    pub finished: Vec<String>,
    /// Commands retired by preemption, cancellation or disable
    pub interrupted: Vec<String>,
    pub faults: Vec<CommandFault>,
}

impl CycleReport {
    pub fn has_faults(&self) -> bool {
        !self.faults.is_empty()
    }
}

/// Details passed to global lifecycle listeners
#[derive(Debug, Clone, Copy)]
pub struct CommandInfo<'a> {
    pub name: &'a str,
    pub cycle: u64,
}

type Listener = Box<dyn FnMut(&CommandInfo<'_>)>;

#[derive(Default)]
struct Listeners {
    initialize: Vec<Listener>,
    execute: Vec<Listener>,
    interrupt: Vec<Listener>,
    finish: Vec<Listener>,
}

/// A request queued through a `SchedulerHandle`
#[derive(Debug, Clone)]
enum Request {
    Schedule(CommandRef),
    Cancel(CommandRef),
    CancelAll,
}

/// State shared between a scheduler and its handles
#[derive(Default)]
struct HandleState {
    queue: VecDeque<Request>,
    /// Identity keys of the active commands, kept current by the scheduler
    active: BTreeSet<usize>,
}

/// Cloneable queue for scheduling requests from inside command bodies
///
/// Commands cannot borrow the scheduler while it runs them, so they queue
/// requests here. The scheduler applies them as soon as the hook that issued
/// them returns. Handles are only handed out by `CommandScheduler::handle`.
#[derive(Clone)]
pub struct SchedulerHandle {
    state: Rc<RefCell<HandleState>>,
}

impl SchedulerHandle {
    fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(HandleState::default())),
        }
    }

    pub fn schedule(&self, command: &CommandRef) {
        self.push(Request::Schedule(command.clone()));
    }

    pub fn cancel(&self, command: &CommandRef) {
        self.push(Request::Cancel(command.clone()));
    }

    pub fn cancel_all(&self) {
        self.push(Request::CancelAll);
    }

    /// Number of requests not yet applied
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Whether `command` is active on the scheduler this handle belongs to
    pub fn is_scheduled(&self, command: &CommandRef) -> bool {
        self.state.borrow().active.contains(&command.key())
    }

    /// Whether a schedule request for `command` is still waiting
    pub(crate) fn is_queued(&self, command: &CommandRef) -> bool {
        self.state
            .borrow()
            .queue
            .iter()
            .any(|request| matches!(request, Request::Schedule(queued) if queued.ptr_eq(command)))
    }

    fn push(&self, request: Request) {
        self.state.borrow_mut().queue.push_back(request);
    }

    fn pop(&self) -> Option<Request> {
        self.state.borrow_mut().queue.pop_front()
    }

    fn set_active(&self, command: &CommandRef, active: bool) {
        let mut state = self.state.borrow_mut();
        if active {
            state.active.insert(command.key());
        } else {
            state.active.remove(&command.key());
        }
    }
}

struct Active {
    command: CommandRef,
    name: String,
    requirements: Requirements,
    runs_when_disabled: bool,
    /// Cycle during which it was admitted
    admitted: u64,
}

struct Registered {
    id: SubsystemId,
    name: String,
    subsystem: Rc<RefCell<dyn Subsystem>>,
    default_command: Option<CommandRef>,
}

/// How a command left the active set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retirement {
    Finished,
    Interrupted,
}

/// The central scheduling authority
pub struct CommandScheduler {
    config: SchedulerConfig,
    /// Active commands in admission order
    active: Vec<Active>,
    /// Subsystem -> owning active command
    requirements: BTreeMap<SubsystemId, CommandRef>,
    /// Registered subsystems in registration order
    subsystems: Vec<Registered>,
    bindings: Vec<Binding>,
    bindings_cleared: bool,
    disabled: bool,
    listeners: Listeners,
    requests: SchedulerHandle,
    cycle: u64,
    report: CycleReport,
}

impl CommandScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            active: Vec::new(),
            requirements: BTreeMap::new(),
            subsystems: Vec::new(),
            bindings: Vec::new(),
            bindings_cleared: false,
            disabled: false,
            listeners: Listeners::default(),
            requests: SchedulerHandle::new(),
            cycle: 0,
            report: CycleReport::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Handle for queuing requests from command bodies
    pub fn handle(&self) -> SchedulerHandle {
        self.requests.clone()
    }

    /// Number of completed ticks
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    /// Register a subsystem so its `periodic` runs every tick
    ///
    /// Registering the same handle twice is a no-op.
    pub fn register_subsystem<S: Subsystem + 'static>(
        &mut self,
        subsystem: &SubsystemRef<S>,
    ) -> SubsystemId {
        let id = SubsystemId::of(subsystem);
        if self.registered(id).is_none() {
            let name = subsystem.borrow().name().to_string();
            info!("[SCHED] Registered subsystem {} ({})", name, id);
            self.subsystems.push(Registered {
                id,
                name,
                subsystem: subsystem.clone(),
                default_command: None,
            });
        }
        id
    }

    /// Forget a subsystem: no more `periodic` calls or default command
    ///
    /// A command currently requiring it keeps running.
    pub fn unregister_subsystem(&mut self, id: SubsystemId) -> bool {
        let before = self.subsystems.len();
        self.subsystems.retain(|entry| entry.id != id);
        before != self.subsystems.len()
    }

    /// Set the command that runs whenever `subsystem` is idle
    ///
    /// The command must require exactly that subsystem and must not already
    /// be finished.
    pub fn set_default_command(
        &mut self,
        subsystem: SubsystemId,
        command: CommandRef,
    ) -> Result<(), SchedulerError> {
        let (requirements, finished) = {
            let inner = command.borrow();
            (inner.requirements(), inner.is_finished())
        };
        let name = command.name();

        if requirements.len() != 1 || !requirements.contains(&subsystem) {
            warn!(
                "[SCHED] Rejected default command {}: wrong requirements",
                name
            );
            return Err(SchedulerError::DefaultCommandRequirements {
                command: name,
                subsystem,
            });
        }
        if finished {
            return Err(SchedulerError::DefaultCommandFinishes { command: name });
        }

        let entry = self
            .registered_mut(subsystem)
            .ok_or(SchedulerError::UnregisteredSubsystem(subsystem))?;
        info!("[SCHED] Default command for {}: {}", entry.name, name);
        entry.default_command = Some(command);
        Ok(())
    }

    pub fn default_command(&self, subsystem: SubsystemId) -> Option<CommandRef> {
        self.registered(subsystem)
            .and_then(|entry| entry.default_command.clone())
    }

    /// Add a trigger binding, sampled on every tick from now on
    pub fn register_trigger(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    /// Drop every trigger binding
    pub fn clear_triggers(&mut self) {
        self.bindings.clear();
        self.bindings_cleared = true;
    }

    pub fn on_command_initialize(&mut self, listener: impl FnMut(&CommandInfo<'_>) + 'static) {
        self.listeners.initialize.push(Box::new(listener));
    }

    pub fn on_command_execute(&mut self, listener: impl FnMut(&CommandInfo<'_>) + 'static) {
        self.listeners.execute.push(Box::new(listener));
    }

    pub fn on_command_interrupt(&mut self, listener: impl FnMut(&CommandInfo<'_>) + 'static) {
        self.listeners.interrupt.push(Box::new(listener));
    }

    pub fn on_command_finish(&mut self, listener: impl FnMut(&CommandInfo<'_>) + 'static) {
        self.listeners.finish.push(Box::new(listener));
    }

    // ---------------------------------------------------------------------
    // Robot state
    // ---------------------------------------------------------------------

    /// Pushed by the host before each tick
    pub fn set_disabled(&mut self, disabled: bool) {
        if self.disabled != disabled {
            info!(
                "[SCHED] Robot {}",
                if disabled { "disabled" } else { "enabled" }
            );
        }
        self.disabled = disabled;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn is_scheduled(&self, command: &CommandRef) -> bool {
        self.position(command).is_some()
    }

    /// The active command currently owning `subsystem`
    pub fn requiring(&self, subsystem: SubsystemId) -> Option<CommandRef> {
        self.requirements.get(&subsystem).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn active_names(&self) -> Vec<String> {
        self.active.iter().map(|entry| entry.name.clone()).collect()
    }

    // ---------------------------------------------------------------------
    // Admission and cancellation
    // ---------------------------------------------------------------------

    /// Admit a command, preempting any active command that shares a
    /// requirement with it
    pub fn schedule(&mut self, command: &CommandRef) -> ScheduleOutcome {
        let outcome = self.admit(command);
        self.apply_requests();
        outcome
    }

    pub fn schedule_all(&mut self, commands: &[CommandRef]) {
        for command in commands {
            self.schedule(command);
        }
    }

    /// Interrupt an active command; no-op if it is not active
    pub fn cancel(&mut self, command: &CommandRef) -> bool {
        let cancelled = self.retire(command, Retirement::Interrupted);
        self.apply_requests();
        cancelled
    }

    /// Interrupt every active command
    pub fn cancel_all(&mut self) {
        self.retire_all();
        self.apply_requests();
    }

    fn admit(&mut self, command: &CommandRef) -> ScheduleOutcome {
        let name = command.name();
        let inspected = guard(&name, FaultPhase::Initialize, || {
            let inner = command.borrow();
            Ok((inner.runs_when_disabled(), inner.requirements()))
        });
        let (runs_when_disabled, requirements) = match inspected {
            Ok(inspected) => inspected,
            Err(fault) => {
                self.record_fault(fault.clone());
                return ScheduleOutcome::Faulted(fault);
            }
        };

        if self.disabled && !runs_when_disabled {
            debug!("[SCHED] {} not scheduled: robot disabled", name);
            return ScheduleOutcome::RejectedDisabled;
        }
        if self.is_scheduled(command) {
            return ScheduleOutcome::AlreadyScheduled;
        }

        // Newest claim wins
        let mut owners: Vec<CommandRef> = Vec::new();
        for subsystem in &requirements {
            if let Some(owner) = self.requirements.get(subsystem) {
                if !owners.iter().any(|o| o.ptr_eq(owner)) {
                    owners.push(owner.clone());
                }
            }
        }
        for owner in owners {
            info!("[SCHED] {} preempted by {}", owner.name(), name);
            self.retire(&owner, Retirement::Interrupted);
        }

        for subsystem in &requirements {
            self.requirements.insert(*subsystem, command.clone());
        }
        self.active.push(Active {
            command: command.clone(),
            name: name.clone(),
            requirements,
            runs_when_disabled,
            admitted: self.cycle,
        });
        self.requests.set_active(command, true);

        match guard(&name, FaultPhase::Initialize, || command.borrow_mut().initialize()) {
            Ok(()) => {
                debug!("[SCHED] Initialized {}", name);
                self.notify(ListenerKind::Initialize, &name);
                ScheduleOutcome::Scheduled
            }
            Err(fault) => {
                self.retire_faulted(command, fault.clone());
                ScheduleOutcome::Faulted(fault)
            }
        }
    }

    /// Remove `command` from the active set, call its `end` and release its
    /// requirements. Returns false if it was not active.
    fn retire(&mut self, command: &CommandRef, how: Retirement) -> bool {
        let Some(index) = self.position(command) else {
            return false;
        };
        let entry = self.active.remove(index);
        self.requests.set_active(command, false);
        for subsystem in &entry.requirements {
            if self
                .requirements
                .get(subsystem)
                .is_some_and(|owner| owner.ptr_eq(command))
            {
                self.requirements.remove(subsystem);
            }
        }

        let interrupted = how == Retirement::Interrupted;
        if let Err(fault) = guard(&entry.name, FaultPhase::End, || {
            command.borrow_mut().end(interrupted);
            Ok(())
        }) {
            error!("[SCHED] {}", fault);
            self.report.faults.push(fault);
        }

        match how {
            Retirement::Finished => {
                debug!("[SCHED] Finished {}", entry.name);
                self.notify(ListenerKind::Finish, &entry.name);
                self.report.finished.push(entry.name);
            }
            Retirement::Interrupted => {
                debug!("[SCHED] Interrupted {}", entry.name);
                self.notify(ListenerKind::Interrupt, &entry.name);
                self.report.interrupted.push(entry.name);
            }
        }
        true
    }

    fn retire_faulted(&mut self, command: &CommandRef, fault: CommandFault) {
        self.record_fault(fault);
        self.retire(command, Retirement::Interrupted);
    }

    fn retire_all(&mut self) {
        let commands: Vec<CommandRef> = self.active.iter().map(|e| e.command.clone()).collect();
        for command in commands {
            self.retire(&command, Retirement::Interrupted);
        }
    }

    fn record_fault(&mut self, fault: CommandFault) {
        error!("[SCHED] {}", fault);
        self.report.faults.push(fault);
    }

    // ---------------------------------------------------------------------
    // The control cycle
    // ---------------------------------------------------------------------

    /// Run one control cycle
    ///
    /// Returns what happened since the previous report. Under
    /// `FaultPolicy::Propagate` the first fault of the cycle aborts it and is
    /// returned as an error; the report then carries over to the next tick.
    pub fn tick(&mut self) -> Result<CycleReport, SchedulerError> {
        self.cycle += 1;
        self.report.cycle = self.cycle;
        let faults_before = self.report.faults.len();

        self.poll_triggers();
        self.run_periodic();

        // Commands admitted by trigger actions above first execute next tick
        let snapshot: Vec<CommandRef> = self
            .active
            .iter()
            .filter(|entry| entry.admitted < self.cycle)
            .map(|entry| entry.command.clone())
            .collect();
        for command in snapshot {
            // Preempted, cancelled or re-admitted earlier in this tick
            let Some(index) = self.position(&command) else {
                continue;
            };
            if self.active[index].admitted == self.cycle {
                continue;
            }
            let name = self.active[index].name.clone();

            if self.disabled && !self.active[index].runs_when_disabled {
                info!("[SCHED] Cancelling {}: robot disabled", name);
                self.retire(&command, Retirement::Interrupted);
                self.apply_requests();
                continue;
            }

            let step = guard(&name, FaultPhase::Execute, || command.borrow_mut().execute())
                .and_then(|()| {
                    guard(&name, FaultPhase::IsFinished, || Ok(command.borrow().is_finished()))
                });
            self.report.executed += 1;
            self.notify(ListenerKind::Execute, &name);

            match step {
                Ok(true) => {
                    self.retire(&command, Retirement::Finished);
                }
                Ok(false) => {}
                Err(fault) => {
                    self.retire_faulted(&command, fault.clone());
                    if self.config.fault_policy == FaultPolicy::Propagate {
                        self.apply_requests();
                        return Err(SchedulerError::CommandFault(fault));
                    }
                }
            }
            self.apply_requests();
        }

        self.schedule_defaults();

        if self.config.fault_policy == FaultPolicy::Propagate {
            if let Some(fault) = self.report.faults.get(faults_before).cloned() {
                return Err(SchedulerError::CommandFault(fault));
            }
        }
        Ok(std::mem::take(&mut self.report))
    }

    fn poll_triggers(&mut self) {
        // Actions borrow the scheduler mutably, so the bindings are taken out
        // while they run. Bindings added by actions land in `self.bindings`.
        let mut bindings = std::mem::take(&mut self.bindings);
        self.bindings_cleared = false;

        for binding in &mut bindings {
            let fired = panic::catch_unwind(AssertUnwindSafe(|| {
                let edge = binding.sample();
                binding.dispatch(edge, self)
            }));
            if let Err(payload) = fired {
                error!("[SCHED] Trigger binding panicked: {}", panic_message(&*payload));
            }
            self.apply_requests();
        }

        if !self.bindings_cleared {
            bindings.append(&mut self.bindings);
            self.bindings = bindings;
        }
    }

    fn run_periodic(&mut self) {
        for entry in &self.subsystems {
            let subsystem = entry.subsystem.clone();
            let result =
                panic::catch_unwind(AssertUnwindSafe(|| subsystem.borrow_mut().periodic()));
            if let Err(payload) = result {
                error!(
                    "[SCHED] Subsystem {} panicked in periodic: {}",
                    entry.name,
                    panic_message(&*payload)
                );
            }
        }
    }

    fn schedule_defaults(&mut self) {
        let idle: Vec<CommandRef> = self
            .subsystems
            .iter()
            .filter(|entry| !self.requirements.contains_key(&entry.id))
            .filter_map(|entry| entry.default_command.clone())
            .collect();

        for command in idle {
            if !self.is_scheduled(&command) {
                self.admit(&command);
                self.apply_requests();
            }
        }
    }

    /// Apply requests queued through `SchedulerHandle`s, including any that
    /// those requests queue in turn
    fn apply_requests(&mut self) {
        while let Some(request) = self.requests.pop() {
            match request {
                Request::Schedule(command) => {
                    self.admit(&command);
                }
                Request::Cancel(command) => {
                    self.retire(&command, Retirement::Interrupted);
                }
                Request::CancelAll => self.retire_all(),
            }
        }
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn position(&self, command: &CommandRef) -> Option<usize> {
        self.active
            .iter()
            .position(|entry| entry.command.ptr_eq(command))
    }

    fn registered(&self, id: SubsystemId) -> Option<&Registered> {
        self.subsystems.iter().find(|entry| entry.id == id)
    }

    fn registered_mut(&mut self, id: SubsystemId) -> Option<&mut Registered> {
        self.subsystems.iter_mut().find(|entry| entry.id == id)
    }

    fn notify(&mut self, kind: ListenerKind, name: &str) {
        let info = CommandInfo {
            name,
            cycle: self.cycle,
        };
        let listeners = match kind {
            ListenerKind::Initialize => &mut self.listeners.initialize,
            ListenerKind::Execute => &mut self.listeners.execute,
            ListenerKind::Interrupt => &mut self.listeners.interrupt,
            ListenerKind::Finish => &mut self.listeners.finish,
        };
        for listener in listeners {
            listener(&info);
        }
    }
}

impl Default for CommandScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[derive(Debug, Clone, Copy)]
enum ListenerKind {
    Initialize,
    Execute,
    Interrupt,
    Finish,
}

/// Run a command hook, turning error returns and panics into a fault
fn guard<T>(
    command: &str,
    phase: FaultPhase,
    hook: impl FnOnce() -> Result<T, CommandError>,
) -> Result<T, CommandFault> {
    let fault = |message: String| CommandFault {
        command: command.to_string(),
        phase,
        message,
    };
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(fault(err.to_string())),
        Err(payload) => Err(fault(format!("panicked: {}", panic_message(&*payload)))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
