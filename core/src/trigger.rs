//! Triggers and button bindings
//!
//! A `Trigger` is a boolean condition (a button, a sensor threshold, a
//! robot-state predicate). A `Binding` samples one trigger once per tick,
//! classifies the change against the previous sample and fires the actions
//! bound to that kind of edge. Actions get the scheduler and usually
//! schedule or cancel a command.

use std::rc::Rc;

use crate::command::CommandRef;
use crate::scheduler::CommandScheduler;

/// A shareable boolean condition
#[derive(Clone)]
pub struct Trigger {
    condition: Rc<dyn Fn() -> bool>,
}

impl Trigger {
    pub fn new(condition: impl Fn() -> bool + 'static) -> Self {
        Self {
            condition: Rc::new(condition),
        }
    }

    /// Evaluate the condition now
    pub fn get(&self) -> bool {
        (self.condition)()
    }

    /// Active while both triggers are active
    pub fn and(&self, other: &Trigger) -> Trigger {
        let (a, b) = (self.clone(), other.clone());
        Trigger::new(move || a.get() && b.get())
    }

    /// Active while either trigger is active
    pub fn or(&self, other: &Trigger) -> Trigger {
        let (a, b) = (self.clone(), other.clone());
        Trigger::new(move || a.get() || b.get())
    }

    /// Active while this trigger is inactive
    pub fn negate(&self) -> Trigger {
        let a = self.clone();
        Trigger::new(move || !a.get())
    }
}

/// Transition between two consecutive samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// false -> false
    Low,
    /// false -> true
    Rising,
    /// true -> false
    Falling,
    /// true -> true
    High,
}

impl Edge {
    pub fn between(previous: bool, current: bool) -> Self {
        match (previous, current) {
            (false, false) => Edge::Low,
            (false, true) => Edge::Rising,
            (true, false) => Edge::Falling,
            (true, true) => Edge::High,
        }
    }
}

/// The kind of edge an action is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Rising,
    Falling,
    /// Either rising or falling
    Changed,
    /// Every sample while active
    WhileHigh,
    /// Every sample while inactive
    WhileLow,
}

impl EdgeKind {
    pub fn matches(self, edge: Edge) -> bool {
        match self {
            EdgeKind::Rising => edge == Edge::Rising,
            EdgeKind::Falling => edge == Edge::Falling,
            EdgeKind::Changed => matches!(edge, Edge::Rising | Edge::Falling),
            EdgeKind::WhileHigh => matches!(edge, Edge::Rising | Edge::High),
            EdgeKind::WhileLow => matches!(edge, Edge::Falling | Edge::Low),
        }
    }
}

/// Action fired by a binding
pub type TriggerAction = Box<dyn FnMut(&mut CommandScheduler)>;

/// A trigger plus the actions bound to its edges
///
/// The remembered sample starts out `false`, so a condition that is already
/// active on the first tick fires its rising-edge actions.
pub struct Binding {
    trigger: Trigger,
    previous: bool,
    actions: Vec<(EdgeKind, TriggerAction)>,
}

impl Binding {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            previous: false,
            actions: Vec::new(),
        }
    }

    /// Bind an arbitrary action to an edge kind
    pub fn on(
        mut self,
        kind: EdgeKind,
        action: impl FnMut(&mut CommandScheduler) + 'static,
    ) -> Self {
        self.actions.push((kind, Box::new(action)));
        self
    }

    /// Flip an internal flag on every `kind` edge, firing `on` when it becomes
    /// set and `off` when it becomes clear
    pub fn toggle(
        self,
        kind: EdgeKind,
        mut on: impl FnMut(&mut CommandScheduler) + 'static,
        mut off: impl FnMut(&mut CommandScheduler) + 'static,
    ) -> Self {
        let mut active = false;
        self.on(kind, move |scheduler| {
            active = !active;
            if active {
                on(scheduler);
            } else {
                off(scheduler);
            }
        })
    }

    /// Schedule `command` when the trigger becomes active
    pub fn when_active(self, command: CommandRef) -> Self {
        self.on(EdgeKind::Rising, move |scheduler| {
            scheduler.schedule(&command);
        })
    }

    /// Schedule `command` when the trigger becomes inactive
    pub fn when_inactive(self, command: CommandRef) -> Self {
        self.on(EdgeKind::Falling, move |scheduler| {
            scheduler.schedule(&command);
        })
    }

    /// Keep re-submitting `command` while active; cancel it on release
    pub fn while_active_continuous(self, command: CommandRef) -> Self {
        let cancel = command.clone();
        self.on(EdgeKind::WhileHigh, move |scheduler| {
            scheduler.schedule(&command);
        })
        .on(EdgeKind::Falling, move |scheduler| {
            scheduler.cancel(&cancel);
        })
    }

    /// Schedule `command` once when active; cancel it on release
    pub fn while_active_once(self, command: CommandRef) -> Self {
        let cancel = command.clone();
        self.on(EdgeKind::Rising, move |scheduler| {
            scheduler.schedule(&command);
        })
        .on(EdgeKind::Falling, move |scheduler| {
            scheduler.cancel(&cancel);
        })
    }

    /// Alternate between scheduling and cancelling `command` on each activation
    pub fn toggle_when_active(self, command: CommandRef) -> Self {
        let cancel = command.clone();
        self.toggle(
            EdgeKind::Rising,
            move |scheduler| {
                scheduler.schedule(&command);
            },
            move |scheduler| {
                scheduler.cancel(&cancel);
            },
        )
    }

    /// Cancel `command` when the trigger becomes active
    pub fn cancel_when_active(self, command: CommandRef) -> Self {
        self.on(EdgeKind::Rising, move |scheduler| {
            scheduler.cancel(&command);
        })
    }

    pub fn when_pressed(self, command: CommandRef) -> Self {
        self.when_active(command)
    }

    pub fn when_released(self, command: CommandRef) -> Self {
        self.when_inactive(command)
    }

    pub fn while_held(self, command: CommandRef) -> Self {
        self.while_active_continuous(command)
    }

    pub fn when_held(self, command: CommandRef) -> Self {
        self.while_active_once(command)
    }

    pub fn toggle_when_pressed(self, command: CommandRef) -> Self {
        self.toggle_when_active(command)
    }

    pub fn cancel_when_pressed(self, command: CommandRef) -> Self {
        self.cancel_when_active(command)
    }

    /// Take a new sample and return the edge since the previous one
    pub fn sample(&mut self) -> Edge {
        let current = self.trigger.get();
        let edge = Edge::between(self.previous, current);
        self.previous = current;
        edge
    }

    /// Fire every action bound to a kind matching `edge`; returns how many fired
    pub(crate) fn dispatch(&mut self, edge: Edge, scheduler: &mut CommandScheduler) -> usize {
        let mut fired = 0;
        for (kind, action) in &mut self.actions {
            if kind.matches(edge) {
                action(scheduler);
                fired += 1;
            }
        }
        fired
    }
}
