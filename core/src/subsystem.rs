//! Subsystems: exclusively-ownable robot resources
//!
//! A subsystem is shared between the scheduler (which calls `periodic`) and
//! the commands that drive it, so it lives behind `Rc<RefCell<_>>`. The
//! address of that shared handle is its identity.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a subsystem
pub type SubsystemRef<S> = Rc<RefCell<S>>;

/// One exclusive physical resource (drivetrain, lift, claw, ...)
pub trait Subsystem {
    /// Called once per tick for every registered subsystem, whether or not a
    /// command currently owns it
    fn periodic(&mut self) {}

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Wrap a subsystem into a shared handle
pub fn shared<S: Subsystem>(subsystem: S) -> SubsystemRef<S> {
    Rc::new(RefCell::new(subsystem))
}

/// Identity of a subsystem, used as the key of the requirements map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubsystemId(usize);

impl SubsystemId {
    /// Identity of the subsystem behind `handle`
    pub fn of<S: ?Sized>(handle: &Rc<RefCell<S>>) -> Self {
        Self(Rc::as_ptr(handle) as *const () as usize)
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:x}", self.0)
    }
}
