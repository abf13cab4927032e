//! Command groups
//!
//! Groups compose child commands into a single command. The group requires
//! the union of its children's subsystems and owns the children by value, so
//! a grouped command can never be scheduled on its own.

mod parallel;
mod sequential;

pub use parallel::{Completion, ParallelGroup};
pub use sequential::SequentialGroup;

use std::collections::BTreeMap;

use crate::command::{Command, Requirements};
use crate::error::GroupError;

/// Union of the children's requirements, rejecting any subsystem claimed twice
fn disjoint_union(children: &[Box<dyn Command>]) -> Result<Requirements, GroupError> {
    let mut owners: BTreeMap<_, String> = BTreeMap::new();

    for child in children {
        for subsystem in child.requirements() {
            if let Some(first) = owners.get(&subsystem) {
                return Err(GroupError::OverlappingRequirements {
                    first: first.clone(),
                    second: child.name().to_string(),
                    subsystem,
                });
            }
            owners.insert(subsystem, child.name().to_string());
        }
    }

    Ok(owners.into_keys().collect())
}

/// Union of the children's requirements without the overlap check
fn union(children: &[Box<dyn Command>]) -> Requirements {
    children
        .iter()
        .flat_map(|child| child.requirements())
        .collect()
}
