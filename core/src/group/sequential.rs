//! Sequential command group

use super::{disjoint_union, union};
use crate::command::{Command, Requirements};
use crate::error::{CommandError, GroupError};

/// Runs its children one after another
///
/// Only the running child sees lifecycle calls. When a child finishes, the
/// next child is initialized within the same tick and gets its first
/// `execute` on the following tick.
pub struct SequentialGroup {
    commands: Vec<Box<dyn Command>>,
    /// Index of the running child; `None` before the group is initialized
    current: Option<usize>,
    requirements: Requirements,
    runs_when_disabled: bool,
}

impl SequentialGroup {
    /// Build a group, rejecting children that require the same subsystem
    pub fn new(commands: Vec<Box<dyn Command>>) -> Result<Self, GroupError> {
        let requirements = disjoint_union(&commands)?;
        Ok(Self::build(commands, requirements))
    }

    /// Build a group whose children are known not to overlap
    pub(crate) fn from_disjoint(commands: Vec<Box<dyn Command>>) -> Self {
        let requirements = union(&commands);
        Self::build(commands, requirements)
    }

    fn build(commands: Vec<Box<dyn Command>>, requirements: Requirements) -> Self {
        let runs_when_disabled = commands.iter().all(|c| c.runs_when_disabled());
        Self {
            commands,
            current: None,
            requirements,
            runs_when_disabled,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Index of the child currently in progress, if any
    pub fn current_index(&self) -> Option<usize> {
        self.current.filter(|&index| index < self.commands.len())
    }
}

impl Command for SequentialGroup {
    fn initialize(&mut self) -> Result<(), CommandError> {
        self.current = Some(0);
        match self.commands.first_mut() {
            Some(first) => first.initialize(),
            None => Ok(()),
        }
    }

    fn execute(&mut self) -> Result<(), CommandError> {
        let Some(index) = self.current_index() else {
            return Ok(());
        };

        let command = &mut self.commands[index];
        command.execute()?;
        if !command.is_finished() {
            return Ok(());
        }

        command.end(false);
        let next = index + 1;
        self.current = Some(next);
        match self.commands.get_mut(next) {
            Some(command) => command.initialize(),
            None => Ok(()),
        }
    }

    fn end(&mut self, interrupted: bool) {
        if let Some(index) = self.current_index() {
            self.commands[index].end(interrupted);
        }
        self.current = None;
    }

    fn is_finished(&self) -> bool {
        self.current
            .is_some_and(|index| index >= self.commands.len())
    }

    fn requirements(&self) -> Requirements {
        self.requirements.clone()
    }

    fn runs_when_disabled(&self) -> bool {
        self.runs_when_disabled
    }

    fn name(&self) -> &str {
        "SequentialGroup"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystem::{shared, Subsystem, SubsystemId};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Wheel;
    impl Subsystem for Wheel {}

    type Log = Rc<RefCell<Vec<String>>>;

    /// Records lifecycle calls and finishes after `steps` executes
    struct Step {
        label: &'static str,
        steps: u32,
        done: u32,
        log: Log,
        requirements: Requirements,
    }

    impl Step {
        fn boxed(label: &'static str, steps: u32, log: &Log) -> Box<dyn Command> {
            Box::new(Self {
                label,
                steps,
                done: 0,
                log: log.clone(),
                requirements: Requirements::new(),
            })
        }
    }

    impl Command for Step {
        fn initialize(&mut self) -> Result<(), CommandError> {
            self.done = 0;
            self.log.borrow_mut().push(format!("{}:init", self.label));
            Ok(())
        }

        fn execute(&mut self) -> Result<(), CommandError> {
            self.done += 1;
            self.log.borrow_mut().push(format!("{}:exec", self.label));
            Ok(())
        }

        fn end(&mut self, interrupted: bool) {
            self.log
                .borrow_mut()
                .push(format!("{}:end({})", self.label, interrupted));
        }

        fn is_finished(&self) -> bool {
            self.done >= self.steps
        }

        fn requirements(&self) -> Requirements {
            self.requirements.clone()
        }
    }

    #[test]
    fn test_children_run_in_order() {
        let log = Log::default();
        let mut group = SequentialGroup::new(vec![
            Step::boxed("a", 1, &log),
            Step::boxed("b", 1, &log),
            Step::boxed("c", 1, &log),
        ])
        .unwrap();

        group.initialize().unwrap();
        for _ in 0..3 {
            assert!(!group.is_finished());
            group.execute().unwrap();
        }
        assert!(group.is_finished());

        assert_eq!(
            *log.borrow(),
            vec![
                "a:init", "a:exec", "a:end(false)", "b:init", "b:exec", "b:end(false)",
                "c:init", "c:exec", "c:end(false)",
            ]
        );
    }

    #[test]
    fn test_interrupt_reaches_running_child_only() {
        let log = Log::default();
        let mut group = SequentialGroup::new(vec![
            Step::boxed("a", 1, &log),
            Step::boxed("b", 5, &log),
            Step::boxed("c", 1, &log),
        ])
        .unwrap();

        group.initialize().unwrap();
        group.execute().unwrap();
        group.execute().unwrap();
        assert_eq!(group.current_index(), Some(1));

        group.end(true);

        let log = log.borrow();
        assert_eq!(log.last().map(String::as_str), Some("b:end(true)"));
        assert!(!log.iter().any(|entry| entry.starts_with("c:")));
    }

    #[test]
    fn test_empty_group_finishes_after_initialize() {
        let mut group = SequentialGroup::new(Vec::new()).unwrap();
        assert!(!group.is_finished());
        group.initialize().unwrap();
        assert!(group.is_finished());
    }

    #[test]
    fn test_overlapping_children_rejected() {
        let wheel = shared(Wheel);
        let id = SubsystemId::of(&wheel);
        let log = Log::default();

        let mut first = Step {
            label: "a",
            steps: 1,
            done: 0,
            log: log.clone(),
            requirements: Requirements::new(),
        };
        first.requirements.insert(id);
        let mut second = Step {
            label: "b",
            steps: 1,
            done: 0,
            log,
            requirements: Requirements::new(),
        };
        second.requirements.insert(id);

        let result = SequentialGroup::new(vec![Box::new(first), Box::new(second)]);
        assert!(matches!(
            result,
            Err(GroupError::OverlappingRequirements { subsystem, .. }) if subsystem == id
        ));
    }

    #[test]
    fn test_requirements_are_union() {
        let left = shared(Wheel);
        let right = shared(Wheel);
        let log = Log::default();

        let mut first = Step {
            label: "a",
            steps: 1,
            done: 0,
            log: log.clone(),
            requirements: Requirements::new(),
        };
        first.requirements.insert(SubsystemId::of(&left));
        let mut second = Step {
            label: "b",
            steps: 1,
            done: 0,
            log,
            requirements: Requirements::new(),
        };
        second.requirements.insert(SubsystemId::of(&right));

        let group = SequentialGroup::new(vec![Box::new(first), Box::new(second)]).unwrap();
        assert_eq!(group.requirements().len(), 2);
    }
}
