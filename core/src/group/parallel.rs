//! Parallel, race and deadline command groups

use super::{disjoint_union, union};
use crate::command::{Command, Requirements};
use crate::error::{CommandError, GroupError};

/// When a parallel group counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every child has finished
    All,
    /// Any child has finished (race)
    Any,
    /// The first child (the deadline) has finished
    Deadline,
}

struct Child {
    command: Box<dyn Command>,
    running: bool,
}

/// Runs all children on every tick
///
/// Children that finish are ended with `end(false)` as they finish; children
/// still running when the group ends get `end(true)`.
pub struct ParallelGroup {
    children: Vec<Child>,
    completion: Completion,
    finished: bool,
    requirements: Requirements,
    runs_when_disabled: bool,
}

impl ParallelGroup {
    /// Finishes when all children have finished
    pub fn new(commands: Vec<Box<dyn Command>>) -> Result<Self, GroupError> {
        let requirements = disjoint_union(&commands)?;
        Ok(Self::build(commands, Completion::All, requirements))
    }

    /// Finishes as soon as any child finishes
    pub fn race(commands: Vec<Box<dyn Command>>) -> Result<Self, GroupError> {
        let requirements = disjoint_union(&commands)?;
        Ok(Self::build(commands, Completion::Any, requirements))
    }

    /// Finishes when `deadline` finishes, interrupting the others
    pub fn deadline(
        deadline: Box<dyn Command>,
        others: Vec<Box<dyn Command>>,
    ) -> Result<Self, GroupError> {
        let mut commands = vec![deadline];
        commands.extend(others);
        let requirements = disjoint_union(&commands)?;
        Ok(Self::build(commands, Completion::Deadline, requirements))
    }

    pub(crate) fn from_disjoint(commands: Vec<Box<dyn Command>>, completion: Completion) -> Self {
        let requirements = union(&commands);
        Self::build(commands, completion, requirements)
    }

    fn build(
        commands: Vec<Box<dyn Command>>,
        completion: Completion,
        requirements: Requirements,
    ) -> Self {
        let runs_when_disabled = commands.iter().all(|c| c.runs_when_disabled());
        Self {
            children: commands
                .into_iter()
                .map(|command| Child {
                    command,
                    running: false,
                })
                .collect(),
            completion,
            finished: false,
            requirements,
            runs_when_disabled,
        }
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }

    /// Number of children still in progress
    pub fn running_count(&self) -> usize {
        self.children.iter().filter(|c| c.running).count()
    }
}

impl Command for ParallelGroup {
    fn initialize(&mut self) -> Result<(), CommandError> {
        self.finished = self.children.is_empty();
        for child in &mut self.children {
            // Marked first so a failed initialize still gets its end(true)
            child.running = true;
            child.command.initialize()?;
        }
        Ok(())
    }

    fn execute(&mut self) -> Result<(), CommandError> {
        for (index, child) in self.children.iter_mut().enumerate() {
            if !child.running {
                continue;
            }
            child.command.execute()?;
            if child.command.is_finished() {
                child.command.end(false);
                child.running = false;

                match self.completion {
                    Completion::Any => self.finished = true,
                    Completion::Deadline if index == 0 => self.finished = true,
                    _ => {}
                }
            }
        }

        if self.completion == Completion::All && self.children.iter().all(|c| !c.running) {
            self.finished = true;
        }
        Ok(())
    }

    fn end(&mut self, _interrupted: bool) {
        for child in &mut self.children {
            if child.running {
                child.command.end(true);
                child.running = false;
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn requirements(&self) -> Requirements {
        self.requirements.clone()
    }

    fn runs_when_disabled(&self) -> bool {
        self.runs_when_disabled
    }

    fn name(&self) -> &str {
        match self.completion {
            Completion::All => "ParallelGroup",
            Completion::Any => "RaceGroup",
            Completion::Deadline => "DeadlineGroup",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystem::{shared, Subsystem, SubsystemId};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Counted {
        label: &'static str,
        steps: u32,
        done: u32,
        log: Log,
    }

    fn counted(label: &'static str, steps: u32, log: &Log) -> Box<dyn Command> {
        Box::new(Counted {
            label,
            steps,
            done: 0,
            log: log.clone(),
        })
    }

    impl Command for Counted {
        fn initialize(&mut self) -> Result<(), CommandError> {
            self.done = 0;
            Ok(())
        }

        fn execute(&mut self) -> Result<(), CommandError> {
            self.done += 1;
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
            Requirements::new()
        }
    }

    fn run_until_finished(group: &mut ParallelGroup, limit: u32) -> u32 {
        group.initialize().unwrap();
        let mut ticks = 0;
        while !group.is_finished() && ticks < limit {
            group.execute().unwrap();
            ticks += 1;
        }
        ticks
    }

    #[test]
    fn test_parallel_waits_for_all() {
        let log = Log::default();
        let mut group =
            ParallelGroup::new(vec![counted("a", 1, &log), counted("b", 3, &log)]).unwrap();

        assert_eq!(run_until_finished(&mut group, 10), 3);
        group.end(false);
        assert_eq!(*log.borrow(), vec!["a:end(false)", "b:end(false)"]);
    }

    #[test]
    fn test_race_stops_at_first_finisher() {
        let log = Log::default();
        let mut group =
            ParallelGroup::race(vec![counted("slow", 5, &log), counted("fast", 2, &log)]).unwrap();

        assert_eq!(run_until_finished(&mut group, 10), 2);
        assert_eq!(group.running_count(), 1);
        group.end(false);
        assert_eq!(*log.borrow(), vec!["fast:end(false)", "slow:end(true)"]);
        assert_eq!(group.name(), "RaceGroup");
    }

    #[test]
    fn test_deadline_ignores_other_finishers() {
        let log = Log::default();
        let others = vec![counted("other", 1, &log), counted("long", 9, &log)];
        let mut group = ParallelGroup::deadline(counted("deadline", 3, &log), others).unwrap();

        assert_eq!(run_until_finished(&mut group, 10), 3);
        group.end(false);
        assert_eq!(
            *log.borrow(),
            vec!["other:end(false)", "deadline:end(false)", "long:end(true)"]
        );
    }

    #[test]
    fn test_interrupted_group_ends_running_children() {
        let log = Log::default();
        let mut group =
            ParallelGroup::new(vec![counted("a", 4, &log), counted("b", 4, &log)]).unwrap();

        group.initialize().unwrap();
        group.execute().unwrap();
        group.end(true);

        assert_eq!(*log.borrow(), vec!["a:end(true)", "b:end(true)"]);
        assert_eq!(group.running_count(), 0);
    }

    struct Lift;
    impl Subsystem for Lift {}

    #[test]
    fn test_overlap_rejected() {
        let lift = shared(Lift);
        let id = SubsystemId::of(&lift);
        let a = crate::command::RunCommand::new(|| {}).requiring([id]);
        let b = crate::command::RunCommand::new(|| {}).requiring([id]);

        assert!(ParallelGroup::new(vec![Box::new(a), Box::new(b)]).is_err());
    }
}
