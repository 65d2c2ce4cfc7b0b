use crate::constraint::ConstraintCheckpoint;
use loom_engine::Checkpoint;

/// One untried alternative at a choice point: a goal-resolution strategy
/// stores whatever it needs to retry with the next candidate. The
/// resolver's only two producers of alternatives are "the next matching
/// resource/rule" and "the next clause of a disjunction", so a plain
/// index into a precomputed candidate list covers both (§4.I).
#[derive(Clone, Debug)]
pub struct Alternative {
    pub index: usize,
}

/// Captures enough state to retry a choice with its next alternative
/// (§4.I). `parent` links to the choice point that was live when this one
/// was pushed, so `backtrack` can walk back across failed branches without
/// the resolver needing an explicit call stack of its own.
pub struct ChoicePoint {
    trail_checkpoint: Checkpoint,
    constraint_checkpoint: ConstraintCheckpoint,
    alternatives: Vec<Alternative>,
    cursor: usize,
    pub parent: Option<Box<ChoicePoint>>,
}

impl ChoicePoint {
    pub fn new(
        trail_checkpoint: Checkpoint,
        constraint_checkpoint: ConstraintCheckpoint,
        alternatives: Vec<Alternative>,
        parent: Option<Box<ChoicePoint>>,
    ) -> Self {
        ChoicePoint {
            trail_checkpoint,
            constraint_checkpoint,
            alternatives,
            cursor: 0,
            parent,
        }
    }

    /// The alternative to try next, if any remain.
    pub fn current(&self) -> Option<&Alternative> {
        self.alternatives.get(self.cursor)
    }

    pub fn has_more(&self) -> bool {
        self.cursor < self.alternatives.len()
    }

    /// Advances past the alternative just tried, returning its index.
    pub fn advance(&mut self) -> usize {
        let idx = self.alternatives[self.cursor].index;
        self.cursor += 1;
        idx
    }

    pub fn trail_checkpoint(&self) -> Checkpoint {
        self.trail_checkpoint
    }

    pub fn constraint_checkpoint(&self) -> &ConstraintCheckpoint {
        &self.constraint_checkpoint
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use loom_engine::LinearTrail;

    #[test]
    fn exhausting_alternatives_reports_no_more() {
        let mut trail = LinearTrail::new();
        let cp = trail.checkpoint();
        let cc = ConstraintCheckpoint::empty();
        let mut point = ChoicePoint::new(
            cp,
            cc,
            vec![Alternative { index: 0 }, Alternative { index: 1 }],
            None,
        );
        assert!(point.has_more());
        assert_eq!(point.advance(), 0);
        assert!(point.has_more());
        assert_eq!(point.advance(), 1);
        assert!(!point.has_more());
    }
}
