//! The EVSIDS branching heuristic.
//!
//! Keeps an exponentially decaying activity per variable. Variables involved in a conflict are
//! bumped; decisions branch on the unassigned variable of highest activity, found through an
//! indexed max-heap.
//!
//! Instead of decaying every activity after each conflict, the bump value is divided by the decay
//! factor, which is equivalent up to a shared scaling factor. When a value would leave the f32
//! range, all activities and the bump value are rescaled; since only the order of activities
//! matters this does not change any decision.
use ordered_float::OrderedFloat;

use ferrosat_formula::Var;

use crate::config::SolverConfig;

/// The EVSIDS branching heuristic.
pub struct Vsids {
    /// The activity of each variable.
    activity: Vec<OrderedFloat<f32>>,
    /// Binary max-heap of variables, ordered by activity.
    heap: Vec<Var>,
    /// Position of each variable in `heap`, if present.
    position: Vec<Option<usize>>,
    /// The value added on bumping.
    bump: f32,
    /// The inverse of the decay factor.
    inv_decay: f32,
}

impl Default for Vsids {
    fn default() -> Vsids {
        Vsids {
            activity: vec![],
            heap: vec![],
            position: vec![],
            bump: 1.0,
            inv_decay: 1.0 / SolverConfig::default().vsids_decay,
        }
    }
}

impl Vsids {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        let old_count = self.activity.len();
        debug_assert!(!self.heap.iter().any(|&v| v.index() >= count));
        self.activity.resize(count, OrderedFloat(0.0));
        self.position.resize(count, None);

        for index in old_count..count {
            self.make_available(Var::from_index(index));
        }
    }

    /// Rescale activities if any value exceeds this value.
    fn rescale_limit() -> f32 {
        std::f32::MAX / 16.0
    }

    /// Change the decay factor.
    pub fn set_decay(&mut self, decay: f32) {
        assert!(decay < 1.0);
        assert!(decay > 1.0 / 16.0);
        self.inv_decay = 1.0 / decay;
    }

    /// The activity of a variable.
    pub fn activity(&self, var: Var) -> f32 {
        self.activity[var.index()].0
    }

    /// Bump a variable by increasing its activity.
    pub fn bump(&mut self, var: Var) {
        let rescale = {
            let value = &mut self.activity[var.index()];
            value.0 += self.bump;
            value.0 >= Self::rescale_limit()
        };
        if rescale {
            self.rescale();
        }
        if let Some(pos) = self.position[var.index()] {
            self.sift_up(pos);
        }
    }

    /// Decay all variable activities.
    pub fn decay(&mut self) {
        self.bump *= self.inv_decay;
        if self.bump >= Self::rescale_limit() {
            self.rescale();
        }
    }

    /// Rescale all values to avoid an overflow.
    fn rescale(&mut self) {
        let rescale_factor = 1.0 / Self::rescale_limit();
        for activity in &mut self.activity {
            activity.0 *= rescale_factor;
        }
        self.bump *= rescale_factor;
    }

    /// Insert a variable into the heap if not already present.
    pub fn make_available(&mut self, var: Var) {
        if self.position[var.index()].is_none() {
            let position = self.heap.len();
            self.position[var.index()] = Some(position);
            self.heap.push(var);
            self.sift_up(position);
        }
    }

    /// Remove and return the variable of highest activity.
    pub fn pop(&mut self) -> Option<Var> {
        if self.heap.is_empty() {
            return None;
        }
        let var = self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            let top_var = self.heap[0];
            self.position[top_var.index()] = Some(0);
            self.sift_down(0);
        }
        self.position[var.index()] = None;
        Some(var)
    }

    /// Remove a variable from the heap, e.g. when it leaves the formula.
    pub fn remove(&mut self, var: Var) {
        if let Some(pos) = self.position[var.index()] {
            let last = self.heap.len() - 1;
            self.heap.swap(pos, last);
            self.heap.pop();
            self.position[var.index()] = None;
            if pos <= last && pos < self.heap.len() {
                let moved = self.heap[pos];
                self.position[moved.index()] = Some(pos);
                self.sift_down(pos);
                self.sift_up(self.position[moved.index()].unwrap());
            }
        }
    }

    /// Move a variable towards the root until the heap property holds.
    fn sift_up(&mut self, mut pos: usize) {
        let var = self.heap[pos];
        while pos != 0 {
            let parent_pos = (pos - 1) / 2;
            let parent_var = self.heap[parent_pos];
            if self.activity[parent_var.index()] >= self.activity[var.index()] {
                return;
            }
            self.position[var.index()] = Some(parent_pos);
            self.heap[parent_pos] = var;
            self.position[parent_var.index()] = Some(pos);
            self.heap[pos] = parent_var;
            pos = parent_pos;
        }
    }

    /// Move a variable away from the root until the heap property holds.
    fn sift_down(&mut self, mut pos: usize) {
        let var = self.heap[pos];
        loop {
            let mut largest_pos = pos;
            let mut largest_var = var;

            for child_pos in [pos * 2 + 1, pos * 2 + 2].iter().cloned() {
                if child_pos < self.heap.len() {
                    let child_var = self.heap[child_pos];
                    if self.activity[largest_var.index()] < self.activity[child_var.index()] {
                        largest_pos = child_pos;
                        largest_var = child_var;
                    }
                }
            }

            if largest_pos == pos {
                return;
            }

            self.position[var.index()] = Some(largest_pos);
            self.heap[largest_pos] = var;
            self.position[largest_var.index()] = Some(pos);
            self.heap[pos] = largest_var;
            pos = largest_pos;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_pops_in_activity_order() {
        let mut vsids = Vsids::default();
        vsids.set_var_count(8);

        while vsids.pop().is_some() {}

        for i in 0..8 {
            for _ in 0..i {
                vsids.bump(Var::from_index(i));
            }
        }

        for i in 0..8 {
            vsids.make_available(Var::from_index((i * 5) % 8));
        }

        for i in (0..8).rev() {
            assert_eq!(vsids.pop(), Some(Var::from_index(i)));
        }
        assert_eq!(vsids.pop(), None);
    }

    #[test]
    fn decay_prefers_recent_bumps() {
        let mut vsids = Vsids::default();
        vsids.set_var_count(2);
        vsids.set_decay(0.5);

        vsids.bump(Var::from_index(0));
        vsids.decay();
        vsids.bump(Var::from_index(1));

        // Variable 1 was bumped after the decay, so its activity is larger.
        assert_eq!(vsids.pop(), Some(Var::from_index(1)));
        assert_eq!(vsids.pop(), Some(Var::from_index(0)));
    }

    #[test]
    fn rescale_keeps_order() {
        let mut vsids = Vsids::default();
        vsids.set_var_count(4);
        vsids.set_decay(1.0 / 8.0);

        for i in 0..4 {
            for _ in 0..i {
                vsids.bump(Var::from_index(i));
            }
        }

        for _ in 0..60 {
            vsids.decay();
        }

        for _ in 0..30 {
            vsids.bump(Var::from_index(3));
        }

        assert!(vsids.activity(Var::from_index(3)) > vsids.activity(Var::from_index(2)));
        assert!(vsids.activity(Var::from_index(2)) > vsids.activity(Var::from_index(1)));
    }

    #[test]
    fn remove_keeps_heap_consistent() {
        let mut vsids = Vsids::default();
        vsids.set_var_count(8);

        for i in 0..8 {
            for _ in 0..i {
                vsids.bump(Var::from_index(i));
            }
        }

        vsids.remove(Var::from_index(7));
        vsids.remove(Var::from_index(3));
        vsids.remove(Var::from_index(3));

        let mut popped = vec![];
        while let Some(var) = vsids.pop() {
            popped.push(var.index());
        }
        assert_eq!(popped, vec![6, 5, 4, 2, 1, 0]);
    }
}
