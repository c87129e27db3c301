use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::anchor::LatticeAnchor;

/// A union-find structure over lattice anchors.
///
/// The solver keeps one of these per analysis state type: two anchors are placed in the same
/// class when an analysis can prove that the states attached to them necessarily hold identical
/// values under that state type, which lets the solver collapse their storage and dependency
/// tracking onto a single slot.
///
/// Each class remembers its members in insertion order, and the first member is the class leader:
/// all reads and writes for any member resolve to the leader's storage slot. Erasing the leader
/// promotes the next member in insertion order, so class membership is the durable fact, not the
/// identity of the leader.
#[derive(Default, Debug)]
pub struct EquivalenceClasses {
    /// Class membership, in insertion order; merged-away classes are left empty
    classes: Vec<SmallVec<[LatticeAnchor; 2]>>,
    index: FxHashMap<LatticeAnchor, u32>,
}

impl EquivalenceClasses {
    /// Returns true if `anchor` belongs to any class
    #[inline]
    pub fn contains(&self, anchor: LatticeAnchor) -> bool {
        self.index.contains_key(&anchor)
    }

    /// Get the leader of the class containing `anchor`, if it belongs to one
    pub fn find_leader(&self, anchor: LatticeAnchor) -> Option<LatticeAnchor> {
        let class = *self.index.get(&anchor)?;
        Some(self.classes[class as usize][0])
    }

    /// Returns true if `a` and `b` belong to the same class.
    ///
    /// Anchors that were never unioned with anything belong to no class, so this returns false
    /// even when `a == b` in that case, mirroring the membership-based contract of the original.
    pub fn is_equivalent(&self, a: LatticeAnchor, b: LatticeAnchor) -> bool {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Get the members of the class containing `anchor`, leader first
    pub fn members(&self, anchor: LatticeAnchor) -> &[LatticeAnchor] {
        match self.index.get(&anchor) {
            Some(&class) => &self.classes[class as usize],
            None => &[],
        }
    }

    /// Union the classes of `a` and `b`, inserting either as a singleton if not yet present.
    ///
    /// The leader of `a`'s class leads the merged class.
    pub fn union(&mut self, a: LatticeAnchor, b: LatticeAnchor) {
        let class_a = self.class_of(a);
        let class_b = self.class_of(b);
        if class_a == class_b {
            return;
        }
        let members = core::mem::take(&mut self.classes[class_b as usize]);
        for &member in members.iter() {
            self.index.insert(member, class_a);
        }
        self.classes[class_a as usize].extend(members);
    }

    /// Remove `anchor` from its class.
    ///
    /// If `anchor` was the leader of a class that still has other members, the next member in
    /// insertion order is promoted, and is returned so the caller can transfer any storage keyed
    /// by the old leader. Returns `None` if `anchor` was not a leader, led a singleton class, or
    /// belonged to no class at all.
    pub fn erase(&mut self, anchor: LatticeAnchor) -> Option<LatticeAnchor> {
        let class = self.index.remove(&anchor)?;
        let members = &mut self.classes[class as usize];
        let position = members.iter().position(|&member| member == anchor).unwrap();
        members.remove(position);
        if position == 0 {
            members.first().copied()
        } else {
            None
        }
    }

    fn class_of(&mut self, anchor: LatticeAnchor) -> u32 {
        if let Some(&class) = self.index.get(&anchor) {
            return class;
        }
        let class = self.classes.len() as u32;
        self.classes.push(SmallVec::from_slice(&[anchor]));
        self.index.insert(anchor, class);
        class
    }
}
