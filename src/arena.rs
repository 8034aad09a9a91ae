use std::collections::HashMap;

use crate::types::{Block, BlockAux, Oid};

/// One retained block with its side-car state and the link to its prior.
#[derive(Clone, Debug)]
pub struct ChainedBlock {
    pub block: Block,
    pub aux: BlockAux,
    pub prior: Option<Oid>,
}

/// In-memory block DAG, keyed by oid. Replaces raw prior-block pointers
/// with oid links, so the "block in chain" test is a bounded walk over
/// arena lookups and pruning is a plain removal; a missing prior ends any
/// walk.
#[derive(Debug, Default)]
pub struct BlockArena {
    entries: HashMap<Oid, ChainedBlock>,
}

impl BlockArena {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Inserts a block under its aux oid, returning the oid. Re-inserting
    /// an oid replaces the entry.
    pub fn insert(&mut self, block: Block, aux: BlockAux, prior: Option<Oid>) -> Oid {
        let oid = aux.oid;
        self.entries.insert(oid, ChainedBlock { block, aux, prior });
        oid
    }

    pub fn get(&self, oid: &Oid) -> Option<&ChainedBlock> {
        self.entries.get(oid)
    }

    pub fn get_mut(&mut self, oid: &Oid) -> Option<&mut ChainedBlock> {
        self.entries.get_mut(oid)
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.entries.contains_key(oid)
    }

    pub fn prior_of(&self, oid: &Oid) -> Option<Oid> {
        self.entries.get(oid).and_then(|entry| entry.prior)
    }

    /// Installs the prior link without any parameter propagation (the
    /// restore path links blocks whose aux state is loaded from storage).
    pub fn set_prior(&mut self, oid: &Oid, prior: Option<Oid>) {
        if let Some(entry) = self.entries.get_mut(oid) {
            entry.prior = prior;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `find` appears in the prior chain of `top`, walking no deeper
    /// than `floor_level` (`None` walks to the chain end). The found block is
    /// compared before the floor check, mirroring the commit-side scan order.
    pub fn block_in_chain(&self, find: &Oid, top: &Oid, floor_level: Option<u64>) -> bool {
        let mut cursor = Some(*top);
        while let Some(oid) = cursor {
            let Some(entry) = self.entries.get(&oid) else {
                break;
            };
            if oid == *find {
                return true;
            }
            if let Some(floor) = floor_level {
                if entry.block.header().level <= floor {
                    break;
                }
            }
            cursor = entry.prior;
        }
        false
    }

    /// Drops every entry below `prune_level`, returning how many were
    /// removed. Entries above the cut keep their (now dangling) prior oids.
    pub fn prune_below(&mut self, prune_level: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.block.header().level >= prune_level);
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockWireHeader, Oid};

    fn entry(level: u64, tag: u8, prior: Option<Oid>) -> (Block, BlockAux, Option<Oid>) {
        let header = BlockWireHeader {
            signature: [0u8; 64],
            prior_oid: prior.unwrap_or(Oid::ZERO),
            level,
            timestamp: 0,
            witness: 0,
        };
        let block = Block::new(header, vec![tag]);
        let mut aux = BlockAux::new();
        block.set_or_verify_oid(&mut aux, true).unwrap();
        (block, aux, prior)
    }

    fn chain(arena: &mut BlockArena, levels: u64) -> Vec<Oid> {
        let mut oids = Vec::new();
        let mut prior = None;
        for level in 0..levels {
            let (block, aux, prior_link) = entry(level, level as u8, prior);
            let oid = arena.insert(block, aux, prior_link);
            oids.push(oid);
            prior = Some(oid);
        }
        oids
    }

    #[test]
    fn block_in_chain_respects_floor() {
        let mut arena = BlockArena::new();
        let oids = chain(&mut arena, 4);

        assert!(arena.block_in_chain(&oids[1], &oids[3], None));
        assert!(arena.block_in_chain(&oids[3], &oids[3], Some(2)));
        // below the floor: the walk stops at level 2 before reaching level 1
        assert!(!arena.block_in_chain(&oids[1], &oids[3], Some(2)));
        // the floor block itself is compared before the floor check
        assert!(arena.block_in_chain(&oids[2], &oids[3], Some(2)));
    }

    #[test]
    fn prune_removes_tail_and_ends_walks() {
        let mut arena = BlockArena::new();
        let oids = chain(&mut arena, 5);

        assert_eq!(arena.prune_below(2), 2);
        assert!(!arena.contains(&oids[0]));
        assert!(!arena.contains(&oids[1]));
        assert!(arena.contains(&oids[2]));
        // dangling prior link terminates the search without a match
        assert!(!arena.block_in_chain(&oids[0], &oids[4], None));
    }
}
