use std::cmp::Ordering;

use tracing::trace;

use crate::arena::BlockArena;
use crate::errors::{ChainError, ChainResult};
use crate::types::{Oid, WitnessParams};

/// Number of witness slots bypassed between the previous block's producer
/// and this block's producer; 0 means direct successor.
pub fn compute_skip(prev_witness: u16, next_witness: u16, nwitnesses: u16) -> u16 {
    let n = nwitnesses as i32;
    (next_witness as i32 - prev_witness as i32 - 1).rem_euclid(n) as u16
}

/// Bits one block's skip contribution occupies in the packed score.
pub fn bits_for(nwitnesses: u16) -> u16 {
    let spread = nwitnesses.max(2) - 1;
    (16 - spread.leading_zeros()) as u16
}

/// Aggregate skip score of a chain tail. Lower is better; comparison is
/// lexicographic on `(score, bits)`. Field order matters for the derived
/// ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SkipScore {
    pub score: u64,
    pub bits: u16,
}

impl SkipScore {
    pub fn zero() -> Self {
        Self::default()
    }

    fn push(&mut self, contribution: u16, nbits: u16) {
        let mask = (1u64 << nbits) - 1;
        self.score = (self.score << nbits) | (contribution as u64).min(mask);
        self.bits = self.bits.saturating_add(nbits);
    }
}

/// Deterministic fork choice between two scored tips: lower score wins, and
/// a full tie goes to the lexicographically smaller oid.
pub fn preferred_tip<'a>(a: (&'a Oid, SkipScore), b: (&'a Oid, SkipScore)) -> &'a Oid {
    match a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)) {
        Ordering::Less | Ordering::Equal => a.0,
        Ordering::Greater => b.0,
    }
}

/// Skip score of the chain from `tip` back to (but not including) the last
/// indelible block, plus the prospective block `top_witness` would add on
/// top. `genstamp` tags the fork-choice round: matching per-block caches are
/// reused, stale ones are recomputed and refreshed. `maltest` charges the
/// candidate one extra increment, modelling adversarial behavior in
/// simulation runs.
pub fn calc_skip_score(
    arena: &mut BlockArena,
    tip: &Oid,
    top_witness: u16,
    last_indelible_level: Option<u64>,
    genstamp: u16,
    maltest: bool,
) -> ChainResult<SkipScore> {
    // walk down to the first cached score (or the chain bottom), then fold
    // back up so deeper blocks land in the more significant bits
    let mut pending: Vec<Oid> = Vec::new();
    let mut acc = SkipScore::zero();
    let mut cursor = Some(*tip);
    while let Some(oid) = cursor {
        let Some(entry) = arena.get(&oid) else {
            break;
        };
        if let Some(floor) = last_indelible_level {
            if entry.block.header().level <= floor {
                break;
            }
        }
        if let Some(params) = &entry.aux.witness_params {
            if params.score_genstamp == genstamp && genstamp != 0 {
                acc = SkipScore {
                    score: params.score,
                    bits: params.score_bits,
                };
                break;
            }
        }
        pending.push(oid);
        cursor = entry.prior;
    }

    for oid in pending.iter().rev() {
        let entry = arena
            .get_mut(oid)
            .ok_or_else(|| ChainError::Transaction("block missing from arena".into()))?;
        let nbits = bits_for(entry.aux.chain_params.nwitnesses);
        acc.push(entry.aux.skip, nbits);
        let params = entry.aux.witness_params.get_or_insert_with(WitnessParams::new);
        params.score = acc.score;
        params.score_bits = acc.bits;
        params.score_genstamp = genstamp;
    }

    let tip_entry = arena
        .get(tip)
        .ok_or_else(|| ChainError::Transaction("tip missing from arena".into()))?;
    let params = tip_entry.aux.chain_params.child_params();
    let mut contribution = compute_skip(
        tip_entry.block.header().witness as u16,
        top_witness,
        params.nwitnesses,
    );
    if maltest {
        contribution = contribution.saturating_add(1);
    }
    acc.push(contribution, bits_for(params.nwitnesses));

    trace!(
        tip = %tip,
        top_witness,
        score = acc.score,
        bits = acc.bits,
        "skip score"
    );
    Ok(acc)
}

/// True when signing `top_witness` atop `tip` would put the same witness in
/// two positions closer than the sig-order bound within the last
/// `nconfsigs + 1` blocks, a malicious double-sign pattern.
pub fn check_bad_sig_order(arena: &BlockArena, tip: &Oid, top_witness: u16) -> bool {
    let Some(tip_entry) = arena.get(tip) else {
        return false;
    };
    let bound = tip_entry.aux.chain_params.sig_order_bound() as usize;
    let window = tip_entry.aux.chain_params.nconfsigs as usize + 1;

    let mut witnesses: Vec<u16> = Vec::with_capacity(window);
    witnesses.push(top_witness);
    let mut cursor = Some(*tip);
    while witnesses.len() < window {
        let Some(oid) = cursor else { break };
        let Some(entry) = arena.get(&oid) else { break };
        witnesses.push(entry.block.header().witness as u16);
        cursor = entry.prior;
    }

    for i in 0..witnesses.len() {
        for j in i + 1..witnesses.len() {
            if witnesses[i] == witnesses[j] && j - i < bound {
                return true;
            }
        }
    }
    false
}
