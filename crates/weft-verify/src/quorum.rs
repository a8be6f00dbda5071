//! Cross-checking of redundant results.
//!
//! When a chunk was executed by R distinct workers, the verified payloads
//! are compared bytewise. Unanimity accepts immediately; a strict majority
//! accepts the majority bytes and names the dissenters so the caller can
//! penalize them; anything else (including an R=2 split) is unresolved and
//! must be retried with a disjoint worker set.

use std::collections::HashMap;
use weft_common::{ContentHash, PeerId};

/// Outcome of comparing redundant results for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuorumOutcome {
    /// A (possibly unanimous) strict majority agreed on these bytes.
    Agreed {
        bytes: Vec<u8>,
        /// Workers whose bytes differed from the accepted majority.
        dissenters: Vec<PeerId>,
    },
    /// No strict majority; the chunk must be retried elsewhere.
    Unresolved,
}

/// Compare verified results from distinct workers.
pub fn resolve_redundant(results: &[(PeerId, Vec<u8>)]) -> QuorumOutcome {
    if results.is_empty() {
        return QuorumOutcome::Unresolved;
    }
    if results.len() == 1 {
        return QuorumOutcome::Agreed {
            bytes: results[0].1.clone(),
            dissenters: Vec::new(),
        };
    }

    // Group by payload hash; full bytes are compared only on the winner.
    let mut groups: HashMap<ContentHash, Vec<usize>> = HashMap::new();
    for (i, (_, bytes)) in results.iter().enumerate() {
        groups
            .entry(ContentHash::from_bytes(bytes))
            .or_default()
            .push(i);
    }

    let members = groups
        .into_values()
        .max_by_key(|members| members.len())
        .expect("non-empty results produce at least one group");

    // Strict majority: > R/2. An even split (R=2 tie included) never
    // accepts a coin flip, and tied groups can never both clear the bar.
    if members.len() * 2 <= results.len() {
        return QuorumOutcome::Unresolved;
    }

    let bytes = results[members[0]].1.clone();
    let dissenters = results
        .iter()
        .enumerate()
        .filter(|(i, _)| !members.contains(i))
        .map(|(_, (peer, _))| peer.clone())
        .collect();
    QuorumOutcome::Agreed { bytes, dissenters }
}
