//! Binary SHA-256 Merkle trees over 64 KiB leaves.
//!
//! A chunk result is partitioned into fixed-size leaves; interior nodes
//! hash the concatenation of their children, and an odd node at any level
//! is promoted unchanged. Proofs walk sibling hashes from a leaf to the
//! root.

use sha2::{Digest, Sha256};
use weft_common::ContentHash;
use weft_protocol::{MerkleProof, ProofStep};

/// Leaf size used when partitioning result bytes.
pub const MERKLE_LEAF_BYTES: usize = 64 * 1024;

/// Merkle tree with every level retained so proofs can be extracted.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// levels[0] is the leaf level; the last level holds the root alone.
    levels: Vec<Vec<ContentHash>>,
}

impl MerkleTree {
    /// Build a tree over `data` partitioned into 64 KiB leaves. Empty data
    /// becomes a single empty leaf so every result has a root.
    pub fn build(data: &[u8]) -> Self {
        let leaves: Vec<ContentHash> = if data.is_empty() {
            vec![hash_leaf(&[])]
        } else {
            data.chunks(MERKLE_LEAF_BYTES).map(hash_leaf).collect()
        };

        let mut levels = vec![leaves];
        while levels.last().unwrap().len() > 1 {
            let previous = levels.last().unwrap();
            let mut next = Vec::with_capacity(previous.len().div_ceil(2));
            for pair in previous.chunks(2) {
                match pair {
                    [left, right] => next.push(hash_pair(left, right)),
                    // Odd node promoted unchanged.
                    [single] => next.push(*single),
                    _ => unreachable!(),
                }
            }
            levels.push(next);
        }
        Self { levels }
    }

    pub fn root(&self) -> ContentHash {
        self.levels.last().unwrap()[0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Inclusion proof for the leaf at `leaf_index`.
    pub fn proof_for(&self, leaf_index: usize) -> Option<MerkleProof> {
        if leaf_index >= self.leaf_count() {
            return None;
        }
        let mut path = Vec::new();
        let mut index = leaf_index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = index ^ 1;
            if sibling_index < level.len() {
                path.push(ProofStep {
                    sibling: level[sibling_index],
                    sibling_is_right: sibling_index > index,
                });
            }
            index /= 2;
        }
        Some(MerkleProof {
            leaf_index: leaf_index as u32,
            leaf_hash: self.levels[0][leaf_index],
            path,
            root: self.root(),
        })
    }
}

/// Recompute a proof's path and compare against its claimed root.
pub fn verify_proof(proof: &MerkleProof) -> bool {
    let mut running = proof.leaf_hash;
    for step in &proof.path {
        running = if step.sibling_is_right {
            hash_pair(&running, &step.sibling)
        } else {
            hash_pair(&step.sibling, &running)
        };
    }
    running == proof.root
}

/// Check that `data` is covered by `proof`: its first leaf hashes to the
/// proven leaf and the recomputed tree root matches the proof's root.
pub fn verify_data_against_proof(data: &[u8], proof: &MerkleProof) -> bool {
    let tree = MerkleTree::build(data);
    tree.root() == proof.root && verify_proof(proof)
}

fn hash_leaf(data: &[u8]) -> ContentHash {
    ContentHash::from_bytes(data)
}

fn hash_pair(left: &ContentHash, right: &ContentHash) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    ContentHash(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        let tree = MerkleTree::build(b"small");
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.root(), ContentHash::from_bytes(b"small"));
        let proof = tree.proof_for(0).unwrap();
        assert!(proof.path.is_empty());
        assert!(verify_proof(&proof));
    }

    #[test]
    fn multi_leaf_proofs_verify() {
        // Three leaves exercise the odd-promotion path.
        let data = vec![7u8; MERKLE_LEAF_BYTES * 2 + 100];
        let tree = MerkleTree::build(&data);
        assert_eq!(tree.leaf_count(), 3);
        for i in 0..3 {
            let proof = tree.proof_for(i).unwrap();
            assert!(verify_proof(&proof), "proof for leaf {i} failed");
            assert_eq!(proof.root, tree.root());
        }
        assert!(tree.proof_for(3).is_none());
    }

    #[test]
    fn tampered_proof_is_rejected() {
        let data = vec![1u8; MERKLE_LEAF_BYTES + 1];
        let tree = MerkleTree::build(&data);
        let mut proof = tree.proof_for(0).unwrap();
        proof.leaf_hash = ContentHash::from_bytes(b"other");
        assert!(!verify_proof(&proof));
    }

    #[test]
    fn data_must_match_proof_root() {
        let data = vec![2u8; MERKLE_LEAF_BYTES * 2];
        let tree = MerkleTree::build(&data);
        let proof = tree.proof_for(1).unwrap();
        assert!(verify_data_against_proof(&data, &proof));
        assert!(!verify_data_against_proof(b"different bytes", &proof));
    }

    #[test]
    fn empty_data_has_a_root() {
        let tree = MerkleTree::build(b"");
        assert_eq!(tree.leaf_count(), 1);
        let proof = tree.proof_for(0).unwrap();
        assert!(verify_data_against_proof(b"", &proof));
    }

    #[test]
    fn different_data_yields_different_roots() {
        let a = MerkleTree::build(&vec![0u8; MERKLE_LEAF_BYTES * 2]);
        let b = MerkleTree::build(&vec![1u8; MERKLE_LEAF_BYTES * 2]);
        assert_ne!(a.root(), b.root());
    }
}
