//! Batch Merkle tree over forensic leaf hashes.
//!
//! Shaped after `bpi-merkle` (`MerkleTree::new`/`root`/`proof`,
//! `MerkleProof::verify`, last-leaf duplication on odd counts) but
//! combining nodes the way the forensic anchor's Python ancestor does:
//! hashing the *hex-string* concatenation of two children rather than
//! their raw bytes, so on-disk anchors stay byte-compatible with
//! `original_source/merkle_anchor.py`.

use sensor_crypto::sha256_hex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("empty tree cannot compute root")]
    EmptyTree,
    #[error("leaf index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Combines two hex-encoded child hashes into their parent's hex hash.
///
/// The combination is order-independent: siblings are sorted before
/// concatenation. This is what makes `MerkleProof::verify` - which
/// receives no left/right information, per spec - correct for every
/// leaf regardless of which side of its pair it sat on; the original
/// prototype has no per-leaf proof mechanism at all to match against
/// (it only ever recomputes the whole root), so this ordering is our
/// own choice rather than an interop constraint. Documented as a
/// resolved Open Question in DESIGN.md.
fn combine(a: &str, b: &str) -> String {
    let (left, right) = if a <= b { (a, b) } else { (b, a) };
    let mut combined = String::with_capacity(left.len() + right.len());
    combined.push_str(left);
    combined.push_str(right);
    sha256_hex(combined.as_bytes())
}

/// An inclusion proof: the leaf's own hash plus one sibling hash per
/// tree level, ordered from the leaf upward. No left/right flag is
/// recorded (direction-unaware, per spec).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_hash: String,
    pub siblings: Vec<String>,
}

impl MerkleProof {
    /// Verifies this proof reconstructs `root`.
    pub fn verify(&self, root: &str) -> bool {
        verify_proof(root, &self.leaf_hash, &self.siblings)
    }
}

/// Standalone verification entry point matching spec.md's
/// `verify_proof(root, leaf, proof)` signature.
pub fn verify_proof(root: &str, leaf: &str, proof: &[String]) -> bool {
    let mut h = leaf.to_string();
    for sibling in proof {
        h = combine(&h, sibling);
    }
    h == root
}

/// A batch Merkle tree built from an ordered snapshot of leaf hashes.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Level 0 is the (possibly duplicated) leaves; the last level is
    /// the single-element root.
    levels: Vec<Vec<String>>,
    /// Leaf count as received, before any duplication padding.
    original_leaf_count: usize,
}

impl MerkleTree {
    /// Builds a tree from an ordered list of hex leaf hashes.
    pub fn build(leaves: Vec<String>) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyTree);
        }
        let original_leaf_count = leaves.len();

        let mut level = leaves;
        pad_to_even(&mut level);
        let mut levels = vec![level.clone()];

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                next.push(combine(&pair[0], &pair[1]));
            }
            pad_to_even(&mut next);
            levels.push(next.clone());
            level = next;
        }

        Ok(Self { levels, original_leaf_count })
    }

    /// The Merkle root, hex-encoded.
    pub fn root(&self) -> String {
        self.levels.last().expect("levels always has at least one entry")[0].clone()
    }

    /// Number of leaves as originally supplied (pre-duplication).
    pub fn leaf_count(&self) -> usize {
        self.original_leaf_count
    }

    /// Builds an inclusion proof for the leaf at `index` (indexed into
    /// the original, pre-duplication leaf order).
    pub fn proof(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        let leaves = &self.levels[0];
        if index >= self.original_leaf_count {
            return Err(MerkleError::IndexOutOfBounds { index, len: self.original_leaf_count });
        }

        let mut idx = index;
        let mut siblings = Vec::with_capacity(self.levels.len() - 1);
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = idx ^ 1;
            let sibling = level.get(sibling_index).cloned().unwrap_or_else(|| level[idx].clone());
            siblings.push(sibling);
            idx /= 2;
        }

        Ok(MerkleProof { leaf_hash: leaves[index].clone(), siblings })
    }
}

fn pad_to_even(level: &mut Vec<String>) {
    if level.len() % 2 == 1 {
        let last = level.last().expect("checked non-empty by caller").clone();
        level.push(last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_hashes(n: usize) -> Vec<String> {
        (0..n).map(|i| sha256_hex(format!("leaf-{i}").as_bytes())).collect()
    }

    #[test]
    fn empty_tree_errors() {
        assert_eq!(MerkleTree::build(vec![]).unwrap_err(), MerkleError::EmptyTree);
    }

    #[test]
    fn single_leaf_round_trips() {
        let tree = MerkleTree::build(leaf_hashes(1)).unwrap();
        let root = tree.root();
        assert!(tree.proof(0).unwrap().verify(&root));
    }

    #[test]
    fn all_leaves_verify_for_even_and_odd_counts() {
        for n in 1..=9 {
            let leaves = leaf_hashes(n);
            let tree = MerkleTree::build(leaves.clone()).unwrap();
            let root = tree.root();
            for i in 0..n {
                let proof = tree.proof(i).unwrap();
                assert!(proof.verify(&root), "leaf {i} of {n} failed to verify");
            }
        }
    }

    #[test]
    fn tampering_a_leaf_flips_verification() {
        let tree = MerkleTree::build(leaf_hashes(5)).unwrap();
        let root = tree.root();
        let mut proof = tree.proof(2).unwrap();
        proof.leaf_hash = sha256_hex(b"tampered");
        assert!(!proof.verify(&root));
    }

    #[test]
    fn out_of_bounds_proof_errors() {
        let tree = MerkleTree::build(leaf_hashes(3)).unwrap();
        assert_eq!(
            tree.proof(10).unwrap_err(),
            MerkleError::IndexOutOfBounds { index: 10, len: 3 }
        );
    }

    #[test]
    fn deterministic_for_same_input() {
        let a = MerkleTree::build(leaf_hashes(6)).unwrap();
        let b = MerkleTree::build(leaf_hashes(6)).unwrap();
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn different_inputs_different_roots() {
        let a = MerkleTree::build(leaf_hashes(4)).unwrap();
        let b = MerkleTree::build(leaf_hashes(5)).unwrap();
        assert_ne!(a.root(), b.root());
    }

    proptest::proptest! {
        #[test]
        fn property_round_trip(n in 1usize..64) {
            let leaves = leaf_hashes(n);
            let tree = MerkleTree::build(leaves).unwrap();
            let root = tree.root();
            for i in 0..n {
                proptest::prop_assert!(tree.proof(i).unwrap().verify(&root));
            }
        }
    }
}
