//! Merkle roots over transaction ids and shard hashes.
//!
//! Each level hashes adjacent pairs with double SHA-256. When a level has an
//! odd number of nodes, the last node is paired with itself. A single leaf is
//! its own root.

use crate::hash::{hash_concat, Hash};

fn parent(left: &Hash, right: &Hash) -> Hash {
    hash_concat(&[left.as_ref(), right.as_ref()])
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            parent(left, pair.get(1).unwrap_or(left))
        })
        .collect()
}

/// Root over `hashes` in order; `Hash::ZERO` for an empty list.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    let Some(first) = hashes.first() else {
        return Hash::ZERO;
    };
    let mut level = hashes.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level.first().copied().unwrap_or(*first)
}

/// Which side of the running hash a branch node sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Inclusion proof: a leaf plus the branch nodes from the leaf level up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf: Hash,
    pub index: usize,
    pub branch: Vec<(Hash, Side)>,
}

impl MerkleProof {
    /// Fold the branch into the root it commits to.
    pub fn root(&self) -> Hash {
        self.branch
            .iter()
            .fold(self.leaf, |acc, (node, side)| match side {
                Side::Left => parent(node, &acc),
                Side::Right => parent(&acc, node),
            })
    }
}

/// Every level of the tree, kept so proofs can be cut from it.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    // levels[0] holds the leaves, the last level holds the root alone.
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    pub fn new(leaves: &[Hash]) -> Self {
        let mut levels = vec![leaves.to_vec()];
        while let Some(top) = levels.last().filter(|level| level.len() > 1) {
            let up = next_level(top);
            levels.push(up);
        }
        Self { levels }
    }

    pub fn root(&self) -> Hash {
        match self.levels.last().map(Vec::as_slice) {
            Some([root]) => *root,
            _ => Hash::ZERO,
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Number of levels, leaves and root included.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Levels that had to pair their last node with itself.
    pub fn self_paired_levels(&self) -> usize {
        self.levels
            .iter()
            .filter(|level| level.len() > 1 && level.len() % 2 == 1)
            .count()
    }

    /// Proof for leaf `index`, or `None` past the last leaf.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        let leaf = *self.levels[0].get(index)?;
        let mut branch = Vec::with_capacity(self.depth().saturating_sub(1));
        let mut position = index;
        for level in self.levels.iter().filter(|level| level.len() > 1) {
            let node = if position % 2 == 0 {
                // an unpaired last node is its own sibling
                (level.get(position + 1).copied().unwrap_or(level[position]), Side::Right)
            } else {
                (level[position - 1], Side::Left)
            };
            branch.push(node);
            position /= 2;
        }
        Some(MerkleProof {
            leaf,
            index,
            branch,
        })
    }
}

/// True when `proof` folds up to `root`.
pub fn verify_proof(root: &Hash, proof: &MerkleProof) -> bool {
    proof.root() == *root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;

    fn leaves(n: usize) -> Vec<Hash> {
        (0..n as u32).map(|i| hash(&i.to_le_bytes())).collect()
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(merkle_root(&[]), Hash::ZERO);
        assert_eq!(MerkleTree::new(&[]).root(), Hash::ZERO);
        assert!(MerkleTree::new(&[]).proof(0).is_none());

        let one = leaves(1);
        assert_eq!(merkle_root(&one), one[0]);
        let proof = MerkleTree::new(&one).proof(0).unwrap();
        assert!(proof.branch.is_empty());
        assert!(verify_proof(&one[0], &proof));
    }

    #[test]
    fn test_pair_is_concatenated_hash() {
        let h = leaves(2);
        assert_eq!(
            merkle_root(&h),
            hash_concat(&[h[0].as_ref(), h[1].as_ref()])
        );
    }

    #[test]
    fn test_odd_levels_duplicate_last() {
        let h = leaves(3);
        let ab = parent(&h[0], &h[1]);
        let cc = parent(&h[2], &h[2]);
        assert_eq!(merkle_root(&h), parent(&ab, &cc));

        let h = leaves(5);
        let l1 = [parent(&h[0], &h[1]), parent(&h[2], &h[3]), parent(&h[4], &h[4])];
        let l2 = [parent(&l1[0], &l1[1]), parent(&l1[2], &l1[2])];
        assert_eq!(merkle_root(&h), parent(&l2[0], &l2[1]));
    }

    #[test]
    fn test_self_paired_levels() {
        for n in [2usize, 4, 8, 16, 32] {
            assert_eq!(MerkleTree::new(&leaves(n)).self_paired_levels(), 0);
        }
        // 6 -> 3 -> 2 -> 1
        assert_eq!(MerkleTree::new(&leaves(6)).self_paired_levels(), 1);
        // 7 -> 4 -> 2 -> 1
        assert_eq!(MerkleTree::new(&leaves(7)).self_paired_levels(), 1);
        // 5 -> 3 -> 2 -> 1
        assert_eq!(MerkleTree::new(&leaves(5)).self_paired_levels(), 2);
        assert_eq!(MerkleTree::new(&leaves(5)).depth(), 4);
    }

    #[test]
    fn test_shuffled_leaves_change_root() {
        let h = leaves(4);
        let swapped = vec![h[1], h[0], h[2], h[3]];
        assert_ne!(merkle_root(&h), merkle_root(&swapped));
    }

    #[test]
    fn test_tree_agrees_with_root_fn() {
        for n in 1..=17 {
            let h = leaves(n);
            assert_eq!(MerkleTree::new(&h).root(), merkle_root(&h), "n = {n}");
        }
    }

    #[test]
    fn test_every_leaf_proves() {
        for n in [2usize, 5, 8, 11] {
            let tree = MerkleTree::new(&leaves(n));
            for i in 0..n {
                let proof = tree.proof(i).unwrap();
                assert_eq!(proof.index, i);
                assert!(verify_proof(&tree.root(), &proof), "n = {n}, i = {i}");
            }
        }
        assert!(MerkleTree::new(&leaves(4)).proof(4).is_none());
    }

    #[test]
    fn test_last_odd_leaf_is_its_own_sibling() {
        let h = leaves(3);
        let proof = MerkleTree::new(&h).proof(2).unwrap();
        assert_eq!(proof.branch[0], (h[2], Side::Right));
        assert_eq!(proof.branch[1], (parent(&h[0], &h[1]), Side::Left));
    }

    #[test]
    fn test_tampered_proof_fails() {
        let tree = MerkleTree::new(&leaves(6));
        let mut proof = tree.proof(3).unwrap();
        assert!(!verify_proof(&hash(b"other root"), &proof));

        proof.leaf = hash(b"forged");
        assert!(!verify_proof(&tree.root(), &proof));
    }
}
