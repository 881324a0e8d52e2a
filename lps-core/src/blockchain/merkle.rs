//! Inclusion proofs for bitcoin transactions.

use bitcoin::Txid;
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{Hash, sha256d};
use bitcoin::merkle_tree::PartialMerkleTree;

/// Sibling hashes from a transaction up to the merkle root.
///
/// Bit `i` of `path` is set when the node at depth `i` is a right child.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MerkleBranch {
    pub hashes: Vec<[u8; 32]>,
    pub path: u32,
}

impl MerkleBranch {
    /// Returns `None` when `tx` is not among `txids`.
    pub fn build(txids: &[Txid], tx: &Txid) -> Option<Self> {
        let mut index = txids.iter().position(|t| t == tx)?;
        let mut level: Vec<[u8; 32]> = txids.iter().map(|t| t.to_byte_array()).collect();
        let mut branch = MerkleBranch::default();
        let mut depth = 0u32;

        while level.len() > 1 {
            if level.len() % 2 == 1 {
                let last = level[level.len() - 1];
                level.push(last);
            }
            branch.hashes.push(level[index ^ 1]);
            if index % 2 == 1 {
                branch.path |= 1 << depth;
            }
            level = level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            index /= 2;
            depth += 1;
        }

        Some(branch)
    }

    /// Folds the branch over `tx`, yielding the merkle root it commits to.
    pub fn reduce_from(&self, tx: &Txid) -> [u8; 32] {
        self.hashes
            .iter()
            .enumerate()
            .fold(tx.to_byte_array(), |current, (depth, sibling)| {
                if (self.path >> depth) & 1 == 1 {
                    hash_pair(sibling, &current)
                } else {
                    hash_pair(&current, sibling)
                }
            })
    }
}

/// Consensus-serialized partial merkle tree matching only `tx`.
pub fn partial_merkle_tree(txids: &[Txid], tx: &Txid) -> Option<Vec<u8>> {
    if !txids.contains(tx) {
        return None;
    }
    let matches: Vec<bool> = txids.iter().map(|t| t == tx).collect();
    let tree = PartialMerkleTree::from_txids(txids, &matches);
    Some(serialize(&tree))
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left);
    data[32..].copy_from_slice(right);
    sha256d::Hash::hash(&data).to_byte_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::TxMerkleNode;
    use bitcoin::consensus::encode::deserialize;
    use bitcoin::merkle_tree::calculate_root;

    fn txids(count: u8) -> Vec<Txid> {
        (1..=count).map(|i| Txid::from_byte_array([i; 32])).collect()
    }

    fn root_of(txids: &[Txid]) -> [u8; 32] {
        calculate_root(txids.iter().map(|t| TxMerkleNode::from_raw_hash(t.to_raw_hash())))
            .unwrap()
            .to_byte_array()
    }

    #[test]
    fn test_branch_reduces_to_root_for_every_position() {
        let txids = txids(5);
        let root = root_of(&txids);
        for tx in &txids {
            let branch = MerkleBranch::build(&txids, tx).unwrap();
            assert_eq!(branch.hashes.len(), 3);
            assert_eq!(branch.reduce_from(tx), root);
        }
    }

    #[test]
    fn test_single_transaction_block_has_empty_branch() {
        let txids = txids(1);
        let branch = MerkleBranch::build(&txids, &txids[0]).unwrap();
        assert!(branch.hashes.is_empty());
        assert_eq!(branch.path, 0);
        assert_eq!(branch.reduce_from(&txids[0]), txids[0].to_byte_array());
    }

    #[test]
    fn test_right_child_sets_path_bit() {
        let txids = txids(2);
        let branch = MerkleBranch::build(&txids, &txids[1]).unwrap();
        assert_eq!(branch.path, 1);
        assert_eq!(branch.hashes, vec![txids[0].to_byte_array()]);
    }

    #[test]
    fn test_partial_merkle_tree_commits_to_block_root() {
        let txids = txids(4);
        let bytes = partial_merkle_tree(&txids, &txids[2]).unwrap();
        let tree: PartialMerkleTree = deserialize(&bytes).unwrap();
        let mut matches = Vec::new();
        let mut indexes = Vec::new();
        let root = tree.extract_matches(&mut matches, &mut indexes).unwrap();
        assert_eq!(root.to_byte_array(), root_of(&txids));
        assert_eq!(matches, vec![txids[2]]);
        assert_eq!(indexes, vec![2]);
    }

    #[test]
    fn test_unknown_transaction_has_no_proof() {
        let txids = txids(3);
        let stranger = Txid::from_byte_array([9; 32]);
        assert!(MerkleBranch::build(&txids, &stranger).is_none());
        assert!(partial_merkle_tree(&txids, &stranger).is_none());
    }
}
