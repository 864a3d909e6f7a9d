/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'block' type and its associated methods.
//!
//! The consensus core treats a block as opaque except for its [height](Block::height), its
//! [content hash](Block::hash), and the hash of its predecessor ([`Block::previous_hash`]).

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::basic::*;
use crate::types::crypto_primitives::{canonical_bytes, CryptoHasher, Digest};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub height: BlockHeight,
    pub hash: CryptoHash,
    pub previous_hash: CryptoHash,
    pub data: Data,
}

impl Block {
    pub fn new(height: BlockHeight, previous_hash: CryptoHash, data: Data) -> Block {
        Block {
            height,
            hash: Block::hash(height, &previous_hash, &data),
            previous_hash,
            data,
        }
    }

    /// The block every chain starts from. It is never proposed: replicas start consensus on height 1
    /// with the genesis block as their last finalized block.
    pub fn genesis() -> Block {
        Block::new(BlockHeight::new(0), CryptoHash::zero(), Data::default())
    }

    /// Compute the content hash of a block with the given fields.
    pub fn hash(height: BlockHeight, previous_hash: &CryptoHash, data: &Data) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(canonical_bytes(&height));
        hasher.update(canonical_bytes(previous_hash));
        hasher.update(canonical_bytes(data));
        let bytes: [u8; 32] = hasher.finalize().into();
        CryptoHash::new(bytes)
    }

    /// Recompute this block's content hash from its fields. Unlike the stored `hash` field, this
    /// cannot be forged by whoever produced the block.
    pub fn content_hash(&self) -> CryptoHash {
        Block::hash(self.height, &self.previous_hash, &self.data)
    }

    /// Checks if the stored hash matches the block's contents.
    pub fn is_correct(&self) -> bool {
        self.hash == self.content_hash()
    }
}
