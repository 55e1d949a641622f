use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, trace::Op};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteHit {
    #[default]
    WriteBack,
    WriteThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMiss {
    #[default]
    WriteAllocate,
    WriteAround,
}

/// What the controller does with the cache and the backing store for one access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    /// Fill the line from the backing store, nothing else.
    CacheOnly,
    /// Write into the line and defer the store update to eviction.
    CacheAndMarkDirty,
    /// Write into the line and push the block to the backing store now.
    WriteThrough,
    /// Leave the cache alone and write the backing store directly.
    BypassCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    hit: WriteHit,
    miss: WriteMiss,
}

impl WritePolicy {
    pub fn new(hit: WriteHit, miss: WriteMiss) -> Result<Self, ConfigError> {
        // Every write to an allocated write-through line goes to the store anyway.
        if hit == WriteHit::WriteThrough && miss == WriteMiss::WriteAllocate {
            return Err(ConfigError::WriteThroughAllocate);
        }
        Ok(WritePolicy { hit, miss })
    }

    pub fn hit(&self) -> WriteHit {
        self.hit
    }

    pub fn miss(&self) -> WriteMiss {
        self.miss
    }

    /// `None` means the access leaves both the line data and the store untouched.
    pub fn decide(&self, op: Op, hit: bool) -> Option<WriteAction> {
        match (op, hit) {
            (Op::Load, true) => None,
            (Op::Load, false) => Some(WriteAction::CacheOnly),
            (Op::Store, true) => Some(match self.hit {
                WriteHit::WriteBack => WriteAction::CacheAndMarkDirty,
                WriteHit::WriteThrough => WriteAction::WriteThrough,
            }),
            (Op::Store, false) => Some(match self.miss {
                WriteMiss::WriteAround => WriteAction::BypassCache,
                WriteMiss::WriteAllocate => WriteAction::CacheAndMarkDirty,
            }),
        }
    }
}
