//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了读路径的缓存客户端。

pub mod read_through;

use crate::error::CacheError;

pub use read_through::ReadThroughCache;

/// 缓存写入的结果
///
/// 缓存写入是尽力而为的：失败已经在内部记录日志，调用方可以直接丢弃该值
#[derive(Debug)]
pub enum BestEffort {
    Stored,
    Failed(CacheError),
}

impl BestEffort {
    pub fn is_stored(&self) -> bool {
        matches!(self, BestEffort::Stored)
    }

    pub fn error(&self) -> Option<&CacheError> {
        match self {
            BestEffort::Stored => None,
            BestEffort::Failed(e) => Some(e),
        }
    }
}
