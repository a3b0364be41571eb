// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Column-Aligned Blocks: the record-aligned storage unit one leaf column
//! is built from (§3, §7).

pub mod cab;
pub mod descriptor;
pub mod layouter;

pub use cab::{Cab, ColumnItem};
pub use descriptor::{CabDescriptor, CabDescriptorBuffer, CabKind, ItemInfo, ValueInfo};
pub use layouter::{CabLayouter, Compression, LayoutResult};
