//! 骨骼节点
//!
//! BoneLink 只保存静态数据：名称、父骨骼索引、标志。
//! 变换保存在 IkRigSkeleton 的并行数组中。

use bitflags::bitflags;

// ============================================================================
// 骨骼标志
// ============================================================================

bitflags! {
    /// 骨骼标志位
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BoneFlags: u32 {
        /// 不参与求解（沿父链查找时跳过）
        const EXCLUDED = 1 << 0;
        /// 没有子骨骼
        const LEAF = 1 << 1;
    }
}

// ============================================================================
// 骨骼节点
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct BoneLink {
    /// 骨骼名称
    pub name: String,

    /// 父骨骼索引（None 表示根骨骼），总是小于自身索引
    pub parent_index: Option<usize>,

    /// 骨骼标志
    pub flags: BoneFlags,
}

impl BoneLink {
    /// 创建新骨骼
    pub fn new(name: impl Into<String>, parent_index: Option<usize>) -> Self {
        Self {
            name: name.into(),
            parent_index,
            flags: BoneFlags::LEAF,
        }
    }

    #[inline]
    pub fn is_excluded(&self) -> bool {
        self.flags.contains(BoneFlags::EXCLUDED)
    }

    #[inline]
    pub fn set_excluded(&mut self, excluded: bool) {
        self.flags.set(BoneFlags::EXCLUDED, excluded);
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.flags.contains(BoneFlags::LEAF)
    }
}

impl Default for BoneLink {
    fn default() -> Self {
        Self::new(String::new(), None)
    }
}
