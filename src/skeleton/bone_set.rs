//! IK 姿态存储
//!
//! 保存骨骼层级和两套姿态：
//! - current_pose_local: 相对父骨骼的本地变换
//! - current_pose_global: 组件空间的全局变换
//!
//! 两套姿态任意时刻都可能不同步，读取前需显式调用转换函数。

use std::collections::HashMap;

use crate::definition::BoneChain;
use crate::{IkRigError, Result};

use super::{BoneLink, BoneTransform, SkeletonSource};

/// 分支末端缓存项
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BranchEnd {
    /// 尚未计算
    Unknown,
    /// 没有后代
    Leaf,
    /// 后代中最大的骨骼索引
    Index(usize),
}

/// IK 姿态存储
#[derive(Clone, Debug, Default)]
pub struct IkRigSkeleton {
    bones: Vec<BoneLink>,
    name_to_index: HashMap<String, usize>,
    /// 参考姿态（全局）
    pub ref_pose_global: Vec<BoneTransform>,
    /// 当前姿态（全局），求解器直接读写
    pub current_pose_global: Vec<BoneTransform>,
    /// 当前姿态（本地）
    pub current_pose_local: Vec<BoneTransform>,
    /// 分支末端索引缓存，按需填充，reset 时清空
    end_of_branch_cache: Vec<BranchEnd>,
}

impl IkRigSkeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从外部骨架拷贝层级与参考姿态，`excluded_bone_names` 中的骨骼标记为排除
    pub fn set_input_skeleton(&mut self, source: &SkeletonSource, excluded_bone_names: &[String]) {
        self.reset();

        let bone_count = source.num_bones();
        self.bones = source.bones().to_vec();
        for (i, bone) in self.bones.iter().enumerate() {
            self.name_to_index.insert(bone.name.clone(), i);
        }

        // 叶节点标志
        let mut has_child = vec![false; bone_count];
        for bone in &self.bones {
            if let Some(p) = bone.parent_index {
                has_child[p] = true;
            }
        }
        for (bone, &has_child) in self.bones.iter_mut().zip(&has_child) {
            bone.flags.set(super::BoneFlags::LEAF, !has_child);
        }

        for name in excluded_bone_names {
            if let Some(&index) = self.name_to_index.get(name) {
                self.bones[index].set_excluded(true);
            }
        }

        self.ref_pose_global = source.ref_pose_global();
        self.current_pose_global = self.ref_pose_global.clone();
        self.current_pose_local = source.ref_pose_local().to_vec();
        self.end_of_branch_cache = vec![BranchEnd::Unknown; bone_count];
    }

    /// 清空全部数据（包括分支末端缓存）
    pub fn reset(&mut self) {
        self.bones.clear();
        self.name_to_index.clear();
        self.ref_pose_global.clear();
        self.current_pose_global.clear();
        self.current_pose_local.clear();
        self.end_of_branch_cache.clear();
    }

    /// 当前姿态恢复为参考姿态
    pub fn set_current_pose_to_ref_pose(&mut self) {
        self.current_pose_global.clone_from(&self.ref_pose_global);
        self.update_all_local_transform_from_global();
    }

    // ========================================
    // 层级查询
    // ========================================

    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bones(&self) -> &[BoneLink] {
        &self.bones
    }

    pub fn get_bone_index_from_name(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn get_bone_name(&self, index: usize) -> Option<&str> {
        self.bones.get(index).map(|b| b.name.as_str())
    }

    pub fn get_parent_index(&self, index: usize) -> Option<usize> {
        self.bones.get(index).and_then(|b| b.parent_index)
    }

    pub fn is_bone_excluded(&self, index: usize) -> bool {
        self.bones.get(index).is_some_and(|b| b.is_excluded())
    }

    /// 沿父链向上，跳过被排除的骨骼
    pub fn get_parent_index_that_is_not_excluded(&self, index: usize) -> Option<usize> {
        let mut current = self.get_parent_index(index);
        while let Some(p) = current {
            if !self.bones[p].is_excluded() {
                return Some(p);
            }
            current = self.bones[p].parent_index;
        }
        None
    }

    /// 全部直接子骨骼，按骨骼顺序
    pub fn get_child_indices(&self, parent_index: usize) -> Vec<usize> {
        self.bones
            .iter()
            .enumerate()
            .skip(parent_index + 1)
            .filter(|(_, b)| b.parent_index == Some(parent_index))
            .map(|(i, _)| i)
            .collect()
    }

    /// 后代中最大的骨骼索引，叶节点返回 None
    ///
    /// 结果按索引缓存，直到 reset / set_input_skeleton。
    pub fn get_cached_end_of_branch_index(&mut self, index: usize) -> Option<usize> {
        if index >= self.bones.len() {
            return None;
        }
        if self.end_of_branch_cache.len() != self.bones.len() {
            self.end_of_branch_cache = vec![BranchEnd::Unknown; self.bones.len()];
        }

        match self.end_of_branch_cache[index] {
            BranchEnd::Index(end) => return Some(end),
            BranchEnd::Leaf => return None,
            BranchEnd::Unknown => {}
        }

        let mut in_branch = vec![false; self.bones.len()];
        in_branch[index] = true;
        let mut end = BranchEnd::Leaf;
        for i in index + 1..self.bones.len() {
            if let Some(p) = self.bones[i].parent_index {
                if in_branch[p] {
                    in_branch[i] = true;
                    end = BranchEnd::Index(i);
                }
            }
        }

        self.end_of_branch_cache[index] = end;
        match end {
            BranchEnd::Index(i) => Some(i),
            _ => None,
        }
    }

    /// `child` 沿父链能否到达 `potential_ancestor`（包含自身）
    pub fn is_bone_in_direct_lineage(&self, child: &str, potential_ancestor: &str) -> bool {
        let (Some(child_index), Some(ancestor_index)) = (
            self.get_bone_index_from_name(child),
            self.get_bone_index_from_name(potential_ancestor),
        ) else {
            return false;
        };

        let mut current = Some(child_index);
        while let Some(i) = current {
            if i == ancestor_index {
                return true;
            }
            current = self.bones[i].parent_index;
        }
        false
    }

    /// 校验链并返回从末端到起点的骨骼索引
    pub fn validate_chain_and_get_bones(&self, chain: &BoneChain) -> Result<Vec<usize>> {
        let invalid = || IkRigError::InvalidChain {
            name: chain.name.clone(),
            start: chain.start_bone.clone(),
            end: chain.end_bone.clone(),
        };

        let start = self.get_bone_index_from_name(&chain.start_bone).ok_or_else(invalid)?;
        let end = self.get_bone_index_from_name(&chain.end_bone).ok_or_else(invalid)?;

        let mut bones = Vec::new();
        let mut current = Some(end);
        while let Some(i) = current {
            bones.push(i);
            if i == start {
                return Ok(bones);
            }
            current = self.bones[i].parent_index;
        }
        Err(invalid())
    }

    // ========================================
    // 变换计算
    // ========================================

    /// 全部骨骼 本地 → 全局（按索引顺序，父先于子）
    pub fn update_all_global_transform_from_local(&mut self) {
        for i in 0..self.bones.len() {
            self.update_global_transform_from_local(i);
        }
    }

    /// 全部骨骼 全局 → 本地
    pub fn update_all_local_transform_from_global(&mut self) {
        for i in 0..self.bones.len() {
            self.update_local_transform_from_global(i);
        }
    }

    /// 单个骨骼 本地 → 全局，假定父骨骼全局变换已是最新
    pub fn update_global_transform_from_local(&mut self, index: usize) {
        if index >= self.bones.len() {
            return;
        }
        let local = self.current_pose_local[index];
        self.current_pose_global[index] = match self.bones[index].parent_index {
            Some(p) => self.current_pose_global[p].mul_transform(&local),
            None => local,
        };
    }

    /// 单个骨骼 全局 → 本地
    pub fn update_local_transform_from_global(&mut self, index: usize) {
        if index >= self.bones.len() {
            return;
        }
        let global = self.current_pose_global[index];
        self.current_pose_local[index] = match self.bones[index].parent_index {
            Some(p) => global.relative_to(&self.current_pose_global[p]),
            None => global,
        };
    }

    /// 求解器直接修改 `index` 的全局变换后，用后代的本地变换重算其全局变换
    pub fn propagate_global_pose_below_bone(&mut self, index: usize) {
        let Some(end) = self.get_cached_end_of_branch_index(index) else {
            return;
        };

        let mut in_branch = vec![false; end + 1];
        in_branch[index] = true;
        for i in index + 1..=end {
            if let Some(p) = self.bones[i].parent_index {
                if in_branch[p] {
                    in_branch[i] = true;
                    self.update_global_transform_from_local(i);
                }
            }
        }
    }

    /// 重新归一化全部旋转
    pub fn normalize_rotations(pose: &mut [BoneTransform]) {
        for transform in pose.iter_mut() {
            transform.rotation = transform.rotation.normalize();
        }
    }
}
