//! 外部骨架描述
//!
//! 由网格/资源提供方构建：按层级顺序排列的骨骼名称、父索引和本地参考姿态。

use std::collections::HashMap;

use crate::{IkRigError, Result};

use super::{BoneLink, BoneTransform};

/// 骨架描述
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkeletonSource {
    bones: Vec<BoneLink>,
    ref_pose_local: Vec<BoneTransform>,
    name_to_index: HashMap<String, usize>,
}

impl SkeletonSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从并行数组创建，三个数组长度必须一致，父索引必须小于自身索引
    pub fn from_parts(
        names: &[&str],
        parents: &[Option<usize>],
        ref_pose_local: &[BoneTransform],
    ) -> Result<Self> {
        if names.len() != parents.len() || names.len() != ref_pose_local.len() {
            return Err(IkRigError::MismatchedSkeletonParts {
                names: names.len(),
                parents: parents.len(),
                poses: ref_pose_local.len(),
            });
        }
        let mut source = Self::new();
        for ((name, parent), local) in names.iter().zip(parents).zip(ref_pose_local) {
            source.add_bone_with_parent_index(name, *parent, *local)?;
        }
        Ok(source)
    }

    /// 添加骨骼，父骨骼按名称查找
    pub fn add_bone(
        &mut self,
        name: &str,
        parent: Option<&str>,
        local: BoneTransform,
    ) -> Result<usize> {
        let parent_index = match parent {
            Some(parent_name) => Some(
                self.find_bone(parent_name)
                    .ok_or_else(|| IkRigError::MissingBone(parent_name.to_string()))?,
            ),
            None => None,
        };
        self.add_bone_with_parent_index(name, parent_index, local)
    }

    /// 添加骨骼，父骨骼按索引指定
    pub fn add_bone_with_parent_index(
        &mut self,
        name: &str,
        parent: Option<usize>,
        local: BoneTransform,
    ) -> Result<usize> {
        let index = self.bones.len();
        if self.name_to_index.contains_key(name) {
            return Err(IkRigError::DuplicateBone(name.to_string()));
        }
        if let Some(p) = parent {
            if p >= index {
                return Err(IkRigError::InvalidParent {
                    bone: name.to_string(),
                    parent: p,
                });
            }
        }
        self.name_to_index.insert(name.to_string(), index);
        self.bones.push(BoneLink::new(name, parent));
        self.ref_pose_local.push(local);
        Ok(index)
    }

    // ========================================
    // 访问器
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

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn bone_name(&self, index: usize) -> Option<&str> {
        self.bones.get(index).map(|b| b.name.as_str())
    }

    pub fn parent_index(&self, index: usize) -> Option<usize> {
        self.bones.get(index).and_then(|b| b.parent_index)
    }

    /// 父骨骼名称（根骨骼或不存在返回 None）
    pub fn parent_name(&self, name: &str) -> Option<&str> {
        let index = self.find_bone(name)?;
        let parent = self.parent_index(index)?;
        self.bone_name(parent)
    }

    /// `ancestor_name` 是否在 `index` 的父链上（不含自身）
    pub fn has_ancestor(&self, index: usize, ancestor_name: &str) -> bool {
        let mut current = self.parent_index(index);
        while let Some(p) = current {
            if self.bones[p].name == ancestor_name {
                return true;
            }
            current = self.parent_index(p);
        }
        false
    }

    pub fn ref_pose_local(&self) -> &[BoneTransform] {
        &self.ref_pose_local
    }

    /// 由本地参考姿态计算全局参考姿态（父先于子）
    pub fn ref_pose_global(&self) -> Vec<BoneTransform> {
        let mut global: Vec<BoneTransform> = Vec::with_capacity(self.bones.len());
        for (bone, local) in self.bones.iter().zip(&self.ref_pose_local) {
            let g = match bone.parent_index {
                Some(p) => global[p].mul_transform(local),
                None => *local,
            };
            global.push(g);
        }
        global
    }

    /// 层级深度，根骨骼为 0
    pub fn hierarchy_depth(&self, index: usize) -> usize {
        let mut depth = 0;
        let mut current = self.parent_index(index);
        while let Some(p) = current {
            depth += 1;
            current = self.parent_index(p);
        }
        depth
    }

    /// 以 `root_name` 为根的子层级，深度优先顺序
    pub fn sub_hierarchy_depth_first(&self, root_name: &str) -> Vec<usize> {
        let Some(root) = self.find_bone(root_name) else {
            return Vec::new();
        };

        let mut result = Vec::new();
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            result.push(index);
            // 逆序压栈，保证按骨骼顺序访问子骨骼
            let children = self
                .bones
                .iter()
                .enumerate()
                .skip(index + 1)
                .filter(|(_, b)| b.parent_index == Some(index))
                .map(|(i, _)| i)
                .collect::<Vec<_>>();
            stack.extend(children.into_iter().rev());
        }
        result
    }
}
