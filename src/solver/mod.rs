//! 求解器栈
//!
//! 每种求解器实现 IkRigSolver：
//! - initialize: 缓存骨骼索引，缺少骨骼时静默变为空操作
//! - solve: 原地修改骨架全局姿态
//! - required_bones / required_goals: 声明依赖，供处理器交叉校验

mod body_mover;
pub mod chain;
mod full_body;
mod limb;
mod pole;
mod set_transform;

pub use body_mover::{BodyMoverGoal, BodyMoverSolver};
pub use full_body::{FullBodyBoneSettings, FullBodyEffector, FullBodyIkSolver};
pub use limb::{LimbSettings, LimbSolver, LimbSolverType};
pub use pole::PoleSolver;
pub use set_transform::SetTransformSolver;

use std::any::Any;
use std::collections::HashSet;
use std::fmt;

use crate::goal::GoalContainer;
use crate::skeleton::IkRigSkeleton;

/// 求解器接口
pub trait IkRigSolver: fmt::Debug + Send + Sync + Any {
    /// 显示名称
    fn nice_name(&self) -> &'static str;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);

    /// 缓存骨骼索引（每次处理器初始化调用一次）
    fn initialize(&mut self, skeleton: &IkRigSkeleton);

    /// 修改骨架全局姿态
    fn solve(&mut self, skeleton: &mut IkRigSkeleton, goals: &GoalContainer);

    fn required_bones(&self, out: &mut HashSet<String>);

    fn required_goals(&self, out: &mut HashSet<String>);

    /// 求解器配置中记录的 (目标, 骨骼) 对，用于检测绑定冲突
    fn goal_bones(&self, _out: &mut Vec<(String, String)>) {}

    // ========================================
    // 目标编辑通知
    // ========================================

    fn on_goal_renamed(&mut self, _old_name: &str, _new_name: &str) {}

    fn on_goal_removed(&mut self, _goal_name: &str) {}

    fn on_goal_moved_to_different_bone(&mut self, _goal_name: &str, _new_bone: &str) {}

    /// 从同类型求解器拷贝设置（不拷贝运行时缓存）
    fn update_settings(&mut self, source: &dyn IkRigSolver);

    fn clone_box(&self) -> Box<dyn IkRigSolver>;

    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn IkRigSolver> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// 链上骨骼的非链子骨骼，链修改后需要从本地变换重算
pub(crate) fn collect_non_chain_children(skeleton: &IkRigSkeleton, chain: &[usize]) -> Vec<usize> {
    let mut children = Vec::new();
    for &bone in chain {
        for child in skeleton.get_child_indices(bone) {
            if !chain.contains(&child) {
                children.push(child);
            }
        }
    }
    children
}

/// 从根到末端构建链，`end` 不在 `start` 之下时返回空
pub(crate) fn build_chain(skeleton: &IkRigSkeleton, start: &str, end: &str) -> Vec<usize> {
    let (Some(start_index), Some(end_index)) = (
        skeleton.get_bone_index_from_name(start),
        skeleton.get_bone_index_from_name(end),
    ) else {
        return Vec::new();
    };

    let mut chain = Vec::new();
    let mut current = Some(end_index);
    while let Some(i) = current {
        chain.push(i);
        if i == start_index {
            chain.reverse();
            return chain;
        }
        current = skeleton.get_parent_index(i);
    }
    Vec::new()
}

/// 用修改后的链全局变换更新本地变换，再刷新非链子骨骼
pub(crate) fn commit_chain(skeleton: &mut IkRigSkeleton, chain: &[usize], children: &[usize]) {
    for &bone in chain {
        skeleton.update_local_transform_from_global(bone);
    }
    for &child in children {
        skeleton.update_global_transform_from_local(child);
        skeleton.propagate_global_pose_below_bone(child);
    }
}
