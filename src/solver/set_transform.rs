//! Set Transform 求解器 - 直接把骨骼设到目标变换

use std::any::Any;
use std::collections::HashSet;

use crate::goal::GoalContainer;
use crate::math::{self, KINDA_SMALL_NUMBER};
use crate::skeleton::IkRigSkeleton;

use super::IkRigSolver;

#[derive(Clone, Debug)]
pub struct SetTransformSolver {
    pub enabled: bool,
    pub goal: String,
    pub bone: String,
    pub position_alpha: f32,
    pub rotation_alpha: f32,
    /// 总体混合系数
    pub alpha: f32,
    /// 是否带动子骨骼；否则子骨骼保持全局变换不变
    pub propagate_to_children: bool,

    bone_index: Option<usize>,
}

impl Default for SetTransformSolver {
    fn default() -> Self {
        Self {
            enabled: true,
            goal: String::new(),
            bone: String::new(),
            position_alpha: 1.0,
            rotation_alpha: 1.0,
            alpha: 1.0,
            propagate_to_children: true,
            bone_index: None,
        }
    }
}

impl SetTransformSolver {
    pub fn new(goal: &str, bone: &str) -> Self {
        Self {
            goal: goal.to_string(),
            bone: bone.to_string(),
            ..Default::default()
        }
    }
}

impl IkRigSolver for SetTransformSolver {
    fn nice_name(&self) -> &'static str {
        "Set Transform"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn initialize(&mut self, skeleton: &IkRigSkeleton) {
        self.bone_index = skeleton.get_bone_index_from_name(&self.bone);
    }

    fn solve(&mut self, skeleton: &mut IkRigSkeleton, goals: &GoalContainer) {
        let Some(bone) = self.bone_index else {
            return;
        };
        let Some(goal) = goals.find_goal_by_name(&self.goal) else {
            return;
        };

        let use_position = self.position_alpha > KINDA_SMALL_NUMBER;
        let use_rotation = self.rotation_alpha > KINDA_SMALL_NUMBER;
        if !(use_position || use_rotation) || self.alpha < KINDA_SMALL_NUMBER {
            return;
        }

        let alpha = self.alpha.min(1.0);
        let transform = &mut skeleton.current_pose_global[bone];
        if use_position {
            transform.translation = math::blend_position(
                transform.translation,
                goal.final_blended_position,
                self.position_alpha * alpha,
            );
        }
        if use_rotation {
            transform.rotation = math::blend_rotation(
                transform.rotation,
                goal.final_blended_rotation,
                self.rotation_alpha * alpha,
            );
        }

        skeleton.update_local_transform_from_global(bone);
        if self.propagate_to_children {
            skeleton.propagate_global_pose_below_bone(bone);
        } else {
            for child in skeleton.get_child_indices(bone) {
                skeleton.update_local_transform_from_global(child);
            }
        }
    }

    fn required_bones(&self, out: &mut HashSet<String>) {
        out.insert(self.bone.clone());
    }

    fn required_goals(&self, out: &mut HashSet<String>) {
        if !self.goal.is_empty() {
            out.insert(self.goal.clone());
        }
    }

    fn goal_bones(&self, out: &mut Vec<(String, String)>) {
        if !self.goal.is_empty() {
            out.push((self.goal.clone(), self.bone.clone()));
        }
    }

    fn on_goal_renamed(&mut self, old_name: &str, new_name: &str) {
        if self.goal == old_name {
            self.goal = new_name.to_string();
        }
    }

    fn on_goal_removed(&mut self, goal_name: &str) {
        if self.goal == goal_name {
            self.goal.clear();
        }
    }

    fn on_goal_moved_to_different_bone(&mut self, goal_name: &str, new_bone: &str) {
        if self.goal == goal_name {
            self.bone = new_bone.to_string();
        }
    }

    fn update_settings(&mut self, source: &dyn IkRigSolver) {
        if let Some(other) = source.as_any().downcast_ref::<Self>() {
            self.enabled = other.enabled;
            self.position_alpha = other.position_alpha;
            self.rotation_alpha = other.rotation_alpha;
            self.alpha = other.alpha;
            self.propagate_to_children = other.propagate_to_children;
        }
    }

    fn clone_box(&self) -> Box<dyn IkRigSolver> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::IkRigGoal;
    use crate::testing::{resolved_goals, straight_chain_skeleton};
    use glam::{Quat, Vec3};

    fn goals() -> GoalContainer {
        resolved_goals(&[IkRigGoal::new("Mid", "mid")
            .with_position(Vec3::new(2.0, 0.0, 5.0))
            .with_rotation(Quat::from_rotation_z(0.5))])
    }

    #[test]
    fn test_sets_bone_and_propagates() {
        let mut skeleton = straight_chain_skeleton();
        let mut solver = SetTransformSolver::new("Mid", "mid");
        solver.initialize(&skeleton);
        solver.solve(&mut skeleton, &goals());

        let pose = &skeleton.current_pose_global;
        assert!(pose[1].translation.abs_diff_eq(Vec3::new(2.0, 0.0, 5.0), 1e-6));
        assert!(pose[1].rotation.abs_diff_eq(Quat::from_rotation_z(0.5), 1e-6));
        // tip 沿 Z 轴 5 个单位，绕 Z 旋转不影响偏移
        assert!(pose[2].translation.abs_diff_eq(Vec3::new(2.0, 0.0, 10.0), 1e-5));
    }

    #[test]
    fn test_children_keep_global_without_propagation() {
        let mut skeleton = straight_chain_skeleton();
        let before_tip = skeleton.current_pose_global[2];

        let mut solver = SetTransformSolver::new("Mid", "mid");
        solver.propagate_to_children = false;
        solver.rotation_alpha = 0.0;
        solver.initialize(&skeleton);
        solver.solve(&mut skeleton, &goals());

        assert_eq!(skeleton.current_pose_global[2], before_tip);
        assert_eq!(skeleton.current_pose_global[1].rotation, Quat::IDENTITY);

        // 子骨骼本地变换已同步
        let mut check = skeleton.clone();
        check.update_all_global_transform_from_local();
        assert!(check.current_pose_global[2]
            .translation
            .abs_diff_eq(before_tip.translation, 1e-5));
    }

    #[test]
    fn test_negligible_alphas_noop() {
        let mut skeleton = straight_chain_skeleton();
        let before = skeleton.current_pose_global.clone();

        let mut solver = SetTransformSolver::new("Mid", "mid");
        solver.alpha = 0.0;
        solver.initialize(&skeleton);
        solver.solve(&mut skeleton, &goals());
        assert_eq!(skeleton.current_pose_global, before);

        solver.alpha = 1.0;
        solver.position_alpha = 0.0;
        solver.rotation_alpha = 1e-6;
        solver.solve(&mut skeleton, &goals());
        assert_eq!(skeleton.current_pose_global, before);
    }
}
