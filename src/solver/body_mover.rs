//! Body Mover 求解器 - 根据多个目标的偏移移动/旋转躯干骨骼
//!
//! 每个目标提供一对点：骨骼当前位置（初始点）和向目标混合后的位置（当前点）。
//! 两个点集的最佳拟合刚体变换作用到躯干骨骼，平移和旋转分轴加权。

use std::any::Any;
use std::collections::HashSet;

use glam::{Quat, Vec3};

use crate::goal::GoalContainer;
use crate::math;
use crate::skeleton::IkRigSkeleton;

use super::IkRigSolver;

/// 单个目标设置
#[derive(Clone, Debug, PartialEq)]
pub struct BodyMoverGoal {
    pub goal: String,
    pub bone: String,
    /// 该目标对躯干的影响倍数
    pub influence_multiplier: f32,

    bone_index: Option<usize>,
}

impl BodyMoverGoal {
    pub fn new(goal: &str, bone: &str) -> Self {
        Self {
            goal: goal.to_string(),
            bone: bone.to_string(),
            influence_multiplier: 1.0,
            bone_index: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BodyMoverSolver {
    pub enabled: bool,
    /// 被移动的躯干骨骼
    pub start_bone: String,
    pub goals: Vec<BodyMoverGoal>,

    /// 总体平移系数
    pub position_alpha: f32,
    pub position_positive_x: f32,
    pub position_negative_x: f32,
    pub position_positive_y: f32,
    pub position_negative_y: f32,
    pub position_positive_z: f32,
    pub position_negative_z: f32,

    /// 总体旋转系数
    pub rotation_alpha: f32,
    pub rotate_x_alpha: f32,
    pub rotate_y_alpha: f32,
    pub rotate_z_alpha: f32,

    body_bone_index: Option<usize>,
}

impl Default for BodyMoverSolver {
    fn default() -> Self {
        Self {
            enabled: true,
            start_bone: String::new(),
            goals: Vec::new(),
            position_alpha: 1.0,
            position_positive_x: 1.0,
            position_negative_x: 1.0,
            position_positive_y: 1.0,
            position_negative_y: 1.0,
            position_positive_z: 1.0,
            position_negative_z: 1.0,
            rotation_alpha: 1.0,
            rotate_x_alpha: 1.0,
            rotate_y_alpha: 1.0,
            rotate_z_alpha: 1.0,
            body_bone_index: None,
        }
    }
}

impl BodyMoverSolver {
    pub fn new(start_bone: &str) -> Self {
        Self {
            start_bone: start_bone.to_string(),
            ..Default::default()
        }
    }

    pub fn add_goal(&mut self, goal: &str, bone: &str) {
        if self.goals.iter().all(|g| g.goal != goal) {
            self.goals.push(BodyMoverGoal::new(goal, bone));
        }
    }

    /// 按正负方向分轴加权的平移
    fn weight_offset(&self, offset: Vec3) -> Vec3 {
        let pick = |v: f32, pos: f32, neg: f32| if v > 0.0 { v * pos } else { v * neg };
        Vec3::new(
            pick(offset.x, self.position_positive_x, self.position_negative_x),
            pick(offset.y, self.position_positive_y, self.position_negative_y),
            pick(offset.z, self.position_positive_z, self.position_negative_z),
        ) * self.position_alpha
    }
}

impl IkRigSolver for BodyMoverSolver {
    fn nice_name(&self) -> &'static str {
        "Body Mover"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn initialize(&mut self, skeleton: &IkRigSkeleton) {
        self.body_bone_index = skeleton.get_bone_index_from_name(&self.start_bone);
        for goal in &mut self.goals {
            goal.bone_index = skeleton.get_bone_index_from_name(&goal.bone);
        }
    }

    fn solve(&mut self, skeleton: &mut IkRigSkeleton, goals: &GoalContainer) {
        let Some(body) = self.body_bone_index else {
            return;
        };
        if self.goals.is_empty() {
            return;
        }

        let mut initial_points = Vec::with_capacity(self.goals.len());
        let mut current_points = Vec::with_capacity(self.goals.len());
        for settings in &self.goals {
            let (Some(bone), Some(goal)) =
                (settings.bone_index, goals.find_goal_by_name(&settings.goal))
            else {
                continue;
            };
            let initial = skeleton.current_pose_global[bone].translation;
            let current = initial.lerp(goal.final_blended_position, settings.influence_multiplier);
            initial_points.push(initial);
            current_points.push(current);
        }
        if initial_points.is_empty() {
            return;
        }

        let (rotation, initial_centroid, current_centroid) =
            math::rotation_from_deformed_points(&initial_points, &current_points);

        let offset = self.weight_offset(current_centroid - initial_centroid);

        let weighted = math::weight_rotation_per_axis(
            rotation,
            Vec3::new(self.rotate_x_alpha, self.rotate_y_alpha, self.rotate_z_alpha),
        );
        let rotation_offset = math::blend_rotation(Quat::IDENTITY, weighted, self.rotation_alpha);

        let transform = &mut skeleton.current_pose_global[body];
        transform.translation += offset;
        transform.rotation = (rotation_offset * transform.rotation).normalize();

        skeleton.update_local_transform_from_global(body);
        skeleton.propagate_global_pose_below_bone(body);
    }

    fn required_bones(&self, out: &mut HashSet<String>) {
        out.insert(self.start_bone.clone());
        for goal in &self.goals {
            out.insert(goal.bone.clone());
        }
    }

    fn required_goals(&self, out: &mut HashSet<String>) {
        for goal in &self.goals {
            out.insert(goal.goal.clone());
        }
    }

    fn goal_bones(&self, out: &mut Vec<(String, String)>) {
        for goal in &self.goals {
            out.push((goal.goal.clone(), goal.bone.clone()));
        }
    }

    fn on_goal_renamed(&mut self, old_name: &str, new_name: &str) {
        for goal in &mut self.goals {
            if goal.goal == old_name {
                goal.goal = new_name.to_string();
            }
        }
    }

    fn on_goal_removed(&mut self, goal_name: &str) {
        self.goals.retain(|g| g.goal != goal_name);
    }

    fn on_goal_moved_to_different_bone(&mut self, goal_name: &str, new_bone: &str) {
        for goal in &mut self.goals {
            if goal.goal == goal_name {
                goal.bone = new_bone.to_string();
            }
        }
    }

    fn update_settings(&mut self, source: &dyn IkRigSolver) {
        let Some(other) = source.as_any().downcast_ref::<Self>() else {
            return;
        };
        self.enabled = other.enabled;
        self.position_alpha = other.position_alpha;
        self.position_positive_x = other.position_positive_x;
        self.position_negative_x = other.position_negative_x;
        self.position_positive_y = other.position_positive_y;
        self.position_negative_y = other.position_negative_y;
        self.position_positive_z = other.position_positive_z;
        self.position_negative_z = other.position_negative_z;
        self.rotation_alpha = other.rotation_alpha;
        self.rotate_x_alpha = other.rotate_x_alpha;
        self.rotate_y_alpha = other.rotate_y_alpha;
        self.rotate_z_alpha = other.rotate_z_alpha;
        for goal in &mut self.goals {
            if let Some(src) = other.goals.iter().find(|g| g.goal == goal.goal) {
                goal.influence_multiplier = src.influence_multiplier;
            }
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
    use crate::testing::{biped_skeleton, resolved_goals};

    fn feet_goals(offset: Vec3, skeleton: &IkRigSkeleton) -> GoalContainer {
        let foot_l = skeleton.current_pose_global[3].translation;
        let foot_r = skeleton.current_pose_global[5].translation;
        resolved_goals(&[
            IkRigGoal::new("FootL", "foot_l").with_position(foot_l + offset),
            IkRigGoal::new("FootR", "foot_r").with_position(foot_r + offset),
        ])
    }

    fn body_mover() -> BodyMoverSolver {
        let mut solver = BodyMoverSolver::new("pelvis");
        solver.add_goal("FootL", "foot_l");
        solver.add_goal("FootR", "foot_r");
        solver
    }

    #[test]
    fn test_uniform_offset_translates_body() {
        let mut skeleton = biped_skeleton();
        let before = skeleton.current_pose_global.clone();
        let goals = feet_goals(Vec3::new(10.0, 0.0, 0.0), &skeleton);

        let mut solver = body_mover();
        solver.initialize(&skeleton);
        solver.solve(&mut skeleton, &goals);

        let pose = &skeleton.current_pose_global;
        assert!(pose[1]
            .translation
            .abs_diff_eq(before[1].translation + Vec3::new(10.0, 0.0, 0.0), 1e-4));
        assert!(pose[1].rotation.abs_diff_eq(before[1].rotation, 1e-5));
        // 后代跟随
        assert!(pose[3]
            .translation
            .abs_diff_eq(before[3].translation + Vec3::new(10.0, 0.0, 0.0), 1e-4));
        // 根骨骼不动
        assert_eq!(pose[0], before[0]);
    }

    #[test]
    fn test_signed_axis_weights() {
        let mut skeleton = biped_skeleton();
        let before = skeleton.current_pose_global.clone();
        let goals = feet_goals(Vec3::new(-4.0, 0.0, 2.0), &skeleton);

        let mut solver = body_mover();
        solver.position_negative_x = 0.5;
        solver.position_positive_z = 0.0;
        solver.initialize(&skeleton);
        solver.solve(&mut skeleton, &goals);

        let moved = skeleton.current_pose_global[1].translation - before[1].translation;
        assert!(moved.abs_diff_eq(Vec3::new(-2.0, 0.0, 0.0), 1e-4));
    }

    #[test]
    fn test_rotation_from_opposite_foot_motion() {
        let mut skeleton = biped_skeleton();
        let before = skeleton.current_pose_global.clone();
        let foot_l = before[3].translation;
        let foot_r = before[5].translation;
        // 左脚向前、右脚向后 → 绕竖直轴转动
        let goals = resolved_goals(&[
            IkRigGoal::new("FootL", "foot_l").with_position(foot_l + Vec3::Y * 2.0),
            IkRigGoal::new("FootR", "foot_r").with_position(foot_r - Vec3::Y * 2.0),
        ]);

        let mut solver = body_mover();
        solver.initialize(&skeleton);
        solver.solve(&mut skeleton, &goals);
        let rotation = skeleton.current_pose_global[1].rotation;
        assert!(rotation.to_axis_angle().1.abs() > 0.1);

        // 关闭绕 Z 旋转
        let mut skeleton = biped_skeleton();
        let mut solver = body_mover();
        solver.rotate_z_alpha = 0.0;
        solver.initialize(&skeleton);
        solver.solve(&mut skeleton, &goals);
        assert!(skeleton.current_pose_global[1]
            .rotation
            .abs_diff_eq(before[1].rotation, 1e-4));
    }

    #[test]
    fn test_no_goals_noop() {
        let mut skeleton = biped_skeleton();
        let before = skeleton.current_pose_global.clone();
        let mut solver = BodyMoverSolver::new("pelvis");
        solver.initialize(&skeleton);
        solver.solve(&mut skeleton, &GoalContainer::new());
        assert_eq!(skeleton.current_pose_global, before);
    }
}
