//! Limb 求解器 - 短链解析/迭代 IK
//!
//! 从起点骨骼到末端骨骼（含）构建链，至少 3 根骨骼。
//! 链求解只移动关节位置，旋转按位置变化重建，之后刷新非链子骨骼。

use std::any::Any;
use std::collections::HashSet;

use glam::Quat;

use crate::goal::GoalContainer;
use crate::skeleton::IkRigSkeleton;

use super::chain;
use super::{build_chain, collect_non_chain_children, commit_chain, IkRigSolver};

/// 最少链长（含起点和末端）
const MIN_CHAIN_LENGTH: usize = 3;

/// 链求解算法
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimbSolverType {
    #[default]
    Fabrik,
    Ccd,
    /// 仅适用于 3 骨骼链，更长的链退回 FABRIK
    TwoBones,
}

/// Limb 设置
#[derive(Clone, Debug, PartialEq)]
pub struct LimbSettings {
    pub solver_type: LimbSolverType,
    /// 末端到目标的收敛距离
    pub reach_precision: f32,
    pub max_iterations: u32,
    /// CCD 单次迭代角度上限（弧度）
    pub ccd_limit_angle: f32,
    /// 末端骨骼旋转对齐目标旋转
    pub align_end_to_goal: bool,
}

impl Default for LimbSettings {
    fn default() -> Self {
        Self {
            solver_type: LimbSolverType::Fabrik,
            reach_precision: 0.01,
            max_iterations: 12,
            ccd_limit_angle: std::f32::consts::FRAC_PI_4,
            align_end_to_goal: true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LimbSolver {
    pub enabled: bool,
    pub start_bone: String,
    pub end_bone: String,
    pub goal: String,
    pub settings: LimbSettings,

    /// 链骨骼索引（根 → 末端），为空表示未就绪
    chain: Vec<usize>,
    /// 链骨骼的非链子骨骼
    children_to_update: Vec<usize>,
}

impl LimbSolver {
    pub fn new(start_bone: &str, end_bone: &str, goal: &str) -> Self {
        Self {
            enabled: true,
            start_bone: start_bone.to_string(),
            end_bone: end_bone.to_string(),
            goal: goal.to_string(),
            ..Default::default()
        }
    }

    pub fn with_settings(mut self, settings: LimbSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 是否已就绪（链长满足要求）
    pub fn is_ready(&self) -> bool {
        self.chain.len() >= MIN_CHAIN_LENGTH
    }

    pub fn chain(&self) -> &[usize] {
        &self.chain
    }
}

impl IkRigSolver for LimbSolver {
    fn nice_name(&self) -> &'static str {
        "Limb IK"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn initialize(&mut self, skeleton: &IkRigSkeleton) {
        self.chain.clear();
        self.children_to_update.clear();

        let chain = build_chain(skeleton, &self.start_bone, &self.end_bone);
        if chain.len() < MIN_CHAIN_LENGTH {
            return;
        }

        self.children_to_update = collect_non_chain_children(skeleton, &chain);
        self.chain = chain;
    }

    fn solve(&mut self, skeleton: &mut IkRigSkeleton, goals: &GoalContainer) {
        if !self.is_ready() {
            return;
        }
        let Some(goal) = goals.find_goal_by_name(&self.goal) else {
            return;
        };

        let original: Vec<_> = self
            .chain
            .iter()
            .map(|&i| skeleton.current_pose_global[i].translation)
            .collect();
        let mut positions = original.clone();
        let target = goal.final_blended_position;

        let result = match self.settings.solver_type {
            LimbSolverType::TwoBones if positions.len() == MIN_CHAIN_LENGTH => {
                chain::solve_two_bones(&mut positions, target)
            }
            LimbSolverType::Ccd => chain::solve_ccd(
                &mut positions,
                target,
                self.settings.reach_precision,
                self.settings.max_iterations,
                self.settings.ccd_limit_angle,
            ),
            _ => chain::solve_fabrik(
                &mut positions,
                target,
                self.settings.reach_precision,
                self.settings.max_iterations,
            ),
        };

        let tip = *self.chain.last().unwrap_or(&0);
        let align_tip = self.settings.align_end_to_goal
            && !skeleton.current_pose_global[tip]
                .rotation
                .abs_diff_eq(goal.final_blended_rotation, 1e-6);
        if !result.modified && !align_tip {
            return;
        }

        // 按关节位置变化重建旋转
        for (link, &bone) in self.chain.iter().enumerate().take(self.chain.len() - 1) {
            let old_dir = (original[link + 1] - original[link]).normalize_or_zero();
            let new_dir = (positions[link + 1] - positions[link]).normalize_or_zero();
            let delta = if old_dir.length_squared() > 0.0 && new_dir.length_squared() > 0.0 {
                Quat::from_rotation_arc(old_dir, new_dir)
            } else {
                Quat::IDENTITY
            };

            let transform = &mut skeleton.current_pose_global[bone];
            transform.rotation = (delta * transform.rotation).normalize();
            transform.translation = positions[link];
        }

        let tip_transform = &mut skeleton.current_pose_global[tip];
        tip_transform.translation = positions[positions.len() - 1];
        if self.settings.align_end_to_goal {
            tip_transform.rotation = goal.final_blended_rotation;
        }

        commit_chain(skeleton, &self.chain, &self.children_to_update);
    }

    fn required_bones(&self, out: &mut HashSet<String>) {
        out.insert(self.start_bone.clone());
        out.insert(self.end_bone.clone());
    }

    fn required_goals(&self, out: &mut HashSet<String>) {
        if !self.goal.is_empty() {
            out.insert(self.goal.clone());
        }
    }

    fn goal_bones(&self, out: &mut Vec<(String, String)>) {
        if !self.goal.is_empty() {
            out.push((self.goal.clone(), self.end_bone.clone()));
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
            self.end_bone = new_bone.to_string();
        }
    }

    fn update_settings(&mut self, source: &dyn IkRigSolver) {
        if let Some(other) = source.as_any().downcast_ref::<Self>() {
            self.enabled = other.enabled;
            self.settings = other.settings.clone();
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
    use glam::Vec3;

    fn solve_to(target: Vec3, solver_type: LimbSolverType) -> IkRigSkeleton {
        let mut skeleton = straight_chain_skeleton();
        let mut solver = LimbSolver::new("root", "tip", "Tip").with_settings(LimbSettings {
            solver_type,
            ..Default::default()
        });
        solver.initialize(&skeleton);
        assert!(solver.is_ready());

        let goals = resolved_goals(&[IkRigGoal::new("Tip", "tip").with_position(target)]);
        solver.solve(&mut skeleton, &goals);
        skeleton
    }

    #[test]
    fn test_reaches_goal_with_root_pinned() {
        let target = Vec3::new(5.0, 0.0, 5.0);
        for solver_type in [LimbSolverType::Fabrik, LimbSolverType::TwoBones] {
            let skeleton = solve_to(target, solver_type);
            let pose = &skeleton.current_pose_global;
            assert!(pose[2].translation.distance(target) < 0.01);
            assert_eq!(pose[0].translation, Vec3::ZERO);
            // 中间骨骼弯曲后仍保持骨长
            assert!((pose[1].translation.distance(pose[0].translation) - 5.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_out_of_reach_goal_stretches_toward_it() {
        let target = Vec3::new(5.0, 0.0, 10.0);
        let skeleton = solve_to(target, LimbSolverType::Fabrik);
        let pose = &skeleton.current_pose_global;

        assert_eq!(pose[0].translation, Vec3::ZERO);
        assert!(pose[2].translation.abs_diff_eq(target.normalize() * 10.0, 1e-3));
        assert!(pose[1].translation.x > 0.0);

        // 本地变换与全局一致
        let mut check = skeleton.clone();
        check.update_all_global_transform_from_local();
        for (a, b) in check.current_pose_global.iter().zip(pose) {
            assert!(a.translation.abs_diff_eq(b.translation, 1e-4));
        }
    }

    #[test]
    fn test_short_chain_is_noop() {
        let mut skeleton = straight_chain_skeleton();
        let before = skeleton.current_pose_global.clone();

        let mut solver = LimbSolver::new("mid", "tip", "Tip");
        solver.initialize(&skeleton);
        assert!(!solver.is_ready());

        let goals = resolved_goals(&[IkRigGoal::new("Tip", "tip").with_position(Vec3::X * 3.0)]);
        solver.solve(&mut skeleton, &goals);
        assert_eq!(skeleton.current_pose_global, before);
    }

    #[test]
    fn test_goal_removed_makes_noop() {
        let mut skeleton = straight_chain_skeleton();
        let before = skeleton.current_pose_global.clone();

        let mut solver = LimbSolver::new("root", "tip", "Tip");
        solver.on_goal_removed("Tip");
        solver.initialize(&skeleton);

        let goals = resolved_goals(&[IkRigGoal::new("Tip", "tip").with_position(Vec3::X * 3.0)]);
        solver.solve(&mut skeleton, &goals);
        assert_eq!(skeleton.current_pose_global, before);

        let mut required = HashSet::new();
        solver.required_goals(&mut required);
        assert!(required.is_empty());
    }
}
