//! 全身 IK 求解器 - 把骨架姿态桥接到粒子求解器
//!
//! 初始化时按骨骼顺序注册全部骨骼（父骨骼取最近的未排除祖先），
//! 再为每个效应器注册目标。求解时推入当前全局姿态和目标，求解后读回。

use std::any::Any;
use std::collections::HashSet;

use crate::goal::GoalContainer;
use crate::pbik::{
    ParticleSolver, PbikBoneSettings, PbikEffectorSettings, PbikSolverSettings, RotationLocks,
};
use crate::skeleton::IkRigSkeleton;

use super::IkRigSolver;

/// 效应器设置
#[derive(Clone, Debug, PartialEq)]
pub struct FullBodyEffector {
    pub goal: String,
    pub bone: String,
    pub strength_alpha: f32,
    pub chain_depth: u32,
    pub pull_chain_alpha: f32,
    pub pin_rotation: f32,

    index_in_solver: Option<usize>,
}

impl FullBodyEffector {
    pub fn new(goal: &str, bone: &str) -> Self {
        let defaults = PbikEffectorSettings::default();
        Self {
            goal: goal.to_string(),
            bone: bone.to_string(),
            strength_alpha: defaults.strength_alpha,
            chain_depth: defaults.chain_depth,
            pull_chain_alpha: defaults.pull_chain_alpha,
            pin_rotation: defaults.pin_rotation,
            index_in_solver: None,
        }
    }

    fn solver_settings(&self) -> PbikEffectorSettings {
        PbikEffectorSettings {
            strength_alpha: self.strength_alpha,
            chain_depth: self.chain_depth,
            pull_chain_alpha: self.pull_chain_alpha,
            pin_rotation: self.pin_rotation,
        }
    }
}

/// 单根骨骼的关节设置
#[derive(Clone, Debug, PartialEq)]
pub struct FullBodyBoneSettings {
    pub bone: String,
    pub stiffness: f32,
    pub rotation_locks: RotationLocks,
    pub max_swing_degrees: f32,
}

impl FullBodyBoneSettings {
    pub fn new(bone: &str) -> Self {
        Self {
            bone: bone.to_string(),
            stiffness: 0.0,
            rotation_locks: RotationLocks::empty(),
            max_swing_degrees: 0.0,
        }
    }

    fn solver_settings(&self) -> PbikBoneSettings {
        PbikBoneSettings {
            stiffness: self.stiffness,
            rotation_locks: self.rotation_locks,
            max_swing_degrees: self.max_swing_degrees,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FullBodyIkSolver {
    pub enabled: bool,
    pub root_bone: String,
    pub settings: PbikSolverSettings,
    pub effectors: Vec<FullBodyEffector>,
    pub bone_settings: Vec<FullBodyBoneSettings>,

    solver: ParticleSolver,
    /// bone_settings 对应的骨骼索引
    bone_settings_indices: Vec<Option<usize>>,
}

impl Default for FullBodyIkSolver {
    fn default() -> Self {
        Self {
            enabled: true,
            root_bone: String::new(),
            settings: PbikSolverSettings::default(),
            effectors: Vec::new(),
            bone_settings: Vec::new(),
            solver: ParticleSolver::new(),
            bone_settings_indices: Vec::new(),
        }
    }
}

impl FullBodyIkSolver {
    pub fn new(root_bone: &str) -> Self {
        Self {
            root_bone: root_bone.to_string(),
            ..Default::default()
        }
    }

    pub fn add_effector(&mut self, goal: &str, bone: &str) -> &mut FullBodyEffector {
        let index = match self.effectors.iter().position(|e| e.goal == goal) {
            Some(index) => index,
            None => {
                self.effectors.push(FullBodyEffector::new(goal, bone));
                self.effectors.len() - 1
            }
        };
        &mut self.effectors[index]
    }

    pub fn add_bone_settings(&mut self, bone: &str) -> &mut FullBodyBoneSettings {
        let index = match self.bone_settings.iter().position(|s| s.bone == bone) {
            Some(index) => index,
            None => {
                self.bone_settings.push(FullBodyBoneSettings::new(bone));
                self.bone_settings.len() - 1
            }
        };
        &mut self.bone_settings[index]
    }

    pub fn is_ready(&self) -> bool {
        self.solver.is_ready()
    }
}

impl IkRigSolver for FullBodyIkSolver {
    fn nice_name(&self) -> &'static str {
        "Full Body IK"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn initialize(&mut self, skeleton: &IkRigSkeleton) {
        self.solver.reset();

        for (i, bone) in skeleton.bones().iter().enumerate() {
            // 被排除的骨骼不接入层级
            let parent = if skeleton.is_bone_excluded(i) {
                None
            } else {
                skeleton.get_parent_index_that_is_not_excluded(i)
            };
            let is_root = bone.name == self.root_bone;
            self.solver
                .add_bone(&bone.name, parent, skeleton.ref_pose_global[i], is_root);
        }

        for effector in &mut self.effectors {
            effector.index_in_solver = skeleton
                .get_bone_index_from_name(&effector.bone)
                .filter(|&i| !skeleton.is_bone_excluded(i))
                .and_then(|i| self.solver.add_effector(i));
        }

        self.bone_settings_indices = self
            .bone_settings
            .iter()
            .map(|s| skeleton.get_bone_index_from_name(&s.bone))
            .collect();

        if !self.solver.initialize() {
            log::debug!(
                target: "ik_rig",
                "full body IK not ready (root '{}', {} effectors)",
                self.root_bone,
                self.solver.num_effectors()
            );
        }
    }

    fn solve(&mut self, skeleton: &mut IkRigSkeleton, goals: &GoalContainer) {
        if !self.solver.is_ready() || self.solver.num_bones() != skeleton.num_bones() {
            return;
        }

        for (i, transform) in skeleton.current_pose_global.iter().enumerate() {
            self.solver.set_bone_transform(i, *transform);
        }

        for (settings, index) in self.bone_settings.iter().zip(&self.bone_settings_indices) {
            if let Some(index) = *index {
                self.solver.set_bone_settings(index, settings.solver_settings());
            }
        }

        // 目标混合已在目标解析阶段完成，这里按满强度推入
        for effector in &self.effectors {
            let Some(index) = effector.index_in_solver else {
                continue;
            };
            let Some(goal) = goals.find_goal_by_name(&effector.goal) else {
                continue;
            };
            self.solver.set_effector_goal(
                index,
                goal.final_blended_position,
                goal.final_blended_rotation,
                effector.solver_settings(),
            );
        }

        self.solver.solve(&self.settings);

        for (i, transform) in skeleton.current_pose_global.iter_mut().enumerate() {
            if let Some(solved) = self.solver.get_bone_transform(i) {
                *transform = solved;
            }
        }
        skeleton.update_all_local_transform_from_global();
    }

    fn required_bones(&self, out: &mut HashSet<String>) {
        if !self.root_bone.is_empty() {
            out.insert(self.root_bone.clone());
        }
        for effector in &self.effectors {
            out.insert(effector.bone.clone());
        }
    }

    fn required_goals(&self, out: &mut HashSet<String>) {
        for effector in &self.effectors {
            out.insert(effector.goal.clone());
        }
    }

    fn goal_bones(&self, out: &mut Vec<(String, String)>) {
        for effector in &self.effectors {
            out.push((effector.goal.clone(), effector.bone.clone()));
        }
    }

    fn on_goal_renamed(&mut self, old_name: &str, new_name: &str) {
        for effector in &mut self.effectors {
            if effector.goal == old_name {
                effector.goal = new_name.to_string();
            }
        }
    }

    fn on_goal_removed(&mut self, goal_name: &str) {
        let Some(position) = self.effectors.iter().position(|e| e.goal == goal_name) else {
            return;
        };
        let removed = self.effectors.remove(position);
        let Some(index) = removed.index_in_solver else {
            return;
        };
        if self.solver.remove_effector(index) {
            for effector in &mut self.effectors {
                if let Some(i) = effector.index_in_solver.as_mut() {
                    if *i > index {
                        *i -= 1;
                    }
                }
            }
        }
    }

    fn on_goal_moved_to_different_bone(&mut self, goal_name: &str, new_bone: &str) {
        for effector in &mut self.effectors {
            if effector.goal == goal_name {
                effector.bone = new_bone.to_string();
            }
        }
    }

    fn update_settings(&mut self, source: &dyn IkRigSolver) {
        let Some(other) = source.as_any().downcast_ref::<Self>() else {
            return;
        };
        self.enabled = other.enabled;
        self.settings = other.settings.clone();
        for effector in &mut self.effectors {
            if let Some(src) = other.effectors.iter().find(|e| e.goal == effector.goal) {
                effector.strength_alpha = src.strength_alpha;
                effector.chain_depth = src.chain_depth;
                effector.pull_chain_alpha = src.pull_chain_alpha;
                effector.pin_rotation = src.pin_rotation;
            }
        }
        for settings in &mut self.bone_settings {
            if let Some(src) = other.bone_settings.iter().find(|s| s.bone == settings.bone) {
                settings.stiffness = src.stiffness;
                settings.rotation_locks = src.rotation_locks;
                settings.max_swing_degrees = src.max_swing_degrees;
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
    use crate::testing::{biped_skeleton, resolved_goals, straight_chain_skeleton};
    use glam::Vec3;

    #[test]
    fn test_solve_moves_tip_and_keeps_locals_in_sync() {
        let mut skeleton = straight_chain_skeleton();
        let mut solver = FullBodyIkSolver::new("root");
        solver.add_effector("Tip", "tip");
        solver.initialize(&skeleton);
        assert!(solver.is_ready());

        let target = Vec3::new(3.0, 0.0, 8.0);
        let before = skeleton.current_pose_global[2].translation.distance(target);
        let goals = resolved_goals(&[IkRigGoal::new("Tip", "tip").with_position(target)]);
        solver.solve(&mut skeleton, &goals);

        let pose = skeleton.current_pose_global.clone();
        assert_eq!(pose[0].translation, Vec3::ZERO);
        assert!(pose[2].translation.distance(target) < before);

        let mut check = skeleton.clone();
        check.update_all_global_transform_from_local();
        for (a, b) in check.current_pose_global.iter().zip(&pose) {
            assert!(a.translation.abs_diff_eq(b.translation, 1e-4));
        }
    }

    #[test]
    fn test_not_ready_without_root_or_effectors() {
        let mut skeleton = straight_chain_skeleton();
        let before = skeleton.current_pose_global.clone();
        let goals = resolved_goals(&[IkRigGoal::new("Tip", "tip").with_position(Vec3::X)]);

        let mut solver = FullBodyIkSolver::new("root");
        solver.initialize(&skeleton);
        assert!(!solver.is_ready());
        solver.solve(&mut skeleton, &goals);
        assert_eq!(skeleton.current_pose_global, before);

        let mut solver = FullBodyIkSolver::new("no_such_bone");
        solver.add_effector("Tip", "tip");
        solver.initialize(&skeleton);
        assert!(!solver.is_ready());
    }

    #[test]
    fn test_settings_copy_and_goal_hooks() {
        let mut running = FullBodyIkSolver::new("root");
        running.add_effector("Tip", "tip");
        running.add_bone_settings("mid");

        let mut edited = running.clone();
        edited.settings.iterations = 3;
        edited.add_effector("Tip", "tip").strength_alpha = 0.25;
        edited.add_bone_settings("mid").rotation_locks = RotationLocks::X;

        running.update_settings(&edited);
        assert_eq!(running.settings.iterations, 3);
        assert_eq!(running.effectors[0].strength_alpha, 0.25);
        assert_eq!(running.bone_settings[0].rotation_locks, RotationLocks::X);

        running.on_goal_renamed("Tip", "Hand");
        let mut goals = HashSet::new();
        running.required_goals(&mut goals);
        assert!(goals.contains("Hand"));

        running.on_goal_removed("Hand");
        assert!(running.effectors.is_empty());
    }

    #[test]
    fn test_removed_effector_no_longer_pulls() {
        let mut skeleton = biped_skeleton();
        let rest = skeleton.current_pose_global.clone();
        let mut solver = FullBodyIkSolver::new("root");
        solver.add_effector("FootL", "foot_l");
        solver.add_effector("FootR", "foot_r");
        solver.initialize(&skeleton);

        let foot_l = IkRigGoal::new("FootL", "foot_l").with_position(Vec3::new(8.0, 0.0, 3.0));
        let foot_r = IkRigGoal::new("FootR", "foot_r").with_position(Vec3::new(-2.0, 0.0, 0.0));
        let goals = resolved_goals(&[foot_l.clone(), foot_r]);
        solver.solve(&mut skeleton, &goals);
        assert!(skeleton.current_pose_global[3].translation.x > 2.5);

        solver.on_goal_removed("FootL");
        assert!(solver.is_ready());
        skeleton.set_current_pose_to_ref_pose();
        solver.solve(&mut skeleton, &goals);
        for (a, b) in skeleton.current_pose_global.iter().zip(&rest) {
            assert!(a.translation.abs_diff_eq(b.translation, 1e-3));
        }

        // 剩余效应器的索引已前移，新目标仍能推入
        let target = Vec3::new(-4.0, 0.0, 2.0);
        let goals = resolved_goals(&[
            foot_l,
            IkRigGoal::new("FootR", "foot_r").with_position(target),
        ]);
        solver.solve(&mut skeleton, &goals);
        let reached = skeleton.current_pose_global[5].translation.distance(target);
        assert!(reached < rest[5].translation.distance(target));

        solver.on_goal_removed("FootR");
        assert!(!solver.is_ready());
    }
}
