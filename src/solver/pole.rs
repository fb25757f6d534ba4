//! Pole 求解器 - 绕 起点↔末端 轴旋转链，使膝/肘朝向极点目标
//!
//! 末端骨骼的全局变换保持不变。

use std::any::Any;
use std::collections::HashSet;

use crate::goal::GoalContainer;
use crate::math::{self, KINDA_SMALL_NUMBER};
use crate::skeleton::IkRigSkeleton;

use super::{build_chain, collect_non_chain_children, commit_chain, IkRigSolver};

#[derive(Clone, Debug)]
pub struct PoleSolver {
    pub enabled: bool,
    pub start_bone: String,
    pub end_bone: String,
    /// 极点目标
    pub aim_at_goal: String,
    /// 旋转混合系数
    pub pole_alpha: f32,

    /// 链骨骼索引（根 → 末端）
    chain: Vec<usize>,
    children_to_update: Vec<usize>,
}

impl Default for PoleSolver {
    fn default() -> Self {
        Self {
            enabled: true,
            start_bone: String::new(),
            end_bone: String::new(),
            aim_at_goal: String::new(),
            pole_alpha: 1.0,
            chain: Vec::new(),
            children_to_update: Vec::new(),
        }
    }
}

impl PoleSolver {
    pub fn new(start_bone: &str, end_bone: &str, aim_at_goal: &str) -> Self {
        Self {
            start_bone: start_bone.to_string(),
            end_bone: end_bone.to_string(),
            aim_at_goal: aim_at_goal.to_string(),
            ..Default::default()
        }
    }

    pub fn is_ready(&self) -> bool {
        self.chain.len() >= 3
    }
}

impl IkRigSolver for PoleSolver {
    fn nice_name(&self) -> &'static str {
        "Pole"
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
        if chain.len() < 3 {
            return;
        }

        // 末端骨骼全局不变，其子骨骼不需要刷新
        let upper = &chain[..chain.len() - 1];
        let mut children = collect_non_chain_children(skeleton, upper);
        children.retain(|c| !chain.contains(c));
        self.children_to_update = children;
        self.chain = chain;
    }

    fn solve(&mut self, skeleton: &mut IkRigSkeleton, goals: &GoalContainer) {
        if !self.is_ready() || self.pole_alpha < KINDA_SMALL_NUMBER {
            return;
        }
        let Some(goal) = goals.find_goal_by_name(&self.aim_at_goal) else {
            return;
        };

        let last = self.chain.len() - 1;
        let pose = &skeleton.current_pose_global;
        let root = pose[self.chain[0]].translation;
        let knee = pose[self.chain[1]].translation;
        let end = pose[self.chain[last]].translation;
        let pole = goal.final_blended_position;

        let Some(axis) = (end - root).try_normalize() else {
            return;
        };
        let (Some(knee_dir), Some(pole_dir)) =
            ((knee - root).try_normalize(), (pole - root).try_normalize())
        else {
            return;
        };

        // 当前弯曲平面法线 与 目标平面法线
        let (Some(knee_normal), Some(pole_normal)) = (
            axis.cross(knee_dir).try_normalize(),
            axis.cross(pole_dir).try_normalize(),
        ) else {
            return;
        };

        if knee_normal.dot(pole_normal) > 1.0 - KINDA_SMALL_NUMBER {
            return;
        }

        let delta = math::rotation_arc_with_fallback(knee_normal, pole_normal, axis);
        let delta = math::scale_rotation(delta, self.pole_alpha.min(1.0));

        for &bone in &self.chain[..last] {
            let transform = &mut skeleton.current_pose_global[bone];
            transform.translation = root + delta * (transform.translation - root);
            transform.rotation = (delta * transform.rotation).normalize();
        }

        commit_chain(skeleton, &self.chain, &self.children_to_update);
    }

    fn required_bones(&self, out: &mut HashSet<String>) {
        out.insert(self.start_bone.clone());
        out.insert(self.end_bone.clone());
    }

    fn required_goals(&self, out: &mut HashSet<String>) {
        if !self.aim_at_goal.is_empty() {
            out.insert(self.aim_at_goal.clone());
        }
    }

    fn on_goal_renamed(&mut self, old_name: &str, new_name: &str) {
        if self.aim_at_goal == old_name {
            self.aim_at_goal = new_name.to_string();
        }
    }

    fn on_goal_removed(&mut self, goal_name: &str) {
        if self.aim_at_goal == goal_name {
            self.aim_at_goal.clear();
        }
    }

    fn update_settings(&mut self, source: &dyn IkRigSolver) {
        if let Some(other) = source.as_any().downcast_ref::<Self>() {
            self.enabled = other.enabled;
            self.pole_alpha = other.pole_alpha;
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
    use crate::testing::{bent_leg_skeleton, resolved_goals};
    use glam::Vec3;

    #[test]
    fn test_end_bone_unchanged() {
        let mut skeleton = bent_leg_skeleton();
        let before = skeleton.current_pose_global.clone();

        let mut solver = PoleSolver::new("thigh", "foot", "KneePole");
        solver.initialize(&skeleton);
        assert!(solver.is_ready());

        let goals = resolved_goals(&[
            IkRigGoal::new("KneePole", "calf").with_position(Vec3::new(10.0, 0.0, -5.0)),
        ]);
        solver.solve(&mut skeleton, &goals);

        let pose = &skeleton.current_pose_global;
        assert!(pose[3].translation.abs_diff_eq(before[3].translation, 1e-4));
        assert!(pose[3].rotation.dot(before[3].rotation).abs() > 1.0 - 1e-5);
        // 根位置不变
        assert!(pose[1].translation.abs_diff_eq(before[1].translation, 1e-5));
        // 膝盖转向极点（+X）
        assert!(pose[2].translation.x > 0.5);
        assert!(pose[2].translation.y.abs() < 1e-3);
        // 膝盖仍在 根-末端 距离上
        assert!((pose[2].translation.distance(pose[1].translation)
            - before[2].translation.distance(before[1].translation))
        .abs()
            < 1e-4);
    }

    #[test]
    fn test_zero_alpha_noop() {
        let mut skeleton = bent_leg_skeleton();
        let before = skeleton.current_pose_global.clone();
        let goals = resolved_goals(&[
            IkRigGoal::new("KneePole", "calf").with_position(Vec3::new(10.0, 0.0, -5.0)),
        ]);

        let mut solver = PoleSolver::new("thigh", "foot", "KneePole");
        solver.pole_alpha = 0.0;
        solver.initialize(&skeleton);
        solver.solve(&mut skeleton, &goals);
        assert_eq!(skeleton.current_pose_global, before);
    }

    #[test]
    fn test_pole_on_axis_is_noop() {
        let mut skeleton = bent_leg_skeleton();
        let before = skeleton.current_pose_global.clone();
        let foot = before[3].translation;

        let mut solver = PoleSolver::new("thigh", "foot", "KneePole");
        solver.initialize(&skeleton);
        let goals = resolved_goals(&[IkRigGoal::new("KneePole", "calf").with_position(foot * 2.0)]);
        solver.solve(&mut skeleton, &goals);
        assert_eq!(skeleton.current_pose_global, before);
    }
}
