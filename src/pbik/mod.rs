//! 粒子全身 IK 求解器
//!
//! 对外只提供：添加骨骼、添加效应器、设置输入姿态与目标、求解、读回结果。
//! 求解分三步：
//! 1. 粒子阶段：效应器拉动粒子，距离约束保持骨长
//! 2. 旋转阶段：按子粒子的位移拟合每根骨骼的旋转
//! 3. 前向运动学：用输入本地偏移重建全局变换

mod settings;

pub use settings::{
    PbikBoneSettings, PbikEffectorSettings, PbikSolverSettings, RootBehavior, RotationLocks,
};

use glam::{Quat, Vec3};

use crate::math;
use crate::skeleton::BoneTransform;

/// 粒子距离小于该值时跳过约束
const MIN_PARTICLE_DISTANCE: f32 = 1.0e-6;

#[derive(Clone, Debug)]
struct PbikBone {
    name: String,
    parent: Option<usize>,
    is_root: bool,
    input: BoneTransform,
    output: BoneTransform,
    settings: PbikBoneSettings,
    children: Vec<usize>,
}

#[derive(Clone, Debug)]
struct PbikEffector {
    bone: usize,
    goal_position: Vec3,
    goal_rotation: Quat,
    settings: PbikEffectorSettings,
}

/// 粒子全身 IK 求解器
///
/// 骨骼必须按父在前的顺序添加。
#[derive(Clone, Debug, Default)]
pub struct ParticleSolver {
    bones: Vec<PbikBone>,
    effectors: Vec<PbikEffector>,
    root: Option<usize>,
    ready: bool,
}

impl ParticleSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清空所有骨骼和效应器
    pub fn reset(&mut self) {
        self.bones.clear();
        self.effectors.clear();
        self.root = None;
        self.ready = false;
    }

    // ========================================
    // 注册
    // ========================================

    /// 添加骨骼，返回求解器内部索引
    ///
    /// 索引不小于自身的父骨骼视为无父骨骼。
    pub fn add_bone(
        &mut self,
        name: &str,
        parent: Option<usize>,
        ref_global: BoneTransform,
        is_root: bool,
    ) -> usize {
        let index = self.bones.len();
        if is_root && self.root.is_none() {
            self.root = Some(index);
        }
        self.bones.push(PbikBone {
            name: name.to_string(),
            parent: parent.filter(|&p| p < index),
            is_root,
            input: ref_global,
            output: ref_global,
            settings: PbikBoneSettings::default(),
            children: Vec::new(),
        });
        self.ready = false;
        index
    }

    /// 在骨骼上添加效应器，返回效应器索引
    pub fn add_effector(&mut self, bone: usize) -> Option<usize> {
        let transform = self.bones.get(bone)?.input;
        self.effectors.push(PbikEffector {
            bone,
            goal_position: transform.translation,
            goal_rotation: transform.rotation,
            settings: PbikEffectorSettings::default(),
        });
        self.ready = false;
        Some(self.effectors.len() - 1)
    }

    /// 删除效应器，后面的效应器索引前移一位
    ///
    /// 删除最后一个效应器后求解器不再就绪。
    pub fn remove_effector(&mut self, index: usize) -> bool {
        if index >= self.effectors.len() {
            return false;
        }
        self.effectors.remove(index);
        if self.effectors.is_empty() {
            self.ready = false;
        }
        true
    }

    /// 构建子骨骼表；没有根骨骼或没有效应器时返回 false
    pub fn initialize(&mut self) -> bool {
        self.ready = false;
        if self.root.is_none() || self.effectors.is_empty() {
            return false;
        }

        for bone in &mut self.bones {
            bone.children.clear();
        }
        for i in 0..self.bones.len() {
            if let Some(parent) = self.bones[i].parent {
                self.bones[parent].children.push(i);
            }
        }

        self.ready = true;
        true
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    pub fn num_effectors(&self) -> usize {
        self.effectors.len()
    }

    pub fn bone_name(&self, index: usize) -> Option<&str> {
        self.bones.get(index).map(|b| b.name.as_str())
    }

    pub fn root(&self) -> Option<usize> {
        self.root
    }

    // ========================================
    // 输入 / 输出
    // ========================================

    /// 设置骨骼的输入全局变换
    pub fn set_bone_transform(&mut self, index: usize, transform: BoneTransform) {
        if let Some(bone) = self.bones.get_mut(index) {
            bone.input = transform;
        }
    }

    /// 读取求解后的全局变换
    pub fn get_bone_transform(&self, index: usize) -> Option<BoneTransform> {
        self.bones.get(index).map(|b| b.output)
    }

    pub fn set_bone_settings(&mut self, index: usize, settings: PbikBoneSettings) {
        if let Some(bone) = self.bones.get_mut(index) {
            bone.settings = settings;
        }
    }

    pub fn set_effector_goal(
        &mut self,
        index: usize,
        position: Vec3,
        rotation: Quat,
        settings: PbikEffectorSettings,
    ) {
        if let Some(effector) = self.effectors.get_mut(index) {
            effector.goal_position = position;
            effector.goal_rotation = rotation;
            effector.settings = settings;
        }
    }

    // ========================================
    // 求解
    // ========================================

    pub fn solve(&mut self, settings: &PbikSolverSettings) {
        if !self.ready {
            return;
        }

        let count = self.bones.len();
        let input: Vec<BoneTransform> = self.bones.iter().map(|b| b.input).collect();
        let pin_root = settings.root_behavior == RootBehavior::PinToInput;

        let active = self.collect_active_bones();
        let can_rotate: Vec<bool> = (0..count)
            .map(|i| active[i] && !(pin_root && self.bones[i].is_root))
            .collect();
        // 子骨骼位置由父骨骼旋转决定，父骨骼能转动时才可移动
        let movable: Vec<bool> = (0..count)
            .map(|i| {
                active[i]
                    && match self.bones[i].parent {
                        Some(p) => can_rotate[p],
                        None => self.bones[i].is_root && !pin_root,
                    }
            })
            .collect();

        let rest_lengths: Vec<f32> = self
            .bones
            .iter()
            .enumerate()
            .map(|(i, b)| {
                b.parent
                    .map_or(0.0, |p| input[i].translation.distance(input[p].translation))
            })
            .collect();

        // 粒子阶段
        let mut particles: Vec<Vec3> = input.iter().map(|t| t.translation).collect();
        let relaxation = settings.over_relaxation.clamp(1.0, 1.99);
        let max_step = settings.max_angle.max(0.0).to_radians();
        for _ in 0..settings.iterations {
            let previous = particles.clone();
            self.pull_effectors(&mut particles, &movable);
            for _ in 0..=settings.sub_iterations {
                self.project_lengths(&mut particles, &rest_lengths, &active, &movable, relaxation);
            }
            if max_step > 0.0 {
                self.limit_swing(&mut particles, &previous, &movable, max_step);
            }
        }

        // 旋转阶段 + 前向运动学（父骨骼先于子骨骼）
        let mut effector_of = vec![None; count];
        for effector in &self.effectors {
            effector_of[effector.bone] = Some(effector);
        }

        let mut output = input.clone();
        for i in 0..count {
            let bone = &self.bones[i];
            let mut transform = match bone.parent {
                Some(p) => output[p].mul_transform(&input[i].relative_to(&input[p])),
                None => input[i],
            };
            if movable[i] && (settings.allow_stretch || bone.parent.is_none()) {
                transform.translation = particles[i];
            }

            if can_rotate[i] {
                let delta = self.fit_rotation(i, &input, &output, &particles, &active);
                transform.rotation = (delta * input[i].rotation).normalize();

                if let Some(effector) = effector_of[i] {
                    transform.rotation = math::blend_rotation(
                        transform.rotation,
                        effector.goal_rotation,
                        effector.settings.pin_rotation,
                    );
                }
            }

            output[i] = transform;
        }

        for (bone, transform) in self.bones.iter_mut().zip(output) {
            bone.output = transform;
        }
    }

    /// 效应器向上 chain_depth 层的祖先（近的在前）
    fn effector_chain(&self, effector: &PbikEffector) -> Vec<usize> {
        let depth = effector.settings.chain_depth as usize;
        let mut chain = Vec::new();
        let mut current = self.bones[effector.bone].parent;
        while let Some(p) = current {
            if depth > 0 && chain.len() >= depth {
                break;
            }
            chain.push(p);
            current = self.bones[p].parent;
        }
        chain
    }

    fn collect_active_bones(&self) -> Vec<bool> {
        let mut active = vec![false; self.bones.len()];
        for effector in &self.effectors {
            active[effector.bone] = true;
            for bone in self.effector_chain(effector) {
                active[bone] = true;
            }
        }
        active
    }

    fn pull_effectors(&self, particles: &mut [Vec3], movable: &[bool]) {
        for effector in &self.effectors {
            let bone = effector.bone;
            if !movable[bone] {
                continue;
            }
            let settings = &effector.settings;
            let target = math::blend_position(
                particles[bone],
                effector.goal_position,
                settings.strength_alpha,
            );
            let offset = target - particles[bone];
            particles[bone] = target;

            if settings.pull_chain_alpha <= math::KINDA_SMALL_NUMBER {
                continue;
            }
            // 祖先按距离线性衰减
            let chain = self.effector_chain(effector);
            let span = chain.len() as f32 + 1.0;
            for (k, &ancestor) in chain.iter().enumerate() {
                if movable[ancestor] {
                    let falloff = 1.0 - (k as f32 + 1.0) / span;
                    particles[ancestor] += offset * (settings.pull_chain_alpha * falloff);
                }
            }
        }
    }

    fn project_lengths(
        &self,
        particles: &mut [Vec3],
        rest_lengths: &[f32],
        active: &[bool],
        movable: &[bool],
        relaxation: f32,
    ) {
        for (i, bone) in self.bones.iter().enumerate() {
            let Some(p) = bone.parent else {
                continue;
            };
            if !active[i] {
                continue;
            }
            let wi = if movable[i] { 1.0 } else { 0.0 };
            let wp = if movable[p] { 1.0 } else { 0.0 };
            if wi + wp <= 0.0 {
                continue;
            }

            let delta = particles[i] - particles[p];
            let length = delta.length();
            if length < MIN_PARTICLE_DISTANCE {
                continue;
            }
            let correction = delta * ((length - rest_lengths[i]) / length * relaxation / (wi + wp));
            particles[i] -= correction * wi;
            particles[p] += correction * wp;
        }
    }

    /// 限制每次迭代中骨骼绕父粒子的摆动角
    fn limit_swing(&self, particles: &mut [Vec3], previous: &[Vec3], movable: &[bool], max_step: f32) {
        for i in 0..particles.len() {
            if !movable[i] {
                continue;
            }
            let Some(p) = self.bones[i].parent else {
                continue;
            };
            let before = previous[i] - previous[p];
            let after = particles[i] - particles[p];
            let (Some(from), Some(to)) = (before.try_normalize(), after.try_normalize()) else {
                continue;
            };
            if from.angle_between(to) <= max_step {
                continue;
            }
            let limited = math::clamp_rotation_angle(Quat::from_rotation_arc(from, to), max_step);
            particles[i] = particles[p] + limited * from * after.length();
        }
    }

    /// 拟合骨骼的全局旋转增量
    ///
    /// 没有参与求解的子骨骼时沿用父骨骼的增量。
    fn fit_rotation(
        &self,
        index: usize,
        input: &[BoneTransform],
        output: &[BoneTransform],
        particles: &[Vec3],
        active: &[bool],
    ) -> Quat {
        let bone = &self.bones[index];
        let children: Vec<usize> = bone.children.iter().copied().filter(|&c| active[c]).collect();

        let delta = match children.as_slice() {
            [] => {
                return bone.parent.map_or(Quat::IDENTITY, |p| {
                    (output[p].rotation * input[p].rotation.inverse()).normalize()
                });
            }
            [child] => {
                let from = input[*child].translation - input[index].translation;
                let to = particles[*child] - particles[index];
                match (from.try_normalize(), to.try_normalize()) {
                    (Some(from), Some(to)) => {
                        math::rotation_arc_with_fallback(from, to, from.any_orthonormal_vector())
                    }
                    _ => Quat::IDENTITY,
                }
            }
            _ => {
                let mut initial = vec![input[index].translation];
                let mut current = vec![particles[index]];
                for &c in &children {
                    initial.push(input[c].translation);
                    current.push(particles[c]);
                }
                math::rotation_from_deformed_points(&initial, &current).0
            }
        };

        self.apply_bone_settings(bone, delta)
    }

    fn apply_bone_settings(&self, bone: &PbikBone, delta: Quat) -> Quat {
        let settings = &bone.settings;
        let mut delta = math::scale_rotation(delta, 1.0 - settings.stiffness.clamp(0.0, 1.0));

        if !settings.rotation_locks.is_empty() {
            let weight = |axis: RotationLocks| {
                if settings.rotation_locks.contains(axis) {
                    0.0
                } else {
                    1.0
                }
            };
            delta = math::weight_rotation_per_axis(
                delta,
                Vec3::new(
                    weight(RotationLocks::X),
                    weight(RotationLocks::Y),
                    weight(RotationLocks::Z),
                ),
            );
        }

        if settings.max_swing_degrees > 0.0 {
            delta = math::clamp_rotation_angle(delta, settings.max_swing_degrees.to_radians());
        }
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root(0,0,0) → a(0,0,5) → b(0,0,10) → c(0,0,15)
    fn straight_solver(effector_settings: PbikEffectorSettings, goal: Vec3) -> ParticleSolver {
        let mut solver = ParticleSolver::new();
        let mut parent = None;
        for (i, name) in ["root", "a", "b", "c"].iter().enumerate() {
            let transform = BoneTransform::from_translation(Vec3::new(0.0, 0.0, 5.0 * i as f32));
            parent = Some(solver.add_bone(name, parent, transform, i == 0));
        }
        let effector = solver.add_effector(3).unwrap();
        solver.set_effector_goal(effector, goal, Quat::IDENTITY, effector_settings);
        assert!(solver.initialize());
        solver
    }

    fn output(solver: &ParticleSolver) -> Vec<BoneTransform> {
        (0..solver.num_bones())
            .map(|i| solver.get_bone_transform(i).unwrap())
            .collect()
    }

    #[test]
    fn test_not_ready_without_effector_or_root() {
        let mut solver = ParticleSolver::new();
        solver.add_bone("root", None, BoneTransform::IDENTITY, true);
        assert!(!solver.initialize());

        let mut solver = ParticleSolver::new();
        let bone = solver.add_bone("root", None, BoneTransform::IDENTITY, false);
        solver.add_effector(bone);
        assert!(!solver.initialize());
        assert!(solver.add_effector(7).is_none());

        // 未就绪时求解为空操作
        solver.set_bone_transform(bone, BoneTransform::from_translation(Vec3::X));
        solver.solve(&PbikSolverSettings::default());
        assert_eq!(solver.get_bone_transform(bone), Some(BoneTransform::IDENTITY));
    }

    #[test]
    fn test_reaches_goal_with_pinned_root() {
        let goal = Vec3::new(5.0, 0.0, 10.0);
        let mut solver = straight_solver(PbikEffectorSettings::default(), goal);
        let before = Vec3::new(0.0, 0.0, 15.0).distance(goal);

        solver.solve(&PbikSolverSettings::default());
        let pose = output(&solver);

        assert_eq!(pose[0].translation, Vec3::ZERO);
        assert_eq!(pose[1].translation, Vec3::new(0.0, 0.0, 5.0));
        assert!(pose[3].translation.distance(goal) < 0.5);
        assert!(pose[3].translation.distance(goal) < before);
        for i in 1..4 {
            let length = pose[i].translation.distance(pose[i - 1].translation);
            assert!((length - 5.0).abs() < 1e-3);
        }
        // 效应器旋转对齐目标
        assert!(pose[3].rotation.abs_diff_eq(Quat::IDENTITY, 1e-5));
    }

    #[test]
    fn test_remove_last_effector_stops_solving() {
        let mut solver = straight_solver(PbikEffectorSettings::default(), Vec3::new(5.0, 0.0, 10.0));
        assert!(!solver.remove_effector(1));
        assert!(solver.remove_effector(0));
        assert_eq!(solver.num_effectors(), 0);
        assert!(!solver.is_ready());

        solver.solve(&PbikSolverSettings::default());
        assert_eq!(output(&solver)[3].translation, Vec3::new(0.0, 0.0, 15.0));
    }

    #[test]
    fn test_free_root_is_pulled() {
        let goal = Vec3::new(0.0, 0.0, 40.0);
        let mut solver = straight_solver(PbikEffectorSettings::default(), goal);
        solver.solve(&PbikSolverSettings::default());
        assert_eq!(output(&solver)[0].translation, Vec3::ZERO);

        let settings = PbikSolverSettings {
            root_behavior: RootBehavior::Free,
            ..Default::default()
        };
        solver.solve(&settings);
        assert!(output(&solver)[0].translation.z > 1.0);
    }

    #[test]
    fn test_chain_depth_limits_affected_bones() {
        let effector_settings = PbikEffectorSettings {
            chain_depth: 1,
            ..Default::default()
        };
        let mut solver = straight_solver(effector_settings, Vec3::new(5.0, 0.0, 10.0));
        solver.solve(&PbikSolverSettings::default());
        let pose = output(&solver);

        assert_eq!(pose[1], BoneTransform::from_translation(Vec3::new(0.0, 0.0, 5.0)));
        assert!(pose[2].translation.abs_diff_eq(Vec3::new(0.0, 0.0, 10.0), 1e-5));
        assert!(pose[3].translation.x > 1.0);
    }

    #[test]
    fn test_rotation_locks_hold_bone() {
        let effector_settings = PbikEffectorSettings {
            chain_depth: 1,
            ..Default::default()
        };
        let mut solver = straight_solver(effector_settings, Vec3::new(5.0, 0.0, 10.0));
        solver.set_bone_settings(
            2,
            PbikBoneSettings {
                rotation_locks: RotationLocks::all(),
                ..Default::default()
            },
        );
        solver.solve(&PbikSolverSettings::default());
        let pose = output(&solver);

        assert!(pose[2].rotation.abs_diff_eq(Quat::IDENTITY, 1e-5));
        assert!(pose[3].translation.abs_diff_eq(Vec3::new(0.0, 0.0, 15.0), 1e-4));
    }
}
