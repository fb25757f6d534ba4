//! IK Rig 处理器
//!
//! 流程：initialize → 每帧 [set_input_pose_* → set_ik_goal → solve → get_output_pose_global]
//!
//! 初始化失败后不会重复尝试（避免每帧刷日志），
//! 调用方需显式 set_needs_initialized 后才会重新初始化。

use std::collections::{HashMap, HashSet};

use crate::config::{get_config, IkRigConfig};
use crate::definition::IkRigDefinition;
use crate::diagnostics::IkRigLogger;
use crate::goal::{GoalBone, GoalContainer, GoalSpace, IkRigGoal};
use crate::math;
use crate::skeleton::{BoneTransform, IkRigSkeleton, SkeletonSource};
use crate::solver::IkRigSolver;
use crate::{IkRigError, Result};

/// IK Rig 处理器
///
/// 独占骨架姿态和目标容器，求解器按栈顺序依次修改同一份姿态。
#[derive(Clone, Debug, Default)]
pub struct IkRigProcessor {
    skeleton: IkRigSkeleton,
    goal_container: GoalContainer,
    /// 目标名 → 绑定骨骼
    goal_bones: HashMap<String, GoalBone>,
    solvers: Vec<Box<dyn IkRigSolver>>,
    initialized: bool,
    /// 本轮初始化已失败
    tried_to_initialize: bool,
    config: IkRigConfig,
    rig_name: String,
}

impl IkRigProcessor {
    /// 创建处理器，拷贝当前全局配置
    pub fn new() -> Self {
        Self::with_config(get_config())
    }

    pub fn with_config(config: IkRigConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &IkRigConfig {
        &self.config
    }

    // ========================================
    // 初始化
    // ========================================

    /// 按资源定义初始化
    ///
    /// `optional_goals` 非空时替代定义中的目标列表。
    /// 结果通过 `is_initialized` 查询，诊断信息写入 `logger`。
    pub fn initialize(
        &mut self,
        definition: &IkRigDefinition,
        source: &SkeletonSource,
        optional_goals: &[IkRigGoal],
        logger: &mut IkRigLogger,
    ) {
        if self.tried_to_initialize {
            return;
        }

        self.initialized = false;
        self.tried_to_initialize = true;
        self.rig_name = definition.name.clone();
        logger.set_log_target(definition.name.clone());

        match self.try_initialize(definition, source, optional_goals, logger) {
            Ok(()) => {
                self.goal_container.clear_needs_initialized();
                self.initialized = true;
                self.tried_to_initialize = false;
                logger.info(format!(
                    "initialized with {} solvers, {} goals, {} bones",
                    self.solvers.len(),
                    self.goal_container.len(),
                    self.skeleton.num_bones()
                ));
            }
            Err(err) => logger.error(err.to_string()),
        }
    }

    fn try_initialize(
        &mut self,
        definition: &IkRigDefinition,
        source: &SkeletonSource,
        optional_goals: &[IkRigGoal],
        logger: &mut IkRigLogger,
    ) -> Result<()> {
        self.skeleton
            .set_input_skeleton(source, &definition.excluded_bones);
        if self.skeleton.is_empty() {
            return Err(IkRigError::EmptySkeleton);
        }

        check_skeleton_compatibility(definition, source, logger)?;

        let goals = if optional_goals.is_empty() {
            definition.goals.as_slice()
        } else {
            optional_goals
        };
        self.goal_container.fill_from_goal_array(goals);

        // 求解器需要但缺失或被禁用的目标
        let required_goals = required_goals(definition);
        let mut excluded_goals: Vec<&String> = required_goals
            .iter()
            .filter(|name| {
                self.goal_container
                    .find_goal_by_name(name)
                    .map_or(true, |g| !g.enabled)
            })
            .collect();
        excluded_goals.sort();
        for name in &excluded_goals {
            logger.info(format!("goal '{name}' is missing or disabled, excluded from solving"));
        }

        self.bind_goals(definition, &required_goals, logger)?;

        self.solvers.clear();
        for (index, entry) in definition.solvers.iter().enumerate() {
            let Some(solver) = entry else {
                logger.warning(format!("solver {index} is invalid and was skipped"));
                continue;
            };
            let mut solver = solver.clone();
            for name in &excluded_goals {
                solver.on_goal_removed(name);
            }
            solver.initialize(&self.skeleton);
            self.solvers.push(solver);
        }

        for chain in &definition.retarget_chains {
            if let Err(err) = self.skeleton.validate_chain_and_get_bones(chain) {
                logger.warning(err.to_string());
            }
        }

        Ok(())
    }

    /// 建立目标-骨骼绑定
    ///
    /// 骨骼名优先取目标自身，其次取求解器配置，最后取资源定义。
    fn bind_goals(
        &mut self,
        definition: &IkRigDefinition,
        required_goals: &HashSet<String>,
        logger: &mut IkRigLogger,
    ) -> Result<()> {
        self.goal_bones.clear();

        let mut pairs = Vec::new();
        for solver in definition.solvers.iter().flatten() {
            solver.goal_bones(&mut pairs);
        }
        let mut solver_bindings: HashMap<String, String> = HashMap::new();
        for (goal, bone) in pairs {
            match solver_bindings.get(&goal) {
                Some(first) if *first != bone => {
                    return Err(IkRigError::GoalBoneConflict {
                        goal,
                        first: first.clone(),
                        second: bone,
                    });
                }
                Some(_) => {}
                None => {
                    solver_bindings.insert(goal, bone);
                }
            }
        }

        for goal in self.goal_container.goals() {
            let solver_bone = solver_bindings.get(&goal.name);
            let bone_name = if !goal.bone_name.is_empty() {
                goal.bone_name.clone()
            } else if let Some(bone) = solver_bone {
                bone.clone()
            } else if let Some(bone) = definition.get_goal_bone_name(&goal.name) {
                bone.to_string()
            } else {
                return Err(IkRigError::GoalWithoutBone(goal.name.clone()));
            };

            let previous = solver_bone
                .or_else(|| self.goal_bones.get(&goal.name).map(|b| &b.bone_name));
            if let Some(first) = previous {
                if *first != bone_name {
                    return Err(IkRigError::GoalBoneConflict {
                        goal: goal.name.clone(),
                        first: first.clone(),
                        second: bone_name,
                    });
                }
            }

            let Some(bone_index) = self.skeleton.get_bone_index_from_name(&bone_name) else {
                return Err(IkRigError::GoalBoneMissing {
                    goal: goal.name.clone(),
                    bone: bone_name,
                });
            };

            if self.config.warn_disconnected_goals && !required_goals.contains(&goal.name) {
                logger.warning(format!("goal '{}' is not used by any solver", goal.name));
            }

            self.goal_bones
                .insert(goal.name.clone(), GoalBone { bone_name, bone_index });
        }

        Ok(())
    }

    /// 初始化前检查资源与骨架是否兼容
    pub fn is_compatible_with_skeleton(
        definition: &IkRigDefinition,
        source: &SkeletonSource,
        logger: &mut IkRigLogger,
    ) -> bool {
        match check_skeleton_compatibility(definition, source, logger) {
            Ok(()) => true,
            Err(err) => {
                logger.error(err.to_string());
                false
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 允许下一次 initialize 重新执行
    pub fn set_needs_initialized(&mut self) {
        self.initialized = false;
        self.tried_to_initialize = false;
    }

    /// 清空全部运行时状态
    pub fn reset(&mut self) {
        self.skeleton.reset();
        self.goal_container = GoalContainer::new();
        self.goal_bones.clear();
        self.solvers.clear();
        self.rig_name.clear();
        self.set_needs_initialized();
    }

    // ========================================
    // 输入
    // ========================================

    /// 设置输入姿态（组件空间全局变换）
    ///
    /// 骨骼数量不一致时忽略输入并要求重新初始化。
    pub fn set_input_pose_global(&mut self, pose: &[BoneTransform]) {
        if !self.initialized {
            return;
        }
        if pose.len() != self.skeleton.num_bones() {
            log::warn!(
                target: "ik_rig",
                "[{}] input pose has {} bones, expected {}",
                self.rig_name,
                pose.len(),
                self.skeleton.num_bones()
            );
            self.set_needs_initialized();
            return;
        }
        self.skeleton.current_pose_global.copy_from_slice(pose);
        self.skeleton.update_all_local_transform_from_global();
    }

    /// 设置输入姿态（本地变换）
    pub fn set_input_pose_local(&mut self, pose: &[BoneTransform]) {
        if !self.initialized {
            return;
        }
        if pose.len() != self.skeleton.num_bones() {
            self.set_needs_initialized();
            return;
        }
        self.skeleton.current_pose_local.copy_from_slice(pose);
        self.skeleton.update_all_global_transform_from_local();
    }

    pub fn set_input_pose_to_ref_pose(&mut self) {
        if !self.initialized {
            return;
        }
        self.skeleton.set_current_pose_to_ref_pose();
    }

    /// 更新目标；新名称或启用状态变化会标记需要重新初始化
    pub fn set_ik_goal(&mut self, goal: &IkRigGoal) {
        if !self.initialized {
            return;
        }
        self.goal_container.set_ik_goal(goal);
    }

    pub fn apply_goals_from_other_container(&mut self, other: &GoalContainer) {
        if !self.initialized {
            return;
        }
        for goal in other.goals() {
            self.goal_container.set_ik_goal(goal);
        }
    }

    /// 从资源定义拷贝目标和求解器设置，不重新初始化
    pub fn copy_all_inputs_from_definition(&mut self, definition: &IkRigDefinition) {
        if !self.initialized {
            return;
        }

        for src in &definition.goals {
            if let Some(goal) = self.goal_container.find_goal_by_name_mut(&src.name) {
                goal.position = src.position;
                goal.rotation = src.rotation;
                goal.position_alpha = src.position_alpha;
                goal.rotation_alpha = src.rotation_alpha;
                goal.position_space = src.position_space;
                goal.rotation_space = src.rotation_space;
                goal.source_bone.clone_from(&src.source_bone);
            }
        }

        let sources: Vec<&dyn IkRigSolver> = definition
            .solvers
            .iter()
            .flatten()
            .map(|s| &**s)
            .collect();
        if sources.len() != self.solvers.len() {
            log::warn!(
                target: "ik_rig",
                "[{}] solver stack changed ({} → {}), settings not copied",
                self.rig_name,
                self.solvers.len(),
                sources.len()
            );
            return;
        }
        for (solver, source) in self.solvers.iter_mut().zip(sources) {
            solver.update_settings(source);
        }
    }

    // ========================================
    // 目标编辑
    // ========================================

    /// 重命名目标并通知全部求解器
    pub fn rename_goal(&mut self, old_name: &str, new_name: &str) -> bool {
        if !self.goal_container.rename_goal(old_name, new_name) {
            return false;
        }
        for solver in &mut self.solvers {
            solver.on_goal_renamed(old_name, new_name);
        }
        if let Some(binding) = self.goal_bones.remove(old_name) {
            self.goal_bones.insert(new_name.to_string(), binding);
        }
        true
    }

    /// 删除目标并通知全部求解器
    pub fn remove_goal(&mut self, name: &str) -> bool {
        if self.goal_container.remove_goal(name).is_none() {
            return false;
        }
        for solver in &mut self.solvers {
            solver.on_goal_removed(name);
        }
        self.goal_bones.remove(name);
        true
    }

    /// 把目标移到另一根骨骼
    ///
    /// 通知全部求解器后就地重建它们的骨骼缓存，不需要重新初始化处理器。
    pub fn move_goal_to_bone(&mut self, goal_name: &str, bone_name: &str) -> bool {
        let Some(bone_index) = self.skeleton.get_bone_index_from_name(bone_name) else {
            log::warn!(
                target: "ik_rig",
                "[{}] cannot move goal '{goal_name}' to missing bone '{bone_name}'",
                self.rig_name
            );
            return false;
        };
        if !self.goal_container.set_goal_bone(goal_name, bone_name) {
            return false;
        }
        for solver in &mut self.solvers {
            solver.on_goal_moved_to_different_bone(goal_name, bone_name);
            solver.initialize(&self.skeleton);
        }
        self.goal_bones.insert(
            goal_name.to_string(),
            GoalBone {
                bone_name: bone_name.to_string(),
                bone_index,
            },
        );
        true
    }

    // ========================================
    // 求解
    // ========================================

    /// 解析目标后按栈顺序运行全部启用的求解器
    pub fn solve(&mut self, world_to_component: &BoneTransform) {
        if !self.initialized {
            return;
        }

        self.resolve_final_goal_transforms(world_to_component);

        for solver in &mut self.solvers {
            if !solver.is_enabled() {
                continue;
            }
            if self.config.debug_log {
                log::debug!(target: "ik_rig", "[{}] solve '{}'", self.rig_name, solver.nice_name());
            }
            solver.solve(&mut self.skeleton, &self.goal_container);
        }

        if self.config.normalize_rotations {
            IkRigSkeleton::normalize_rotations(&mut self.skeleton.current_pose_global);
            IkRigSkeleton::normalize_rotations(&mut self.skeleton.current_pose_local);
        }
    }

    /// 计算每个已绑定目标的最终混合变换
    ///
    /// 使用求解开始时的姿态，求解器之间不重新计算。
    fn resolve_final_goal_transforms(&mut self, world_to_component: &BoneTransform) {
        let skeleton = &self.skeleton;
        let pose = &skeleton.current_pose_global;

        for goal in self.goal_container.goals_mut() {
            let Some(binding) = self.goal_bones.get(&goal.name) else {
                continue;
            };
            let current = pose[binding.bone_index];

            let source_bone = goal
                .source_bone
                .as_deref()
                .and_then(|name| skeleton.get_bone_index_from_name(name));

            let (position, rotation) = match source_bone {
                Some(index) => (pose[index].translation, pose[index].rotation),
                None => {
                    let position = match goal.position_space {
                        GoalSpace::Additive => current.translation + goal.position,
                        GoalSpace::Component => goal.position,
                        GoalSpace::World => world_to_component.transform_point(goal.position),
                    };
                    let rotation = match goal.rotation_space {
                        GoalSpace::Additive => goal.rotation * current.rotation,
                        GoalSpace::Component => goal.rotation,
                        GoalSpace::World => world_to_component.rotation * goal.rotation,
                    };
                    (position, rotation)
                }
            };

            goal.final_blended_position =
                math::blend_position(current.translation, position, goal.position_alpha);
            goal.final_blended_rotation =
                math::blend_rotation(current.rotation, rotation, goal.rotation_alpha);
        }
    }

    // ========================================
    // 输出 / 访问器
    // ========================================

    /// 求解结果（组件空间全局变换）
    pub fn get_output_pose_global(&self) -> &[BoneTransform] {
        &self.skeleton.current_pose_global
    }

    pub fn get_output_pose_local(&self) -> &[BoneTransform] {
        &self.skeleton.current_pose_local
    }

    pub fn goal_container(&self) -> &GoalContainer {
        &self.goal_container
    }

    pub fn get_goal_bone(&self, goal_name: &str) -> Option<&GoalBone> {
        self.goal_bones.get(goal_name)
    }

    pub fn skeleton(&self) -> &IkRigSkeleton {
        &self.skeleton
    }

    pub fn solvers(&self) -> &[Box<dyn IkRigSolver>] {
        &self.solvers
    }

    pub fn solver_mut(&mut self, index: usize) -> Option<&mut dyn IkRigSolver> {
        self.solvers.get_mut(index).map(|s| s.as_mut())
    }
}

fn required_goals(definition: &IkRigDefinition) -> HashSet<String> {
    let mut goals = HashSet::new();
    for solver in definition.solvers.iter().flatten() {
        solver.required_goals(&mut goals);
    }
    goals
}

/// 资源需要的骨骼都在输入骨架中，且祖先关系一致
fn check_skeleton_compatibility(
    definition: &IkRigDefinition,
    source: &SkeletonSource,
    logger: &mut IkRigLogger,
) -> Result<()> {
    let mut required: HashSet<String> = HashSet::new();
    for solver in definition.solvers.iter().flatten() {
        solver.required_bones(&mut required);
    }
    for goal in &definition.goals {
        if !goal.bone_name.is_empty() {
            required.insert(goal.bone_name.clone());
        }
    }
    let mut required: Vec<String> = required.into_iter().collect();
    required.sort();

    for bone in &required {
        let Some(index) = source.find_bone(bone) else {
            return Err(IkRigError::MissingBone(bone.clone()));
        };

        let Some(expected_parent) = definition.skeleton.parent_name(bone) else {
            continue;
        };
        if source.parent_name(bone) == Some(expected_parent) {
            continue;
        }
        if source.has_ancestor(index, expected_parent) {
            logger.warning(format!(
                "bone '{bone}' has a different parent than '{expected_parent}' in the input skeleton"
            ));
        } else {
            return Err(IkRigError::MissingAncestor {
                bone: bone.clone(),
                ancestor: expected_parent.to_string(),
            });
        }
    }

    Ok(())
}
