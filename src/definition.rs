//! IK Rig 定义（资源快照）
//!
//! 处理器在初始化时只读访问定义：参考骨架、排除骨骼、求解器栈、目标声明、重定向链。

use crate::goal::IkRigGoal;
use crate::skeleton::SkeletonSource;
use crate::solver::IkRigSolver;

/// 重定向骨骼链（只做校验，不参与 IK 计算）
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoneChain {
    pub name: String,
    pub start_bone: String,
    pub end_bone: String,
    /// 关联的 IK 目标
    pub ik_goal_name: Option<String>,
}

impl BoneChain {
    pub fn new(name: &str, start_bone: &str, end_bone: &str) -> Self {
        Self {
            name: name.to_string(),
            start_bone: start_bone.to_string(),
            end_bone: end_bone.to_string(),
            ik_goal_name: None,
        }
    }
}

/// IK Rig 定义
#[derive(Clone, Debug, Default)]
pub struct IkRigDefinition {
    /// 资源名称（日志前缀）
    pub name: String,
    /// 参考骨架
    pub skeleton: SkeletonSource,
    /// 不参与求解的骨骼
    pub excluded_bones: Vec<String>,
    /// 求解器栈，None 表示损坏/未知的求解器条目
    pub solvers: Vec<Option<Box<dyn IkRigSolver>>>,
    /// 目标声明
    pub goals: Vec<IkRigGoal>,
    /// 重定向链
    pub retarget_chains: Vec<BoneChain>,
}

impl IkRigDefinition {
    pub fn new(name: impl Into<String>, skeleton: SkeletonSource) -> Self {
        Self {
            name: name.into(),
            skeleton,
            ..Default::default()
        }
    }

    pub fn add_solver(&mut self, solver: Box<dyn IkRigSolver>) -> usize {
        self.solvers.push(Some(solver));
        self.solvers.len() - 1
    }

    pub fn add_goal(&mut self, goal: IkRigGoal) {
        match self.goals.iter_mut().find(|g| g.name == goal.name) {
            Some(existing) => *existing = goal,
            None => self.goals.push(goal),
        }
    }

    pub fn add_retarget_chain(&mut self, chain: BoneChain) {
        self.retarget_chains.push(chain);
    }

    pub fn exclude_bone(&mut self, bone_name: &str) {
        if !self.excluded_bones.iter().any(|b| b == bone_name) {
            self.excluded_bones.push(bone_name.to_string());
        }
    }

    pub fn find_goal(&self, goal_name: &str) -> Option<&IkRigGoal> {
        self.goals.iter().find(|g| g.name == goal_name)
    }

    /// 目标声明中记录的骨骼
    pub fn get_goal_bone_name(&self, goal_name: &str) -> Option<&str> {
        self.find_goal(goal_name)
            .map(|g| g.bone_name.as_str())
            .filter(|b| !b.is_empty())
    }
}
