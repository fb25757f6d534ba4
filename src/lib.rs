//! IK Rig 运行时 - 骨骼 IK 求解管线
//!
//! 提供以下功能：
//! - 骨骼姿态存储（本地/全局双空间）
//! - IK 目标容器与目标-骨骼绑定
//! - 可插拔的求解器栈（Limb / Pole / 全身 IK / Body Mover / Set Transform）
//! - 处理器：初始化、输入姿态、设置目标、求解、读取输出

pub mod config;
pub mod definition;
pub mod diagnostics;
pub mod goal;
pub mod math;
pub mod pbik;
pub mod processor;
pub mod skeleton;
pub mod solver;

#[cfg(test)]
pub(crate) mod testing;

pub use config::IkRigConfig;
pub use definition::{BoneChain, IkRigDefinition};
pub use diagnostics::{IkRigLogger, LogMessage, Severity};
pub use goal::{GoalBone, GoalContainer, GoalSpace, IkRigGoal};
pub use processor::IkRigProcessor;
pub use skeleton::{BoneFlags, BoneLink, BoneTransform, IkRigSkeleton, SkeletonSource};
pub use solver::{
    BodyMoverSolver, FullBodyIkSolver, IkRigSolver, LimbSolver, PoleSolver, SetTransformSolver,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IkRigError {
    #[error("skeleton has no bones")]
    EmptySkeleton,

    #[error("bone '{bone}' has invalid parent index {parent} (parents must precede children)")]
    InvalidParent { bone: String, parent: usize },

    #[error("bone '{0}' not found in skeleton")]
    MissingBone(String),

    #[error("bone '{bone}' is missing required ancestor '{ancestor}' in input skeleton")]
    MissingAncestor { bone: String, ancestor: String },

    #[error("goal '{0}' does not name a bone")]
    GoalWithoutBone(String),

    #[error("goal '{goal}' targets bone '{bone}' which is not in the skeleton")]
    GoalBoneMissing { goal: String, bone: String },

    #[error("goal '{goal}' is bound to bone '{first}' and to bone '{second}'")]
    GoalBoneConflict {
        goal: String,
        first: String,
        second: String,
    },

    #[error("duplicate bone name '{0}'")]
    DuplicateBone(String),

    #[error("skeleton parts differ in length: {names} names, {parents} parents, {poses} poses")]
    MismatchedSkeletonParts {
        names: usize,
        parents: usize,
        poses: usize,
    },

    #[error("invalid bone chain '{name}': '{end}' is not below '{start}'")]
    InvalidChain {
        name: String,
        start: String,
        end: String,
    },
}

pub type Result<T> = std::result::Result<T, IkRigError>;
