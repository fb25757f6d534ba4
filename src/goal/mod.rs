//! IK 目标
//!
//! - IkRigGoal: 单个命名目标（目标变换、混合系数、坐标空间）
//! - GoalContainer: 按名称插入/更新的目标容器
//! - GoalBone: 初始化时解析出的目标-骨骼绑定

mod container;

pub use container::GoalContainer;

use glam::{Quat, Vec3};

/// 目标坐标空间
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GoalSpace {
    /// 组件空间（直接使用）
    #[default]
    Component,
    /// 世界空间（求解时经 world→component 变换）
    World,
    /// 叠加到被驱动骨骼的当前变换上
    Additive,
}

/// IK 目标
#[derive(Clone, Debug, PartialEq)]
pub struct IkRigGoal {
    /// 唯一名称
    pub name: String,
    /// 目标驱动的骨骼
    pub bone_name: String,
    /// 若设置，目标直接取该骨骼的当前全局变换
    pub source_bone: Option<String>,

    pub position: Vec3,
    pub rotation: Quat,
    /// 位置混合系数 [0, 1]
    pub position_alpha: f32,
    /// 旋转混合系数 [0, 1]
    pub rotation_alpha: f32,
    pub position_space: GoalSpace,
    pub rotation_space: GoalSpace,
    pub enabled: bool,

    /// 每帧解析后的混合结果，求解器读取这两个值
    pub final_blended_position: Vec3,
    pub final_blended_rotation: Quat,
}

impl Default for IkRigGoal {
    fn default() -> Self {
        Self {
            name: String::new(),
            bone_name: String::new(),
            source_bone: None,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            position_alpha: 1.0,
            rotation_alpha: 1.0,
            position_space: GoalSpace::Component,
            rotation_space: GoalSpace::Component,
            enabled: true,
            final_blended_position: Vec3::ZERO,
            final_blended_rotation: Quat::IDENTITY,
        }
    }
}

impl IkRigGoal {
    pub fn new(name: &str, bone_name: &str) -> Self {
        Self {
            name: name.to_string(),
            bone_name: bone_name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_alphas(mut self, position_alpha: f32, rotation_alpha: f32) -> Self {
        self.position_alpha = position_alpha;
        self.rotation_alpha = rotation_alpha;
        self
    }

    pub fn with_space(mut self, space: GoalSpace) -> Self {
        self.position_space = space;
        self.rotation_space = space;
        self
    }

    pub fn with_source_bone(mut self, bone: &str) -> Self {
        self.source_bone = Some(bone.to_string());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// 目标-骨骼绑定
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GoalBone {
    pub bone_name: String,
    pub bone_index: usize,
}
