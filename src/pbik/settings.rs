//! 粒子全身 IK 设置

use bitflags::bitflags;

bitflags! {
    /// 旋转轴锁定
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RotationLocks: u8 {
        const X = 0x01;
        const Y = 0x02;
        const Z = 0x04;
    }
}

/// 根骨骼行为
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RootBehavior {
    /// 根骨骼保持输入变换，其直接子骨骼随之固定
    #[default]
    PinToInput,
    /// 根骨骼可被效应器拉动
    Free,
}

/// 全局求解设置
#[derive(Clone, Debug, PartialEq)]
pub struct PbikSolverSettings {
    /// 外层迭代次数
    pub iterations: u32,
    /// 每次迭代额外的约束投影次数
    pub sub_iterations: u32,
    /// 允许骨骼拉伸（输出位置直接使用粒子位置）
    pub allow_stretch: bool,
    pub root_behavior: RootBehavior,
    /// 每次迭代单根骨骼最大摆动角（度）
    pub max_angle: f32,
    /// 距离约束的超松弛系数，取值 [1, 2)
    pub over_relaxation: f32,
}

impl Default for PbikSolverSettings {
    fn default() -> Self {
        Self {
            iterations: 20,
            sub_iterations: 0,
            allow_stretch: false,
            root_behavior: RootBehavior::PinToInput,
            max_angle: 30.0,
            over_relaxation: 1.3,
        }
    }
}

/// 单根骨骼设置
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PbikBoneSettings {
    /// 0 = 自由旋转，1 = 不旋转
    pub stiffness: f32,
    pub rotation_locks: RotationLocks,
    /// 相对输入姿态的最大摆动角（度），0 表示不限制
    pub max_swing_degrees: f32,
}

impl Default for PbikBoneSettings {
    fn default() -> Self {
        Self {
            stiffness: 0.0,
            rotation_locks: RotationLocks::empty(),
            max_swing_degrees: 0.0,
        }
    }
}

/// 单个效应器设置
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PbikEffectorSettings {
    /// 向目标移动的比例
    pub strength_alpha: f32,
    /// 受影响的祖先骨骼数，0 表示一直到根
    pub chain_depth: u32,
    /// 把整条链一起拉向目标的比例
    pub pull_chain_alpha: f32,
    /// 效应器骨骼旋转对齐目标旋转的比例
    pub pin_rotation: f32,
}

impl Default for PbikEffectorSettings {
    fn default() -> Self {
        Self {
            strength_alpha: 1.0,
            chain_depth: 0,
            pull_chain_alpha: 1.0,
            pin_rotation: 1.0,
        }
    }
}
