//! 骨骼系统
//!
//! 核心设计思想：
//! - BoneLink: 单个骨骼节点的静态数据（名称、父索引、标志）
//! - SkeletonSource: 外部网格提供的骨架描述（本地参考姿态）
//! - IkRigSkeleton: IK 使用的姿态存储，维护本地/全局两套变换

mod bone_link;
mod bone_set;
mod source;

pub use bone_link::{BoneFlags, BoneLink};
pub use bone_set::IkRigSkeleton;
pub use source::SkeletonSource;

use glam::{Quat, Vec3};

// ============================================================================
// 公共类型定义
// ============================================================================

/// 骨骼变换数据
///
/// 缩放会被保存和传递，但 IK 求解只使用平移和旋转。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BoneTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Self::IDENTITY }
    }

    #[inline]
    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        Self { translation, rotation, scale: Vec3::ONE }
    }

    /// 父变换 * 子本地变换 = 子全局变换
    #[inline]
    pub fn mul_transform(&self, local: &BoneTransform) -> BoneTransform {
        BoneTransform {
            translation: self.transform_point(local.translation),
            rotation: self.rotation * local.rotation,
            scale: self.scale * local.scale,
        }
    }

    /// 求相对于 `parent` 的本地变换，`mul_transform` 的逆运算
    #[inline]
    pub fn relative_to(&self, parent: &BoneTransform) -> BoneTransform {
        let inv_rotation = parent.rotation.inverse();
        let inv_scale = safe_reciprocal(parent.scale);
        BoneTransform {
            translation: (inv_rotation * (self.translation - parent.translation)) * inv_scale,
            rotation: inv_rotation * self.rotation,
            scale: self.scale * inv_scale,
        }
    }

    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * (self.scale * point)
    }
}

#[inline]
fn safe_reciprocal(v: Vec3) -> Vec3 {
    let r = |x: f32| if x.abs() > f32::EPSILON { 1.0 / x } else { 0.0 };
    Vec3::new(r(v.x), r(v.y), r(v.z))
}
