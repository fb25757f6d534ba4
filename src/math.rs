//! 求解器共用的数学工具

use glam::{EulerRot, Quat, Vec3};
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

/// 混合系数阈值，低于此值视为 0
pub const KINDA_SMALL_NUMBER: f32 = 1.0e-4;

/// 旋转提取迭代次数与收敛阈值
const ROTATION_EXTRACT_MAX_ITER: usize = 32;
const ROTATION_EXTRACT_EPS: f32 = 1.0e-6;

/// 线性插值，端点精确返回
#[inline]
pub fn blend_position(from: Vec3, to: Vec3, alpha: f32) -> Vec3 {
    if alpha <= 0.0 {
        from
    } else if alpha >= 1.0 {
        to
    } else {
        from.lerp(to, alpha)
    }
}

/// 球面插值，端点精确返回
#[inline]
pub fn blend_rotation(from: Quat, to: Quat, alpha: f32) -> Quat {
    if alpha <= 0.0 {
        from
    } else if alpha >= 1.0 {
        to
    } else {
        from.slerp(to, alpha).normalize()
    }
}

/// 从单位旋转向 `rotation` 按 alpha 插值
#[inline]
pub fn scale_rotation(rotation: Quat, alpha: f32) -> Quat {
    blend_rotation(Quat::IDENTITY, rotation, alpha)
}

/// 求最佳拟合旋转：把初始点集映射到变形后的点集
///
/// 返回 (旋转, 初始点集质心, 当前点集质心)。
/// 旋转由协方差矩阵的极分解得到（Müller 等人的迭代法，从单位旋转开始），
/// 纯平移时结果严格为单位旋转。
pub fn rotation_from_deformed_points(initial: &[Vec3], current: &[Vec3]) -> (Quat, Vec3, Vec3) {
    let count = initial.len().min(current.len());
    if count == 0 {
        return (Quat::IDENTITY, Vec3::ZERO, Vec3::ZERO);
    }

    let inv_count = 1.0 / count as f32;
    let initial_centroid = initial[..count].iter().copied().sum::<Vec3>() * inv_count;
    let current_centroid = current[..count].iter().copied().sum::<Vec3>() * inv_count;

    if count < 2 {
        return (Quat::IDENTITY, initial_centroid, current_centroid);
    }

    // A = Σ (q - q̄)(p - p̄)ᵀ
    let mut covariance = Matrix3::<f32>::zeros();
    for (p, q) in initial[..count].iter().zip(&current[..count]) {
        let p = to_na(*p - initial_centroid);
        let q = to_na(*q - current_centroid);
        covariance += q * p.transpose();
    }

    let rotation = Rotation3::from_matrix_eps(
        &covariance,
        ROTATION_EXTRACT_EPS,
        ROTATION_EXTRACT_MAX_ITER,
        Rotation3::identity(),
    );
    let q = UnitQuaternion::from_rotation_matrix(&rotation);
    let c = q.quaternion().coords;
    let rotation = Quat::from_xyzw(c[0], c[1], c[2], c[3]).normalize();

    (rotation, initial_centroid, current_centroid)
}

/// 按轴缩放欧拉角后重建四元数
pub fn weight_rotation_per_axis(rotation: Quat, weights: Vec3) -> Quat {
    let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
    Quat::from_euler(EulerRot::XYZ, x * weights.x, y * weights.y, z * weights.z)
}

/// 把旋转角限制在 `max_angle` 弧度以内
pub fn clamp_rotation_angle(rotation: Quat, max_angle: f32) -> Quat {
    // w < 0 时取等价的短路径
    let rotation = if rotation.w < 0.0 { -rotation } else { rotation };
    let (axis, angle) = rotation.to_axis_angle();
    if angle <= max_angle || !axis.is_finite() {
        return rotation;
    }
    Quat::from_axis_angle(axis, max_angle)
}

/// 把方向 `from` 旋转到 `to` 的最短弧，反向时绕 `fallback_axis` 转半圈
pub fn rotation_arc_with_fallback(from: Vec3, to: Vec3, fallback_axis: Vec3) -> Quat {
    if from.dot(to) < -1.0 + KINDA_SMALL_NUMBER {
        let axis = fallback_axis.try_normalize().unwrap_or_else(|| from.any_orthonormal_vector());
        Quat::from_axis_angle(axis, std::f32::consts::PI)
    } else {
        Quat::from_rotation_arc(from, to)
    }
}

#[inline]
fn to_na(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}
