//! 链求解 - 只处理关节位置
//!
//! 设计原则：
//! - 输入/输出为从根到末端的关节位置，根位置固定
//! - 骨骼长度保持不变（目标不可达时沿目标方向伸直）
//! - 旋转由调用方根据位置变化重建

use glam::{Quat, Vec3};

/// 单次旋转小于该角度（度）时跳过
const MIN_ROTATE_DEGREES: f32 = 1.0e-3;

// ============================================================================
// 求解结果
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChainSolveResult {
    /// 关节位置是否被修改
    pub modified: bool,
    /// 末端是否到达目标（精度范围内）
    pub reached: bool,
    /// 末端到目标的最终距离
    pub distance: f32,
}

impl ChainSolveResult {
    fn untouched(positions: &[Vec3], target: Vec3) -> Self {
        let distance = positions.last().map_or(f32::MAX, |p| p.distance(target));
        Self { modified: false, reached: false, distance }
    }
}

fn bone_lengths(positions: &[Vec3]) -> Vec<f32> {
    positions.windows(2).map(|w| w[0].distance(w[1])).collect()
}

/// 目标超出链长时沿目标方向伸直，返回 true 表示已处理
fn stretch_toward_if_unreachable(positions: &mut [Vec3], lengths: &[f32], target: Vec3) -> bool {
    let root = positions[0];
    let total_length: f32 = lengths.iter().sum();
    if root.distance(target) < total_length {
        return false;
    }

    let dir = (target - root).normalize_or_zero();
    let mut pos = root;
    for (i, &len) in lengths.iter().enumerate() {
        pos += dir * len;
        positions[i + 1] = pos;
    }
    true
}

// ============================================================================
// FABRIK
// ============================================================================

/// FABRIK：末端拉向目标（前向），再把根拉回原位（后向）
pub fn solve_fabrik(
    positions: &mut [Vec3],
    target: Vec3,
    precision: f32,
    max_iterations: u32,
) -> ChainSolveResult {
    if positions.len() < 2 {
        return ChainSolveResult::untouched(positions, target);
    }

    let last = positions.len() - 1;
    let initial_distance = positions[last].distance(target);
    if initial_distance <= precision {
        return ChainSolveResult {
            modified: false,
            reached: true,
            distance: initial_distance,
        };
    }

    let lengths = bone_lengths(positions);
    if stretch_toward_if_unreachable(positions, &lengths, target) {
        return ChainSolveResult {
            modified: true,
            reached: false,
            distance: positions[last].distance(target),
        };
    }

    let root = positions[0];
    for _ in 0..max_iterations {
        // 前向
        positions[last] = target;
        for i in (0..last).rev() {
            let dir = (positions[i] - positions[i + 1]).normalize_or_zero();
            positions[i] = positions[i + 1] + dir * lengths[i];
        }

        // 后向
        positions[0] = root;
        for i in 0..last {
            let dir = (positions[i + 1] - positions[i]).normalize_or_zero();
            positions[i + 1] = positions[i] + dir * lengths[i];
        }

        if positions[last].distance(target) <= precision {
            break;
        }
    }

    let distance = positions[last].distance(target);
    ChainSolveResult {
        modified: true,
        reached: distance <= precision,
        distance,
    }
}

// ============================================================================
// CCD
// ============================================================================

/// 循环坐标下降：从末端向根逐个旋转关节，使末端指向目标
///
/// 每次迭代后比较距离，变差时恢复上一次最佳结果并退出。
pub fn solve_ccd(
    positions: &mut [Vec3],
    target: Vec3,
    precision: f32,
    max_iterations: u32,
    limit_angle: f32,
) -> ChainSolveResult {
    if positions.len() < 2 {
        return ChainSolveResult::untouched(positions, target);
    }

    let last = positions.len() - 1;
    let mut best_distance = positions[last].distance(target);
    if best_distance <= precision {
        return ChainSolveResult {
            modified: false,
            reached: true,
            distance: best_distance,
        };
    }

    let mut best_positions = positions.to_vec();
    let mut modified = false;

    for _ in 0..max_iterations {
        for joint in (0..last).rev() {
            let pivot = positions[joint];
            let to_end = (positions[last] - pivot).normalize_or_zero();
            let to_target = (target - pivot).normalize_or_zero();

            if to_end.length_squared() < 1e-8 || to_target.length_squared() < 1e-8 {
                continue;
            }

            let dot = to_end.dot(to_target).clamp(-1.0, 1.0);
            let angle = dot.acos();
            if angle.to_degrees() < MIN_ROTATE_DEGREES {
                continue;
            }

            let axis = to_end.cross(to_target).normalize_or_zero();
            if axis.length_squared() < 1e-8 {
                continue;
            }

            let delta_rot = Quat::from_axis_angle(axis, angle.min(limit_angle));
            for p in positions[joint + 1..].iter_mut() {
                *p = pivot + delta_rot * (*p - pivot);
            }
            modified = true;
        }

        let distance = positions[last].distance(target);
        if distance < best_distance {
            best_distance = distance;
            best_positions.copy_from_slice(positions);
        } else {
            // 恢复最佳结果并退出
            positions.copy_from_slice(&best_positions);
            break;
        }

        if distance <= precision {
            break;
        }
    }

    ChainSolveResult {
        modified,
        reached: best_distance <= precision,
        distance: best_distance,
    }
}

// ============================================================================
// 双骨骼解析解
// ============================================================================

/// 余弦定理求解三关节链，弯曲方向沿用当前中间关节的偏移方向
pub fn solve_two_bones(positions: &mut [Vec3], target: Vec3) -> ChainSolveResult {
    if positions.len() != 3 {
        return ChainSolveResult::untouched(positions, target);
    }

    let root = positions[0];
    let upper = positions[0].distance(positions[1]);
    let lower = positions[1].distance(positions[2]);
    let to_target = target - root;
    let Some(dir) = to_target.try_normalize() else {
        return ChainSolveResult::untouched(positions, target);
    };

    let min_reach = (upper - lower).abs();
    let max_reach = upper + lower;
    let reach = to_target.length().clamp(min_reach, max_reach);

    // 当前弯曲方向：中间关节相对于 根→目标 直线的偏移
    let mid_offset = positions[1] - root;
    let bend = (mid_offset - dir * mid_offset.dot(dir))
        .try_normalize()
        .unwrap_or_else(|| dir.any_orthonormal_vector());

    let cos_angle = if upper * reach > f32::EPSILON {
        ((upper * upper + reach * reach - lower * lower) / (2.0 * upper * reach)).clamp(-1.0, 1.0)
    } else {
        1.0
    };
    let sin_angle = (1.0 - cos_angle * cos_angle).max(0.0).sqrt();

    positions[1] = root + dir * (upper * cos_angle) + bend * (upper * sin_angle);
    positions[2] = root + dir * reach;

    let distance = positions[2].distance(target);
    ChainSolveResult {
        modified: true,
        reached: distance <= 1e-3,
        distance,
    }
}
