//! 测试用骨架与目标

use glam::Vec3;

use crate::goal::{GoalContainer, IkRigGoal};
use crate::skeleton::{BoneTransform, IkRigSkeleton, SkeletonSource};

fn source(bones: &[(&str, Option<&str>, Vec3)]) -> SkeletonSource {
    let mut source = SkeletonSource::new();
    for &(name, parent, translation) in bones {
        source
            .add_bone(name, parent, BoneTransform::from_translation(translation))
            .unwrap();
    }
    source
}

fn skeleton(source: &SkeletonSource) -> IkRigSkeleton {
    let mut skeleton = IkRigSkeleton::new();
    skeleton.set_input_skeleton(source, &[]);
    skeleton
}

/// root(0,0,0) → mid(0,0,5) → tip(0,0,10)
pub fn straight_chain_source() -> SkeletonSource {
    source(&[
        ("root", None, Vec3::ZERO),
        ("mid", Some("root"), Vec3::new(0.0, 0.0, 5.0)),
        ("tip", Some("mid"), Vec3::new(0.0, 0.0, 5.0)),
    ])
}

pub fn straight_chain_skeleton() -> IkRigSkeleton {
    skeleton(&straight_chain_source())
}

/// root ─┬─ spine ── head
///       └─ leg ──── foot
pub fn branching_source() -> SkeletonSource {
    source(&[
        ("root", None, Vec3::ZERO),
        ("spine", Some("root"), Vec3::new(0.0, 0.0, 3.0)),
        ("leg", Some("root"), Vec3::new(1.0, 0.0, -1.0)),
        ("head", Some("spine"), Vec3::new(0.0, 0.0, 2.0)),
        ("foot", Some("leg"), Vec3::new(0.0, 0.0, -4.0)),
    ])
}

/// pelvis(0,0,12) → thigh(0,0,10) → calf(0,1,5) → foot(0,0,0) → toe(0,1,0)
pub fn bent_leg_skeleton() -> IkRigSkeleton {
    skeleton(&source(&[
        ("pelvis", None, Vec3::new(0.0, 0.0, 12.0)),
        ("thigh", Some("pelvis"), Vec3::new(0.0, 0.0, -2.0)),
        ("calf", Some("thigh"), Vec3::new(0.0, 1.0, -5.0)),
        ("foot", Some("calf"), Vec3::new(0.0, -1.0, -5.0)),
        ("toe", Some("foot"), Vec3::new(0.0, 1.0, 0.0)),
    ]))
}

/// root → pelvis(0,0,10)，左右腿各两节，脚在 (±2,0,0)
pub fn biped_source() -> SkeletonSource {
    source(&[
        ("root", None, Vec3::ZERO),
        ("pelvis", Some("root"), Vec3::new(0.0, 0.0, 10.0)),
        ("thigh_l", Some("pelvis"), Vec3::new(2.0, 0.0, 0.0)),
        ("foot_l", Some("thigh_l"), Vec3::new(0.0, 0.0, -10.0)),
        ("thigh_r", Some("pelvis"), Vec3::new(-2.0, 0.0, 0.0)),
        ("foot_r", Some("thigh_r"), Vec3::new(0.0, 0.0, -10.0)),
    ])
}

pub fn biped_skeleton() -> IkRigSkeleton {
    skeleton(&biped_source())
}

/// 目标容器，最终变换直接取目标自身的位置/旋转
pub fn resolved_goals(goals: &[IkRigGoal]) -> GoalContainer {
    let mut container = GoalContainer::new();
    container.fill_from_goal_array(goals);
    for goal in container.goals_mut() {
        goal.final_blended_position = goal.position;
        goal.final_blended_rotation = goal.rotation;
    }
    container
}
