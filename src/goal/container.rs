//! 目标容器
//!
//! 按名称 upsert。新名称或启用状态变化需要处理器重新初始化，
//! 普通的数值更新不需要。

use super::IkRigGoal;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GoalContainer {
    goals: Vec<IkRigGoal>,
    /// 自上次初始化以来是否出现需要重新初始化的修改
    needs_initialized: bool,
}

impl GoalContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或更新目标，返回本次修改是否需要重新初始化
    pub fn set_ik_goal(&mut self, goal: &IkRigGoal) -> bool {
        let requires_init = match self.find_goal_by_name_mut(&goal.name) {
            Some(existing) => {
                let enabled_changed = existing.enabled != goal.enabled;
                *existing = goal.clone();
                enabled_changed
            }
            None => {
                self.goals.push(goal.clone());
                true
            }
        };
        self.needs_initialized |= requires_init;
        requires_init
    }

    pub fn find_goal_by_name(&self, name: &str) -> Option<&IkRigGoal> {
        self.goals.iter().find(|g| g.name == name)
    }

    pub fn find_goal_by_name_mut(&mut self, name: &str) -> Option<&mut IkRigGoal> {
        self.goals.iter_mut().find(|g| g.name == name)
    }

    /// 清空全部目标
    pub fn empty(&mut self) {
        self.goals.clear();
    }

    /// 以数组内容替换全部目标
    pub fn fill_from_goal_array(&mut self, goals: &[IkRigGoal]) {
        self.goals = goals.to_vec();
    }

    pub fn remove_goal(&mut self, name: &str) -> Option<IkRigGoal> {
        let index = self.goals.iter().position(|g| g.name == name)?;
        self.needs_initialized = true;
        Some(self.goals.remove(index))
    }

    /// 重命名，新名称已存在时失败
    pub fn rename_goal(&mut self, old_name: &str, new_name: &str) -> bool {
        if self.find_goal_by_name(new_name).is_some() {
            return false;
        }
        match self.find_goal_by_name_mut(old_name) {
            Some(goal) => {
                goal.name = new_name.to_string();
                self.needs_initialized = true;
                true
            }
            None => false,
        }
    }

    /// 改变目标绑定的骨骼
    pub fn set_goal_bone(&mut self, name: &str, bone_name: &str) -> bool {
        match self.find_goal_by_name_mut(name) {
            Some(goal) => {
                if goal.bone_name != bone_name {
                    goal.bone_name = bone_name.to_string();
                    self.needs_initialized = true;
                }
                true
            }
            None => false,
        }
    }

    pub fn goals(&self) -> &[IkRigGoal] {
        &self.goals
    }

    pub fn goals_mut(&mut self) -> &mut [IkRigGoal] {
        &mut self.goals
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn needs_initialized(&self) -> bool {
        self.needs_initialized
    }

    pub fn clear_needs_initialized(&mut self) {
        self.needs_initialized = false;
    }
}
