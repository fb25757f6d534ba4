//! IK Rig 运行时配置
//!
//! 所有参数扁平化，进程级默认值可在运行时修改。
//! 每个处理器在创建时拷贝一份，之后互不影响。

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 处理器配置（扁平化，不嵌套）
#[derive(Debug, Clone, PartialEq)]
pub struct IkRigConfig {
    // ========== 求解 ==========
    /// 求解结束后是否归一化全部旋转，默认 true
    /// 多个求解器连续修改姿态会累积数值误差
    pub normalize_rotations: bool,

    // ========== 初始化 ==========
    /// 没有任何求解器使用的目标是否输出警告，默认 true
    pub warn_disconnected_goals: bool,

    // ========== 调试 ==========
    /// 是否输出每帧求解日志，默认 false
    pub debug_log: bool,
}

impl Default for IkRigConfig {
    fn default() -> Self {
        Self {
            normalize_rotations: true,
            warn_disconnected_goals: true,
            debug_log: false,
        }
    }
}

/// 全局配置实例
static IK_RIG_CONFIG: Lazy<RwLock<IkRigConfig>> = Lazy::new(|| {
    RwLock::new(IkRigConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> IkRigConfig {
    IK_RIG_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: IkRigConfig) {
    *IK_RIG_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *IK_RIG_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = IkRigConfig::default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_reset_config() {
        set_config(IkRigConfig {
            debug_log: true,
            ..Default::default()
        });
        assert!(get_config().debug_log);
        assert!(crate::IkRigProcessor::new().config().debug_log);

        reset_config();
        assert_eq!(get_config(), IkRigConfig::default());
    }
}
