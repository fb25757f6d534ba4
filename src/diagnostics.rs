//! 初始化诊断日志
//!
//! IkRigLogger 由调用方创建并显式传入 `initialize`，
//! 记录带严重级别的消息，同时转发给 `log` 门面。

use std::fmt;

/// 消息严重级别
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// 单条诊断消息
#[derive(Clone, Debug, PartialEq)]
pub struct LogMessage {
    pub severity: Severity,
    pub message: String,
}

/// 诊断收集器
#[derive(Clone, Debug, Default)]
pub struct IkRigLogger {
    /// 消息前缀（一般是 IK Rig 资源名）
    name: String,
    messages: Vec<LogMessage>,
}

impl IkRigLogger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages: Vec::new(),
        }
    }

    pub fn set_log_target(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Severity::Info, message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message.into());
    }

    fn push(&mut self, severity: Severity, message: String) {
        match severity {
            Severity::Info => log::info!(target: "ik_rig", "[{}] {}", self.name, message),
            Severity::Warning => log::warn!(target: "ik_rig", "[{}] {}", self.name, message),
            Severity::Error => log::error!(target: "ik_rig", "[{}] {}", self.name, message),
        }
        self.messages.push(LogMessage { severity, message });
    }

    pub fn messages(&self) -> &[LogMessage] {
        &self.messages
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.messages.iter().filter(|m| m.severity == severity).count()
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Error)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_severity() {
        let mut logger = IkRigLogger::new("rig");
        logger.info("start");
        logger.warning("goal 'Foot' is not used");
        logger.error("missing bone");
        logger.warning("chain invalid");

        assert_eq!(logger.messages().len(), 4);
        assert_eq!(logger.warning_count(), 2);
        assert_eq!(logger.error_count(), 1);
        assert!(logger.has_errors());

        logger.clear();
        assert!(!logger.has_errors());
        assert!(logger.messages().is_empty());
    }
}
