//! 环境变量存储接口

/// 环境变量存储 trait
///
/// 流水线通过此接口读写环境变量，而不是直接操作进程全局状态，
/// 测试可以注入隔离的内存实现。
pub trait EnvironmentStore: Send + Sync {
    /// 读取变量
    fn get(&self, key: &str) -> Option<String>;

    /// 写入变量（覆盖）
    fn set(&self, key: &str, value: &str);

    /// 变量是否已定义
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 仅在变量未定义时写入，返回是否写入
    fn set_if_absent(&self, key: &str, value: &str) -> bool {
        if self.contains(key) {
            false
        } else {
            self.set(key, value);
            true
        }
    }
}
