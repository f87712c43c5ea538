//! 介质锁接口
//!
//! 介质层本身不做并发控制：每个实例只有一个所有者，所有操作同步执行。
//! 需要在多个任务或中断上下文之间共享介质时，由集成方通过此接口接入外部互斥。

use crate::error::{Error, ErrorKind, Result};
use core::sync::atomic::{AtomicBool, Ordering};

/// 介质锁 trait
///
/// 每次读、写、刷新前调用 `lock`，结束后调用 `unlock`。
///
/// # 设计说明
///
/// - `NoLock` - 单线程环境，无锁（默认）
/// - `BusyLock` - 原子忙标志，被占用时直接报错
/// - 自定义锁实现（RTOS 互斥量等）
///
/// 引用也实现了此 trait：把 `&'static BusyLock` 交给介质，中断处理程序持有同一把锁，
/// 即可在刷新定时器打断一次传输时让介质操作返回 `InvalidState`。
pub trait MediaLock {
    /// 获取锁
    fn lock(&self) -> Result<()>;

    /// 释放锁
    fn unlock(&self) -> Result<()>;
}

impl<T: MediaLock + ?Sized> MediaLock for &T {
    #[inline]
    fn lock(&self) -> Result<()> {
        (**self).lock()
    }

    #[inline]
    fn unlock(&self) -> Result<()> {
        (**self).unlock()
    }
}

/// 无锁实现（默认）
///
/// 用于单线程环境或已知不需要并发保护的场景
#[derive(Debug, Default)]
pub struct NoLock;

impl MediaLock for NoLock {
    #[inline]
    fn lock(&self) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn unlock(&self) -> Result<()> {
        Ok(())
    }
}

/// 原子忙标志
///
/// 不会阻塞等待：已被占用时 `lock` 返回 `InvalidState`
#[derive(Debug, Default)]
pub struct BusyLock {
    busy: AtomicBool,
}

impl BusyLock {
    /// 创建空闲的锁
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// 是否已被占用
    pub fn is_locked(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl MediaLock for BusyLock {
    fn lock(&self) -> Result<()> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| ())
            .map_err(|_| Error::new(ErrorKind::InvalidState, "Media is busy"))
    }

    fn unlock(&self) -> Result<()> {
        self.busy
            .compare_exchange(true, false, Ordering::Release, Ordering::Relaxed)
            .map(|_| ())
            .map_err(|_| Error::new(ErrorKind::InvalidState, "Media lock was not held"))
    }
}
