// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 工作窃取线程池
//!
//! 固定数量的工作线程，每个线程拥有一个私有双端队列；另有一个共享队列
//! 接收来自非工作线程（例如接收循环）的任务。
//!
//! 每轮循环，工作线程依次尝试：
//! 1. 从自己的私有队列头部弹出任务；
//! 2. 从共享队列弹出任务；
//! 3. 从 `(自身下标 + 1) mod 线程数` 开始轮询兄弟线程，从其私有队列尾部窃取一个任务；
//! 4. 以上都失败则让出处理器，连续空转若干轮后在条件变量上短暂等待。
//!
//! 任务内部的 panic 在任务边界被捕获并记录，不会终止工作线程。
//! 终止标志只设置一次；工作线程在每轮开头检查它，线程池析构时等待所有线程退出。

use std::{
    any::Any,
    cell::Cell,
    collections::VecDeque,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Condvar, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::exception::Exception;

/// 一个待执行的任务
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// 空转多少轮之后进入阻塞等待
const SPIN_ROUNDS: u32 = 64;

/// 阻塞等待的上限，到时后重新检查终止标志与窃取机会
const IDLE_WAIT: Duration = Duration::from_millis(10);

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// 当前线程所属的 (线程池 ID, 工作线程下标)，非工作线程为 `None`
    static WORKER: Cell<Option<(usize, usize)>> = const { Cell::new(None) };
}

/// 当前线程在所属线程池中的下标，非工作线程返回 `None`
pub fn current_worker() -> Option<usize> {
    WORKER.with(|w| w.get()).map(|(_, index)| index)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // 任务在锁外执行，队列锁不会因任务 panic 而中毒；即便中毒，队列本身仍然一致
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 工作线程私有的双端队列：所有者在头部压入和弹出，窃取者从尾部取走
struct StealingQueue {
    deque: Mutex<VecDeque<Task>>,
}

impl StealingQueue {
    fn new() -> Self {
        Self {
            deque: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, task: Task) {
        lock(&self.deque).push_front(task);
    }

    fn try_pop(&self) -> Option<Task> {
        lock(&self.deque).pop_front()
    }

    fn try_steal(&self) -> Option<Task> {
        lock(&self.deque).pop_back()
    }

    fn len(&self) -> usize {
        lock(&self.deque).len()
    }
}

/// 所有工作线程共享的状态
struct Shared {
    id: usize,
    terminate: Arc<AtomicBool>,
    common: Mutex<VecDeque<Task>>,
    locals: Vec<StealingQueue>,
    idle_lock: Mutex<()>,
    idle: Condvar,
}

impl Shared {
    fn is_terminating(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    fn submit(&self, task: Task) -> Result<(), Exception> {
        if self.is_terminating() {
            return Err(Exception::PoolTerminated);
        }
        match WORKER.with(|w| w.get()) {
            Some((pool, index)) if pool == self.id => self.locals[index].push(task),
            _ => lock(&self.common).push_back(task),
        }
        let _guard = lock(&self.idle_lock);
        self.idle.notify_one();
        Ok(())
    }

    fn find_task(&self, index: usize) -> Option<Task> {
        self.locals[index]
            .try_pop()
            .or_else(|| lock(&self.common).pop_front())
            .or_else(|| self.try_steal(index))
    }

    fn try_steal(&self, index: usize) -> Option<Task> {
        let size = self.locals.len();
        (1..size)
            .map(|offset| (index + offset) % size)
            .find_map(|victim| self.locals[victim].try_steal())
    }

    fn pending(&self) -> usize {
        lock(&self.common).len() + self.locals.iter().map(StealingQueue::len).sum::<usize>()
    }

    fn wait_idle(&self) {
        let guard = lock(&self.idle_lock);
        // 在持有 idle 锁时复查，提交方在同一把锁下通知，不会丢失唤醒
        if self.is_terminating() || self.pending() > 0 {
            return;
        }
        let _ = self.idle.wait_timeout(guard, IDLE_WAIT);
    }

    fn wake_all(&self) {
        let _guard = lock(&self.idle_lock);
        self.idle.notify_all();
    }
}

/// 可以克隆并在任务内部使用的提交句柄
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl PoolHandle {
    /// 提交任务。工作线程提交到自己的私有队列，其他线程提交到共享队列。
    pub fn submit<F>(&self, task: F) -> Result<(), Exception>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.submit(Box::new(task))
    }

    pub fn is_terminating(&self) -> bool {
        self.shared.is_terminating()
    }
}

struct Worker {
    name: String,
    handle: Option<JoinHandle<()>>,
}

/// 固定大小的工作窃取线程池
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<Worker>,
}

impl ThreadPool {
    /// 创建 `size` 个工作线程，使用独立的终止标志
    pub fn new(size: usize) -> io::Result<Self> {
        Self::with_terminate_flag(size, Arc::new(AtomicBool::new(false)))
    }

    /// 创建线程池，并观察外部传入的终止标志（例如由信号处理设置）
    pub fn with_terminate_flag(size: usize, terminate: Arc<AtomicBool>) -> io::Result<Self> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            terminate,
            common: Mutex::new(VecDeque::new()),
            locals: (0..size).map(|_| StealingQueue::new()).collect(),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(size),
        };
        for index in 0..size {
            let name = format!("worker-{}", index);
            let shared = Arc::clone(&pool.shared);
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || working_loop(shared, index));
            match spawned {
                Ok(handle) => pool.workers.push(Worker {
                    name,
                    handle: Some(handle),
                }),
                Err(e) => {
                    // 已创建的线程由 Drop 负责终止与回收
                    error!("线程池初始化失败，无法创建{}：{}", name, e);
                    return Err(e);
                }
            }
        }
        info!("线程池已启动，工作线程数：{}", size);
        Ok(pool)
    }

    /// 提交任务，见 [`PoolHandle::submit`]
    pub fn submit<F>(&self, task: F) -> Result<(), Exception>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.submit(Box::new(task))
    }

    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// 工作线程数量
    pub fn size(&self) -> usize {
        self.shared.locals.len()
    }

    /// 尚未被取走的任务数量
    pub fn pending(&self) -> usize {
        self.shared.pending()
    }

    pub fn is_terminating(&self) -> bool {
        self.shared.is_terminating()
    }

    /// 设置终止标志并唤醒所有空闲线程。正在执行的任务会被允许完成。
    pub fn shutdown(&self) {
        self.shared.terminate.store(true, Ordering::Release);
        self.shared.wake_all();
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    error!("[{}]工作线程异常退出", worker.name);
                }
            }
        }
        let discarded = self.shared.pending();
        if discarded > 0 {
            warn!("线程池终止时丢弃了{}个未执行的任务", discarded);
        }
        info!("所有工作线程已退出");
    }
}

fn working_loop(shared: Arc<Shared>, index: usize) {
    WORKER.with(|w| w.set(Some((shared.id, index))));
    let name = thread::current().name().unwrap_or("worker").to_string();
    debug!("[{}]工作线程启动，下标{}", name, index);

    let mut idle_rounds = 0;
    while !shared.is_terminating() {
        match shared.find_task(index) {
            Some(task) => {
                idle_rounds = 0;
                run_task(&name, task);
            }
            None if idle_rounds < SPIN_ROUNDS => {
                idle_rounds += 1;
                thread::yield_now();
            }
            None => shared.wait_idle(),
        }
    }

    WORKER.with(|w| w.set(None));
    debug!("[{}]工作线程观察到终止标志，退出", name);
}

fn run_task(name: &str, task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        error!("[{}]任务执行时发生panic：{}", name, panic_message(payload.as_ref()));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "未知的panic"
    }
}
