use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// 有界缓冲队列 - 流水线各级之间的带背压交接点
///
/// 内部为单把互斥锁加两个条件变量（not_empty / not_full）：
/// - `push` / `pop` 阻塞等待空间或数据
/// - `try_push` / `try_pop` 非阻塞，锁竞争时直接失败
/// - `clear` 丢弃全部元素（元素在 Drop 中释放自身负载）并唤醒所有等待者
pub struct BoundedQueue<T> {
    inner: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// 创建队列，容量必须 >= 1
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "队列容量必须大于 0");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// 阻塞入队：队列满时等待消费端腾出空间
    pub fn push(&self, item: T) {
        let mut queue = self.inner.lock();
        while queue.len() >= self.capacity {
            self.not_full.wait(&mut queue);
        }
        queue.push_back(item);
        drop(queue);
        self.not_empty.notify_one();
    }

    /// 阻塞出队：队列空时等待生产端补充数据
    pub fn pop(&self) -> T {
        let mut queue = self.inner.lock();
        while queue.is_empty() {
            self.not_empty.wait(&mut queue);
        }
        let item = queue.pop_front().expect("队列非空");
        drop(queue);
        self.not_full.notify_one();
        item
    }

    /// 非阻塞入队：队列满或锁被占用时返回 false，元素原样退还调用者
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut queue = match self.inner.try_lock() {
            Some(guard) => guard,
            None => return Err(item),
        };
        if queue.len() >= self.capacity {
            return Err(item);
        }
        queue.push_back(item);
        drop(queue);
        self.not_empty.notify_one();
        Ok(())
    }

    /// 非阻塞出队：队列空或锁被占用时返回 None
    pub fn try_pop(&self) -> Option<T> {
        let mut queue = self.inner.try_lock()?;
        let item = queue.pop_front()?;
        drop(queue);
        self.not_full.notify_one();
        Some(item)
    }

    /// 当前元素数量
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// 是否已满
    pub fn is_full(&self) -> bool {
        self.inner.lock().len() >= self.capacity
    }

    /// 队列容量
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 清空队列并广播唤醒两侧所有等待者
    ///
    /// 元素被移出后立即 Drop，持有的负载（包、帧缓冲）随之释放。
    pub fn clear(&self) {
        let mut queue = self.inner.lock();
        queue.clear();
        drop(queue);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order_preserved() {
        let q = BoundedQueue::new(8);
        for i in 0..5 {
            q.push(i);
        }
        for i in 0..5 {
            assert_eq!(q.pop(), i);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn size_stays_within_capacity() {
        let q = BoundedQueue::new(3);
        assert!(q.try_push(1).is_ok());
        assert!(q.try_push(2).is_ok());
        assert!(q.try_push(3).is_ok());
        assert!(q.is_full());
        assert!(q.try_push(4).is_err());
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn try_pop_empty_returns_none() {
        let q: BoundedQueue<u32> = BoundedQueue::new(2);
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn blocking_push_waits_for_consumer() {
        let q = Arc::new(BoundedQueue::new(1));
        q.push(0u32);

        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                // 队列已满，push 会阻塞直到主线程 pop
                q.push(1);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(q.pop(), 0);
        producer.join().unwrap();
        assert_eq!(q.pop(), 1);
    }

    #[test]
    fn clear_wakes_blocked_producer() {
        let q = Arc::new(BoundedQueue::new(1));
        q.push(0u32);

        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                q.push(1);
            })
        };

        thread::sleep(Duration::from_millis(50));
        q.clear();
        // clear 腾出了空间，被阻塞的生产者应当完成入队
        producer.join().unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop(), 1);
    }

    #[test]
    fn clear_releases_held_items() {
        let payload = Arc::new(0u8);
        let q = BoundedQueue::new(4);
        for _ in 0..3 {
            q.push(payload.clone());
        }
        assert_eq!(Arc::strong_count(&payload), 4);

        q.clear();
        assert!(q.is_empty());
        assert_eq!(Arc::strong_count(&payload), 1);
    }

    #[test]
    fn producer_consumer_under_contention() {
        let q = Arc::new(BoundedQueue::new(4));
        let total = 1000u32;

        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..total {
                    q.push(i);
                }
            })
        };

        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                let mut last = None;
                for _ in 0..total {
                    let v = q.pop();
                    if let Some(prev) = last {
                        assert!(v > prev, "出队顺序必须递增");
                    }
                    last = Some(v);
                }
            })
        };

        producer.join().unwrap();
        consumer.join().unwrap();
        assert!(q.is_empty());
    }
}
