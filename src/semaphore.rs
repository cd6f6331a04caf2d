use std::sync::{Condvar, Mutex};

// カウンティングセマフォ
// count が 0 の間 wait は待機し、post で 1 つの待機スレッドを起こす
pub struct Semaphore {
    mutex: Mutex<usize>, // 利用可能な数
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Semaphore {
            mutex: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    pub fn wait(&self) {
        let mut cnt = self.mutex.lock().unwrap();
        // spurious wakeup があるので while で再確認
        while *cnt == 0 {
            cnt = self.cond.wait(cnt).unwrap();
        }
        *cnt -= 1;
    }

    pub fn post(&self) {
        let mut cnt = self.mutex.lock().unwrap();
        *cnt += 1;
        self.cond.notify_one();
    }

    // 現在の値 (sem_getvalue 相当)
    // ロックを離した瞬間に変わりうるので観測用途のみ
    pub fn value(&self) -> usize {
        *self.mutex.lock().unwrap()
    }

    // wait して、Drop 時に post する Permit を返す
    pub fn permit(&self) -> Permit<'_> {
        self.wait();
        Permit { semaphore: self }
    }
}

// Drop されると post される
pub struct Permit<'a> {
    semaphore: &'a Semaphore,
}

impl<'a> Drop for Permit<'a> {
    fn drop(&mut self) {
        self.semaphore.post();
    }
}
