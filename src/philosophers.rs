use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};

use tracing::{debug, info};

use crate::{
    config::{Pacing, RingConfig},
    error::ConfigError,
    semaphore::{Permit, Semaphore},
};

// 哲学者の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    Thinking,
    Hungry,
    Eating,
}

impl ActorState {
    fn symbol(self) -> char {
        match self {
            ActorState::Thinking => 'T',
            ActorState::Hungry => 'H',
            ActorState::Eating => 'E',
        }
    }
}

// デッドロック回避の方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    // 偶数は左から、奇数は右から取る
    Asymmetric,
    // 同時に席につけるのは N-1 人まで + 箸は番号順に取る
    Bounded,
}

// 状態ロックで保護される共有データ
struct Table {
    states: Vec<ActorState>,
    eating: usize, // 食事中の人数
    peak: usize,   // 観測された eating の最大値
}

pub struct ResourceRing {
    forks: Vec<Mutex<()>>, // 箸 i は哲学者 i の左、哲学者 i-1 の右
    table: Mutex<Table>,
    admission: Semaphore, // N-1 で初期化
    config: RingConfig,
}

// 両方の箸を持っている間だけ存在する
// Drop で Thinking に戻してから箸を置く。release しなくても状態は崩れない
#[must_use = "dropping a meal puts both forks down immediately"]
pub struct Meal<'a> {
    ring: &'a ResourceRing,
    actor: usize,
    _first: MutexGuard<'a, ()>,
    _second: MutexGuard<'a, ()>,
}

impl<'a> Meal<'a> {
    pub fn actor(&self) -> usize {
        self.actor
    }

    pub fn release(self) {
        let (ring, actor) = (self.ring, self.actor);
        drop(self);
        ring.report_state(actor, "thinking");
    }
}

impl<'a> Drop for Meal<'a> {
    fn drop(&mut self) {
        // 箸 (フィールド) はこの後に解放される
        self.ring.become_thinking(self.actor);
    }
}

// 入場制限付きの食事。箸に加えて入場許可を持つ
// フィールドは宣言順に drop されるので、箸を置いてから席が空く
#[must_use = "dropping a meal puts both forks down immediately"]
pub struct BoundedMeal<'a> {
    meal: Meal<'a>,
    _permit: Permit<'a>,
}

impl<'a> BoundedMeal<'a> {
    pub fn actor(&self) -> usize {
        self.meal.actor
    }

    pub fn release(self) {
        let (ring, actor) = (self.meal.ring, self.meal.actor);
        drop(self);
        ring.report_state(actor, "thinking");
    }
}

// ある瞬間の全員の状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingSnapshot {
    pub states: Vec<ActorState>,
    pub eating: usize,
}

impl RingSnapshot {
    // 隣り合う 2 人が同時に食事中か (箸を共有しているのでありえないはず)
    pub fn adjacent_eating(&self) -> bool {
        let n = self.states.len();
        (0..n).any(|i| {
            self.states[i] == ActorState::Eating && self.states[(i + 1) % n] == ActorState::Eating
        })
    }

    pub fn count(&self, state: ActorState) -> usize {
        self.states.iter().filter(|s| **s == state).count()
    }
}

impl fmt::Display for RingSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, s) in self.states.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", s.symbol())?;
        }
        write!(f, "] eating: {}", self.eating)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiningReport {
    pub protocol: Protocol,
    pub meals: Vec<usize>, // 哲学者ごとの食事回数
    pub peak_eating: usize,
}

impl ResourceRing {
    pub fn new(config: RingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let n = config.actors;
        Ok(ResourceRing {
            forks: (0..n).map(|_| Mutex::new(())).collect(),
            table: Mutex::new(Table {
                states: vec![ActorState::Thinking; n],
                eating: 0,
                peak: 0,
            }),
            admission: Semaphore::new(n - 1),
            config,
        })
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    // 左の箸の番号
    pub fn left(&self, actor: usize) -> usize {
        actor
    }

    // 右の箸の番号
    pub fn right(&self, actor: usize) -> usize {
        (actor + 1) % self.config.actors
    }

    // 方式 1: 非対称な順序で取る
    // 隣同士が共有する箸を同じ相対順で要求しないので、待ちの循環ができない
    pub fn acquire_asymmetric(&self, actor: usize) -> Meal<'_> {
        let (l, r) = (self.left(actor), self.right(actor));
        self.become_hungry(actor);

        let (first, second) = if actor % 2 == 0 { (l, r) } else { (r, l) };
        let meal = self.take_forks(actor, first, second);
        self.report_state(actor, "eating");
        meal
    }

    pub fn release_asymmetric(&self, meal: Meal<'_>) {
        meal.release();
    }

    // 方式 2: 入場制限 + 番号順
    pub fn acquire_bounded(&self, actor: usize) -> BoundedMeal<'_> {
        let (l, r) = (self.left(actor), self.right(actor));
        self.become_hungry(actor);

        // 席が空くまで待つ
        let permit = self.admission.permit();

        let (first, second) = if l < r { (l, r) } else { (r, l) };
        let meal = self.take_forks(actor, first, second);
        self.report_state(actor, "eating");
        BoundedMeal {
            meal,
            _permit: permit,
        }
    }

    pub fn release_bounded(&self, meal: BoundedMeal<'_>) {
        meal.release();
    }

    pub fn snapshot(&self) -> RingSnapshot {
        let table = self.table.lock().unwrap();
        RingSnapshot {
            states: table.states.clone(),
            eating: table.eating,
        }
    }

    // 全員の状態をまとめて読み出して出力する。状態は変更しない
    pub fn report_state(&self, actor: usize, action: &str) -> RingSnapshot {
        let snapshot = self.snapshot();
        info!(actor, action, "{}", snapshot);
        snapshot
    }

    // 1 人 1 スレッドで全員の食事を最後まで実行する
    pub fn dine(self: &Arc<Self>, protocol: Protocol, pacing: Pacing) -> DiningReport {
        let mut v = Vec::new();
        for id in 0..self.config.actors {
            let ring = self.clone();
            let t = thread::spawn(move || philosopher(&ring, id, protocol, pacing));
            v.push(t);
        }

        let meals = v.into_iter().map(|t| t.join().unwrap()).collect();
        let peak_eating = self.table.lock().unwrap().peak;
        DiningReport {
            protocol,
            meals,
            peak_eating,
        }
    }

    fn take_forks(&self, actor: usize, first: usize, second: usize) -> Meal<'_> {
        // 箸は中身を持たないので、食事中のパニックで poison されても使い続けてよい
        let g1 = self.forks[first].lock().unwrap_or_else(PoisonError::into_inner);
        let g2 = self.forks[second].lock().unwrap_or_else(PoisonError::into_inner);
        debug!(actor, first, second, "forks acquired");

        let mut table = self.table.lock().unwrap();
        table.states[actor] = ActorState::Eating;
        table.eating += 1;
        table.peak = table.peak.max(table.eating);
        drop(table);

        Meal {
            ring: self,
            actor,
            _first: g1,
            _second: g2,
        }
    }

    fn become_hungry(&self, actor: usize) {
        let mut table = self.table.lock().unwrap();
        table.states[actor] = ActorState::Hungry;
        drop(table);
        self.report_state(actor, "hungry");
    }

    // Meal の Drop から呼ばれる。パニック中でも二重パニックにしない
    fn become_thinking(&self, actor: usize) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.states[actor] = ActorState::Thinking;
        table.eating -= 1;
    }
}

// 哲学者スレッド本体。食べた回数を返す
fn philosopher(ring: &ResourceRing, id: usize, protocol: Protocol, pacing: Pacing) -> usize {
    let mut meals = 0;
    for _ in 0..ring.config.cycles_per_actor {
        ring.report_state(id, "thinking");
        pacing.idle();

        match protocol {
            Protocol::Asymmetric => {
                let meal = ring.acquire_asymmetric(id);
                pacing.busy();
                ring.release_asymmetric(meal);
            }
            Protocol::Bounded => {
                let meal = ring.acquire_bounded(id);
                pacing.busy();
                ring.release_bounded(meal);
            }
        }
        meals += 1;
    }

    info!(actor = id, meals, "philosopher finished eating");
    meals
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn ring(actors: usize, cycles: usize) -> Arc<ResourceRing> {
        Arc::new(
            ResourceRing::new(RingConfig {
                actors,
                cycles_per_actor: cycles,
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_fork_indices() {
        let r = ring(5, 1);
        assert_eq!((r.left(0), r.right(0)), (0, 1));
        assert_eq!((r.left(4), r.right(4)), (4, 0));
    }

    #[test]
    fn test_rejects_single_actor() {
        let res = ResourceRing::new(RingConfig {
            actors: 1,
            cycles_per_actor: 1,
        });
        assert!(matches!(res, Err(ConfigError::TooFewActors(1))));
    }

    #[test]
    fn test_acquire_release_updates_state() {
        let r = ring(3, 1);
        let meal = r.acquire_asymmetric(1);
        let s = r.snapshot();
        assert_eq!(s.states[1], ActorState::Eating);
        assert_eq!(s.eating, 1);
        r.release_asymmetric(meal);

        let s = r.snapshot();
        assert_eq!(s.states, vec![ActorState::Thinking; 3]);
        assert_eq!(s.eating, 0);
    }

    #[test]
    fn test_bounded_release_returns_admission() {
        let r = ring(4, 1);
        let meal = r.acquire_bounded(0);
        assert_eq!(meal.actor(), 0);
        assert_eq!(r.admission.value(), 2);
        r.release_bounded(meal);
        assert_eq!(r.admission.value(), 3);
    }

    #[test]
    fn test_dropped_meal_returns_to_thinking() {
        let r = ring(3, 1);
        drop(r.acquire_asymmetric(0));
        let s = r.snapshot();
        assert_eq!(s.states[0], ActorState::Thinking);
        assert_eq!(s.eating, 0);

        // 隣が箸を取っても、隣同士が同時に食事中にはならない
        let meal = r.acquire_asymmetric(1);
        let s = r.snapshot();
        assert!(!s.adjacent_eating(), "{}", s);
        assert_eq!(s.eating, 1);
        r.release_asymmetric(meal);
    }

    #[test]
    fn test_dropped_bounded_meal_keeps_admission_in_step() {
        let r = ring(3, 1);
        for _ in 0..5 {
            drop(r.acquire_bounded(2));
        }
        let s = r.snapshot();
        assert_eq!(s.states, vec![ActorState::Thinking; 3]);
        assert_eq!(s.eating, 0);
        assert_eq!(r.admission.value(), 2);

        let m0 = r.acquire_bounded(0);
        assert_eq!(r.snapshot().eating, 1);
        r.release_bounded(m0);
    }

    #[test]
    fn test_meal_released_while_unwinding() {
        let r = ring(3, 1);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _meal = r.acquire_asymmetric(1);
            panic!("panicked while eating");
        }));
        assert!(res.is_err());
        let s = r.snapshot();
        assert_eq!(s.states[1], ActorState::Thinking);
        assert_eq!(s.eating, 0);

        // 両隣も食事できる
        let meal = r.acquire_asymmetric(2);
        r.release_asymmetric(meal);
        assert_eq!(r.snapshot().eating, 0);
    }

    #[test]
    fn test_non_adjacent_can_eat_together() {
        let r = ring(4, 1);
        let m0 = r.acquire_asymmetric(0);
        let m2 = r.acquire_asymmetric(2);
        let s = r.snapshot();
        assert_eq!(s.eating, 2);
        assert!(!s.adjacent_eating());
        r.release_asymmetric(m0);
        r.release_asymmetric(m2);
    }

    #[test]
    fn test_snapshot_display() {
        let s = RingSnapshot {
            states: vec![ActorState::Thinking, ActorState::Hungry, ActorState::Eating],
            eating: 1,
        };
        assert_eq!(s.to_string(), "[T H E] eating: 1");
    }

    #[test]
    fn test_adjacent_eating_wraps_around() {
        let s = RingSnapshot {
            states: vec![ActorState::Eating, ActorState::Thinking, ActorState::Eating],
            eating: 2,
        };
        assert!(s.adjacent_eating());
    }

    // 観測者スレッドが食事中の状態を見張る
    fn observe(r: &Arc<ResourceRing>, protocol: Protocol) -> (DiningReport, Vec<RingSnapshot>) {
        let done = Arc::new(AtomicBool::new(false));
        let r0 = r.clone();
        let done0 = done.clone();
        let observer = thread::spawn(move || {
            let mut seen = Vec::new();
            while !done0.load(Ordering::Relaxed) {
                seen.push(r0.snapshot());
            }
            seen
        });

        let report = r.dine(protocol, Pacing::none());
        done.store(true, Ordering::Relaxed);
        (report, observer.join().unwrap())
    }

    #[test]
    fn test_asymmetric_completes_without_adjacent_eaters() {
        for n in 2..=6 {
            let r = ring(n, 200);
            let (report, seen) = observe(&r, Protocol::Asymmetric);
            assert_eq!(report.meals, vec![200; n]);
            assert!(report.peak_eating <= n / 2);
            for s in seen {
                assert!(!s.adjacent_eating(), "adjacent eaters: {}", s);
                assert!(s.eating <= n / 2);
            }
            assert_eq!(r.snapshot().states, vec![ActorState::Thinking; n]);
        }
    }

    #[test]
    fn test_bounded_never_admits_everyone() {
        let r = ring(5, 300);
        let (report, seen) = observe(&r, Protocol::Bounded);
        assert_eq!(report.meals, vec![300; 5]);
        assert!(report.peak_eating <= 4);
        for s in seen {
            assert!(s.count(ActorState::Eating) < 5, "all eating: {}", s);
            assert!(!s.adjacent_eating());
        }
        assert_eq!(r.admission.value(), 4);
    }
}
