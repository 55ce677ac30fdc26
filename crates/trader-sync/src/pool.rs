//! 세션(커넥션) 풀.
//!
//! 데이터 소스 클라이언트를 고정 개수의 슬롯에 보관하고 라운드로빈으로 나눠줍니다.
//! 실패로 오염된 세션은 `invalidate`/`reset_all`로 폐기하며, 다음 `checkout` 시
//! factory로 새로 생성됩니다. 동기화는 풀 내부에서만 처리합니다.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{Result, SyncError};

type Factory<S> = Box<dyn Fn() -> Result<S> + Send + Sync>;

/// 라운드로빈 세션 풀.
pub struct SessionPool<S> {
    slots: Vec<Mutex<Option<Arc<S>>>>,
    next: AtomicUsize,
    created: AtomicUsize,
    factory: Factory<S>,
}

/// 풀에서 꺼낸 세션.
#[derive(Debug)]
pub struct PooledSession<S> {
    slot: usize,
    session: Arc<S>,
}

impl<S> PooledSession<S> {
    /// 세션이 속한 슬롯 번호.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl<S> Deref for PooledSession<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S> SessionPool<S> {
    /// 새 풀 생성. 세션은 처음 사용할 때 생성됩니다.
    pub fn new<F>(size: usize, factory: F) -> Self
    where
        F: Fn() -> Result<S> + Send + Sync + 'static,
    {
        let size = size.max(1);
        Self {
            slots: (0..size).map(|_| Mutex::new(None)).collect(),
            next: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            factory: Box::new(factory),
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// 지금까지 factory로 생성한 세션 수.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// 다음 슬롯의 세션 반환 (없으면 생성).
    pub fn checkout(&self) -> Result<PooledSession<S>> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let mut guard = self.slots[slot]
            .lock()
            .map_err(|_| SyncError::Session(format!("세션 슬롯 잠금 실패: {}", slot)))?;

        if let Some(session) = guard.as_ref() {
            return Ok(PooledSession {
                slot,
                session: session.clone(),
            });
        }

        let session = Arc::new((self.factory)()?);
        self.created.fetch_add(1, Ordering::Relaxed);
        debug!(slot = slot, "세션 생성");
        *guard = Some(session.clone());

        Ok(PooledSession { slot, session })
    }

    /// 특정 슬롯의 세션 폐기.
    pub fn invalidate(&self, slot: usize) {
        if let Some(cell) = self.slots.get(slot) {
            if let Ok(mut guard) = cell.lock() {
                if guard.take().is_some() {
                    debug!(slot = slot, "세션 폐기");
                }
            }
        }
    }

    /// 모든 세션 폐기 (재연결).
    pub fn reset_all(&self) {
        for slot in 0..self.slots.len() {
            self.invalidate(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counting_pool(size: usize) -> SessionPool<u32> {
        let seq = AtomicU32::new(0);
        SessionPool::new(size, move || Ok(seq.fetch_add(1, Ordering::SeqCst)))
    }

    #[test]
    fn test_round_robin_reuses_sessions() {
        let pool = counting_pool(2);

        let a = pool.checkout().unwrap();
        let b = pool.checkout().unwrap();
        let c = pool.checkout().unwrap();

        assert_eq!((a.slot(), b.slot(), c.slot()), (0, 1, 0));
        assert_eq!(*a, *c);
        assert_ne!(*a, *b);
        assert_eq!(pool.created(), 2);
    }

    #[test]
    fn test_invalidate_recreates() {
        let pool = counting_pool(1);
        let first = *pool.checkout().unwrap();

        pool.invalidate(0);
        let second = *pool.checkout().unwrap();
        assert_ne!(first, second);

        pool.reset_all();
        let third = *pool.checkout().unwrap();
        assert_ne!(second, third);
        assert_eq!(pool.created(), 3);
    }

    #[test]
    fn test_factory_error() {
        let pool: SessionPool<u32> =
            SessionPool::new(0, || Err(SyncError::Session("refused".to_string())));
        assert_eq!(pool.size(), 1);
        assert!(pool.checkout().is_err());
        assert_eq!(pool.created(), 0);
    }
}
