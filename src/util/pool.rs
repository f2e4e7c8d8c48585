// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

/// Trait implemented by objects that know how to create and recycle pooled instances of T.
pub trait PoolFactory<T> {
    fn create(&self) -> T;
    fn reset(&self, obj: &mut T);
}

struct PoolInner<O, F: PoolFactory<O>> {
    factory: F,
    available: Mutex<Vec<Box<O>>>,
}

/// A simple object pool for fixed-size reusable buffers and similar types.
///
/// Checked-out objects are returned to the pool when their `Pooled` wrapper is dropped.
pub struct Pool<O, F: PoolFactory<O>>(std::sync::Arc<PoolInner<O, F>>);

impl<O, F: PoolFactory<O>> Pool<O, F> {
    pub fn new(initial_capacity: usize, factory: F) -> Self {
        let mut available = Vec::with_capacity(initial_capacity);
        for _ in 0..initial_capacity {
            available.push(Box::new(factory.create()));
        }
        Self(std::sync::Arc::new(PoolInner { factory, available: Mutex::new(available) }))
    }

    /// Check out an object from the pool, creating a new one if none are available.
    pub fn get(&self) -> Pooled<O, F> {
        let o = self.0.available.lock().unwrap().pop().unwrap_or_else(|| Box::new(self.0.factory.create()));
        Pooled(Some(o), self.0.clone())
    }
}

/// A checked-out pooled object. Returned to its pool automatically on drop.
pub struct Pooled<O, F: PoolFactory<O>>(Option<Box<O>>, std::sync::Arc<PoolInner<O, F>>);

impl<O, F: PoolFactory<O>> Deref for Pooled<O, F> {
    type Target = O;

    #[inline(always)]
    fn deref(&self) -> &O {
        self.0.as_ref().unwrap()
    }
}

impl<O, F: PoolFactory<O>> DerefMut for Pooled<O, F> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut O {
        self.0.as_mut().unwrap()
    }
}

impl<O, F: PoolFactory<O>> Drop for Pooled<O, F> {
    fn drop(&mut self) {
        if let Some(mut o) = self.0.take() {
            self.1.factory.reset(&mut o);
            self.1.available.lock().unwrap().push(o);
        }
    }
}
