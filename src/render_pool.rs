//! Bounded pool of renderer handles.
//!
//! Handles are created lazily up to the pool capacity and handed out as
//! [`PooledRenderer`] guards that go back to the pool when dropped, so a
//! failed render can never leak its handle.

use crate::{
    error::Error,
    renderer::{Renderer, RendererFactory},
};
use std::{
    ops::{Deref, DerefMut},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

struct Slots<R> {
    idle: Vec<R>,
    created: usize,
}

pub struct RenderPool<F: RendererFactory> {
    factory: F,
    capacity: usize,
    slots: Mutex<Slots<F::Renderer>>,
    available: Condvar,
}

impl<F: RendererFactory> RenderPool<F> {
    /// Creates the pool with one renderer so a broken style fails here.
    pub fn new(factory: F, capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::RenderPool("capacity must be positive".into()));
        }

        let first = factory.create()?;

        Ok(Self {
            factory,
            capacity,
            slots: Mutex::new(Slots {
                idle: vec![first],
                created: 1,
            }),
            available: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Slots<F::Renderer>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until a renderer is idle or another one may be created.
    pub fn acquire(&self) -> Result<PooledRenderer<'_, F>, Error> {
        let mut slots = self.lock();

        loop {
            if let Some(renderer) = slots.idle.pop() {
                return Ok(PooledRenderer {
                    pool: self,
                    renderer: Some(renderer),
                });
            }

            if slots.created < self.capacity {
                break;
            }

            slots = self
                .available
                .wait(slots)
                .unwrap_or_else(PoisonError::into_inner);
        }

        slots.created += 1;

        drop(slots);

        match self.factory.create() {
            Ok(renderer) => {
                log::debug!("Created renderer");

                Ok(PooledRenderer {
                    pool: self,
                    renderer: Some(renderer),
                })
            }
            Err(e) => {
                self.lock().created -= 1;

                self.available.notify_one();

                Err(Error::RenderPool(format!("error creating renderer: {e}")))
            }
        }
    }

    /// Returns a handle; the same happens when the guard is dropped.
    pub fn release(&self, handle: PooledRenderer<'_, F>) {
        drop(handle);
    }

    fn put_back(&self, renderer: F::Renderer) {
        self.lock().idle.push(renderer);

        self.available.notify_one();
    }

    /// Drops every renderer. Guards borrow the pool, so none can be out.
    pub fn destroy(self) {
        let slots = self.slots.into_inner().unwrap_or_else(PoisonError::into_inner);

        log::info!("Destroying render pool of {} renderer(s)", slots.idle.len());

        drop(slots.idle);
    }
}

pub struct PooledRenderer<'a, F: RendererFactory> {
    pool: &'a RenderPool<F>,
    renderer: Option<F::Renderer>,
}

impl<F: RendererFactory> Deref for PooledRenderer<'_, F> {
    type Target = F::Renderer;

    fn deref(&self) -> &F::Renderer {
        self.renderer.as_ref().expect("renderer present until drop")
    }
}

impl<F: RendererFactory> DerefMut for PooledRenderer<'_, F> {
    fn deref_mut(&mut self) -> &mut F::Renderer {
        self.renderer.as_mut().expect("renderer present until drop")
    }
}

impl<F: RendererFactory> Drop for PooledRenderer<'_, F> {
    fn drop(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            self.pool.put_back(renderer);
        }
    }
}
